//! `KeyStrategy`: the abstraction [`crate::sealer::DataSealer`] uses to
//! obtain AES-256 key material, decoupling the envelope format from where
//! keys actually live and how often they rotate.

mod fixed;
mod keystore;
mod reloadable;
mod scripted;

pub use fixed::FixedKeyStrategy;
pub use keystore::{KeystoreKeyStrategy, KeystoreKeyStrategyConfig};
pub use reloadable::{ReloadStatus, Reloadable, ReloadHandle};
pub use scripted::{ScriptedKeyStrategy, ScriptedKeySet};

use zeroize::Zeroizing;

use crate::error::KeyStrategyError;

/// The name under which a key is addressed, both in the wire format's AAD
/// and in the `KeyStrategy`'s internal key map.
pub type Label = String;

/// An AES-256 key. Wrapped in [`zeroize::Zeroizing`] so the bytes are wiped
/// on drop regardless of which `KeyStrategy` variant produced them.
#[derive(Clone)]
pub struct SecretKey(Zeroizing<[u8; 32]>);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Parses a lower- or upper-case hex string into a 32-byte key.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyStrategyError> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| KeyStrategyError::SourceMalformed(format!("invalid hex key: {e}")))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| KeyStrategyError::SourceMalformed("key is not 32 bytes".into()))?;
        Ok(Self::from_bytes(array))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SecretKey").field(&"<redacted>").finish()
    }
}

/// Supplies key material to a [`crate::sealer::DataSealer`].
///
/// `default_key` is consulted once per `wrap` call; `key` is consulted once
/// per `unwrap` call, keyed by the label embedded in the sealed blob. A
/// `KeyStrategy` that rotates must keep serving every label it has ever
/// issued via `default_key` for as long as data sealed under that label
/// might still be presented to `unwrap`.
pub trait KeyStrategy: Send + Sync {
    /// The key new data should be sealed under, plus its label.
    fn default_key(&self) -> Result<(Label, SecretKey), KeyStrategyError>;

    /// The key previously sealed data under `label` was sealed with.
    fn key(&self, label: &str) -> Result<SecretKey, KeyStrategyError>;
}
