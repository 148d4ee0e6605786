//! # datasealer
//!
//! An authenticated, time-limited, key-rotating symmetric encryption
//! envelope built on AES-256-GCM.
//!
//! The crate has three layers:
//!
//! - [`sealer::DataSealer`] — wraps and unwraps UTF-8 text into a
//!   base64-encoded, gzip-framed, AES-GCM-sealed blob.
//! - [`key_strategy`] — the pluggable source of key material a
//!   `DataSealer` draws from: a [`key_strategy::FixedKeyStrategy`] for
//!   static deployments, a [`key_strategy::KeystoreKeyStrategy`] that
//!   reloads from a keystore-like resource on a schedule, and a
//!   [`key_strategy::ScriptedKeyStrategy`] driven by caller-supplied code.
//! - [`identifier`], [`resource`], [`lifecycle`] — small supporting
//!   abstractions shared across the above.
//!
//! Re-exported at the crate root: [`ddf`], the self-describing value tree
//! the scripted strategy uses to pass its "custom object" to caller code
//! and that doubles as this crate's general marshalling format.
//!
//! ```
//! use datasealer::key_strategy::{FixedKeyStrategy, SecretKey};
//! use datasealer::sealer::{DataSealer, DataSealerConfig};
//! use std::sync::Arc;
//!
//! let strategy = Arc::new(FixedKeyStrategy::new("v1", SecretKey::from_bytes([0u8; 32])));
//! let sealer = DataSealer::new(DataSealerConfig::new(strategy)).unwrap();
//!
//! let blob = sealer.wrap("hello world", None).unwrap();
//! assert_eq!(sealer.unwrap(&blob).unwrap(), "hello world");
//! ```

pub mod error;
pub mod identifier;
pub mod key_strategy;
pub mod lifecycle;
pub mod resource;
pub mod sealer;

pub use ddf;

pub use error::SealError;
pub use sealer::{DataSealer, DataSealerConfig};
