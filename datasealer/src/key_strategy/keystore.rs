//! `KeystoreKeyStrategy`: keys sourced from a keystore-like resource and a
//! companion "current version" resource, reloaded on a background
//! schedule when the version resource changes.
//!
//! The real JCEKS/PKCS12 container format a production keystore would use
//! is an external-collaborator concern (see `SPEC_FULL.md` §6) and is out
//! of scope for this crate. `KeystoreKeyStrategy` instead consumes a
//! simple line-oriented key map of `alias:hex-encoded-key` pairs via the
//! [`crate::resource::Resource`] abstraction, so any real container format
//! can be adapted into this shape by a thin caller-side translation layer.
//! `keystore_password` and `key_password` are retained on the config for
//! API parity with that eventual translation layer; this in-repo decoder
//! does not use them, since the key map it reads is not itself encrypted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use super::reloadable::{ReloadHandle, ReloadStatus, Reloadable};
use super::{KeyStrategy, Label, SecretKey};
use crate::error::{KeyStrategyError, LifecycleError};
use crate::lifecycle::Lifecycle;
use crate::resource::Resource;

pub struct KeystoreKeyStrategyConfig {
    /// Resource holding the `alias:hex-key` map.
    pub keystore_resource: Arc<dyn Resource>,
    /// Passphrase protecting the keystore container. Unused by this crate's
    /// simplified decoder; kept for parity with a real container format.
    pub keystore_password: Option<String>,
    /// The alias prefix; the active key is read from `{base_alias}{version}`.
    pub base_alias: String,
    /// Passphrase protecting individual key entries. Unused; see module docs.
    pub key_password: Option<String>,
    /// Resource holding the current key version as a decimal integer.
    pub key_version_resource: Arc<dyn Resource>,
    /// How often the background task checks the version resource.
    pub reload_check_delay: Duration,
    /// If true, construction fails outright when the initial load fails.
    /// If false, construction succeeds with no usable key until the first
    /// successful background reload.
    pub fail_fast: bool,
}

struct Inner {
    default_label: Label,
    keys: HashMap<Label, SecretKey>,
}

pub struct KeystoreKeyStrategy {
    config: KeystoreKeyStrategyConfig,
    state: RwLock<Option<Inner>>,
    last_seen_version_modified: Mutex<Option<SystemTime>>,
    status: Mutex<ReloadStatus>,
    lifecycle: Lifecycle,
    reload_handle: Mutex<Option<ReloadHandle>>,
}

impl KeystoreKeyStrategy {
    pub fn new(config: KeystoreKeyStrategyConfig) -> Result<Arc<Self>, KeyStrategyError> {
        let lifecycle = Lifecycle::new();
        let strategy = Arc::new(Self {
            last_seen_version_modified: Mutex::new(config.key_version_resource.last_modified()),
            status: Mutex::new(ReloadStatus::default()),
            config,
            state: RwLock::new(None),
            lifecycle,
            reload_handle: Mutex::new(None),
        });

        match strategy.load() {
            Ok(inner) => {
                *strategy.state.write() = Some(inner);
                strategy.status.lock().last_successful_reload = Some(now());
            }
            Err(e) if strategy.config.fail_fast => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "initial keystore load failed, starting with no usable key");
                strategy.status.lock().last_failure_cause = Some(e.to_string());
            }
        }

        strategy
            .lifecycle
            .initialize()
            .expect("freshly constructed lifecycle cannot already be initialized");
        Ok(strategy)
    }

    /// Spawns the background reload task. Requires a running Tokio runtime.
    pub fn spawn_reload_task(self: &Arc<Self>) {
        let handle = ReloadHandle::spawn(self.config.reload_check_delay, self.clone());
        *self.reload_handle.lock() = Some(handle);
    }

    pub async fn destroy(&self) {
        self.lifecycle.destroy();
        if let Some(handle) = self.reload_handle.lock().take() {
            handle.cancel().await;
        }
    }

    pub fn status(&self) -> ReloadStatus {
        self.status.lock().clone()
    }

    fn load(&self) -> Result<Inner, KeyStrategyError> {
        let version = self.load_version()?;
        let keys = self.load_keystore()?;
        let default_label = format!("{}{}", self.config.base_alias, version);
        if !keys.contains_key(&default_label) {
            return Err(KeyStrategyError::SourceMalformed(format!(
                "keystore has no entry for current alias {default_label:?}"
            )));
        }
        Ok(Inner { default_label, keys })
    }

    fn load_version(&self) -> Result<u64, KeyStrategyError> {
        let bytes = self
            .config
            .key_version_resource
            .read()
            .map_err(|e| KeyStrategyError::Unavailable(e.to_string()))?;
        let text = String::from_utf8(bytes)
            .map_err(|e| KeyStrategyError::SourceMalformed(format!("version is not utf-8: {e}")))?;
        text.trim()
            .parse::<u64>()
            .map_err(|e| KeyStrategyError::SourceMalformed(format!("invalid version {text:?}: {e}")))
    }

    fn load_keystore(&self) -> Result<HashMap<Label, SecretKey>, KeyStrategyError> {
        let bytes = self
            .config
            .keystore_resource
            .read()
            .map_err(|e| KeyStrategyError::Unavailable(e.to_string()))?;
        let text = String::from_utf8(bytes)
            .map_err(|e| KeyStrategyError::SourceMalformed(format!("keystore is not utf-8: {e}")))?;

        let mut keys = HashMap::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (alias, hex_key) = line.split_once(':').ok_or_else(|| {
                KeyStrategyError::SourceMalformed(format!("keystore line {}: missing ':'", lineno + 1))
            })?;
            keys.insert(alias.to_string(), SecretKey::from_hex(hex_key)?);
        }
        Ok(keys)
    }
}

impl KeyStrategy for KeystoreKeyStrategy {
    fn default_key(&self) -> Result<(Label, SecretKey), KeyStrategyError> {
        self.lifecycle
            .require_initialized()
            .map_err(|e| KeyStrategyError::Unavailable(e.to_string()))?;
        let guard = self.state.read();
        let inner = guard.as_ref().ok_or(KeyStrategyError::Unavailable(
            "no key has been successfully loaded yet".into(),
        ))?;
        let key = inner
            .keys
            .get(&inner.default_label)
            .expect("default_label is always present after a successful load")
            .clone();
        Ok((inner.default_label.clone(), key))
    }

    fn key(&self, label: &str) -> Result<SecretKey, KeyStrategyError> {
        if self.lifecycle.is_destroyed() {
            return Err(KeyStrategyError::Destroyed);
        }
        let guard = self.state.read();
        let inner = guard.as_ref().ok_or(KeyStrategyError::Unavailable(
            "no key has been successfully loaded yet".into(),
        ))?;
        inner
            .keys
            .get(label)
            .cloned()
            .ok_or_else(|| KeyStrategyError::UnknownLabel(label.to_string()))
    }
}

impl Reloadable for KeystoreKeyStrategy {
    fn should_reload(&self) -> bool {
        if self.lifecycle.is_destroyed() {
            return false;
        }
        match self.config.key_version_resource.last_modified() {
            None => true,
            Some(modified) => match *self.last_seen_version_modified.lock() {
                None => true,
                Some(seen) => modified > seen,
            },
        }
    }

    fn do_reload(&self) -> Result<(), String> {
        self.status.lock().last_reload_attempt = Some(now());
        match self.load() {
            Ok(inner) => {
                *self.state.write() = Some(inner);
                *self.last_seen_version_modified.lock() =
                    self.config.key_version_resource.last_modified();
                self.status.lock().last_successful_reload = Some(now());
                Ok(())
            }
            Err(e) => {
                self.status.lock().last_failure_cause = Some(e.to_string());
                Err(e.to_string())
            }
        }
    }
}

fn now() -> chrono::DateTime<Utc> {
    Utc::now()
}

impl From<LifecycleError> for KeyStrategyError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::Destroyed => KeyStrategyError::Destroyed,
            other => KeyStrategyError::Unavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::InMemoryResource;

    fn keystore_text(alias: &str, key: [u8; 32]) -> String {
        format!("{alias}:{}\n", hex::encode(key))
    }

    #[test]
    fn loads_the_key_for_the_current_version() {
        let keystore = Arc::new(InMemoryResource::new(
            "keystore",
            keystore_text("secret1", [1u8; 32]).into_bytes(),
        ));
        let version = Arc::new(InMemoryResource::new("version", b"1".to_vec()));
        let strategy = KeystoreKeyStrategy::new(KeystoreKeyStrategyConfig {
            keystore_resource: keystore,
            keystore_password: None,
            base_alias: "secret".into(),
            key_password: None,
            key_version_resource: version,
            reload_check_delay: Duration::from_secs(60),
            fail_fast: true,
        })
        .unwrap();

        let (label, _) = strategy.default_key().unwrap();
        assert_eq!(label, "secret1");
    }

    #[test]
    fn fail_fast_surfaces_initial_load_errors() {
        let keystore = Arc::new(InMemoryResource::new("keystore", b"".to_vec()));
        let version = Arc::new(InMemoryResource::new("version", b"1".to_vec()));
        let result = KeystoreKeyStrategy::new(KeystoreKeyStrategyConfig {
            keystore_resource: keystore,
            keystore_password: None,
            base_alias: "secret".into(),
            key_password: None,
            key_version_resource: version,
            reload_check_delay: Duration::from_secs(60),
            fail_fast: true,
        });
        assert!(result.is_err());
    }

    #[test]
    fn non_fail_fast_defers_errors_until_key_is_requested() {
        let keystore = Arc::new(InMemoryResource::new("keystore", b"".to_vec()));
        let version = Arc::new(InMemoryResource::new("version", b"1".to_vec()));
        let strategy = KeystoreKeyStrategy::new(KeystoreKeyStrategyConfig {
            keystore_resource: keystore,
            keystore_password: None,
            base_alias: "secret".into(),
            key_password: None,
            key_version_resource: version,
            reload_check_delay: Duration::from_secs(60),
            fail_fast: false,
        })
        .unwrap();
        assert!(strategy.default_key().is_err());
    }

    #[test]
    fn reload_picks_up_a_new_version_after_resource_changes() {
        let keystore_text_combined = format!(
            "{}{}",
            keystore_text("secret1", [1u8; 32]),
            keystore_text("secret2", [2u8; 32])
        );
        let keystore = Arc::new(InMemoryResource::new(
            "keystore",
            keystore_text_combined.into_bytes(),
        ));
        let version = Arc::new(InMemoryResource::new("version", b"1".to_vec()));
        let strategy = KeystoreKeyStrategy::new(KeystoreKeyStrategyConfig {
            keystore_resource: keystore,
            keystore_password: None,
            base_alias: "secret".into(),
            key_password: None,
            key_version_resource: version.clone(),
            reload_check_delay: Duration::from_secs(60),
            fail_fast: true,
        })
        .unwrap();
        assert_eq!(strategy.default_key().unwrap().0, "secret1");

        version.set_content(b"2".to_vec(), SystemTime::now() + Duration::from_secs(1));
        assert!(strategy.should_reload());
        strategy.do_reload().unwrap();
        assert_eq!(strategy.default_key().unwrap().0, "secret2");
        // the old label must remain servable for data sealed before rotation
        assert!(strategy.key("secret1").is_ok());
    }
}
