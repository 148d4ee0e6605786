//! `ScriptedKeyStrategy`: key material produced by caller-supplied code
//! ("the script") that receives a mutable [`ddf::Ddf`] tree — the "custom
//! object" — on every reload and returns the key set to use.
//!
//! The custom object lets a script carry state between invocations (a
//! counter, a cached handle, environment snapshots) without the strategy
//! itself knowing anything about what the script needs. `Ddf` is not
//! `Sync`, so access to it is serialized behind the same lock that guards
//! the script callback itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use parking_lot::{Mutex, RwLock};

use super::reloadable::{ReloadHandle, ReloadStatus, Reloadable};
use super::{KeyStrategy, Label, SecretKey};
use crate::error::KeyStrategyError;
use crate::lifecycle::Lifecycle;
use ddf::{Ddf, NodeId};

/// The result of one script invocation.
pub struct ScriptedKeySet {
    pub default_label: Label,
    pub keys: HashMap<Label, SecretKey>,
}

type ScriptFn = dyn FnMut(&mut Ddf, NodeId) -> Result<ScriptedKeySet, String> + Send;

struct Inner {
    default_label: Label,
    keys: HashMap<Label, SecretKey>,
}

pub struct ScriptedKeyStrategy {
    custom_object: Mutex<(Ddf, NodeId)>,
    script: Mutex<Box<ScriptFn>>,
    state: RwLock<Option<Inner>>,
    status: Mutex<ReloadStatus>,
    update_interval: Duration,
    lifecycle: Lifecycle,
    reload_handle: Mutex<Option<ReloadHandle>>,
}

impl ScriptedKeyStrategy {
    /// `custom_object` is the root node of the tree passed to `script` on
    /// every invocation; callers typically build it with
    /// [`ddf::Ddf::structure`] and populate it with whatever configuration
    /// the script needs to read.
    pub fn new(
        custom_object: (Ddf, NodeId),
        script: Box<ScriptFn>,
        update_interval: Duration,
        fail_fast: bool,
    ) -> Result<Arc<Self>, KeyStrategyError> {
        let strategy = Arc::new(Self {
            custom_object: Mutex::new(custom_object),
            script: Mutex::new(script),
            state: RwLock::new(None),
            status: Mutex::new(ReloadStatus::default()),
            update_interval,
            lifecycle: Lifecycle::new(),
            reload_handle: Mutex::new(None),
        });

        match strategy.invoke_script() {
            Ok(inner) => {
                *strategy.state.write() = Some(inner);
                strategy.status.lock().last_successful_reload = Some(Utc::now());
            }
            Err(e) if fail_fast => return Err(KeyStrategyError::SourceMalformed(e)),
            Err(e) => {
                tracing::warn!(error = %e, "initial key script invocation failed");
                strategy.status.lock().last_failure_cause = Some(e);
            }
        }

        strategy
            .lifecycle
            .initialize()
            .expect("freshly constructed lifecycle cannot already be initialized");
        Ok(strategy)
    }

    pub fn spawn_reload_task(self: &Arc<Self>) {
        let handle = ReloadHandle::spawn(self.update_interval, self.clone());
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

    fn invoke_script(&self) -> Result<Inner, String> {
        let mut object = self.custom_object.lock();
        let (tree, root) = &mut *object;
        let mut script = self.script.lock();
        let result = (script)(tree, *root)?;
        Ok(Inner {
            default_label: result.default_label,
            keys: result.keys,
        })
    }
}

impl KeyStrategy for ScriptedKeyStrategy {
    fn default_key(&self) -> Result<(Label, SecretKey), KeyStrategyError> {
        self.lifecycle
            .require_initialized()
            .map_err(|_| KeyStrategyError::Unavailable("scripted strategy not ready".into()))?;
        let guard = self.state.read();
        let inner = guard
            .as_ref()
            .ok_or_else(|| KeyStrategyError::Unavailable("script has never succeeded".into()))?;
        let key = inner
            .keys
            .get(&inner.default_label)
            .ok_or_else(|| {
                KeyStrategyError::SourceMalformed(format!(
                    "script did not include its own default label {:?} in the key set",
                    inner.default_label
                ))
            })?
            .clone();
        Ok((inner.default_label.clone(), key))
    }

    fn key(&self, label: &str) -> Result<SecretKey, KeyStrategyError> {
        if self.lifecycle.is_destroyed() {
            return Err(KeyStrategyError::Destroyed);
        }
        let guard = self.state.read();
        let inner = guard
            .as_ref()
            .ok_or_else(|| KeyStrategyError::Unavailable("script has never succeeded".into()))?;
        inner
            .keys
            .get(label)
            .cloned()
            .ok_or_else(|| KeyStrategyError::UnknownLabel(label.to_string()))
    }
}

impl Reloadable for ScriptedKeyStrategy {
    fn should_reload(&self) -> bool {
        !self.lifecycle.is_destroyed()
    }

    fn do_reload(&self) -> Result<(), String> {
        self.status.lock().last_reload_attempt = Some(Utc::now());
        match self.invoke_script() {
            Ok(inner) => {
                *self.state.write() = Some(inner);
                self.status.lock().last_successful_reload = Some(Utc::now());
                Ok(())
            }
            Err(e) => {
                self.status.lock().last_failure_cause = Some(e.clone());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_set(label: &str, byte: u8) -> ScriptedKeySet {
        let mut keys = HashMap::new();
        keys.insert(label.to_string(), SecretKey::from_bytes([byte; 32]));
        ScriptedKeySet {
            default_label: label.to_string(),
            keys,
        }
    }

    #[test]
    fn script_output_becomes_the_default_key() {
        let mut tree = Ddf::new();
        let root = tree.structure();
        let strategy = ScriptedKeyStrategy::new(
            (tree, root),
            Box::new(|_tree, _root| Ok(key_set("v1", 9))),
            Duration::from_secs(60),
            true,
        )
        .unwrap();
        let (label, _) = strategy.default_key().unwrap();
        assert_eq!(label, "v1");
    }

    #[test]
    fn script_can_read_the_custom_object_to_vary_its_output() {
        let mut tree = Ddf::new();
        let root = tree.structure();
        let counter = tree.integer(0);
        tree.set_name(counter, "calls");
        tree.add(root, counter).unwrap();

        let strategy = ScriptedKeyStrategy::new(
            (tree, root),
            Box::new(|tree, root| {
                let counter = tree.get_member(root, "calls");
                let n = tree.as_int(counter).unwrap_or(0);
                tree.set_integer(counter, n + 1);
                Ok(key_set(&format!("v{}", n + 1), (n + 1) as u8))
            }),
            Duration::from_secs(60),
            true,
        )
        .unwrap();

        assert_eq!(strategy.default_key().unwrap().0, "v1");
        strategy.do_reload().unwrap();
        assert_eq!(strategy.default_key().unwrap().0, "v2");
        // the original label must still resolve after rotation
        assert!(strategy.key("v1").is_err(), "v1 was not retained by this script, which is expected: each invocation replaces the whole key set");
    }
}
