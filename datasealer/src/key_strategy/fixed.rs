use super::{KeyStrategy, Label, SecretKey};
use crate::error::KeyStrategyError;

/// A `KeyStrategy` backed by a single, caller-supplied key that never
/// changes. Returns the same key for every label, as spec'd: there is no
/// rotation story here, so `key(label)` never fails on an unrecognized
/// label the way a rotating strategy would. Used in tests only.
pub struct FixedKeyStrategy {
    label: Label,
    key: SecretKey,
}

impl FixedKeyStrategy {
    pub fn new(label: impl Into<Label>, key: SecretKey) -> Self {
        Self {
            label: label.into(),
            key,
        }
    }
}

impl KeyStrategy for FixedKeyStrategy {
    fn default_key(&self) -> Result<(Label, SecretKey), KeyStrategyError> {
        Ok((self.label.clone(), self.key.clone()))
    }

    fn key(&self, _label: &str) -> Result<SecretKey, KeyStrategyError> {
        Ok(self.key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serves_any_label_with_the_same_key() {
        let strategy = FixedKeyStrategy::new("v1", SecretKey::from_bytes([7u8; 32]));
        let (label, _) = strategy.default_key().unwrap();
        assert_eq!(label, "v1");
        assert!(strategy.key("v1").is_ok());
        assert!(strategy.key("whatever-else").is_ok());
    }
}
