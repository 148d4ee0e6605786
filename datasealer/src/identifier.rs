//! `IdentifierGenerator`: produces the opaque identifier strings used to
//! label a key version or a sealer instance in log output.

/// Produces an identifier string. Implementations must be safe to call from
/// multiple threads without external synchronization.
pub trait IdentifierGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Always returns the same, caller-supplied identifier. Useful in tests and
/// for components where the identifier is meaningful configuration (e.g. a
/// deployment name) rather than something that needs to vary per call.
#[derive(Debug, Clone)]
pub struct FixedIdentifierGenerator {
    value: String,
}

impl FixedIdentifierGenerator {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl IdentifierGenerator for FixedIdentifierGenerator {
    fn generate(&self) -> String {
        self.value.clone()
    }
}

/// Generates a fresh, lower-case hex identifier from cryptographically
/// random bytes on every call.
#[derive(Debug, Clone)]
pub struct RandomIdentifierGenerator {
    byte_len: usize,
}

impl RandomIdentifierGenerator {
    pub fn new(byte_len: usize) -> Self {
        Self { byte_len }
    }
}

impl Default for RandomIdentifierGenerator {
    fn default() -> Self {
        Self::new(16)
    }
}

impl IdentifierGenerator for RandomIdentifierGenerator {
    fn generate(&self) -> String {
        let mut buf = vec![0u8; self.byte_len];
        // Identifiers are not secret key material; if the platform RNG is
        // unavailable there is nothing sensible left to do but panic, same
        // as an allocator failure.
        getrandom::getrandom(&mut buf).expect("platform RNG unavailable");
        hex::encode(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_always_returns_same_value() {
        let gen = FixedIdentifierGenerator::new("v1");
        assert_eq!(gen.generate(), "v1");
        assert_eq!(gen.generate(), "v1");
    }

    #[test]
    fn random_produces_distinct_hex_strings_of_expected_length() {
        let gen = RandomIdentifierGenerator::new(8);
        let a = gen.generate();
        let b = gen.generate();
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
