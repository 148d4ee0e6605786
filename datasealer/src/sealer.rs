//! `DataSealer`: wraps UTF-8 text into an authenticated, time-limited,
//! base64-encoded blob and unwraps it back.
//!
//! Wire layout of the base64-decoded blob:
//!
//! ```text
//! u16be label_len | label (utf8) | iv (12 bytes) | aes-256-gcm(plaintext) + 16-byte tag
//! ```
//!
//! `plaintext`, before encryption, is a gzip stream of:
//!
//! ```text
//! u64be expiration_millis | (u16be chunk_len | chunk (utf8))*
//! ```
//!
//! Splitting the payload into length-prefixed chunks capped at 60,000
//! bytes keeps each chunk's length representable in the `u16` prefix while
//! staying comfortably under its 65,535-byte ceiling.

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{KeyStrategyError, SealError};
use crate::key_strategy::KeyStrategy;
use crate::lifecycle::Lifecycle;

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MAX_CHUNK_BYTES: usize = 60_000;
const SELF_TEST_PLAINTEXT: &str = "datasealer self-test \u{2014} round trip";
const CHUNKED_LINE_LEN: usize = 76;

/// A source of cryptographically secure random bytes. One instance is held
/// per sealer and reused across calls; the default draws from the OS
/// entropy pool via `getrandom` on every call, matching the way
/// `citadel-envelope::aead` draws its nonces.
pub trait SecureRandom: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> Result<(), SealError>;
}

/// Default [`SecureRandom`]: the platform CSPRNG, via `getrandom`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl SecureRandom for OsRandom {
    fn fill(&self, buf: &mut [u8]) -> Result<(), SealError> {
        getrandom::getrandom(buf).map_err(|_| SealError::Malformed("platform RNG unavailable".into()))
    }
}

/// The base64 codec a sealed blob is rendered through. Defaults to
/// unchunked standard base64; [`BlobCodec::Chunked76`] wraps output at 76
/// characters per line (MIME-style) for callers whose transport mangles
/// very long lines.
#[derive(Debug, Clone, Copy, Default)]
pub enum BlobCodec {
    #[default]
    Standard,
    Chunked76,
}

impl BlobCodec {
    fn encode(self, bytes: &[u8]) -> String {
        let flat = BASE64.encode(bytes);
        match self {
            BlobCodec::Standard => flat,
            BlobCodec::Chunked76 => flat
                .as_bytes()
                .chunks(CHUNKED_LINE_LEN)
                .map(|c| std::str::from_utf8(c).expect("base64 alphabet is ASCII"))
                .collect::<Vec<_>>()
                .join("\r\n"),
        }
    }

    fn decode(self, text: &str) -> Result<Vec<u8>, SealError> {
        let flat: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        BASE64
            .decode(flat)
            .map_err(|e| SealError::Malformed(format!("invalid base64: {e}")))
    }
}

/// Configuration for a [`DataSealer`] instance. Mirrors the options spec'd
/// for `DataSealer`: a required `key_strategy`, and optional `random`,
/// `encoder`/`decoder` (folded into `codec` here since the same type
/// implements both directions), and `locked_at_startup`.
pub struct DataSealerConfig {
    pub key_strategy: Arc<dyn KeyStrategy>,
    /// Defaults to [`OsRandom`] when `None`.
    pub random: Option<Arc<dyn SecureRandom>>,
    pub codec: BlobCodec,
    /// When true, skips the constructor's round-trip self-test — intended
    /// for key strategies that are expected to have no usable key yet at
    /// startup (e.g. a `KeystoreKeyStrategy` configured without
    /// `fail_fast`, waiting on its first successful reload).
    pub locked_at_startup: bool,
}

impl DataSealerConfig {
    pub fn new(key_strategy: Arc<dyn KeyStrategy>) -> Self {
        Self {
            key_strategy,
            random: None,
            codec: BlobCodec::default(),
            locked_at_startup: false,
        }
    }
}

/// The authenticated, time-limited encryption envelope described by this
/// crate's top-level documentation.
///
/// Follows the shared `CREATED -> INITIALIZED -> DESTROYED` lifecycle:
/// `wrap`/`unwrap` only succeed while `INITIALIZED`. Unless constructed
/// with `locked_at_startup: true`, [`DataSealer::new`] performs a
/// round-trip encrypt/decrypt self-test of a fixed plaintext before
/// returning, so a misconfigured key strategy is caught at startup rather
/// than on the first real `wrap` call.
pub struct DataSealer {
    key_strategy: Arc<dyn KeyStrategy>,
    random: Arc<dyn SecureRandom>,
    codec: BlobCodec,
    lifecycle: Lifecycle,
}

impl DataSealer {
    pub fn new(config: DataSealerConfig) -> Result<Self, SealError> {
        let sealer = Self {
            key_strategy: config.key_strategy,
            random: config.random.unwrap_or_else(|| Arc::new(OsRandom)),
            codec: config.codec,
            lifecycle: Lifecycle::new(),
        };

        if !config.locked_at_startup {
            sealer.self_test()?;
        }

        sealer
            .lifecycle
            .initialize()
            .expect("freshly constructed lifecycle cannot already be initialized");
        Ok(sealer)
    }

    fn self_test(&self) -> Result<(), SealError> {
        let blob = self.wrap_internal(SELF_TEST_PLAINTEXT, 0)?;
        let recovered = self.unwrap_internal(&blob)?.1;
        if recovered != SELF_TEST_PLAINTEXT {
            return Err(SealError::Init("self-test round trip produced mismatched plaintext".into()));
        }
        Ok(())
    }

    pub fn destroy(&self) {
        self.lifecycle.destroy();
    }

    /// Encrypts `data` under the key strategy's current default key and
    /// returns a base64 envelope. `expiry_millis` is a Unix-epoch
    /// millisecond timestamp after which `unwrap` rejects the blob; `None`
    /// means "never expires on its own" (it can still become unreadable
    /// once its key label is rotated out of the `KeyStrategy`). Empty
    /// input is rejected: there is nothing meaningful to protect.
    pub fn wrap(&self, data: &str, expiry_millis: Option<u64>) -> Result<String, SealError> {
        self.lifecycle.require_initialized()?;
        if data.is_empty() {
            return Err(SealError::ConstraintViolation(
                "refusing to wrap an empty string".into(),
            ));
        }
        self.wrap_internal(data, expiry_millis.unwrap_or(0))
    }

    fn wrap_internal(&self, data: &str, expiration_millis: u64) -> Result<String, SealError> {
        let (label, key) = self.key_strategy.default_key()?;
        let plaintext = gzip_frame(expiration_millis, data)?;

        let mut iv = [0u8; IV_LEN];
        self.random.fill(&mut iv)?;

        let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| SealError::Crypto)?;
        let nonce = aes_gcm::Nonce::from_slice(&iv);
        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: &plaintext,
                    aad: label.as_bytes(),
                },
            )
            .map_err(|_| SealError::Crypto)?;

        let label_bytes = label.as_bytes();
        let mut buf = Vec::with_capacity(2 + label_bytes.len() + IV_LEN + ciphertext.len());
        buf.extend_from_slice(&(label_bytes.len() as u16).to_be_bytes());
        buf.extend_from_slice(label_bytes);
        buf.extend_from_slice(&iv);
        buf.extend_from_slice(&ciphertext);

        Ok(self.codec.encode(&buf))
    }

    /// Decrypts a blob previously produced by `wrap`, discarding the label
    /// it was sealed under. See [`DataSealer::unwrap_with_label`] to also
    /// recover the label.
    pub fn unwrap(&self, blob: &str) -> Result<String, SealError> {
        self.lifecycle.require_initialized()?;
        Ok(self.unwrap_internal(blob)?.1)
    }

    /// As [`DataSealer::unwrap`], additionally returning the label the
    /// blob was sealed under (spec's `out_label` parameter).
    pub fn unwrap_with_label(&self, blob: &str) -> Result<(String, String), SealError> {
        self.lifecycle.require_initialized()?;
        self.unwrap_internal(blob)
    }

    /// Returns [`SealError::Expired`] both when the embedded expiration has
    /// passed and when the key strategy no longer recognizes the blob's
    /// label — from the caller's perspective both mean "this data is no
    /// longer accessible", matching the non-goal of not distinguishing
    /// revocation from expiry.
    fn unwrap_internal(&self, blob: &str) -> Result<(String, String), SealError> {
        if blob.is_empty() {
            return Err(SealError::Malformed("refusing to unwrap an empty blob".into()));
        }

        let raw = self.codec.decode(blob)?;
        if raw.len() < 2 {
            return Err(SealError::Malformed("blob shorter than label length prefix".into()));
        }
        let label_len = u16::from_be_bytes([raw[0], raw[1]]) as usize;
        let mut pos = 2;
        if raw.len() < pos + label_len + IV_LEN + TAG_LEN {
            return Err(SealError::Malformed("blob truncated before iv/ciphertext".into()));
        }
        let label = std::str::from_utf8(&raw[pos..pos + label_len])
            .map_err(|e| SealError::Malformed(format!("label is not utf-8: {e}")))?
            .to_string();
        pos += label_len;
        let iv = &raw[pos..pos + IV_LEN];
        pos += IV_LEN;
        let ciphertext = &raw[pos..];

        let key = match self.key_strategy.key(&label) {
            Ok(key) => key,
            // Only "no key under this label" means the blob is permanently
            // unreadable (spec.md §7: KeyNotFound -> DataExpired). Any other
            // failure (e.g. a keystore that hasn't finished its first load)
            // is transient and must surface, not be mistaken for expiry.
            Err(KeyStrategyError::UnknownLabel(_)) => return Err(SealError::Expired),
            Err(other) => return Err(SealError::from(other)),
        };

        let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| SealError::Crypto)?;
        let nonce = aes_gcm::Nonce::from_slice(iv);
        let plaintext = cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext,
                    aad: label.as_bytes(),
                },
            )
            .map_err(|_| SealError::Crypto)?;

        let (expiration_millis, data) = unframe_gzip(&plaintext)?;
        if expiration_millis != 0 && now_millis() > expiration_millis {
            return Err(SealError::Expired);
        }
        Ok((label, data))
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn gzip_frame(expiration_millis: u64, data: &str) -> Result<Vec<u8>, SealError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&expiration_millis.to_be_bytes())
        .map_err(|e| SealError::Malformed(e.to_string()))?;
    for chunk in chunk_utf8(data, MAX_CHUNK_BYTES) {
        let chunk_bytes = chunk.as_bytes();
        encoder
            .write_all(&(chunk_bytes.len() as u16).to_be_bytes())
            .map_err(|e| SealError::Malformed(e.to_string()))?;
        encoder
            .write_all(chunk_bytes)
            .map_err(|e| SealError::Malformed(e.to_string()))?;
    }
    encoder.finish().map_err(|e| SealError::Malformed(e.to_string()))
}

fn unframe_gzip(plaintext: &[u8]) -> Result<(u64, String), SealError> {
    let mut decoder = GzDecoder::new(plaintext);
    let mut raw = Vec::new();
    decoder
        .read_to_end(&mut raw)
        .map_err(|e| SealError::Malformed(format!("invalid gzip payload: {e}")))?;

    if raw.len() < 8 {
        return Err(SealError::Malformed("payload shorter than expiration field".into()));
    }
    let expiration_millis = u64::from_be_bytes(raw[0..8].try_into().unwrap());
    let mut pos = 8;
    let mut data = String::new();
    while pos < raw.len() {
        if raw.len() < pos + 2 {
            return Err(SealError::Malformed("truncated chunk length prefix".into()));
        }
        let chunk_len = u16::from_be_bytes([raw[pos], raw[pos + 1]]) as usize;
        pos += 2;
        if raw.len() < pos + chunk_len {
            return Err(SealError::Malformed("truncated chunk body".into()));
        }
        let chunk = std::str::from_utf8(&raw[pos..pos + chunk_len])
            .map_err(|e| SealError::Malformed(format!("chunk is not utf-8: {e}")))?;
        data.push_str(chunk);
        pos += chunk_len;
    }
    Ok((expiration_millis, data))
}

/// Splits `s` into pieces whose UTF-8 byte length never exceeds
/// `max_bytes`, always cutting on a character boundary.
fn chunk_utf8(s: &str, max_bytes: usize) -> Vec<&str> {
    if s.is_empty() {
        return Vec::new();
    }
    let bytes = s.as_bytes();
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < bytes.len() {
        let mut end = (start + max_bytes).min(bytes.len());
        while end > start && !s.is_char_boundary(end) {
            end -= 1;
        }
        chunks.push(&s[start..end]);
        start = end;
    }
    chunks
}
