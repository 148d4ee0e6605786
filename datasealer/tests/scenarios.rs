//! End-to-end scenarios mirroring the concrete worked examples a sealed
//! blob format needs to satisfy: deterministic wrap/unwrap under a fixed
//! key, expiry enforcement, and continuity/termination of key rotation
//! across two independently configured strategies.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use datasealer::key_strategy::{FixedKeyStrategy, KeystoreKeyStrategy, KeystoreKeyStrategyConfig, Reloadable, SecretKey};
use datasealer::resource::InMemoryResource;
use datasealer::sealer::{BlobCodec, DataSealer, DataSealerConfig, SecureRandom};
use datasealer::SealError;

/// A `SecureRandom` that always hands back the same bytes, for tests that
/// need a reproducible IV.
struct ZeroRandom;
impl SecureRandom for ZeroRandom {
    fn fill(&self, buf: &mut [u8]) -> Result<(), SealError> {
        buf.fill(0);
        Ok(())
    }
}

fn keystore_line(alias: &str, key: [u8; 32]) -> String {
    format!("{alias}:{}\n", hex::encode(key))
}

/// Surfaces this crate's `tracing` events (reload attempts, rotation
/// warnings) on stderr when tests run with `--nocapture`, the same
/// `tracing_subscriber::fmt` setup the teacher's binary uses for its own
/// startup logging.
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// S1: fixed key, zero IV, no expiry — wrap/unwrap round-trips and the
/// sealing label is reported back correctly.
#[test]
fn s1_deterministic_wrap_round_trips_and_reports_its_label() {
    let strategy = Arc::new(FixedKeyStrategy::new("secret1", SecretKey::from_bytes([0u8; 32])));
    let mut config = DataSealerConfig::new(strategy);
    config.random = Some(Arc::new(ZeroRandom));
    let sealer = DataSealer::new(config).unwrap();

    let blob = sealer.wrap("THE DATA", None).unwrap();
    let (label, data) = sealer.unwrap_with_label(&blob).unwrap();
    assert_eq!(label, "secret1");
    assert_eq!(data, "THE DATA");

    // Same inputs (fixed key, zero IV, no expiry) must reproduce the exact
    // same blob byte-for-byte: wrap has no other source of entropy.
    let blob_again = sealer.wrap("THE DATA", None).unwrap();
    assert_eq!(blob, blob_again);
}

/// S2: a short-lived blob is readable until its expiry passes, then fails
/// with `Expired`.
#[test]
fn s2_expiry_elapses_and_unwrap_then_fails() {
    let strategy = Arc::new(FixedKeyStrategy::new("secret1", SecretKey::from_bytes([0u8; 32])));
    let sealer = DataSealer::new(DataSealerConfig::new(strategy)).unwrap();

    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64;
    let blob = sealer.wrap("THE DATA", Some(now + 500)).unwrap();

    assert_eq!(sealer.unwrap(&blob).unwrap(), "THE DATA");
    std::thread::sleep(Duration::from_millis(650));
    assert!(matches!(sealer.unwrap(&blob), Err(SealError::Expired)));
}

/// S3: two independently configured strategies share a key version; a blob
/// sealed under the narrower one is still readable by the wider one, and
/// the wider one reports the same label back.
#[test]
fn s3_a_wider_strategy_can_unwrap_a_narrower_strategys_blob() {
    let shared_secret1 = [1u8; 32];

    let keystore_s = Arc::new(InMemoryResource::new("keystore-s", keystore_line("secret1", shared_secret1).into_bytes()));
    let version_s = Arc::new(InMemoryResource::new("version-s", b"1".to_vec()));
    let strategy_s = KeystoreKeyStrategy::new(KeystoreKeyStrategyConfig {
        keystore_resource: keystore_s,
        keystore_password: None,
        base_alias: "secret".into(),
        key_password: None,
        key_version_resource: version_s,
        reload_check_delay: Duration::from_secs(3600),
        fail_fast: true,
    })
    .unwrap();
    let sealer_s = DataSealer::new(DataSealerConfig::new(strategy_s)).unwrap();

    let combined_keystore = format!(
        "{}{}",
        keystore_line("secret1", shared_secret1),
        keystore_line("secret2", [2u8; 32]),
    );
    let keystore_s_prime = Arc::new(InMemoryResource::new("keystore-s-prime", combined_keystore.into_bytes()));
    let version_s_prime = Arc::new(InMemoryResource::new("version-s-prime", b"2".to_vec()));
    let strategy_s_prime = KeystoreKeyStrategy::new(KeystoreKeyStrategyConfig {
        keystore_resource: keystore_s_prime,
        keystore_password: None,
        base_alias: "secret".into(),
        key_password: None,
        key_version_resource: version_s_prime,
        reload_check_delay: Duration::from_secs(3600),
        fail_fast: true,
    })
    .unwrap();
    let sealer_s_prime = DataSealer::new(DataSealerConfig::new(strategy_s_prime)).unwrap();

    let blob = sealer_s.wrap("cross-strategy payload", None).unwrap();
    let (label, data) = sealer_s_prime.unwrap_with_label(&blob).unwrap();
    assert_eq!(label, "secret1");
    assert_eq!(data, "cross-strategy payload");
}

/// S4: a very large payload (one million characters) round-trips intact.
#[test]
fn s4_one_million_character_payload_round_trips() {
    let strategy = Arc::new(FixedKeyStrategy::new("secret1", SecretKey::from_bytes([3u8; 32])));
    let sealer = DataSealer::new(DataSealerConfig::new(strategy)).unwrap();

    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64;
    let payload: String = "x".repeat(1_000_000);
    let blob = sealer.wrap(&payload, Some(now + 50_000)).unwrap();
    assert_eq!(sealer.unwrap(&blob).unwrap(), payload);
}

/// Key rotation continuity: a blob sealed under version N remains readable
/// after the strategy advances its default to N+1, as long as N is
/// retained. Once N is dropped from the keystore, the same blob fails with
/// `Expired` rather than any other error — rotation and revocation look
/// identical from the caller's side.
#[test]
fn key_rotation_continuity_then_termination() {
    init_tracing();
    let keystore = Arc::new(InMemoryResource::new(
        "keystore",
        format!("{}{}", keystore_line("secret1", [9u8; 32]), keystore_line("secret2", [8u8; 32])).into_bytes(),
    ));
    let version = Arc::new(InMemoryResource::new("version", b"1".to_vec()));
    let strategy = KeystoreKeyStrategy::new(KeystoreKeyStrategyConfig {
        keystore_resource: keystore.clone(),
        keystore_password: None,
        base_alias: "secret".into(),
        key_password: None,
        key_version_resource: version.clone(),
        reload_check_delay: Duration::from_secs(3600),
        fail_fast: true,
    })
    .unwrap();
    let sealer = DataSealer::new(DataSealerConfig::new(strategy.clone())).unwrap();

    let blob = sealer.wrap("rotate me", None).unwrap();

    // Advance the default to secret2, retaining secret1.
    version.set_content(b"2".to_vec(), SystemTime::now() + Duration::from_secs(1));
    strategy.do_reload().unwrap();
    assert_eq!(sealer.unwrap(&blob).unwrap(), "rotate me");

    // Now drop secret1 from the keystore entirely.
    keystore.set_content(
        keystore_line("secret2", [8u8; 32]).into_bytes(),
        SystemTime::now() + Duration::from_secs(2),
    );
    version.set_content(b"2".to_vec(), SystemTime::now() + Duration::from_secs(3));
    strategy.do_reload().unwrap();
    assert!(matches!(sealer.unwrap(&blob), Err(SealError::Expired)));
}

/// Chunked (76-column) codec round-trips identically to the standard one.
#[test]
fn chunked_codec_is_interoperable_with_itself() {
    let strategy = Arc::new(FixedKeyStrategy::new("v1", SecretKey::from_bytes([4u8; 32])));
    let mut config = DataSealerConfig::new(strategy);
    config.codec = BlobCodec::Chunked76;
    let sealer = DataSealer::new(config).unwrap();

    let blob = sealer.wrap("a fairly ordinary payload", None).unwrap();
    assert_eq!(sealer.unwrap(&blob).unwrap(), "a fairly ordinary payload");
}
