//! sbomer.toml integration tests
//!
//! - the shipped example parses and validates
//! - file loading with environment precedence
//! - empty and malformed files

use sbomer_core::config::SbomerConfig;
use sbomer_core::error::{ConfigError, SbomerError};
use serial_test::serial;

const EXAMPLE: &str = include_str!("../../../sbomer.toml.example");

#[test]
fn example_config_parses_and_validates() {
    let config = SbomerConfig::parse(EXAMPLE).expect("example config should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_matches_defaults() {
    let config = SbomerConfig::parse(EXAMPLE).expect("should parse");
    let defaults = SbomerConfig::default();

    assert_eq!(config.queue.discovery, defaults.queue.discovery);
    assert_eq!(config.queue.downstream, defaults.queue.downstream);
    assert_eq!(config.fetcher.schedule, defaults.fetcher.schedule);
    assert_eq!(config.fetcher.batch_size, defaults.fetcher.batch_size);
    assert_eq!(config.gitlab.temp_dir, defaults.gitlab.temp_dir);
    assert_eq!(
        config.processor.requeue_delay_secs,
        defaults.processor.requeue_delay_secs
    );
}

#[tokio::test]
#[serial]
async fn load_applies_env_over_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("sbomer.toml");
    tokio::fs::write(&path, "[fetcher]\nbatch_size = 20\ncool_off_secs = 1\n")
        .await
        .expect("write config");

    // SAFETY: env tests are serialised
    unsafe { std::env::set_var("SBOMER_FETCHER_BATCH_SIZE", "50") };
    let loaded = SbomerConfig::load(&path).await;
    unsafe { std::env::remove_var("SBOMER_FETCHER_BATCH_SIZE") };

    let config = loaded.expect("load");
    assert_eq!(config.fetcher.batch_size, 50);
    assert_eq!(config.fetcher.cool_off_secs, 1);
}

#[tokio::test]
#[serial]
async fn load_rejects_env_value_that_fails_validation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("sbomer.toml");
    tokio::fs::write(&path, "").await.expect("write config");

    unsafe { std::env::set_var("SBOMER_QUEUE_DISCOVERY_PREFETCH", "0") };
    let loaded = SbomerConfig::load(&path).await;
    unsafe { std::env::remove_var("SBOMER_QUEUE_DISCOVERY_PREFETCH") };

    let err = loaded.expect_err("prefetch 0 must be rejected");
    assert!(matches!(
        err,
        SbomerError::Config(ConfigError::InvalidValue { .. })
    ));
}

#[tokio::test]
async fn malformed_file_is_a_parse_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("sbomer.toml");
    tokio::fs::write(&path, "[fetcher\nbatch_size = ")
        .await
        .expect("write config");

    let err = SbomerConfig::from_file(&path).await.unwrap_err();
    assert!(matches!(
        err,
        SbomerError::Config(ConfigError::ParseFailed { .. })
    ));
}
