use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;

use kira_assembly_metadata::config::{ConfigLoader, ConfigOverrides};
use kira_assembly_metadata::error::KiraError;

#[test]
fn explicit_config_file_is_read() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("custom.json");
    fs::write(
        &path,
        r#"{"delay_secs": 0.5, "timeout_secs": 12, "datasets_bin": "/opt/ncbi/datasets"}"#,
    )
    .unwrap();

    let resolved =
        ConfigLoader::resolve(path.to_str(), &ConfigOverrides::default()).unwrap();
    assert_eq!(resolved.delay, Duration::from_millis(500));
    assert_eq!(resolved.timeout, Duration::from_secs(12));
    assert_eq!(
        resolved.datasets_bin.as_deref(),
        Some(std::path::Path::new("/opt/ncbi/datasets"))
    );
    assert!(resolved.dataformat_bin.is_none());
}

#[test]
fn cli_delay_beats_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("custom.json");
    fs::write(&path, r#"{"delay_secs": 3.0}"#).unwrap();
    let overrides = ConfigOverrides {
        email: None,
        delay_secs: Some(0.1),
    };
    let resolved = ConfigLoader::resolve(path.to_str(), &overrides).unwrap();
    assert_eq!(resolved.delay, Duration::from_millis(100));
}

#[test]
fn missing_explicit_config_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    let result = ConfigLoader::resolve(path.to_str(), &ConfigOverrides::default());
    assert_matches!(result, Err(KiraError::ConfigRead(_)));
}

#[test]
fn malformed_config_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("broken.json");
    fs::write(&path, "{ not json").unwrap();
    let result = ConfigLoader::resolve(path.to_str(), &ConfigOverrides::default());
    assert_matches!(result, Err(KiraError::ConfigParse(_)));
}

#[test]
fn huge_file_delay_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("custom.json");
    fs::write(&path, r#"{"delay_secs": 1e20}"#).unwrap();
    let result = ConfigLoader::resolve(path.to_str(), &ConfigOverrides::default());
    assert_matches!(result, Err(KiraError::InvalidDelay(_)));
}

#[test]
fn negative_delay_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("custom.json");
    fs::write(&path, "{}").unwrap();
    let overrides = ConfigOverrides {
        email: None,
        delay_secs: Some(-1.0),
    };
    let result = ConfigLoader::resolve(path.to_str(), &overrides);
    assert_matches!(result, Err(KiraError::InvalidDelay(_)));
}
