use meetrec::cli::{api_port, load_config};
use meetrec::config::Config;
use meetrec::detection::Confidence;

#[test]
fn test_saved_config_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = Config::default();
    config.detection.start_threshold = 4;
    config.detection.min_confidence = Confidence::High;
    config.obs.password = Some("secret".to_string());
    config.save_to(&path).unwrap();

    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded.detection.start_threshold, 4);
    assert_eq!(loaded.detection.min_confidence, Confidence::High);
    assert_eq!(loaded.obs.password.as_deref(), Some("secret"));
    assert_eq!(loaded.rules.len(), config.rules.len());
}

#[test]
fn test_invalid_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[detection]\nstop_threshold = 0\n").unwrap();

    assert!(Config::load_from(&path).is_err());
    assert!(load_config(Some(&path)).is_err());
}

#[test]
fn test_api_port_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[api]\nport = 4747\n").unwrap();

    assert_eq!(api_port(Some(&path), None).unwrap(), 4747);
}

#[test]
fn test_missing_file_is_created_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("meetrec").join("config.toml");

    let config = Config::load_or_create(&path).unwrap();
    assert!(path.exists());
    assert_eq!(config.detection.stop_threshold, 6);

    let reloaded = Config::load_from(&path).unwrap();
    assert_eq!(reloaded.api.port, config.api.port);
}
