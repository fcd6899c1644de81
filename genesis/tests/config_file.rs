use genesis::config::GenesisConfig;
use genesis::GenesisError;
use pretty_assertions::assert_eq;
use std::path::PathBuf;

#[test]
fn partial_file_keeps_defaults_for_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("genesis.toml");
    std::fs::write(
        &path,
        r#"
[discovery]
roots = ["./components"]
max_workers = 2

[converter]
compliance = true
deadline_ms = 1500
"#,
    )
    .unwrap();

    let config = GenesisConfig::load(&path).unwrap();
    assert_eq!(config.discovery.roots, vec![PathBuf::from("./components")]);
    assert_eq!(config.discovery.max_workers, 2);
    assert!(config.discovery.parallel);
    assert!(config.converter.compliance);
    assert_eq!(config.converter.deadline_ms, Some(1500));
    assert_eq!(config.cache, GenesisConfig::default().cache);
    assert!(config.validate().is_empty());
}

#[test]
fn missing_file_means_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = GenesisConfig::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, GenesisConfig::default());
}

#[test]
fn malformed_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("genesis.toml");
    std::fs::write(&path, "[discovery\nroots = 3").unwrap();

    match GenesisConfig::load(&path) {
        Err(GenesisError::Config(message)) => assert!(message.contains("Failed to parse")),
        other => panic!("expected a config error, got {:?}", other),
    }
}

#[test]
fn written_defaults_load_back_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("genesis.toml");
    std::fs::write(&path, GenesisConfig::default().to_toml_string().unwrap()).unwrap();
    assert_eq!(GenesisConfig::load(&path).unwrap(), GenesisConfig::default());
}
