//! Integration tests for warden-config

use std::io::Write;
use std::path::PathBuf;
use temp_env::with_vars;
use warden_config::*;

const UNSET: [(&str, Option<&str>); 6] = [
    ("WARDEN_PROCS", None),
    ("WARDEN_THREADS", None),
    ("WARDEN_ENGINE_EXE", None),
    ("WARDEN_ENGINE_NAME", None),
    ("WARDEN_LOG_LEVEL", None),
    ("WARDEN_LOG_FORMAT", None),
];

#[test]
fn test_default_config_validation() {
    let config = WardenConfig::default();
    assert!(config.validate_all().is_ok());
}

#[test]
fn test_config_loader_from_env() {
    let vars = vec![
        ("WARDEN_PROCS", Some("4")),
        ("WARDEN_THREADS", None),
        ("WARDEN_ENGINE_EXE", Some("/opt/engine/bin/engine")),
        ("WARDEN_ENGINE_NAME", None),
        ("WARDEN_LOG_LEVEL", Some("debug")),
        ("WARDEN_LOG_FORMAT", Some("json")),
    ];

    with_vars(vars, || {
        let config = ConfigLoader::new().from_env().unwrap();

        assert_eq!(config.execution.procs, 4);
        assert_eq!(config.execution.threads, 1);
        assert_eq!(
            config.engine.executable,
            Some(PathBuf::from("/opt/engine/bin/engine"))
        );
        assert_eq!(config.engine.search_name, DEFAULT_ENGINE_NAME);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
    });
}

#[test]
fn test_invalid_env_value() {
    let mut vars = UNSET.to_vec();
    vars[0] = ("WARDEN_PROCS", Some("many"));

    with_vars(vars, || {
        let err = ConfigLoader::new().from_env().unwrap_err();
        assert!(matches!(err, ConfigError::EnvError(_)));
    });
}

#[test]
fn test_conflicting_fan_out_from_env() {
    let mut vars = UNSET.to_vec();
    vars[0] = ("WARDEN_PROCS", Some("2"));
    vars[1] = ("WARDEN_THREADS", Some("2"));

    with_vars(vars, || {
        let err = ConfigLoader::new().from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ConflictingFanOut {
                threads: 2,
                procs: 2
            }
        ));
    });
}

#[test]
fn test_custom_prefix() {
    with_vars(vec![("SIM_PROCS", Some("3"))], || {
        let config = ConfigLoader::with_prefix("SIM").from_env().unwrap();
        assert_eq!(config.execution.procs, 3);
    });
}

#[test]
fn test_yaml_config_from_file() {
    let yaml = r#"
engine:
  search_name: "engine-cpp"
  protocol_version: "1.2.3"

execution:
  threads: 8
  ignore_warnings: true
  raise_on_error: false

logging:
  level: warn
  format: compact
"#;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    with_vars(UNSET.to_vec(), || {
        let config = ConfigLoader::new().load(Some(file.path())).unwrap();

        assert_eq!(config.engine.search_name, "engine-cpp");
        assert_eq!(config.engine.protocol_version.as_deref(), Some("1.2.3"));
        assert_eq!(config.execution.threads, 8);
        assert_eq!(config.execution.procs, 1);
        assert!(config.execution.ignore_warnings);
        assert!(!config.execution.raise_on_error);
        assert_eq!(config.logging.level, LogLevel::Warn);
        assert_eq!(config.logging.format, LogFormat::Compact);
    });
}

#[test]
fn test_env_overrides_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"execution:\n  procs: 2\n").unwrap();

    let mut vars = UNSET.to_vec();
    vars[0] = ("WARDEN_PROCS", Some("6"));

    with_vars(vars, || {
        let config = ConfigLoader::new().from_file(file.path()).unwrap();
        assert_eq!(config.execution.procs, 6);
    });
}

#[test]
fn test_missing_file() {
    let err = ConfigLoader::new()
        .from_file("/nonexistent/warden.yaml")
        .unwrap_err();
    assert!(matches!(err, ConfigError::FileReadError(_)));
}

#[test]
fn test_sample_round_trips() {
    let sample = WardenConfig::generate_sample();
    let parsed: WardenConfig = serde_yaml::from_str(&sample).unwrap();
    assert!(parsed.validate_all().is_ok());
    assert_eq!(parsed.execution.procs, 1);
}
