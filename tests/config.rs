use graphite::config::{Backend, Settings};
use std::io::Write;

#[test]
fn missing_file_keeps_the_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("absent.toml");
    let settings = Settings::load_from(&missing.to_string_lossy()).expect("settings");
    assert_eq!(settings.database.backend, Backend::Sqlite);
    assert_eq!(settings.database.path, None);
    assert_eq!(settings.database.namespace, ":db");
    assert_eq!(settings.server.bind, "127.0.0.1:8470");
    assert_eq!(settings.log.filter, "info");
}

#[test]
fn file_overrides_the_defaults() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("tempfile");
    writeln!(
        file,
        r#"
[database]
backend = "memory"
namespace = ":app"

[server]
bind = "0.0.0.0:9000"
"#
    )
    .expect("write");
    let settings = Settings::load_from(&file.path().to_string_lossy()).expect("settings");
    assert_eq!(settings.database.backend, Backend::Memory);
    assert_eq!(settings.database.namespace, ":app");
    assert_eq!(settings.server.bind, "0.0.0.0:9000");
    assert_eq!(settings.log.filter, "info");
}

#[test]
fn unknown_backend_is_a_config_error() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("tempfile");
    writeln!(file, "[database]\nbackend = \"postgres\"").expect("write");
    let result = Settings::load_from(&file.path().to_string_lossy());
    assert!(matches!(result, Err(graphite::GraphiteError::Config(_))));
}
