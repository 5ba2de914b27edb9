use super::settings::Settings;
use super::{load_config_from, HubSettings};

use std::fs;

use serial_test::serial;
use tempfile::TempDir;

fn write_config(dir: &TempDir, body: &str) -> String {
    let path = dir.path().join("chathub.toml");
    fs::write(&path, body).expect("write config file");
    path.to_str().expect("utf-8 temp path").to_string()
}

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.server.path, "/chathub");
    assert_eq!(settings.server.handshake_timeout_ms, 5000);
    assert_eq!(settings.hub.max_connections, 1000);
    assert!(settings.hub.deliver_to_sender);
    assert_eq!(settings.hub.outbound_buffer, 256);
    assert_eq!(settings.logging.level, "info");
    assert_eq!(settings.server.addr(), "127.0.0.1:8080");
}

#[test]
#[serial]
fn test_missing_file_yields_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("nope");
    let settings = load_config_from(path.to_str().unwrap()).expect("load config");
    assert_eq!(settings, Settings::default());
}

#[test]
#[serial]
fn test_file_overrides_only_given_fields() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = write_config(
        &tmp,
        r#"
            [server]
            port = 9000

            [hub]
            max_connections = 2
            deliver_to_sender = false
        "#,
    );

    let settings = load_config_from(&path).expect("load config");
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 9000);
    assert_eq!(
        settings.hub,
        HubSettings {
            max_connections: 2,
            deliver_to_sender: false,
            outbound_buffer: 256,
        }
    );
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = write_config(
        &tmp,
        r#"
            [hub]
            max_connections = 2
        "#,
    );

    temp_env::with_vars(
        [
            ("CHATHUB__HUB__MAX_CONNECTIONS", Some("50")),
            ("CHATHUB__LOGGING__LEVEL", Some("debug")),
        ],
        || {
            let settings = load_config_from(&path).expect("load config");
            assert_eq!(settings.hub.max_connections, 50);
            assert_eq!(settings.logging.level, "debug");
        },
    );
}

#[test]
#[serial]
fn test_zero_outbound_buffer_is_rejected() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = write_config(
        &tmp,
        r#"
            [hub]
            outbound_buffer = 0
        "#,
    );

    assert!(load_config_from(&path).is_err());
}

#[test]
fn test_validate_rejects_unusable_values() {
    let mut settings = Settings::default();
    assert!(settings.validate().is_ok());

    settings.hub.outbound_buffer = 0;
    assert!(settings.validate().is_err());

    settings.hub.outbound_buffer = 1;
    settings.server.path = "chathub".to_string();
    assert!(settings.validate().is_err());
}
