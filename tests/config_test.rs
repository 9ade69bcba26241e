//! Integration tests for configuration loading

use geoguard::domain::types::{Role, SubjectId};
use geoguard::infra::Config;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[site]
id = "test-site"

[http]
bind_address = "127.0.0.1"
port = 9090

[monitor]
status_ttl_secs = 900
channel_capacity = 128

[rate_limit]
window_secs = 30

[notify]
enabled = true
url = "http://localhost:9100/push"
timeout_ms = 1500

[metrics]
interval_secs = 15

[[auth.tokens]]
token = "test-officer"
role = "officer"
subject = "officer-7"

[[zones]]
name = "Test Zone"
lat = 12.9716
lng = 77.5946
radius_m = 500
alert_threshold_secs = 120
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "test-site");
    assert_eq!(config.http_bind_address(), "127.0.0.1");
    assert_eq!(config.http_port(), 9090);
    assert_eq!(config.status_ttl_secs(), 900);
    assert_eq!(config.channel_capacity(), 128);
    assert_eq!(config.rate_window_secs(), 30);
    assert!(config.notify_enabled());
    assert_eq!(config.notify_url(), "http://localhost:9100/push");
    assert_eq!(config.metrics_interval_secs(), 15);

    let actor = &config.auth_tokens()["test-officer"];
    assert_eq!(actor.id, SubjectId::from("officer-7"));
    assert_eq!(actor.role, Role::Officer);

    assert_eq!(config.seed_zones().len(), 1);
    assert_eq!(config.seed_zones()[0].name, "Test Zone");
    assert_eq!(config.seed_zones()[0].alert_threshold_secs, 120);
}

#[test]
fn test_missing_sections_use_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[site]\nid = \"minimal\"\n").unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "minimal");
    assert_eq!(config.http_port(), 8080);
    assert_eq!(config.rate_window_secs(), 60);
    assert_eq!(config.status_ttl_secs(), 3600);
    assert!(!config.notify_enabled());
    assert!(config.seed_zones().is_empty());
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.http_port(), 8080);
    assert_eq!(config.rate_window_secs(), 60);
    assert!(config.auth_tokens().is_empty());
}
