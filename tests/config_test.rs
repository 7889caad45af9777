//! Integration tests for configuration loading

use garage_watch::domain::StateVocabulary;
use garage_watch::infra::Config;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[source]
url = "http://door.local/events"
entity_id = "cover-garage"
cycle_timeout_secs = 600
vocabulary = "extended"

[supervisor]
quick_failure_window_secs = 30
max_quick_failures = 5
cooldown_secs = 120

[events]
channel_capacity = 4

[webhooks]
open_url = "http://hook:pw@automation.local/open"
close_url = "http://automation.local/close"
timeout_ms = 5000

[actions]
wait_timeout_secs = 45

[metrics]
interval_secs = 15
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.source_url(), "http://door.local/events");
    assert_eq!(config.entity_id(), "cover-garage");
    assert_eq!(config.cycle_timeout_secs(), 600);
    assert_eq!(config.vocabulary(), StateVocabulary::Extended);
    assert_eq!(config.quick_failure_window_secs(), 30);
    assert_eq!(config.max_quick_failures(), 5);
    assert_eq!(config.cooldown_secs(), 120);
    assert_eq!(config.channel_capacity(), 4);
    assert_eq!(config.webhook_open_url(), Some("http://hook:pw@automation.local/open"));
    assert_eq!(config.webhook_close_url(), Some("http://automation.local/close"));
    assert_eq!(config.webhook_timeout_ms(), 5000);
    assert_eq!(config.wait_timeout_secs(), 45);
    assert_eq!(config.metrics_interval_secs(), 15);
    assert_eq!(config.config_file(), temp_file.path().display().to_string());
}

#[test]
fn test_minimal_config_uses_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[source]\nurl = \"http://door.local/events\"\n").unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config.entity_id(), "cover-door");
    assert_eq!(config.vocabulary(), StateVocabulary::Strict);
    assert_eq!(config.max_quick_failures(), 3);
    assert_eq!(config.channel_capacity(), 1);
    assert_eq!(config.webhook_open_url(), None);
}

#[test]
fn test_invalid_file_is_an_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[source]\nurl = 42\n").unwrap();
    temp_file.flush().unwrap();

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse config file"));
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.entity_id(), "cover-door");
    assert_eq!(config.cycle_timeout_secs(), 3600);
    assert_eq!(config.config_file(), "default");
}
