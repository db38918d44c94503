use std::sync::Mutex;

use super::*;

// Env vars are process-global; serialize the handful of tests that touch them.
static ENV_GUARD: Mutex<()> = Mutex::new(());

#[test]
fn defaults_satisfy_validation() {
    let config = Config::try_from(RawConfig::default()).expect("defaults should validate");
    assert_eq!(config.heartbeat_timeout_seconds, 60);
    assert_eq!(config.audio_chunk_bytes, 10 * 1024 * 1024);
    assert_eq!(config.session_expiration_minutes, 60);
    assert_eq!(config.rolling_refresh_minutes, 10);
    assert_eq!(config.log.format, LogFormat::Pretty);
}

#[test]
fn rejects_session_expiration_below_minimum() {
    let mut raw = RawConfig::default();
    raw.session_expiration_minutes = Some(10);
    let err = Config::try_from(raw).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn rejects_rolling_refresh_above_four_tenths_of_session_expiration() {
    let mut raw = RawConfig::default();
    raw.session_expiration_minutes = Some(60);
    raw.rolling_refresh_minutes = Some(25);
    let err = Config::try_from(raw).unwrap_err();
    let ConfigError::Invalid(messages) = err else {
        unreachable!("expected Invalid");
    };
    assert!(messages.iter().any(|m| m.contains("rolling_refresh_minutes")));
}

#[test]
fn collects_every_violated_constraint_at_once() {
    let mut raw = RawConfig::default();
    raw.session_expiration_minutes = Some(1);
    raw.rolling_refresh_minutes = Some(100);
    raw.cleanup.user_retention_days = Some(5);
    let ConfigError::Invalid(messages) = Config::try_from(raw).unwrap_err() else {
        unreachable!("expected Invalid");
    };
    assert_eq!(messages.len(), 3);
}

#[test]
fn user_retention_days_below_ninety_is_rejected_but_absent_is_fine() {
    let mut raw = RawConfig::default();
    raw.cleanup.user_retention_days = Some(30);
    assert!(Config::try_from(raw).is_err());

    let raw_absent = RawConfig::default();
    assert!(Config::try_from(raw_absent).is_ok());
}

#[test]
fn env_overrides_take_precedence_over_the_file() {
    let _guard = ENV_GUARD.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    std::env::set_var("TRANSCRIPTORD_HEARTBEAT_TIMEOUT_SECONDS", "30");
    std::env::set_var("TRANSCRIPTORD_LOG__FORMAT", "json");

    let mut raw = RawConfig::default();
    raw.heartbeat_timeout_seconds = Some(60);
    apply_env_overrides(&mut raw);

    std::env::remove_var("TRANSCRIPTORD_HEARTBEAT_TIMEOUT_SECONDS");
    std::env::remove_var("TRANSCRIPTORD_LOG__FORMAT");

    assert_eq!(raw.heartbeat_timeout_seconds, Some(30));
    assert_eq!(raw.log.format.as_deref(), Some("json"));
}

#[test]
fn unset_env_vars_leave_the_file_value_untouched() {
    let _guard = ENV_GUARD.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    std::env::remove_var("TRANSCRIPTORD_DATABASE__HOST");

    let mut raw = RawConfig::default();
    raw.database.host = Some("from-file.example".to_string());
    apply_env_overrides(&mut raw);

    assert_eq!(raw.database.host.as_deref(), Some("from-file.example"));
}

#[test]
fn reads_the_first_existing_file_on_the_search_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        "heartbeat_timeout_seconds = 45\n[database]\nhost = \"db.example\"\n",
    )
    .expect("write config file");

    let raw = read_first_existing_file(&[config_path]).expect("parse config file");
    assert_eq!(raw.heartbeat_timeout_seconds, Some(45));
    assert_eq!(raw.database.host.as_deref(), Some("db.example"));
}

#[test]
fn missing_files_on_the_search_path_fall_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("does-not-exist.toml");

    let raw = read_first_existing_file(&[missing]).expect("default when nothing exists");
    assert!(raw.heartbeat_timeout_seconds.is_none());
}

#[test]
fn rejects_malformed_toml() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = dir.path().join("config.toml");
    std::fs::write(&config_path, "this is not valid toml = = =").expect("write config file");

    let err = read_first_existing_file(&[config_path]).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}
