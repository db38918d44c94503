//! Layered configuration (SPEC §6 "Configuration surface").
//!
//! Load order, lowest to highest precedence: compiled-in defaults, the first
//! of `/etc/transcriptord/config.toml`, `~/.config/transcriptord/config.toml`,
//! `./config.toml` that exists, then environment variables prefixed
//! `TRANSCRIPTORD_` (double underscore as a section separator, e.g.
//! `TRANSCRIPTORD_DATABASE__HOST`). Validation is eager and exhaustive: every
//! violated constraint is collected, not just the first (SPEC §6).

use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use transcriptord_cache::EphemeralStoreConfig;
use transcriptord_storage::DurableStoreConfig;

const ENV_PREFIX: &str = "TRANSCRIPTORD_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path} as TOML: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration:\n{}", .0.join("\n"))]
    Invalid(Vec<String>),
}

/// Raw, pre-validation shape straight off TOML deserialization. Every field
/// is optional so a partial file (or no file at all) is legal; defaulting
/// and validation happen in [`Config::try_from`].
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    heartbeat_timeout_seconds: Option<u64>,
    audio_chunk_bytes: Option<usize>,
    session_expiration_minutes: Option<u64>,
    rolling_refresh_minutes: Option<u64>,
    cleanup: RawCleanupConfig,
    database: RawDatabaseConfig,
    redis: RawRedisConfig,
    http: RawHttpConfig,
    log: RawLogConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCleanupConfig {
    finished_job_retention_days: Option<u32>,
    user_retention_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDatabaseConfig {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    dbname: Option<String>,
    schema: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRedisConfig {
    connection_string: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawHttpConfig {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawLogConfig {
    level: Option<String>,
    format: Option<String>,
}

/// Log output format (SPEC §6 `log.format`): `pretty` for local development,
/// `json` for production, wired through `tracing-subscriber`'s format layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

/// The validated, fully-defaulted configuration surface (SPEC §6).
#[derive(Debug, Clone)]
pub struct Config {
    pub heartbeat_timeout_seconds: u64,
    pub audio_chunk_bytes: usize,
    pub session_expiration_minutes: u64,
    pub rolling_refresh_minutes: u64,
    pub finished_job_retention_days: Option<u32>,
    pub user_retention_days: Option<u32>,
    pub database: DurableStoreConfig,
    pub redis: EphemeralStoreConfig,
    pub http: HttpConfig,
    pub log: LogConfig,
}

impl Config {
    /// Reads the first config file on the search path (if any), merges
    /// environment overrides, validates, and returns the ready-to-use
    /// configuration.
    pub fn load() -> Result<Self, ConfigError> {
        let mut raw = read_first_existing_file(&search_path())?;
        apply_env_overrides(&mut raw);
        Self::try_from(raw)
    }

    pub fn heartbeat_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.heartbeat_timeout_seconds)
    }

    /// The all-defaults configuration, for wiring an [`crate::context::AppContext`]
    /// onto in-memory store doubles in tests (SPEC §6 defaults).
    #[cfg(feature = "test-support")]
    pub fn for_test() -> Self {
        #[allow(clippy::unwrap_used)]
        Self::try_from(RawConfig::default()).unwrap()
    }
}

impl TryFrom<RawConfig> for Config {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, ConfigError> {
        let mut errors = Vec::new();

        let heartbeat_timeout_seconds = raw.heartbeat_timeout_seconds.unwrap_or(60);
        let audio_chunk_bytes = raw.audio_chunk_bytes.unwrap_or(10 * 1024 * 1024);
        let session_expiration_minutes = raw.session_expiration_minutes.unwrap_or(60);
        let rolling_refresh_minutes = raw.rolling_refresh_minutes.unwrap_or(10);

        if session_expiration_minutes < 15 {
            errors.push(format!(
                "session_expiration_minutes must be >= 15, got {session_expiration_minutes}"
            ));
        }
        if (rolling_refresh_minutes as f64) > 0.4 * session_expiration_minutes as f64 {
            errors.push(format!(
                "rolling_refresh_minutes ({rolling_refresh_minutes}) must be <= 0.4 * session_expiration_minutes ({session_expiration_minutes})"
            ));
        }
        if let Some(days) = raw.cleanup.user_retention_days {
            if days < 90 {
                errors.push(format!(
                    "cleanup.user_retention_days must be >= 90 when set, got {days}"
                ));
            }
        }
        if audio_chunk_bytes == 0 {
            errors.push("audio_chunk_bytes must be greater than zero".to_string());
        }

        let database = DurableStoreConfig {
            host: raw.database.host.unwrap_or_else(|| "localhost".to_string()),
            port: raw.database.port.unwrap_or(5432),
            user: raw.database.user.unwrap_or_else(|| "transcriptord".to_string()),
            password: raw.database.password.unwrap_or_default(),
            dbname: raw.database.dbname.unwrap_or_else(|| "transcriptord".to_string()),
            schema: raw.database.schema.unwrap_or_else(|| "public".to_string()),
            audio_chunk_bytes,
        };

        let redis = EphemeralStoreConfig {
            connection_string: raw
                .redis
                .connection_string
                .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),
        };

        let http = HttpConfig {
            bind_address: raw.http.bind_address.unwrap_or_else(|| "0.0.0.0".to_string()),
            port: raw.http.port.unwrap_or(8080),
        };

        let log_format = match raw.log.format.as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                errors.push(format!("log.format must be \"pretty\" or \"json\", got {other:?}"));
                LogFormat::Pretty
            }
        };
        let log = LogConfig {
            level: raw.log.level.unwrap_or_else(|| "info".to_string()),
            format: log_format,
        };

        if !errors.is_empty() {
            return Err(ConfigError::Invalid(errors));
        }

        Ok(Config {
            heartbeat_timeout_seconds,
            audio_chunk_bytes,
            session_expiration_minutes,
            rolling_refresh_minutes,
            finished_job_retention_days: raw.cleanup.finished_job_retention_days,
            user_retention_days: raw.cleanup.user_retention_days,
            database,
            redis,
            http,
            log,
        })
    }
}

fn search_path() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/transcriptord/config.toml")];
    if let Some(home) = std::env::var_os("HOME") {
        paths.push(PathBuf::from(home).join(".config/transcriptord/config.toml"));
    }
    paths.push(PathBuf::from("./config.toml"));
    paths
}

fn read_first_existing_file(paths: &[PathBuf]) -> Result<RawConfig, ConfigError> {
    for path in paths {
        if !path.exists() {
            continue;
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        return toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        });
    }
    Ok(RawConfig::default())
}

/// Overlays `TRANSCRIPTORD_`-prefixed environment variables onto `raw`, env
/// taking precedence over whatever the file supplied (SPEC §6).
fn apply_env_overrides(raw: &mut RawConfig) {
    macro_rules! env_u64 {
        ($key:expr, $field:expr) => {
            if let Some(v) = env_var($key).and_then(|s| s.parse().ok()) {
                $field = Some(v);
            }
        };
    }
    macro_rules! env_string {
        ($key:expr, $field:expr) => {
            if let Some(v) = env_var($key) {
                $field = Some(v);
            }
        };
    }

    env_u64!("HEARTBEAT_TIMEOUT_SECONDS", raw.heartbeat_timeout_seconds);
    env_u64!("AUDIO_CHUNK_BYTES", raw.audio_chunk_bytes);
    env_u64!("SESSION_EXPIRATION_MINUTES", raw.session_expiration_minutes);
    env_u64!("ROLLING_REFRESH_MINUTES", raw.rolling_refresh_minutes);
    env_u64!("CLEANUP__FINISHED_JOB_RETENTION_DAYS", raw.cleanup.finished_job_retention_days);
    env_u64!("CLEANUP__USER_RETENTION_DAYS", raw.cleanup.user_retention_days);

    env_string!("DATABASE__HOST", raw.database.host);
    env_u64!("DATABASE__PORT", raw.database.port);
    env_string!("DATABASE__USER", raw.database.user);
    env_string!("DATABASE__PASSWORD", raw.database.password);
    env_string!("DATABASE__DBNAME", raw.database.dbname);
    env_string!("DATABASE__SCHEMA", raw.database.schema);

    env_string!("REDIS__CONNECTION_STRING", raw.redis.connection_string);

    env_string!("HTTP__BIND_ADDRESS", raw.http.bind_address);
    env_u64!("HTTP__PORT", raw.http.port);

    env_string!("LOG__LEVEL", raw.log.level);
    env_string!("LOG__FORMAT", raw.log.format);
}

fn env_var(suffix: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{suffix}")).ok()
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
