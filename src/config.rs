use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Recorder behavior: enable flags plus the comma-separated lists that
/// control redaction and header logging.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecorderConfig {
    /// Master switch. When false the middleware passes requests through
    /// untouched and `track!` returns false.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-entry elapsed timers in the trace stack. Each push costs a clock
    /// read, so timing can be turned off independently.
    #[serde(default = "default_true")]
    pub stack_timers_enabled: bool,

    /// Comma-separated JSON keys whose values are masked before persisting.
    #[serde(default = "default_password_keys")]
    pub password_keys: String,

    /// Comma-separated request header names copied into the logged record.
    #[serde(default = "default_headers_to_log")]
    pub headers_to_log: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stack_timers_enabled: true,
            password_keys: default_password_keys(),
            headers_to_log: default_headers_to_log(),
        }
    }
}

impl RecorderConfig {
    /// Denylist keys, trimmed, empties removed. Matching is case-sensitive.
    pub fn password_keys(&self) -> Vec<String> {
        split_csv(&self.password_keys)
    }

    /// Header allowlist, trimmed and lowercased.
    pub fn headers_to_log(&self) -> Vec<String> {
        split_csv(&self.headers_to_log)
            .into_iter()
            .map(|h| h.to_ascii_lowercase())
            .collect()
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: i64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Enable periodic deletion of old records (default: false).
    #[serde(default)]
    pub enabled: bool,

    /// Days of request/trace history to keep.
    #[serde(default = "default_retention_days")]
    pub days: u64,

    /// Hour of day (0-23, UTC) at which the cleanup pass runs.
    #[serde(default = "default_cleanup_hour")]
    pub cleanup_hour: u8,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            days: default_retention_days(),
            cleanup_hour: default_cleanup_hour(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_password_keys() -> String {
    "password,repeat_password,password_repeat,again_password,password_again".to_string()
}

fn default_headers_to_log() -> String {
    "x-authorization,user-agent".to_string()
}

fn default_database_path() -> String {
    "./data/wiretap.db".to_string()
}

fn default_page_size() -> i64 {
    10
}

fn default_retention_days() -> u64 {
    30
}

fn default_cleanup_hour() -> u8 {
    3
}

/// Load configuration from an optional file plus WIRETAP__-prefixed
/// environment variables. A missing file is fine; defaults cover everything.
pub fn load_config(path: &str) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(config::Environment::with_prefix("WIRETAP").separator("__"))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.api.default_page_size < 1 {
        anyhow::bail!("api.default_page_size must be >= 1");
    }
    if cfg.retention.cleanup_hour > 23 {
        anyhow::bail!("retention.cleanup_hour must be between 0 and 23");
    }
    if cfg.retention.enabled && cfg.retention.days == 0 {
        anyhow::bail!("retention.days must be >= 1 when retention is enabled");
    }
    if cfg.database.path.trim().is_empty() {
        anyhow::bail!("database.path cannot be empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = Config::default();
        assert!(validate_config(&cfg).is_ok());
        assert!(cfg.recorder.enabled);
        assert!(cfg.recorder.stack_timers_enabled);
        assert_eq!(cfg.api.default_page_size, 10);
    }

    #[test]
    fn test_password_keys_are_trimmed() {
        let recorder = RecorderConfig {
            password_keys: " password , secret_token ,".to_string(),
            ..RecorderConfig::default()
        };
        assert_eq!(recorder.password_keys(), vec!["password", "secret_token"]);
    }

    #[test]
    fn test_headers_to_log_lowercased() {
        let recorder = RecorderConfig {
            headers_to_log: "X-Authorization, User-Agent".to_string(),
            ..RecorderConfig::default()
        };
        assert_eq!(
            recorder.headers_to_log(),
            vec!["x-authorization", "user-agent"]
        );
    }

    #[test]
    fn test_validate_rejects_bad_cleanup_hour() {
        let mut cfg = Config::default();
        cfg.retention.cleanup_hour = 24;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let mut cfg = Config::default();
        cfg.api.default_page_size = 0;
        assert!(validate_config(&cfg).is_err());
    }
}
