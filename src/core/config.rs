//! Configuration management for the portal shell
//!
//! Defaults cover a local two-remote portal. A `portal-shell.toml` in the
//! working directory replaces them, then `PB_*` environment variables
//! override single values, then the result is validated.

use portal_bridge_core::{Error, Result, ThemeMode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Default configuration file looked up by [`PortalConfig::load`]
pub const DEFAULT_CONFIG_FILE: &str = "portal-shell.toml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Host shell settings
    pub shell: ShellConfig,

    /// Remote applications the shell can mount
    pub remotes: Vec<RemoteConfig>,

    /// Streaming reconnection policy
    pub streaming: StreamingConfig,

    /// Shared API client
    pub api: ApiConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Host shell configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Name used in log lines
    pub name: String,

    /// Theme preference before the user picks one
    pub default_theme: ThemeMode,

    /// Host path the shell starts on
    pub initial_path: String,

    /// Budget for a remote's initial auth/theme sync
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub sync_timeout: Duration,

    /// Markup rendered into a container whose remote failed to mount
    pub fallback_html: String,
}

/// One remote application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Name the loader resolves
    pub name: String,

    /// Entry point of the remote bundle
    pub entry: String,

    /// Value written to `data-service` while the remote is in front
    pub data_service: String,

    /// Host route prefix owned by the remote, e.g. `/shopping`
    pub route_prefix: String,

    /// Keep the instance alive (deactivate instead of unmount) when hidden
    #[serde(default)]
    pub keep_alive: bool,
}

/// Streaming reconnection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Fixed delay between reconnection attempts
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub retry_delay: Duration,

    /// Attempts before giving up on a resource
    pub max_attempts: u32,

    /// Capacity of the event channel
    pub event_buffer: usize,
}

/// Shared API client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL every request path is joined onto
    pub base_url: String,

    /// Per-request timeout
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub timeout: Duration,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty)
    pub format: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            shell: ShellConfig::default(),
            remotes: vec![
                RemoteConfig {
                    name: "shopping".to_string(),
                    entry: "http://localhost:5174/remoteEntry.js".to_string(),
                    data_service: "shopping".to_string(),
                    route_prefix: "/shopping".to_string(),
                    keep_alive: true,
                },
                RemoteConfig {
                    name: "blog".to_string(),
                    entry: "http://localhost:5173/remoteEntry.js".to_string(),
                    data_service: "blog".to_string(),
                    route_prefix: "/blog".to_string(),
                    keep_alive: false,
                },
            ],
            streaming: StreamingConfig::default(),
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            name: "portal-shell".to_string(),
            default_theme: ThemeMode::System,
            initial_path: "/".to_string(),
            sync_timeout: Duration::from_secs(3),
            fallback_html: r#"<div class="mf-fallback">This service is temporarily unavailable.</div>"#
                .to_string(),
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(5),
            max_attempts: 5,
            event_buffer: 256,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl PortalConfig {
    /// Load configuration from the default file and environment variables
    pub fn load() -> Result<Self> {
        let mut config = if Path::new(DEFAULT_CONFIG_FILE).exists() {
            Self::from_file(DEFAULT_CONFIG_FILE)?
        } else {
            PortalConfig::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| Error::config(format!("Failed to parse config file: {}", e)))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `PB_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("PB_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = lookup("PB_LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Some(url) = lookup("PB_API_BASE_URL") {
            self.api.base_url = url;
        }

        if let Some(timeout) = lookup("PB_SYNC_TIMEOUT") {
            self.shell.sync_timeout = parse_duration(&timeout)
                .map_err(|e| Error::config(format!("Invalid sync timeout: {}", e)))?;
        }

        if let Some(delay) = lookup("PB_RETRY_DELAY") {
            self.streaming.retry_delay = parse_duration(&delay)
                .map_err(|e| Error::config(format!("Invalid retry delay: {}", e)))?;
        }

        if let Some(attempts) = lookup("PB_MAX_ATTEMPTS") {
            self.streaming.max_attempts = attempts
                .parse()
                .map_err(|e| Error::config(format!("Invalid max attempts: {}", e)))?;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        let mut prefixes = HashSet::new();

        for remote in &self.remotes {
            if remote.name.is_empty() {
                return Err(Error::config("Remote name must not be empty"));
            }
            if !names.insert(remote.name.as_str()) {
                return Err(Error::config(format!("Duplicate remote '{}'", remote.name)));
            }
            if !remote.route_prefix.starts_with('/') {
                return Err(Error::config(format!(
                    "Route prefix of '{}' must start with '/'",
                    remote.name
                )));
            }
            if !prefixes.insert(normalize_prefix(&remote.route_prefix)) {
                return Err(Error::config(format!(
                    "Route prefix '{}' is claimed twice",
                    remote.route_prefix
                )));
            }
        }

        if self.streaming.max_attempts == 0 {
            return Err(Error::config("max_attempts must be at least 1"));
        }

        if self.streaming.event_buffer == 0 {
            return Err(Error::config("event_buffer must be at least 1"));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(Error::config("Invalid log level")),
        }

        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            _ => return Err(Error::config("Invalid log format")),
        }

        Ok(())
    }

    /// Look up a remote by name
    pub fn remote(&self, name: &str) -> Option<&RemoteConfig> {
        self.remotes.iter().find(|r| r.name == name)
    }

    /// Remote whose route prefix owns `host_path` (longest prefix wins)
    pub fn remote_for_path(&self, host_path: &str) -> Option<&RemoteConfig> {
        self.remotes
            .iter()
            .filter(|r| crate::navigation::strip_route(&r.route_prefix, host_path).is_some())
            .max_by_key(|r| normalize_prefix(&r.route_prefix).len())
    }
}

fn normalize_prefix(prefix: &str) -> &str {
    match prefix.trim_end_matches('/') {
        "" => "/",
        p => p,
    }
}

// For TOML parsing
use serde::de::{self, Deserializer, Visitor};
use serde::Serializer;
use std::fmt;

// Custom deserializer for Duration from string
fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct DurationVisitor;

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a duration string like '250ms', '30s' or '5m'")
        }

        fn visit_str<E>(self, value: &str) -> std::result::Result<Duration, E>
        where
            E: de::Error,
        {
            parse_duration(value).map_err(E::custom)
        }

        fn visit_u64<E>(self, value: u64) -> std::result::Result<Duration, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(value))
        }

        fn visit_i64<E>(self, value: i64) -> std::result::Result<Duration, E>
        where
            E: de::Error,
        {
            u64::try_from(value)
                .map(Duration::from_secs)
                .map_err(|_| E::custom("negative duration"))
        }
    }

    deserializer.deserialize_any(DurationVisitor)
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format!("{}ms", duration.as_millis()))
}

/// Parse `"250ms"`, `"5s"`, `"2m"`, `"1h"` or bare seconds
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        let ms: u64 = ms.parse().map_err(|_| format!("Invalid milliseconds '{}'", s))?;
        Ok(Duration::from_millis(ms))
    } else if let Some(secs) = s.strip_suffix('s') {
        let secs: u64 = secs.parse().map_err(|_| format!("Invalid seconds '{}'", s))?;
        Ok(Duration::from_secs(secs))
    } else if let Some(mins) = s.strip_suffix('m') {
        let mins: u64 = mins.parse().map_err(|_| format!("Invalid minutes '{}'", s))?;
        Ok(Duration::from_secs(mins * 60))
    } else if let Some(hours) = s.strip_suffix('h') {
        let hours: u64 = hours.parse().map_err(|_| format!("Invalid hours '{}'", s))?;
        Ok(Duration::from_secs(hours * 3600))
    } else {
        // Bare number means seconds
        let secs: u64 = s.parse().map_err(|_| format!("Invalid duration format '{}'", s))?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = PortalConfig::default();
        config.validate().unwrap();
        assert_eq!(config.streaming.retry_delay, Duration::from_secs(5));
        assert_eq!(config.streaming.max_attempts, 5);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("7").unwrap(), Duration::from_secs(7));
        assert!(parse_duration("fast").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[shell]
sync_timeout = "500ms"
default_theme = "dark"

[[remotes]]
name = "drive"
entry = "http://localhost:5175/remoteEntry.js"
data_service = "drive"
route_prefix = "/drive"

[streaming]
retry_delay = "2s"
max_attempts = 3
"#
        )
        .unwrap();

        let config = PortalConfig::from_file(file.path()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.shell.sync_timeout, Duration::from_millis(500));
        assert_eq!(config.shell.default_theme, ThemeMode::Dark);
        assert_eq!(config.remotes.len(), 1);
        assert!(!config.remotes[0].keep_alive);
        assert_eq!(config.streaming.retry_delay, Duration::from_secs(2));
        assert_eq!(config.streaming.event_buffer, 256);
        assert_eq!(config.api.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_serialized_config_parses_back() {
        let text = toml::to_string(&PortalConfig::default()).unwrap();
        let parsed = PortalConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.shell.sync_timeout, Duration::from_secs(3));
        assert_eq!(parsed.remotes, PortalConfig::default().remotes);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PB_LOG_LEVEL", "debug"),
            ("PB_RETRY_DELAY", "100ms"),
            ("PB_MAX_ATTEMPTS", "2"),
        ]
        .into_iter()
        .collect();

        let mut config = PortalConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.streaming.retry_delay, Duration::from_millis(100));
        assert_eq!(config.streaming.max_attempts, 2);

        let err = config.apply_overrides(|k| (k == "PB_MAX_ATTEMPTS").then(|| "many".to_string()));
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn test_validation_rejects_bad_remotes() {
        let mut config = PortalConfig::default();
        config.remotes[1].route_prefix = "/shopping/".to_string();
        assert!(config.validate().is_err());

        let mut config = PortalConfig::default();
        config.remotes[1].name = "shopping".to_string();
        assert!(config.validate().is_err());

        let mut config = PortalConfig::default();
        config.remotes[0].route_prefix = "shopping".to_string();
        assert!(config.validate().is_err());

        let mut config = PortalConfig::default();
        config.streaming.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = PortalConfig::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_remote_for_path() {
        let config = PortalConfig::default();
        assert_eq!(config.remote_for_path("/shopping/cart").map(|r| r.name.as_str()), Some("shopping"));
        assert_eq!(config.remote_for_path("/blog").map(|r| r.name.as_str()), Some("blog"));
        assert!(config.remote_for_path("/shoppingmall").is_none());
        assert!(config.remote("drive").is_none());
    }
}
