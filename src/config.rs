//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the
//! counter-config.toml file. The `[counter]` table is handed to the counter
//! as options; `[display]` says where the counter is mounted and which
//! event strategy it uses.
//!
//! ```toml
//! [counter]
//! target = "2027-01-01T00:00:00Z"
//! interval = 1000
//!
//! [display]
//! mount = "#app"
//! events = "bubbling"
//! ```

use std::fs;
use std::io;
use std::path::Path;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::options::Options;
use crate::Timestamp;

/// Default location of the configuration file
pub const DEFAULT_PATH: &str = "counter-config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] io::Error),

    #[error("invalid config file format: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("could not write config file: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// `target` is not an RFC 3339 date-time
    #[error("invalid target time {value:?}: {message}")]
    Target { value: String, message: String },
}

/// Application configuration loaded from counter-config.toml
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Options merged into the counter; `target` becomes `timestamp`
    #[serde(default)]
    pub counter: toml::Table,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// How listeners are dispatched
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStrategy {
    #[default]
    Local,
    Bubbling,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Selector of the node the counter attaches to
    pub mount: String,
    pub events: EventStrategy,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            mount: "#app".to_string(),
            events: EventStrategy::Local,
        }
    }
}

impl Config {
    /// Load configuration from counter-config.toml
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path(DEFAULT_PATH)
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(config) => {
                info!(path = %path.display(), "loaded configuration");
                config
            }
            Err(ConfigError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no config file found, using defaults");
                Self::default()
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "using default configuration");
                Self::default()
            }
        }
    }

    /// Load and validate, without falling back.
    pub fn try_load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.options()?;
        Ok(config)
    }

    /// The `[counter]` table as counter options.
    pub fn options(&self) -> Result<Options, ConfigError> {
        let mut table = self.counter.clone();
        let target = table.remove("target");
        let options = Options::from_toml(&table);
        match target {
            Some(target) => Ok(options.timestamp(target_from_toml(&target)?)),
            None => Ok(options),
        }
    }

    /// Save current configuration to `path`
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(&path, contents)?;
        info!(path = %path.as_ref().display(), "configuration saved");
        Ok(())
    }
}

/// Milliseconds since the epoch of an RFC 3339 date-time.
///
/// ```
/// use counter_clock_lib::config::parse_target;
///
/// assert_eq!(parse_target("1970-01-01T00:00:01Z").unwrap(), 1000);
/// assert_eq!(parse_target("1970-01-01T01:00:00+01:00").unwrap(), 0);
/// assert!(parse_target("tomorrow").is_err());
/// ```
pub fn parse_target(value: &str) -> Result<Timestamp, ConfigError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|time| time.timestamp_millis())
        .map_err(|err| ConfigError::Target {
            value: value.to_string(),
            message: err.to_string(),
        })
}

fn target_from_toml(value: &toml::Value) -> Result<Timestamp, ConfigError> {
    match value {
        toml::Value::String(text) => parse_target(text),
        // unquoted TOML date-times
        toml::Value::Datetime(datetime) => parse_target(&datetime.to_string()),
        other => Err(ConfigError::Target {
            value: other.to_string(),
            message: "expected an RFC 3339 date-time".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionValue;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn config_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.display.mount, "#app");
        assert_eq!(config.display.events, EventStrategy::Local);
        assert!(config.options().unwrap().is_empty());
    }

    #[test]
    fn test_load_full_file() {
        let file = config_file(
            r##"
            [counter]
            target = "2027-01-01T00:00:00Z"
            interval = 250
            autostart = true

            [display]
            mount = "#clock"
            events = "bubbling"
            "##,
        );
        let config = Config::load_from_path(file.path());
        assert_eq!(config.display.mount, "#clock");
        assert_eq!(config.display.events, EventStrategy::Bubbling);

        let options = config.options().unwrap();
        assert_eq!(
            options.get("timestamp"),
            Some(&OptionValue::Integer(1_798_761_600_000))
        );
        assert_eq!(options.get("interval"), Some(&OptionValue::Integer(250)));
        assert_eq!(options.get("autostart"), Some(&OptionValue::Flag(true)));
        assert_eq!(options.get("target"), None);
    }

    #[test]
    fn test_unquoted_target() {
        let file = config_file("[counter]\ntarget = 1970-01-01T00:01:00Z\n");
        let options = Config::try_load(file.path()).unwrap().options().unwrap();
        assert_eq!(options.get("timestamp"), Some(&OptionValue::Integer(60_000)));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let file = config_file("[display]\nevents = \"local\"\n");
        let config = Config::load_from_path(file.path());
        assert_eq!(config.display.mount, "#app");
        assert!(config.counter.is_empty());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let config = Config::load_from_path("/nonexistent/path");
        // Should fallback to default
        assert_eq!(config.display.mount, "#app");
        assert!(matches!(
            Config::try_load("/nonexistent/path"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let file = config_file("[display]\nevents = \"broadcast\"\n");
        assert!(matches!(
            Config::try_load(file.path()),
            Err(ConfigError::Parse(_))
        ));
        assert_eq!(
            Config::load_from_path(file.path()).display.events,
            EventStrategy::Local
        );
    }

    #[test]
    fn test_bad_target_falls_back() {
        let file = config_file("[counter]\ntarget = \"next tuesday\"\ninterval = 5\n");
        assert!(matches!(
            Config::try_load(file.path()),
            Err(ConfigError::Target { .. })
        ));
        assert!(Config::load_from_path(file.path()).counter.is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let mut config = Config::default();
        config.display.events = EventStrategy::Bubbling;
        config
            .counter
            .insert("interval".to_string(), toml::Value::Integer(500));

        let file = NamedTempFile::new().unwrap();
        config.save_to_path(file.path()).unwrap();

        let loaded = Config::try_load(file.path()).unwrap();
        assert_eq!(loaded.display.events, EventStrategy::Bubbling);
        assert_eq!(
            loaded.options().unwrap().get("interval"),
            Some(&OptionValue::Integer(500))
        );
    }
}
