use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::cli::Cli;
use crate::monitor::{DEFAULT_COOLDOWN, DEFAULT_DEBOUNCE};
use crate::store::DEFAULT_MAX_SNAPSHOTS;

pub const DEFAULT_ORIGIN: &str = "local";
pub const DEFAULT_CONTENT_SELECTOR: &str = "#content";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid duration '{value}' for {field}: {source}")]
    Duration {
        field: &'static str,
        value: String,
        source: humantime::DurationError,
    },
}

/// Raw contents of config.toml. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    origin: Option<String>,
    max_snapshots: Option<usize>,
    debounce: Option<String>,
    cooldown: Option<String>,
    poll_interval: Option<String>,
    content_selector: Option<String>,
    db_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub origin: String,
    pub max_snapshots: usize,
    pub debounce: Duration,
    pub cooldown: Duration,
    pub poll_interval: Duration,
    pub content_selector: String,
    /// `None` selects the platform data directory.
    pub db_path: Option<PathBuf>,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            origin: DEFAULT_ORIGIN.to_string(),
            max_snapshots: DEFAULT_MAX_SNAPSHOTS,
            debounce: DEFAULT_DEBOUNCE,
            cooldown: DEFAULT_COOLDOWN,
            poll_interval: DEFAULT_POLL_INTERVAL,
            content_selector: DEFAULT_CONTENT_SELECTOR.to_string(),
            db_path: None,
            verbose: false,
        }
    }
}

/// Config file location (~/.config/rankscan/config.toml or platform equivalent)
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "rankscan")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn parse_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value).map_err(|source| ConfigError::Duration {
        field,
        value: value.to_string(),
        source,
    })
}

impl Config {
    /// Defaults overlaid with a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(text)?;
        let mut config = Config::default();

        if let Some(origin) = file.origin {
            config.origin = origin;
        }
        if let Some(max) = file.max_snapshots {
            config.max_snapshots = max.max(1);
        }
        if let Some(value) = file.debounce {
            config.debounce = parse_duration("debounce", &value)?;
        }
        if let Some(value) = file.cooldown {
            config.cooldown = parse_duration("cooldown", &value)?;
        }
        if let Some(value) = file.poll_interval {
            config.poll_interval = parse_duration("poll_interval", &value)?;
        }
        if let Some(selector) = file.content_selector {
            config.content_selector = selector;
        }
        config.db_path = file.db_path;

        Ok(config)
    }

    /// Load `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Config file (explicit or default location) with command line overrides applied.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = match cli.config.clone().or_else(default_config_path) {
            Some(path) => Config::load(&path)?,
            None => Config::default(),
        };

        if let Some(origin) = &cli.origin {
            config.origin = origin.clone();
        }
        if let Some(db) = &cli.db {
            config.db_path = Some(db.clone());
        }
        if let Some(selector) = &cli.content_selector {
            config.content_selector = selector.clone();
        }
        config.verbose = cli.verbose;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn overrides_from_file() {
        let config = Config::from_toml(
            r##"
            origin = "www.vendettagame.es"
            max_snapshots = 20
            debounce = "200ms"
            cooldown = "1s"
            content_selector = "#main"
            db_path = "/tmp/ranks.db"
            "##,
        )
        .unwrap();

        assert_eq!(config.origin, "www.vendettagame.es");
        assert_eq!(config.max_snapshots, 20);
        assert_eq!(config.debounce, Duration::from_millis(200));
        assert_eq!(config.cooldown, Duration::from_secs(1));
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.content_selector, "#main");
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/ranks.db")));
    }

    #[test]
    fn bad_duration_names_the_field() {
        let err = Config::from_toml("debounce = \"soon\"").unwrap_err();
        assert!(err.to_string().contains("debounce"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(Config::from_toml("colour = \"red\""), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }
}
