//! User configuration file.
//!
//! Settings live in `~/.cityaq/config.ini`:
//!
//! ```ini
//! [server]
//! listen = 127.0.0.1:8080
//! tile_cache_entries = 100
//!
//! [cache]
//! directory = /home/user/.cityaq/cache
//!
//! [cities]
//! directory = /home/user/.cityaq/cities
//!
//! [simulation]
//! city_marginal_template = /home/user/.cityaq/templates/city_marginal.json
//! city_total_template = /home/user/.cityaq/templates/city_total.json
//! total_template = /home/user/.cityaq/templates/total.json
//! poll_interval_secs = 600
//! max_wait_secs = 259200
//!
//! [executor]
//! url = http://jobs.example.org
//!
//! [logging]
//! directory = /home/user/.cityaq/logs
//! level = info
//! ```
//!
//! A missing file, section or key falls back to the defaults below. Every
//! key is addressable as `section.key` through [`ConfigKey`].

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::jobs::{PollConfig, SimulationTemplates};
use crate::tile::DEFAULT_LAYER_CACHE_ENTRIES;

/// Directory under the home directory holding everything CityAQ writes.
pub const CONFIG_DIR_NAME: &str = ".cityaq";

/// Name of the configuration file inside [`config_dir`].
pub const CONFIG_FILE_NAME: &str = "config.ini";

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
pub const DEFAULT_LOG_LEVEL: &str = "info";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// `~/.cityaq`, or `./.cityaq` when there is no home directory.
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Location of the configuration file.
pub fn config_file_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub listen: SocketAddr,
    /// Composed layer sets kept in memory by the tile server.
    pub tile_cache_entries: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    /// Simulation results are persisted here.
    pub directory: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CitySettings {
    /// One `<name>.geojson` file per city.
    pub directory: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSettings {
    pub city_marginal_template: PathBuf,
    pub city_total_template: PathBuf,
    pub total_template: PathBuf,
    pub poll_interval_secs: u64,
    pub max_wait_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutorSettings {
    /// Base URL of a remote job server. Unset runs simulations in-process.
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// Daily log files are written here when set; otherwise stderr only.
    pub directory: Option<PathBuf>,
    pub level: String,
}

/// Parsed contents of `config.ini`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub server: ServerSettings,
    pub cache: CacheSettings,
    pub cities: CitySettings,
    pub simulation: SimulationSettings,
    pub executor: ExecutorSettings,
    pub logging: LoggingSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let base = config_dir();
        let templates = base.join("templates");
        let poll = PollConfig::default();
        Self {
            server: ServerSettings {
                listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
                tile_cache_entries: DEFAULT_LAYER_CACHE_ENTRIES,
            },
            cache: CacheSettings {
                directory: base.join("cache"),
            },
            cities: CitySettings {
                directory: base.join("cities"),
            },
            simulation: SimulationSettings {
                city_marginal_template: templates.join("city_marginal.json"),
                city_total_template: templates.join("city_total.json"),
                total_template: templates.join("total.json"),
                poll_interval_secs: poll.interval.as_secs(),
                max_wait_secs: poll.max_wait.as_secs(),
            },
            executor: ExecutorSettings::default(),
            logging: LoggingSettings {
                directory: None,
                level: DEFAULT_LOG_LEVEL.to_string(),
            },
        }
    }
}

impl ConfigFile {
    /// Load from [`config_file_path`].
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = ConfigFile::default();
        if !path.exists() {
            return Ok(config);
        }

        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        for key in ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|s| s.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Save to [`config_file_path`], creating `~/.cityaq` if needed.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            // Unset optional values are left out rather than written empty.
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }
        ini.write_to_file(path)?;
        Ok(())
    }

    pub fn templates(&self) -> SimulationTemplates {
        SimulationTemplates {
            city_marginal: self.simulation.city_marginal_template.clone(),
            city_total: self.simulation.city_total_template.clone(),
            total: self.simulation.total_template.clone(),
        }
    }

    pub fn poll(&self) -> PollConfig {
        PollConfig::default()
            .with_interval(Duration::from_secs(self.simulation.poll_interval_secs))
            .with_max_wait(Duration::from_secs(self.simulation.max_wait_secs))
    }
}

/// A single `section.key` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    ServerListen,
    ServerTileCacheEntries,
    CacheDirectory,
    CitiesDirectory,
    SimulationCityMarginalTemplate,
    SimulationCityTotalTemplate,
    SimulationTotalTemplate,
    SimulationPollIntervalSecs,
    SimulationMaxWaitSecs,
    ExecutorUrl,
    LoggingDirectory,
    LoggingLevel,
}

impl ConfigKey {
    /// Every key, grouped by section in file order.
    pub fn all() -> &'static [ConfigKey] {
        &[
            ConfigKey::ServerListen,
            ConfigKey::ServerTileCacheEntries,
            ConfigKey::CacheDirectory,
            ConfigKey::CitiesDirectory,
            ConfigKey::SimulationCityMarginalTemplate,
            ConfigKey::SimulationCityTotalTemplate,
            ConfigKey::SimulationTotalTemplate,
            ConfigKey::SimulationPollIntervalSecs,
            ConfigKey::SimulationMaxWaitSecs,
            ConfigKey::ExecutorUrl,
            ConfigKey::LoggingDirectory,
            ConfigKey::LoggingLevel,
        ]
    }

    pub fn section(&self) -> &'static str {
        match self {
            ConfigKey::ServerListen | ConfigKey::ServerTileCacheEntries => "server",
            ConfigKey::CacheDirectory => "cache",
            ConfigKey::CitiesDirectory => "cities",
            ConfigKey::SimulationCityMarginalTemplate
            | ConfigKey::SimulationCityTotalTemplate
            | ConfigKey::SimulationTotalTemplate
            | ConfigKey::SimulationPollIntervalSecs
            | ConfigKey::SimulationMaxWaitSecs => "simulation",
            ConfigKey::ExecutorUrl => "executor",
            ConfigKey::LoggingDirectory | ConfigKey::LoggingLevel => "logging",
        }
    }

    pub fn key_name(&self) -> &'static str {
        match self {
            ConfigKey::ServerListen => "listen",
            ConfigKey::ServerTileCacheEntries => "tile_cache_entries",
            ConfigKey::CacheDirectory | ConfigKey::CitiesDirectory => "directory",
            ConfigKey::SimulationCityMarginalTemplate => "city_marginal_template",
            ConfigKey::SimulationCityTotalTemplate => "city_total_template",
            ConfigKey::SimulationTotalTemplate => "total_template",
            ConfigKey::SimulationPollIntervalSecs => "poll_interval_secs",
            ConfigKey::SimulationMaxWaitSecs => "max_wait_secs",
            ConfigKey::ExecutorUrl => "url",
            ConfigKey::LoggingDirectory => "directory",
            ConfigKey::LoggingLevel => "level",
        }
    }

    /// `section.key`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as written in the file; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        let path = |p: &Path| p.display().to_string();
        match self {
            ConfigKey::ServerListen => config.server.listen.to_string(),
            ConfigKey::ServerTileCacheEntries => config.server.tile_cache_entries.to_string(),
            ConfigKey::CacheDirectory => path(&config.cache.directory),
            ConfigKey::CitiesDirectory => path(&config.cities.directory),
            ConfigKey::SimulationCityMarginalTemplate => {
                path(&config.simulation.city_marginal_template)
            }
            ConfigKey::SimulationCityTotalTemplate => path(&config.simulation.city_total_template),
            ConfigKey::SimulationTotalTemplate => path(&config.simulation.total_template),
            ConfigKey::SimulationPollIntervalSecs => {
                config.simulation.poll_interval_secs.to_string()
            }
            ConfigKey::SimulationMaxWaitSecs => config.simulation.max_wait_secs.to_string(),
            ConfigKey::ExecutorUrl => config.executor.url.clone().unwrap_or_default(),
            ConfigKey::LoggingDirectory => config
                .logging
                .directory
                .as_deref()
                .map(path)
                .unwrap_or_default(),
            ConfigKey::LoggingLevel => config.logging.level.clone(),
        }
    }

    /// Validate and store `value`. An empty value clears optional settings.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        let invalid = |reason: &str| ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason: reason.to_string(),
        };
        let required_path = || {
            if value.is_empty() {
                Err(invalid("a path is required"))
            } else {
                Ok(PathBuf::from(value))
            }
        };
        let positive = || match value.parse::<u64>() {
            Ok(0) => Err(invalid("must be greater than zero")),
            Ok(n) => Ok(n),
            Err(_) => Err(invalid("expected a whole number")),
        };

        match self {
            ConfigKey::ServerListen => {
                config.server.listen = value
                    .parse()
                    .map_err(|_| invalid("expected an address such as 127.0.0.1:8080"))?;
            }
            ConfigKey::ServerTileCacheEntries => config.server.tile_cache_entries = positive()?,
            ConfigKey::CacheDirectory => config.cache.directory = required_path()?,
            ConfigKey::CitiesDirectory => config.cities.directory = required_path()?,
            ConfigKey::SimulationCityMarginalTemplate => {
                config.simulation.city_marginal_template = required_path()?
            }
            ConfigKey::SimulationCityTotalTemplate => {
                config.simulation.city_total_template = required_path()?
            }
            ConfigKey::SimulationTotalTemplate => config.simulation.total_template = required_path()?,
            ConfigKey::SimulationPollIntervalSecs => {
                config.simulation.poll_interval_secs = positive()?
            }
            ConfigKey::SimulationMaxWaitSecs => config.simulation.max_wait_secs = positive()?,
            ConfigKey::ExecutorUrl => {
                config.executor.url = if value.is_empty() {
                    None
                } else if value.starts_with("http://") || value.starts_with("https://") {
                    Some(value.trim_end_matches('/').to_string())
                } else {
                    return Err(invalid("expected an http:// or https:// URL"));
                };
            }
            ConfigKey::LoggingDirectory => {
                config.logging.directory = (!value.is_empty()).then(|| PathBuf::from(value));
            }
            ConfigKey::LoggingLevel => {
                let level = value.to_ascii_lowercase();
                if !LOG_LEVELS.contains(&level.as_str()) {
                    return Err(invalid("expected one of trace, debug, info, warn, error"));
                }
                config.logging.level = level;
            }
        }
        Ok(())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ConfigKey::all()
            .iter()
            .copied()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}
