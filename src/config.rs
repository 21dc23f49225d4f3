//! Server configuration, read from YAML

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attraction::DEFAULT_MISMATCH_PENALTY;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("config validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub catalog: PathBuf,
    #[serde(default)]
    pub encyclopedia: Option<PathBuf>,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3001
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Fixed seed for replayable sessions; a random one is chosen when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub starting_coins: u64,
    #[serde(default = "default_mismatch_penalty")]
    pub mismatch_penalty: f64,
}

fn default_mismatch_penalty() -> f64 {
    DEFAULT_MISMATCH_PENALTY
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            seed: None,
            starting_coins: 0,
            mismatch_penalty: default_mismatch_penalty(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn new(catalog: impl Into<PathBuf>) -> Self {
        Self {
            server: ServerConfig::default(),
            catalog: catalog.into(),
            encyclopedia: None,
            game: GameConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Loads the file and resolves relative data paths against its directory.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        if let Some(base) = path.parent() {
            config.catalog = base.join(&config.catalog);
            config.encyclopedia = config.encyclopedia.map(|file| base.join(file));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let penalty = self.game.mismatch_penalty;
        if !(0.0..=1.0).contains(&penalty) {
            return Err(ConfigError::Validation(format!(
                "mismatch_penalty must be within [0, 1], got {penalty}"
            )));
        }
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Validation("server.host is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_fill_missing_sections() {
        let config: Config = serde_yaml::from_str("catalog: catalog.yaml\n").unwrap();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.game.seed, None);
        assert_eq!(config.game.mismatch_penalty, 0.7);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn relative_paths_follow_the_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sanctuary.yaml");
        let mut config = Config::new("catalog.yaml");
        config.encyclopedia = Some(PathBuf::from("birds.json"));
        config.game.seed = Some(9);
        config.to_yaml(&path).unwrap();

        let loaded = Config::from_yaml(&path).unwrap();
        assert_eq!(loaded.catalog, dir.path().join("catalog.yaml"));
        assert_eq!(loaded.encyclopedia, Some(dir.path().join("birds.json")));
        assert_eq!(loaded.game.seed, Some(9));
    }

    #[test]
    fn rejects_penalty_outside_unit_range() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        fs::write(&path, "catalog: c.yaml\ngame:\n  mismatch_penalty: 1.5\n").unwrap();
        assert!(matches!(
            Config::from_yaml(&path),
            Err(ConfigError::Validation(_))
        ));
    }
}
