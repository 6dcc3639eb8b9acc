use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONF_NAME: &str = "easygo.toml";
pub const DEFAULT_LOG_DIR: &str = "/easygo/logs/";
pub const DEFAULT_DATA_DIR: &str = "/easygo/data/";
pub const DEFAULT_HTTP_PORT: u16 = 25555;
pub const DEFAULT_SYNC_PORT: u16 = 26666;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file could not be found (looked in {})", display_paths(.0))]
    NotFound(Vec<PathBuf>),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub http: HttpConfig,
    pub data: DataConfig,
    /// Peer addresses. Parsed for compatibility; no synchronization happens.
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub log_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout in seconds, 0 disables it.
    pub timeout: u32,
    pub ports: PortsConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PortsConfig {
    pub http_port: u16,
    pub sync_port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub data_dir: PathBuf,
}

impl Config {
    /// Loads the configuration from `explicit`, or from `easygo.toml` in the
    /// working directory, or next to the executable, in that order.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => Self::locate()?,
        };
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        let mut config: Config = toml::from_str(raw)?;
        config.apply_defaults();
        Ok(config)
    }

    fn locate() -> Result<PathBuf, ConfigError> {
        let mut candidates = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            candidates.push(cwd.join(DEFAULT_CONF_NAME));
        }
        if let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            candidates.push(exe_dir.join(DEFAULT_CONF_NAME));
        }
        match candidates.iter().find(|p| p.is_file()) {
            Some(found) => Ok(found.clone()),
            None => Err(ConfigError::NotFound(candidates)),
        }
    }

    fn apply_defaults(&mut self) {
        if self.log.log_dir.as_os_str().is_empty() {
            self.log.log_dir = PathBuf::from(DEFAULT_LOG_DIR);
        }
        if self.data.data_dir.as_os_str().is_empty() {
            self.data.data_dir = PathBuf::from(DEFAULT_DATA_DIR);
        }
        if self.http.ports.http_port == 0 {
            self.http.ports.http_port = DEFAULT_HTTP_PORT;
        }
        if self.http.ports.sync_port == 0 && !self.nodes.is_empty() {
            self.http.ports.sync_port = DEFAULT_SYNC_PORT;
        }
    }
}
