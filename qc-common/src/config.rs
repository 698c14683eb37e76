//! Configuration loading and database path resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the database location
pub const DATABASE_ENV_VAR: &str = "QCAPP_DATABASE";

/// Environment variable overriding the TOML config location
pub const CONFIG_ENV_VAR: &str = "QCAPP_CONFIG";

/// Contents of `config.toml`
///
/// Every field is optional; missing fields fall back to compiled defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// SQLite database file
    pub database: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Default tracing filter when RUST_LOG is unset
    pub level: Option<String>,
}

/// Rating service settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Bounded wait when redeeming a selection handle
    pub task_timeout_secs: Option<u64>,
    /// Concurrent selection queries
    pub worker_count: Option<usize>,
    /// `per-file` or `per-image`
    pub selection_policy: Option<String>,
    /// Cookie carrying the rater's user name
    pub user_cookie: Option<String>,
}

/// Ingestion CLI settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IngestConfig {
    /// External program producing PNG/GIF payloads on stdout
    pub render_command: Option<String>,
}

/// Compiled defaults
pub mod defaults {
    pub const HOST: &str = "127.0.0.1";
    pub const PORT: u16 = 8000;
    pub const TASK_TIMEOUT_SECS: u64 = 20;
    pub const WORKER_COUNT: usize = 4;
    pub const SELECTION_POLICY: &str = "per-file";
    pub const USER_COOKIE: &str = "X-Tapis-Username";
    pub const RENDER_COMMAND: &str = "qc-render";
    pub const LOG_LEVEL: &str = "info";
}

/// Load the TOML config file
///
/// A missing file is not an error: defaults are returned and a message is
/// logged. A file that exists but fails to parse is reported as
/// [`Error::Config`].
pub fn load_toml_config() -> Result<TomlConfig> {
    match config_file_path() {
        Some(path) => load_toml_config_from(&path),
        None => {
            info!("No config file found, using compiled defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Load a specific TOML config file
pub fn load_toml_config_from(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Locate the config file for the platform
///
/// Priority: `QCAPP_CONFIG`, then the user config dir, then `/etc/qcapp` on Linux.
fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
        warn!("{} points to missing file {}", CONFIG_ENV_VAR, path.display());
    }

    let user_config = dirs::config_dir().map(|d| d.join("qcapp").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/qcapp/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Database path resolution, priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_database_path(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.database {
        return path.clone();
    }

    default_database_path()
}

/// OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("qcapp"))
        .unwrap_or_else(|| PathBuf::from("./qcapp_data"))
        .join("qcapp.db")
}
