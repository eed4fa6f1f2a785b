//! Configuration loading and root folder resolution
//!
//! Each setting is resolved in priority order:
//! 1. Command-line argument or environment variable (merged by the binary's CLI parser)
//! 2. TOML config file
//! 3. OS-dependent compiled default
//!
//! A missing default config file is not an error; the service starts on defaults.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Default HTTP port for the pipeline service
pub const DEFAULT_PORT: u16 = 5730;

/// Default bind address
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Default log filter directive
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "crm.db";

/// Contents of `config.toml`; every key is optional
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    /// Seconds between scheduled full conversion-rate recalculations (0 = disabled)
    pub recalc_interval_secs: Option<u64>,
}

impl TomlConfig {
    /// Parse TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config file: {}", e)))
    }

    /// Read and parse a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }
}

/// Compiled fallback values
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub bind: String,
    pub port: u16,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Values supplied on the command line or through environment variables
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Explicit config file; unlike the default location it must exist
    pub config_file: Option<PathBuf>,
    pub root_folder: Option<PathBuf>,
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub recalc_interval_secs: Option<u64>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub root_folder: PathBuf,
    pub bind: String,
    pub port: u16,
    pub log_level: String,
    /// `None` disables the scheduled recalculation task
    pub recalc_interval: Option<Duration>,
}

impl ServiceConfig {
    /// Resolve configuration from overrides, the TOML file and compiled defaults
    pub fn resolve(overrides: ConfigOverrides) -> Result<Self> {
        let toml_config = match &overrides.config_file {
            Some(path) => TomlConfig::load(path)?,
            None => load_default_config_file(),
        };

        Ok(Self::merge(overrides, toml_config, CompiledDefaults::for_current_platform()))
    }

    /// Merge the three tiers; earlier tiers win
    pub fn merge(overrides: ConfigOverrides, file: TomlConfig, defaults: CompiledDefaults) -> Self {
        let interval_secs = overrides
            .recalc_interval_secs
            .or(file.recalc_interval_secs)
            .unwrap_or(0);

        Self {
            root_folder: overrides
                .root_folder
                .or(file.root_folder)
                .unwrap_or(defaults.root_folder),
            bind: overrides.bind.or(file.bind).unwrap_or(defaults.bind),
            port: overrides.port.or(file.port).unwrap_or(defaults.port),
            log_level: overrides
                .log_level
                .or(file.log_level)
                .unwrap_or(defaults.log_level),
            recalc_interval: (interval_secs > 0).then(|| Duration::from_secs(interval_secs)),
        }
    }

    /// Path of the SQLite database inside the root folder
    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }

    /// `host:port` string for the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Create the root folder if it doesn't exist
    pub fn ensure_root_folder(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        Ok(())
    }
}

/// Location of the per-user config file (`<config_dir>/crm/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("crm").join("config.toml"))
}

fn load_default_config_file() -> TomlConfig {
    let Some(path) = default_config_path() else {
        return TomlConfig::default();
    };

    if !path.exists() {
        debug!("No config file at {}, using defaults", path.display());
        return TomlConfig::default();
    }

    match TomlConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            warn!("Ignoring unreadable config file: {}", e);
            TomlConfig::default()
        }
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("crm"))
        .unwrap_or_else(|| PathBuf::from("./crm_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> CompiledDefaults {
        CompiledDefaults {
            root_folder: PathBuf::from("/default/root"),
            bind: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn test_merge_uses_defaults_when_nothing_set() {
        let config = ServiceConfig::merge(ConfigOverrides::default(), TomlConfig::default(), defaults());
        assert_eq!(config.root_folder, PathBuf::from("/default/root"));
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.recalc_interval, None);
        assert_eq!(config.database_path(), PathBuf::from("/default/root/crm.db"));
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let file = TomlConfig::parse(
            r#"
            port = 6000
            log_level = "debug"
            recalc_interval_secs = 30
            "#,
        )
        .unwrap();

        let config = ServiceConfig::merge(ConfigOverrides::default(), file, defaults());
        assert_eq!(config.port, 6000);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.recalc_interval, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_cli_overrides_toml() {
        let file = TomlConfig::parse("port = 6000\nbind = \"0.0.0.0\"").unwrap();
        let overrides = ConfigOverrides {
            port: Some(7000),
            recalc_interval_secs: Some(0),
            ..Default::default()
        };

        let config = ServiceConfig::merge(overrides, file, defaults());
        assert_eq!(config.port, 7000);
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.bind_addr(), "0.0.0.0:7000");
        assert_eq!(config.recalc_interval, None);
    }

    #[test]
    fn test_unknown_toml_key_rejected() {
        assert!(matches!(TomlConfig::parse("colour = \"blue\""), Err(Error::Config(_))));
    }
}
