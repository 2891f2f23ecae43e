//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a TOML file. A missing file is not an error:
//! the service logs a warning and starts on built-in defaults.
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "NAMEDECK_CONFIG";

/// Environment variable naming the root folder
pub const ROOT_ENV_VAR: &str = "NAMEDECK_ROOT";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder for the session database and the default local dataset
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Dataset location: an `http(s)://` base URL or a local directory
    ///
    /// Default: `<root_folder>/data`
    #[serde(default)]
    pub data_source: Option<String>,

    /// SQLite database holding persisted sessions
    ///
    /// Default: `<root_folder>/namedeck.db`
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub catalog: CatalogSettings,

    #[serde(default)]
    pub swipe: SwipeSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Tiered catalog settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSettings {
    /// Resident entry bound outside expand mode
    #[serde(default = "default_resident_limit")]
    pub resident_limit: usize,

    /// Number of chunks requested together that switches a load into expand mode
    #[serde(default = "default_expand_threshold")]
    pub expand_threshold: usize,

    /// Per-request timeout for remote data sources
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Event bus channel capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

/// Swipe session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwipeSettings {
    /// Cards per materialized window
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Next-window size below which a refill is submitted
    #[serde(default = "default_refill_threshold")]
    pub refill_threshold: usize,

    /// Maximum number of reversible decisions
    #[serde(default = "default_undo_depth")]
    pub undo_depth: usize,

    /// Key of the persisted session record
    #[serde(default = "default_session_key")]
    pub session_key: String,
}

fn default_port() -> u16 {
    5760
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_resident_limit() -> usize {
    10_000
}

fn default_expand_threshold() -> usize {
    3
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_event_capacity() -> usize {
    256
}

fn default_window_size() -> usize {
    10
}

fn default_refill_threshold() -> usize {
    5
}

fn default_undo_depth() -> usize {
    10
}

fn default_session_key() -> String {
    "default".to_string()
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            data_source: None,
            database_path: None,
            port: default_port(),
            logging: LoggingConfig::default(),
            catalog: CatalogSettings::default(),
            swipe: SwipeSettings::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            resident_limit: default_resident_limit(),
            expand_threshold: default_expand_threshold(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Default for SwipeSettings {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            refill_threshold: default_refill_threshold(),
            undo_depth: default_undo_depth(),
            session_key: default_session_key(),
        }
    }
}

impl CatalogSettings {
    pub fn validate(&self) -> Result<()> {
        if self.resident_limit == 0 {
            return Err(Error::Config("catalog.resident_limit must be at least 1".to_string()));
        }
        if self.expand_threshold < 2 {
            return Err(Error::Config(
                "catalog.expand_threshold must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

impl SwipeSettings {
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(Error::Config("swipe.window_size must be at least 1".to_string()));
        }
        if self.undo_depth == 0 {
            return Err(Error::Config("swipe.undo_depth must be at least 1".to_string()));
        }
        if self.refill_threshold > self.window_size {
            return Err(Error::Config(format!(
                "swipe.refill_threshold ({}) cannot exceed swipe.window_size ({})",
                self.refill_threshold, self.window_size
            )));
        }
        if self.session_key.trim().is_empty() {
            return Err(Error::Config("swipe.session_key cannot be empty".to_string()));
        }
        Ok(())
    }
}

impl TomlConfig {
    pub fn validate(&self) -> Result<()> {
        self.catalog.validate()?;
        self.swipe.validate()
    }

    /// Dataset location, falling back to `<root_folder>/data`
    pub fn data_source_or(&self, root_folder: &Path) -> String {
        self.data_source
            .clone()
            .unwrap_or_else(|| root_folder.join("data").to_string_lossy().to_string())
    }

    /// Database path, falling back to `<root_folder>/namedeck.db`
    pub fn database_path_or(&self, root_folder: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| root_folder.join("namedeck.db"))
    }
}

/// Load and validate a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid TOML in {}: {}", path.display(), e)))?;
    config.validate()?;
    Ok(config)
}

/// Locate and load the bootstrap config, degrading to defaults
///
/// Looks at the explicit path, then `NAMEDECK_CONFIG`, then the platform config
/// directory. A missing file yields defaults with a warning; an unreadable or invalid
/// file that was explicitly requested is an error.
pub fn load_or_default(explicit: Option<&Path>) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        info!("Loading config from {}", path.display());
        return load_toml_config(path);
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        info!("Loading config from {} ({})", path, CONFIG_ENV_VAR);
        return load_toml_config(Path::new(&path));
    }

    match default_config_path() {
        Some(path) if path.exists() => {
            info!("Loading config from {}", path.display());
            load_toml_config(&path)
        }
        _ => {
            warn!("No config file found, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Write a config file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

/// Root folder resolution
pub fn resolve_root_folder(
    cli_arg: Option<&str>,
    env_var_name: &str,
    toml_value: Option<&Path>,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = toml_value {
        return path.to_path_buf();
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Platform config file location (`<config dir>/namedeck/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("namedeck").join("config.toml"))
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/namedeck
        dirs::data_local_dir()
            .map(|d| d.join("namedeck"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/namedeck"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/namedeck
        dirs::data_dir()
            .map(|d| d.join("namedeck"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/namedeck"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("namedeck"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\namedeck"))
    } else {
        PathBuf::from("./namedeck_data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config: TomlConfig = toml::from_str("").unwrap();

        assert_eq!(config.port, 5760);
        assert_eq!(config.catalog.resident_limit, 10_000);
        assert_eq!(config.catalog.expand_threshold, 3);
        assert_eq!(config.swipe.window_size, 10);
        assert_eq!(config.swipe.refill_threshold, 5);
        assert_eq!(config.swipe.undo_depth, 10);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            data_source = "https://example.org/data"
            [swipe]
            window_size = 4
            refill_threshold = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.data_source.as_deref(), Some("https://example.org/data"));
        assert_eq!(config.swipe.window_size, 4);
        assert_eq!(config.swipe.undo_depth, 10);
        assert_eq!(config.catalog.resident_limit, 10_000);
    }

    #[test]
    fn test_validation_rejects_inconsistent_swipe_settings() {
        let settings = SwipeSettings {
            window_size: 3,
            refill_threshold: 5,
            ..SwipeSettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = SwipeSettings {
            undo_depth: 0,
            ..SwipeSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_resident_limit() {
        let settings = CatalogSettings {
            resident_limit: 0,
            ..CatalogSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_fallback_paths_under_root() {
        let config = TomlConfig::default();
        let root = Path::new("/srv/namedeck");

        assert_eq!(config.database_path_or(root), PathBuf::from("/srv/namedeck/namedeck.db"));
        assert_eq!(config.data_source_or(root), "/srv/namedeck/data");
    }

    #[test]
    fn test_cli_argument_wins() {
        let resolved = resolve_root_folder(
            Some("/from/cli"),
            "NAMEDECK_TEST_UNSET_VARIABLE",
            Some(Path::new("/from/toml")),
        );
        assert_eq!(resolved, PathBuf::from("/from/cli"));
    }
}
