//! namedeck-swipe specific configuration
//!
//! The effective configuration is the TOML bootstrap with command-line overrides applied
//! on top.

use namedeck_common::config::{resolve_root_folder, CatalogSettings, SwipeSettings, TomlConfig, ROOT_ENV_VAR};
use std::path::PathBuf;
use std::time::Duration;

/// Values given on the command line (or their environment variables)
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub root_folder: Option<String>,
    pub port: Option<u16>,
    pub data_source: Option<String>,
    pub database_path: Option<PathBuf>,
}

/// Catalog service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub root_folder: PathBuf,
    pub data_source: String,
    pub database_path: PathBuf,
    pub port: u16,
    pub log_level: String,
    pub catalog: CatalogSettings,
    pub swipe: SwipeSettings,
}

impl ServiceConfig {
    pub fn resolve(toml: TomlConfig, overrides: Overrides) -> Self {
        let root_folder = resolve_root_folder(
            overrides.root_folder.as_deref(),
            ROOT_ENV_VAR,
            toml.root_folder.as_deref(),
        );
        let data_source = overrides
            .data_source
            .unwrap_or_else(|| toml.data_source_or(&root_folder));
        let database_path = overrides
            .database_path
            .unwrap_or_else(|| toml.database_path_or(&root_folder));

        Self {
            data_source,
            database_path,
            port: overrides.port.unwrap_or(toml.port),
            log_level: toml.logging.level,
            catalog: toml.catalog,
            swipe: toml.swipe,
            root_folder,
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.catalog.fetch_timeout_secs)
    }
}
