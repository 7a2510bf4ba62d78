use crate::drive::DEFAULT_DEVICE_PATTERN;
use crate::paths;
use anyhow::{Context, Result};
use discover_check_core::{EngineConfig, ValidatorConfig};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix of the environment layer; `__` separates nested keys
pub const ENV_PREFIX: &str = "DISCOVER_CHECK_";

#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub validator: ValidatorConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub report: ReportConfig,

    #[serde(default)]
    pub drive: DriveConfig,
}

#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq)]
pub struct CatalogConfig {
    /// Blob of 37-byte payload records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    pub directory: PathBuf,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DriveConfig {
    /// Glob over `/dev/disk/by-id` names
    pub device_pattern: String,
    /// Insist on a mounted filesystem root with `lost+found`
    pub require_mount_root: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            directory: paths::get_reports_dir(),
        }
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            device_pattern: DEFAULT_DEVICE_PATTERN.to_string(),
            require_mount_root: true,
        }
    }
}

/// Values given on the command line; `None` keeps the layered value
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub catalog: Option<PathBuf>,
    pub report_dir: Option<PathBuf>,
    pub commitment_workers: Option<usize>,
    pub structure_workers: Option<usize>,
    pub ship_threshold: Option<usize>,
    pub async_hashers: Option<usize>,
    pub any_directory: bool,
}

impl AppConfig {
    /// Apply CLI argument overrides to the configuration
    pub fn apply_cli_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(ref catalog) = overrides.catalog {
            self.catalog.path = Some(catalog.clone());
        }
        if let Some(ref directory) = overrides.report_dir {
            self.report.directory = directory.clone();
        }
        if let Some(workers) = overrides.commitment_workers {
            self.validator.commitment_workers = workers;
        }
        if let Some(workers) = overrides.structure_workers {
            self.validator.structure_workers = workers;
        }
        if let Some(threshold) = overrides.ship_threshold {
            self.validator.ship_threshold = threshold;
        }
        if let Some(hashers) = overrides.async_hashers {
            self.engine.async_hashers = hashers;
        }
        if overrides.any_directory {
            self.drive.require_mount_root = false;
        }
    }
}

/// Layered configuration loader
pub struct ConfigManager {
    config_path: PathBuf,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    /// Use the platform configuration path
    pub fn new() -> Self {
        Self {
            config_path: paths::get_config_path(),
        }
    }

    /// Use an explicit file, as given by `--config`
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    pub fn get_config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration with layered priority: ENV > File > Defaults
    ///
    /// Command line overrides are applied on top by the caller.
    pub fn load(&self) -> Result<AppConfig> {
        let mut figment = Figment::new();

        // Layer 1: Defaults
        figment = figment.merge(Serialized::defaults(AppConfig::default()));

        // Layer 2: Config file (if exists)
        if self.config_path.exists() {
            figment = figment.merge(Toml::file(&self.config_path));
        }

        // Layer 3: Environment variables
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment.extract().with_context(|| {
            format!(
                "Failed to load configuration from {}",
                self.config_path.display()
            )
        })
    }

    /// The effective configuration rendered as TOML
    pub fn show(&self) -> Result<String> {
        let config = self.load()?;
        toml::to_string_pretty(&config).context("Failed to render configuration")
    }

    /// Get a configuration value by key (dot notation)
    pub fn get(&self, key: &str) -> Result<String> {
        let config = self.load()?;
        let toml_string = toml::to_string(&config)?;
        let value: toml::Value = toml::from_str(&toml_string)?;

        let mut current = &value;
        for part in key.split('.') {
            match current {
                toml::Value::Table(table) => {
                    current = table
                        .get(part)
                        .ok_or_else(|| anyhow::anyhow!("Key '{}' not found", key))?;
                }
                _ => anyhow::bail!("Invalid key path: {}", key),
            }
        }

        match current {
            toml::Value::String(s) => Ok(s.clone()),
            toml::Value::Integer(i) => Ok(i.to_string()),
            toml::Value::Float(f) => Ok(f.to_string()),
            toml::Value::Boolean(b) => Ok(b.to_string()),
            toml::Value::Array(items) => Ok(items
                .iter()
                .map(|item| match item {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(",")),
            _ => anyhow::bail!("Value at '{}' is not a simple type", key),
        }
    }
}
