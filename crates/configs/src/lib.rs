use anyhow::anyhow;
use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "prefs.toml";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Names the backing store; the application identifier in practice.
    #[serde(default)]
    pub namespace: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { namespace: String::new(), data_dir: default_data_dir() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { format: default_log_format() }
    }
}

fn default_data_dir() -> PathBuf { PathBuf::from("data/prefs") }
fn default_log_format() -> String { "compact".to_string() }

/// Load from `CONFIG_PATH` (default `prefs.toml`); a missing file yields defaults.
pub fn load_default() -> Result<AppConfig> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_or_default(Path::new(&path))
}

pub fn load_or_default(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    load_from_file(path)
}

pub fn load_from_file(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("cannot read {}: {e}", path.display()))?;
    parse(&content)
}

pub fn parse(content: &str) -> Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(content)?;
    Ok(cfg)
}

impl AppConfig {
    pub fn load_and_validate() -> Result<Self> {
        let mut cfg = load_default()?;
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.storage.normalize_from_env();
        self.storage.validate()?;
        self.logging.normalize();
        Ok(())
    }
}

impl StorageConfig {
    /// Fill empty values from `PREFS_NAMESPACE` / `PREFS_DATA_DIR`.
    pub fn normalize_from_env(&mut self) {
        self.namespace = self.namespace.trim().to_string();
        if self.namespace.is_empty() {
            if let Ok(ns) = std::env::var("PREFS_NAMESPACE") {
                self.namespace = ns.trim().to_string();
            }
        }
        if self.data_dir.as_os_str().is_empty() {
            self.data_dir = std::env::var("PREFS_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_data_dir());
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(anyhow!("storage.namespace is empty; set it in the config file or PREFS_NAMESPACE"));
        }
        if self.namespace.contains(['/', '\\']) || self.namespace == "." || self.namespace == ".." {
            return Err(anyhow!("storage.namespace `{}` must be a plain name", self.namespace));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(anyhow!("storage.data_dir is empty"));
        }
        Ok(())
    }
}

impl LoggingConfig {
    fn normalize(&mut self) {
        let lower = self.format.trim().to_ascii_lowercase();
        self.format = if lower == "json" { lower } else { default_log_format() };
    }
}
