use crate::paths::AppPaths;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub remote: RemoteDefaults,
    pub transfer: TransferConfig,
    pub logging: LoggingConfig,
    pub ui: UiConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct AppConfigLayer {
    pub remote: Option<RemoteDefaultsLayer>,
    pub transfer: Option<TransferConfigLayer>,
    pub logging: Option<LoggingConfigLayer>,
    pub ui: Option<UiConfigLayer>,
}

impl AppConfigLayer {
    pub fn apply_to(self, cfg: &mut AppConfig) {
        if let Some(layer) = self.remote {
            cfg.remote.apply(layer);
        }
        if let Some(layer) = self.transfer {
            cfg.transfer.apply(layer);
        }
        if let Some(layer) = self.logging {
            cfg.logging.apply(layer);
        }
        if let Some(layer) = self.ui {
            cfg.ui.apply(layer);
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteDefaults {
    pub ftp_port: u16,
    pub sftp_port: u16,
    pub connect_timeout_ms: u64,
    pub keepalive_interval_secs: u64,
}

impl Default for RemoteDefaults {
    fn default() -> Self {
        Self {
            ftp_port: 21,
            sftp_port: 22,
            connect_timeout_ms: 15000,
            keepalive_interval_secs: 15,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct RemoteDefaultsLayer {
    pub ftp_port: Option<u16>,
    pub sftp_port: Option<u16>,
    pub connect_timeout_ms: Option<u64>,
    pub keepalive_interval_secs: Option<u64>,
}

impl RemoteDefaults {
    fn apply(&mut self, layer: RemoteDefaultsLayer) {
        if let Some(v) = layer.ftp_port {
            self.ftp_port = v;
        }
        if let Some(v) = layer.sftp_port {
            self.sftp_port = v;
        }
        if let Some(v) = layer.connect_timeout_ms {
            self.connect_timeout_ms = v;
        }
        if let Some(v) = layer.keepalive_interval_secs {
            self.keepalive_interval_secs = v;
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Re-fetch both panes after every finished transfer.
    pub refresh_listings: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            refresh_listings: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct TransferConfigLayer {
    pub refresh_listings: Option<bool>,
}

impl TransferConfig {
    fn apply(&mut self, layer: TransferConfigLayer) {
        if let Some(v) = layer.refresh_listings {
            self.refresh_listings = v;
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    pub stdout: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            stdout: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct LoggingConfigLayer {
    pub level: Option<String>,
    pub json: Option<bool>,
    pub stdout: Option<bool>,
}

impl LoggingConfig {
    fn apply(&mut self, layer: LoggingConfigLayer) {
        if let Some(v) = layer.level {
            self.level = v;
        }
        if let Some(v) = layer.json {
            self.json = v;
        }
        if let Some(v) = layer.stdout {
            self.stdout = v;
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UiConfig {
    pub show_hidden_files: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            show_hidden_files: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct UiConfigLayer {
    pub show_hidden_files: Option<bool>,
}

impl UiConfig {
    fn apply(&mut self, layer: UiConfigLayer) {
        if let Some(v) = layer.show_hidden_files {
            self.show_hidden_files = v;
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConfigManager {
    pub paths: AppPaths,
}

impl ConfigManager {
    pub fn new(paths: AppPaths) -> Self {
        Self { paths }
    }

    pub fn load(&self, cwd: Option<&Path>, overrides: Option<AppConfigLayer>) -> Result<AppConfig> {
        let mut cfg = AppConfig::default();

        if self.paths.config_file.exists() {
            let layer = Self::load_layer(&self.paths.config_file)?;
            layer.apply_to(&mut cfg);
            debug!(path = %self.paths.config_file.display(), "user config applied");
        }

        if let Some(dir) = cwd {
            let project_path = AppPaths::project_config_path(dir);
            if project_path.exists() {
                let layer = Self::load_layer(&project_path)?;
                layer.apply_to(&mut cfg);
                debug!(path = %project_path.display(), "project config applied");
            }
        }

        if let Some(layer) = overrides {
            layer.apply_to(&mut cfg);
        }

        Ok(cfg)
    }

    pub fn load_layer(path: &Path) -> Result<AppConfigLayer, ConfigError> {
        let content = fs::read_to_string(path)?;
        let layer: AppConfigLayer = toml::from_str(&content)?;
        Ok(layer)
    }

    pub fn save_default(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent)?;
        }
        let cfg = AppConfig::default();
        let content = toml::to_string_pretty(&cfg).map_err(|e| anyhow::anyhow!(e))?;
        fs::write(&self.paths.config_file, content)?;
        Ok(())
    }
}
