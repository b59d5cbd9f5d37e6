pub mod display_config;
pub mod glasses_config;

use std::path::Path;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::config::display_config::DisplayConfig;
use crate::config::glasses_config::GlassesConfig;
use crate::error::Result;
use crate::utils::ensure_directory_exists;

pub const CONFIG_FILE_NAME: &str = "even_glasses.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub glasses: GlassesConfig,
    pub display: DisplayConfig,
}

impl AppConfig {
    /// Loads the config from `path`, falling back to defaults when the file is missing.
    pub async fn load_config(path: impl AsRef<Path>) -> Result<Self> {
        let file_path = path.as_ref();

        if !file_path.exists() {
            warn!("Config file not found at {:?}, using default.", file_path);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;
        config.validate()?;

        info!("Config loaded from {:?}", file_path);
        Ok(config)
    }

    /// Saves the config to `path`, creating the parent directory if needed.
    pub async fn save_config(&self, path: impl AsRef<Path>) -> Result<()> {
        let file_path = path.as_ref();
        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_directory_exists(parent).await?;
        }

        let config_json = match serde_json::to_string_pretty(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(file_path, config_json).await?;

        info!("Config saved to {:?}.", file_path);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.glasses.validate()?;
        self.display.validate()
    }
}
