use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::models::AppConfig;

const CONFIG_FILE: &str = "config.json";

pub fn get_data_dir() -> AppResult<PathBuf> {
    fn ensure_dir(path: &PathBuf) -> AppResult<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        Ok(())
    }
    if let Ok(env_path) = std::env::var("DATA_DIR") {
        if !env_path.trim().is_empty() {
            let data_dir = PathBuf::from(env_path);
            ensure_dir(&data_dir)?;
            return Ok(data_dir);
        }
    }
    if cfg!(test) {
        let data_dir = std::env::temp_dir().join(format!(".visit-relay-test-{}", std::process::id()));
        ensure_dir(&data_dir)?;
        return Ok(data_dir);
    }

    if let Some(home) = dirs::home_dir() {
        let data_dir = home.join(crate::constants::DATA_DIR_NAME);
        if ensure_dir(&data_dir).is_ok() {
            return Ok(data_dir);
        }
    }
    let fallback_dir = std::env::temp_dir().join(crate::constants::DATA_DIR_NAME);
    ensure_dir(&fallback_dir)?;
    Ok(fallback_dir)
}

pub fn load_app_config() -> AppResult<AppConfig> {
    load_app_config_from(&get_data_dir()?)
}

// A missing file is created with defaults so operators have something to edit.
pub fn load_app_config_from(data_dir: &Path) -> AppResult<AppConfig> {
    let config_path = data_dir.join(CONFIG_FILE);

    if !config_path.exists() {
        let config = AppConfig::new();
        if let Err(e) = save_app_config_to(data_dir, &config) {
            tracing::warn!("Failed to write default config to {:?}: {}", config_path, e);
        }
        return Ok(config);
    }

    let content = fs::read_to_string(&config_path)?;
    let config: AppConfig = serde_json::from_str(&content).map_err(|e| {
        AppError::Config(format!("failed_to_parse_config_file {:?}: {}", config_path, e))
    })?;
    Ok(config)
}

pub fn save_app_config_to(data_dir: &Path, config: &AppConfig) -> AppResult<()> {
    let config_path = data_dir.join(CONFIG_FILE);
    let content = serde_json::to_string_pretty(config)?;
    fs::write(&config_path, content)?;
    Ok(())
}
