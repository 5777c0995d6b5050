use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::utils;

/// Current configuration version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

pub const DEFAULT_THEME: &str = "command_center_blue";
pub const DEFAULT_LANGUAGE: &str = "en";

pub const KNOWN_THEMES: [&str; 5] = [
    "command_center_blue",
    "midnight_purple",
    "forest_canopy",
    "arctic_wolf",
    "crimson_dusk",
];

pub const KNOWN_LANGUAGES: [&str; 10] = ["en", "de", "es", "fr", "ja", "pt", "ru", "vi", "zh", "af"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database_path: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub currency: Option<String>,
    /// Spending limit the money view measures the last 30 days against
    #[serde(default)]
    pub monthly_budget: Option<f64>,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_config_version")]
    pub config_version: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            user_id: default_user_id(),
            theme: default_theme(),
            language: default_language(),
            currency: None,
            monthly_budget: None,
            tick_interval_ms: default_tick_interval_ms(),
            log_level: default_log_level(),
            config_version: Some(CURRENT_CONFIG_VERSION),
        }
    }
}

// Default value functions
fn default_database_path() -> String {
    // This is a fallback - actual profile will be determined at load time
    Config::default_database_path_for_profile(utils::Profile::Prod)
}

fn default_user_id() -> String {
    "local".to_string()
}

fn default_theme() -> String {
    DEFAULT_THEME.to_string()
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_config_version() -> Option<u32> {
    Some(CURRENT_CONFIG_VERSION)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config directory: {0}")]
    ConfigDirError(String),
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to write config file: {0}")]
    WriteError(String),
    #[error("Unknown theme: {0}")]
    UnknownTheme(String),
    #[error("Unknown language: {0}")]
    UnknownLanguage(String),
    #[error("Budget must be a positive amount, got {0}")]
    InvalidBudget(f64),
}

impl Config {
    /// Load configuration from the profile's config file, or create it with defaults if missing
    pub fn load_with_profile(profile: utils::Profile) -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path(profile)?;
        Self::load_or_create(&config_path, profile)
    }

    /// Load configuration from an explicit file, creating it with the profile's defaults if missing
    pub fn load_or_create(path: &Path, profile: utils::Profile) -> Result<Self, ConfigError> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadError(e.to_string()))?;
            let mut config: Config = toml::from_str(&contents)?;
            if config.database_path.trim().is_empty() {
                config.database_path = Self::default_database_path_for_profile(profile);
            }
            Ok(config.sanitized())
        } else {
            let mut config = Config {
                database_path: Self::default_database_path_for_profile(profile),
                ..Config::default()
            };
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to the profile's config file
    pub fn save_with_profile(&mut self, profile: utils::Profile) -> Result<(), ConfigError> {
        let config_path = Self::get_config_path(profile)?;
        self.save_to(&config_path)
    }

    /// Save configuration to an explicit file
    pub fn save_to(&mut self, path: &Path) -> Result<(), ConfigError> {
        // Ensure config version is set before saving
        self.config_version = Some(CURRENT_CONFIG_VERSION);

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteError(e.to_string()))?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::WriteError(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| ConfigError::WriteError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the config file
    pub fn get_config_path(profile: utils::Profile) -> Result<PathBuf, ConfigError> {
        let config_dir = utils::get_config_dir(profile)
            .ok_or_else(|| ConfigError::ConfigDirError("Could not determine config directory".to_string()))?;
        Ok(config_dir.join("config.toml"))
    }

    /// Get default database path for a specific profile
    fn default_database_path_for_profile(profile: utils::Profile) -> String {
        if let Some(data_dir) = utils::get_data_dir(profile) {
            data_dir.join("wolfpad.db").to_string_lossy().to_string()
        } else {
            match profile {
                utils::Profile::Dev => "~/.local/share/wolfpad-dev/wolfpad.db".to_string(),
                utils::Profile::Prod => "~/.local/share/wolfpad/wolfpad.db".to_string(),
            }
        }
    }

    /// Get the expanded database path (with ~ expansion)
    pub fn get_database_path(&self) -> PathBuf {
        utils::expand_path(&self.database_path)
    }

    /// Set the active theme by id
    pub fn set_theme(&mut self, theme: &str) -> Result<(), ConfigError> {
        if !KNOWN_THEMES.contains(&theme) {
            return Err(ConfigError::UnknownTheme(theme.to_string()));
        }
        self.theme = theme.to_string();
        Ok(())
    }

    /// Set the interface language by code
    pub fn set_language(&mut self, language: &str) -> Result<(), ConfigError> {
        if !KNOWN_LANGUAGES.contains(&language) {
            return Err(ConfigError::UnknownLanguage(language.to_string()));
        }
        self.language = language.to_string();
        Ok(())
    }

    pub fn set_currency(&mut self, currency: Option<String>) {
        self.currency = currency;
    }

    /// Set the monthly budget; `None` removes it
    pub fn set_monthly_budget(&mut self, budget: Option<f64>) -> Result<(), ConfigError> {
        if let Some(amount) = budget {
            if !amount.is_finite() || amount <= 0.0 {
                return Err(ConfigError::InvalidBudget(amount));
            }
        }
        self.monthly_budget = budget;
        Ok(())
    }

    /// Replace hand-edited values that no longer name a known theme or language
    fn sanitized(mut self) -> Self {
        if !KNOWN_THEMES.contains(&self.theme.as_str()) {
            warn!("Unknown theme '{}' in config, using {}", self.theme, DEFAULT_THEME);
            self.theme = default_theme();
        }
        if !KNOWN_LANGUAGES.contains(&self.language.as_str()) {
            warn!("Unknown language '{}' in config, using {}", self.language, DEFAULT_LANGUAGE);
            self.language = default_language();
        }
        if self.monthly_budget.is_some_and(|b| !b.is_finite() || b <= 0.0) {
            warn!("Ignoring monthly budget {:?} in config", self.monthly_budget);
            self.monthly_budget = None;
        }
        if self.tick_interval_ms == 0 {
            self.tick_interval_ms = default_tick_interval_ms();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_or_create(&path, utils::Profile::Prod).unwrap();
        assert!(path.exists());
        assert_eq!(config.user_id, "local");
        assert_eq!(config.theme, DEFAULT_THEME);
        assert_eq!(config.tick_interval_ms, 1000);
        assert_eq!(config.config_version, Some(CURRENT_CONFIG_VERSION));
    }

    #[test]
    fn test_fresh_dev_config_uses_the_dev_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::load_or_create(&path, utils::Profile::Dev).unwrap();
        assert!(config.database_path.contains("wolfpad-dev"), "got {}", config.database_path);

        // The saved file keeps the dev path on the next load
        let reloaded = Config::load_or_create(&path, utils::Profile::Prod).unwrap();
        assert_eq!(reloaded.database_path, config.database_path);
    }

    #[test]
    fn test_blank_database_path_follows_the_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "database_path = \"\"\n").unwrap();
        let config = Config::load_or_create(&path, utils::Profile::Dev).unwrap();
        assert!(config.database_path.contains("wolfpad-dev"));

        fs::write(&path, "user_id = \"alice\"\n").unwrap();
        let config = Config::load_or_create(&path, utils::Profile::Dev).unwrap();
        assert!(config.database_path.contains("wolfpad-dev"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "user_id = \"alice\"\ncurrency = \"EUR\"\n").unwrap();

        let config = Config::load_or_create(&path, utils::Profile::Prod).unwrap();
        assert_eq!(config.user_id, "alice");
        assert_eq!(config.currency.as_deref(), Some("EUR"));
        assert_eq!(config.language, "en");
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_unknown_values_in_file_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "theme = \"neon\"\nlanguage = \"xx\"\n").unwrap();

        let config = Config::load_or_create(&path, utils::Profile::Prod).unwrap();
        assert_eq!(config.theme, DEFAULT_THEME);
        assert_eq!(config.language, DEFAULT_LANGUAGE);
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.set_theme("arctic_wolf").unwrap();
        config.set_language("ja").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_or_create(&path, utils::Profile::Prod).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_rejects_unknown_theme_and_language() {
        let mut config = Config::default();
        assert!(matches!(config.set_theme("neon"), Err(ConfigError::UnknownTheme(_))));
        assert!(matches!(config.set_language("klingon"), Err(ConfigError::UnknownLanguage(_))));
        assert_eq!(config.theme, DEFAULT_THEME);
    }

    #[test]
    fn test_monthly_budget_must_be_positive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        assert!(matches!(config.set_monthly_budget(Some(-5.0)), Err(ConfigError::InvalidBudget(_))));
        config.set_monthly_budget(Some(1500.0)).unwrap();
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_or_create(&path, utils::Profile::Prod).unwrap().monthly_budget, Some(1500.0));

        fs::write(&path, "monthly_budget = 0.0\n").unwrap();
        assert_eq!(Config::load_or_create(&path, utils::Profile::Prod).unwrap().monthly_budget, None);
    }
}
