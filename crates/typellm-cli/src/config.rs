use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::constants::CONFIG_FILE_NAME;

#[derive(Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Default model to use when none is specified
    pub default_model: Option<String>,
    /// Number of choices requested when `-n` is not given
    pub default_n: u32,
    /// Require descriptions on stored functions unless a function says otherwise
    pub require_descriptions: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_model: Some("gpt-4o-mini".to_string()),
            default_n: 1,
            require_descriptions: true,
        }
    }
}

impl Config {
    pub fn load(base_path: &Path) -> Result<Config> {
        let config_path = base_path.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            // Create default config
            let default_config = Config::default();
            default_config.save(base_path)?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&config_path)?;
        let config: Config = toml::from_str(&content)?;

        Ok(config)
    }

    pub fn save(&self, base_path: &Path) -> Result<()> {
        let config_path = base_path.join(CONFIG_FILE_NAME);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(config_path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_creates_default_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load(temp_dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(temp_dir.path().join(CONFIG_FILE_NAME).exists());
    }

    #[test]
    fn test_missing_keys_fall_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(CONFIG_FILE_NAME),
            "default_model = \"gpt-4o\"\n",
        )
        .unwrap();

        let config = Config::load(temp_dir.path()).unwrap();
        assert_eq!(config.default_model.as_deref(), Some("gpt-4o"));
        assert_eq!(config.default_n, 1);
        assert!(config.require_descriptions);
    }
}
