use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Web app serving `/api/places` and `/api/leaderboard`; must end with `/`
    pub api_base_url: String,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub mapbox_token: Option<String>,
    pub geocode_country: String,
    /// Shown in rank badges ("#3 in Gold Coast")
    pub region_label: String,
    pub pulse_millis: u64,
    pub directions_base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/".to_string(),
            supabase_url: None,
            supabase_anon_key: None,
            mapbox_token: None,
            geocode_country: "AU".to_string(),
            region_label: "Gold Coast".to_string(),
            pulse_millis: 280,
            directions_base_url: crate::route::DIRECTIONS_BASE_URL.to_string(),
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        crate::get_config_root().join(CONFIG_FILE)
    }

    /// Missing file means defaults; a file that exists must parse.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn pulse_duration(&self) -> Duration {
        Duration::from_millis(self.pulse_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.pulse_duration(), Duration::from_millis(280));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, r#"{"region_label": "Brisbane", "mapbox_token": "pk.abc"}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.region_label, "Brisbane");
        assert_eq!(config.mapbox_token.as_deref(), Some("pk.abc"));
        assert_eq!(config.geocode_country, "AU");
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "{ not json").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_save_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let mut config = Config::default();
        config.api_base_url = "https://lights.example.com/".to_string();
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }
}
