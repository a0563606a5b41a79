use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub version: u32,
    pub music_folders: Vec<String>,
    pub index_path: String,
    pub artwork_path: String,
    pub scan_workers: usize,
    pub scan_on_start: bool,
    pub watch_music: bool,
    pub watch_debounce_secs: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            music_folders: Vec::new(),
            index_path: "library.redb".to_string(),
            artwork_path: "artwork".to_string(),
            scan_workers: 4,
            scan_on_start: true,
            watch_music: true,
            watch_debounce_secs: 2,
        }
    }
}

impl IndexerConfig {
    pub fn workers(&self) -> usize {
        self.scan_workers.max(1)
    }

    pub fn watch_debounce_secs(&self) -> u64 {
        if self.watch_debounce_secs == 0 {
            2
        } else {
            self.watch_debounce_secs
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("INDEXER_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

pub fn load_or_create_config(path: &Path) -> Result<(IndexerConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: IndexerConfig = serde_yaml::from_str(&contents)?;
        if config.version < CONFIG_VERSION {
            config.version = CONFIG_VERSION;
        }
        if config.index_path.trim().is_empty() {
            config.index_path = "library.redb".to_string();
        }
        if config.artwork_path.trim().is_empty() {
            config.artwork_path = "artwork".to_string();
        }
        config.music_folders.retain(|folder| !folder.trim().is_empty());
        return Ok((config, false));
    }

    let config = IndexerConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &IndexerConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value.trim());
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}

pub fn resolve_music_folders(config_path: &Path, config: &IndexerConfig) -> Vec<PathBuf> {
    config
        .music_folders
        .iter()
        .map(|folder| resolve_path(config_path, folder))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf/config.yaml");

        let (config, created) = load_or_create_config(&path).unwrap();

        assert!(created);
        assert!(path.exists());
        assert_eq!(config, IndexerConfig::default());
        let (reloaded, created) = load_or_create_config(&path).unwrap();
        assert!(!created);
        assert_eq!(reloaded, config);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "music_folders:\n  - music\n  - /srv/music\n  - ''\nscan_workers: 0\nindex_path: ''\n",
        )
        .unwrap();

        let (config, _) = load_or_create_config(&path).unwrap();

        assert_eq!(config.music_folders, vec!["music", "/srv/music"]);
        assert_eq!(config.index_path, "library.redb");
        assert_eq!(config.workers(), 1);
        assert!(config.watch_music);
        let folders = resolve_music_folders(&path, &config);
        assert_eq!(folders[0], dir.path().join("music"));
        assert_eq!(folders[1], PathBuf::from("/srv/music"));
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "music_folders: [unterminated").unwrap();

        assert!(matches!(
            load_or_create_config(&path),
            Err(ConfigError::Yaml(_))
        ));
    }
}
