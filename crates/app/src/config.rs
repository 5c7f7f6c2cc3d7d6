use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const CONFIG_FILE: &str = "ledgerly.toml";
const DATABASE_FILE: &str = "ledger.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("No home directory available for the default data location")]
    NoDataDir,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub transfer_window_days: i64,
    pub subscription_min_occurrences: usize,
    pub subscription_max_gap_cv: f64,
    pub recommendation_limit: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            transfer_window_days: ledgerly_import::DEFAULT_TRANSFER_WINDOW_DAYS,
            subscription_min_occurrences: 3,
            subscription_max_gap_cv: 0.25,
            recommendation_limit: ledgerly_import::DEFAULT_RECOMMENDATION_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub chunk_size: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            chunk_size: ledgerly_storage::DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Contents of `ledgerly.toml`. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Falls back to `<data dir>/ledger.db`.
    pub database_path: Option<PathBuf>,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Currency for accounts created without one.
    pub default_currency: String,
    pub detection: DetectionConfig,
    pub import: ImportConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            log_level: "info".to_string(),
            default_currency: "EUR".to_string(),
            detection: DetectionConfig::default(),
            import: ImportConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        Ok(project_dirs()?.config_dir().join(CONFIG_FILE))
    }

    pub fn resolved_database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(project_dirs()?.data_dir().join(DATABASE_FILE)),
        }
    }
}

fn project_dirs() -> Result<directories::ProjectDirs, ConfigError> {
    directories::ProjectDirs::from("com", "ledgerly", "Ledgerly").ok_or(ConfigError::NoDataDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.log_level, "info");
        assert_eq!(config.default_currency, "EUR");
        assert_eq!(config.detection.transfer_window_days, 3);
        assert_eq!(config.detection.subscription_min_occurrences, 3);
        assert_eq!(config.detection.recommendation_limit, 20);
        assert_eq!(config.import.chunk_size, 50);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = AppConfig::from_toml(
            r#"
            database_path = "/tmp/ledger.db"
            default_currency = "NOK"

            [detection]
            transfer_window_days = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/ledger.db")));
        assert_eq!(config.default_currency, "NOK");
        assert_eq!(config.detection.transfer_window_days, 5);
        assert_eq!(config.detection.subscription_max_gap_cv, 0.25);
        assert_eq!(config.import.chunk_size, 50);
        assert_eq!(
            config.resolved_database_path().unwrap(),
            PathBuf::from("/tmp/ledger.db")
        );
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(matches!(
            AppConfig::from_toml("detection = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }
}
