use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};

use common::prelude::{Recipients, DEFAULT_CONTAINER_SUFFIX};

pub const APP_NAME: &str = "passd";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "db.sqlite";
pub const LOGS_DIR_NAME: &str = "logs";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Port for the API server
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Policy of the root directory, applied when the store is first created
    #[serde(default)]
    pub root_recipients: Recipients,
    /// Suffix that marks a file as an encrypted secret
    #[serde(default = "default_container_suffix")]
    pub container_suffix: String,
    /// Request header carrying the authenticated user name
    #[serde(default = "default_identity_header")]
    pub identity_header: String,
    /// Upper bound on waiting for the store's locks
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_api_port() -> u16 {
    5001
}

fn default_container_suffix() -> String {
    DEFAULT_CONTAINER_SUFFIX.to_string()
}

fn default_identity_header() -> String {
    "x-passd-user".to_string()
}

fn default_lock_timeout_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            root_recipients: Recipients::new(),
            container_suffix: default_container_suffix(),
            identity_header: default_identity_header(),
            lock_timeout_ms: default_lock_timeout_ms(),
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// The configured log level, falling back to INFO if it does not parse
    pub fn tracing_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the passd directory (~/.passd)
    pub passd_dir: PathBuf,
    /// Path to the SQLite database
    pub db_path: PathBuf,
    /// Path to the default log directory
    pub logs_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the passd directory path (custom or default ~/.passd)
    pub fn passd_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new passd state directory
    pub fn init(custom_path: Option<PathBuf>, config: AppConfig) -> Result<Self, StateError> {
        if config.root_recipients.is_empty() {
            return Err(StateError::NoRootRecipients);
        }

        let passd_dir = Self::passd_dir(custom_path)?;
        if passd_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&passd_dir)?;

        let logs_path = passd_dir.join(LOGS_DIR_NAME);
        fs::create_dir_all(&logs_path)?;

        let config_path = passd_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        // The service creates the schema on first start
        let db_path = passd_dir.join(DB_FILE_NAME);
        fs::write(&db_path, "")?;

        Ok(Self {
            passd_dir,
            db_path,
            logs_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the passd directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let passd_dir = Self::passd_dir(custom_path)?;

        if !passd_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let db_path = passd_dir.join(DB_FILE_NAME);
        let logs_path = passd_dir.join(LOGS_DIR_NAME);
        let config_path = passd_dir.join(CONFIG_FILE_NAME);

        if !db_path.exists() {
            return Err(StateError::MissingFile(DB_FILE_NAME.to_string()));
        }
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            passd_dir,
            db_path,
            logs_path,
            config_path,
            config,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("passd directory not initialized. Run 'passd init' first")]
    NotInitialized,

    #[error("passd directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("at least one root recipient is required")]
    NoRootRecipients,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::prelude::Recipient;

    fn config() -> AppConfig {
        AppConfig {
            root_recipients: vec![Recipient::from_u64(0xA1)].into(),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_init_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("passd");

        let state = AppState::init(Some(dir.clone()), config()).unwrap();
        assert!(state.db_path.exists());
        assert!(state.logs_path.is_dir());

        let loaded = AppState::load(Some(dir.clone())).unwrap();
        assert_eq!(loaded.config, config());

        assert!(matches!(
            AppState::init(Some(dir), config()),
            Err(StateError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_init_requires_root_recipients() {
        let tmp = tempfile::tempdir().unwrap();
        let result = AppState::init(Some(tmp.path().join("passd")), AppConfig::default());
        assert!(matches!(result, Err(StateError::NoRootRecipients)));
    }

    #[test]
    fn test_load_fills_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_path_buf();
        fs::write(dir.join(DB_FILE_NAME), "").unwrap();
        fs::write(
            dir.join(CONFIG_FILE_NAME),
            "root_recipients = [\"00000000000000A1\"]\n",
        )
        .unwrap();

        let state = AppState::load(Some(dir)).unwrap();
        assert_eq!(state.config.api_port, 5001);
        assert_eq!(state.config.container_suffix, ".gpg");
        assert_eq!(state.config.identity_header, "x-passd-user");
        assert_eq!(state.config.lock_timeout_ms, 500);
        assert_eq!(state.config.tracing_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_load_uninitialized() {
        let tmp = tempfile::tempdir().unwrap();
        let result = AppState::load(Some(tmp.path().join("missing")));
        assert!(matches!(result, Err(StateError::NotInitialized)));
    }
}
