use url::Url;

use common::prelude::{SecretStore, StoreConfig, StoreError};

use crate::database::{Database, DatabaseSetupError};
use crate::service_config::Config;

/// Main service state, shared by every request handler
#[derive(Clone)]
pub struct State {
    database: Database,
    store: SecretStore<Database>,
    container_suffix: String,
    identity_header: String,
}

impl State {
    pub async fn from_config(config: &Config) -> Result<Self, StateSetupError> {
        // 1. Setup database
        let sqlite_database_url = match config.sqlite_path {
            Some(ref path) => {
                if !path.exists() {
                    return Err(StateSetupError::DatabasePathDoesNotExist);
                }
                Url::parse(&format!("sqlite://{}", path.display()))
                    .map_err(|_| StateSetupError::InvalidDatabaseUrl)
            }
            // otherwise just set up an in-memory database
            None => Url::parse("sqlite::memory:").map_err(|_| StateSetupError::InvalidDatabaseUrl),
        }?;
        tracing::info!("Database URL: {:?}", sqlite_database_url);
        let database = Database::connect(&sqlite_database_url).await?;

        // 2. Open the secret tree on top of it
        let store_config = StoreConfig::new(config.root_recipients.clone())
            .with_lock_timeout(config.lock_timeout);
        let store = SecretStore::open(database.clone(), store_config).await?;
        tracing::info!(version = store.version(), "secret store ready");

        Ok(Self::new(
            database,
            store,
            config.container_suffix.clone(),
            config.identity_header.clone(),
        ))
    }

    pub fn new(
        database: Database,
        store: SecretStore<Database>,
        container_suffix: impl Into<String>,
        identity_header: impl Into<String>,
    ) -> Self {
        Self {
            database,
            store,
            container_suffix: container_suffix.into(),
            identity_header: identity_header.into().to_ascii_lowercase(),
        }
    }

    pub fn store(&self) -> &SecretStore<Database> {
        &self.store
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn container_suffix(&self) -> &str {
        &self.container_suffix
    }

    pub fn identity_header(&self) -> &str {
        &self.identity_header
    }
}

impl AsRef<SecretStore<Database>> for State {
    fn as_ref(&self) -> &SecretStore<Database> {
        &self.store
    }
}

impl AsRef<Database> for State {
    fn as_ref(&self) -> &Database {
        self.database()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("Database path does not exist")]
    DatabasePathDoesNotExist,
    #[error("Database setup error")]
    DatabaseSetupError(#[from] DatabaseSetupError),
    #[error("Invalid database URL")]
    InvalidDatabaseUrl,
    #[error("Secret store error: {0}")]
    Store(#[from] StoreError),
}
