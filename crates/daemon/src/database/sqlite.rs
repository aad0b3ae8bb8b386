use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use super::DatabaseSetupError;

/// In-memory databases are private to a connection, so they
///  only ever get one
const MEMORY_MAX_CONNECTIONS: u32 = 1;
const FILE_MAX_CONNECTIONS: u32 = 8;

pub async fn connect_sqlite(database_url: &url::Url) -> Result<SqlitePool, DatabaseSetupError> {
    let in_memory = database_url.as_str().contains(":memory:");
    let mut options = SqliteConnectOptions::from_str(database_url.as_str())?
        .create_if_missing(true)
        .foreign_keys(true);
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let max_connections = if in_memory {
        MEMORY_MAX_CONNECTIONS
    } else {
        FILE_MAX_CONNECTIONS
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        // an in-memory database vanishes with its last connection
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    Ok(pool)
}

pub async fn migrate_sqlite(pool: &SqlitePool) -> Result<(), DatabaseSetupError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
