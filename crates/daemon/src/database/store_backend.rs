use async_trait::async_trait;
use bytes::Bytes;
use sqlx::Row;

use common::prelude::{Change, CommitRecord, PersistedState, Recipients, SecretPath, StoreBackend};

use crate::database::Database;

const KIND_DIR: &str = "dir";
const KIND_SECRET: &str = "secret";
const KIND_REMOVED: &str = "removed";

#[derive(Debug, thiserror::Error)]
pub enum DatabaseBackendError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("corrupt row for {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

/// One row of the commit log, without its changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub version: u64,
    pub previous: Option<u64>,
    pub author: Option<String>,
    pub message: Option<String>,
    pub change_count: u64,
}

impl Database {
    /// Most recent commits, newest first
    pub async fn recent_commits(&self, limit: u32) -> Result<Vec<CommitSummary>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT version, previous, author, message, change_count
            FROM commits
            ORDER BY version DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&**self)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(CommitSummary {
                    version: row.try_get::<i64, _>("version")? as u64,
                    previous: row.try_get::<Option<i64>, _>("previous")?.map(|v| v as u64),
                    author: row.try_get("author")?,
                    message: row.try_get("message")?,
                    change_count: row.try_get::<i64, _>("change_count")? as u64,
                })
            })
            .collect()
    }

    /// Paths touched by a commit, in path order
    pub async fn changed_paths(&self, version: u64) -> Result<Vec<(String, String)>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT path, kind
            FROM changes
            WHERE version = $1
            ORDER BY path
            "#,
        )
        .bind(version as i64)
        .fetch_all(&**self)
        .await?;

        rows.into_iter()
            .map(|row| Ok((row.try_get("path")?, row.try_get("kind")?)))
            .collect()
    }
}

fn encode_recipients(recipients: &Recipients) -> String {
    recipients
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn decode_recipients(path: &str, raw: &str) -> Result<Recipients, DatabaseBackendError> {
    Recipients::parse(raw.split(',').filter(|id| !id.is_empty())).map_err(|e| {
        DatabaseBackendError::Corrupt {
            path: path.to_string(),
            reason: e.to_string(),
        }
    })
}

fn decode_entry(
    path: String,
    kind: &str,
    recipients: &str,
    ciphertext: Option<Vec<u8>>,
) -> Result<Change, DatabaseBackendError> {
    let secret_path = SecretPath::new(&path);
    match kind {
        KIND_DIR => Ok(Change::Dir {
            recipients: decode_recipients(&path, recipients)?,
            path: secret_path,
        }),
        KIND_SECRET => {
            let ciphertext = ciphertext.ok_or_else(|| DatabaseBackendError::Corrupt {
                path: path.clone(),
                reason: "secret without ciphertext".to_string(),
            })?;
            Ok(Change::Secret {
                path: secret_path,
                ciphertext: Bytes::from(ciphertext),
            })
        }
        other => Err(DatabaseBackendError::Corrupt {
            path,
            reason: format!("unknown kind {}", other),
        }),
    }
}

#[async_trait]
impl StoreBackend for Database {
    type Error = DatabaseBackendError;

    async fn load(&self) -> Result<Option<PersistedState>, Self::Error> {
        let head: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM commits")
            .fetch_one(&**self)
            .await?;
        let Some(version) = head else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r#"
            SELECT path, kind, recipients, ciphertext
            FROM entries
            "#,
        )
        .fetch_all(&**self)
        .await?;

        let mut entries = rows
            .into_iter()
            .map(|row| {
                let path: String = row.try_get("path")?;
                let kind: String = row.try_get("kind")?;
                let recipients: String = row.try_get("recipients")?;
                let ciphertext: Option<Vec<u8>> = row.try_get("ciphertext")?;
                decode_entry(path, &kind, &recipients, ciphertext)
            })
            .collect::<Result<Vec<_>, _>>()?;
        // replay needs parents before children
        entries.sort_by(|a, b| a.path().cmp(b.path()));

        tracing::debug!(version, entries = entries.len(), "loaded secret tree from sqlite");
        Ok(Some(PersistedState {
            version: version as u64,
            entries,
        }))
    }

    async fn append(&self, record: &CommitRecord) -> Result<(), Self::Error> {
        let version = record.version as i64;
        let mut tx = self.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO commits (version, previous, author, message, change_count)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(version)
        .bind(record.previous.map(|v| v as i64))
        .bind(record.author.as_deref())
        .bind(record.message.as_deref())
        .bind(record.changes.len() as i64)
        .execute(&mut *tx)
        .await?;

        for change in record.changes.iter() {
            let path = change.path().to_string();
            let kind = match change {
                Change::Removed { .. } => {
                    sqlx::query("DELETE FROM entries WHERE path = $1")
                        .bind(&path)
                        .execute(&mut *tx)
                        .await?;
                    KIND_REMOVED
                }
                Change::Dir { recipients, .. } => {
                    sqlx::query(
                        r#"
                        INSERT INTO entries (path, kind, recipients, ciphertext, version)
                        VALUES ($1, $2, $3, NULL, $4)
                        ON CONFLICT (path) DO UPDATE SET
                            kind = excluded.kind,
                            recipients = excluded.recipients,
                            ciphertext = NULL,
                            version = excluded.version
                        "#,
                    )
                    .bind(&path)
                    .bind(KIND_DIR)
                    .bind(encode_recipients(recipients))
                    .bind(version)
                    .execute(&mut *tx)
                    .await?;
                    KIND_DIR
                }
                Change::Secret { ciphertext, .. } => {
                    sqlx::query(
                        r#"
                        INSERT INTO entries (path, kind, recipients, ciphertext, version)
                        VALUES ($1, $2, '', $3, $4)
                        ON CONFLICT (path) DO UPDATE SET
                            kind = excluded.kind,
                            recipients = '',
                            ciphertext = excluded.ciphertext,
                            version = excluded.version
                        "#,
                    )
                    .bind(&path)
                    .bind(KIND_SECRET)
                    .bind(ciphertext.as_ref())
                    .bind(version)
                    .execute(&mut *tx)
                    .await?;
                    KIND_SECRET
                }
            };

            sqlx::query("INSERT INTO changes (version, path, kind) VALUES ($1, $2, $3)")
                .bind(version)
                .bind(&path)
                .bind(kind)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
