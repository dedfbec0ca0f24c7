//! SQLite persistence backend.
#![allow(clippy::collapsible_if)]

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use ppob_types::ports::{Change, ChangeOp, ChangeSet, Snapshot};
use ppob_types::{PersistenceBackend, RepoError, StoreKey};

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Backend
// ─────────────────────────────────────────────────────────────────────────────

/// Aggregate snapshots in a single `aggregates` table.
pub struct SqliteBackend {
    pool: SqlitePool,
}

fn db(err: sqlx::Error) -> RepoError {
    RepoError::Database(err.to_string())
}

fn to_version(raw: i64) -> Result<u64, RepoError> {
    u64::try_from(raw).map_err(|_| RepoError::Database(format!("negative version {raw}")))
}

fn to_raw(version: u64) -> Result<i64, RepoError> {
    i64::try_from(version).map_err(|_| RepoError::Database(format!("version {version} overflows")))
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

impl SqliteBackend {
    /// Connects and creates the schema.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            // Remove query parameters
            let path = path.split('?').next().unwrap_or(path);
            if path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        // Every in-memory connection is its own database, so keep exactly one
        // alive for the life of the pool.
        let pool_options = if is_in_memory(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(8)
        };
        let pool = pool_options.connect_with(options).await?;

        let backend = Self { pool };
        backend.create_schema().await?;
        Ok(backend)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn create_schema(&self) -> Result<(), RepoError> {
        let ddl = include_str!("../migrations/0001_create_aggregates.sql");
        sqlx::query(ddl).execute(&self.pool).await.map_err(db)?;
        Ok(())
    }
}

async fn current_version(
    conn: &mut sqlx::SqliteConnection,
    key: &StoreKey,
) -> Result<u64, RepoError> {
    let row = sqlx::query(r#"SELECT version FROM aggregates WHERE kind = ? AND id = ?"#)
        .bind(&key.kind)
        .bind(&key.id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db)?;

    match row {
        Some(row) => to_version(row.try_get::<i64, _>("version").map_err(db)?),
        None => Ok(0),
    }
}

async fn conflict(conn: &mut sqlx::SqliteConnection, change: &Change) -> RepoError {
    match current_version(conn, &change.key).await {
        Ok(actual) => RepoError::Conflict {
            kind: change.key.kind.clone(),
            id: change.key.id.clone(),
            expected: change.expected_version,
            actual,
        },
        Err(e) => e,
    }
}

async fn write_change(
    conn: &mut sqlx::SqliteConnection,
    change: &Change,
    now: &str,
) -> Result<bool, RepoError> {
    let expected = to_raw(change.expected_version)?;
    let body = match &change.op {
        ChangeOp::Put(value) => Some(serde_json::to_string(value)?),
        ChangeOp::Delete => None,
        ChangeOp::Check => return Ok(true),
    };

    let result = if change.expected_version == 0 {
        sqlx::query(
            r#"INSERT INTO aggregates (kind, id, version, body, updated_at) VALUES (?, ?, 1, ?, ?)
               ON CONFLICT (kind, id) DO NOTHING"#,
        )
        .bind(&change.key.kind)
        .bind(&change.key.id)
        .bind(&body)
        .bind(now)
        .execute(&mut *conn)
        .await
    } else {
        sqlx::query(
            r#"UPDATE aggregates SET version = version + 1, body = ?, updated_at = ?
               WHERE kind = ? AND id = ? AND version = ?"#,
        )
        .bind(&body)
        .bind(now)
        .bind(&change.key.kind)
        .bind(&change.key.id)
        .bind(expected)
        .execute(&mut *conn)
        .await
    }
    .map_err(db)?;

    Ok(result.rows_affected() == 1)
}

// ─────────────────────────────────────────────────────────────────────────────
// Port implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl PersistenceBackend for SqliteBackend {
    async fn load(&self, key: &StoreKey) -> Result<Snapshot, RepoError> {
        let row = sqlx::query(r#"SELECT version, body FROM aggregates WHERE kind = ? AND id = ?"#)
            .bind(&key.kind)
            .bind(&key.id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

        let Some(row) = row else {
            return Ok(Snapshot::default());
        };
        let version = to_version(row.try_get::<i64, _>("version").map_err(db)?)?;
        let body = match row.try_get::<Option<String>, _>("body").map_err(db)? {
            Some(text) => Some(serde_json::from_str(&text)?),
            None => None,
        };
        Ok(Snapshot { version, body })
    }

    async fn apply(&self, changes: &ChangeSet) -> Result<(), RepoError> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        let now = chrono::Utc::now().to_rfc3339();

        // Writes first: the first write takes SQLite's write lock, so the
        // version checks that follow read a state no other writer can change.
        for change in changes.changes().iter().filter(|c| c.op != ChangeOp::Check) {
            if !write_change(&mut *tx, change, &now).await? {
                return Err(conflict(&mut *tx, change).await);
            }
        }
        for change in changes.changes().iter().filter(|c| c.op == ChangeOp::Check) {
            if current_version(&mut *tx, &change.key).await? != change.expected_version {
                return Err(conflict(&mut *tx, change).await);
            }
        }

        tx.commit().await.map_err(db)?;
        debug!(keys = changes.len(), "sqlite backend applied change set");
        Ok(())
    }
}
