//! # SQLite Ledger Store
//!
//! Persists every collection in a single `documents` table.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      SQLite Ledger Store                                │
//! │                                                                         │
//! │  DbConfig::new(path) ← Configure pool settings                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SqliteStore::open(config).await ← Create pool + run migrations        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │  documents                              │                           │
//! │  │  seq │ collection │ id │ body (JSON)    │                           │
//! │  │  1   │ factories  │ f1 │ {"name":...}   │                           │
//! │  │  2   │ products   │ p1 │ {"type":...}   │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       │ commit(batch) = BEGIN IMMEDIATE … COMMIT                       │
//! │       ▼                                                                 │
//! │  Notifier ──► subscribers of each touched collection                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! SQLite WAL (Write-Ahead Logging) mode is enabled so readers don't block
//! the single writer.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool};
use tracing::{debug, info, warn};

use super::notify::{Notifier, Subscription};
use super::{merge_fields, Collection, Document, LedgerStore, WriteBatch, WriteOp};
use crate::error::{DbError, DbResult};
use crate::migrations;

// =============================================================================
// Configuration
// =============================================================================

/// SQLite store configuration.
///
/// ## Example
/// ```rust
/// use ombor_db::DbConfig;
///
/// let config = DbConfig::new("/tmp/ombor.db").max_connections(4);
/// assert_eq!(config.max_connections, 4);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// How long to wait for a connection before reporting `Unavailable`.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a configuration for the given database file.
    /// The file is created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1, // In-memory requires single connection
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            run_migrations: true,
        }
    }

    fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == ":memory:"
    }
}

// =============================================================================
// Store
// =============================================================================

/// Ledger Store backed by SQLite. Batches are atomic.
#[derive(Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
    notifier: Notifier,
}

impl SqliteStore {
    /// Opens (and if needed creates and migrates) the database.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures WAL mode and NORMAL synchronous
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    /// 5. Loads every collection once so subscribers start from real data
    pub async fn open(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Opening SQLite ledger store"
        );

        let connect_options = if config.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
        } else {
            SqliteConnectOptions::from_str(&format!(
                "sqlite://{}?mode=rwc",
                config.database_path.display()
            ))
        }
        .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(config.connect_timeout)
        .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "SQLite pool created"
        );

        let store = SqliteStore {
            pool,
            notifier: Notifier::new(),
        };

        if config.run_migrations {
            store.run_migrations().await?;
        }

        for collection in Collection::ALL {
            let revision = store.notifier.next_revision();
            let docs = store.load(collection).await?;
            store.notifier.publish(collection, revision, docs);
        }

        Ok(store)
    }

    /// Runs the embedded migrations. Safe to call more than once.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running ledger store migrations");
        migrations::run_migrations(&self.pool).await?;
        Ok(())
    }

    /// Returns the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes the pool. Later calls fail with `Unavailable`.
    pub async fn close(&self) {
        info!("Closing SQLite ledger store");
        self.pool.close().await;
    }

    async fn load(&self, collection: Collection) -> DbResult<Vec<Document>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT id, body FROM documents WHERE collection = ?1 ORDER BY seq",
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, body)| -> DbResult<Document> {
                Ok(Document {
                    body: serde_json::from_str(&body)?,
                    id,
                })
            })
            .collect()
    }

    async fn apply(conn: &mut PoolConnection<Sqlite>, op: &WriteOp) -> DbResult<()> {
        let now = Utc::now().to_rfc3339();
        match op {
            WriteOp::Create { collection, id, body } => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO documents (collection, id, body, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?4)
                    ON CONFLICT (collection, id) DO NOTHING
                    "#,
                )
                .bind(collection.as_str())
                .bind(id.as_str())
                .bind(serde_json::to_string(body)?)
                .bind(now.as_str())
                .execute(&mut **conn)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(DbError::duplicate(collection.as_str(), id.as_str()));
                }
            }
            WriteOp::Patch {
                collection,
                id,
                fields,
                expect,
            } => {
                let current: Option<(String,)> = sqlx::query_as(
                    "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                )
                .bind(collection.as_str())
                .bind(id.as_str())
                .fetch_optional(&mut **conn)
                .await?;

                let (body,) =
                    current.ok_or_else(|| DbError::not_found(collection.as_str(), id.as_str()))?;
                let mut body: serde_json::Value = serde_json::from_str(&body)?;
                if let Some(expect) = expect {
                    expect.check(*collection, id, &body)?;
                }
                merge_fields(&mut body, fields)?;

                sqlx::query(
                    "UPDATE documents SET body = ?1, updated_at = ?2 WHERE collection = ?3 AND id = ?4",
                )
                .bind(serde_json::to_string(&body)?)
                .bind(now.as_str())
                .bind(collection.as_str())
                .bind(id.as_str())
                .execute(&mut **conn)
                .await?;
            }
            WriteOp::Delete { collection, id } => {
                sqlx::query("DELETE FROM documents WHERE collection = ?1 AND id = ?2")
                    .bind(collection.as_str())
                    .bind(id.as_str())
                    .execute(&mut **conn)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn supports_atomic_batch(&self) -> bool {
        true
    }

    async fn list(&self, collection: Collection) -> DbResult<Vec<Document>> {
        self.load(collection).await
    }

    async fn get(&self, collection: Collection, id: &str) -> DbResult<Option<Document>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT body FROM documents WHERE collection = ?1 AND id = ?2")
                .bind(collection.as_str())
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(body,)| -> DbResult<Document> {
            Ok(Document {
                id: id.to_string(),
                body: serde_json::from_str(&body)?,
            })
        })
        .transpose()
    }

    async fn commit(&self, batch: WriteBatch) -> DbResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut conn = self.pool.acquire().await?;
        // IMMEDIATE takes the write lock up front so guarded reads stay valid
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let mut outcome = Ok(());
        for op in &batch.ops {
            if let Err(e) = Self::apply(&mut conn, op).await {
                outcome = Err(e);
                break;
            }
        }

        let outcome = match outcome {
            Ok(()) => sqlx::query("COMMIT")
                .execute(&mut *conn)
                .await
                .map(|_| ())
                .map_err(DbError::from),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {}
            Err(e) => {
                if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                    warn!(error = %rollback, "Rollback failed");
                }
                return Err(e);
            }
        }
        drop(conn);

        debug!(ops = batch.len(), "Batch committed");

        for collection in batch.collections() {
            let revision = self.notifier.next_revision();
            match self.load(collection).await {
                Ok(docs) => self.notifier.publish(collection, revision, docs),
                Err(e) => warn!(%collection, error = %e, "Could not refresh subscribers"),
            }
        }
        Ok(())
    }

    fn subscribe(&self, collection: Collection) -> Subscription {
        self.notifier.subscribe(collection)
    }

    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
