//! Database module - storage backends, schema and the record primitives
//!
//! Two engines are supported:
//!
//! | Backend    | single writer | `reclaim_space` |
//! |------------|---------------|-----------------|
//! | SQLite     | yes           | `VACUUM`        |
//! | PostgreSQL | no            | no-op           |
//!
//! [`Storage`] owns the pool and the [`WriteGate`]. The primitives here do not
//! take the gate themselves; callers that write hold it around the call.

pub mod gate;

use std::str::FromStr;

use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
};

use crate::error::RecordError;
use crate::models::{Record, Value};
use crate::query::{Order, Placeholder, Predicate};

pub use gate::{GateGuard, WriteGate};

#[derive(Debug, Clone)]
pub enum Backend {
    Sqlite(SqlitePool),
    Postgres(PgPool),
}

impl Backend {
    /// Whether the engine rejects overlapping write transactions
    pub fn single_writer(&self) -> bool {
        matches!(self, Backend::Sqlite(_))
    }

    pub fn placeholder(&self) -> Placeholder {
        match self {
            Backend::Sqlite(_) => Placeholder::Question,
            Backend::Postgres(_) => Placeholder::Dollar,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Sqlite(_) => "sqlite",
            Backend::Postgres(_) => "postgres",
        }
    }
}

/// Result of [`Storage::query`]
#[derive(Debug)]
pub struct QueryPage<R> {
    pub rows: Vec<R>,
    /// Rows matching the predicate, ignoring the page window
    pub total: i64,
    /// Highest matching id, `None` when nothing matches
    pub newest_id: Option<i64>,
}

/// Storage backend adapter
#[derive(Debug, Clone)]
pub struct Storage {
    backend: Backend,
    gate: WriteGate,
}

impl Storage {
    /// Connect to the database named by `url` and pick the backend from its scheme
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, RecordError> {
        if url.starts_with("sqlite:") {
            let in_memory = url.contains(":memory:") || url.contains("mode=memory");
            let mut options = SqliteConnectOptions::from_str(url)?
                .create_if_missing(true)
                .foreign_keys(true);
            if !in_memory {
                options = options.journal_mode(SqliteJournalMode::Wal);
            }

            // An in-memory database lives and dies with its connection
            let pool_options = if in_memory {
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
            } else {
                SqlitePoolOptions::new().max_connections(max_connections)
            };

            let pool = pool_options.connect_with(options).await?;
            Ok(Self::sqlite(pool))
        } else if url.starts_with("postgres:") || url.starts_with("postgresql:") {
            let pool = PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(url)
                .await?;
            Ok(Self::postgres(pool))
        } else {
            let scheme = url.split(':').next().unwrap_or_default();
            Err(RecordError::UnsupportedDatabase(scheme.to_string()))
        }
    }

    pub fn sqlite(pool: SqlitePool) -> Self {
        Self::new(Backend::Sqlite(pool))
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self::new(Backend::Postgres(pool))
    }

    fn new(backend: Backend) -> Self {
        let gate = WriteGate::for_backend(backend.single_writer());
        Self { backend, gate }
    }

    /// Replace the write gate, e.g. to share one gate between several handles
    pub fn with_gate(mut self, gate: WriteGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn gate(&self) -> &WriteGate {
        &self.gate
    }

    pub fn single_writer(&self) -> bool {
        self.backend.single_writer()
    }

    /// Create tables and indexes if they do not exist
    pub async fn migrate(&self) -> Result<(), RecordError> {
        let _guard = self.gate.acquire().await;
        match &self.backend {
            Backend::Sqlite(pool) => {
                sqlx::raw_sql(SQLITE_SCHEMA).execute(pool).await?;
            }
            Backend::Postgres(pool) => {
                sqlx::raw_sql(POSTGRES_SCHEMA).execute(pool).await?;
            }
        }

        tracing::info!("Database schema applied successfully ({})", self.backend.name());
        Ok(())
    }

    /// Insert one record and return it as stored, id included
    pub async fn create<R: Record>(&self, record: &R) -> Result<R, RecordError> {
        let values = record.columns();
        let placeholder = self.backend.placeholder();
        let columns: Vec<&str> = values.iter().map(|(column, _)| *column).collect();
        let marks: Vec<String> = (1..=values.len()).map(|n| placeholder.render(n)).collect();

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            R::TABLE_NAME,
            columns.join(", "),
            marks.join(", ")
        );

        let created = match &self.backend {
            Backend::Sqlite(pool) => {
                let mut query = sqlx::query_as::<_, R>(&sql);
                for (_, value) in values {
                    query = match value {
                        Value::Text(v) => query.bind(v),
                        Value::Nullable(v) => query.bind(v),
                        Value::Timestamp(v) => query.bind(v),
                    };
                }
                query.fetch_one(pool).await?
            }
            Backend::Postgres(pool) => {
                let mut query = sqlx::query_as::<_, R>(&sql);
                for (_, value) in values {
                    query = match value {
                        Value::Text(v) => query.bind(v),
                        Value::Nullable(v) => query.bind(v),
                        Value::Timestamp(v) => query.bind(v),
                    };
                }
                query.fetch_one(pool).await?
            }
        };

        Ok(created)
    }

    /// Fetch one page of matching records plus the total match count.
    ///
    /// Both statements run in one read transaction so the count describes
    /// the same snapshot as the page.
    pub async fn query<R: Record>(
        &self,
        predicate: &Predicate,
        order: Order,
        offset: i64,
        limit: i64,
    ) -> Result<QueryPage<R>, RecordError> {
        let (filter, binds) = predicate.to_sql(self.backend.placeholder());
        let count_sql = format!("SELECT COUNT(*), MAX(id) FROM {}{}", R::TABLE_NAME, filter);
        let page_sql = format!(
            "SELECT * FROM {}{} ORDER BY id {} LIMIT {} OFFSET {}",
            R::TABLE_NAME,
            filter,
            order.as_sql(),
            limit.max(0),
            offset.max(0)
        );

        let ((total, newest_id), rows) = match &self.backend {
            Backend::Sqlite(pool) => {
                let mut tx = pool.begin().await?;

                let mut count = sqlx::query_as::<_, (i64, Option<i64>)>(&count_sql);
                for value in &binds {
                    count = count.bind(value.clone());
                }
                let summary = count.fetch_one(&mut *tx).await?;

                let mut page = sqlx::query_as::<_, R>(&page_sql);
                for value in &binds {
                    page = page.bind(value.clone());
                }
                let rows = page.fetch_all(&mut *tx).await?;

                tx.commit().await?;
                (summary, rows)
            }
            Backend::Postgres(pool) => {
                let mut tx = pool.begin().await?;

                let mut count = sqlx::query_as::<_, (i64, Option<i64>)>(&count_sql);
                for value in &binds {
                    count = count.bind(value.clone());
                }
                let summary = count.fetch_one(&mut *tx).await?;

                let mut page = sqlx::query_as::<_, R>(&page_sql);
                for value in &binds {
                    page = page.bind(value.clone());
                }
                let rows = page.fetch_all(&mut *tx).await?;

                tx.commit().await?;
                (summary, rows)
            }
        };

        Ok(QueryPage {
            rows,
            total,
            newest_id,
        })
    }

    /// Delete every row of `R` matching `predicate`. An empty predicate clears the table.
    pub async fn delete_matching<R: Record>(&self, predicate: &Predicate) -> Result<u64, RecordError> {
        let (filter, binds) = predicate.to_sql(self.backend.placeholder());
        let sql = format!("DELETE FROM {}{}", R::TABLE_NAME, filter);

        let result = match &self.backend {
            Backend::Sqlite(pool) => {
                let mut query = sqlx::query(&sql);
                for value in binds {
                    query = query.bind(value);
                }
                query.execute(pool).await?.rows_affected()
            }
            Backend::Postgres(pool) => {
                let mut query = sqlx::query(&sql);
                for value in binds {
                    query = query.bind(value);
                }
                query.execute(pool).await?.rows_affected()
            }
        };

        Ok(result)
    }

    /// Give space freed by deleted rows back to the filesystem.
    ///
    /// PostgreSQL leaves this to autovacuum.
    pub async fn reclaim_space(&self) -> Result<(), sqlx::Error> {
        match &self.backend {
            Backend::Sqlite(pool) => {
                sqlx::query("VACUUM").execute(pool).await?;
                tracing::debug!("VACUUM completed");
            }
            Backend::Postgres(_) => {}
        }
        Ok(())
    }
}

/// SQLite schema. `AUTOINCREMENT` keeps ids from being reused after deletes.
const SQLITE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS http_rules (
    name TEXT PRIMARY KEY NOT NULL,
    flag_format TEXT NOT NULL,
    rank INTEGER NOT NULL DEFAULT 0,
    push_to_client BOOLEAN NOT NULL DEFAULT 0,
    notice BOOLEAN NOT NULL DEFAULT 0,
    response_status_code TEXT NOT NULL DEFAULT '200',
    response_headers TEXT NOT NULL DEFAULT '[]',
    response_body TEXT NOT NULL DEFAULT '',
    created_at DATETIME NOT NULL
);

CREATE TABLE IF NOT EXISTS http_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    flag TEXT NOT NULL,
    remote_ip TEXT NOT NULL,
    ip_area TEXT NOT NULL DEFAULT '',
    request_time DATETIME NOT NULL,
    rule_name TEXT REFERENCES http_rules(name) ON UPDATE CASCADE ON DELETE SET NULL,
    method TEXT NOT NULL,
    uri TEXT NOT NULL,
    raw_request TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_http_records_flag ON http_records(flag);
CREATE INDEX IF NOT EXISTS idx_http_records_method ON http_records(method);
CREATE INDEX IF NOT EXISTS idx_http_records_remote_ip ON http_records(remote_ip);
CREATE INDEX IF NOT EXISTS idx_http_records_rule ON http_records(rule_name);
"#;

const POSTGRES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS http_rules (
    name VARCHAR(255) PRIMARY KEY,
    flag_format VARCHAR(255) NOT NULL,
    rank INT NOT NULL DEFAULT 0,
    push_to_client BOOLEAN NOT NULL DEFAULT false,
    notice BOOLEAN NOT NULL DEFAULT false,
    response_status_code VARCHAR(10) NOT NULL DEFAULT '200',
    response_headers JSONB NOT NULL DEFAULT '[]',
    response_body TEXT NOT NULL DEFAULT '',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS http_records (
    id BIGSERIAL PRIMARY KEY,
    flag VARCHAR(255) NOT NULL,
    remote_ip VARCHAR(45) NOT NULL,
    ip_area VARCHAR(255) NOT NULL DEFAULT '',
    request_time TIMESTAMPTZ NOT NULL,
    rule_name VARCHAR(255) REFERENCES http_rules(name) ON UPDATE CASCADE ON DELETE SET NULL,
    method VARCHAR(16) NOT NULL,
    uri TEXT NOT NULL,
    raw_request TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_http_records_flag ON http_records(flag);
CREATE INDEX IF NOT EXISTS idx_http_records_method ON http_records(method);
CREATE INDEX IF NOT EXISTS idx_http_records_remote_ip ON http_records(remote_ip);
CREATE INDEX IF NOT EXISTS idx_http_records_rule ON http_records(rule_name);
"#;

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Fresh in-memory SQLite store with the schema applied
    pub(crate) async fn memory_storage() -> Storage {
        let storage = Storage::connect("sqlite::memory:", 1).await.unwrap();
        storage.migrate().await.unwrap();
        storage
    }

    #[tokio::test]
    async fn test_sqlite_is_single_writer() {
        let storage = memory_storage().await;
        assert!(storage.single_writer());
        assert!(storage.gate().is_active());
        assert_eq!(storage.backend().placeholder(), Placeholder::Question);
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let err = Storage::connect("mysql://root@localhost/db", 5).await.unwrap_err();
        assert!(matches!(err, RecordError::UnsupportedDatabase(s) if s == "mysql"));
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let storage = memory_storage().await;
        storage.migrate().await.unwrap();
    }

    #[tokio::test]
    async fn test_injected_gate_replaces_default() {
        let storage = memory_storage().await.with_gate(WriteGate::inert());
        assert!(storage.single_writer());
        assert!(!storage.gate().is_active());
    }

    #[tokio::test]
    async fn test_reclaim_space_on_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("evidence.db").display());
        let storage = Storage::connect(&url, 4).await.unwrap();
        storage.migrate().await.unwrap();

        storage.reclaim_space().await.unwrap();
    }
}
