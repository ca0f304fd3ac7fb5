use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{migrate::MigrateDatabase, Pool, Sqlite};
use tracing::{info, warn};

use crate::config::DatabaseConfig;

pub mod channels;
pub mod fetch_runs;
pub mod filters;
pub mod groups;
pub mod providers;
pub mod snapshots;

/// Embedded schema migrations, applied in filename order.
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial_schema.sql",
    include_str!("../../migrations/001_initial_schema.sql"),
)];

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        if !Sqlite::database_exists(&config.url).await.unwrap_or(false) {
            Sqlite::create_database(&config.url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.unwrap_or(10))
            .connect(&config.url)
            .await?;
        Ok(Self { pool })
    }

    /// Open an in-memory database; test-only convenience. The pool is
    /// capped at one connection because every `:memory:` connection is its
    /// own database.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _schema_migrations (
                name TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for (name, content) in MIGRATIONS {
            let applied: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM _schema_migrations WHERE name = ?",
            )
            .bind(name)
            .fetch_one(&self.pool)
            .await?;

            if applied > 0 {
                continue;
            }

            let mut transaction = self.pool.begin().await?;
            for statement in split_sql_statements(content) {
                sqlx::query(&statement)
                    .execute(&mut *transaction)
                    .await
                    .map_err(|e| anyhow::anyhow!("migration {} failed: {}", name, e))?;
            }
            sqlx::query("INSERT INTO _schema_migrations (name, applied_at) VALUES (?, ?)")
                .bind(name)
                .bind(Utc::now().to_rfc3339())
                .execute(&mut *transaction)
                .await?;
            transaction.commit().await?;
            info!("Applied migration: {}", name);
        }

        Ok(())
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

/// Split a migration file into individual statements. SQLite executes one
/// statement per query; the schema files contain no string literals with
/// semicolons so a plain split is adequate.
fn split_sql_statements(content: &str) -> Vec<String> {
    content
        .split(';')
        .map(|s| {
            s.lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse a timestamp from either RFC3339 or the bare SQLite datetime format.
pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc());
    }
    Err(anyhow::anyhow!("failed to parse datetime: {}", s))
}

/// Whether an sqlx error looks like transient SQLite lock contention.
fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            let message = db.message().to_ascii_lowercase();
            message.contains("database is locked") || message.contains("database table is locked")
        }
        _ => false,
    }
}

/// Run a fallible database operation, retrying once on transient lock
/// contention. Constraint violations and other errors surface immediately.
pub(crate) async fn with_retry<T, F, Fut>(label: &str, mut op: F) -> Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(err) if is_transient(&err) => {
            warn!("{}: transient contention, retrying once: {}", label, err);
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            op().await
        }
        Err(err) => Err(err),
    }
}
