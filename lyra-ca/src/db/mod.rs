//! Database access for lyra-ca
//!
//! One SQLite file in the root folder holds the key-value `settings` table and
//! the durable corpus cache.

pub mod settings;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Creates the file (and its parent folder) on first use.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Use proper SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create lyra-ca tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS corpus_cache (
            cache_key TEXT PRIMARY KEY,
            schema_version INTEGER NOT NULL,
            payload BLOB NOT NULL,
            loaded_at_ms INTEGER NOT NULL,
            payload_bytes INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Startup purge scans by age
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_corpus_cache_loaded_at ON corpus_cache(loaded_at_ms)")
        .execute(pool)
        .await?;

    tracing::info!("Database tables initialized (settings, corpus_cache)");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_creates_file_and_tables() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("lyra.db");

        let pool = init_database_pool(&db_path).await.unwrap();
        assert!(db_path.exists());

        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert!(tables.contains(&"settings".to_string()));
        assert!(tables.contains(&"corpus_cache".to_string()));
    }

    #[tokio::test]
    async fn test_init_tables_is_idempotent() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        init_tables(&pool).await.unwrap();
        init_tables(&pool).await.unwrap();
    }
}
