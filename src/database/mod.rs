use crate::assets::MigrationAssets;
use crate::config::DatabaseConfig;
use crate::errors::{StoreError, StoreResult};
use anyhow::Result;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Executor, Pool, Sqlite};
use tracing::{debug, info};

pub mod plugin_data;

pub use plugin_data::PluginDataEntry;

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub fn pool(&self) -> Pool<Sqlite> {
        self.pool.clone()
    }

    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let in_memory = config.url.contains(":memory:");

        // Create database if it doesn't exist (for SQLite)
        if !in_memory && !Sqlite::database_exists(&config.url).await? {
            Sqlite::create_database(&config.url).await?;
        }

        // Every connection to an in-memory database is its own database
        let max_connections = if in_memory {
            1
        } else {
            config.max_connections.unwrap_or(5).max(1)
        };

        let mut options = SqlitePoolOptions::new().max_connections(max_connections);
        if in_memory {
            options = options.idle_timeout(None).max_lifetime(None);
        }
        let pool = options.connect(&config.url).await?;

        debug!(
            "Connected to {} with {} max connections",
            config.url, max_connections
        );

        Ok(Self { pool })
    }

    /// In-memory database with migrations applied
    pub async fn in_memory() -> Result<Self> {
        let database = Self::new(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: Some(1),
        })
        .await?;
        database.migrate().await?;
        Ok(database)
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        self.run_embedded_migrations().await
    }

    async fn run_embedded_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _sqlx_migrations (
                version BIGINT PRIMARY KEY,
                description TEXT NOT NULL,
                installed_on TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                success BOOLEAN NOT NULL,
                checksum BLOB NOT NULL,
                execution_time BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::query_failed("create _sqlx_migrations", e.to_string()))?;

        for (name, content) in MigrationAssets::get_migrations() {
            // "001_plugin_data.sql" -> 1
            let version: i64 = name
                .split('_')
                .next()
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| StoreError::MigrationFailed {
                    version: name.clone(),
                    message: "file name does not start with a numeric version".to_string(),
                })?;

            let applied = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM _sqlx_migrations WHERE version = ? AND success = true",
            )
            .bind(version)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::query_failed("select _sqlx_migrations", e.to_string()))?;

            if applied > 0 {
                continue;
            }

            let start = std::time::Instant::now();
            let migration_failed = |e: sqlx::Error| StoreError::MigrationFailed {
                version: name.clone(),
                message: e.to_string(),
            };

            let mut transaction = self.pool.begin().await.map_err(migration_failed)?;
            (&mut *transaction)
                .execute(content.as_str())
                .await
                .map_err(migration_failed)?;

            let execution_time = start.elapsed().as_millis() as i64;
            sqlx::query(
                r#"
                INSERT INTO _sqlx_migrations (version, description, success, checksum, execution_time)
                VALUES (?, ?, true, ?, ?)
                "#,
            )
            .bind(version)
            .bind(&name)
            .bind(Self::calculate_checksum(&content))
            .bind(execution_time)
            .execute(&mut *transaction)
            .await
            .map_err(migration_failed)?;

            transaction.commit().await.map_err(migration_failed)?;
            info!("Applied migration: {} ({}ms)", name, execution_time);
        }

        Ok(())
    }

    fn calculate_checksum(content: &str) -> Vec<u8> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        hasher.finish().to_be_bytes().to_vec()
    }
}
