use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use taskdeps_config::DatabaseConfig;
use taskdeps_domain::Repositories;
use taskdeps_errors::DependencyResult;
use tracing::{debug, info};

use super::migrations;
use super::sqlite::{
    SqliteDependencyRepository, SqliteNotificationLogRepository, SqliteNotificationRepository,
    SqlitePreferenceRepository, SqliteTaskRepository,
};

pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// Opens the pool with foreign keys enforced. In-memory databases are
    /// pinned to one never-recycled connection, since each SQLite connection
    /// would otherwise see its own empty database.
    pub async fn new(config: &DatabaseConfig) -> DependencyResult<Self> {
        let in_memory = config.url.contains(":memory:");
        debug!(url = %config.url, in_memory, "opening SQLite pool");

        let mut connect_options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);
        if !in_memory {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        }

        let mut pool_options = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds));
        pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
                .max_lifetime(Duration::from_secs(1800)) // 30分钟默认生命周期
        };

        let pool = pool_options.connect_with(connect_options).await?;
        Ok(Self { pool })
    }

    /// In-memory database with the schema already applied.
    pub async fn in_memory() -> DependencyResult<Self> {
        let manager = Self::new(&DatabaseConfig::in_memory()).await?;
        manager.migrate().await?;
        Ok(manager)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> DependencyResult<()> {
        migrations::run_migrations(&self.pool).await?;
        info!("database schema is up to date");
        Ok(())
    }

    pub async fn health_check(&self) -> DependencyResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Every repository bound to this pool.
    pub fn repositories(&self) -> Repositories {
        Repositories {
            tasks: Arc::new(SqliteTaskRepository::new(self.pool.clone())),
            dependencies: Arc::new(SqliteDependencyRepository::new(self.pool.clone())),
            notifications: Arc::new(SqliteNotificationRepository::new(self.pool.clone())),
            preferences: Arc::new(SqlitePreferenceRepository::new(self.pool.clone())),
            logs: Arc::new(SqliteNotificationLogRepository::new(self.pool.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_manager_is_healthy() {
        let manager = DatabaseManager::in_memory().await.unwrap();
        manager.health_check().await.unwrap();
        // migrations are idempotent
        manager.migrate().await.unwrap();
        manager.close().await;
    }

    #[tokio::test]
    async fn test_file_database_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deps.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", path.display()),
            ..DatabaseConfig::default()
        };

        let manager = DatabaseManager::new(&config).await.unwrap();
        manager.migrate().await.unwrap();
        manager.health_check().await.unwrap();
        manager.close().await;
        assert!(path.exists());
    }
}
