// Database connection and pool management
// This module handles SQLite database connections using sqlx

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::video::VideoFields;
use crate::infrastructure::config::DatabaseConfig;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_config(database_url, &DatabaseConfig::default()).await
    }

    pub async fn with_config(database_url: &str, config: &DatabaseConfig) -> Result<Self> {
        let db_path = database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:");
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {database_url}"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {database_url}"))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        // Create tables manually for now
        let create_videos_sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS videos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                vod_id INTEGER NOT NULL DEFAULT 0,
                vod_name TEXT NOT NULL UNIQUE,
                type_id INTEGER NOT NULL DEFAULT 0,
                type_name TEXT NOT NULL DEFAULT '',
                {},
                is_localized BOOLEAN NOT NULL DEFAULT 0,
                local_pic TEXT NOT NULL DEFAULT '',
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
            VideoFields::column_definitions().join(",\n                ")
        );

        let create_sources_sql = r#"
            CREATE TABLE IF NOT EXISTS collect_sources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                url TEXT NOT NULL,
                api_type TEXT NOT NULL DEFAULT 'json',
                is_active BOOLEAN NOT NULL DEFAULT 1,
                sort_order INTEGER NOT NULL DEFAULT 0,
                note TEXT NOT NULL DEFAULT '',
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        let create_bindings_sql = r#"
            CREATE TABLE IF NOT EXISTS category_bindings (
                source_id INTEGER NOT NULL,
                remote_type_id INTEGER NOT NULL,
                local_type_id INTEGER NOT NULL,
                PRIMARY KEY (source_id, remote_type_id),
                FOREIGN KEY (source_id) REFERENCES collect_sources (id) ON DELETE CASCADE
            )
        "#;

        let create_logs_sql = r#"
            CREATE TABLE IF NOT EXISTS system_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                log_type TEXT NOT NULL,
                level TEXT NOT NULL,
                module TEXT NOT NULL DEFAULT '',
                message TEXT NOT NULL,
                details TEXT,
                created_at DATETIME NOT NULL
            )
        "#;

        let create_indexes_sql = [
            "CREATE INDEX IF NOT EXISTS idx_videos_vod_id ON videos (vod_id)",
            "CREATE INDEX IF NOT EXISTS idx_videos_type_id ON videos (type_id)",
            "CREATE INDEX IF NOT EXISTS idx_videos_type_name ON videos (type_name)",
            "CREATE INDEX IF NOT EXISTS idx_videos_localized ON videos (is_localized)",
            "CREATE INDEX IF NOT EXISTS idx_logs_type ON system_logs (log_type)",
            "CREATE INDEX IF NOT EXISTS idx_logs_created_at ON system_logs (created_at)",
        ];

        sqlx::query(&create_videos_sql).execute(&self.pool).await?;
        sqlx::query(create_sources_sql).execute(&self.pool).await?;
        sqlx::query(create_bindings_sql).execute(&self.pool).await?;
        sqlx::query(create_logs_sql).execute(&self.pool).await?;
        for sql in create_indexes_sql {
            sqlx::query(sql).execute(&self.pool).await?;
        }

        Ok(())
    }
}
