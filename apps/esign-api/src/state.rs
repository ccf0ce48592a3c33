//! Application state for the esign API

use anyhow::{Context, Result};
use esign_core::AssetStore;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::PathBuf;

use crate::config::Config;

pub struct AppState {
    pub db: SqlitePool,
    pub config: Config,
    /// Normalized signature PNGs
    pub assets: AssetStore,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        tracing::info!("Connecting to database: {}", config.database_url);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&config.database_url)
            .await?;

        Self::with_pool(pool, config).await
    }

    /// Build state over an existing pool, creating storage and tables as needed
    pub async fn with_pool(pool: SqlitePool, config: Config) -> Result<Self> {
        for dir in [config.documents_dir(), config.signatures_dir()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Creating storage directory {}", dir.display()))?;
        }

        Self::run_migrations(&pool).await?;

        Ok(Self {
            db: pool,
            assets: AssetStore::new(config.signatures_dir()),
            config,
        })
    }

    pub fn document_path(&self, file_name: &str) -> PathBuf {
        self.config.documents_dir().join(file_name)
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        tracing::info!("Running database migrations...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                role TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signatures (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                file_name TEXT NOT NULL,
                kind TEXT NOT NULL DEFAULT 'signature',
                display_name TEXT,
                width INTEGER NOT NULL DEFAULT 0,
                height INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 0,
                is_default INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                original_filename TEXT NOT NULL,
                file_name TEXT NOT NULL,
                page_count INTEGER NOT NULL,
                uploaded_by TEXT NOT NULL REFERENCES users(id),
                client TEXT,
                work TEXT,
                document_type TEXT,
                comment TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                placements_json TEXT,
                signed_file_name TEXT,
                signed_by TEXT REFERENCES users(id),
                signing_method TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                signed_at TEXT
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_signatures_owner_kind ON signatures(user_id, kind)
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status)
            "#,
        )
        .execute(pool)
        .await?;

        tracing::info!("Migrations complete");
        Ok(())
    }
}
