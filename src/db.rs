//! Document store lookups.
//!
//! Trail documents (coordinates and route polylines) and user profile
//! documents live in Postgres as JSONB, one document per natural key. They
//! are written by the import scripts and the profile service; this crate
//! only reads them.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgPool, Row};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Read access to per-trail and per-user documents.
#[async_trait]
pub trait TrailDocuments: Send + Sync {
    /// Raw trail document keyed by trail name.
    async fn trail(&self, name: &str) -> Result<Option<Value>, StoreError>;

    /// The `music_taste` field of a user profile, if set.
    async fn music_taste(&self, user_id: &str) -> Result<Option<String>, StoreError>;
}

pub async fn init_db(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trail_documents (
            name VARCHAR PRIMARY KEY,
            doc JSONB NOT NULL DEFAULT '{}'::jsonb,
            updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_documents (
            id VARCHAR PRIMARY KEY,
            doc JSONB NOT NULL DEFAULT '{}'::jsonb,
            updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrailDocuments for PgDocumentStore {
    async fn trail(&self, name: &str) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query("SELECT doc FROM trail_documents WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get::<Value, _>("doc")?)),
            None => Ok(None),
        }
    }

    async fn music_taste(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT doc->>'music_taste' AS music_taste FROM user_documents WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .map(|r| r.try_get::<Option<String>, _>("music_taste"))
            .transpose()?
            .flatten()
            .filter(|t| !t.trim().is_empty()))
    }
}

/// Used when no `DATABASE_URL` is configured: every lookup comes back empty.
pub struct NoopDocumentStore;

#[async_trait]
impl TrailDocuments for NoopDocumentStore {
    async fn trail(&self, _name: &str) -> Result<Option<Value>, StoreError> {
        Ok(None)
    }

    async fn music_taste(&self, _user_id: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }
}
