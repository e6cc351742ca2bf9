use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::RepositoryError;

/// User record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub pin_hash: String, // Argon2 hash, not exposed in JSON
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError>;
    /// `Conflict` when the username is taken. `last_login` starts at creation time.
    async fn create(&self, username: &str, pin_hash: &str) -> Result<User, RepositoryError>;
    async fn record_login(&self, id: Uuid, at: OffsetDateTime) -> Result<(), RepositoryError>;
}

#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, pin_hash, created_at, last_login
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await
        .map_err(RepositoryError::Read)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        sqlx::query_as::<_, User>(
            r#"SELECT id, username, pin_hash, created_at, last_login FROM users WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(RepositoryError::Read)
    }

    async fn create(&self, username: &str, pin_hash: &str) -> Result<User, RepositoryError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, pin_hash, last_login)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (username) DO NOTHING
            RETURNING id, username, pin_hash, created_at, last_login
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(pin_hash)
        .fetch_optional(&self.db)
        .await
        .map_err(RepositoryError::Write)?;
        user.ok_or(RepositoryError::Conflict)
    }

    async fn record_login(&self, id: Uuid, at: OffsetDateTime) -> Result<(), RepositoryError> {
        sqlx::query(r#"UPDATE users SET last_login = $2 WHERE id = $1"#)
            .bind(id)
            .bind(at)
            .execute(&self.db)
            .await
            .map_err(RepositoryError::Write)?;
        Ok(())
    }
}
