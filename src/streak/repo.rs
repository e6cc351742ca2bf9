use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::{format_description::FormatItem, macros::format_description, Date, OffsetDateTime};
use tracing::warn;
use uuid::Uuid;

use super::engine::StreakState;
use crate::error::RepositoryError;

const ISO_DATE: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// A persisted `user_streaks` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreakRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(flatten)]
    pub state: StreakState,
}

#[async_trait]
pub trait StreakRepository: Send + Sync {
    async fn find(&self, user_id: Uuid) -> Result<Option<StreakRecord>, RepositoryError>;

    /// Creates the user's streak row; `Conflict` if one already exists.
    async fn insert(
        &self,
        user_id: Uuid,
        state: &StreakState,
    ) -> Result<StreakRecord, RepositoryError>;

    /// Writes `state` only if the row still has `expected_last_visit`; `Conflict` otherwise.
    async fn update_if_unchanged(
        &self,
        id: Uuid,
        expected_last_visit: Date,
        state: &StreakState,
    ) -> Result<StreakRecord, RepositoryError>;
}

#[derive(Debug, FromRow)]
struct StreakRow {
    id: Uuid,
    user_id: Uuid,
    created_at: OffsetDateTime,
    last_visit_date: Date,
    current_streak: i32,
    weekly_checkins: Option<Vec<String>>,
    message: Option<String>,
}

impl From<StreakRow> for StreakRecord {
    fn from(r: StreakRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            created_at: r.created_at,
            state: StreakState {
                last_visit_date: r.last_visit_date,
                current_streak: r.current_streak,
                weekly_checkins: parse_checkins(r.weekly_checkins.unwrap_or_default()),
                message: r.message,
            },
        }
    }
}

fn parse_checkins(raw: Vec<String>) -> BTreeSet<Date> {
    raw.into_iter()
        .filter_map(|s| match Date::parse(&s, ISO_DATE) {
            Ok(d) => Some(d),
            Err(e) => {
                warn!(value = %s, error = %e, "skipping malformed check-in date");
                None
            }
        })
        .collect()
}

fn format_checkins(checkins: &BTreeSet<Date>) -> Vec<String> {
    checkins
        .iter()
        .filter_map(|d| d.format(ISO_DATE).ok())
        .collect()
}

#[derive(Clone)]
pub struct PgStreakRepository {
    db: PgPool,
}

impl PgStreakRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StreakRepository for PgStreakRepository {
    async fn find(&self, user_id: Uuid) -> Result<Option<StreakRecord>, RepositoryError> {
        let row = sqlx::query_as::<_, StreakRow>(
            r#"
            SELECT id, user_id, created_at, last_visit_date, current_streak, weekly_checkins, message
            FROM user_streaks
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .map_err(RepositoryError::Read)?;
        Ok(row.map(StreakRecord::from))
    }

    async fn insert(
        &self,
        user_id: Uuid,
        state: &StreakState,
    ) -> Result<StreakRecord, RepositoryError> {
        let row = sqlx::query_as::<_, StreakRow>(
            r#"
            INSERT INTO user_streaks (id, user_id, last_visit_date, current_streak, weekly_checkins, message)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO NOTHING
            RETURNING id, user_id, created_at, last_visit_date, current_streak, weekly_checkins, message
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(state.last_visit_date)
        .bind(state.current_streak)
        .bind(format_checkins(&state.weekly_checkins))
        .bind(&state.message)
        .fetch_optional(&self.db)
        .await
        .map_err(RepositoryError::Write)?;
        row.map(StreakRecord::from).ok_or(RepositoryError::Conflict)
    }

    async fn update_if_unchanged(
        &self,
        id: Uuid,
        expected_last_visit: Date,
        state: &StreakState,
    ) -> Result<StreakRecord, RepositoryError> {
        let row = sqlx::query_as::<_, StreakRow>(
            r#"
            UPDATE user_streaks
               SET last_visit_date = $3,
                   current_streak = $4,
                   weekly_checkins = $5,
                   message = $6
             WHERE id = $1 AND last_visit_date = $2
            RETURNING id, user_id, created_at, last_visit_date, current_streak, weekly_checkins, message
            "#,
        )
        .bind(id)
        .bind(expected_last_visit)
        .bind(state.last_visit_date)
        .bind(state.current_streak)
        .bind(format_checkins(&state.weekly_checkins))
        .bind(&state.message)
        .fetch_optional(&self.db)
        .await
        .map_err(RepositoryError::Write)?;
        row.map(StreakRecord::from).ok_or(RepositoryError::Conflict)
    }
}
