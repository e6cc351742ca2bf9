use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::{Date, OffsetDateTime, UtcOffset};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::nutrition::{MacroTargets, NutritionInfo};

/// A row of `meal_analysis_history`. Never updated once written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MealRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(flatten)]
    pub nutrition: NutritionInfo,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewMeal {
    pub user_id: Uuid,
    pub nutrition: NutritionInfo,
    pub image_url: Option<String>,
}

#[async_trait]
pub trait MealRepository: Send + Sync {
    async fn save(&self, meal: NewMeal) -> Result<MealRecord, RepositoryError>;

    /// Meals created during local calendar day `day`, newest first.
    async fn list_for_day(
        &self,
        user_id: Uuid,
        day: Date,
        offset: UtcOffset,
    ) -> Result<Vec<MealRecord>, RepositoryError>;

    /// Latest `limit` meals, newest first.
    async fn list_recent(&self, user_id: Uuid, limit: i64)
        -> Result<Vec<MealRecord>, RepositoryError>;

    /// Stored goals, or `None` when the user never set any.
    async fn get_targets(&self, user_id: Uuid) -> Result<Option<MacroTargets>, RepositoryError>;

    async fn put_targets(
        &self,
        user_id: Uuid,
        targets: MacroTargets,
    ) -> Result<MacroTargets, RepositoryError>;
}

/// Half-open `[start, end)` instant range covering `day` at `offset`.
pub fn day_bounds(day: Date, offset: UtcOffset) -> (OffsetDateTime, OffsetDateTime) {
    let start = day.midnight().assume_offset(offset);
    let end = match day.next_day() {
        Some(next) => next.midnight().assume_offset(offset),
        None => start + time::Duration::DAY,
    };
    (start, end)
}

#[derive(Debug, FromRow)]
struct MealRow {
    id: Uuid,
    user_id: Uuid,
    created_at: OffsetDateTime,
    calories: f64,
    protein: f64,
    carbs: f64,
    fat: f64,
    image_url: Option<String>,
}

impl From<MealRow> for MealRecord {
    fn from(r: MealRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            created_at: r.created_at,
            nutrition: NutritionInfo {
                calories: r.calories,
                protein: r.protein,
                carbs: r.carbs,
                fat: r.fat,
            },
            image_url: r.image_url,
        }
    }
}

#[derive(Debug, FromRow)]
struct TargetsRow {
    calories_target: f64,
    protein_target: f64,
    carbs_target: f64,
    fat_target: f64,
}

impl From<TargetsRow> for MacroTargets {
    fn from(r: TargetsRow) -> Self {
        Self {
            calories: r.calories_target,
            protein: r.protein_target,
            carbs: r.carbs_target,
            fat: r.fat_target,
        }
    }
}

#[derive(Clone)]
pub struct PgMealRepository {
    db: PgPool,
}

impl PgMealRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MealRepository for PgMealRepository {
    async fn save(&self, meal: NewMeal) -> Result<MealRecord, RepositoryError> {
        let row = sqlx::query_as::<_, MealRow>(
            r#"
            INSERT INTO meal_analysis_history (id, user_id, calories, protein, carbs, fat, image_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_id, created_at, calories, protein, carbs, fat, image_url
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(meal.user_id)
        .bind(meal.nutrition.calories)
        .bind(meal.nutrition.protein)
        .bind(meal.nutrition.carbs)
        .bind(meal.nutrition.fat)
        .bind(meal.image_url)
        .fetch_one(&self.db)
        .await
        .map_err(RepositoryError::Write)?;
        Ok(row.into())
    }

    async fn list_for_day(
        &self,
        user_id: Uuid,
        day: Date,
        offset: UtcOffset,
    ) -> Result<Vec<MealRecord>, RepositoryError> {
        let (start, end) = day_bounds(day, offset);
        let rows = sqlx::query_as::<_, MealRow>(
            r#"
            SELECT id, user_id, created_at, calories, protein, carbs, fat, image_url
            FROM meal_analysis_history
            WHERE user_id = $1 AND created_at >= $2 AND created_at < $3
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.db)
        .await
        .map_err(RepositoryError::Read)?;
        Ok(rows.into_iter().map(MealRecord::from).collect())
    }

    async fn list_recent(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<MealRecord>, RepositoryError> {
        let rows = sqlx::query_as::<_, MealRow>(
            r#"
            SELECT id, user_id, created_at, calories, protein, carbs, fat, image_url
            FROM meal_analysis_history
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await
        .map_err(RepositoryError::Read)?;
        Ok(rows.into_iter().map(MealRecord::from).collect())
    }

    async fn get_targets(&self, user_id: Uuid) -> Result<Option<MacroTargets>, RepositoryError> {
        let row = sqlx::query_as::<_, TargetsRow>(
            r#"
            SELECT calories_target, protein_target, carbs_target, fat_target
            FROM user_macro_targets
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .map_err(RepositoryError::Read)?;
        Ok(row.map(MacroTargets::from))
    }

    async fn put_targets(
        &self,
        user_id: Uuid,
        targets: MacroTargets,
    ) -> Result<MacroTargets, RepositoryError> {
        let row = sqlx::query_as::<_, TargetsRow>(
            r#"
            INSERT INTO user_macro_targets (id, user_id, calories_target, protein_target, carbs_target, fat_target)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE
               SET calories_target = EXCLUDED.calories_target,
                   protein_target = EXCLUDED.protein_target,
                   carbs_target = EXCLUDED.carbs_target,
                   fat_target = EXCLUDED.fat_target
            RETURNING calories_target, protein_target, carbs_target, fat_target
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(targets.calories)
        .bind(targets.protein)
        .bind(targets.carbs)
        .bind(targets.fat)
        .fetch_one(&self.db)
        .await
        .map_err(RepositoryError::Write)?;
        Ok(row.into())
    }
}
