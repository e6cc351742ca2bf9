//! In-memory collaborators for unit and router tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::FromRef;
use bytes::Bytes;
use time::{macros::date, Date, OffsetDateTime, UtcOffset};
use uuid::Uuid;

use crate::auth::jwt::JwtKeys;
use crate::auth::repo::{User, UserRepository};
use crate::clock::FixedClock;
use crate::config::AppConfig;
use crate::error::RepositoryError;
use crate::meals::repo::{day_bounds, MealRecord, MealRepository, NewMeal};
use crate::nutrition::{ExtractionError, MacroTargets, NutritionExtractor, NutritionInfo};
use crate::state::AppState;
use crate::storage::StorageClient;
use crate::streak::engine::StreakState;
use crate::streak::repo::{StreakRecord, StreakRepository};

/// Date every fake clock reports: Wednesday 2024-05-15.
pub const TODAY: Date = date!(2024 - 05 - 15);

#[derive(Clone)]
pub struct Fakes {
    pub config: Arc<AppConfig>,
    pub users: Arc<MemoryUserRepository>,
    pub meals: Arc<MemoryMealRepository>,
    pub streaks: Arc<MemoryStreakRepository>,
    pub extractor: Arc<StubExtractor>,
    pub storage: Arc<MemoryStorage>,
}

impl Default for Fakes {
    fn default() -> Self {
        Self {
            config: Arc::new(AppConfig::for_tests()),
            users: Default::default(),
            meals: Default::default(),
            streaks: Default::default(),
            extractor: Default::default(),
            storage: Default::default(),
        }
    }
}

impl Fakes {
    pub fn state(&self) -> AppState {
        AppState {
            config: self.config.clone(),
            users: self.users.clone(),
            meals: self.meals.clone(),
            streaks: self.streaks.clone(),
            extractor: self.extractor.clone(),
            storage: self.storage.clone(),
            clock: Arc::new(FixedClock::on(TODAY)),
        }
    }
}

/// `Authorization` header value carrying an access token for `user_id`.
pub fn bearer(fakes: &Fakes, user_id: Uuid) -> String {
    let keys = JwtKeys::from_ref(&fakes.state());
    format!("Bearer {}", keys.sign_access(user_id).unwrap())
}

fn write_failure() -> RepositoryError {
    RepositoryError::Write(sqlx::Error::PoolClosed)
}

#[derive(Default)]
pub struct MemoryUserRepository {
    users: Mutex<Vec<User>>,
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn create(&self, username: &str, pin_hash: &str) -> Result<User, RepositoryError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.username == username) {
            return Err(RepositoryError::Conflict);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            pin_hash: pin_hash.to_string(),
            created_at: now,
            last_login: Some(now),
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn record_login(&self, id: Uuid, at: OffsetDateTime) -> Result<(), RepositoryError> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.iter_mut().find(|u| u.id == id) {
            user.last_login = Some(at);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryMealRepository {
    meals: Mutex<Vec<MealRecord>>,
    targets: Mutex<HashMap<Uuid, MacroTargets>>,
}

impl MemoryMealRepository {
    pub fn len(&self) -> usize {
        self.meals.lock().unwrap().len()
    }

    pub fn insert_at(&self, user_id: Uuid, nutrition: NutritionInfo, created_at: OffsetDateTime) {
        self.meals.lock().unwrap().push(MealRecord {
            id: Uuid::new_v4(),
            user_id,
            created_at,
            nutrition,
            image_url: None,
        });
    }

    fn newest_first(&self, keep: impl Fn(&MealRecord) -> bool) -> Vec<MealRecord> {
        let mut out: Vec<MealRecord> = self
            .meals
            .lock()
            .unwrap()
            .iter()
            .filter(|m| keep(m))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }
}

#[async_trait]
impl MealRepository for MemoryMealRepository {
    async fn save(&self, meal: NewMeal) -> Result<MealRecord, RepositoryError> {
        let record = MealRecord {
            id: Uuid::new_v4(),
            user_id: meal.user_id,
            created_at: OffsetDateTime::now_utc(),
            nutrition: meal.nutrition,
            image_url: meal.image_url,
        };
        self.meals.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn list_for_day(
        &self,
        user_id: Uuid,
        day: Date,
        offset: UtcOffset,
    ) -> Result<Vec<MealRecord>, RepositoryError> {
        let (start, end) = day_bounds(day, offset);
        Ok(self.newest_first(|m| {
            m.user_id == user_id && m.created_at >= start && m.created_at < end
        }))
    }

    async fn list_recent(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<MealRecord>, RepositoryError> {
        let mut out = self.newest_first(|m| m.user_id == user_id);
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }

    async fn get_targets(&self, user_id: Uuid) -> Result<Option<MacroTargets>, RepositoryError> {
        Ok(self.targets.lock().unwrap().get(&user_id).copied())
    }

    async fn put_targets(
        &self,
        user_id: Uuid,
        targets: MacroTargets,
    ) -> Result<MacroTargets, RepositoryError> {
        self.targets.lock().unwrap().insert(user_id, targets);
        Ok(targets)
    }
}

#[derive(Default)]
pub struct MemoryStreakRepository {
    rows: Mutex<HashMap<Uuid, StreakRecord>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
    interleaved: Mutex<Option<StreakState>>,
}

impl MemoryStreakRepository {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Simulates another session storing `state` right before our next write.
    pub fn interleave_on_next_write(&self, state: StreakState) {
        *self.interleaved.lock().unwrap() = Some(state);
    }

    fn apply_interleaved(&self, rows: &mut HashMap<Uuid, StreakRecord>) {
        if let Some(state) = self.interleaved.lock().unwrap().take() {
            for record in rows.values_mut() {
                record.state = state.clone();
            }
        }
    }
}

#[async_trait]
impl StreakRepository for MemoryStreakRepository {
    async fn find(&self, user_id: Uuid) -> Result<Option<StreakRecord>, RepositoryError> {
        Ok(self.rows.lock().unwrap().get(&user_id).cloned())
    }

    async fn insert(
        &self,
        user_id: Uuid,
        state: &StreakState,
    ) -> Result<StreakRecord, RepositoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(write_failure());
        }
        let mut rows = self.rows.lock().unwrap();
        self.apply_interleaved(&mut rows);
        if rows.contains_key(&user_id) {
            return Err(RepositoryError::Conflict);
        }
        let record = StreakRecord {
            id: Uuid::new_v4(),
            user_id,
            created_at: OffsetDateTime::now_utc(),
            state: state.clone(),
        };
        rows.insert(user_id, record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }

    async fn update_if_unchanged(
        &self,
        id: Uuid,
        expected_last_visit: Date,
        state: &StreakState,
    ) -> Result<StreakRecord, RepositoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(write_failure());
        }
        let mut rows = self.rows.lock().unwrap();
        self.apply_interleaved(&mut rows);
        let record = rows
            .values_mut()
            .find(|r| r.id == id && r.state.last_visit_date == expected_last_visit)
            .ok_or(RepositoryError::Conflict)?;
        record.state = state.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(record.clone())
    }
}

type Failure = fn() -> ExtractionError;

pub struct StubExtractor {
    outcome: Mutex<Result<NutritionInfo, Failure>>,
    calls: AtomicUsize,
}

impl Default for StubExtractor {
    fn default() -> Self {
        Self {
            outcome: Mutex::new(Ok(NutritionInfo {
                calories: 300.0,
                protein: 20.0,
                carbs: 30.0,
                fat: 10.0,
            })),
            calls: AtomicUsize::new(0),
        }
    }
}

impl StubExtractor {
    pub fn fail_with(&self, failure: Failure) {
        *self.outcome.lock().unwrap() = Err(failure);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NutritionExtractor for StubExtractor {
    async fn extract(
        &self,
        _image: Bytes,
        _mime_type: &str,
    ) -> Result<NutritionInfo, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match *self.outcome.lock().unwrap() {
            Ok(info) => Ok(info),
            Err(failure) => Err(failure()),
        }
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Bytes>>,
    fail_puts: AtomicBool,
}

impl MemoryStorage {
    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn fail_puts(&self) {
        self.fail_puts.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn put_object(&self, key: &str, body: Bytes, _content_type: &str) -> anyhow::Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            anyhow::bail!("storage unavailable");
        }
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    async fn presign_get(&self, key: &str, _seconds: u64) -> anyhow::Result<String> {
        Ok(format!("https://fake.local/{}", key))
    }
}
