use serde::Serialize;
use time::Date;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    calendar::{week_calendar, CalendarDay},
    engine::{advance, StreakEvent},
    repo::{StreakRecord, StreakRepository},
};
use crate::error::RepositoryError;

#[derive(Debug, Serialize)]
pub struct CheckInOutcome {
    pub event: StreakEvent,
    pub streak: StreakRecord,
    pub calendar: [CalendarDay; 7],
}

#[derive(Debug, Serialize)]
pub struct StreakView {
    pub streak: Option<StreakRecord>,
    pub calendar: [CalendarDay; 7],
}

/// Records an app activation on `today` and persists the resulting streak.
///
/// The write is attempted once. When a concurrent activation already
/// advanced the row, the stored state is returned as `Unchanged`.
#[instrument(skip(repo))]
pub async fn check_in(
    repo: &dyn StreakRepository,
    user_id: Uuid,
    today: Date,
) -> Result<CheckInOutcome, RepositoryError> {
    let existing = repo.find(user_id).await?;
    let transition = advance(existing.as_ref().map(|r| &r.state), today);

    let written = match existing {
        Some(record) if !transition.needs_write() => Ok(record),
        Some(record) => {
            repo.update_if_unchanged(record.id, record.state.last_visit_date, &transition.state)
                .await
        }
        None => repo.insert(user_id, &transition.state).await,
    };

    let (streak, event) = match written {
        Ok(record) => (record, transition.event),
        Err(RepositoryError::Conflict) => {
            warn!(%user_id, "streak changed concurrently; keeping stored state");
            let record = repo.find(user_id).await?.ok_or(RepositoryError::Conflict)?;
            (record, StreakEvent::Unchanged)
        }
        Err(e) => return Err(e),
    };

    info!(%user_id, ?event, current_streak = streak.state.current_streak, "streak checked in");
    let calendar = week_calendar(&streak.state.weekly_checkins, today);
    Ok(CheckInOutcome {
        event,
        streak,
        calendar,
    })
}

/// Current streak and week calendar without recording a visit.
pub async fn current(
    repo: &dyn StreakRepository,
    user_id: Uuid,
    today: Date,
) -> Result<StreakView, RepositoryError> {
    let streak = repo.find(user_id).await?;
    let calendar = match &streak {
        Some(record) => week_calendar(&record.state.weekly_checkins, today),
        None => week_calendar(&Default::default(), today),
    };
    Ok(StreakView { streak, calendar })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streak::engine::StreakState;
    use crate::testing::MemoryStreakRepository;
    use std::collections::BTreeSet;
    use time::macros::date;

    #[tokio::test]
    async fn first_check_in_creates_row() {
        let repo = MemoryStreakRepository::default();
        let user = Uuid::new_v4();
        let today = date!(2024 - 05 - 15);

        let out = check_in(&repo, user, today).await.unwrap();
        assert_eq!(out.event, StreakEvent::Initialized);
        assert_eq!(out.streak.state.current_streak, 1);
        assert!(out.calendar[3].is_today && out.calendar[3].is_in_streak);
        assert!(repo.find(user).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn next_day_increments_and_same_day_does_not() {
        let repo = MemoryStreakRepository::default();
        let user = Uuid::new_v4();

        check_in(&repo, user, date!(2024 - 05 - 14)).await.unwrap();
        let out = check_in(&repo, user, date!(2024 - 05 - 15)).await.unwrap();
        assert_eq!(out.event, StreakEvent::Increased);
        assert_eq!(out.streak.state.current_streak, 2);

        let again = check_in(&repo, user, date!(2024 - 05 - 15)).await.unwrap();
        assert_eq!(again.event, StreakEvent::Unchanged);
        assert_eq!(again.streak.state.current_streak, 2);
        assert_eq!(repo.writes(), 2);
    }

    #[tokio::test]
    async fn concurrent_activation_does_not_double_increment() {
        let repo = MemoryStreakRepository::default();
        let user = Uuid::new_v4();
        check_in(&repo, user, date!(2024 - 05 - 14)).await.unwrap();

        // Another session advances the row between our read and write.
        repo.interleave_on_next_write(StreakState {
            last_visit_date: date!(2024 - 05 - 15),
            current_streak: 2,
            weekly_checkins: BTreeSet::from([date!(2024 - 05 - 14), date!(2024 - 05 - 15)]),
            message: None,
        });

        let out = check_in(&repo, user, date!(2024 - 05 - 15)).await.unwrap();
        assert_eq!(out.event, StreakEvent::Unchanged);
        assert_eq!(out.streak.state.current_streak, 2);
    }

    #[tokio::test]
    async fn write_failure_is_reported() {
        let repo = MemoryStreakRepository::default();
        let user = Uuid::new_v4();
        check_in(&repo, user, date!(2024 - 05 - 14)).await.unwrap();
        repo.fail_writes();

        let err = check_in(&repo, user, date!(2024 - 05 - 15)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Write(_)));
        let stored = repo.find(user).await.unwrap().unwrap();
        assert_eq!(stored.state.current_streak, 1);
    }

    #[tokio::test]
    async fn current_without_row_shows_empty_week() {
        let repo = MemoryStreakRepository::default();
        let view = current(&repo, Uuid::new_v4(), date!(2024 - 05 - 15)).await.unwrap();
        assert!(view.streak.is_none());
        assert!(view.calendar.iter().all(|d| !d.is_checked_in));
    }
}
