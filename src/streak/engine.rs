use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::{Date, Duration};

/// Visit streak as seen by the engine; persistence ids live on [`super::repo::StreakRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
    pub last_visit_date: Date,
    pub current_streak: i32,
    pub weekly_checkins: BTreeSet<Date>,
    pub message: Option<String>,
}

/// What happened on this activation; the client uses it to pick a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreakEvent {
    Initialized,
    Increased,
    Reset,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreakTransition {
    pub state: StreakState,
    pub event: StreakEvent,
}

impl StreakTransition {
    /// Whether the state differs from what was read and has to be written back.
    pub fn needs_write(&self) -> bool {
        self.event != StreakEvent::Unchanged
    }
}

/// Computes the streak state after the user opens the app on `today`.
pub fn advance(previous: Option<&StreakState>, today: Date) -> StreakTransition {
    let Some(prev) = previous else {
        return StreakTransition {
            state: StreakState {
                last_visit_date: today,
                current_streak: 1,
                weekly_checkins: BTreeSet::from([today]),
                message: Some("Welcome! Your streak starts today.".into()),
            },
            event: StreakEvent::Initialized,
        };
    };

    // Same day, or a last visit in the future after a clock or offset change.
    if prev.last_visit_date >= today {
        return StreakTransition {
            state: prev.clone(),
            event: StreakEvent::Unchanged,
        };
    }

    let continues_run = today.previous_day() == Some(prev.last_visit_date);
    let (current_streak, event, message) = if continues_run {
        let next = prev.current_streak.saturating_add(1);
        (
            next,
            StreakEvent::Increased,
            format!("You're on a {next} day streak!"),
        )
    } else {
        (
            1,
            StreakEvent::Reset,
            "Streak reset. Keep the flame lit every day!".to_string(),
        )
    };

    let mut weekly_checkins = checkins_this_week(&prev.weekly_checkins, today);
    weekly_checkins.insert(today);

    StreakTransition {
        state: StreakState {
            last_visit_date: today,
            current_streak,
            weekly_checkins,
            message: Some(message),
        },
        event,
    }
}

/// Sunday that opens the week containing `day`.
pub fn week_start(day: Date) -> Date {
    let back = i64::from(day.weekday().number_days_from_sunday());
    day.checked_sub(Duration::days(back)).unwrap_or(Date::MIN)
}

/// Keeps only check-ins between the start of `today`'s week and `today`.
fn checkins_this_week(checkins: &BTreeSet<Date>, today: Date) -> BTreeSet<Date> {
    checkins
        .range(week_start(today)..=today)
        .copied()
        .collect()
}
