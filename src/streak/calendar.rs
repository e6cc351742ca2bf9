use std::collections::BTreeSet;

use serde::Serialize;
use time::Date;

use super::engine::week_start;

const DAY_LABELS: [&str; 7] = ["S", "M", "T", "W", "T", "F", "S"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalendarDay {
    pub date: Date,
    pub label: &'static str,
    pub is_today: bool,
    pub is_checked_in: bool,
    pub is_in_streak: bool,
}

/// Sunday-start week containing `today`, with check-in flags for the header dialog and date strip.
pub fn week_calendar(checkins: &BTreeSet<Date>, today: Date) -> [CalendarDay; 7] {
    let start = week_start(today);
    let today_index = today.weekday().number_days_from_sunday() as usize;

    let mut date = start;
    std::array::from_fn(|index| {
        let day = date;
        date = date.next_day().unwrap_or(date);
        let is_checked_in = checkins.contains(&day);
        CalendarDay {
            date: day,
            label: DAY_LABELS[index],
            is_today: index == today_index,
            is_checked_in,
            is_in_streak: index <= today_index && is_checked_in,
        }
    })
}
