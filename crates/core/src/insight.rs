//! Habit streaks and completion rates.
//!
//! Periods follow the habit's frequency: days for daily habits, ISO weeks
//! (Monday start) for weekly ones, calendar months for monthly ones.

use chrono::{Datelike, Duration, NaiveDate};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::types::{Frequency, Habit, HabitEntry};

/// Days covered by the completion rate.
pub const RATE_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct HabitInsight {
    pub habit_id: Uuid,
    pub title: String,
    pub current_streak: u32,
    pub longest_streak: u32,
    /// Completed periods over periods in the window, 0.0..=1.0.
    pub completion_rate: f32,
}

fn period(date: NaiveDate, frequency: Frequency) -> i64 {
    match frequency {
        Frequency::Daily => i64::from(date.num_days_from_ce()),
        Frequency::Weekly => {
            let monday = date.num_days_from_ce() - date.weekday().num_days_from_monday() as i32;
            i64::from(monday).div_euclid(7)
        }
        Frequency::Monthly => i64::from(date.year()) * 12 + i64::from(date.month0()),
    }
}

pub fn habit_insight(habit: &Habit, entries: &[HabitEntry], today: NaiveDate) -> HabitInsight {
    let freq = habit.frequency;
    let done: BTreeSet<i64> = entries
        .iter()
        .filter(|e| e.habit_id == habit.id && e.completed && e.date <= today)
        .map(|e| period(e.date, freq))
        .collect();

    // The running period still counts as open: an unfinished today does not
    // break yesterday's streak.
    let mut cursor = period(today, freq);
    if !done.contains(&cursor) {
        cursor -= 1;
    }
    let mut current = 0u32;
    while done.contains(&cursor) {
        current += 1;
        cursor -= 1;
    }

    let mut longest = 0u32;
    let mut run = 0u32;
    let mut prev: Option<i64> = None;
    for &p in &done {
        run = if prev == Some(p - 1) { run + 1 } else { 1 };
        longest = longest.max(run);
        prev = Some(p);
    }

    let created = habit.created_at.date_naive();
    let window_start = (today - Duration::days(RATE_WINDOW_DAYS - 1)).max(created.min(today));
    let first = period(window_start, freq);
    let last = period(today, freq);
    let periods = (last - first + 1).max(1);
    let hits = done.range(first..=last).count() as i64;

    HabitInsight {
        habit_id: habit.id,
        title: habit.title.clone(),
        current_streak: current,
        longest_streak: longest,
        completion_rate: hits as f32 / periods as f32,
    }
}

/// Insights for every active habit, best current streak first.
pub fn insights(habits: &[Habit], entries: &[HabitEntry], today: NaiveDate) -> Vec<HabitInsight> {
    let mut out: Vec<HabitInsight> = habits
        .iter()
        .filter(|h| h.is_active)
        .map(|h| habit_insight(h, entries, today))
        .collect();
    out.sort_by(|a, b| b.current_streak.cmp(&a.current_streak).then_with(|| a.title.cmp(&b.title)));
    out
}
