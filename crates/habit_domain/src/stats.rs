use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::calendar::EpochDay;
use crate::habit::{Habit, HistoryRecord};
use crate::schedule::HabitSchedule;

/// Length of the rolling window and of the activity strip.
pub const WINDOW_DAYS: usize = 7;

const TOP_PERFORMERS: usize = 5;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HabitStats {
    /// Percentage of scheduled days in the last week that were completed.
    pub success_rate: u8,
    pub total_completions: usize,
    /// Completion of the last seven days, oldest first, ending at the anchor.
    pub recent_activity: [bool; WINDOW_DAYS],
}

/// Aggregates one habit's history against `anchor`, normally the real
/// current day rather than whichever day a user happens to be viewing.
pub fn compute_stats(
    schedule: &HabitSchedule,
    history: &[HistoryRecord],
    anchor: EpochDay,
) -> HabitStats {
    let done_days: HashSet<EpochDay> = history
        .iter()
        .filter(|record| record.is_done)
        .map(|record| record.date)
        .collect();
    let total_completions = history.iter().filter(|record| record.is_done).count();

    let window = anchor.window_ending(WINDOW_DAYS);
    let scheduled = schedule.scheduled_days_in(window);
    let completions = history
        .iter()
        .filter(|record| record.is_done && window_contains(anchor, record.date))
        .count();

    let mut recent_activity = [false; WINDOW_DAYS];
    for (slot, day) in recent_activity.iter_mut().zip(window) {
        *slot = done_days.contains(&day);
    }

    HabitStats {
        success_rate: windowed_rate(completions, scheduled),
        total_completions,
        recent_activity,
    }
}

fn window_contains(anchor: EpochDay, date: EpochDay) -> bool {
    let age = date.days_until(anchor);
    (0..WINDOW_DAYS as i64).contains(&age)
}

fn windowed_rate(completions: usize, scheduled: usize) -> u8 {
    if scheduled == 0 {
        return 0;
    }
    let percent = (completions as f64 / scheduled as f64 * 100.0).round();
    percent.clamp(0.0, 100.0) as u8
}

/// Completions divided by days elapsed since creation (inclusive), truncated.
/// Kept as an alternative to the windowed rate of [`compute_stats`].
pub fn lifetime_success_rate(
    created: EpochDay,
    history: &[HistoryRecord],
    today: EpochDay,
) -> u8 {
    let completions = history.iter().filter(|record| record.is_done).count() as i64;
    let days = created.days_until(today).max(0) + 1;
    (completions * 100 / days).clamp(0, 100) as u8
}

/// A habit paired with its freshly computed stats.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HabitSummary {
    pub habit: Habit,
    pub stats: HabitStats,
}

/// Figures shown on the statistics overview.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsOverview {
    pub habit_count: usize,
    pub average_success_rate: u8,
    pub best_streak: u32,
    /// Habits completed on each of the last seven days, oldest first.
    pub weekly_consistency: [u32; WINDOW_DAYS],
    /// Ids of the best habits by success rate, highest first.
    pub top_performers: Vec<String>,
}

impl StatsOverview {
    pub fn from_summaries(summaries: &[HabitSummary]) -> Self {
        if summaries.is_empty() {
            return Self::default();
        }

        let rate_sum: u32 = summaries
            .iter()
            .map(|summary| summary.stats.success_rate as u32)
            .sum();
        let average_success_rate = (rate_sum / summaries.len() as u32) as u8;

        let best_streak = summaries
            .iter()
            .map(|summary| summary.habit.streak)
            .max()
            .unwrap_or(0);

        let mut weekly_consistency = [0u32; WINDOW_DAYS];
        for summary in summaries {
            for (count, done) in weekly_consistency
                .iter_mut()
                .zip(summary.stats.recent_activity)
            {
                if done {
                    *count += 1;
                }
            }
        }

        let mut ranked: Vec<&HabitSummary> = summaries.iter().collect();
        ranked.sort_by(|a, b| b.stats.success_rate.cmp(&a.stats.success_rate));
        let top_performers = ranked
            .into_iter()
            .take(TOP_PERFORMERS)
            .map(|summary| summary.habit.id.clone())
            .collect();

        Self {
            habit_count: summaries.len(),
            average_success_rate,
            best_streak,
            weekly_consistency,
            top_performers,
        }
    }
}
