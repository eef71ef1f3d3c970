use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::calendar::EpochDay;
use crate::habit::{Habit, HistoryRecord, TimeOfDay};

/// A habit due on the viewed day together with that day's progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgendaEntry {
    pub habit: Habit,
    pub date: EpochDay,
    pub current_progress: u32,
    pub is_done: bool,
}

impl AgendaEntry {
    /// Share of the daily target reached, in `0.0..=1.0`.
    pub fn progress_fraction(&self) -> f32 {
        if self.habit.target == 0 {
            return 0.0;
        }
        (self.current_progress as f32 / self.habit.target as f32).min(1.0)
    }
}

/// Habits due on `date`, ordered by time of day and title. `day_records`
/// are the records stored for that date; habits without one start at zero.
pub fn build_agenda(
    habits: &[Habit],
    day_records: &[HistoryRecord],
    date: EpochDay,
) -> Vec<AgendaEntry> {
    let by_habit: HashMap<&str, &HistoryRecord> = day_records
        .iter()
        .filter(|record| record.date == date)
        .map(|record| (record.habit_id.as_str(), record))
        .collect();

    let mut entries: Vec<AgendaEntry> = habits
        .iter()
        .filter(|habit| match habit.schedule() {
            Ok(schedule) => schedule.is_scheduled(date),
            Err(err) => {
                tracing::warn!(habit = %habit.id, %err, "skipping habit with unusable schedule");
                false
            }
        })
        .map(|habit| {
            let record = by_habit.get(habit.id.as_str());
            AgendaEntry {
                habit: habit.clone(),
                date,
                current_progress: record.map(|r| r.current_progress).unwrap_or(0),
                is_done: record.map(|r| r.is_done).unwrap_or(false),
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        time_slot(a.habit.time_of_day)
            .cmp(&time_slot(b.habit.time_of_day))
            .then_with(|| a.habit.title.cmp(&b.habit.title))
    });
    entries
}

fn time_slot(time_of_day: TimeOfDay) -> u8 {
    match time_of_day {
        TimeOfDay::Morning => 0,
        TimeOfDay::Afternoon => 1,
        TimeOfDay::Evening => 2,
        TimeOfDay::Anytime => 3,
    }
}

/// `None` keeps everything; otherwise only the matching time of day.
pub fn filter_time_of_day(
    entries: Vec<AgendaEntry>,
    time_of_day: Option<TimeOfDay>,
) -> Vec<AgendaEntry> {
    match time_of_day {
        None => entries,
        Some(wanted) => entries
            .into_iter()
            .filter(|entry| entry.habit.time_of_day == wanted)
            .collect(),
    }
}
