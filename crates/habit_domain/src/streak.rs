//! Current-streak computation.
//!
//! The streak is always recomputed from the full history rather than
//! maintained incrementally, so identical inputs give identical output.

use crate::calendar::EpochDay;
use crate::habit::HistoryRecord;
use crate::schedule::HabitSchedule;

/// Completed days, deduplicated, most recent first.
pub fn completed_dates(history: &[HistoryRecord]) -> Vec<EpochDay> {
    let mut dates: Vec<EpochDay> = history
        .iter()
        .filter(|record| record.is_done)
        .map(|record| record.date)
        .collect();
    dates.sort_unstable_by(|a, b| b.cmp(a));
    dates.dedup();
    dates
}

/// Number of consecutive completions ending at the most recent one, or zero
/// when a scheduled day has fully elapsed since that completion.
///
/// Only days strictly before `reference` can break the chain: a habit not yet
/// done today is pending, not missed. Unscheduled days never break it.
pub fn compute_streak(
    schedule: &HabitSchedule,
    history: &[HistoryRecord],
    reference: EpochDay,
) -> u32 {
    let completed = completed_dates(history);
    let Some((&last_completion, earlier)) = completed.split_first() else {
        return 0;
    };

    if schedule.any_scheduled_between(last_completion, reference) {
        return 0;
    }

    let mut count = 1;
    let mut previous = last_completion;
    for &date in earlier {
        if schedule.any_scheduled_between(date, previous) {
            break;
        }
        count += 1;
        previous = date;
    }
    count
}
