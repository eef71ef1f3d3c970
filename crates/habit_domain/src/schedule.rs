use serde::Serialize;

use crate::calendar::{DayRange, EpochDay};
use crate::error::{HabitError, Result};
use crate::habit::{Habit, DAYS_PER_WEEK};

/// Validated scheduling rule of a habit. Only built through
/// [`HabitSchedule::from_parts`] or `TryFrom<&Habit>`.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum HabitSchedule {
    /// Scheduled on the selected weekdays, Sunday first.
    Weekdays([bool; DAYS_PER_WEEK]),
    /// Any `per_week` days per week; every day is a candidate.
    Flexible { per_week: u32 },
}

impl HabitSchedule {
    pub const EVERY_DAY: HabitSchedule = HabitSchedule::Weekdays([true; DAYS_PER_WEEK]);

    /// Builds a schedule from the persisted `selectedDays`/`weeklyTarget`
    /// pair. The weekday list must hold exactly seven entries even for
    /// flexible habits, since it is what the store round-trips.
    pub fn from_parts(selected_days: &[bool], weekly_target: i32) -> Result<Self> {
        Self::from_parts_for("", selected_days, weekly_target)
    }

    fn from_parts_for(habit_id: &str, selected_days: &[bool], weekly_target: i32) -> Result<Self> {
        let days: [bool; DAYS_PER_WEEK] = selected_days.try_into().map_err(|_| {
            HabitError::integrity(
                habit_id,
                format!(
                    "selectedDays must have {DAYS_PER_WEEK} entries, found {}",
                    selected_days.len()
                ),
            )
        })?;
        match weekly_target {
            target if target < 0 => Err(HabitError::integrity(
                habit_id,
                format!("weeklyTarget must not be negative, found {target}"),
            )),
            0 => Ok(HabitSchedule::Weekdays(days)),
            target => Ok(HabitSchedule::Flexible {
                per_week: target as u32,
            }),
        }
    }

    pub fn is_flexible(&self) -> bool {
        matches!(self, HabitSchedule::Flexible { .. })
    }

    pub fn is_scheduled(&self, date: EpochDay) -> bool {
        match self {
            HabitSchedule::Flexible { .. } => true,
            HabitSchedule::Weekdays(days) => days[date.weekday_index()],
        }
    }

    fn selected_per_week(&self) -> usize {
        match self {
            HabitSchedule::Flexible { .. } => DAYS_PER_WEEK,
            HabitSchedule::Weekdays(days) => days.iter().filter(|day| **day).count(),
        }
    }

    /// Whole weeks contribute their selected-day count directly, so the
    /// cost does not grow with the length of the range.
    pub fn scheduled_days_in(&self, range: DayRange) -> usize {
        let len = range.len();
        let full_weeks = len / DAYS_PER_WEEK;
        let tail_start = range.start() + (full_weeks * DAYS_PER_WEEK) as i64;
        let tail = DayRange::new(tail_start, tail_start + (len % DAYS_PER_WEEK) as i64);
        full_weeks.saturating_mul(self.selected_per_week())
            + tail.filter(|day| self.is_scheduled(*day)).count()
    }

    /// Whether any day strictly between `start` and `end` was scheduled.
    pub fn any_scheduled_between(&self, start: EpochDay, end: EpochDay) -> bool {
        let between = EpochDay::days_strictly_between(start, end);
        match self.selected_per_week() {
            0 => false,
            _ if between.len() >= DAYS_PER_WEEK => true,
            _ => between.into_iter().any(|day| self.is_scheduled(day)),
        }
    }
}

impl TryFrom<&Habit> for HabitSchedule {
    type Error = HabitError;

    fn try_from(habit: &Habit) -> Result<Self> {
        Self::from_parts_for(&habit.id, &habit.selected_days, habit.weekly_target)
    }
}

pub fn is_scheduled(schedule: &HabitSchedule, date: EpochDay) -> bool {
    schedule.is_scheduled(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Epoch day 4 is Monday 1970-01-05.
    const MONDAY: EpochDay = EpochDay::new(4);

    fn mon_wed_fri() -> HabitSchedule {
        HabitSchedule::from_parts(&[false, true, false, true, false, true, false], 0).unwrap()
    }

    #[test]
    fn weekday_schedule_follows_selected_days() {
        let schedule = mon_wed_fri();
        let pattern: Vec<bool> = (0..7).map(|i| schedule.is_scheduled(MONDAY + i)).collect();
        assert_eq!(pattern, vec![true, false, true, false, true, false, false]);
    }

    #[test]
    fn flexible_schedule_accepts_every_day() {
        let schedule = HabitSchedule::from_parts(&[false; 7], 3).unwrap();
        assert_eq!(schedule, HabitSchedule::Flexible { per_week: 3 });
        assert!((0..14).all(|i| is_scheduled(&schedule, MONDAY + i)));
    }

    #[test]
    fn rejects_malformed_schedules() {
        let short = HabitSchedule::from_parts(&[true; 6], 0).unwrap_err();
        assert!(matches!(short, HabitError::DataIntegrity { .. }));
        let long = HabitSchedule::from_parts(&[true; 8], 2).unwrap_err();
        assert!(matches!(long, HabitError::DataIntegrity { .. }));
        let negative = HabitSchedule::from_parts(&[true; 7], -1).unwrap_err();
        assert!(matches!(negative, HabitError::DataIntegrity { .. }));
    }

    #[test]
    fn integrity_error_names_the_habit() {
        let habit = Habit {
            id: "broken".into(),
            title: "Broken".into(),
            emoji: String::new(),
            time_of_day: Default::default(),
            unit_label: String::new(),
            target: 1,
            created_date: EpochDay(0),
            streak: 0,
            selected_days: vec![true; 3],
            weekly_target: 0,
        };
        let err = habit.schedule().unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn counts_scheduled_days_in_a_range() {
        let schedule = mon_wed_fri();
        assert_eq!(schedule.scheduled_days_in(MONDAY.window_ending(7)), 3);
        assert_eq!(HabitSchedule::EVERY_DAY.scheduled_days_in(MONDAY.window_ending(7)), 7);
        assert!(!schedule.any_scheduled_between(MONDAY, MONDAY + 2));
        assert!(schedule.any_scheduled_between(MONDAY, MONDAY + 3));
    }

    #[test]
    fn long_ranges_are_counted_without_walking_them() {
        let schedule = mon_wed_fri();
        let year = DayRange::new(MONDAY, MONDAY + 365);
        let walked = year.filter(|day| schedule.is_scheduled(*day)).count();
        assert_eq!(schedule.scheduled_days_in(year), walked);
        assert_eq!(schedule.scheduled_days_in(DayRange::new(MONDAY + 1, MONDAY + 10)), 4);

        let huge = DayRange::new(EpochDay::min_value(), EpochDay::max_value());
        assert_eq!(
            HabitSchedule::EVERY_DAY.scheduled_days_in(huge),
            huge.len()
        );
        let never = HabitSchedule::from_parts(&[false; 7], 0).unwrap();
        assert_eq!(never.scheduled_days_in(huge), 0);
    }

    #[test]
    fn distant_gaps_are_answered_immediately() {
        let never = HabitSchedule::from_parts(&[false; 7], 0).unwrap();
        let far_past = EpochDay::new(-4_000_000_000_000);
        assert!(!never.any_scheduled_between(far_past, EpochDay::new(20_000)));

        let sundays = HabitSchedule::from_parts(&[true, false, false, false, false, false, false], 0)
            .unwrap();
        assert!(sundays.any_scheduled_between(far_past, EpochDay::new(20_000)));
        // Monday through Saturday: six days strictly between two Sundays.
        assert!(!sundays.any_scheduled_between(EpochDay::new(3), EpochDay::new(10)));
        assert!(sundays.any_scheduled_between(EpochDay::new(3), EpochDay::new(11)));

        let flexible = HabitSchedule::from_parts(&[false; 7], 2).unwrap();
        assert!(flexible.any_scheduled_between(far_past, EpochDay::new(20_000)));
        assert!(!flexible.any_scheduled_between(EpochDay::new(9), EpochDay::new(10)));
    }

    #[test]
    fn zero_weekly_target_means_fixed_weekdays() {
        let schedule = HabitSchedule::from_parts(&[true; 7], 0).unwrap();
        assert_eq!(schedule, HabitSchedule::EVERY_DAY);
        assert!(!schedule.is_flexible());
        assert_eq!(
            serde_json::to_value(HabitSchedule::from_parts(&[true; 7], 3).unwrap()).unwrap(),
            serde_json::json!({ "Flexible": { "per_week": 3 } })
        );
    }
}
