use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    agenda::{self, AgendaEntry},
    calendar::EpochDay,
    error::{HabitError, Result},
    habit::{Habit, HabitBuilder, HistoryRecord},
    stats::{self, HabitStats, HabitSummary, StatsOverview},
    store::{HabitStore, MemoryStore},
    streak,
};

/// Result of a progress mutation: the stored record and the recomputed streak.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub record: HistoryRecord,
    pub streak: u32,
}

#[derive(Debug, Default)]
pub struct RefreshReport {
    pub updated: Vec<(String, u32)>,
    pub skipped: Vec<(String, HabitError)>,
}

/// Entry point for everything that reads or mutates habits. Every progress
/// change recomputes the streak from the full history and writes it through
/// to the store's display cache in the same call.
pub struct HabitService {
    store: Box<dyn HabitStore>,
    fixed_today: Option<EpochDay>,
}

pub struct HabitServiceBuilder {
    store: Option<Box<dyn HabitStore>>,
    fixed_today: Option<EpochDay>,
}

impl HabitServiceBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            fixed_today: None,
        }
    }

    pub fn with_store(self, store: impl HabitStore + 'static) -> Self {
        self.with_boxed_store(Box::new(store))
    }

    pub fn with_boxed_store(mut self, store: Box<dyn HabitStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Pins "today" instead of reading the local clock.
    pub fn with_fixed_today(mut self, today: EpochDay) -> Self {
        self.fixed_today = Some(today);
        self
    }

    pub fn build(self) -> Result<HabitService> {
        let store = match self.store {
            Some(store) => store,
            None => {
                debug!("no store configured, using in-memory store");
                Box::new(MemoryStore::new())
            }
        };
        let service = HabitService {
            store,
            fixed_today: self.fixed_today,
        };
        debug!(habits = service.store.list_habits()?.len(), "habit service ready");
        Ok(service)
    }
}

impl Default for HabitServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HabitService {
    pub fn builder() -> HabitServiceBuilder {
        HabitServiceBuilder::new()
    }

    pub fn today(&self) -> EpochDay {
        self.fixed_today.unwrap_or_else(EpochDay::today)
    }

    pub fn store(&self) -> &dyn HabitStore {
        self.store.as_ref()
    }

    pub fn habits(&self) -> Result<Vec<Habit>> {
        Ok(self.store.list_habits()?)
    }

    pub fn habit(&self, habit_id: &str) -> Result<Habit> {
        self.store
            .get_habit(habit_id)?
            .ok_or_else(|| HabitError::not_found(habit_id))
    }

    #[instrument(skip(self, draft), fields(title = draft.title()))]
    pub fn add_habit(&self, draft: HabitBuilder) -> Result<Habit> {
        let habit = draft.into_habit(Uuid::new_v4().to_string(), self.today())?;
        self.store.insert_habit(habit.clone())?;
        info!(habit = %habit.id, "habit created");
        Ok(habit)
    }

    /// Replaces a habit's settings. The cached streak is recomputed since a
    /// schedule change can move where the chain breaks.
    #[instrument(skip(self, habit), fields(habit = %habit.id))]
    pub fn update_habit(&self, habit: Habit) -> Result<Habit> {
        habit.validate()?;
        let existing = self.habit(&habit.id)?;
        let habit = Habit {
            created_date: existing.created_date,
            ..habit
        };
        self.store.update_habit(habit.clone())?;
        let streak = self.refresh_streak(&habit.id)?;
        Ok(Habit { streak, ..habit })
    }

    #[instrument(skip(self))]
    pub fn delete_habit(&self, habit_id: &str) -> Result<usize> {
        self.habit(habit_id)?;
        let removed = self.store.delete_habit(habit_id)?;
        info!(habit = habit_id, history = removed, "habit deleted");
        Ok(removed)
    }

    /// One more unit of progress on `date`, capped at the daily target.
    pub fn increment_progress(&self, habit_id: &str, date: EpochDay) -> Result<ProgressUpdate> {
        self.apply_progress(habit_id, date, |current, target| {
            if current < target {
                current + 1
            } else {
                current
            }
        })
    }

    pub fn decrement_progress(&self, habit_id: &str, date: EpochDay) -> Result<ProgressUpdate> {
        self.apply_progress(habit_id, date, |current, _| current.saturating_sub(1))
    }

    pub fn reset_progress(&self, habit_id: &str, date: EpochDay) -> Result<ProgressUpdate> {
        self.apply_progress(habit_id, date, |_, _| 0)
    }

    #[instrument(skip(self, next))]
    fn apply_progress(
        &self,
        habit_id: &str,
        date: EpochDay,
        next: impl Fn(u32, u32) -> u32,
    ) -> Result<ProgressUpdate> {
        let habit = self.habit(habit_id)?;
        habit.schedule()?;
        let target = habit.target;
        let record = self.store.update_history(habit_id, date, &mut |current| {
            let progress = next(current, target);
            (progress, progress >= target)
        })?;
        debug!(
            %date,
            progress = record.current_progress,
            is_done = record.is_done,
            "progress recorded"
        );
        let streak = self.refresh_streak(habit_id)?;
        Ok(ProgressUpdate { record, streak })
    }

    /// Recomputes the streak against today and stores it on the habit.
    #[instrument(skip(self))]
    pub fn refresh_streak(&self, habit_id: &str) -> Result<u32> {
        let habit = self.habit(habit_id)?;
        let history = self.store.history_for_habit(habit_id)?;
        let streak = streak_for(&habit, &history, self.today())?;
        self.store.update_cached_streak(habit_id, streak)?;
        debug!(streak, "streak updated");
        Ok(streak)
    }

    /// Refreshes every habit, e.g. after the day rolled over. Habits with
    /// inconsistent data are reported, not fatal.
    pub fn refresh_all_streaks(&self) -> Result<RefreshReport> {
        let mut report = RefreshReport::default();
        for habit in self.store.list_habits()? {
            match self.refresh_streak(&habit.id) {
                Ok(streak) => report.updated.push((habit.id, streak)),
                Err(err @ HabitError::DataIntegrity { .. }) => {
                    warn!(habit = %habit.id, %err, "streak not refreshed");
                    report.skipped.push((habit.id, err));
                }
                Err(err) => return Err(err),
            }
        }
        Ok(report)
    }

    /// Habits due on `date` with that day's progress.
    pub fn agenda(&self, date: EpochDay) -> Result<Vec<AgendaEntry>> {
        let habits = self.store.list_habits()?;
        let records = self.store.history_on(date)?;
        Ok(agenda::build_agenda(&habits, &records, date))
    }

    /// Stats anchored to today, whichever day is being viewed.
    pub fn stats(&self, habit_id: &str) -> Result<HabitStats> {
        let habit = self.habit(habit_id)?;
        let history = self.store.history_for_habit(habit_id)?;
        Ok(stats::compute_stats(&habit.schedule()?, &history, self.today()))
    }

    pub fn lifetime_success_rate(&self, habit_id: &str) -> Result<u8> {
        let habit = self.habit(habit_id)?;
        let history = self.store.history_for_habit(habit_id)?;
        Ok(stats::lifetime_success_rate(
            habit.created_date,
            &history,
            self.today(),
        ))
    }

    pub fn summaries(&self) -> Result<Vec<HabitSummary>> {
        let today = self.today();
        let mut by_habit: HashMap<String, Vec<HistoryRecord>> = HashMap::new();
        for record in self.store.all_history()? {
            by_habit
                .entry(record.habit_id.clone())
                .or_default()
                .push(record);
        }

        let mut summaries = Vec::new();
        for habit in self.store.list_habits()? {
            let schedule = match habit.schedule() {
                Ok(schedule) => schedule,
                Err(err) => {
                    warn!(habit = %habit.id, %err, "habit left out of stats");
                    continue;
                }
            };
            let history = by_habit.remove(&habit.id).unwrap_or_default();
            let stats = stats::compute_stats(&schedule, &history, today);
            summaries.push(HabitSummary { habit, stats });
        }
        Ok(summaries)
    }

    pub fn overview(&self) -> Result<StatsOverview> {
        Ok(StatsOverview::from_summaries(&self.summaries()?))
    }
}

/// Streak of `habit` given its full history, validating the schedule first.
pub fn streak_for(habit: &Habit, history: &[HistoryRecord], reference: EpochDay) -> Result<u32> {
    let schedule = habit.schedule()?;
    Ok(streak::compute_streak(&schedule, history, reference))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(today: i64) -> HabitService {
        HabitService::builder()
            .with_store(MemoryStore::new())
            .with_fixed_today(EpochDay(today))
            .build()
            .unwrap()
    }

    #[test]
    fn increment_caps_at_target_and_marks_done() {
        let service = service(100);
        let habit = service
            .add_habit(Habit::builder("Water").unit("cups").target(2))
            .unwrap();
        assert_eq!(habit.created_date, EpochDay(100));

        let first = service.increment_progress(&habit.id, EpochDay(100)).unwrap();
        assert_eq!(first.record.current_progress, 1);
        assert!(!first.record.is_done);
        assert_eq!(first.streak, 0);

        let second = service.increment_progress(&habit.id, EpochDay(100)).unwrap();
        assert!(second.record.is_done);
        assert_eq!(second.streak, 1);

        let third = service.increment_progress(&habit.id, EpochDay(100)).unwrap();
        assert_eq!(third.record.current_progress, 2);
        assert_eq!(service.habit(&habit.id).unwrap().streak, 1);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let service = service(100);
        let habit = service
            .add_habit(Habit::builder("Pushups").target(1_000))
            .unwrap();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        service.increment_progress(&habit.id, EpochDay(100)).unwrap();
                    }
                });
            }
        });

        let day = service
            .store()
            .history_for_date(&habit.id, EpochDay(100))
            .unwrap()
            .unwrap();
        assert_eq!(day.current_progress, 200);
        assert!(!day.is_done);
    }

    #[test]
    fn decrement_and_reset_undo_completion() {
        let service = service(100);
        let habit = service.add_habit(Habit::builder("Read")).unwrap();
        service.increment_progress(&habit.id, EpochDay(100)).unwrap();

        let undone = service.decrement_progress(&habit.id, EpochDay(100)).unwrap();
        assert_eq!(undone.record.current_progress, 0);
        assert!(!undone.record.is_done);
        assert_eq!(undone.streak, 0);

        let floor = service.decrement_progress(&habit.id, EpochDay(100)).unwrap();
        assert_eq!(floor.record.current_progress, 0);

        service.increment_progress(&habit.id, EpochDay(99)).unwrap();
        let reset = service.reset_progress(&habit.id, EpochDay(99)).unwrap();
        assert_eq!(reset.record, HistoryRecord::new(&habit.id, EpochDay(99), 0, false));
        assert_eq!(reset.streak, 0);
    }

    #[test]
    fn back_filling_a_past_day_recomputes_against_today() {
        let service = service(100);
        let habit = service.add_habit(Habit::builder("Walk")).unwrap();
        service.increment_progress(&habit.id, EpochDay(98)).unwrap();
        assert_eq!(service.habit(&habit.id).unwrap().streak, 0);

        service.increment_progress(&habit.id, EpochDay(99)).unwrap();
        let update = service.increment_progress(&habit.id, EpochDay(100)).unwrap();
        assert_eq!(update.streak, 3);
    }

    #[test]
    fn unknown_habits_are_not_found() {
        let service = service(100);
        let err = service.increment_progress("ghost", EpochDay(100)).unwrap_err();
        assert!(matches!(err, HabitError::NotFound { .. }));
        assert!(matches!(
            service.refresh_streak("ghost"),
            Err(HabitError::NotFound { .. })
        ));
        assert!(matches!(
            service.delete_habit("ghost"),
            Err(HabitError::NotFound { .. })
        ));
    }

    #[test]
    fn malformed_stored_schedule_is_an_integrity_error() {
        let store = MemoryStore::new();
        let mut broken = Habit::builder("Broken").into_habit("broken", EpochDay(0)).unwrap();
        broken.selected_days = vec![true; 5];
        store.insert_habit(broken).unwrap();
        let ok = Habit::builder("Fine").into_habit("fine", EpochDay(0)).unwrap();
        store.insert_habit(ok).unwrap();

        let service = HabitService::builder()
            .with_store(store)
            .with_fixed_today(EpochDay(10))
            .build()
            .unwrap();
        assert!(matches!(
            service.refresh_streak("broken"),
            Err(HabitError::DataIntegrity { .. })
        ));
        assert!(matches!(
            service.increment_progress("broken", EpochDay(10)),
            Err(HabitError::DataIntegrity { .. })
        ));

        let report = service.refresh_all_streaks().unwrap();
        assert_eq!(report.updated, vec![("fine".to_string(), 0)]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(service.summaries().unwrap().len(), 1);
    }

    #[test]
    fn schedule_change_refreshes_cached_streak() {
        let service = service(11);
        let habit = service.add_habit(Habit::builder("Gym")).unwrap();
        // Monday 4, Wednesday 6, Friday 8; nothing afterwards.
        for day in [4, 6, 8] {
            service.increment_progress(&habit.id, EpochDay(day)).unwrap();
        }
        assert_eq!(service.habit(&habit.id).unwrap().streak, 0);

        let edited = Habit {
            selected_days: vec![false, true, false, true, false, true, false],
            ..service.habit(&habit.id).unwrap()
        };
        let stored = service.update_habit(edited).unwrap();
        assert_eq!(stored.streak, 3);
        assert_eq!(service.habit(&habit.id).unwrap().streak, 3);
    }

    #[test]
    fn delete_cascades_and_overview_reflects_remaining_habits() {
        let service = service(100);
        let a = service.add_habit(Habit::builder("A")).unwrap();
        let b = service.add_habit(Habit::builder("B")).unwrap();
        for day in 96..=100 {
            service.increment_progress(&a.id, EpochDay(day)).unwrap();
        }
        service.increment_progress(&b.id, EpochDay(100)).unwrap();

        let overview = service.overview().unwrap();
        assert_eq!(overview.habit_count, 2);
        assert_eq!(overview.best_streak, 5);
        assert_eq!(overview.weekly_consistency, [0, 0, 1, 1, 1, 1, 2]);
        assert_eq!(overview.top_performers[0], a.id);

        assert_eq!(service.delete_habit(&a.id).unwrap(), 5);
        let overview = service.overview().unwrap();
        assert_eq!(overview.habit_count, 1);
        assert_eq!(overview.best_streak, 1);
    }

    #[test]
    fn stats_use_today_not_the_viewed_day() {
        let service = service(100);
        let habit = service.add_habit(Habit::builder("Stretch")).unwrap();
        service.increment_progress(&habit.id, EpochDay(50)).unwrap();
        for day in 96..=100 {
            service.increment_progress(&habit.id, EpochDay(day)).unwrap();
        }
        let stats = service.stats(&habit.id).unwrap();
        assert_eq!(stats.success_rate, 71);
        assert_eq!(stats.total_completions, 6);
        assert_eq!(
            stats.recent_activity,
            [false, false, true, true, true, true, true]
        );
        assert_eq!(service.lifetime_success_rate(&habit.id).unwrap(), 100);
    }
}
