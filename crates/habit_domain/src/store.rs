use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use crate::calendar::EpochDay;
use crate::error::StoreError;
use crate::habit::{Habit, HistoryRecord};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistence collaborator for habits and their per-day history.
///
/// Implementations keep at most one history record per `(habit, date)`.
pub trait HabitStore: Send + Sync {
    /// All habits, newest first.
    fn list_habits(&self) -> StoreResult<Vec<Habit>>;
    fn get_habit(&self, habit_id: &str) -> StoreResult<Option<Habit>>;
    fn insert_habit(&self, habit: Habit) -> StoreResult<()>;
    fn update_habit(&self, habit: Habit) -> StoreResult<()>;
    /// Removes the habit and its history, returning how many history records
    /// were dropped.
    fn delete_habit(&self, habit_id: &str) -> StoreResult<usize>;

    fn history_for_habit(&self, habit_id: &str) -> StoreResult<Vec<HistoryRecord>>;
    fn history_for_date(
        &self,
        habit_id: &str,
        date: EpochDay,
    ) -> StoreResult<Option<HistoryRecord>>;
    /// Records of every habit on `date`.
    fn history_on(&self, date: EpochDay) -> StoreResult<Vec<HistoryRecord>>;
    fn all_history(&self) -> StoreResult<Vec<HistoryRecord>>;
    fn upsert_history(
        &self,
        habit_id: &str,
        date: EpochDay,
        progress: u32,
        is_done: bool,
    ) -> StoreResult<HistoryRecord>;
    /// Reads the progress stored for `(habit, date)` (zero when absent) and
    /// writes back the `(progress, is_done)` pair `update` derives from it.
    /// No other write to the store interleaves between the two steps.
    fn update_history(
        &self,
        habit_id: &str,
        date: EpochDay,
        update: &mut dyn FnMut(u32) -> (u32, bool),
    ) -> StoreResult<HistoryRecord>;

    /// Display-cache write; the streak engine never reads it back.
    fn update_cached_streak(&self, habit_id: &str, streak: u32) -> StoreResult<()>;
}

/// Shared in-memory tables, also used as the write-back cache of
/// [`crate::json_store::JsonStore`].
#[derive(Debug, Default, Clone)]
pub(crate) struct Tables {
    pub(crate) habits: HashMap<String, Habit>,
    pub(crate) history: HashMap<String, BTreeMap<EpochDay, HistoryRecord>>,
}

impl Tables {
    pub(crate) fn sorted_habits(&self) -> Vec<Habit> {
        let mut habits: Vec<Habit> = self.habits.values().cloned().collect();
        habits.sort_by(|a, b| {
            b.created_date
                .cmp(&a.created_date)
                .then_with(|| a.title.cmp(&b.title))
                .then_with(|| a.id.cmp(&b.id))
        });
        habits
    }

    pub(crate) fn insert_habit(&mut self, habit: Habit) -> StoreResult<()> {
        if self.habits.contains_key(&habit.id) {
            return Err(StoreError::Duplicate(habit.id));
        }
        self.habits.insert(habit.id.clone(), habit);
        Ok(())
    }

    pub(crate) fn update_habit(&mut self, habit: Habit) -> StoreResult<()> {
        let slot = self
            .habits
            .get_mut(&habit.id)
            .ok_or_else(|| StoreError::Missing(habit.id.clone()))?;
        *slot = habit;
        Ok(())
    }

    pub(crate) fn delete_habit(&mut self, habit_id: &str) -> StoreResult<usize> {
        self.habits
            .remove(habit_id)
            .ok_or_else(|| StoreError::Missing(habit_id.to_string()))?;
        Ok(self
            .history
            .remove(habit_id)
            .map(|records| records.len())
            .unwrap_or(0))
    }

    pub(crate) fn history_for_habit(&self, habit_id: &str) -> Vec<HistoryRecord> {
        self.history
            .get(habit_id)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn history_on(&self, date: EpochDay) -> Vec<HistoryRecord> {
        let mut records: Vec<HistoryRecord> = self
            .history
            .values()
            .filter_map(|records| records.get(&date).cloned())
            .collect();
        records.sort_by(|a, b| a.habit_id.cmp(&b.habit_id));
        records
    }

    pub(crate) fn all_history(&self) -> Vec<HistoryRecord> {
        let mut records: Vec<HistoryRecord> = self
            .history
            .values()
            .flat_map(|records| records.values().cloned())
            .collect();
        records.sort_by(|a, b| a.habit_id.cmp(&b.habit_id).then(a.date.cmp(&b.date)));
        records
    }

    /// The record `update` produces for `(habit, date)`, not yet stored.
    pub(crate) fn next_record(
        &self,
        habit_id: &str,
        date: EpochDay,
        update: &mut dyn FnMut(u32) -> (u32, bool),
    ) -> StoreResult<HistoryRecord> {
        if !self.habits.contains_key(habit_id) {
            return Err(StoreError::Missing(habit_id.to_string()));
        }
        let current = self
            .history
            .get(habit_id)
            .and_then(|records| records.get(&date))
            .map(|record| record.current_progress)
            .unwrap_or(0);
        let (progress, is_done) = update(current);
        Ok(HistoryRecord::new(habit_id, date, progress, is_done))
    }

    pub(crate) fn put_record(&mut self, record: HistoryRecord) {
        self.history
            .entry(record.habit_id.clone())
            .or_default()
            .insert(record.date, record);
    }

    /// Copy of the habit carrying `streak`, not yet stored.
    pub(crate) fn with_cached_streak(&self, habit_id: &str, streak: u32) -> StoreResult<Habit> {
        let mut habit = self
            .habits
            .get(habit_id)
            .cloned()
            .ok_or_else(|| StoreError::Missing(habit_id.to_string()))?;
        habit.streak = streak;
        Ok(habit)
    }
}

/// Volatile store, mainly for tests and previews.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HabitStore for MemoryStore {
    fn list_habits(&self) -> StoreResult<Vec<Habit>> {
        Ok(self.tables.read().sorted_habits())
    }

    fn get_habit(&self, habit_id: &str) -> StoreResult<Option<Habit>> {
        Ok(self.tables.read().habits.get(habit_id).cloned())
    }

    fn insert_habit(&self, habit: Habit) -> StoreResult<()> {
        self.tables.write().insert_habit(habit)
    }

    fn update_habit(&self, habit: Habit) -> StoreResult<()> {
        self.tables.write().update_habit(habit)
    }

    fn delete_habit(&self, habit_id: &str) -> StoreResult<usize> {
        self.tables.write().delete_habit(habit_id)
    }

    fn history_for_habit(&self, habit_id: &str) -> StoreResult<Vec<HistoryRecord>> {
        Ok(self.tables.read().history_for_habit(habit_id))
    }

    fn history_for_date(
        &self,
        habit_id: &str,
        date: EpochDay,
    ) -> StoreResult<Option<HistoryRecord>> {
        Ok(self
            .tables
            .read()
            .history
            .get(habit_id)
            .and_then(|records| records.get(&date).cloned()))
    }

    fn history_on(&self, date: EpochDay) -> StoreResult<Vec<HistoryRecord>> {
        Ok(self.tables.read().history_on(date))
    }

    fn all_history(&self) -> StoreResult<Vec<HistoryRecord>> {
        Ok(self.tables.read().all_history())
    }

    fn upsert_history(
        &self,
        habit_id: &str,
        date: EpochDay,
        progress: u32,
        is_done: bool,
    ) -> StoreResult<HistoryRecord> {
        self.update_history(habit_id, date, &mut |_| (progress, is_done))
    }

    fn update_history(
        &self,
        habit_id: &str,
        date: EpochDay,
        update: &mut dyn FnMut(u32) -> (u32, bool),
    ) -> StoreResult<HistoryRecord> {
        let mut tables = self.tables.write();
        let record = tables.next_record(habit_id, date, update)?;
        tables.put_record(record.clone());
        Ok(record)
    }

    fn update_cached_streak(&self, habit_id: &str, streak: u32) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let habit = tables.with_cached_streak(habit_id, streak)?;
        tables.habits.insert(habit.id.clone(), habit);
        Ok(())
    }
}
