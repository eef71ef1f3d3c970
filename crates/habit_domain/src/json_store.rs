use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::calendar::EpochDay;
use crate::error::StoreError;
use crate::habit::{Habit, HistoryRecord};
use crate::store::{HabitStore, StoreResult, Tables};

const HABITS_DIR: &str = "habits";
const HISTORY_DIR: &str = "history";

/// Directory of JSON documents: `habits/<id>.json` holds one habit and
/// `history/<id>.json` the array of its day records. Everything is cached in
/// memory. A mutation writes its document first and only then touches the
/// cache, so a failed write leaves both unchanged.
pub struct JsonStore {
    root: PathBuf,
    tables: Arc<RwLock<Tables>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl JsonStore {
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(HABITS_DIR))?;
        fs::create_dir_all(root.join(HISTORY_DIR))?;
        let tables = load_tables(&root)?;
        info!(
            root = %root.display(),
            habits = tables.habits.len(),
            "opened habit store"
        );
        Ok(Self {
            root,
            tables: Arc::new(RwLock::new(tables)),
            watcher: Mutex::new(None),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Re-reads every document from disk.
    pub fn reload(&self) -> StoreResult<()> {
        reload_into(&self.root, &self.tables)
    }

    /// Reloads the cache whenever another process edits the directory.
    pub fn watch(&self) -> StoreResult<()> {
        let mut slot = self.watcher.lock();
        if slot.is_some() {
            return Ok(());
        }
        let root = self.root.clone();
        let tables = Arc::clone(&self.tables);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    if !touches_documents(&event) {
                        return;
                    }
                    debug!(?event, "store change detected");
                    if let Err(err) = reload_into(&root, &tables) {
                        warn!(%err, "unable to reload habit store");
                    }
                }
                Err(err) => warn!(%err, "store watcher error"),
            }
        })?;
        watcher.watch(&self.root, RecursiveMode::Recursive)?;
        *slot = Some(watcher);
        Ok(())
    }

    fn habit_path(&self, habit_id: &str) -> StoreResult<PathBuf> {
        document_path(&self.root.join(HABITS_DIR), habit_id)
    }

    fn history_path(&self, habit_id: &str) -> StoreResult<PathBuf> {
        document_path(&self.root.join(HISTORY_DIR), habit_id)
    }

    fn persist_habit(&self, habit: &Habit) -> StoreResult<()> {
        let path = self.habit_path(&habit.id)?;
        write_atomic(&path, &serde_json::to_vec_pretty(habit)?)
    }

    fn persist_history(
        &self,
        habit_id: &str,
        records: &BTreeMap<EpochDay, HistoryRecord>,
    ) -> StoreResult<()> {
        let path = self.history_path(habit_id)?;
        let records: Vec<&HistoryRecord> = records.values().collect();
        write_atomic(&path, &serde_json::to_vec_pretty(&records)?)
    }

    fn remove_document(path: &Path) -> StoreResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl HabitStore for JsonStore {
    fn list_habits(&self) -> StoreResult<Vec<Habit>> {
        Ok(self.tables.read().sorted_habits())
    }

    fn get_habit(&self, habit_id: &str) -> StoreResult<Option<Habit>> {
        Ok(self.tables.read().habits.get(habit_id).cloned())
    }

    fn insert_habit(&self, habit: Habit) -> StoreResult<()> {
        let mut tables = self.tables.write();
        if tables.habits.contains_key(&habit.id) {
            return Err(StoreError::Duplicate(habit.id));
        }
        self.persist_habit(&habit)?;
        tables.insert_habit(habit)
    }

    fn update_habit(&self, habit: Habit) -> StoreResult<()> {
        let mut tables = self.tables.write();
        if !tables.habits.contains_key(&habit.id) {
            return Err(StoreError::Missing(habit.id));
        }
        self.persist_habit(&habit)?;
        tables.update_habit(habit)
    }

    /// The habit document goes first: history left behind without a habit
    /// is ignored on load.
    fn delete_habit(&self, habit_id: &str) -> StoreResult<usize> {
        let mut tables = self.tables.write();
        if !tables.habits.contains_key(habit_id) {
            return Err(StoreError::Missing(habit_id.to_string()));
        }
        Self::remove_document(&self.habit_path(habit_id)?)?;
        let removed = tables.delete_habit(habit_id)?;
        if let Err(err) = Self::remove_document(&self.history_path(habit_id)?) {
            warn!(habit = habit_id, %err, "history document left behind");
        }
        Ok(removed)
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
        let mut records = tables.history.get(habit_id).cloned().unwrap_or_default();
        records.insert(date, record.clone());
        self.persist_history(habit_id, &records)?;
        tables.history.insert(habit_id.to_string(), records);
        Ok(record)
    }

    fn update_cached_streak(&self, habit_id: &str, streak: u32) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let habit = tables.with_cached_streak(habit_id, streak)?;
        self.persist_habit(&habit)?;
        tables.habits.insert(habit.id.clone(), habit);
        Ok(())
    }
}

fn document_path(dir: &Path, habit_id: &str) -> StoreResult<PathBuf> {
    let valid = !habit_id.is_empty()
        && habit_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(StoreError::Corrupt {
            path: dir.to_path_buf(),
            reason: format!("`{habit_id}` is not a usable document id"),
        });
    }
    Ok(dir.join(format!("{habit_id}.json")))
}

/// Swaps in a fresh snapshot of the directory. The write lock is held while
/// reading so no in-process mutation can land between the read and the swap.
fn reload_into(root: &Path, tables: &RwLock<Tables>) -> StoreResult<()> {
    let mut guard = tables.write();
    *guard = load_tables(root)?;
    debug!(habits = guard.habits.len(), "habit store reloaded");
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn is_json_document(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

fn touches_documents(event: &notify::Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) && event.paths.iter().any(|path| is_json_document(path))
}

fn document_stem(path: &Path) -> StoreResult<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: "file name is not valid UTF-8".into(),
        })
}

fn json_documents(dir: &Path) -> StoreResult<Vec<PathBuf>> {
    let mut paths = Vec::new();
    if !dir.is_dir() {
        return Ok(paths);
    }
    for entry in WalkDir::new(dir).max_depth(1) {
        let entry = entry?;
        if entry.file_type().is_file() && is_json_document(entry.path()) {
            paths.push(entry.path().to_path_buf());
        }
    }
    paths.sort();
    Ok(paths)
}

fn load_tables(root: &Path) -> StoreResult<Tables> {
    let mut tables = Tables::default();

    for path in json_documents(&root.join(HABITS_DIR))? {
        let stem = document_stem(&path)?;
        let habit: Habit = serde_json::from_slice(&fs::read(&path)?).map_err(|err| {
            StoreError::Corrupt {
                path: path.clone(),
                reason: err.to_string(),
            }
        })?;
        if habit.id != stem {
            return Err(StoreError::Corrupt {
                path,
                reason: format!("document holds habit `{}`", habit.id),
            });
        }
        tables.habits.insert(habit.id.clone(), habit);
    }

    for path in json_documents(&root.join(HISTORY_DIR))? {
        let habit_id = document_stem(&path)?;
        if !tables.habits.contains_key(&habit_id) {
            warn!(path = %path.display(), "history without a habit, ignoring");
            continue;
        }
        let records: Vec<HistoryRecord> =
            serde_json::from_slice(&fs::read(&path)?).map_err(|err| StoreError::Corrupt {
                path: path.clone(),
                reason: err.to_string(),
            })?;
        let mut by_date = BTreeMap::new();
        for record in records {
            if record.habit_id != habit_id {
                return Err(StoreError::Corrupt {
                    path,
                    reason: format!("record belongs to habit `{}`", record.habit_id),
                });
            }
            if by_date.insert(record.date, record).is_some() {
                return Err(StoreError::Corrupt {
                    path,
                    reason: "two records for the same day".into(),
                });
            }
        }
        tables.history.insert(habit_id, by_date);
    }

    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    fn wait_until(mut ready: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if ready() {
                return true;
            }
            thread::sleep(Duration::from_millis(25));
        }
        ready()
    }

    fn habit(id: &str) -> Habit {
        Habit::builder("Read")
            .unit("pages")
            .target(2)
            .into_habit(id, EpochDay(10))
            .unwrap()
    }

    #[test]
    fn persists_and_reloads_documents() {
        let temp = tempdir().expect("tempdir");
        {
            let store = JsonStore::open(temp.path()).unwrap();
            store.insert_habit(habit("read")).unwrap();
            store.upsert_history("read", EpochDay(11), 2, true).unwrap();
            store.upsert_history("read", EpochDay(12), 1, false).unwrap();
            store.update_cached_streak("read", 1).unwrap();
        }

        let reopened = JsonStore::open(temp.path()).unwrap();
        let stored = reopened.get_habit("read").unwrap().expect("habit persisted");
        assert_eq!(stored.streak, 1);
        assert_eq!(stored.unit_label, "pages");
        assert_eq!(reopened.history_for_habit("read").unwrap().len(), 2);
        assert!(temp.path().join("habits/read.json").is_file());
        assert!(!temp.path().join("habits/read.json.tmp").exists());
    }

    #[test]
    fn delete_removes_both_documents() {
        let temp = tempdir().expect("tempdir");
        let store = JsonStore::open(temp.path()).unwrap();
        store.insert_habit(habit("read")).unwrap();
        store.upsert_history("read", EpochDay(11), 2, true).unwrap();

        assert_eq!(store.delete_habit("read").unwrap(), 1);
        assert!(!temp.path().join("habits/read.json").exists());
        assert!(!temp.path().join("history/read.json").exists());
    }

    #[test]
    fn corrupt_documents_are_reported() {
        let temp = tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join(HABITS_DIR)).unwrap();
        fs::write(temp.path().join("habits/bad.json"), "{ not json").unwrap();
        let err = JsonStore::open(temp.path()).err().expect("open fails");
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn mismatched_habit_id_is_corrupt() {
        let temp = tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join(HABITS_DIR)).unwrap();
        let raw = serde_json::to_vec(&habit("other")).unwrap();
        fs::write(temp.path().join("habits/read.json"), raw).unwrap();
        assert!(matches!(
            JsonStore::open(temp.path()),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn reload_picks_up_external_edits() {
        let temp = tempdir().expect("tempdir");
        let store = JsonStore::open(temp.path()).unwrap();
        store.insert_habit(habit("read")).unwrap();

        let records = vec![HistoryRecord::new("read", EpochDay(20), 2, true)];
        fs::write(
            temp.path().join("history/read.json"),
            serde_json::to_vec(&records).unwrap(),
        )
        .unwrap();
        store.reload().unwrap();
        assert_eq!(store.history_on(EpochDay(20)).unwrap(), records);
    }

    #[test]
    fn rejects_ids_that_escape_the_directory() {
        let temp = tempdir().expect("tempdir");
        let store = JsonStore::open(temp.path()).unwrap();
        assert!(store.insert_habit(habit("../escape")).is_err());
        assert!(store.list_habits().unwrap().is_empty());
    }

    #[test]
    fn failed_writes_leave_the_cache_untouched() {
        let temp = tempdir().expect("tempdir");
        let store = JsonStore::open(temp.path()).unwrap();
        store.insert_habit(habit("read")).unwrap();
        store.upsert_history("read", EpochDay(11), 2, true).unwrap();

        // A directory squatting on the temp path makes the next write fail.
        fs::create_dir(temp.path().join("history/read.json.tmp")).unwrap();
        assert!(store.upsert_history("read", EpochDay(12), 1, false).is_err());
        assert!(store.history_for_date("read", EpochDay(12)).unwrap().is_none());

        fs::create_dir(temp.path().join("habits/read.json.tmp")).unwrap();
        assert!(store.update_cached_streak("read", 9).is_err());
        assert_eq!(store.get_habit("read").unwrap().unwrap().streak, 0);

        fs::create_dir(temp.path().join("habits/fresh.json.tmp")).unwrap();
        assert!(store.insert_habit(habit("fresh")).is_err());
        assert!(store.get_habit("fresh").unwrap().is_none());

        let before = store.all_history().unwrap();
        store.reload().unwrap();
        assert_eq!(store.all_history().unwrap(), before);
        assert_eq!(store.list_habits().unwrap().len(), 1);
    }

    #[test]
    fn watcher_reloads_external_edits() {
        let temp = tempdir().expect("tempdir");
        let store = JsonStore::open(temp.path()).unwrap();
        store.insert_habit(habit("read")).unwrap();
        store.watch().unwrap();
        store.watch().unwrap();

        let records = vec![HistoryRecord::new("read", EpochDay(20), 2, true)];
        fs::write(
            temp.path().join("history/read.json"),
            serde_json::to_vec(&records).unwrap(),
        )
        .unwrap();
        assert!(wait_until(|| store.history_on(EpochDay(20)).unwrap() == records));
    }

    #[test]
    fn writes_survive_reloads_triggered_by_the_watcher() {
        let temp = tempdir().expect("tempdir");
        let store = JsonStore::open(temp.path()).unwrap();
        store.insert_habit(habit("read")).unwrap();
        store.watch().unwrap();

        for day in 0..30 {
            store.upsert_history("read", EpochDay(day), 1, true).unwrap();
        }
        thread::sleep(Duration::from_millis(300));

        assert_eq!(store.history_for_habit("read").unwrap().len(), 30);
        let reopened = JsonStore::open(temp.path()).unwrap();
        assert_eq!(reopened.history_for_habit("read").unwrap().len(), 30);
    }
}
