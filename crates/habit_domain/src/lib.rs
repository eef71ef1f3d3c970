pub mod agenda;
pub mod calendar;
pub mod error;
pub mod habit;
pub mod json_store;
pub mod schedule;
pub mod service;
pub mod stats;
pub mod store;
pub mod streak;

pub use crate::calendar::EpochDay;
pub use crate::error::{HabitError, StoreError};
pub use crate::habit::{Habit, HistoryRecord};
pub use crate::schedule::{is_scheduled, HabitSchedule};
pub use crate::service::{HabitService, HabitServiceBuilder};
pub use crate::stats::{compute_stats, HabitStats};
pub use crate::streak::compute_streak;
