use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by the domain layer.
#[derive(Debug, Error)]
pub enum HabitError {
    #[error("habit `{habit_id}` has inconsistent data: {reason}")]
    DataIntegrity { habit_id: String, reason: String },

    #[error("habit `{habit_id}` not found")]
    NotFound { habit_id: String },

    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HabitError {
    pub fn integrity(habit_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DataIntegrity {
            habit_id: habit_id.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(habit_id: impl Into<String>) -> Self {
        Self::NotFound {
            habit_id: habit_id.into(),
        }
    }
}

/// Failures raised by a [`crate::store::HabitStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("unable to scan store directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("unable to watch store directory: {0}")]
    Watch(#[from] notify::Error),

    #[error("corrupt document {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("habit `{0}` is not stored")]
    Missing(String),

    #[error("habit `{0}` already exists")]
    Duplicate(String),
}

pub type Result<T, E = HabitError> = std::result::Result<T, E>;
