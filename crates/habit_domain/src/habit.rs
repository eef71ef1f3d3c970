use serde::{Deserialize, Serialize};

use crate::calendar::EpochDay;
use crate::error::{HabitError, Result};
use crate::schedule::HabitSchedule;

/// Number of weekday slots in `selected_days`, Sunday first.
pub const DAYS_PER_WEEK: usize = 7;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    #[default]
    #[serde(other)]
    Anytime,
}

impl TimeOfDay {
    pub const ALL: [TimeOfDay; 4] = [
        TimeOfDay::Anytime,
        TimeOfDay::Morning,
        TimeOfDay::Afternoon,
        TimeOfDay::Evening,
    ];

    /// Unknown names fall back to [`TimeOfDay::Anytime`].
    pub fn parse_lenient(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "MORNING" => TimeOfDay::Morning,
            "AFTERNOON" => TimeOfDay::Afternoon,
            "EVENING" => TimeOfDay::Evening,
            _ => TimeOfDay::Anytime,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TimeOfDay::Anytime => "anytime",
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
        }
    }
}

/// A recurring task as persisted in the store. `streak` is a display cache
/// written after every recomputation and never read back by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub emoji: String,
    #[serde(default)]
    pub time_of_day: TimeOfDay,
    #[serde(default)]
    pub unit_label: String,
    #[serde(default = "default_target")]
    pub target: u32,
    pub created_date: EpochDay,
    #[serde(default)]
    pub streak: u32,
    #[serde(default = "every_day")]
    pub selected_days: Vec<bool>,
    #[serde(default)]
    pub weekly_target: i32,
}

fn default_target() -> u32 {
    1
}

fn every_day() -> Vec<bool> {
    vec![true; DAYS_PER_WEEK]
}

impl Habit {
    pub fn builder(title: impl Into<String>) -> HabitBuilder {
        HabitBuilder::new(title)
    }

    pub fn schedule(&self) -> Result<HabitSchedule> {
        HabitSchedule::try_from(self)
    }

    pub fn is_flexible(&self) -> bool {
        self.weekly_target > 0
    }

    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(HabitError::integrity(&self.id, "title is empty"));
        }
        if self.target == 0 {
            return Err(HabitError::integrity(&self.id, "daily target must be at least 1"));
        }
        self.schedule().map(|_| ())
    }
}

/// Builder for habits that have not been stored yet.
#[derive(Debug, Clone)]
pub struct HabitBuilder {
    title: String,
    emoji: String,
    time_of_day: TimeOfDay,
    unit_label: String,
    target: u32,
    selected_days: Vec<bool>,
    weekly_target: i32,
}

impl HabitBuilder {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            emoji: String::new(),
            time_of_day: TimeOfDay::Anytime,
            unit_label: "times".to_string(),
            target: 1,
            selected_days: every_day(),
            weekly_target: 0,
        }
    }

    pub fn emoji(mut self, emoji: impl Into<String>) -> Self {
        self.emoji = emoji.into();
        self
    }

    pub fn time_of_day(mut self, time_of_day: TimeOfDay) -> Self {
        self.time_of_day = time_of_day;
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit_label = unit.into();
        self
    }

    pub fn target(mut self, target: u32) -> Self {
        self.target = target;
        self
    }

    /// Specific weekdays, Sunday first. Clears any weekly target.
    pub fn on_days(mut self, days: impl Into<Vec<bool>>) -> Self {
        self.selected_days = days.into();
        self.weekly_target = 0;
        self
    }

    /// Any `times` days per week.
    pub fn times_per_week(mut self, times: i32) -> Self {
        self.weekly_target = times;
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn into_habit(self, id: impl Into<String>, created_date: EpochDay) -> Result<Habit> {
        let habit = Habit {
            id: id.into(),
            title: self.title.trim().to_string(),
            emoji: self.emoji,
            time_of_day: self.time_of_day,
            unit_label: self.unit_label,
            target: self.target,
            created_date,
            streak: 0,
            selected_days: self.selected_days,
            weekly_target: self.weekly_target,
        };
        habit.validate()?;
        Ok(habit)
    }
}

/// One habit's progress on one calendar day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub habit_id: String,
    pub date: EpochDay,
    #[serde(default)]
    pub current_progress: u32,
    #[serde(default)]
    pub is_done: bool,
}

impl HistoryRecord {
    pub fn new(habit_id: impl Into<String>, date: EpochDay, progress: u32, is_done: bool) -> Self {
        Self {
            habit_id: habit_id.into(),
            date,
            current_progress: progress,
            is_done,
        }
    }

    /// Stand-in for a day without a stored record.
    pub fn missing(habit_id: impl Into<String>, date: EpochDay) -> Self {
        Self::new(habit_id, date, 0, false)
    }
}

/// Starter habits offered when creating a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HabitTemplate {
    pub title: &'static str,
    pub emoji: &'static str,
}

pub const TEMPLATES: [HabitTemplate; 6] = [
    HabitTemplate { title: "Drink Water", emoji: "💧" },
    HabitTemplate { title: "Morning Jog", emoji: "🏃" },
    HabitTemplate { title: "Reading", emoji: "📚" },
    HabitTemplate { title: "Meditation", emoji: "🧘" },
    HabitTemplate { title: "Sleep Early", emoji: "😴" },
    HabitTemplate { title: "Journaling", emoji: "✍️" },
];

impl HabitTemplate {
    pub fn find(name: &str) -> Option<&'static HabitTemplate> {
        let needle = name.trim();
        TEMPLATES
            .iter()
            .find(|template| template.title.eq_ignore_ascii_case(needle))
    }

    pub fn draft(&self) -> HabitBuilder {
        Habit::builder(self.title).emoji(self.emoji)
    }
}
