use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use habit_domain::{
    agenda::{self, AgendaEntry},
    error::Result as DomainResult,
    habit::{Habit, HabitBuilder, HabitTemplate, TimeOfDay, TEMPLATES},
    json_store::JsonStore,
    service::ProgressUpdate,
    stats::{HabitStats, StatsOverview},
    EpochDay, HabitService,
};
use tracing::{debug, info, warn};

const DEFAULT_ROOT: &str = "habitmate-data";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub(crate) root: PathBuf,
    pub(crate) today: Option<EpochDay>,
    pub(crate) watch: bool,
    pub(crate) log_filter: String,
    /// Settings that were present but unusable, reported once logging is up.
    pub(crate) ignored: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_lookup(|key| std::env::var(key).ok()))
    }

    /// Unusable values are ignored so a typo never blocks startup; they are
    /// kept in `ignored` for [`AppConfig::report_ignored`].
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(root) = lookup("HABIT_ROOT") {
            if !root.trim().is_empty() {
                config.root = PathBuf::from(root.trim());
            }
        }
        if let Some(today) = lookup("HABIT_TODAY") {
            match today.parse::<EpochDay>() {
                Ok(day) => config.today = Some(day),
                Err(err) => config.ignored.push(format!("HABIT_TODAY: {err}")),
            }
        }
        if let Some(watch) = lookup("HABIT_WATCH") {
            match watch.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => config.watch = true,
                "0" | "false" | "no" | "off" => config.watch = false,
                other => config
                    .ignored
                    .push(format!("HABIT_WATCH: `{other}` is not a boolean")),
            }
        }
        if let Some(filter) = lookup("HABIT_LOG") {
            if !filter.trim().is_empty() {
                config.log_filter = filter.trim().to_string();
            }
        }
        config
    }

    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    pub fn ignored(&self) -> &[String] {
        &self.ignored
    }

    /// Call after the subscriber is installed.
    pub fn report_ignored(&self) {
        for setting in &self.ignored {
            warn!(%setting, "ignoring configuration value");
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            today: None,
            watch: false,
            log_filter: "info".to_string(),
            ignored: Vec::new(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "habitmate", about = "Track daily habits and streaks")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Habits due on a day with their progress
    List {
        #[arg(long)]
        date: Option<EpochDay>,
        #[arg(long, value_parser = parse_time_of_day)]
        time_of_day: Option<TimeOfDay>,
    },
    /// Create a habit, optionally from a template
    Add(AddArgs),
    /// Add one unit of progress
    Done(ProgressArgs),
    /// Remove one unit of progress
    Undo(ProgressArgs),
    /// Clear a day's progress
    Reset(ProgressArgs),
    /// Delete a habit and its history
    Delete { habit: String },
    /// Stats for one habit, or the overview of all habits
    Stats { habit: Option<String> },
    /// Recompute every cached streak
    Refresh,
    /// List the built-in habit templates
    Templates,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    /// Title of the habit, or a template name with --template
    pub title: String,
    #[arg(long)]
    pub template: bool,
    #[arg(long)]
    pub emoji: Option<String>,
    #[arg(long)]
    pub unit: Option<String>,
    #[arg(long)]
    pub target: Option<u32>,
    /// Seven characters, Sunday first; `-` or `.` marks a day off (e.g. `-M-W-F-`)
    #[arg(long, conflicts_with = "per_week")]
    pub days: Option<String>,
    #[arg(long)]
    pub per_week: Option<i32>,
    #[arg(long, value_parser = parse_time_of_day)]
    pub time_of_day: Option<TimeOfDay>,
}

#[derive(Debug, Args)]
pub struct ProgressArgs {
    /// Habit id, id prefix or title
    pub habit: String,
    #[arg(long)]
    pub date: Option<EpochDay>,
}

fn parse_time_of_day(value: &str) -> Result<TimeOfDay, String> {
    Ok(TimeOfDay::parse_lenient(value))
}

pub(crate) fn parse_days(pattern: &str) -> Result<Vec<bool>> {
    let days: Vec<bool> = pattern
        .trim()
        .chars()
        .map(|c| c != '-' && c != '.')
        .collect();
    if days.len() != 7 {
        bail!("day pattern `{pattern}` must have 7 characters, Sunday first");
    }
    Ok(days)
}

pub fn open_service(config: &AppConfig) -> Result<HabitService> {
    let store = JsonStore::open(&config.root)
        .with_context(|| format!("unable to open store at {}", config.root.display()))?;
    if config.watch {
        store.watch().context("unable to watch store directory")?;
    }
    let mut builder = HabitService::builder().with_store(store);
    if let Some(today) = config.today {
        info!(%today, "using fixed date");
        builder = builder.with_fixed_today(today);
    }
    Ok(builder.build()?)
}

pub fn run(config: AppConfig, command: Command) -> Result<()> {
    let service = open_service(&config)?;
    for line in execute(&service, command)? {
        println!("{line}");
    }
    Ok(())
}

/// Runs one command and returns the lines to print.
pub fn execute(service: &HabitService, command: Command) -> Result<Vec<String>> {
    debug!(?command, "executing");
    match command {
        Command::List { date, time_of_day } => {
            let date = date.unwrap_or_else(|| service.today());
            let entries = agenda::filter_time_of_day(service.agenda(date)?, time_of_day);
            let mut lines = vec![format!("{date}: {} habit(s) due", entries.len())];
            lines.extend(entries.iter().map(format_entry));
            Ok(lines)
        }
        Command::Add(args) => {
            let habit = service.add_habit(draft_from(args)?)?;
            Ok(vec![format!("added {} ({})", habit.title, habit.id)])
        }
        Command::Done(args) => progress(service, args, HabitService::increment_progress),
        Command::Undo(args) => progress(service, args, HabitService::decrement_progress),
        Command::Reset(args) => progress(service, args, HabitService::reset_progress),
        Command::Delete { habit } => {
            let habit = resolve_habit(service, &habit)?;
            let removed = service.delete_habit(&habit.id)?;
            Ok(vec![format!(
                "deleted {} and {removed} history record(s)",
                habit.title
            )])
        }
        Command::Stats { habit: Some(needle) } => {
            let habit = resolve_habit(service, &needle)?;
            let stats = service.stats(&habit.id)?;
            let lifetime = service.lifetime_success_rate(&habit.id)?;
            Ok(format_stats(&habit, &stats, lifetime))
        }
        Command::Stats { habit: None } => Ok(format_overview(service, &service.overview()?)?),
        Command::Refresh => {
            let report = service.refresh_all_streaks()?;
            let mut lines: Vec<String> = report
                .updated
                .iter()
                .map(|(id, streak)| format!("{id}: streak {streak}"))
                .collect();
            lines.extend(
                report
                    .skipped
                    .iter()
                    .map(|(id, err)| format!("{id}: skipped ({err})")),
            );
            Ok(lines)
        }
        Command::Templates => Ok(TEMPLATES
            .iter()
            .map(|template| format!("{} {}", template.emoji, template.title))
            .collect()),
    }
}

fn progress(
    service: &HabitService,
    args: ProgressArgs,
    apply: fn(&HabitService, &str, EpochDay) -> DomainResult<ProgressUpdate>,
) -> Result<Vec<String>> {
    let habit = resolve_habit(service, &args.habit)?;
    let date = args.date.unwrap_or_else(|| service.today());
    let update = apply(service, &habit.id, date)?;
    Ok(vec![format!(
        "{} on {date}: {}/{} {} {}, streak {}",
        habit.title,
        update.record.current_progress,
        habit.target,
        habit.unit_label,
        if update.record.is_done { "done" } else { "open" },
        update.streak
    )])
}

fn draft_from(args: AddArgs) -> Result<HabitBuilder> {
    let mut draft = if args.template {
        match HabitTemplate::find(&args.title) {
            Some(template) => template.draft(),
            None => bail!("no template named `{}`", args.title),
        }
    } else {
        Habit::builder(args.title)
    };
    if let Some(emoji) = args.emoji {
        draft = draft.emoji(emoji);
    }
    if let Some(unit) = args.unit {
        draft = draft.unit(unit);
    }
    if let Some(target) = args.target {
        draft = draft.target(target);
    }
    if let Some(days) = args.days {
        draft = draft.on_days(parse_days(&days)?);
    }
    if let Some(per_week) = args.per_week {
        draft = draft.times_per_week(per_week);
    }
    if let Some(time_of_day) = args.time_of_day {
        draft = draft.time_of_day(time_of_day);
    }
    Ok(draft)
}

/// Finds a habit by exact id, unique id prefix, or title.
pub(crate) fn resolve_habit(service: &HabitService, needle: &str) -> Result<Habit> {
    let habits = service.habits()?;
    if let Some(habit) = habits.iter().find(|habit| habit.id == needle) {
        return Ok(habit.clone());
    }
    let matches: Vec<&Habit> = habits
        .iter()
        .filter(|habit| habit.id.starts_with(needle) || habit.title.eq_ignore_ascii_case(needle))
        .collect();
    match matches.as_slice() {
        [habit] => Ok((*habit).clone()),
        [] => bail!("no habit matches `{needle}`"),
        _ => bail!("`{needle}` matches {} habits, use the id", matches.len()),
    }
}

fn format_entry(entry: &AgendaEntry) -> String {
    let mark = if entry.is_done { "x" } else { " " };
    format!(
        "[{mark}] {} {} {}/{} {} ({}, streak {}) {}",
        entry.habit.emoji,
        entry.habit.title,
        entry.current_progress,
        entry.habit.target,
        entry.habit.unit_label,
        entry.habit.time_of_day.label(),
        entry.habit.streak,
        short_id(&entry.habit.id)
    )
}

fn activity_strip(recent: &[bool]) -> String {
    recent.iter().map(|done| if *done { '#' } else { '.' }).collect()
}

fn format_stats(habit: &Habit, stats: &HabitStats, lifetime: u8) -> Vec<String> {
    vec![
        format!("{} {}", habit.emoji, habit.title),
        format!("streak: {}", habit.streak),
        format!("success rate (7 days): {}%", stats.success_rate),
        format!("success rate (lifetime): {lifetime}%"),
        format!("total completions: {}", stats.total_completions),
        format!("last 7 days: {}", activity_strip(&stats.recent_activity)),
    ]
}

fn format_overview(service: &HabitService, overview: &StatsOverview) -> Result<Vec<String>> {
    let mut lines = vec![
        format!("habits: {}", overview.habit_count),
        format!("average completion: {}%", overview.average_success_rate),
        format!("best active streak: {} days", overview.best_streak),
        format!(
            "last 7 days: {}",
            overview
                .weekly_consistency
                .iter()
                .map(|count| count.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        ),
    ];
    if overview.top_performers.is_empty() {
        lines.push("no habits yet".to_string());
    } else {
        lines.push("top performers:".to_string());
        for id in &overview.top_performers {
            let habit = service.habit(id)?;
            lines.push(format!("  {} {}", habit.emoji, habit.title));
        }
    }
    Ok(lines)
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
