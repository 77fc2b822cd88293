use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

pub type TaskId = i64;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Priority {
    #[serde(alias = "low", alias = "LOW")]
    Low,
    #[default]
    #[serde(alias = "medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "high", alias = "HIGH")]
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Durable task record. Field names are camelCase on the wire; the all-lowercase
/// spellings some stores emit are accepted on the way in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    #[serde(default, deserialize_with = "nullable_string")]
    pub title: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub description: String,
    #[serde(default, deserialize_with = "flag")]
    pub completed: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, alias = "duedate", deserialize_with = "optional_due_date")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, alias = "completedpomodoros")]
    pub completed_pomodoros: u32,
    #[serde(default, alias = "workduration")]
    pub work_duration: u32,
    #[serde(default, alias = "breakduration")]
    pub break_duration: u32,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_duration(self.work_duration, "task.work_duration")?;
        validate_duration(self.break_duration, "task.break_duration")
    }
}

/// A task that has not been assigned an id by a store yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub completed_pomodoros: u32,
    pub work_duration: u32,
    pub break_duration: u32,
}

impl NewTask {
    pub fn new(title: impl Into<String>, defaults: &TaskDefaults) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            completed: false,
            priority: defaults.priority,
            due_date: None,
            completed_pomodoros: 0,
            work_duration: defaults.work_duration,
            break_duration: defaults.break_duration,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_duration(self.work_duration, "task.work_duration")?;
        validate_duration(self.break_duration, "task.break_duration")
    }

    pub fn into_task(self, id: TaskId) -> Task {
        Task {
            id,
            title: self.title,
            description: self.description,
            completed: self.completed,
            priority: self.priority,
            due_date: self.due_date,
            completed_pomodoros: self.completed_pomodoros,
            work_duration: self.work_duration,
            break_duration: self.break_duration,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefaults {
    pub priority: Priority,
    pub work_duration: u32,
    pub break_duration: u32,
}

impl Default for TaskDefaults {
    fn default() -> Self {
        Self {
            priority: Priority::Medium,
            work_duration: 25,
            break_duration: 5,
        }
    }
}

/// Partial update. `None` leaves a field untouched; `due_date: Some(None)` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(
        default,
        alias = "duedate",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_due_date"
    )]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, alias = "completedpomodoros", skip_serializing_if = "Option::is_none")]
    pub completed_pomodoros: Option<u32>,
    #[serde(default, alias = "workduration", skip_serializing_if = "Option::is_none")]
    pub work_duration: Option<u32>,
    #[serde(default, alias = "breakduration", skip_serializing_if = "Option::is_none")]
    pub break_duration: Option<u32>,
}

impl TaskPatch {
    pub fn title(value: impl Into<String>) -> Self {
        Self {
            title: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn completed_pomodoros(value: u32) -> Self {
        Self {
            completed_pomodoros: Some(value),
            ..Self::default()
        }
    }

    pub fn work_duration(minutes: u32) -> Self {
        Self {
            work_duration: Some(minutes),
            ..Self::default()
        }
    }

    pub fn break_duration(minutes: u32) -> Self {
        Self {
            break_duration: Some(minutes),
            ..Self::default()
        }
    }

    pub fn due_date(value: Option<NaiveDate>) -> Self {
        Self {
            due_date: Some(value),
            ..Self::default()
        }
    }

    /// Flips completion. Completing credits one pomodoro; reopening keeps the count.
    pub fn toggle_completion(task: &Task) -> Self {
        if task.completed {
            return Self {
                completed: Some(false),
                ..Self::default()
            };
        }
        Self {
            completed: Some(true),
            completed_pomodoros: Some(task.completed_pomodoros.saturating_add(1)),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(minutes) = self.work_duration {
            validate_duration(minutes, "patch.work_duration")?;
        }
        if let Some(minutes) = self.break_duration {
            validate_duration(minutes, "patch.break_duration")?;
        }
        Ok(())
    }

    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(count) = self.completed_pomodoros {
            task.completed_pomodoros = count;
        }
        if let Some(minutes) = self.work_duration {
            task.work_duration = minutes;
        }
        if let Some(minutes) = self.break_duration {
            task.break_duration = minutes;
        }
    }

    /// Layers `self` over an older patch: every field set here wins, the rest
    /// are taken from `older`.
    pub fn merged_over(self, older: TaskPatch) -> TaskPatch {
        TaskPatch {
            title: self.title.or(older.title),
            description: self.description.or(older.description),
            completed: self.completed.or(older.completed),
            priority: self.priority.or(older.priority),
            due_date: self.due_date.or(older.due_date),
            completed_pomodoros: self.completed_pomodoros.or(older.completed_pomodoros),
            work_duration: self.work_duration.or(older.work_duration),
            break_duration: self.break_duration.or(older.break_duration),
        }
    }

    /// Drops every field that `newer` also sets.
    pub fn without_fields_of(self, newer: &TaskPatch) -> TaskPatch {
        fn unless<T, U>(value: Option<T>, newer: &Option<U>) -> Option<T> {
            if newer.is_some() { None } else { value }
        }
        TaskPatch {
            title: unless(self.title, &newer.title),
            description: unless(self.description, &newer.description),
            completed: unless(self.completed, &newer.completed),
            priority: unless(self.priority, &newer.priority),
            due_date: unless(self.due_date, &newer.due_date),
            completed_pomodoros: unless(self.completed_pomodoros, &newer.completed_pomodoros),
            work_duration: unless(self.work_duration, &newer.work_duration),
            break_duration: unless(self.break_duration, &newer.break_duration),
        }
    }
}

fn validate_duration(minutes: u32, field_name: &str) -> Result<(), String> {
    if minutes == 0 {
        return Err(format!("{field_name} must be > 0"));
    }
    Ok(())
}

/// Accepts `YYYY-MM-DD` as is; RFC 3339 instants become the calendar date they
/// fall on in `time_zone`.
pub fn parse_due_date(value: &str, time_zone: Tz) -> Result<NaiveDate, String> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|instant| instant.with_timezone(&time_zone).date_naive())
        .map_err(|_| format!("due date must be YYYY-MM-DD or RFC 3339: {value}"))
}

fn optional_due_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_due_date(value, Tz::UTC)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn present_due_date<'de, D>(deserializer: D) -> Result<Option<Option<NaiveDate>>, D::Error>
where
    D: Deserializer<'de>,
{
    optional_due_date(deserializer).map(Some)
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

// SQLite-backed stores report booleans as 0/1.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(value)) => value,
        Some(Flag::Int(value)) => value != 0,
        None => false,
    })
}
