use std::fmt;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::datetime::{clock_time_serde, lenient_date_serde};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Importance {
    Trivial = 1,
    #[default]
    Normal = 2,
    Important = 3,
}

impl Importance {
    pub const ALL: [Importance; 3] = [Self::Trivial, Self::Normal, Self::Important];

    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Trivial => "trivial",
            Self::Normal => "normal",
            Self::Important => "important",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Self::Trivial => ".",
            Self::Normal => "*",
            Self::Important => "!",
        }
    }

    /// Accepts the numeric level or the label (or any unique label prefix).
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim().to_ascii_lowercase();
        if token.is_empty() {
            return None;
        }
        if let Ok(level) = token.parse::<u8>() {
            return Self::try_from(level).ok();
        }
        let mut matches = Self::ALL
            .into_iter()
            .filter(|imp| imp.label().starts_with(token.as_str()));
        let first = matches.next()?;
        if matches.next().is_some() {
            None
        } else {
            Some(first)
        }
    }
}

impl TryFrom<u8> for Importance {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            1 => Ok(Self::Trivial),
            2 => Ok(Self::Normal),
            3 => Ok(Self::Important),
            other => Err(format!("importance level must be 1, 2 or 3, got {other}")),
        }
    }
}

impl From<Importance> for u8 {
    fn from(value: Importance) -> Self {
        value.level()
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub importance_level: Importance,

    #[serde(default)]
    pub is_everyday: bool,

    #[serde(
        default,
        with = "lenient_date_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub ddl: Option<NaiveDate>,

    #[serde(
        default,
        with = "clock_time_serde::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub time: Option<NaiveTime>,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// The deadline date, which only one-time tasks have.
    pub fn deadline_date(&self) -> Option<NaiveDate> {
        if self.is_everyday { None } else { self.ddl }
    }

    /// A persisted task is either daily or carries a deadline, never neither.
    pub fn is_well_formed(&self) -> bool {
        self.is_everyday || self.ddl.is_some()
    }
}

/// Editor input for [`crate::tracker::Tracker::save`]. A draft without an id
/// becomes a new task; a draft with one is merged into the live task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
    pub id: Option<String>,
    pub title: String,
    pub content: String,
    pub importance_level: Importance,
    pub is_everyday: bool,
    pub ddl: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
}

impl TaskDraft {
    /// Blank editor state: due tomorrow, normal importance, one-time.
    pub fn new_default<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        let today = now.date_naive();
        Self {
            id: None,
            title: String::new(),
            content: String::new(),
            importance_level: Importance::Normal,
            is_everyday: false,
            ddl: today.checked_add_days(Days::new(1)).or(Some(today)),
            time: None,
        }
    }

    pub fn from_task(task: &Task) -> Self {
        Self {
            id: Some(task.id.clone()),
            title: task.title.clone(),
            content: task.content.clone(),
            importance_level: task.importance_level,
            is_everyday: task.is_everyday,
            ddl: task.ddl,
            time: task.time,
        }
    }

    pub fn into_new_task(self, now: DateTime<Utc>) -> Task {
        let mut task = Task {
            id: Uuid::new_v4().to_string(),
            title: String::new(),
            content: String::new(),
            importance_level: Importance::Normal,
            is_everyday: false,
            ddl: None,
            time: None,
            created_at: now,
            last_completed_at: None,
        };
        self.merge_into(&mut task);
        task
    }

    /// Copies every editable field onto `task`; identity and timestamps stay.
    pub fn merge_into(self, task: &mut Task) {
        task.title = self.title;
        task.content = self.content;
        task.importance_level = self.importance_level;
        task.is_everyday = self.is_everyday;
        task.ddl = if self.is_everyday { None } else { self.ddl };
        task.time = self.time;
    }
}
