use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::datetime::{URGENT_WITHIN_DAYS, days_remaining, deadline_instant};
use crate::task::Task;

/// Tie-break priority for tasks that are not urgent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[default]
    Time,
    Importance,
}

impl SortMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Importance => "importance",
        }
    }
}

impl FromStr for SortMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "time" | "t" | "due" => Ok(Self::Time),
            "importance" | "i" | "imp" => Ok(Self::Importance),
            other => Err(anyhow!(
                "unknown sort mode: {other} (expected time or importance)"
            )),
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display tone derived from urgency and score. Never affects ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Urgent,
    Daily,
    Hot,
    Warm,
    Calm,
}

/// A task plus the fields computed for one ranking pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedTask {
    #[serde(flatten)]
    pub task: Task,
    pub days_remaining: i64,
    pub urgent: bool,
    pub deadline: Option<NaiveDateTime>,
    pub time_level: u8,
    pub score: u8,
}

impl RankedTask {
    pub fn new<Z: TimeZone>(task: Task, now: &DateTime<Z>) -> Self {
        let days = days_remaining(&task, now);
        let urgent = !task.is_everyday && days <= URGENT_WITHIN_DAYS;
        let deadline = deadline_instant(&task);
        let time_level = time_level(&task, days);
        let score = time_level + task.importance_level.level();
        Self {
            task,
            days_remaining: days,
            urgent,
            deadline,
            time_level,
            score,
        }
    }

    pub fn tone(&self) -> Tone {
        if self.task.is_everyday {
            Tone::Daily
        } else if self.urgent {
            Tone::Urgent
        } else if self.score >= 5 {
            Tone::Hot
        } else if self.score == 4 {
            Tone::Warm
        } else {
            Tone::Calm
        }
    }
}

/// 3 within three days, 2 within a week, 1 beyond; daily tasks sit at 2.
fn time_level(task: &Task, days: i64) -> u8 {
    if task.is_everyday {
        2
    } else if days <= 3 {
        3
    } else if days <= 7 {
        2
    } else {
        1
    }
}

/// Orders `tasks` for display. Callers pass the visible set.
#[tracing::instrument(skip(tasks, now), fields(count = tasks.len()))]
pub fn rank<Z: TimeZone>(tasks: &[Task], mode: SortMode, now: &DateTime<Z>) -> Vec<RankedTask> {
    let mut ranked: Vec<RankedTask> = tasks
        .iter()
        .cloned()
        .map(|task| RankedTask::new(task, now))
        .collect();
    ranked.sort_by(|a, b| compare(a, b, mode));
    debug!(
        urgent = ranked.iter().filter(|t| t.urgent).count(),
        "ranked tasks"
    );
    ranked
}

pub fn compare(a: &RankedTask, b: &RankedTask, mode: SortMode) -> Ordering {
    let ordering = match (a.urgent, b.urgent) {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (true, true) => a
            .deadline
            .cmp(&b.deadline)
            .then_with(|| by_importance(a, b)),
        (false, false) => match mode {
            SortMode::Time => a
                .days_remaining
                .cmp(&b.days_remaining)
                .then_with(|| by_deadline_if_dated(a, b))
                .then_with(|| by_importance(a, b)),
            SortMode::Importance => by_importance(a, b)
                .then_with(|| a.days_remaining.cmp(&b.days_remaining))
                .then_with(|| by_deadline_if_dated(a, b)),
        },
    };

    ordering
        .then_with(|| b.task.created_at.cmp(&a.task.created_at))
        .then_with(|| a.task.id.cmp(&b.task.id))
}

fn by_importance(a: &RankedTask, b: &RankedTask) -> Ordering {
    b.task.importance_level.cmp(&a.task.importance_level)
}

fn by_deadline_if_dated(a: &RankedTask, b: &RankedTask) -> Ordering {
    if a.task.is_everyday || b.task.is_everyday {
        return Ordering::Equal;
    }
    a.deadline.cmp(&b.deadline)
}
