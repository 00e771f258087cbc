use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::task::Task;

pub const HISTORY_CAPACITY: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// A completed one-time task; can be restored.
    #[default]
    Normal,
    /// Snapshot taken when a daily task was done; informational only.
    DailyLog,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Nil when the stored record predates entry ids; see
    /// [`HistoryArchive::new`].
    #[serde(default)]
    pub entry_id: Uuid,

    #[serde(flatten)]
    pub task: Task,

    pub completed_at: DateTime<Utc>,

    #[serde(rename = "type", default)]
    pub kind: EntryKind,
}

impl HistoryEntry {
    /// Id derived from the task id and completion instant, so a record
    /// saved without one reads back with the same id every time.
    fn stable_id(&self) -> Uuid {
        let key = format!("{}|{}", self.task.id, self.completed_at.to_rfc3339());
        Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
    }

    pub fn is_restorable(&self) -> bool {
        self.kind == EntryKind::Normal
    }

    /// The live task this entry was archived from.
    pub fn into_task(self) -> Task {
        self.task
    }
}

/// Newest-first log of finished tasks, never longer than
/// [`HISTORY_CAPACITY`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryArchive {
    entries: VecDeque<HistoryEntry>,
}

impl HistoryArchive {
    pub fn new(entries: Vec<HistoryEntry>) -> Self {
        let mut entries = VecDeque::from(entries);
        for entry in entries.iter_mut().filter(|e| e.entry_id.is_nil()) {
            entry.entry_id = entry.stable_id();
            debug!(id = %entry.task.id, entry = %entry.entry_id, "assigned id to legacy history entry");
        }
        if entries.len() > HISTORY_CAPACITY {
            debug!(
                loaded = entries.len(),
                capacity = HISTORY_CAPACITY,
                "truncating oversized history"
            );
            entries.truncate(HISTORY_CAPACITY);
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn get(&self, entry_id: Uuid) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.entry_id == entry_id)
    }

    pub fn to_vec(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Prepends a snapshot of `task`, evicting the oldest entries past
    /// capacity. Returns the new entry's id.
    #[tracing::instrument(skip(self, task), fields(id = %task.id))]
    pub fn archive(&mut self, task: Task, now: DateTime<Utc>, kind: EntryKind) -> Uuid {
        let entry_id = Uuid::new_v4();
        self.entries.push_front(HistoryEntry {
            entry_id,
            task,
            completed_at: now,
            kind,
        });
        while self.entries.len() > HISTORY_CAPACITY {
            if let Some(evicted) = self.entries.pop_back() {
                info!(entry = %evicted.entry_id, title = %evicted.task.title, "history full; dropped oldest entry");
            }
        }
        entry_id
    }

    /// Removes and returns the entry regardless of kind.
    #[tracing::instrument(skip(self))]
    pub fn remove(&mut self, entry_id: Uuid) -> Option<HistoryEntry> {
        let idx = self.entries.iter().position(|e| e.entry_id == entry_id)?;
        self.entries.remove(idx)
    }
}
