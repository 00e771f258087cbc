use std::collections::HashSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::history::{HistoryArchive, HistoryEntry};
use crate::rank::SortMode;
use crate::store::TaskStore;
use crate::task::Task;
use crate::tracker::Tracker;

pub const TASKS_KEY: &str = "tasks";
pub const HISTORY_KEY: &str = "history";

/// Two JSON blobs (`tasks.json`, `history.json`) plus the persisted sort
/// mode, all under one data directory.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub sort_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let sort_path = data_dir.join("sort.data");
        if !sort_path.exists() {
            fs::write(&sort_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            sort = %sort_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            sort_path,
        })
    }

    pub fn blob_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.json"))
    }

    /// Raw blob for `key`, or `None` when nothing was saved yet. Bytes are
    /// returned as stored; decoding is the caller's concern.
    #[tracing::instrument(skip(self))]
    pub fn load_blob(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let path = self.blob_path(key);
        match fs::read(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed reading {}", path.display())),
        }
    }

    #[tracing::instrument(skip(self, blob))]
    pub fn save_blob(&self, key: &str, blob: &str) -> anyhow::Result<()> {
        write_atomic(&self.blob_path(key), blob).with_context(|| format!("failed to save {key}"))
    }

    /// Live tasks. Unreadable data counts as an empty list, and records that
    /// are neither daily nor dated are dropped.
    #[tracing::instrument(skip(self))]
    pub fn load_tasks(&self) -> anyhow::Result<Vec<Task>> {
        let tasks: Vec<Task> = self.load_collection(TASKS_KEY)?;
        Ok(sanitize_tasks(tasks))
    }

    #[tracing::instrument(skip(self))]
    pub fn load_history(&self) -> anyhow::Result<HistoryArchive> {
        let entries: Vec<HistoryEntry> = self.load_collection(HISTORY_KEY)?;
        Ok(HistoryArchive::new(entries))
    }

    #[tracing::instrument(skip(self, tasks), fields(count = tasks.len()))]
    pub fn save_tasks(&self, tasks: &[Task]) -> anyhow::Result<()> {
        self.save_collection(TASKS_KEY, tasks)
    }

    #[tracing::instrument(skip(self, history), fields(count = history.len()))]
    pub fn save_history(&self, history: &HistoryArchive) -> anyhow::Result<()> {
        self.save_collection(HISTORY_KEY, &history.to_vec())
    }

    pub fn load_tracker(&self) -> anyhow::Result<Tracker> {
        let tasks = self.load_tasks()?;
        let history = self.load_history()?;
        Ok(Tracker::new(TaskStore::new(tasks), history))
    }

    /// Writes both blobs; called after every mutation.
    pub fn save_tracker(&self, tracker: &Tracker) -> anyhow::Result<()> {
        self.save_tasks(tracker.store().tasks())?;
        self.save_history(tracker.history())
    }

    #[tracing::instrument(skip(self))]
    pub fn get_sort_mode(&self) -> anyhow::Result<Option<SortMode>> {
        let raw = fs::read_to_string(&self.sort_path)
            .with_context(|| format!("failed reading {}", self.sort_path.display()))?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        match trimmed.parse::<SortMode>() {
            Ok(mode) => Ok(Some(mode)),
            Err(err) => {
                warn!(error = %err, "ignoring unreadable persisted sort mode");
                Ok(None)
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn set_sort_mode(&self, mode: Option<SortMode>) -> anyhow::Result<()> {
        let payload = mode.map(SortMode::as_str).unwrap_or_default();
        fs::write(&self.sort_path, payload)
            .with_context(|| format!("failed writing {}", self.sort_path.display()))?;
        Ok(())
    }

    fn load_collection<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Vec<T>> {
        let Some(raw) = self.load_blob(key)? else {
            debug!(key, "no saved blob; starting empty");
            return Ok(Vec::new());
        };
        if raw.trim_ascii().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_slice::<Vec<T>>(&raw) {
            Ok(items) => {
                debug!(key, count = items.len(), "loaded blob");
                Ok(items)
            }
            Err(err) => {
                warn!(key, error = %err, "stored blob is corrupt; treating it as empty");
                Ok(Vec::new())
            }
        }
    }

    fn save_collection<T: Serialize>(&self, key: &str, items: &[T]) -> anyhow::Result<()> {
        let blob = serde_json::to_string_pretty(items)
            .with_context(|| format!("failed to serialize {key}"))?;
        self.save_blob(key, &blob)
    }
}

fn sanitize_tasks(tasks: Vec<Task>) -> Vec<Task> {
    let mut seen = HashSet::new();
    tasks
        .into_iter()
        .filter(|task| {
            if !task.is_well_formed() {
                warn!(id = %task.id, "dropping one-time task without a deadline");
                return false;
            }
            if !seen.insert(task.id.clone()) {
                warn!(id = %task.id, "dropping task with duplicate id");
                return false;
            }
            true
        })
        .collect()
}

#[tracing::instrument(skip(path, contents))]
fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
    debug!(file = %path.display(), bytes = contents.len(), "saving blob atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents.as_bytes())?;
    writeln!(temp)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
