use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::history::{EntryKind, HistoryArchive, HistoryEntry};
use crate::rank::SortMode;
use crate::store::TaskStore;
use crate::task::{Task, TaskDraft};
use crate::view::{ViewModel, derive_view};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("a one-time task needs a deadline; set due:<date> or mark it +daily")]
    MissingDeadline,

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("history entry not found: {0}")]
    EntryNotFound(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompleteOutcome {
    /// One-time task left the store and went to history.
    Archived { entry_id: Uuid },
    /// Daily task stays live; a log entry was added to history.
    Logged { entry_id: Uuid, task: Task },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored(Task),
    /// Daily-log entries are not restorable; nothing changed.
    Ignored,
}

/// Live tasks and their history, with every state transition between them.
#[derive(Debug, Clone, Default)]
pub struct Tracker {
    store: TaskStore,
    history: HistoryArchive,
}

impl Tracker {
    pub fn new(store: TaskStore, history: HistoryArchive) -> Self {
        Self { store, history }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn history(&self) -> &HistoryArchive {
        &self.history
    }

    pub fn into_parts(self) -> (TaskStore, HistoryArchive) {
        (self.store, self.history)
    }

    /// Editor save. New drafts get an id and creation stamp and go to the
    /// front; existing ones are merged in place.
    #[tracing::instrument(skip(self, draft, now), fields(id = ?draft.id))]
    pub fn save(&mut self, draft: TaskDraft, now: DateTime<Utc>) -> Result<Task, TrackerError> {
        if !draft.is_everyday && draft.ddl.is_none() {
            debug!("rejected draft without deadline");
            return Err(TrackerError::MissingDeadline);
        }

        match draft.id.clone() {
            Some(id) => {
                let saved = self
                    .store
                    .update(&id, |task| draft.merge_into(task))
                    .ok_or(TrackerError::TaskNotFound(id))?;
                info!(id = %saved.id, "updated task");
                Ok(saved)
            }
            None => {
                let task = draft.into_new_task(now);
                info!(id = %task.id, title = %task.title, "created task");
                self.store.insert_front(task.clone());
                Ok(task)
            }
        }
    }

    #[tracing::instrument(skip(self, now))]
    pub fn complete(&mut self, id: &str, now: DateTime<Utc>) -> Result<CompleteOutcome, TrackerError> {
        let live = self
            .store
            .get(id)
            .ok_or_else(|| TrackerError::TaskNotFound(id.to_string()))?;

        if live.is_everyday {
            let task = self
                .store
                .update(id, |task| task.last_completed_at = Some(now))
                .ok_or_else(|| TrackerError::TaskNotFound(id.to_string()))?;
            let entry_id = self.history.archive(task.clone(), now, EntryKind::DailyLog);
            info!(%entry_id, "logged daily task");
            return Ok(CompleteOutcome::Logged { entry_id, task });
        }

        let task = self
            .store
            .remove(id)
            .ok_or_else(|| TrackerError::TaskNotFound(id.to_string()))?;
        let entry_id = self.history.archive(task, now, EntryKind::Normal);
        info!(%entry_id, "archived task");
        Ok(CompleteOutcome::Archived { entry_id })
    }

    /// Removes a live task without archiving it.
    #[tracing::instrument(skip(self))]
    pub fn delete(&mut self, id: &str) -> Result<Task, TrackerError> {
        let task = self
            .store
            .remove(id)
            .ok_or_else(|| TrackerError::TaskNotFound(id.to_string()))?;
        info!(title = %task.title, "deleted task");
        Ok(task)
    }

    #[tracing::instrument(skip(self))]
    pub fn restore(&mut self, entry_id: Uuid) -> Result<RestoreOutcome, TrackerError> {
        let entry = self
            .history
            .get(entry_id)
            .ok_or(TrackerError::EntryNotFound(entry_id))?;
        if !entry.is_restorable() {
            debug!("daily log entries are not restorable");
            return Ok(RestoreOutcome::Ignored);
        }

        let task = self
            .history
            .remove(entry_id)
            .ok_or(TrackerError::EntryNotFound(entry_id))?
            .into_task();
        self.store.insert_front(task.clone());
        info!(id = %task.id, "restored task");
        Ok(RestoreOutcome::Restored(task))
    }

    /// Drops a history entry for good.
    #[tracing::instrument(skip(self))]
    pub fn purge(&mut self, entry_id: Uuid) -> Result<HistoryEntry, TrackerError> {
        let entry = self
            .history
            .remove(entry_id)
            .ok_or(TrackerError::EntryNotFound(entry_id))?;
        info!(id = %entry.task.id, "purged history entry");
        Ok(entry)
    }

    pub fn view<Z: TimeZone>(&self, mode: SortMode, now: &DateTime<Z>) -> ViewModel {
        derive_view(self.store.tasks(), &self.history, mode, now)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone};

    use super::*;
    use crate::history::HISTORY_CAPACITY;
    use crate::task::Importance;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0)
            .single()
            .expect("valid now")
    }

    fn draft(title: &str, daily: bool) -> TaskDraft {
        let mut draft = TaskDraft::new_default(&now());
        draft.title = title.to_string();
        draft.is_everyday = daily;
        draft
    }

    #[test]
    fn save_rejects_one_time_task_without_deadline() {
        let mut tracker = Tracker::default();
        let mut bad = draft("no date", false);
        bad.ddl = None;
        assert_eq!(tracker.save(bad, now()), Err(TrackerError::MissingDeadline));
        assert!(tracker.store().is_empty());
    }

    #[test]
    fn save_merges_existing_tasks_and_keeps_identity() {
        let mut tracker = Tracker::default();
        let created = tracker.save(draft("Draft", false), now()).expect("create");
        let mut edit = TaskDraft::from_task(&created);
        edit.title = "Final".to_string();
        edit.importance_level = Importance::Important;
        let later = now() + Duration::hours(2);
        let saved = tracker.save(edit, later).expect("update");
        assert_eq!(saved.id, created.id);
        assert_eq!(saved.created_at, created.created_at);
        assert_eq!(saved.title, "Final");
        assert_eq!(tracker.store().len(), 1);

        let mut ghost = TaskDraft::from_task(&created);
        ghost.id = Some("missing".to_string());
        assert_eq!(
            tracker.save(ghost, later),
            Err(TrackerError::TaskNotFound("missing".to_string()))
        );
    }

    #[test]
    fn new_tasks_go_to_the_front() {
        let mut tracker = Tracker::default();
        tracker.save(draft("first", false), now()).expect("first");
        tracker.save(draft("second", false), now()).expect("second");
        assert_eq!(tracker.store().tasks()[0].title, "second");
    }

    #[test]
    fn completing_one_time_task_archives_it() {
        let mut tracker = Tracker::default();
        let task = tracker.save(draft("Taxes", false), now()).expect("create");
        let outcome = tracker.complete(&task.id, now()).expect("complete");
        let CompleteOutcome::Archived { entry_id } = outcome else {
            panic!("expected archive outcome");
        };
        assert!(!tracker.store().contains(&task.id));
        let entry = tracker.history().get(entry_id).expect("entry");
        assert_eq!(entry.kind, EntryKind::Normal);
        assert_eq!(entry.completed_at, now());
    }

    #[test]
    fn completing_daily_task_forks_a_log_entry() {
        let mut tracker = Tracker::default();
        let task = tracker.save(draft("Walk", true), now()).expect("create");
        let outcome = tracker.complete(&task.id, now()).expect("complete");
        let CompleteOutcome::Logged { entry_id, task: live } = outcome else {
            panic!("expected daily log outcome");
        };
        assert_eq!(live.last_completed_at, Some(now()));
        assert_eq!(
            tracker.store().get(&task.id).and_then(|t| t.last_completed_at),
            Some(now())
        );
        assert_eq!(
            tracker.history().get(entry_id).map(|e| e.kind),
            Some(EntryKind::DailyLog)
        );
    }

    #[test]
    fn restore_brings_back_normal_entries_only() {
        let mut tracker = Tracker::default();
        let mut one_time = draft("Renew passport", false);
        one_time.ddl = NaiveDate::from_ymd_opt(2026, 7, 20);
        one_time.importance_level = Importance::Important;
        let task = tracker.save(one_time, now()).expect("create");
        let daily = tracker.save(draft("Read", true), now()).expect("create daily");

        let CompleteOutcome::Archived { entry_id } =
            tracker.complete(&task.id, now()).expect("complete")
        else {
            panic!("expected archive");
        };
        let CompleteOutcome::Logged { entry_id: log_id, .. } =
            tracker.complete(&daily.id, now()).expect("complete daily")
        else {
            panic!("expected daily log");
        };

        let history_before = tracker.history().clone();
        let store_before = tracker.store().tasks().to_vec();
        assert_eq!(tracker.restore(log_id), Ok(RestoreOutcome::Ignored));
        assert_eq!(tracker.history(), &history_before);
        assert_eq!(tracker.store().tasks(), store_before.as_slice());

        let RestoreOutcome::Restored(restored) = tracker.restore(entry_id).expect("restore") else {
            panic!("expected restore");
        };
        assert_eq!(restored, task);
        assert_eq!(tracker.store().tasks()[0].id, task.id);
        assert!(tracker.history().get(entry_id).is_none());
        assert_eq!(
            tracker.restore(entry_id),
            Err(TrackerError::EntryNotFound(entry_id))
        );
    }

    #[test]
    fn purge_and_delete_skip_the_archive_rules() {
        let mut tracker = Tracker::default();
        let keep = tracker.save(draft("keep", false), now()).expect("create");
        let gone = tracker.save(draft("gone", false), now()).expect("create");

        let deleted = tracker.delete(&gone.id).expect("delete");
        assert_eq!(deleted.id, gone.id);
        assert!(tracker.history().is_empty());

        let CompleteOutcome::Archived { entry_id } =
            tracker.complete(&keep.id, now()).expect("complete")
        else {
            panic!("expected archive");
        };
        tracker.purge(entry_id).expect("purge");
        assert!(tracker.history().is_empty());
        assert!(tracker.store().is_empty());
        assert!(tracker.delete(&keep.id).is_err());
    }

    #[test]
    fn history_stays_bounded_under_repeated_daily_completion() {
        let mut tracker = Tracker::default();
        let daily = tracker.save(draft("Meditate", true), now()).expect("create");
        for day in 0..(HISTORY_CAPACITY as i64 + 5) {
            tracker
                .complete(&daily.id, now() + Duration::days(day))
                .expect("complete");
        }
        assert_eq!(tracker.history().len(), HISTORY_CAPACITY);
        assert_eq!(tracker.store().len(), 1);
    }
}
