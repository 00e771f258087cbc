use std::sync::Arc;

use chrono::{DateTime, TimeZone};
use tracing::{debug, trace};

use crate::datetime::local_day;
use crate::task::Task;

/// Live task collection. Mutations go through `Arc::make_mut`, so a snapshot
/// taken before a mutation keeps seeing the old list in full.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    tasks: Arc<Vec<Task>>,
}

impl TaskStore {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Arc::new(tasks),
        }
    }

    pub fn snapshot(&self) -> Arc<Vec<Task>> {
        Arc::clone(&self.tasks)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Inserts at the front, replacing any live task with the same id.
    #[tracing::instrument(skip(self, task), fields(id = %task.id))]
    pub fn insert_front(&mut self, task: Task) {
        let tasks = Arc::make_mut(&mut self.tasks);
        let before = tasks.len();
        tasks.retain(|t| t.id != task.id);
        if tasks.len() != before {
            debug!("replaced live task with the same id");
        }
        tasks.insert(0, task);
    }

    /// Applies `edit` to the task with `id` in place and returns the result.
    #[tracing::instrument(skip(self, edit))]
    pub fn update<F>(&mut self, id: &str, edit: F) -> Option<Task>
    where
        F: FnOnce(&mut Task),
    {
        let idx = self.tasks.iter().position(|t| t.id == id)?;
        let tasks = Arc::make_mut(&mut self.tasks);
        let task = &mut tasks[idx];
        edit(task);
        Some(task.clone())
    }

    #[tracing::instrument(skip(self))]
    pub fn remove(&mut self, id: &str) -> Option<Task> {
        let idx = self.tasks.iter().position(|t| t.id == id)?;
        Some(Arc::make_mut(&mut self.tasks).remove(idx))
    }

    pub fn visible<Z: TimeZone>(&self, now: &DateTime<Z>) -> Vec<Task> {
        visible_tasks(&self.tasks, now)
    }

    pub fn into_vec(self) -> Vec<Task> {
        Arc::unwrap_or_clone(self.tasks)
    }
}

/// True when a daily task was already done on `now`'s local day.
pub fn completed_today<Z: TimeZone>(task: &Task, now: &DateTime<Z>) -> bool {
    task.is_everyday
        && task
            .last_completed_at
            .is_some_and(|done| local_day(done, now) == now.date_naive())
}

/// Everything except daily tasks already completed today. They come back on
/// the next local day without any change to stored data.
pub fn visible_tasks<Z: TimeZone>(all: &[Task], now: &DateTime<Z>) -> Vec<Task> {
    all.iter()
        .filter(|task| {
            let hidden = completed_today(task, now);
            if hidden {
                trace!(id = %task.id, "daily task done today; hidden");
            }
            !hidden
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use chrono_tz::Tz;

    use super::*;
    use crate::task::Importance;

    fn task(id: &str, daily: bool) -> Task {
        Task {
            id: id.to_string(),
            title: id.to_string(),
            content: String::new(),
            importance_level: Importance::Normal,
            is_everyday: daily,
            ddl: if daily {
                None
            } else {
                NaiveDate::from_ymd_opt(2026, 5, 1)
            },
            time: None,
            created_at: Utc
                .with_ymd_and_hms(2026, 4, 1, 0, 0, 0)
                .single()
                .expect("valid created"),
            last_completed_at: None,
        }
    }

    #[test]
    fn snapshots_survive_mutation() {
        let mut store = TaskStore::new(vec![task("a", false), task("b", true)]);
        let before = store.snapshot();
        store.remove("a");
        store.insert_front(task("c", false));
        assert_eq!(before.len(), 2);
        assert_eq!(before[0].id, "a");
        let ids: Vec<_> = store.tasks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["c", "b"]);
    }

    #[test]
    fn insert_front_keeps_ids_unique() {
        let mut store = TaskStore::new(vec![task("a", false), task("b", false)]);
        let mut renamed = task("b", false);
        renamed.title = "again".to_string();
        store.insert_front(renamed);
        assert_eq!(store.len(), 2);
        assert_eq!(store.tasks()[0].title, "again");
    }

    #[test]
    fn update_reports_missing_ids() {
        let mut store = TaskStore::new(vec![task("a", false)]);
        assert!(store.update("zzz", |t| t.title.clear()).is_none());
        let edited = store
            .update("a", |t| t.title = "edited".to_string())
            .expect("task exists");
        assert_eq!(edited.title, "edited");
        assert_eq!(store.get("a").map(|t| t.title.as_str()), Some("edited"));
    }

    #[test]
    fn daily_done_today_is_hidden_until_next_local_day() {
        let tz: Tz = "America/New_York".parse().expect("known zone");
        let mut daily = task("d", true);
        // 23:30 local on May 3rd, already May 4th in UTC.
        daily.last_completed_at = Some(
            tz.with_ymd_and_hms(2026, 5, 3, 23, 30, 0)
                .single()
                .expect("valid local")
                .with_timezone(&Utc),
        );
        let all = vec![daily, task("x", false)];

        let same_evening = tz
            .with_ymd_and_hms(2026, 5, 3, 23, 55, 0)
            .single()
            .expect("valid now");
        let ids: Vec<_> = visible_tasks(&all, &same_evening)
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, ["x"]);

        let next_morning = tz
            .with_ymd_and_hms(2026, 5, 4, 0, 5, 0)
            .single()
            .expect("valid now");
        assert_eq!(visible_tasks(&all, &next_morning).len(), 2);
    }

    #[test]
    fn one_time_tasks_are_always_visible() {
        let mut one_time = task("o", false);
        one_time.last_completed_at = Some(Utc::now());
        assert_eq!(visible_tasks(&[one_time], &Utc::now()).len(), 1);
    }
}
