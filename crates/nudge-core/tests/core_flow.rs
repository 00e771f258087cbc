use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use nudge_core::datastore::DataStore;
use nudge_core::history::{EntryKind, HISTORY_CAPACITY};
use nudge_core::partition::HeroSelection;
use nudge_core::rank::SortMode;
use nudge_core::task::{Importance, TaskDraft};
use nudge_core::tracker::{CompleteOutcome, RestoreOutcome, TrackerError};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

fn berlin(y: i32, m: u32, d: u32, h: u32) -> DateTime<Tz> {
    let tz: Tz = "Europe/Berlin".parse().expect("known zone");
    tz.with_ymd_and_hms(y, m, d, h, 0, 0).single().expect("valid time")
}

fn draft(now: &DateTime<Tz>, title: &str, ddl: Option<NaiveDate>, level: Importance) -> TaskDraft {
    let mut draft = TaskDraft::new_default(now);
    draft.title = title.to_string();
    draft.is_everyday = ddl.is_none();
    draft.ddl = ddl;
    draft.importance_level = level;
    draft
}

fn titles(view: &[nudge_core::rank::RankedTask]) -> Vec<&str> {
    view.iter().map(|t| t.task.title.as_str()).collect()
}

#[test]
fn dashboard_survives_reload_and_daily_tasks_come_back() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let morning = berlin(2026, 10, 16, 8);

    let mut tracker = store.load_tracker().expect("load");
    tracker
        .save(draft(&morning, "Stretch", None, Importance::Normal), morning.with_timezone(&Utc))
        .expect("daily");
    tracker
        .save(
            draft(&morning, "Submit report", NaiveDate::from_ymd_opt(2026, 10, 17), Importance::Important),
            morning.with_timezone(&Utc),
        )
        .expect("tomorrow");
    tracker
        .save(
            draft(&morning, "Book flights", NaiveDate::from_ymd_opt(2026, 10, 26), Importance::Trivial),
            morning.with_timezone(&Utc),
        )
        .expect("ten days");
    store.save_tracker(&tracker).expect("persist");

    let tracker = store.load_tracker().expect("reload");
    let view = tracker.view(SortMode::Time, &morning);
    assert_eq!(view.selection, HeroSelection::UrgentSet);
    assert_eq!(titles(&view.hero), ["Submit report"]);
    assert_eq!(titles(&view.grid), ["Book flights", "Stretch"]);

    let mut tracker = tracker;
    let stretch_id = view.grid[1].task.id.clone();
    let outcome = tracker
        .complete(&stretch_id, morning.with_timezone(&Utc))
        .expect("complete daily");
    assert!(matches!(outcome, CompleteOutcome::Logged { .. }));
    store.save_tracker(&tracker).expect("persist");

    let tracker = store.load_tracker().expect("reload");
    let later_today = tracker.view(SortMode::Time, &(morning + Duration::hours(10)));
    assert_eq!(later_today.hidden, 1);
    assert_eq!(titles(&later_today.grid), ["Book flights"]);
    assert_eq!(later_today.history.len(), 1);
    assert_eq!(later_today.history[0].kind, EntryKind::DailyLog);

    let next_morning = tracker.view(SortMode::Time, &berlin(2026, 10, 17, 7));
    assert_eq!(next_morning.hidden, 0);
    assert_eq!(titles(&next_morning.grid), ["Book flights", "Stretch"]);
}

#[test]
fn archive_at_capacity_evicts_oldest_and_restore_round_trips() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let start = berlin(2026, 3, 1, 9);
    let due = NaiveDate::from_ymd_opt(2026, 4, 1);

    let mut tracker = store.load_tracker().expect("load");
    for n in 0..=HISTORY_CAPACITY {
        let when = start + Duration::minutes(n as i64);
        let task = tracker
            .save(draft(&when, &format!("chore {n}"), due, Importance::Normal), when.with_timezone(&Utc))
            .expect("create");
        tracker
            .complete(&task.id, when.with_timezone(&Utc))
            .expect("complete");
    }
    store.save_tracker(&tracker).expect("persist");

    let mut tracker = store.load_tracker().expect("reload");
    assert_eq!(tracker.history().len(), HISTORY_CAPACITY);
    let newest = tracker.history().iter().next().expect("newest entry");
    assert_eq!(newest.task.title, format!("chore {HISTORY_CAPACITY}"));
    assert!(tracker.history().iter().all(|e| e.task.title != "chore 0"));
    assert!(tracker.store().is_empty());

    let entry_id = newest.entry_id;
    let restored = tracker.restore(entry_id).expect("restore");
    let RestoreOutcome::Restored(task) = restored else {
        panic!("normal entries are restorable");
    };
    assert_eq!(task.title, format!("chore {HISTORY_CAPACITY}"));
    assert_eq!(tracker.history().len(), HISTORY_CAPACITY - 1);
    store.save_tracker(&tracker).expect("persist");

    let tracker = store.load_tracker().expect("reload");
    assert_eq!(tracker.store().tasks()[0].id, task.id);
    let view = tracker.view(SortMode::Importance, &start);
    assert_eq!(view.selection, HeroSelection::TopRanked);
    assert_eq!(view.history.len(), HISTORY_CAPACITY - 1);
}

#[test]
fn invalid_save_leaves_disk_untouched() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let now = berlin(2026, 6, 1, 12);

    let mut tracker = store.load_tracker().expect("load");
    let mut undated = draft(&now, "Someday", None, Importance::Normal);
    undated.is_everyday = false;
    assert_eq!(
        tracker.save(undated, now.with_timezone(&Utc)),
        Err(TrackerError::MissingDeadline)
    );
    store.save_tracker(&tracker).expect("persist");

    let reloaded = store.load_tracker().expect("reload");
    assert!(reloaded.store().is_empty());
    assert!(reloaded.view(SortMode::Time, &now).is_empty());
}
