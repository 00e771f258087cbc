use chrono::{DateTime, FixedOffset, TimeZone};
use serde::Serialize;

use crate::history::{HISTORY_CAPACITY, HistoryArchive, HistoryEntry};
use crate::partition::{HeroSelection, partition};
use crate::rank::{RankedTask, SortMode, rank};
use crate::store::visible_tasks;
use crate::task::Task;

/// Everything the display needs for one recomputation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewModel {
    pub generated_at: DateTime<FixedOffset>,
    pub sort_mode: SortMode,
    pub selection: HeroSelection,
    pub hero: Vec<RankedTask>,
    pub grid: Vec<RankedTask>,
    /// Daily tasks already done today, hidden from hero and grid.
    pub hidden: usize,
    pub history: Vec<HistoryEntry>,
    pub history_capacity: usize,
}

impl ViewModel {
    /// Hero tasks then grid tasks, the order positional references use.
    pub fn ordered(&self) -> impl Iterator<Item = &RankedTask> {
        self.hero.iter().chain(self.grid.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.hero.is_empty() && self.grid.is_empty()
    }
}

/// Recomputes the dashboard from scratch. Pure: call it whenever the tasks,
/// the history, the sort mode or the clock changes.
#[tracing::instrument(skip_all, fields(mode = %mode))]
pub fn derive_view<Z: TimeZone>(
    tasks: &[Task],
    history: &HistoryArchive,
    mode: SortMode,
    now: &DateTime<Z>,
) -> ViewModel {
    let visible = visible_tasks(tasks, now);
    let hidden = tasks.len() - visible.len();
    let split = partition(rank(&visible, mode, now));

    ViewModel {
        generated_at: now.fixed_offset(),
        sort_mode: mode,
        selection: split.selection,
        hero: split.hero,
        grid: split.grid,
        hidden,
        history: history.to_vec(),
        history_capacity: HISTORY_CAPACITY,
    }
}
