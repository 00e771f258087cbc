use serde::Serialize;
use tracing::debug;

use crate::rank::RankedTask;

/// Which branch picked the hero set in a given pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeroSelection {
    /// Every urgent task is a hero.
    UrgentSet,
    /// Nothing is urgent; the single top-ranked task is the hero.
    TopRanked,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    pub hero: Vec<RankedTask>,
    pub grid: Vec<RankedTask>,
    pub selection: HeroSelection,
}

/// Splits a ranked sequence into hero and grid. Urgent tasks form a
/// contiguous prefix of any ranking, so the cut point is a partition point.
pub fn partition(mut ranked: Vec<RankedTask>) -> Partition {
    let urgent_len = ranked.partition_point(|t| t.urgent);

    let (selection, cut) = if urgent_len > 0 {
        (HeroSelection::UrgentSet, urgent_len)
    } else if !ranked.is_empty() {
        (HeroSelection::TopRanked, 1)
    } else {
        (HeroSelection::Empty, 0)
    };

    let grid = ranked.split_off(cut);
    debug!(?selection, hero = ranked.len(), grid = grid.len(), "partitioned");
    Partition {
        hero: ranked,
        grid,
        selection,
    }
}
