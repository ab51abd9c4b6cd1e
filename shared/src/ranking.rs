//! Race order
//!
//! Racers are ordered by lap, then checkpoint, then effective arc length, all
//! descending. Racers whose three keys are identical are ordered by ascending
//! racer id so the result never depends on input order.

use crate::progress::RacerProgress;
use crate::RacerId;
use std::cmp::Ordering;

/// Minimum number of racers an active race needs to keep running.
pub const MIN_RACERS: usize = 2;

/// Snapshot of the values the comparator looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankEntry {
    pub racer_id: RacerId,
    pub lap: i32,
    pub checkpoint_index: usize,
    pub effective_arc_length: f32,
}

impl RankEntry {
    pub fn new(racer_id: RacerId, progress: &RacerProgress) -> Self {
        Self {
            racer_id,
            lap: progress.lap,
            checkpoint_index: progress.checkpoint_index,
            effective_arc_length: progress.effective_arc_length,
        }
    }
}

/// `Less` means `a` is ahead of `b`.
pub fn compare(a: &RankEntry, b: &RankEntry) -> Ordering {
    b.lap
        .cmp(&a.lap)
        .then_with(|| b.checkpoint_index.cmp(&a.checkpoint_index))
        .then_with(|| b.effective_arc_length.total_cmp(&a.effective_arc_length))
        .then_with(|| a.racer_id.cmp(&b.racer_id))
}

/// Returns racer ids from leader to last place.
pub fn rank(entries: &[RankEntry]) -> Vec<RacerId> {
    let mut sorted = entries.to_vec();
    sorted.sort_by(compare);
    sorted.into_iter().map(|entry| entry.racer_id).collect()
}

/// Applies the forfeit rule to an active race: once fewer than
/// [`MIN_RACERS`] remain the race must stop, and the survivor (if any) wins
/// by default. Returns `None` while the race may continue.
pub fn forfeit_winner(remaining: &[RacerId]) -> Option<Option<RacerId>> {
    if remaining.len() < MIN_RACERS {
        Some(remaining.first().copied())
    } else {
        None
    }
}
