//! Per-racer lap and checkpoint state machine
//!
//! Each tick the racer's world position is projected onto the circuit and the
//! resulting segment index is folded into discrete progress:
//!
//! - crossing from the last checkpoint onto checkpoint 0 adds a lap
//! - crossing back from checkpoint 0 onto the last checkpoint removes one
//! - any other sample must land on the current checkpoint or one of its
//!   neighbours; larger jumps are noise or teleports and are discarded
//!
//! The effective arc length folds the lap count into the continuous arc
//! length so racers on the same lap and checkpoint can still be ordered.

use crate::circuit::{CircuitPath, Projection};
use crate::vector::Vector2;
use log::debug;
use std::sync::Arc;

/// Lap value of a racer that has not crossed the start line yet.
pub const LAP_BEFORE_START: i32 = -1;

/// Derived race progress of a single racer.
#[derive(Debug, Clone, PartialEq)]
pub struct RacerProgress {
    pub checkpoint_index: usize,
    pub lap: i32,
    /// Highest lap ever reached; never decreases while a race runs.
    pub max_lap_reached: i32,
    pub wrong_way: bool,
    pub effective_arc_length: f32,
}

impl Default for RacerProgress {
    fn default() -> Self {
        Self {
            checkpoint_index: 0,
            lap: LAP_BEFORE_START,
            max_lap_reached: LAP_BEFORE_START,
            wrong_way: false,
            effective_arc_length: 0.0,
        }
    }
}

impl RacerProgress {
    /// Puts the racer back behind the start line.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn stage(&self, max_laps: i32) -> RaceStage {
        if self.lap < 0 {
            RaceStage::BeforeStart
        } else if self.lap < max_laps {
            RaceStage::Racing
        } else {
            RaceStage::Finished
        }
    }

    /// Lap number shown to players; negative laps read as zero.
    pub fn display_lap(&self) -> i32 {
        self.lap.max(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceStage {
    BeforeStart,
    Racing,
    Finished,
}

/// What a single tick did to a racer's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Sample landed on the current checkpoint.
    Held,
    /// Moved to the next checkpoint.
    Advanced,
    /// Moved to the previous checkpoint.
    Reversed,
    LapCompleted { lap: i32 },
    LapUndone { lap: i32 },
    /// Sample jumped more than one checkpoint and was discarded.
    Rejected { from: usize, to: usize },
}

/// Converts raw projections into lap/checkpoint progress.
///
/// The tracker is stateless apart from the circuit it was built with, so one
/// instance serves every racer.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    circuit: Arc<CircuitPath>,
}

impl ProgressTracker {
    pub fn new(circuit: Arc<CircuitPath>) -> Self {
        Self { circuit }
    }

    pub fn circuit(&self) -> &Arc<CircuitPath> {
        &self.circuit
    }

    /// Projects `position` and advances `progress` by one tick.
    pub fn update(&self, progress: &mut RacerProgress, position: Vector2) -> ProgressEvent {
        let projection = self.circuit.project(position);
        self.apply(progress, &projection)
    }

    /// Folds an already computed projection into `progress`.
    pub fn apply(&self, progress: &mut RacerProgress, projection: &Projection) -> ProgressEvent {
        let last = self.circuit.last_checkpoint();
        let count = self.circuit.segment_count();
        let segment = projection.segment_index;
        let current = progress.checkpoint_index;

        let event = if current == last && segment == 0 {
            progress.lap += 1;
            progress.max_lap_reached = progress.max_lap_reached.max(progress.lap);
            progress.wrong_way = false;
            ProgressEvent::LapCompleted { lap: progress.lap }
        } else if current == 0 && segment == last && progress.lap >= 0 {
            progress.lap -= 1;
            progress.wrong_way = true;
            ProgressEvent::LapUndone { lap: progress.lap }
        } else if segment == current {
            ProgressEvent::Held
        } else if segment == (current + 1) % count || segment == (current + count - 1) % count {
            progress.wrong_way = segment < current;
            if progress.wrong_way {
                ProgressEvent::Reversed
            } else {
                ProgressEvent::Advanced
            }
        } else {
            debug!(
                "Discarding checkpoint jump {} -> {} (lap {})",
                current, segment, progress.lap
            );
            return ProgressEvent::Rejected {
                from: current,
                to: segment,
            };
        };

        let length = self.circuit.length();
        progress.effective_arc_length = if progress.lap <= 0 {
            projection.arc_length - length
        } else {
            projection.arc_length + length * (progress.lap - 1) as f32
        };
        progress.checkpoint_index = segment;

        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    /// Square circuit with four 10-unit checkpoints (0..=3).
    fn tracker() -> ProgressTracker {
        let circuit = CircuitPath::new(vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(10.0, 0.0),
            Vector2::new(10.0, 10.0),
            Vector2::new(0.0, 10.0),
        ])
        .unwrap();
        ProgressTracker::new(Arc::new(circuit))
    }

    /// A point in the middle of checkpoint `index` of the square circuit.
    fn on_checkpoint(index: usize) -> Vector2 {
        match index {
            0 => Vector2::new(5.0, -1.0),
            1 => Vector2::new(11.0, 5.0),
            2 => Vector2::new(5.0, 11.0),
            _ => Vector2::new(-1.0, 5.0),
        }
    }

    fn progress(checkpoint_index: usize, lap: i32) -> RacerProgress {
        RacerProgress {
            checkpoint_index,
            lap,
            max_lap_reached: lap,
            ..RacerProgress::default()
        }
    }

    #[test]
    fn test_default_progress_is_before_start() {
        let p = RacerProgress::default();
        assert_eq!(p.lap, -1);
        assert_eq!(p.checkpoint_index, 0);
        assert_eq!(p.stage(3), RaceStage::BeforeStart);
        assert_eq!(p.display_lap(), 0);
    }

    #[test]
    fn test_stage_transitions() {
        assert_eq!(progress(0, 0).stage(3), RaceStage::Racing);
        assert_eq!(progress(0, 2).stage(3), RaceStage::Racing);
        assert_eq!(progress(0, 3).stage(3), RaceStage::Finished);
    }

    #[test]
    fn test_forward_lap_crossing() {
        let tracker = tracker();
        let mut p = progress(3, 0);

        let event = tracker.update(&mut p, on_checkpoint(0));

        assert_eq!(event, ProgressEvent::LapCompleted { lap: 1 });
        assert_eq!(p.lap, 1);
        assert_eq!(p.checkpoint_index, 0);
        assert_eq!(p.max_lap_reached, 1);
        assert!(!p.wrong_way);
        assert_approx_eq!(p.effective_arc_length, 5.0);
    }

    #[test]
    fn test_backward_lap_crossing() {
        let tracker = tracker();
        let mut p = progress(0, 1);

        let event = tracker.update(&mut p, on_checkpoint(3));

        assert_eq!(event, ProgressEvent::LapUndone { lap: 0 });
        assert_eq!(p.lap, 0);
        assert_eq!(p.checkpoint_index, 3);
        assert!(p.wrong_way);
        assert_eq!(p.max_lap_reached, 1);
        // lap 0 keeps the racer one circuit length behind
        assert_approx_eq!(p.effective_arc_length, 35.0 - 40.0);
    }

    #[test]
    fn test_no_backward_crossing_before_start() {
        let tracker = tracker();
        let mut p = RacerProgress::default();

        // Sitting on the grid behind the start line
        let event = tracker.update(&mut p, on_checkpoint(3));

        assert_eq!(event, ProgressEvent::Advanced);
        assert_eq!(p.lap, -1);
        assert_eq!(p.checkpoint_index, 3);
        assert!(!p.wrong_way);

        // Crossing the line starts lap 0
        let event = tracker.update(&mut p, on_checkpoint(0));
        assert_eq!(event, ProgressEvent::LapCompleted { lap: 0 });
        assert_eq!(p.lap, 0);
        assert_eq!(p.max_lap_reached, 0);
    }

    #[test]
    fn test_forward_and_reverse_neighbours() {
        let tracker = tracker();
        let mut p = progress(1, 1);

        assert_eq!(tracker.update(&mut p, on_checkpoint(2)), ProgressEvent::Advanced);
        assert_eq!(p.checkpoint_index, 2);
        assert!(!p.wrong_way);

        assert_eq!(tracker.update(&mut p, on_checkpoint(1)), ProgressEvent::Reversed);
        assert_eq!(p.checkpoint_index, 1);
        assert!(p.wrong_way);

        assert_eq!(tracker.update(&mut p, on_checkpoint(1)), ProgressEvent::Held);
        assert!(p.wrong_way);

        assert_eq!(tracker.update(&mut p, on_checkpoint(2)), ProgressEvent::Advanced);
        assert!(!p.wrong_way);
    }

    #[test]
    fn test_checkpoint_jump_is_discarded() {
        let tracker = tracker();
        let mut p = progress(0, 1);
        tracker.update(&mut p, on_checkpoint(0));
        let before = p.clone();

        let event = tracker.update(&mut p, on_checkpoint(2));

        assert_eq!(event, ProgressEvent::Rejected { from: 0, to: 2 });
        assert_eq!(p, before);
    }

    #[test]
    fn test_effective_arc_length_by_lap() {
        let tracker = tracker();

        let mut before_start = progress(0, -1);
        tracker.update(&mut before_start, Vector2::new(4.0, 0.0));
        assert_approx_eq!(before_start.effective_arc_length, 4.0 - 40.0);

        let mut second_lap = progress(0, 2);
        tracker.update(&mut second_lap, Vector2::new(4.0, 0.0));
        assert_approx_eq!(second_lap.effective_arc_length, 4.0 + 40.0);

        assert!(second_lap.effective_arc_length > before_start.effective_arc_length);
    }

    #[test]
    fn test_full_lap_sequence() {
        let tracker = tracker();
        let mut p = RacerProgress::default();
        p.checkpoint_index = 3;

        for lap in 0..3 {
            for checkpoint in 0..4 {
                tracker.update(&mut p, on_checkpoint(checkpoint));
            }
            assert_eq!(p.lap, lap);
        }
        assert_eq!(p.max_lap_reached, 2);
        assert_eq!(p.stage(2), RaceStage::Finished);
    }

    #[test]
    fn test_reset() {
        let mut p = progress(2, 3);
        p.wrong_way = true;
        p.reset();
        assert_eq!(p, RacerProgress::default());
    }
}
