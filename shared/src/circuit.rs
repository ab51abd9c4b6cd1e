//! Closed-loop circuit geometry
//!
//! A circuit is an immutable polyline whose last point coincides with its
//! first. Every segment doubles as a checkpoint: segment `i` is checkpoint `i`,
//! and crossing from the last checkpoint back onto checkpoint 0 completes a lap.
//!
//! The only query the race engine needs every tick is [`CircuitPath::project`],
//! which finds the segment closest to a world position and the arc length of
//! the projected point measured from the circuit origin.

use crate::vector::Vector2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Distances closer than this are treated as equal when picking the nearest
/// segment, so a point sitting on a shared vertex resolves to the lower index.
const TIE_EPSILON: f32 = 1e-4;

/// Number of checkpoints in the built-in circuit.
const DEFAULT_CHECKPOINTS: usize = 24;

/// Upper bound on segments, so the welcome packet carrying the circuit fits
/// in a single datagram.
pub const MAX_SEGMENTS: usize = 4096;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CircuitError {
    #[error("a circuit needs at least 3 segments, got {found}")]
    TooFewSegments { found: usize },
    #[error("waypoint {index} has a non-finite coordinate")]
    NonFiniteWaypoint { index: usize },
    #[error("segment {index} has zero length")]
    DegenerateSegment { index: usize },
    #[error("a circuit may have at most {max} segments, got {found}")]
    TooManySegments { found: usize, max: usize },
}

/// Serialized form of a circuit, as found in circuit JSON files and in the
/// welcome packet sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitDefinition {
    pub waypoints: Vec<[f32; 2]>,
}

/// Result of projecting a world position onto the circuit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub segment_index: usize,
    pub projected_point: Vector2,
    pub lateral_distance: f32,
    pub arc_length: f32,
}

#[derive(Debug, Clone)]
pub struct CircuitPath {
    /// Closed polyline; `points[0] == points[points.len() - 1]`.
    points: Vec<Vector2>,
    segment_lengths: Vec<f32>,
    /// Arc length at the start of each segment.
    segment_starts: Vec<f32>,
    length: f32,
}

impl CircuitPath {
    /// Builds a circuit from its waypoints, closing the loop if the last
    /// waypoint does not already repeat the first one.
    pub fn new(waypoints: Vec<Vector2>) -> Result<Self, CircuitError> {
        if let Some(index) = waypoints.iter().position(|p| !p.is_finite()) {
            return Err(CircuitError::NonFiniteWaypoint { index });
        }

        let mut points = waypoints;
        if let (Some(first), Some(last)) = (points.first().copied(), points.last().copied()) {
            if first != last {
                points.push(first);
            }
        }

        let segment_count = points.len().saturating_sub(1);
        if segment_count < 3 {
            return Err(CircuitError::TooFewSegments {
                found: segment_count,
            });
        }
        if segment_count > MAX_SEGMENTS {
            return Err(CircuitError::TooManySegments {
                found: segment_count,
                max: MAX_SEGMENTS,
            });
        }

        let mut segment_lengths = Vec::with_capacity(segment_count);
        let mut segment_starts = Vec::with_capacity(segment_count);
        let mut length = 0.0;

        for (index, pair) in points.windows(2).enumerate() {
            let segment_length = pair[0].distance(&pair[1]);
            if segment_length <= 0.0 {
                return Err(CircuitError::DegenerateSegment { index });
            }
            segment_starts.push(length);
            segment_lengths.push(segment_length);
            length += segment_length;
        }

        Ok(CircuitPath {
            points,
            segment_lengths,
            segment_starts,
            length,
        })
    }

    pub fn from_definition(definition: &CircuitDefinition) -> Result<Self, CircuitError> {
        Self::new(
            definition
                .waypoints
                .iter()
                .map(|&p| Vector2::from(p))
                .collect(),
        )
    }

    /// An elliptical circuit used when no circuit file is configured.
    pub fn default_oval() -> Result<Self, CircuitError> {
        let waypoints = (0..DEFAULT_CHECKPOINTS)
            .map(|i| {
                let angle = i as f32 / DEFAULT_CHECKPOINTS as f32 * std::f32::consts::TAU;
                Vector2::new(120.0 * angle.cos(), 60.0 * angle.sin())
            })
            .collect();

        Self::new(waypoints)
    }

    pub fn definition(&self) -> CircuitDefinition {
        CircuitDefinition {
            waypoints: self.points.iter().map(|&p| p.into()).collect(),
        }
    }

    /// Total perimeter of the loop.
    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn segment_count(&self) -> usize {
        self.segment_lengths.len()
    }

    /// Index of the checkpoint that precedes the start line.
    pub fn last_checkpoint(&self) -> usize {
        self.segment_count() - 1
    }

    pub fn waypoints(&self) -> &[Vector2] {
        &self.points
    }

    /// Projects `point` onto the closest segment of the circuit.
    ///
    /// Every segment is tested with a clamped perpendicular projection; the
    /// segment with the smallest lateral distance wins and ties go to the
    /// lower segment index. The function is pure, so concurrent callers can
    /// share one circuit.
    pub fn project(&self, point: Vector2) -> Projection {
        let mut best = self.project_on_segment(0, point);

        for index in 1..self.segment_count() {
            let candidate = self.project_on_segment(index, point);
            if candidate.lateral_distance < best.lateral_distance - TIE_EPSILON {
                best = candidate;
            }
        }

        best
    }

    fn project_on_segment(&self, index: usize, point: Vector2) -> Projection {
        let a = self.points[index];
        let b = self.points[index + 1];
        let ab = b.sub(&a);

        let t = (point.sub(&a).dot(&ab) / ab.dot(&ab)).clamp(0.0, 1.0);
        let projected_point = if t <= 0.0 {
            a
        } else if t >= 1.0 {
            b
        } else {
            a.add(&ab.scale(t))
        };

        Projection {
            segment_index: index,
            projected_point,
            lateral_distance: point.distance(&projected_point),
            arc_length: self.segment_starts[index] + self.segment_lengths[index] * t,
        }
    }

    /// Point on the circuit at the given arc length, wrapping around the loop.
    pub fn point_at(&self, arc_length: f32) -> Vector2 {
        let arc = arc_length.rem_euclid(self.length);
        let index = self
            .segment_starts
            .partition_point(|&start| start <= arc)
            .saturating_sub(1);

        let a = self.points[index];
        let b = self.points[index + 1];
        let t = ((arc - self.segment_starts[index]) / self.segment_lengths[index]).clamp(0.0, 1.0);
        a.add(&b.sub(&a).scale(t))
    }

    /// Starting grid position for `slot`, spread evenly along the last
    /// checkpoint so every racer starts just behind the start line.
    pub fn grid_position(&self, slot: usize, grid_size: usize) -> Vector2 {
        let last_length = self.segment_lengths[self.last_checkpoint()];
        let spacing = last_length / (grid_size.max(1) + 1) as f32;
        self.point_at(self.length - spacing * (slot + 1) as f32)
    }

    /// Where racers wait between races: the circuit origin.
    pub fn lobby_position(&self) -> Vector2 {
        self.points[0]
    }
}
