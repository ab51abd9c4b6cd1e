//! Stand-in vehicle simulation
//!
//! The real game drives cars with a physics engine; this client only needs
//! plausible position reports, so it glides along the circuit centerline at
//! a constant speed and reports where it is.

use race_shared::{CircuitPath, Vector2};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

pub struct Autopilot {
    circuit: Arc<CircuitPath>,
    arc_length: f32,
    speed: f32,
    direction: Direction,
    sequence: u32,
}

impl Autopilot {
    pub fn new(circuit: Arc<CircuitPath>, speed: f32, direction: Direction) -> Self {
        Self {
            circuit,
            arc_length: 0.0,
            speed: speed.max(0.0),
            direction,
            sequence: 0,
        }
    }

    /// Advances by `dt` seconds and returns the next position report.
    pub fn step(&mut self, dt: f32) -> (u32, Vector2) {
        let distance = self.speed * dt;
        self.arc_length = match self.direction {
            Direction::Forward => self.arc_length + distance,
            Direction::Reverse => self.arc_length - distance,
        }
        .rem_euclid(self.circuit.length());

        self.sequence = self.sequence.wrapping_add(1);
        (self.sequence, self.position())
    }

    /// Jumps to the point of the centerline nearest to `position`.
    pub fn teleport(&mut self, position: Vector2) {
        self.arc_length = self.circuit.project(position).arc_length;
    }

    pub fn position(&self) -> Vector2 {
        self.circuit.point_at(self.arc_length)
    }

    pub fn arc_length(&self) -> f32 {
        self.arc_length
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }
}
