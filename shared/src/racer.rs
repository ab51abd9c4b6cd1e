use crate::progress::RacerProgress;
use crate::vector::Vector2;
use crate::{ColorId, ConnectionId, RacerId, SPECTATOR_ID};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Racer,
    Spectator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    /// Leaving; excluded from projection and ranking until removed.
    Disconnecting,
}

/// A participant of the session, racing or spectating.
#[derive(Debug, Clone)]
pub struct Racer {
    pub connection_id: ConnectionId,
    /// Grid slot for racers, [`SPECTATOR_ID`] for spectators.
    pub id: RacerId,
    pub role: Role,
    pub name: String,
    pub color: Option<ColorId>,
    pub progress: RacerProgress,
    pub connection_state: ConnectionState,
    /// Set once the participant reported ready; positions are ignored before.
    pub movement_authorized: bool,
    /// Latest world position reported by the vehicle simulation.
    pub position: Option<Vector2>,
    pub last_position_sequence: u32,
}

impl Racer {
    pub fn new(connection_id: ConnectionId, id: RacerId, role: Role, name: String) -> Self {
        Self {
            connection_id,
            id,
            role,
            name,
            color: None,
            progress: RacerProgress::default(),
            connection_state: ConnectionState::Connected,
            movement_authorized: false,
            position: None,
            last_position_sequence: 0,
        }
    }

    pub fn spectator(connection_id: ConnectionId, name: String) -> Self {
        Self::new(connection_id, SPECTATOR_ID, Role::Spectator, name)
    }

    pub fn is_racer(&self) -> bool {
        self.role == Role::Racer
    }

    /// Racing participant that still takes part in projection and ranking.
    pub fn is_active_racer(&self) -> bool {
        self.is_racer() && self.connection_state == ConnectionState::Connected
    }

    /// Stores a position report from the vehicle simulation.
    ///
    /// Reports are dropped when movement is not authorized yet or when they
    /// arrive out of order.
    pub fn record_position(&mut self, sequence: u32, position: Vector2) -> bool {
        if !self.movement_authorized || !position.is_finite() {
            return false;
        }
        if sequence <= self.last_position_sequence {
            return false;
        }

        self.last_position_sequence = sequence;
        self.position = Some(position);
        true
    }

    /// Moves the racer without consuming a report sequence number.
    pub fn teleport(&mut self, position: Vector2) {
        self.position = Some(position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_racer_creation() {
        let racer = Racer::new(4, 1, Role::Racer, "Guest4".to_string());
        assert_eq!(racer.connection_id, 4);
        assert_eq!(racer.id, 1);
        assert!(racer.is_racer());
        assert!(racer.is_active_racer());
        assert_eq!(racer.color, None);
        assert_eq!(racer.progress.lap, -1);
        assert!(!racer.movement_authorized);
    }

    #[test]
    fn test_spectator() {
        let spectator = Racer::spectator(9, "Guest9".to_string());
        assert_eq!(spectator.id, SPECTATOR_ID);
        assert!(!spectator.is_racer());
        assert!(!spectator.is_active_racer());
    }

    #[test]
    fn test_disconnecting_racer_is_inactive() {
        let mut racer = Racer::new(1, 0, Role::Racer, "Guest1".to_string());
        racer.connection_state = ConnectionState::Disconnecting;
        assert!(!racer.is_active_racer());
    }

    #[test]
    fn test_position_requires_authorization() {
        let mut racer = Racer::new(1, 0, Role::Racer, "Guest1".to_string());
        assert!(!racer.record_position(1, Vector2::new(1.0, 1.0)));
        assert_eq!(racer.position, None);

        racer.movement_authorized = true;
        assert!(racer.record_position(1, Vector2::new(1.0, 1.0)));
        assert_eq!(racer.position, Some(Vector2::new(1.0, 1.0)));
    }

    #[test]
    fn test_out_of_order_positions_dropped() {
        let mut racer = Racer::new(1, 0, Role::Racer, "Guest1".to_string());
        racer.movement_authorized = true;

        assert!(racer.record_position(5, Vector2::new(5.0, 0.0)));
        assert!(!racer.record_position(3, Vector2::new(3.0, 0.0)));
        assert!(!racer.record_position(5, Vector2::new(6.0, 0.0)));
        assert!(!racer.record_position(6, Vector2::new(f32::INFINITY, 0.0)));

        assert_eq!(racer.position, Some(Vector2::new(5.0, 0.0)));
        assert_eq!(racer.last_position_sequence, 5);
    }

    #[test]
    fn test_teleport_keeps_sequence() {
        let mut racer = Racer::new(1, 0, Role::Racer, "Guest1".to_string());
        racer.movement_authorized = true;
        racer.record_position(2, Vector2::new(1.0, 0.0));

        racer.teleport(Vector2::new(-3.0, 0.0));

        assert_eq!(racer.position, Some(Vector2::new(-3.0, 0.0)));
        assert_eq!(racer.last_position_sequence, 2);
    }
}
