//! Types and race logic shared by the race server and its clients.
//!
//! The wire protocol ([`Packet`]) lives here together with everything both
//! sides must agree on: circuit geometry, progress tracking, ranking and the
//! replicated field model.

use serde::{Deserialize, Serialize};

pub mod circuit;
pub mod error;
pub mod progress;
pub mod racer;
pub mod ranking;
pub mod replication;
pub mod vector;

pub use circuit::{CircuitDefinition, CircuitError, CircuitPath, Projection, MAX_SEGMENTS};
pub use error::RequestError;
pub use progress::{ProgressEvent, ProgressTracker, RaceStage, RacerProgress};
pub use racer::{ConnectionState, Racer, Role};
pub use ranking::RankEntry;
pub use replication::{
    Delivery, FieldDelta, FieldKey, FieldValue, ParticipantAttr, ReplicatedField,
    ReplicationError,
};
pub use vector::Vector2;

/// Identifier the server hands out to each connection.
pub type ConnectionId = u32;
/// Grid slot of a racer (`0..max_racers`) or [`SPECTATOR_ID`].
pub type RacerId = u32;
/// Index into the 16-entry color palette.
pub type ColorId = u8;

pub const PROTOCOL_VERSION: u32 = 1;
pub const SPECTATOR_ID: RacerId = 9999;
pub const COLOR_COUNT: usize = 16;
pub const MIN_NAME_LENGTH: usize = 3;
pub const DEFAULT_MAX_LAPS: i32 = 3;
pub const DEFAULT_MAX_RACERS: usize = 4;
/// Largest UDP payload; receive buffers are sized to it.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Join {
        wants_racer: bool,
    },
    SetColor {
        color: i32,
    },
    SetName {
        name: String,
    },
    ReadyToRace,
    RequestFinish,
    StartRace,
    StopRace,
    /// World position reported by the vehicle simulation.
    Position {
        sequence: u32,
        x: f32,
        y: f32,
    },
    Heartbeat,
    Disconnect,

    Welcome {
        connection_id: ConnectionId,
        circuit: CircuitDefinition,
    },
    Joined {
        racer_id: RacerId,
        role: Role,
    },
    Rejected {
        reason: String,
    },
    /// Field deltas; a snapshot lists every field the server holds.
    Replicate {
        tick: u32,
        snapshot: bool,
        deltas: Vec<FieldDelta>,
    },
    ParticipantLeft {
        connection_id: ConnectionId,
    },
    Teleport {
        x: f32,
        y: f32,
    },
    Disconnected {
        reason: String,
    },
}

impl Packet {
    /// Packets a server accepts from clients.
    pub fn is_client_packet(&self) -> bool {
        matches!(
            self,
            Packet::Connect { .. }
                | Packet::Join { .. }
                | Packet::SetColor { .. }
                | Packet::SetName { .. }
                | Packet::ReadyToRace
                | Packet::RequestFinish
                | Packet::StartRace
                | Packet::StopRace
                | Packet::Position { .. }
                | Packet::Heartbeat
                | Packet::Disconnect
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_serialization_join() {
        let packet = Packet::Join { wants_racer: true };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Join { wants_racer } => assert!(wants_racer),
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_replicate() {
        let deltas = vec![
            FieldDelta {
                key: FieldKey::ActiveRace,
                version: 3,
                value: FieldValue::Bool(true),
            },
            FieldDelta {
                key: FieldKey::participant(2, ParticipantAttr::Lap),
                version: 7,
                value: FieldValue::Int(1),
            },
            FieldDelta {
                key: FieldKey::RaceOrder,
                version: 12,
                value: FieldValue::Names(vec!["ALICE".to_string(), "Guest2".to_string()]),
            },
        ];

        let packet = Packet::Replicate {
            tick: 42,
            snapshot: false,
            deltas,
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Replicate {
                tick,
                snapshot,
                deltas,
            } => {
                assert_eq!(tick, 42);
                assert!(!snapshot);
                assert_eq!(deltas.len(), 3);
                assert_eq!(deltas[1].key, FieldKey::participant(2, ParticipantAttr::Lap));
                assert_eq!(deltas[1].version, 7);
                assert_eq!(
                    deltas[2].value,
                    FieldValue::Names(vec!["ALICE".to_string(), "Guest2".to_string()])
                );
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_welcome() {
        let circuit = CircuitPath::default_oval().unwrap();
        let packet = Packet::Welcome {
            connection_id: 5,
            circuit: circuit.definition(),
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Welcome {
                connection_id,
                circuit: definition,
            } => {
                assert_eq!(connection_id, 5);
                let rebuilt = CircuitPath::from_definition(&definition).unwrap();
                assert_eq!(rebuilt.segment_count(), circuit.segment_count());
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_largest_welcome_fits_one_datagram() {
        let waypoints = (0..MAX_SEGMENTS)
            .map(|i| {
                let angle = i as f32 / MAX_SEGMENTS as f32 * std::f32::consts::TAU;
                Vector2::new(1000.0 * angle.cos(), 1000.0 * angle.sin())
            })
            .collect();
        let circuit = CircuitPath::new(waypoints).unwrap();
        assert_eq!(circuit.segment_count(), MAX_SEGMENTS);

        let packet = Packet::Welcome {
            connection_id: u32::MAX,
            circuit: circuit.definition(),
        };
        let serialized = bincode::serialize(&packet).unwrap();
        assert!(serialized.len() <= MAX_DATAGRAM_SIZE);
    }

    #[test]
    fn test_client_packet_classification() {
        assert!(Packet::ReadyToRace.is_client_packet());
        assert!(Packet::Position {
            sequence: 1,
            x: 0.0,
            y: 0.0
        }
        .is_client_packet());
        assert!(!Packet::Teleport { x: 0.0, y: 0.0 }.is_client_packet());
        assert!(!Packet::Disconnected {
            reason: "bye".to_string()
        }
        .is_client_packet());
    }

    #[test]
    fn test_malformed_packet_rejected() {
        let data = bincode::serialize(&Packet::Heartbeat).unwrap();
        let truncated: Result<Packet, _> = bincode::deserialize(&data[..data.len() / 2]);
        assert!(truncated.is_err());
    }
}
