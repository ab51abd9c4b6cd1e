//! Text HUD driven by replication observers
//!
//! Observers registered on the mirrored fields turn every accepted change
//! into a [`HudEvent`]. The [`Hud`] folds those events into what a player
//! sees: own lap counter, the wrong-way warning, race order and winner.

use race_shared::{ColorId, ConnectionId, FieldKey, FieldValue, ParticipantAttr, RacerId, Role};

#[derive(Debug, Clone, PartialEq)]
pub enum HudEvent {
    RaceActive(bool),
    MaxLaps(i32),
    RaceOrder(Vec<String>),
    Winner(Option<String>),
    Name {
        connection_id: ConnectionId,
        name: String,
    },
    Color {
        connection_id: ConnectionId,
        color: Option<ColorId>,
    },
    Slot {
        connection_id: ConnectionId,
        racer_id: RacerId,
    },
    Role {
        connection_id: ConnectionId,
        role: Role,
    },
    Lap {
        connection_id: ConnectionId,
        lap: i32,
    },
    Checkpoint {
        connection_id: ConnectionId,
        checkpoint: i32,
    },
    WrongWay {
        connection_id: ConnectionId,
        wrong_way: bool,
    },
}

impl HudEvent {
    /// Event describing `value` arriving under `key`, or `None` when the pair
    /// does not match.
    pub fn from_field(key: &FieldKey, value: &FieldValue) -> Option<Self> {
        let event = match (key, value) {
            (FieldKey::ActiveRace, FieldValue::Bool(active)) => HudEvent::RaceActive(*active),
            (FieldKey::MaxLaps, FieldValue::Int(laps)) => HudEvent::MaxLaps(*laps),
            (FieldKey::RaceOrder, FieldValue::Names(names)) => HudEvent::RaceOrder(names.clone()),
            (FieldKey::Winner, FieldValue::OptionalText(winner)) => HudEvent::Winner(winner.clone()),
            (
                FieldKey::Participant {
                    connection_id,
                    attr,
                },
                value,
            ) => {
                let connection_id = *connection_id;
                match (attr, value) {
                    (ParticipantAttr::Name, FieldValue::Text(name)) => HudEvent::Name {
                        connection_id,
                        name: name.clone(),
                    },
                    (ParticipantAttr::Color, FieldValue::Color(color)) => HudEvent::Color {
                        connection_id,
                        color: *color,
                    },
                    (ParticipantAttr::RacerId, FieldValue::Racer(racer_id)) => HudEvent::Slot {
                        connection_id,
                        racer_id: *racer_id,
                    },
                    (ParticipantAttr::Role, FieldValue::Role(role)) => HudEvent::Role {
                        connection_id,
                        role: *role,
                    },
                    (ParticipantAttr::Lap, FieldValue::Int(lap)) => HudEvent::Lap {
                        connection_id,
                        lap: *lap,
                    },
                    (ParticipantAttr::Checkpoint, FieldValue::Int(checkpoint)) => {
                        HudEvent::Checkpoint {
                            connection_id,
                            checkpoint: *checkpoint,
                        }
                    }
                    (ParticipantAttr::WrongWay, FieldValue::Bool(wrong_way)) => {
                        HudEvent::WrongWay {
                            connection_id,
                            wrong_way: *wrong_way,
                        }
                    }
                    _ => return None,
                }
            }
            _ => return None,
        };
        Some(event)
    }
}

/// What the local player sees.
#[derive(Debug, Clone, Default)]
pub struct Hud {
    own_connection: Option<ConnectionId>,
    pub race_active: bool,
    pub max_laps: i32,
    pub lap: i32,
    pub wrong_way: bool,
    pub race_order: Vec<String>,
    pub winner: Option<String>,
}

impl Hud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_own_connection(&mut self, connection_id: ConnectionId) {
        self.own_connection = Some(connection_id);
    }

    fn is_own(&self, connection_id: ConnectionId) -> bool {
        self.own_connection == Some(connection_id)
    }

    /// Applies an event; returns a line worth showing, if any.
    pub fn apply(&mut self, event: HudEvent) -> Option<String> {
        match event {
            HudEvent::RaceActive(active) => {
                self.race_active = active;
                let line = if active {
                    self.winner = None;
                    "Race started!"
                } else {
                    "Race over"
                };
                Some(line.to_string())
            }
            HudEvent::MaxLaps(laps) => {
                self.max_laps = laps;
                None
            }
            HudEvent::RaceOrder(order) => {
                self.race_order = order;
                None
            }
            HudEvent::Winner(winner) => {
                self.winner = winner.clone();
                winner.map(|name| format!("{} wins!", name))
            }
            HudEvent::Lap { connection_id, lap } if self.is_own(connection_id) => {
                self.lap = lap;
                Some(format!("LAP {}/{}", lap, self.max_laps))
            }
            HudEvent::WrongWay {
                connection_id,
                wrong_way,
            } if self.is_own(connection_id) => {
                self.wrong_way = wrong_way;
                wrong_way.then(|| "WRONG WAY!".to_string())
            }
            HudEvent::Name {
                connection_id,
                name,
            } if self.is_own(connection_id) => Some(format!("You are {}", name)),
            _ => None,
        }
    }

    pub fn status_line(&self) -> String {
        let order = if self.race_order.is_empty() {
            "-".to_string()
        } else {
            self.race_order
                .iter()
                .enumerate()
                .map(|(place, name)| format!("{}. {}", place + 1, name))
                .collect::<Vec<_>>()
                .join("  ")
        };
        format!(
            "Lap {}/{}{} | {}",
            self.lap,
            self.max_laps,
            if self.wrong_way { " WRONG WAY" } else { "" },
            order
        )
    }
}
