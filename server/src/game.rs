//! Authoritative race simulation
//!
//! [`RaceGame`] owns the session, the progress tracker and the replica host.
//! Client requests are queued as they arrive and applied only at the start of
//! the next [`RaceGame::tick`], so a projection pass always sees a settled
//! registry. Everything the network layer must send ends up in the outbox.

use crate::config::ServerConfig;
use crate::replication::ReplicaHost;
use crate::session::{NameSource, SessionManager, StopReason, Transition};
use log::{debug, error, info, warn};
use race_shared::{
    ranking, CircuitPath, ConnectionId, FieldKey, FieldValue, Packet, ParticipantAttr,
    ProgressEvent, ProgressTracker, RankEntry, RequestError, Vector2,
};
use std::collections::VecDeque;
use std::sync::Arc;

/// A client request waiting for the next tick boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Join {
        connection_id: ConnectionId,
        wants_racer: bool,
    },
    SetColor {
        connection_id: ConnectionId,
        color: i32,
    },
    SetName {
        connection_id: ConnectionId,
        name: String,
    },
    Ready {
        connection_id: ConnectionId,
    },
    Finish {
        connection_id: ConnectionId,
    },
    StartRace {
        connection_id: ConnectionId,
    },
    StopRace {
        connection_id: ConnectionId,
    },
    Leave {
        connection_id: ConnectionId,
    },
}

impl Request {
    pub fn connection_id(&self) -> ConnectionId {
        match self {
            Request::Join { connection_id, .. }
            | Request::SetColor { connection_id, .. }
            | Request::SetName { connection_id, .. }
            | Request::Ready { connection_id }
            | Request::Finish { connection_id }
            | Request::StartRace { connection_id }
            | Request::StopRace { connection_id }
            | Request::Leave { connection_id } => *connection_id,
        }
    }

    /// Maps a client packet to the request it asks for. Packets that are not
    /// session requests (positions, heartbeats, server packets) yield `None`.
    pub fn from_packet(connection_id: ConnectionId, packet: &Packet) -> Option<Self> {
        let request = match packet {
            Packet::Join { wants_racer } => Request::Join {
                connection_id,
                wants_racer: *wants_racer,
            },
            Packet::SetColor { color } => Request::SetColor {
                connection_id,
                color: *color,
            },
            Packet::SetName { name } => Request::SetName {
                connection_id,
                name: name.clone(),
            },
            Packet::ReadyToRace => Request::Ready { connection_id },
            Packet::RequestFinish => Request::Finish { connection_id },
            Packet::StartRace => Request::StartRace { connection_id },
            Packet::StopRace => Request::StopRace { connection_id },
            Packet::Disconnect => Request::Leave { connection_id },
            _ => return None,
        };
        Some(request)
    }
}

/// A packet the network layer has to deliver.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    To(ConnectionId, Packet),
    Broadcast(Packet),
}

pub struct RaceGame {
    session: SessionManager,
    tracker: ProgressTracker,
    replicas: ReplicaHost,
    requests: VecDeque<Request>,
    outbox: Vec<Outbound>,
    tick: u32,
    resync_interval: u32,
    race_order: Vec<String>,
    race_time: f32,
}

impl RaceGame {
    pub fn new(circuit: Arc<CircuitPath>, config: &ServerConfig) -> Self {
        Self {
            session: SessionManager::new(
                Arc::clone(&circuit),
                config.max_racers,
                config.max_laps,
                config.color_seed,
            ),
            tracker: ProgressTracker::new(circuit),
            replicas: ReplicaHost::new(),
            requests: VecDeque::new(),
            outbox: Vec::new(),
            tick: 0,
            resync_interval: config.resync_interval,
            race_order: Vec::new(),
            race_time: 0.0,
        }
    }

    /// Publishes the global fields so the first snapshot is complete.
    pub fn initialize(&mut self) {
        self.publish();
        let published = self.replicas.drain_deltas().len();
        info!(
            "Race game initialized: circuit {:.1} units, {} checkpoints, {} laps, {} fields",
            self.tracker.circuit().length(),
            self.tracker.circuit().segment_count(),
            self.session.max_laps(),
            published
        );
    }

    pub fn queue(&mut self, request: Request) {
        self.requests.push_back(request);
    }

    /// Greets a new connection with the circuit and the current state.
    pub fn connect(&mut self, connection_id: ConnectionId) {
        self.outbox.push(Outbound::To(
            connection_id,
            Packet::Welcome {
                connection_id,
                circuit: self.tracker.circuit().definition(),
            },
        ));
        self.outbox.push(Outbound::To(
            connection_id,
            Packet::Replicate {
                tick: self.tick,
                snapshot: true,
                deltas: self.replicas.snapshot(),
            },
        ));
    }

    /// Takes the participant out of projection now and removes it at the
    /// next tick boundary.
    pub fn disconnect(&mut self, connection_id: ConnectionId) {
        self.session.mark_disconnecting(connection_id);
        self.queue(Request::Leave { connection_id });
    }

    /// Stores a position report from the vehicle simulation.
    pub fn record_position(&mut self, connection_id: ConnectionId, sequence: u32, position: Vector2) -> bool {
        self.session.record_position(connection_id, sequence, position)
    }

    /// Advances the simulation by one tick and returns the new tick number.
    pub fn tick(&mut self, dt: f32) -> u32 {
        while let Some(request) = self.requests.pop_front() {
            self.apply(request);
        }

        if self.session.is_active() {
            self.race_time += dt;
            self.track_progress();
        }
        self.rank();

        if let Some(transition) = self.session.enforce_minimum_racers() {
            self.handle_transition(transition);
        }

        self.publish();
        self.broadcast_changes();

        self.tick += 1;
        self.tick
    }

    /// Stops a running race and tells every client the server is going away.
    pub fn shutdown(&mut self) {
        if self.session.is_active() {
            match self.session.stop_race(StopReason::Stopped, None) {
                Ok(transition) => self.handle_transition(transition),
                Err(e) => warn!("Could not stop race on shutdown: {}", e),
            }
            self.publish();
            self.broadcast_changes();
        }
        self.outbox.push(Outbound::Broadcast(Packet::Disconnected {
            reason: "Server shutting down".to_string(),
        }));
        info!("Race game shut down after {} ticks", self.tick);
    }

    pub fn drain_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn replicas(&self) -> &ReplicaHost {
        &self.replicas
    }

    pub fn current_tick(&self) -> u32 {
        self.tick
    }

    pub fn race_order(&self) -> &[String] {
        &self.race_order
    }

    pub fn pending_requests(&self) -> usize {
        self.requests.len()
    }

    fn apply(&mut self, request: Request) {
        let connection_id = request.connection_id();
        let result = match request {
            Request::Join {
                connection_id,
                wants_racer,
            } => {
                let racer = self.session.join(connection_id, wants_racer);
                self.outbox.push(Outbound::To(
                    connection_id,
                    Packet::Joined {
                        racer_id: racer.id,
                        role: racer.role,
                    },
                ));
                Ok(())
            }
            Request::SetColor {
                connection_id,
                color,
            } => self.session.request_color(connection_id, color).map(|_| ()),
            Request::SetName {
                connection_id,
                name,
            } => self
                .session
                .set_name(connection_id, &name, NameSource::User)
                .map(|_| ()),
            Request::Ready { connection_id } => self.session.ready(connection_id),
            Request::Finish { connection_id } => self
                .session
                .request_finish(connection_id)
                .map(|transition| self.handle_transition(transition)),
            Request::StartRace { connection_id } => self
                .session
                .authorize_owner(connection_id, "start the race")
                .and_then(|_| self.session.start_race(self.tick))
                .map(|transition| {
                    self.race_time = 0.0;
                    self.handle_transition(transition)
                }),
            Request::StopRace { connection_id } => self
                .session
                .authorize_owner(connection_id, "stop the race")
                .and_then(|_| self.session.stop_race(StopReason::Stopped, None))
                .map(|transition| self.handle_transition(transition)),
            Request::Leave { connection_id } => {
                self.leave(connection_id);
                Ok(())
            }
        };

        if let Err(e) = result {
            self.reject(connection_id, e);
        }
    }

    fn leave(&mut self, connection_id: ConnectionId) {
        let Some((_, forfeit)) = self.session.leave(connection_id) else {
            return;
        };

        let retired = self.replicas.retire_connection(connection_id);
        debug!("Retired {} fields of connection {}", retired, connection_id);
        self.outbox
            .push(Outbound::Broadcast(Packet::ParticipantLeft { connection_id }));

        if let Some(transition) = forfeit {
            self.handle_transition(transition);
        }
    }

    fn reject(&mut self, connection_id: ConnectionId, error: RequestError) {
        warn!("Rejected request from connection {}: {}", connection_id, error);
        self.outbox.push(Outbound::To(
            connection_id,
            Packet::Rejected {
                reason: error.to_string(),
            },
        ));
    }

    fn handle_transition(&mut self, transition: Transition) {
        for (connection_id, position) in transition.teleports {
            self.outbox.push(Outbound::To(
                connection_id,
                Packet::Teleport {
                    x: position.x,
                    y: position.y,
                },
            ));
        }
        if let Some(outcome) = transition.outcome {
            info!(
                "Race over after {:.1}s: {:?}, winner {}",
                self.race_time,
                outcome.reason,
                outcome.winner_name.as_deref().unwrap_or("none")
            );
        }
    }

    fn track_progress(&mut self) {
        let tracker = &self.tracker;
        for racer in self.session.active_racers_mut() {
            let Some(position) = racer.position else {
                continue;
            };
            match tracker.update(&mut racer.progress, position) {
                ProgressEvent::LapCompleted { lap } => {
                    info!("{} completed lap {}", racer.name, lap)
                }
                ProgressEvent::LapUndone { lap } => {
                    debug!("{} crossed the line backwards, back to lap {}", racer.name, lap)
                }
                _ => {}
            }
        }
    }

    fn rank(&mut self) {
        let racers: Vec<_> = self
            .session
            .participants()
            .filter(|racer| racer.is_active_racer())
            .collect();
        let entries: Vec<RankEntry> = racers
            .iter()
            .map(|racer| RankEntry::new(racer.id, &racer.progress))
            .collect();

        self.race_order = ranking::rank(&entries)
            .into_iter()
            .filter_map(|id| racers.iter().find(|racer| racer.id == id))
            .map(|racer| racer.name.clone())
            .collect();
    }

    fn publish(&mut self) {
        let replicas = &mut self.replicas;

        publish(replicas, FieldKey::ActiveRace, FieldValue::Bool(self.session.is_active()));
        publish(replicas, FieldKey::MaxLaps, FieldValue::Int(self.session.max_laps()));
        publish(replicas, FieldKey::RaceOrder, FieldValue::Names(self.race_order.clone()));
        publish(
            replicas,
            FieldKey::Winner,
            FieldValue::OptionalText(
                self.session
                    .last_outcome()
                    .and_then(|outcome| outcome.winner_name.clone()),
            ),
        );

        for racer in self.session.participants() {
            let key = |attr| FieldKey::participant(racer.connection_id, attr);
            publish(replicas, key(ParticipantAttr::Name), FieldValue::Text(racer.name.clone()));
            publish(replicas, key(ParticipantAttr::Color), FieldValue::Color(racer.color));
            publish(replicas, key(ParticipantAttr::RacerId), FieldValue::Racer(racer.id));
            publish(replicas, key(ParticipantAttr::Role), FieldValue::Role(racer.role));
            publish(
                replicas,
                key(ParticipantAttr::Lap),
                FieldValue::Int(racer.progress.display_lap()),
            );
            publish(
                replicas,
                key(ParticipantAttr::Checkpoint),
                FieldValue::Int(racer.progress.checkpoint_index as i32),
            );
            publish(
                replicas,
                key(ParticipantAttr::WrongWay),
                FieldValue::Bool(racer.progress.wrong_way),
            );
        }
    }

    fn broadcast_changes(&mut self) {
        let deltas = self.replicas.drain_deltas();
        let resync = self.resync_interval > 0
            && self.tick > 0
            && self.tick % self.resync_interval == 0
            && !self.session.is_empty();

        let deltas = if resync {
            debug!("Tick {}: full resync of {} fields", self.tick, self.replicas.len());
            self.replicas.snapshot()
        } else {
            deltas
        };

        if !deltas.is_empty() {
            self.outbox.push(Outbound::Broadcast(Packet::Replicate {
                tick: self.tick,
                snapshot: resync,
                deltas,
            }));
        }
    }
}

fn publish(replicas: &mut ReplicaHost, key: FieldKey, value: FieldValue) {
    if let Err(e) = replicas.set(key, value) {
        error!("Failed to publish {:?}: {}", key, e);
    }
}
