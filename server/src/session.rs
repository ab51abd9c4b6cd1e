//! Participants, racer slots and race lifecycle
//!
//! The session manager is the single owner of the participant registry, the
//! racer slot table and the color pool. All of its methods take `&mut self`,
//! so the game loop applies requests one at a time and pool updates are never
//! observed half done.

use crate::color_pool::ColorPool;
use log::{info, warn};
use race_shared::progress::RacerProgress;
use race_shared::{
    ranking, CircuitPath, ColorId, ConnectionId, ConnectionState, RaceStage, Racer, RacerId,
    RequestError, Role, Vector2, MIN_NAME_LENGTH,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Where a name change came from. User names are shown upper-cased, names
/// picked by the server are kept verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameSource {
    User,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Stopped by the session owner.
    Stopped,
    /// A racer completed the final lap and asked to finish.
    Finished,
    /// Too few racers remained.
    Forfeit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RaceOutcome {
    pub reason: StopReason,
    pub winner: Option<ConnectionId>,
    pub winner_name: Option<String>,
}

/// A race that is currently running.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceSession {
    pub max_laps: i32,
    pub started_at: u32,
}

/// Result of a start/stop transition: who must be moved where.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub teleports: Vec<(ConnectionId, Vector2)>,
    pub outcome: Option<RaceOutcome>,
}

pub struct SessionManager {
    circuit: Arc<CircuitPath>,
    max_laps: i32,
    slots: Vec<Option<ConnectionId>>,
    colors: ColorPool,
    participants: BTreeMap<ConnectionId, Racer>,
    session: Option<RaceSession>,
    last_outcome: Option<RaceOutcome>,
}

impl SessionManager {
    pub fn new(
        circuit: Arc<CircuitPath>,
        max_racers: usize,
        max_laps: i32,
        color_seed: Option<u64>,
    ) -> Self {
        Self {
            circuit,
            max_laps,
            slots: vec![None; max_racers],
            colors: ColorPool::new(color_seed),
            participants: BTreeMap::new(),
            session: None,
            last_outcome: None,
        }
    }

    /// Registers a connection as racer or spectator.
    ///
    /// A racer slot is granted only while one is free and no race runs;
    /// otherwise the participant joins as spectator. Joining twice returns
    /// the existing participant unchanged.
    pub fn join(&mut self, connection_id: ConnectionId, wants_racer: bool) -> Racer {
        if let Some(existing) = self.participants.get(&connection_id) {
            return existing.clone();
        }

        let slot = if wants_racer && self.session.is_none() {
            self.slots.iter().position(Option::is_none)
        } else {
            None
        };

        let name = format!("Guest{}", connection_id);
        let mut racer = match slot {
            Some(slot) => {
                self.slots[slot] = Some(connection_id);
                Racer::new(connection_id, slot as RacerId, Role::Racer, name)
            }
            None => {
                if wants_racer {
                    warn!(
                        "Racer slot denied for connection {}, joining as spectator",
                        connection_id
                    );
                }
                Racer::spectator(connection_id, name)
            }
        };
        racer.color = self.colors.assign_random(connection_id);

        info!(
            "Connection {} joined as {:?} (id {}, color {:?})",
            connection_id, racer.role, racer.id, racer.color
        );
        self.participants.insert(connection_id, racer.clone());
        racer
    }

    /// Removes a participant, returning its color and slot to the pools.
    ///
    /// If this drops an active race below two racers the race is stopped and
    /// the transition is returned alongside the removed participant.
    pub fn leave(&mut self, connection_id: ConnectionId) -> Option<(Racer, Option<Transition>)> {
        let racer = self.participants.remove(&connection_id)?;

        self.colors.release_holder(connection_id);
        if let Some(slot) = self.slots.iter_mut().find(|s| **s == Some(connection_id)) {
            *slot = None;
        }
        info!("Connection {} left ({})", connection_id, racer.name);

        let forfeit = self.enforce_minimum_racers();
        Some((racer, forfeit))
    }

    /// Excludes a participant from projection and ranking until it is removed.
    pub fn mark_disconnecting(&mut self, connection_id: ConnectionId) {
        if let Some(racer) = self.participants.get_mut(&connection_id) {
            racer.connection_state = ConnectionState::Disconnecting;
        }
    }

    pub fn request_color(
        &mut self,
        connection_id: ConnectionId,
        desired: i32,
    ) -> Result<ColorId, RequestError> {
        let racer = self
            .participants
            .get_mut(&connection_id)
            .ok_or(RequestError::UnknownParticipant(connection_id))?;

        let color = self.colors.claim(connection_id, desired)?;
        racer.color = Some(color);
        Ok(color)
    }

    pub fn set_name(
        &mut self,
        connection_id: ConnectionId,
        name: &str,
        source: NameSource,
    ) -> Result<String, RequestError> {
        let racer = self
            .participants
            .get_mut(&connection_id)
            .ok_or(RequestError::UnknownParticipant(connection_id))?;

        if name.chars().count() < MIN_NAME_LENGTH {
            return Err(RequestError::invalid(format!(
                "name must be at least {} characters",
                MIN_NAME_LENGTH
            )));
        }

        racer.name = match source {
            NameSource::User => name.to_uppercase(),
            NameSource::System => name.to_string(),
        };
        Ok(racer.name.clone())
    }

    /// Authorizes the participant's vehicle to move.
    pub fn ready(&mut self, connection_id: ConnectionId) -> Result<(), RequestError> {
        let racer = self
            .participants
            .get_mut(&connection_id)
            .ok_or(RequestError::UnknownParticipant(connection_id))?;
        racer.movement_authorized = true;
        Ok(())
    }

    pub fn record_position(
        &mut self,
        connection_id: ConnectionId,
        sequence: u32,
        position: Vector2,
    ) -> bool {
        self.participants
            .get_mut(&connection_id)
            .map(|racer| racer.record_position(sequence, position))
            .unwrap_or(false)
    }

    /// The participant with the lowest connection id owns the session.
    ///
    /// Ids are handed out in increasing order when a client connects, so this
    /// is the longest-connected participant, whatever order they joined in.
    pub fn owner(&self) -> Option<ConnectionId> {
        self.participants.keys().next().copied()
    }

    pub fn authorize_owner(
        &self,
        connection_id: ConnectionId,
        action: &str,
    ) -> Result<(), RequestError> {
        if self.owner() == Some(connection_id) {
            Ok(())
        } else {
            Err(RequestError::NotPermitted(action.to_string()))
        }
    }

    /// Starts a race with every registered racer on the starting grid.
    pub fn start_race(&mut self, tick: u32) -> Result<Transition, RequestError> {
        if self.session.is_some() {
            return Err(RequestError::session_state("a race is already active"));
        }
        let racers = self.active_racer_count();
        if racers < ranking::MIN_RACERS {
            return Err(RequestError::session_state(format!(
                "at least {} racers are needed, {} registered",
                ranking::MIN_RACERS,
                racers
            )));
        }

        let grid_size = self.slots.len();
        let mut teleports = Vec::new();
        for racer in self.participants.values_mut().filter(|r| r.is_racer()) {
            racer.progress.reset();
            let position = self.circuit.grid_position(racer.id as usize, grid_size);
            racer.teleport(position);
            teleports.push((racer.connection_id, position));
        }

        self.session = Some(RaceSession {
            max_laps: self.max_laps,
            started_at: tick,
        });
        self.last_outcome = None;
        info!("Race started at tick {} with {} racers", tick, racers);

        Ok(Transition {
            teleports,
            outcome: None,
        })
    }

    /// Ends the running race and sends every racer back to the lobby.
    pub fn stop_race(
        &mut self,
        reason: StopReason,
        winner: Option<ConnectionId>,
    ) -> Result<Transition, RequestError> {
        if self.session.take().is_none() {
            return Err(RequestError::session_state("no race is active"));
        }

        let lobby = self.circuit.lobby_position();
        let mut teleports = Vec::new();
        for racer in self.participants.values_mut().filter(|r| r.is_racer()) {
            racer.progress = RacerProgress::default();
            racer.teleport(lobby);
            teleports.push((racer.connection_id, lobby));
        }

        let outcome = RaceOutcome {
            reason,
            winner,
            winner_name: winner
                .and_then(|id| self.participants.get(&id))
                .map(|racer| racer.name.clone()),
        };
        info!(
            "Race stopped ({:?}), winner: {}",
            reason,
            outcome.winner_name.as_deref().unwrap_or("none")
        );
        self.last_outcome = Some(outcome.clone());

        Ok(Transition {
            teleports,
            outcome: Some(outcome),
        })
    }

    /// Ends the race on behalf of a racer that completed the final lap.
    pub fn request_finish(&mut self, connection_id: ConnectionId) -> Result<Transition, RequestError> {
        let racer = self
            .participants
            .get(&connection_id)
            .ok_or(RequestError::UnknownParticipant(connection_id))?;
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| RequestError::session_state("no race is active"))?;

        if !racer.is_racer() || racer.progress.stage(session.max_laps) != RaceStage::Finished {
            return Err(RequestError::session_state(format!(
                "{} has not completed {} laps",
                racer.name, session.max_laps
            )));
        }

        self.stop_race(StopReason::Finished, Some(connection_id))
    }

    /// Stops an active race that has fewer than two racers left; the
    /// remaining racer, if any, wins by default.
    pub fn enforce_minimum_racers(&mut self) -> Option<Transition> {
        self.session.as_ref()?;

        let remaining: Vec<ConnectionId> = self
            .participants
            .values()
            .filter(|r| r.is_active_racer())
            .map(|r| r.connection_id)
            .collect();

        let winner = ranking::forfeit_winner(&remaining)?;
        self.stop_race(StopReason::Forfeit, winner).ok()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&RaceSession> {
        self.session.as_ref()
    }

    pub fn last_outcome(&self) -> Option<&RaceOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn max_laps(&self) -> i32 {
        self.max_laps
    }

    pub fn circuit(&self) -> &Arc<CircuitPath> {
        &self.circuit
    }

    pub fn participant(&self, connection_id: ConnectionId) -> Option<&Racer> {
        self.participants.get(&connection_id)
    }

    pub fn participants(&self) -> impl Iterator<Item = &Racer> {
        self.participants.values()
    }

    /// Connected racers, for the projection pass.
    pub fn active_racers_mut(&mut self) -> impl Iterator<Item = &mut Racer> {
        self.participants
            .values_mut()
            .filter(|racer| racer.is_active_racer())
    }

    pub fn active_racer_count(&self) -> usize {
        self.participants
            .values()
            .filter(|r| r.is_active_racer())
            .count()
    }

    pub fn free_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }

    pub fn free_colors(&self) -> usize {
        self.colors.free_count()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
