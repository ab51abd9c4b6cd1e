//! Client-side mirror of the replicated race state
//!
//! Every key the server publishes gets a [`ReplicatedField`] with mirror
//! authority the first time it is delivered. Later deliveries go through the
//! version check, so duplicated or reordered datagrams never move a value
//! backwards and never notify twice.
//!
//! Connection ids are never reused, so a departed participant is remembered
//! and any datagram about it that was overtaken by the departure is dropped
//! as stale. Full
//! snapshots list every participant the server still has; anyone missing
//! from the newest one is dropped, which heals a lost `ParticipantLeft`.

use crate::hud::HudEvent;
use log::{debug, warn};
use race_shared::replication::Authority;
use race_shared::{
    ConnectionId, Delivery, FieldDelta, FieldKey, FieldValue, ParticipantAttr, ReplicatedField,
};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::mpsc::UnboundedSender;

pub struct RaceMirror {
    fields: BTreeMap<FieldKey, ReplicatedField<FieldValue>>,
    /// Participants the server has removed.
    departed: BTreeSet<ConnectionId>,
    events: UnboundedSender<HudEvent>,
    last_tick: u32,
}

impl RaceMirror {
    pub fn new(events: UnboundedSender<HudEvent>) -> Self {
        Self {
            fields: BTreeMap::new(),
            departed: BTreeSet::new(),
            events,
            last_tick: 0,
        }
    }

    /// Applies a batch of deltas and returns how many were accepted.
    pub fn apply(&mut self, tick: u32, deltas: Vec<FieldDelta>) -> usize {
        self.last_tick = self.last_tick.max(tick);
        let mut applied = 0;
        for delta in deltas {
            if self.deliver(delta) {
                applied += 1;
            }
        }
        applied
    }

    /// Applies a full snapshot. If it is newer than anything seen so far,
    /// participants it does not mention are removed.
    pub fn apply_snapshot(&mut self, tick: u32, deltas: Vec<FieldDelta>) -> usize {
        let newest = tick > self.last_tick;
        let present: BTreeSet<ConnectionId> = deltas
            .iter()
            .filter_map(|delta| delta.key.connection_id())
            .collect();

        let applied = self.apply(tick, deltas);
        if newest {
            let departed: BTreeSet<ConnectionId> = self
                .fields
                .keys()
                .filter_map(FieldKey::connection_id)
                .filter(|connection_id| !present.contains(connection_id))
                .collect();
            for connection_id in departed {
                let dropped = self.remove_participant(connection_id);
                debug!(
                    "Snapshot {} no longer lists participant {} ({} fields dropped)",
                    tick, connection_id, dropped
                );
            }
        }
        applied
    }

    fn deliver(&mut self, delta: FieldDelta) -> bool {
        let FieldDelta {
            key,
            version,
            value,
        } = delta;

        if let Some(connection_id) = key.connection_id() {
            if self.departed.contains(&connection_id) {
                debug!("Stale {:?} v{} (participant {} left)", key, version, connection_id);
                return false;
            }
        }

        match self.fields.get_mut(&key) {
            Some(field) => match field.deliver_remote(value, version) {
                Ok(Delivery::Applied) => true,
                Ok(Delivery::Stale) => {
                    debug!("Stale {:?} v{} (have v{})", key, version, field.version());
                    false
                }
                Err(e) => {
                    warn!("Delivery to {:?} failed: {}", key, e);
                    false
                }
            },
            None => {
                // First sighting counts as the one notification for this change
                self.notify(&key, &value);

                let mut field = ReplicatedField::with_version(value, version, Authority::Mirror);
                let events = self.events.clone();
                field.observe(move |_old, new| {
                    if let Some(event) = HudEvent::from_field(&key, new) {
                        let _ = events.send(event);
                    }
                });
                self.fields.insert(key, field);
                true
            }
        }
    }

    fn notify(&self, key: &FieldKey, value: &FieldValue) {
        if let Some(event) = HudEvent::from_field(key, value) {
            let _ = self.events.send(event);
        }
    }

    /// Forgets a departed participant and ignores anything still in flight
    /// about it.
    pub fn remove_participant(&mut self, connection_id: ConnectionId) -> usize {
        self.departed.insert(connection_id);
        let before = self.fields.len();
        self.fields
            .retain(|key, _| key.connection_id() != Some(connection_id));
        before - self.fields.len()
    }

    pub fn value(&self, key: &FieldKey) -> Option<&FieldValue> {
        self.fields.get(key).map(ReplicatedField::value)
    }

    pub fn version(&self, key: &FieldKey) -> Option<u64> {
        self.fields.get(key).map(ReplicatedField::version)
    }

    pub fn race_active(&self) -> bool {
        matches!(self.value(&FieldKey::ActiveRace), Some(FieldValue::Bool(true)))
    }

    pub fn max_laps(&self) -> Option<i32> {
        match self.value(&FieldKey::MaxLaps) {
            Some(FieldValue::Int(laps)) => Some(*laps),
            _ => None,
        }
    }

    pub fn lap_of(&self, connection_id: ConnectionId) -> Option<i32> {
        match self.value(&FieldKey::participant(connection_id, ParticipantAttr::Lap)) {
            Some(FieldValue::Int(lap)) => Some(*lap),
            _ => None,
        }
    }

    pub fn name_of(&self, connection_id: ConnectionId) -> Option<&str> {
        match self.value(&FieldKey::participant(connection_id, ParticipantAttr::Name)) {
            Some(FieldValue::Text(name)) => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn race_order(&self) -> &[String] {
        match self.value(&FieldKey::RaceOrder) {
            Some(FieldValue::Names(names)) => names.as_slice(),
            _ => &[],
        }
    }

    pub fn winner(&self) -> Option<&str> {
        match self.value(&FieldKey::Winner) {
            Some(FieldValue::OptionalText(winner)) => winner.as_deref(),
            _ => None,
        }
    }

    /// True once the participant has driven the required number of laps.
    pub fn has_finished(&self, connection_id: ConnectionId) -> bool {
        match (self.lap_of(connection_id), self.max_laps()) {
            (Some(lap), Some(max_laps)) => self.race_active() && lap >= max_laps,
            _ => false,
        }
    }

    pub fn last_tick(&self) -> u32 {
        self.last_tick
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
