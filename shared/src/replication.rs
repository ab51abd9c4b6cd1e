//! Versioned replicated values with change observers
//!
//! The server owns every [`ReplicatedField`] with [`Authority::Server`] and is
//! the only side allowed to call [`ReplicatedField::set_authoritative`]. Clients
//! keep [`Authority::Mirror`] copies that only move forward through
//! [`ReplicatedField::deliver_remote`], which drops deliveries whose version
//! is not newer than the mirror's. Both paths notify observers exactly once
//! per accepted change, after the value has been stored.

use crate::{ColorId, ConnectionId, RacerId, Role};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Callback invoked with `(old, new)` after an accepted change.
pub type Observer<T> = Box<dyn FnMut(&T, &T) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    Server,
    Mirror,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplicationError {
    #[error("mirrored field cannot be set authoritatively")]
    NotAuthoritative,
    #[error("authoritative field does not accept remote deliveries")]
    NotMirror,
}

/// Outcome of a remote delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Applied,
    /// Version was not newer than the mirror's; nothing changed.
    Stale,
}

pub struct ReplicatedField<T> {
    value: T,
    version: u64,
    authority: Authority,
    observers: Vec<Observer<T>>,
}

impl<T: std::fmt::Debug> std::fmt::Debug for ReplicatedField<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicatedField")
            .field("value", &self.value)
            .field("version", &self.version)
            .field("authority", &self.authority)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl<T: Clone + PartialEq> ReplicatedField<T> {
    /// Server-owned field starting at version 0.
    pub fn server(value: T) -> Self {
        Self::with_version(value, 0, Authority::Server)
    }

    /// Client mirror that has not received anything yet.
    pub fn mirror(value: T) -> Self {
        Self::with_version(value, 0, Authority::Mirror)
    }

    pub fn with_version(value: T, version: u64, authority: Authority) -> Self {
        Self {
            value,
            version,
            authority,
            observers: Vec::new(),
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn authority(&self) -> Authority {
        self.authority
    }

    pub fn observe(&mut self, observer: impl FnMut(&T, &T) + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Stores `value` as the new authoritative value.
    ///
    /// Returns the new version, or `None` when `value` equals the current
    /// value (not a change: no version bump and no notification).
    pub fn set_authoritative(&mut self, value: T) -> Result<Option<u64>, ReplicationError> {
        if self.authority != Authority::Server {
            return Err(ReplicationError::NotAuthoritative);
        }
        if self.value == value {
            return Ok(None);
        }

        self.version += 1;
        self.replace(value);
        Ok(Some(self.version))
    }

    /// Applies a value delivered from the server if `version` is newer.
    pub fn deliver_remote(&mut self, value: T, version: u64) -> Result<Delivery, ReplicationError> {
        if self.authority != Authority::Mirror {
            return Err(ReplicationError::NotMirror);
        }
        if version <= self.version {
            return Ok(Delivery::Stale);
        }

        self.version = version;
        self.replace(value);
        Ok(Delivery::Applied)
    }

    fn replace(&mut self, value: T) {
        let old = std::mem::replace(&mut self.value, value);
        for observer in &mut self.observers {
            observer(&old, &self.value);
        }
    }
}

/// Per-participant replicated attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParticipantAttr {
    Name,
    Color,
    RacerId,
    Role,
    Lap,
    Checkpoint,
    WrongWay,
}

/// Identifies one replicated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldKey {
    ActiveRace,
    MaxLaps,
    RaceOrder,
    Winner,
    Participant {
        connection_id: ConnectionId,
        attr: ParticipantAttr,
    },
}

impl FieldKey {
    pub fn participant(connection_id: ConnectionId, attr: ParticipantAttr) -> Self {
        FieldKey::Participant {
            connection_id,
            attr,
        }
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        match self {
            FieldKey::Participant { connection_id, .. } => Some(*connection_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Bool(bool),
    Int(i32),
    Text(String),
    OptionalText(Option<String>),
    Color(Option<ColorId>),
    Racer(RacerId),
    Role(Role),
    Names(Vec<String>),
}

/// One versioned change as it travels over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDelta {
    pub key: FieldKey,
    pub version: u64,
    pub value: FieldValue,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<(T, T)>>>, impl FnMut(&T, &T) + Send) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        (calls, move |old: &T, new: &T| {
            sink.lock().unwrap().push((old.clone(), new.clone()))
        })
    }

    #[test]
    fn test_set_authoritative_bumps_version_and_notifies_once() {
        let mut field = ReplicatedField::server(0);
        let (calls, observer) = recorder::<i32>();
        field.observe(observer);

        assert_eq!(field.set_authoritative(2), Ok(Some(1)));
        assert_eq!(field.set_authoritative(3), Ok(Some(2)));

        assert_eq!(*field.value(), 3);
        assert_eq!(field.version(), 2);
        assert_eq!(*calls.lock().unwrap(), vec![(0, 2), (2, 3)]);
    }

    #[test]
    fn test_setting_equal_value_is_not_a_change() {
        let mut field = ReplicatedField::server(true);
        let (calls, observer) = recorder::<bool>();
        field.observe(observer);

        assert_eq!(field.set_authoritative(true), Ok(None));
        assert_eq!(field.version(), 0);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_observer_sees_stored_value() {
        let mut replicated = ReplicatedField::server(String::from("GUEST1"));
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        replicated.observe(move |_, new: &String| *sink.lock().unwrap() = Some(new.clone()));

        replicated.set_authoritative("ALICE".to_string()).unwrap();
        assert_eq!(seen.lock().unwrap().as_deref(), Some("ALICE"));
        assert_eq!(replicated.value(), "ALICE");
    }

    #[test]
    fn test_mirror_rejects_stale_and_duplicate() {
        let mut mirror = ReplicatedField::mirror(0);
        let (calls, observer) = recorder::<i32>();
        mirror.observe(observer);

        assert_eq!(mirror.deliver_remote(5, 3), Ok(Delivery::Applied));
        assert_eq!(mirror.deliver_remote(4, 2), Ok(Delivery::Stale));
        assert_eq!(mirror.deliver_remote(5, 3), Ok(Delivery::Stale));
        assert_eq!(mirror.deliver_remote(6, 4), Ok(Delivery::Applied));

        assert_eq!(*mirror.value(), 6);
        assert_eq!(mirror.version(), 4);
        assert_eq!(*calls.lock().unwrap(), vec![(0, 5), (5, 6)]);
    }

    #[test]
    fn test_authority_is_enforced() {
        let mut server = ReplicatedField::server(1);
        let mut mirror = ReplicatedField::mirror(1);

        assert_eq!(server.deliver_remote(2, 1), Err(ReplicationError::NotMirror));
        assert_eq!(mirror.set_authoritative(2), Err(ReplicationError::NotAuthoritative));
        assert_eq!(*server.value(), 1);
        assert_eq!(*mirror.value(), 1);
    }

    #[test]
    fn test_mirror_converges_to_server() {
        let mut server = ReplicatedField::server(FieldValue::Int(-1));
        let mut mirror = ReplicatedField::mirror(FieldValue::Int(-1));
        let mut deliveries = Vec::new();

        for lap in 0..4 {
            let version = server.set_authoritative(FieldValue::Int(lap)).unwrap().unwrap();
            deliveries.push((FieldValue::Int(lap), version));
        }

        // Reordered delivery: only newer versions land
        deliveries.swap(0, 3);
        for (value, version) in deliveries {
            mirror.deliver_remote(value, version).unwrap();
        }

        assert_eq!(mirror.version(), server.version());
        assert_eq!(mirror.value(), server.value());
    }

    #[test]
    fn test_field_key_connection() {
        let key = FieldKey::participant(7, ParticipantAttr::Lap);
        assert_eq!(key.connection_id(), Some(7));
        assert_eq!(FieldKey::RaceOrder.connection_id(), None);
    }
}
