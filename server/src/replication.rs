//! Authoritative side of field replication
//!
//! The host keeps one server-owned [`ReplicatedField`] per [`FieldKey`] and
//! remembers which keys changed since the last broadcast. A key that is
//! retired keeps its last version as a floor, so a re-created key always
//! starts above anything a mirror may still hold.

use log::trace;
use race_shared::replication::Authority;
use race_shared::{ConnectionId, FieldDelta, FieldKey, FieldValue, ReplicatedField, ReplicationError};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Default)]
pub struct ReplicaHost {
    fields: BTreeMap<FieldKey, ReplicatedField<FieldValue>>,
    dirty: BTreeSet<FieldKey>,
    floors: HashMap<FieldKey, u64>,
}

impl ReplicaHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `value` under `key`. Returns whether anything changed.
    pub fn set(&mut self, key: FieldKey, value: FieldValue) -> Result<bool, ReplicationError> {
        match self.fields.get_mut(&key) {
            Some(field) => {
                let changed = field.set_authoritative(value)?.is_some();
                if changed {
                    trace!("{:?} -> v{}", key, field.version());
                    self.dirty.insert(key);
                }
                Ok(changed)
            }
            None => {
                let version = self.floors.remove(&key).unwrap_or(0) + 1;
                self.fields
                    .insert(key, ReplicatedField::with_version(value, version, Authority::Server));
                self.dirty.insert(key);
                Ok(true)
            }
        }
    }

    pub fn get(&self, key: &FieldKey) -> Option<&FieldValue> {
        self.fields.get(key).map(ReplicatedField::value)
    }

    pub fn version(&self, key: &FieldKey) -> Option<u64> {
        self.fields.get(key).map(ReplicatedField::version)
    }

    /// Drops every per-participant field of `connection_id`.
    pub fn retire_connection(&mut self, connection_id: ConnectionId) -> usize {
        let keys: Vec<FieldKey> = self
            .fields
            .keys()
            .filter(|key| key.connection_id() == Some(connection_id))
            .copied()
            .collect();

        for key in &keys {
            if let Some(field) = self.fields.remove(key) {
                self.floors.insert(*key, field.version());
            }
            self.dirty.remove(key);
        }
        keys.len()
    }

    /// Changes since the previous call, in key order.
    pub fn drain_deltas(&mut self) -> Vec<FieldDelta> {
        let dirty = std::mem::take(&mut self.dirty);
        dirty
            .into_iter()
            .filter_map(|key| self.delta(&key))
            .collect()
    }

    /// Every field at its current version, for new or resyncing mirrors.
    pub fn snapshot(&self) -> Vec<FieldDelta> {
        self.fields
            .keys()
            .filter_map(|key| self.delta(key))
            .collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn delta(&self, key: &FieldKey) -> Option<FieldDelta> {
        self.fields.get(key).map(|field| FieldDelta {
            key: *key,
            version: field.version(),
            value: field.value().clone(),
        })
    }
}
