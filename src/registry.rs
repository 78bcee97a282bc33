//! Local replica state: marker id -> marker.
//!
//! No validation happens here. The sync engine keeps keys equal to record ids.

use ahash::AHashMap;
use std::collections::HashMap;

use crate::marker::Marker;

/// Full registry contents as served by the bootstrap endpoint
pub type Snapshot = HashMap<String, Marker>;

#[derive(Debug, Clone, Default)]
pub struct MarkerRegistry {
    markers: AHashMap<String, Marker>,
}

impl MarkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Marker> {
        self.markers.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Marker> {
        self.markers.get_mut(id)
    }

    /// Insert or overwrite the whole record (last writer wins, no field merge)
    pub fn set(&mut self, id: impl Into<String>, marker: Marker) -> Option<Marker> {
        let id = id.into();
        debug_assert_eq!(id, marker.id, "registry key must equal marker id");
        self.markers.insert(id, marker)
    }

    /// Deleting an id that is not present is a no-op
    pub fn delete(&mut self, id: &str) -> Option<Marker> {
        self.markers.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.markers.contains_key(id)
    }

    /// Restartable: every call yields the current pairs from the start
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Marker)> + '_ {
        self.markers.iter().map(|(id, m)| (id.as_str(), m))
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Drop everything and take the snapshot's contents
    pub fn replace_all(&mut self, snapshot: Snapshot) {
        self.markers.clear();
        self.markers.extend(snapshot);
    }

    /// Copy of the contents, shaped like the bootstrap payload
    pub fn snapshot(&self) -> Snapshot {
        self.markers
            .iter()
            .map(|(id, m)| (id.clone(), m.clone()))
            .collect()
    }
}
