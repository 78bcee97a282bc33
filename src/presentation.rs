//! Boundary to whatever draws the map.
//!
//! The sync engine pushes effects into a [`PresentationAdapter`] and never
//! reads anything back. User gestures travel the other way as [`Gesture`]
//! values sent to the replica loop.

use tokio::sync::mpsc;

use crate::error::BootstrapError;
use crate::marker::Marker;
use crate::sync::remote::ConnectionStatus;

pub trait PresentationAdapter {
    /// Draw a marker, replacing any handle already drawn for its id
    fn render(&mut self, marker: &Marker);

    /// Remove the handle for `id`; unknown ids are ignored
    fn remove_visual(&mut self, id: &str);

    /// Move the handle for `id`; unknown ids are ignored
    fn update_position(&mut self, id: &str, lat: f64, lng: f64);

    fn load_failed(&mut self, _error: &BootstrapError) {}

    fn connectivity_changed(&mut self, _status: ConnectionStatus) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragPhase {
    /// Pointer moved while the marker is held
    Frame,
    /// Marker released
    End,
}

/// User intent forwarded from the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum Gesture {
    Create,
    Delete { id: String },
    Drag { id: String, lat: f64, lng: f64, phase: DragPhase },
}

/// One call made on an adapter, as data
#[derive(Debug, Clone, PartialEq)]
pub enum VisualEffect {
    Render(Marker),
    Remove(String),
    Move { id: String, lat: f64, lng: f64 },
    LoadFailed(String),
    Connectivity(ConnectionStatus),
}

impl From<&BootstrapError> for VisualEffect {
    fn from(err: &BootstrapError) -> Self {
        VisualEffect::LoadFailed(err.to_string())
    }
}

/// Records every effect in order
impl PresentationAdapter for Vec<VisualEffect> {
    fn render(&mut self, marker: &Marker) {
        self.push(VisualEffect::Render(marker.clone()));
    }

    fn remove_visual(&mut self, id: &str) {
        self.push(VisualEffect::Remove(id.to_string()));
    }

    fn update_position(&mut self, id: &str, lat: f64, lng: f64) {
        self.push(VisualEffect::Move {
            id: id.to_string(),
            lat,
            lng,
        });
    }

    fn load_failed(&mut self, error: &BootstrapError) {
        self.push(error.into());
    }

    fn connectivity_changed(&mut self, status: ConnectionStatus) {
        self.push(VisualEffect::Connectivity(status));
    }
}

/// Streams effects to another task; a closed receiver just drops them
impl PresentationAdapter for mpsc::UnboundedSender<VisualEffect> {
    fn render(&mut self, marker: &Marker) {
        let _ = self.send(VisualEffect::Render(marker.clone()));
    }

    fn remove_visual(&mut self, id: &str) {
        let _ = self.send(VisualEffect::Remove(id.to_string()));
    }

    fn update_position(&mut self, id: &str, lat: f64, lng: f64) {
        let _ = self.send(VisualEffect::Move {
            id: id.to_string(),
            lat,
            lng,
        });
    }

    fn load_failed(&mut self, error: &BootstrapError) {
        let _ = self.send(error.into());
    }

    fn connectivity_changed(&mut self, status: ConnectionStatus) {
        let _ = self.send(VisualEffect::Connectivity(status));
    }
}
