//! Replicated state machine for one client.
//!
//! Per marker id: `absent -> present` on create (local or remote),
//! `present -> absent` on delete, `present -> present` on move. Local
//! mutations are applied and rendered first, then broadcast; there is no
//! pending state and nothing waits for the server.

use serde::{Deserialize, Serialize};

use crate::error::ChannelError;
use crate::marker::{IdStrategy, Marker};
use crate::presentation::{DragPhase, Gesture, PresentationAdapter};
use crate::registry::{MarkerRegistry, Snapshot};

use super::protocol::{InboundEvent, OutboundEvent};

/// Outbound half of the channel as the engine sees it
pub trait ChannelSink {
    fn emit(&mut self, event: OutboundEvent) -> Result<(), ChannelError>;
}

/// Collects emitted events in order
impl ChannelSink for Vec<OutboundEvent> {
    fn emit(&mut self, event: OutboundEvent) -> Result<(), ChannelError> {
        self.push(event);
        Ok(())
    }
}

/// When drags turn into move-requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MoveEmission {
    /// Every drag frame and the release, unthrottled. Fast drags flood the
    /// channel. The release emits too, so a drag of N frames sends N + 1
    /// move-requests, the last one repeating the final frame's position.
    #[default]
    EveryFrame,

    /// Only the release
    GestureEnd,
}

impl std::str::FromStr for MoveEmission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "every-frame" | "frame" => Ok(MoveEmission::EveryFrame),
            "gesture-end" | "end" => Ok(MoveEmission::GestureEnd),
            other => Err(format!(
                "unknown move emission `{other}` (expected every-frame|gesture-end)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncPolicy {
    pub ids: IdStrategy,
    pub moves: MoveEmission,

    /// Write move positions into the registry as well as the visual handle.
    /// Off by default: the registry keeps the last created/loaded position.
    pub move_writeback: bool,
}

pub struct SyncEngine<A, C> {
    registry: MarkerRegistry,
    adapter: A,
    channel: C,
    policy: SyncPolicy,
}

impl<A: PresentationAdapter, C: ChannelSink> SyncEngine<A, C> {
    pub fn new(adapter: A, channel: C, policy: SyncPolicy) -> Self {
        Self {
            registry: MarkerRegistry::new(),
            adapter,
            channel,
            policy,
        }
    }

    pub fn registry(&self) -> &MarkerRegistry {
        &self.registry
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    pub fn into_parts(self) -> (MarkerRegistry, A, C) {
        (self.registry, self.adapter, self.channel)
    }

    /// Replace the registry with a bootstrap snapshot and render all of it
    pub fn load_snapshot(&mut self, snapshot: Snapshot) {
        self.registry.replace_all(snapshot);
        for (_, marker) in self.registry.entries() {
            self.adapter.render(marker);
        }
        tracing::info!(markers = self.registry.len(), "snapshot loaded");
    }

    /// Apply an event relayed from another replica
    pub fn apply(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::Create(marker) => {
                tracing::debug!(id = %marker.id, "remote create");
                self.adapter.render(&marker);
                self.registry.set(marker.id.clone(), marker);
            }
            InboundEvent::Delete(id) => {
                let existed = self.registry.delete(&id).is_some();
                tracing::debug!(%id, existed, "remote delete");
                self.adapter.remove_visual(&id);
            }
            InboundEvent::Move(marker) => {
                tracing::trace!(id = %marker.id, lat = marker.lat, lng = marker.lng, "remote move");
                self.adapter
                    .update_position(&marker.id, marker.lat, marker.lng);
                if self.policy.move_writeback {
                    self.write_position(&marker.id, marker.lat, marker.lng);
                }
            }
        }
    }

    /// Route a user gesture to the matching local mutation
    pub fn handle_gesture(&mut self, gesture: Gesture) -> Result<(), ChannelError> {
        match gesture {
            Gesture::Create => self.create_marker().map(|_| ()),
            Gesture::Delete { id } => self.delete_marker(&id),
            Gesture::Drag { id, lat, lng, phase } => self.drag_marker(&id, lat, lng, phase),
        }
    }

    /// Optimistic create: registry and render first, then the request
    pub fn create_marker(&mut self) -> Result<Marker, ChannelError> {
        let marker = Marker::spawn(self.policy.ids);
        if self.registry.contains(&marker.id) {
            tracing::warn!(id = %marker.id, "generated id already present, overwriting");
        }

        self.registry.set(marker.id.clone(), marker.clone());
        self.adapter.render(&marker);
        tracing::info!(id = %marker.id, color = %marker.color, "marker created");

        self.channel
            .emit(OutboundEvent::CreateRequest(marker.clone()))?;
        Ok(marker)
    }

    /// Optimistic delete: handle and registry entry go, then the request
    pub fn delete_marker(&mut self, id: &str) -> Result<(), ChannelError> {
        self.adapter.remove_visual(id);
        if self.registry.delete(id).is_none() {
            tracing::debug!(%id, "deleting marker not in registry");
        }
        tracing::info!(%id, "marker deleted");

        self.channel.emit(OutboundEvent::DeleteRequest(id.to_string()))
    }

    pub fn drag_marker(
        &mut self,
        id: &str,
        lat: f64,
        lng: f64,
        phase: DragPhase,
    ) -> Result<(), ChannelError> {
        let Some(current) = self.registry.get(id) else {
            tracing::warn!(%id, "drag on marker not in registry, ignoring");
            return Ok(());
        };
        let moved = current.clone().with_position(lat, lng);

        self.adapter.update_position(id, lat, lng);
        if self.policy.move_writeback {
            self.write_position(id, lat, lng);
        }

        let emit = match (self.policy.moves, phase) {
            (MoveEmission::EveryFrame, _) => true,
            (MoveEmission::GestureEnd, DragPhase::End) => true,
            (MoveEmission::GestureEnd, DragPhase::Frame) => false,
        };
        if emit {
            tracing::trace!(%id, lat, lng, ?phase, "move request");
            self.channel.emit(OutboundEvent::MoveRequest(moved))?;
        }
        Ok(())
    }

    fn write_position(&mut self, id: &str, lat: f64, lng: f64) {
        if let Some(entry) = self.registry.get_mut(id) {
            entry.lat = lat;
            entry.lng = lng;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presentation::VisualEffect;

    type TestEngine = SyncEngine<Vec<VisualEffect>, Vec<OutboundEvent>>;

    fn engine(policy: SyncPolicy) -> TestEngine {
        SyncEngine::new(Vec::new(), Vec::new(), policy)
    }

    #[test]
    fn test_create_renders_before_emit() {
        let mut e = engine(SyncPolicy::default());
        let m = e.create_marker().unwrap();

        assert_eq!(e.registry().get(&m.id), Some(&m));
        assert_eq!(e.adapter(), &vec![VisualEffect::Render(m.clone())]);
        assert_eq!(e.channel(), &vec![OutboundEvent::CreateRequest(m)]);
    }

    #[test]
    fn test_drag_unknown_id_is_ignored() {
        let mut e = engine(SyncPolicy::default());
        e.drag_marker("ghost", 1.0, 1.0, DragPhase::End).unwrap();
        assert!(e.adapter().is_empty());
        assert!(e.channel().is_empty());
        assert!(e.registry().is_empty());
    }

    #[test]
    fn test_every_frame_emits_each_frame() {
        let mut e = engine(SyncPolicy::default());
        let m = e.create_marker().unwrap();

        e.drag_marker(&m.id, 1.0, 1.0, DragPhase::Frame).unwrap();
        e.drag_marker(&m.id, 2.0, 2.0, DragPhase::Frame).unwrap();
        e.drag_marker(&m.id, 3.0, 3.0, DragPhase::End).unwrap();

        let moves: Vec<_> = e
            .channel()
            .iter()
            .filter(|ev| matches!(ev, OutboundEvent::MoveRequest(_)))
            .collect();
        assert_eq!(moves.len(), 3);
    }

    #[test]
    fn test_move_emission_parse() {
        assert_eq!("gesture-end".parse::<MoveEmission>().unwrap(), MoveEmission::GestureEnd);
        assert_eq!("Every-Frame".parse::<MoveEmission>().unwrap(), MoveEmission::EveryFrame);
        assert!("sometimes".parse::<MoveEmission>().is_err());
    }
}
