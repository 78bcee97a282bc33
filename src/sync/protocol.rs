//! Wire events.
//!
//! Every websocket text frame carries one envelope:
//! `{"event": "<name>", "payload": <json>}`. Create and move payloads are full
//! marker records, delete payloads are the bare id string.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::marker::Marker;

pub const MARKER_CREATE: &str = "marker-crear";
pub const MARKER_DELETE: &str = "marker-borrar";
pub const MARKER_MOVE: &str = "marker-mover";

pub const MARKER_CREATE_REQUEST: &str = "marcador-nuevo";
pub const MARKER_DELETE_REQUEST: &str = "peticion-marcador-borrar";
pub const MARKER_MOVE_REQUEST: &str = "peticion-marcador-mover";

/// Older servers broadcast with the `marcador-` prefix
const LEGACY_CREATE: &str = "marcador-crear";
const LEGACY_DELETE: &str = "marcador-borrar";
const LEGACY_MOVE: &str = "marcador-mover";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::InvalidFrame)
    }

    fn marker(&self) -> Result<Marker, ProtocolError> {
        let marker: Marker = self.decode()?;
        if marker.id.is_empty() {
            return Err(ProtocolError::EmptyId {
                event: self.event.clone(),
            });
        }
        Ok(marker)
    }

    fn id(&self) -> Result<String, ProtocolError> {
        let id: String = self.decode()?;
        if id.is_empty() {
            return Err(ProtocolError::EmptyId {
                event: self.event.clone(),
            });
        }
        Ok(id)
    }

    fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        T::deserialize(&self.payload).map_err(|source| ProtocolError::MalformedPayload {
            event: self.event.clone(),
            source,
        })
    }

    fn encode<T: Serialize>(event: &str, payload: &T) -> Result<String, ProtocolError> {
        let encode_err = |source| ProtocolError::Encode {
            event: event.to_string(),
            source,
        };
        let envelope = Envelope {
            event: event.to_string(),
            payload: serde_json::to_value(payload).map_err(encode_err)?,
        };
        serde_json::to_string(&envelope).map_err(encode_err)
    }
}

/// Events broadcast to this replica by the server on behalf of other replicas
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Create(Marker),
    Delete(String),
    Move(Marker),
}

impl InboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::Create(_) => MARKER_CREATE,
            InboundEvent::Delete(_) => MARKER_DELETE,
            InboundEvent::Move(_) => MARKER_MOVE,
        }
    }

    pub fn marker_id(&self) -> &str {
        match self {
            InboundEvent::Create(m) | InboundEvent::Move(m) => &m.id,
            InboundEvent::Delete(id) => id,
        }
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Self::from_envelope(&Envelope::parse(text)?)
    }

    pub fn from_envelope(env: &Envelope) -> Result<Self, ProtocolError> {
        match env.event.as_str() {
            MARKER_CREATE | LEGACY_CREATE => Ok(InboundEvent::Create(env.marker()?)),
            MARKER_DELETE | LEGACY_DELETE => Ok(InboundEvent::Delete(env.id()?)),
            MARKER_MOVE | LEGACY_MOVE => Ok(InboundEvent::Move(env.marker()?)),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        match self {
            InboundEvent::Create(m) | InboundEvent::Move(m) => Envelope::encode(self.name(), m),
            InboundEvent::Delete(id) => Envelope::encode(self.name(), id),
        }
    }
}

/// Requests this replica sends after applying a local mutation
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    CreateRequest(Marker),
    DeleteRequest(String),
    MoveRequest(Marker),
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::CreateRequest(_) => MARKER_CREATE_REQUEST,
            OutboundEvent::DeleteRequest(_) => MARKER_DELETE_REQUEST,
            OutboundEvent::MoveRequest(_) => MARKER_MOVE_REQUEST,
        }
    }

    pub fn marker_id(&self) -> &str {
        match self {
            OutboundEvent::CreateRequest(m) | OutboundEvent::MoveRequest(m) => &m.id,
            OutboundEvent::DeleteRequest(id) => id,
        }
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let env = Envelope::parse(text)?;
        match env.event.as_str() {
            MARKER_CREATE_REQUEST => Ok(OutboundEvent::CreateRequest(env.marker()?)),
            MARKER_DELETE_REQUEST => Ok(OutboundEvent::DeleteRequest(env.id()?)),
            MARKER_MOVE_REQUEST => Ok(OutboundEvent::MoveRequest(env.marker()?)),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        match self {
            OutboundEvent::CreateRequest(m) | OutboundEvent::MoveRequest(m) => {
                Envelope::encode(self.name(), m)
            }
            OutboundEvent::DeleteRequest(id) => Envelope::encode(self.name(), id),
        }
    }

    /// What other replicas should see once the server relays this request
    pub fn into_broadcast(self) -> InboundEvent {
        match self {
            OutboundEvent::CreateRequest(m) => InboundEvent::Create(m),
            OutboundEvent::DeleteRequest(id) => InboundEvent::Delete(id),
            OutboundEvent::MoveRequest(m) => InboundEvent::Move(m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_envelope_names() {
        let ev = InboundEvent::decode(
            r##"{"event":"marker-crear","payload":{"id":"t1","nombre":"Cafe","color":"#ff0000","lat":40.2,"lng":-4.07}}"##,
        )
        .unwrap();
        let InboundEvent::Create(m) = ev else {
            panic!("expected create");
        };
        assert_eq!(m.name, "Cafe");

        let ev = InboundEvent::decode(r#"{"event":"marker-borrar","payload":"t1"}"#).unwrap();
        assert_eq!(ev, InboundEvent::Delete("t1".into()));
    }

    #[test]
    fn test_legacy_aliases_accepted() {
        let ev = InboundEvent::decode(r#"{"event":"marcador-borrar","payload":"t1"}"#).unwrap();
        assert_eq!(ev, InboundEvent::Delete("t1".into()));

        let ev = InboundEvent::decode(
            r#"{"event":"marcador-mover","payload":{"id":"m1","lat":2,"lng":2}}"#,
        )
        .unwrap();
        assert_eq!(ev.name(), MARKER_MOVE);
        assert_eq!(ev.marker_id(), "m1");
    }

    #[test]
    fn test_outbound_encoding() {
        let m = Marker::new("t1", "Cafe", "#ff0000", 40.2, -4.07);
        let text = OutboundEvent::CreateRequest(m).encode().unwrap();
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["event"], "marcador-nuevo");
        assert_eq!(v["payload"]["nombre"], "Cafe");

        let text = OutboundEvent::DeleteRequest("t1".into()).encode().unwrap();
        assert_eq!(text, r#"{"event":"peticion-marcador-borrar","payload":"t1"}"#);
    }

    #[test]
    fn test_malformed_payloads_are_typed() {
        let err = InboundEvent::decode(r#"{"event":"marker-crear","payload":{"lat":1,"lng":1}}"#)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedPayload { .. }));

        let err = InboundEvent::decode(r#"{"event":"marker-borrar","payload":42}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedPayload { .. }));

        let err = InboundEvent::decode(r#"{"event":"marker-borrar","payload":""}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::EmptyId { .. }));

        let err = InboundEvent::decode(r#"{"event":"usuarios-activos","payload":[]}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownEvent(name) if name == "usuarios-activos"));

        let err = InboundEvent::decode("not json").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidFrame(_)));
    }

    #[test]
    fn test_request_becomes_matching_broadcast() {
        let m = Marker::new("a", "x", "#000000", 1.0, 2.0);
        assert_eq!(
            OutboundEvent::MoveRequest(m.clone()).into_broadcast(),
            InboundEvent::Move(m)
        );
        assert_eq!(
            OutboundEvent::DeleteRequest("a".into()).into_broadcast(),
            InboundEvent::Delete("a".into())
        );
    }
}
