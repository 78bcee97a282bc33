pub mod engine;
pub mod protocol;
pub mod remote;

pub use engine::{ChannelSink, MoveEmission, SyncEngine, SyncPolicy};
pub use protocol::{InboundEvent, OutboundEvent};
pub use remote::{ChannelClient, ConnectionStatus};

// Marker sync: the engine applies relayed events to the local registry and
// turns user gestures into optimistic local changes plus outbound requests.
// `remote` carries both directions over a reconnecting websocket.
