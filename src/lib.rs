//! # mapa-sync - live shared map markers
//!
//! Client-side replica for a shared set of named, colored, geolocated
//! markers. Every replica holds its own [`MarkerRegistry`], fills it once from
//! the server's snapshot, then stays in step through create/move/delete
//! events relayed over a websocket. Conflicts resolve as last writer wins.
//!
//! ## Pieces
//!
//! - [`registry`]: id -> marker map, the local source of truth
//! - [`bootstrap`]: one-shot `GET <base>/mapa` snapshot load
//! - [`sync`]: wire protocol, the replicated state machine, and the
//!   reconnecting channel client
//! - [`presentation`]: the effect sink a map UI implements
//! - [`replica`]: runs all of the above on a single task
//! - [`server`]: reference relay for tests and local development
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mapa_sync::{Gesture, Replica, ReplicaConfig, VisualEffect};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ReplicaConfig::load(None)?;
//!     let (effects_tx, mut effects) = mpsc::unbounded_channel::<VisualEffect>();
//!     let (gestures, gesture_rx) = mpsc::unbounded_channel();
//!
//!     let replica = Replica::connect(&config, effects_tx)?;
//!     let running = tokio::spawn(replica.run(gesture_rx));
//!
//!     gestures.send(Gesture::Create)?;
//!     while let Some(effect) = effects.recv().await {
//!         println!("{effect:?}");
//!     }
//!     drop(gestures);
//!     running.await??;
//!     Ok(())
//! }
//! ```

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;
pub mod marker;
pub mod presentation;
pub mod registry;
pub mod replica;
pub mod server;
pub mod sync;

pub use bootstrap::BootstrapLoader;
pub use config::ReplicaConfig;
pub use error::{BootstrapError, ChannelError, ProtocolError, RetryPolicy};
pub use marker::{IdStrategy, Marker};
pub use presentation::{DragPhase, Gesture, PresentationAdapter, VisualEffect};
pub use registry::{MarkerRegistry, Snapshot};
pub use replica::Replica;
pub use sync::{
    ChannelClient, ConnectionStatus, InboundEvent, MoveEmission, OutboundEvent, SyncEngine,
    SyncPolicy,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
