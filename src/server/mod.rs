//! Reference relay: in-memory marker set plus broadcast-to-others.
//!
//! Serves the bootstrap snapshot and turns each replica's requests into
//! inbound events for every other connected replica. Not durable.

pub mod api;

use anyhow::Result;

pub use api::{router, serve, RelayState};

pub async fn start(port: u16) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    serve(listener, RelayState::new()).await
}
