//! Single-task driver for one replica.
//!
//! Startup order: open the channel (inbound events start buffering), await
//! the bootstrap snapshot, render it, then drain events and gestures one at
//! a time. A failed bootstrap leaves the registry empty and the loop still
//! runs, so live events keep arriving.

use anyhow::Result;
use tokio::sync::{mpsc, watch};

use crate::bootstrap::BootstrapLoader;
use crate::config::ReplicaConfig;
use crate::presentation::{Gesture, PresentationAdapter};
use crate::sync::{ChannelClient, ConnectionStatus, InboundEvent, SyncEngine};

pub struct Replica<A> {
    label: String,
    engine: SyncEngine<A, ChannelClient>,
    inbound: mpsc::UnboundedReceiver<InboundEvent>,
    status: watch::Receiver<ConnectionStatus>,
    loader: BootstrapLoader,
}

impl<A: PresentationAdapter> Replica<A> {
    /// Open the channel and prepare the loader. Nothing is fetched or
    /// rendered until [`Replica::run`].
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime. See
    /// [`ChannelClient::connect`].
    pub fn connect(config: &ReplicaConfig, adapter: A) -> Result<Self> {
        let socket_url = config.socket_endpoint()?;
        let loader = BootstrapLoader::new(&config.server_url, config.bootstrap_timeout)?;
        let (channel, inbound) = ChannelClient::connect(&socket_url, config.reconnect.clone())?;
        let status = channel.watch_status();

        tracing::info!(
            label = %config.label,
            snapshot = %loader.endpoint(),
            socket = %socket_url,
            "replica starting"
        );

        Ok(Self {
            label: config.label.clone(),
            engine: SyncEngine::new(adapter, channel, config.policy),
            inbound,
            status,
            loader,
        })
    }

    pub fn engine(&self) -> &SyncEngine<A, ChannelClient> {
        &self.engine
    }

    /// Load the snapshot, then process events until `gestures` closes or the
    /// channel task ends. Returns the engine for inspection.
    pub async fn run(
        mut self,
        mut gestures: mpsc::UnboundedReceiver<Gesture>,
    ) -> Result<SyncEngine<A, ChannelClient>> {
        match self.loader.fetch().await {
            Ok(snapshot) => self.engine.load_snapshot(snapshot),
            Err(err) => {
                tracing::error!(label = %self.label, error = %err, "initial load failed");
                self.engine.adapter_mut().load_failed(&err);
            }
        }

        let mut status_open = true;
        loop {
            tokio::select! {
                ev = self.inbound.recv() => match ev {
                    Some(ev) => self.engine.apply(ev),
                    None => {
                        tracing::info!(label = %self.label, "channel ended");
                        break;
                    }
                },
                gesture = gestures.recv() => match gesture {
                    Some(gesture) => {
                        if let Err(err) = self.engine.handle_gesture(gesture) {
                            tracing::warn!(label = %self.label, error = %err, "emit failed");
                        }
                    }
                    None => {
                        tracing::debug!(label = %self.label, "presentation closed");
                        break;
                    }
                },
                changed = self.status.changed(), if status_open => match changed {
                    Ok(()) => {
                        let status = *self.status.borrow_and_update();
                        self.engine.adapter_mut().connectivity_changed(status);
                    }
                    Err(_) => status_open = false,
                },
            }
        }

        Ok(self.engine)
    }
}
