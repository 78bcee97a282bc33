//! One-shot initial load of the registry from `GET <base>/mapa`.

use std::time::Duration;

use reqwest::Client;
use url::Url;

use crate::error::BootstrapError;
use crate::registry::Snapshot;

pub const SNAPSHOT_PATH: &str = "mapa";

pub struct BootstrapLoader {
    client: Client,
    endpoint: Url,
}

impl BootstrapLoader {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BootstrapError> {
        let endpoint = snapshot_url(base_url)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(BootstrapError::Transport)?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Issue the request once. No retry on failure.
    pub async fn fetch(&self) -> Result<Snapshot, BootstrapError> {
        tracing::debug!(endpoint = %self.endpoint, "fetching snapshot");

        let response = self
            .client
            .get(self.endpoint.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(BootstrapError::Transport)?;

        let snapshot: Snapshot = response.json().await.map_err(|err| {
            if err.is_decode() {
                BootstrapError::Decode(err)
            } else {
                BootstrapError::Transport(err)
            }
        })?;

        if snapshot.values().any(|m| m.id.is_empty()) {
            return Err(BootstrapError::EmptyId);
        }
        if let Some((key, marker)) = snapshot.iter().find(|(key, m)| **key != m.id) {
            return Err(BootstrapError::KeyMismatch {
                key: key.clone(),
                id: marker.id.clone(),
            });
        }

        tracing::info!(endpoint = %self.endpoint, markers = snapshot.len(), "snapshot fetched");
        Ok(snapshot)
    }
}

/// `<base>/mapa`, tolerating a trailing slash on the base
pub fn snapshot_url(base_url: &str) -> Result<Url, BootstrapError> {
    let invalid = |reason: String| BootstrapError::InvalidEndpoint {
        url: base_url.to_string(),
        reason,
    };

    let base = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme `{}`", base.scheme())));
    }

    let joined = format!("{}/{}", base.as_str().trim_end_matches('/'), SNAPSHOT_PATH);
    Url::parse(&joined).map_err(|e| invalid(e.to_string()))
}
