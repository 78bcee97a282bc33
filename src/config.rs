//! Replica configuration.
//!
//! Layers, later wins: built-in defaults, an optional TOML file, `MAPA_*`
//! environment variables (a `.env` file is honored), then CLI flags applied
//! by the binary.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use url::Url;

use crate::error::RetryPolicy;
use crate::marker::IdStrategy;
use crate::sync::{MoveEmission, SyncPolicy};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:5000";
pub const DEFAULT_SOCKET_PATH: &str = "/ws";
const DEFAULT_BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaConfig {
    /// HTTP base url; the snapshot lives at `<server_url>/mapa`
    pub server_url: String,

    /// Explicit websocket url. Derived from `server_url` when unset.
    pub socket_url: Option<String>,

    pub socket_path: String,

    /// Name used in logs to tell replicas apart
    pub label: String,

    pub bootstrap_timeout: Duration,

    pub policy: SyncPolicy,

    pub reconnect: RetryPolicy,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            socket_url: None,
            socket_path: DEFAULT_SOCKET_PATH.to_string(),
            label: whoami::username(),
            bootstrap_timeout: DEFAULT_BOOTSTRAP_TIMEOUT,
            policy: SyncPolicy::default(),
            reconnect: RetryPolicy::default(),
        }
    }
}

/// On-disk shape; every key optional
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    server_url: Option<String>,
    socket_url: Option<String>,
    socket_path: Option<String>,
    label: Option<String>,
    bootstrap_timeout_ms: Option<u64>,
    id_strategy: Option<IdStrategy>,
    move_emission: Option<MoveEmission>,
    move_writeback: Option<bool>,
    reconnect_initial_ms: Option<u64>,
    reconnect_max_ms: Option<u64>,
}

impl ReplicaConfig {
    /// Defaults, then `path` if given, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = path {
            config.merge_file(path)?;
        }
        dotenvy::dotenv().ok();
        config.merge_env(std::env::vars())?;
        Ok(config)
    }

    pub fn merge_file(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        self.merge_toml(&text)
            .with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn merge_toml(&mut self, text: &str) -> Result<()> {
        let file: FileConfig = toml::from_str(text)?;

        if let Some(v) = file.server_url {
            self.server_url = v;
        }
        if let Some(v) = file.socket_url {
            self.socket_url = Some(v);
        }
        if let Some(v) = file.socket_path {
            self.socket_path = v;
        }
        if let Some(v) = file.label {
            self.label = v;
        }
        if let Some(ms) = file.bootstrap_timeout_ms {
            self.bootstrap_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = file.id_strategy {
            self.policy.ids = v;
        }
        if let Some(v) = file.move_emission {
            self.policy.moves = v;
        }
        if let Some(v) = file.move_writeback {
            self.policy.move_writeback = v;
        }
        if let Some(ms) = file.reconnect_initial_ms {
            self.reconnect.initial_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = file.reconnect_max_ms {
            self.reconnect.max_delay = Duration::from_millis(ms);
        }
        Ok(())
    }

    /// Apply `MAPA_*` variables from `vars`; other keys are ignored
    pub fn merge_env<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.as_str() {
                "MAPA_SERVER_URL" => self.server_url = value,
                "MAPA_SOCKET_URL" => self.socket_url = Some(value),
                "MAPA_SOCKET_PATH" => self.socket_path = value,
                "MAPA_LABEL" => self.label = value,
                "MAPA_BOOTSTRAP_TIMEOUT_MS" => {
                    let ms: u64 = value
                        .parse()
                        .with_context(|| format!("{key}: expected milliseconds, got `{value}`"))?;
                    self.bootstrap_timeout = Duration::from_millis(ms);
                }
                "MAPA_ID_STRATEGY" => {
                    self.policy.ids = value.parse().map_err(|e| anyhow!("{key}: {e}"))?;
                }
                "MAPA_MOVE_EMISSION" => {
                    self.policy.moves = value.parse().map_err(|e| anyhow!("{key}: {e}"))?;
                }
                "MAPA_MOVE_WRITEBACK" => self.policy.move_writeback = parse_flag(&key, &value)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Websocket endpoint: `socket_url` if set, otherwise `server_url` with
    /// its scheme swapped (http -> ws, https -> wss) and `socket_path`
    pub fn socket_endpoint(&self) -> Result<String> {
        if let Some(url) = &self.socket_url {
            return Ok(url.clone());
        }

        let mut url = Url::parse(&self.server_url)
            .with_context(|| format!("invalid server url `{}`", self.server_url))?;
        let scheme = match url.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => bail!("server url must be http(s), got `{other}`"),
        };
        url.set_scheme(scheme)
            .map_err(|_| anyhow!("cannot switch `{}` to {scheme}", self.server_url))?;

        let base = url.path().trim_end_matches('/').to_string();
        let path = format!("{}/{}", base, self.socket_path.trim_start_matches('/'));
        url.set_path(&path);
        Ok(url.to_string())
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("{key}: expected a boolean, got `{value}`"),
    }
}
