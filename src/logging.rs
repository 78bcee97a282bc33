//! Tracing bootstrap.
//!
//! # Invariants
//! - Initialization is idempotent: later calls are no-ops returning `Ok`.
//! - `RUST_LOG` wins over the verbosity passed in.
//! - The optional file sink rolls daily and is flushed by a guard held for
//!   the life of the process.

use std::path::Path;

use anyhow::{anyhow, Result};
use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "mapa.log";

static LOGGING: OnceCell<Option<WorkerGuard>> = OnceCell::new();

/// Filter directive for a `-v` count: 0 = info, 1 = debug, 2+ = trace
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "mapa_sync=info,mapa=info,tower_http=warn",
        1 => "mapa_sync=debug,mapa=debug,tower_http=info",
        _ => "mapa_sync=trace,mapa=trace,tower_http=debug",
    }
}

pub fn init(verbosity: u8, log_dir: Option<&Path>) -> Result<()> {
    LOGGING
        .get_or_try_init(|| -> Result<Option<WorkerGuard>> {
            let filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

            let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);

            let (file, guard) = match log_dir {
                Some(dir) => {
                    std::fs::create_dir_all(dir).map_err(|err| {
                        anyhow!("failed to create log directory `{}`: {err}", dir.display())
                    })?;
                    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
                    let (writer, guard) = tracing_appender::non_blocking(appender);
                    let layer = fmt::layer().with_writer(writer).with_ansi(false);
                    (Some(layer), Some(guard))
                }
                None => (None, None),
            };

            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(file)
                .try_init()
                .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))?;

            Ok(guard)
        })
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_directives() {
        assert!(default_directive(0).contains("mapa_sync=info"));
        assert!(default_directive(1).contains("mapa_sync=debug"));
        assert!(default_directive(7).contains("mapa_sync=trace"));
    }
}
