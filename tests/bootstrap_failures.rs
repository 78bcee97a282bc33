use std::time::Duration;

use anyhow::{anyhow, Result};
use axum::{routing::get, Router};
use mapa_sync::{BootstrapError, BootstrapLoader, Replica, ReplicaConfig, VisualEffect};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

const NOT_A_MAP: &str = r#"["m1", "m2"]"#;
const MISKEYED: &str = r#"{"a": {"id": "b", "nombre": "Plaza", "lat": 40.2, "lng": -4.07}}"#;
const EMPTY_ID: &str = r#"{"": {"id": "", "nombre": "Plaza", "lat": 40.2, "lng": -4.07}}"#;

/// Serve `body` on `/mapa` and nothing else
async fn serve_snapshot(body: &'static str) -> Result<String> {
    let app = Router::new().route("/mapa", get(move || async move { body }));
    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

async fn fetch(body: &'static str) -> Result<BootstrapError> {
    let base = serve_snapshot(body).await?;
    let loader = BootstrapLoader::new(&base, Duration::from_secs(2))?;
    match loader.fetch().await {
        Ok(snapshot) => Err(anyhow!("expected a failure, got {} markers", snapshot.len())),
        Err(err) => Ok(err),
    }
}

#[tokio::test]
async fn non_map_body_is_a_decode_error() -> Result<()> {
    let err = fetch(NOT_A_MAP).await?;
    assert!(matches!(err, BootstrapError::Decode(_)), "{err:?}");
    assert!(!err.is_transport());

    let err = fetch(r#"{"m1": 42}"#).await?;
    assert!(matches!(err, BootstrapError::Decode(_)), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn key_must_match_marker_id() -> Result<()> {
    let err = fetch(MISKEYED).await?;
    match err {
        BootstrapError::KeyMismatch { key, id } => {
            assert_eq!(key, "a");
            assert_eq!(id, "b");
        }
        other => return Err(anyhow!("expected key mismatch, got {other:?}")),
    }
    Ok(())
}

#[tokio::test]
async fn empty_ids_are_rejected() -> Result<()> {
    let err = fetch(EMPTY_ID).await?;
    assert!(matches!(err, BootstrapError::EmptyId), "{err:?}");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bad_snapshot_reaches_adapter_and_leaves_registry_empty() -> Result<()> {
    for (body, reason) in [
        (NOT_A_MAP, "not a marker map"),
        (MISKEYED, "does not match"),
        (EMPTY_ID, "empty id"),
    ] {
        let base = serve_snapshot(body).await?;
        let config = ReplicaConfig {
            server_url: base,
            label: "bad-snapshot".to_string(),
            bootstrap_timeout: Duration::from_secs(2),
            ..ReplicaConfig::default()
        };

        let (effects_tx, mut effects) = mpsc::unbounded_channel();
        let (gestures, gesture_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(Replica::connect(&config, effects_tx)?.run(gesture_rx));

        let failure = timeout(Duration::from_secs(5), async {
            while let Some(effect) = effects.recv().await {
                if let VisualEffect::LoadFailed(msg) = effect {
                    return Some(msg);
                }
                assert!(
                    !matches!(effect, VisualEffect::Render(_)),
                    "rendered from a rejected snapshot"
                );
            }
            None
        })
        .await?
        .ok_or_else(|| anyhow!("effects closed before load failure"))?;
        assert!(failure.contains(reason), "`{failure}` lacks `{reason}`");

        drop(gestures);
        let engine = task.await??;
        assert!(engine.registry().is_empty());
    }
    Ok(())
}
