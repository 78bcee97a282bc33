use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use mapa_sync::server::{self, RelayState};
use mapa_sync::{
    ConnectionStatus, DragPhase, Gesture, Marker, Replica, ReplicaConfig, Snapshot, VisualEffect,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{sleep, timeout};

fn reserve_port() -> std::io::Result<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

async fn start_relay(state: RelayState) -> Result<SocketAddr> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = server::serve(listener, state).await;
    });
    Ok(addr)
}

fn config_for(server_url: String, label: &str) -> ReplicaConfig {
    ReplicaConfig {
        server_url,
        label: label.to_string(),
        bootstrap_timeout: Duration::from_secs(2),
        ..ReplicaConfig::default()
    }
}

/// Skip effects until one matches
async fn expect_effect<F>(effects: &mut UnboundedReceiver<VisualEffect>, what: &str, mut pred: F) -> Result<VisualEffect>
where
    F: FnMut(&VisualEffect) -> bool,
{
    timeout(Duration::from_secs(5), async {
        while let Some(effect) = effects.recv().await {
            if pred(&effect) {
                return Ok(effect);
            }
        }
        Err(anyhow!("effect stream closed while waiting for {what}"))
    })
    .await
    .map_err(|_| anyhow!("timed out waiting for {what}"))?
}

struct Running {
    gestures: UnboundedSender<Gesture>,
    effects: UnboundedReceiver<VisualEffect>,
    task: tokio::task::JoinHandle<Result<mapa_sync::SyncEngine<UnboundedSender<VisualEffect>, mapa_sync::ChannelClient>>>,
}

fn spawn_replica(config: &ReplicaConfig) -> Result<Running> {
    let (effects_tx, effects) = mpsc::unbounded_channel();
    let (gestures, gesture_rx) = mpsc::unbounded_channel();
    let replica = Replica::connect(config, effects_tx)?;
    let task = tokio::spawn(replica.run(gesture_rx));
    Ok(Running {
        gestures,
        effects,
        task,
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_replicas_stay_in_step() -> Result<()> {
    let plaza = Marker::new("m1", "Plaza", "#0000ff", 40.2464, -4.0713);
    let mut seed = Snapshot::new();
    seed.insert(plaza.id.clone(), plaza.clone());
    let addr = start_relay(RelayState::with_markers(seed)).await?;
    let base = format!("http://{addr}");

    let mut a = spawn_replica(&config_for(base.clone(), "a"))?;
    let mut b = spawn_replica(&config_for(base.clone(), "b"))?;

    for r in [&mut a, &mut b] {
        expect_effect(&mut r.effects, "seed render", |fx| {
            matches!(fx, VisualEffect::Render(m) if m.id == "m1")
        })
        .await?;
        expect_effect(&mut r.effects, "connected", |fx| {
            *fx == VisualEffect::Connectivity(ConnectionStatus::Connected)
        })
        .await?;
    }
    // Let the relay finish subscribing both sockets
    sleep(Duration::from_millis(150)).await;

    // Optimistic create on A shows up locally, then on B
    a.gestures.send(Gesture::Create)?;
    let VisualEffect::Render(created) =
        expect_effect(&mut a.effects, "local render", |fx| matches!(fx, VisualEffect::Render(_))).await?
    else {
        unreachable!()
    };
    let id = created.id.clone();
    expect_effect(&mut b.effects, "remote render", |fx| *fx == VisualEffect::Render(created.clone())).await?;

    // B drags it; A's handle follows
    b.gestures.send(Gesture::Drag {
        id: id.clone(),
        lat: 40.25,
        lng: -4.08,
        phase: DragPhase::End,
    })?;
    expect_effect(&mut a.effects, "remote move", |fx| {
        *fx == VisualEffect::Move {
            id: id.clone(),
            lat: 40.25,
            lng: -4.08,
        }
    })
    .await?;

    // A deletes it; B drops the handle
    a.gestures.send(Gesture::Delete { id: id.clone() })?;
    expect_effect(&mut b.effects, "remote delete", |fx| *fx == VisualEffect::Remove(id.clone())).await?;

    drop(a.gestures);
    drop(b.gestures);
    let engine_a = a.task.await??;
    let engine_b = b.task.await??;

    for engine in [&engine_a, &engine_b] {
        assert!(!engine.registry().contains(&id));
        assert_eq!(engine.registry().get("m1"), Some(&plaza));
    }

    // The relay saw every request too
    let snapshot: Snapshot = reqwest::get(format!("{base}/mapa")).await?.json().await?;
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.contains_key("m1"));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_bootstrap_leaves_registry_empty() -> Result<()> {
    let port = reserve_port()?;
    let mut r = spawn_replica(&config_for(format!("http://127.0.0.1:{port}"), "offline"))?;

    expect_effect(&mut r.effects, "load failure", |fx| matches!(fx, VisualEffect::LoadFailed(_))).await?;

    // Local gestures still work against the empty registry while offline
    r.gestures.send(Gesture::Create)?;
    expect_effect(&mut r.effects, "local render", |fx| matches!(fx, VisualEffect::Render(_))).await?;

    drop(r.gestures);
    let engine = r.task.await??;
    assert_eq!(engine.registry().len(), 1);
    assert!(!engine.channel().is_connected());
    Ok(())
}
