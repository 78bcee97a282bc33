use std::time::Duration;

use anyhow::Result;
use mapa_sync::{IdStrategy, MoveEmission, ReplicaConfig};
use tempfile::TempDir;

#[test]
fn file_layer_then_env_layer() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("mapa.toml");
    std::fs::write(
        &path,
        r#"
server_url = "http://maps.local:5000"
label = "kiosk"
move_emission = "gesture-end"
reconnect_initial_ms = 250
reconnect_max_ms = 2000
"#,
    )?;

    let mut config = ReplicaConfig::default();
    config.merge_file(&path)?;
    config.merge_env(vec![(
        "MAPA_SERVER_URL".to_string(),
        "http://override:7000".to_string(),
    )])?;

    assert_eq!(config.server_url, "http://override:7000");
    assert_eq!(config.label, "kiosk");
    assert_eq!(config.policy.moves, MoveEmission::GestureEnd);
    assert_eq!(config.policy.ids, IdStrategy::Timestamp);
    assert_eq!(config.reconnect.initial_delay, Duration::from_millis(250));
    assert_eq!(config.reconnect.max_delay, Duration::from_secs(2));
    assert_eq!(config.socket_endpoint()?, "ws://override:7000/ws");
    Ok(())
}

#[test]
fn missing_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = ReplicaConfig::default();
    let err = config
        .merge_file(&temp_dir.path().join("absent.toml"))
        .unwrap_err();
    assert!(err.to_string().contains("absent.toml"));
}
