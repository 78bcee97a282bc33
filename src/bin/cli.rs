use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use mapa_sync::{
    logging, server, BootstrapError, BootstrapLoader, ConnectionStatus, DragPhase, Gesture,
    IdStrategy, Marker, MoveEmission, PresentationAdapter, Replica, ReplicaConfig,
};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "mapa")]
#[command(about = "Shared live map markers: relay server and terminal replica", version)]
#[command(after_help = "Join commands (one per line on stdin):
  new                     create a marker at the default drop point
  rm <id>                 delete a marker
  mv <id> <lat> <lng>     drag a marker and release it
  ls                      list rendered markers
  quit                    leave")]
struct Cli {
    /// More logging (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Also write daily-rolled logs into this directory
    #[arg(long, value_name = "DIR", global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reference relay server
    Serve {
        #[arg(short, long, default_value = "5000")]
        port: u16,
    },

    /// Join as an interactive terminal replica
    Join(ReplicaArgs),

    /// Fetch and print the current snapshot
    Snapshot {
        #[command(flatten)]
        replica: ReplicaArgs,

        /// Print raw JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct ReplicaArgs {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP base url of the server
    #[arg(short, long, value_name = "URL")]
    server: Option<String>,

    /// Websocket url, if not derived from --server
    #[arg(long, value_name = "URL")]
    socket: Option<String>,

    /// How new marker ids are minted
    #[arg(long, value_name = "timestamp|uuid")]
    ids: Option<IdStrategy>,

    /// When drags are broadcast
    #[arg(long, value_name = "every-frame|gesture-end")]
    moves: Option<MoveEmission>,

    /// Write move positions into the registry too
    #[arg(long)]
    writeback: bool,
}

impl ReplicaArgs {
    fn resolve(self) -> Result<ReplicaConfig> {
        let mut config = ReplicaConfig::load(self.config.as_deref())?;
        if let Some(server) = self.server {
            config.server_url = server;
        }
        if let Some(socket) = self.socket {
            config.socket_url = Some(socket);
        }
        if let Some(ids) = self.ids {
            config.policy.ids = ids;
        }
        if let Some(moves) = self.moves {
            config.policy.moves = moves;
        }
        if self.writeback {
            config.policy.move_writeback = true;
        }
        Ok(config)
    }
}

/// What the terminal currently shows, shared with the prompt loop for `ls`
type Handles = Arc<Mutex<BTreeMap<String, Marker>>>;

struct TerminalAdapter {
    handles: Handles,
}

impl PresentationAdapter for TerminalAdapter {
    fn render(&mut self, marker: &Marker) {
        println!(
            "{} {} {} {}",
            "+".bright_green(),
            marker.name.bright_white().bold(),
            format!("({:.6}, {:.6})", marker.lat, marker.lng).bright_black(),
            marker.id.bright_yellow()
        );
        self.handles.lock().insert(marker.id.clone(), marker.clone());
    }

    fn remove_visual(&mut self, id: &str) {
        if self.handles.lock().remove(id).is_some() {
            println!("{} {}", "-".bright_red(), id.bright_yellow());
        }
    }

    fn update_position(&mut self, id: &str, lat: f64, lng: f64) {
        if let Some(handle) = self.handles.lock().get_mut(id) {
            handle.lat = lat;
            handle.lng = lng;
            println!(
                "{} {} {}",
                "~".bright_blue(),
                id.bright_yellow(),
                format!("({:.6}, {:.6})", lat, lng).bright_black()
            );
        }
    }

    fn load_failed(&mut self, error: &BootstrapError) {
        eprintln!("{} {}", "✗ Could not load markers:".red().bold(), error);
    }

    fn connectivity_changed(&mut self, status: ConnectionStatus) {
        match status {
            ConnectionStatus::Connected => println!("{}", "● online".green()),
            ConnectionStatus::Disconnected => println!("{}", "○ offline".yellow()),
        }
    }
}

fn parse_command(line: &str) -> Result<Option<Gesture>> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let gesture = match parts.as_slice() {
        ["new"] => Gesture::Create,
        ["rm", id] => Gesture::Delete { id: id.to_string() },
        ["mv", id, lat, lng] => Gesture::Drag {
            id: id.to_string(),
            lat: lat.parse()?,
            lng: lng.parse()?,
            phase: DragPhase::End,
        },
        [] => return Ok(None),
        _ => bail!("unknown command `{line}`"),
    };
    Ok(Some(gesture))
}

async fn join(config: ReplicaConfig) -> Result<()> {
    let handles: Handles = Arc::default();
    let adapter = TerminalAdapter {
        handles: handles.clone(),
    };

    let replica = Replica::connect(&config, adapter)?;
    let (gestures, gesture_rx) = mpsc::unbounded_channel();
    let running = tokio::spawn(replica.run(gesture_rx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "quit" | "exit" => break,
            "ls" => {
                for (id, m) in handles.lock().iter() {
                    println!(
                        "  {} {} {} {}",
                        "●".truecolor_hex(&m.color),
                        m.name.bright_white(),
                        format!("({:.6}, {:.6})", m.lat, m.lng).bright_black(),
                        id.bright_yellow()
                    );
                }
            }
            other => match parse_command(other) {
                Ok(Some(gesture)) => {
                    if gestures.send(gesture).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => eprintln!("{} {}", "?".yellow(), err),
            },
        }
    }

    drop(gestures);
    let engine = running.await??;
    println!(
        "{} left with {} markers",
        "✓".green(),
        engine.registry().len()
    );
    Ok(())
}

async fn snapshot(config: ReplicaConfig, json: bool) -> Result<()> {
    let loader = BootstrapLoader::new(&config.server_url, config.bootstrap_timeout)?;
    let snapshot = loader.fetch().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("{}", format!("Markers at {}", loader.endpoint()).cyan().bold());
    println!("{}", "═".repeat(80).bright_black());
    let sorted: BTreeMap<_, _> = snapshot.into_iter().collect();
    for (id, m) in &sorted {
        println!(
            "{} {:<24} {} {}",
            m.color.bright_black(),
            m.name.bright_white(),
            format!("({:.6}, {:.6})", m.lat, m.lng).bright_black(),
            id.bright_yellow()
        );
    }
    println!("{}", "─".repeat(80).bright_black());
    println!("{}", format!("{} markers", sorted.len()).bright_white().bold());
    Ok(())
}

trait HexColor {
    fn truecolor_hex(self, hex: &str) -> ColoredString;
}

impl HexColor for &str {
    fn truecolor_hex(self, hex: &str) -> ColoredString {
        let rgb = hex
            .strip_prefix('#')
            .and_then(|h| u32::from_str_radix(h, 16).ok())
            .unwrap_or(0x3fb1ce);
        self.truecolor((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8)
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_dir.as_deref())?;

    match cli.command {
        Commands::Serve { port } => {
            println!(
                "{}",
                format!("🌐 Starting relay on port {}...", port).cyan().bold()
            );
            server::start(port).await?;
        }

        Commands::Join(args) => {
            let config = args.resolve()?;
            println!(
                "{} {} {}",
                "🗺 Joining".cyan().bold(),
                config.server_url.bright_blue(),
                format!("as {}", config.label).bright_black()
            );
            join(config).await?;
        }

        Commands::Snapshot { replica, json } => {
            snapshot(replica.resolve()?, json).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("new").unwrap(), Some(Gesture::Create));
        assert_eq!(
            parse_command("rm abc").unwrap(),
            Some(Gesture::Delete { id: "abc".into() })
        );
        assert_eq!(
            parse_command("mv abc 1.5 -2").unwrap(),
            Some(Gesture::Drag {
                id: "abc".into(),
                lat: 1.5,
                lng: -2.0,
                phase: DragPhase::End
            })
        );
        assert_eq!(parse_command("").unwrap(), None);
        assert!(parse_command("mv abc north 2").is_err());
        assert!(parse_command("fly away").is_err());
    }
}
