//! tierscaled: the tierscale daemon.
//!
//! Wires configuration, logging, the metadata store, the decider registry
//! and the evaluation engine into one binary.
//!
//! # Usage
//!
//! ```text
//! tierscaled put-policy --file hot.toml
//! tierscaled evaluate --snapshot cluster.json
//! tierscaled run --snapshot cluster.json --data-dir /var/lib/tierscale
//! tierscaled status --policy hot
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use tierscale_decider::{ClusterSnapshot, DeciderRegistry};
use tierscale_engine::{AutoscalingEngine, ClusterStateChange, EngineConfig, PolicyFile};

const DEFAULT_FILTER: &str = "info,tierscaled=debug,tierscale=debug";

#[derive(Parser)]
#[command(name = "tierscaled", about = "Tierscale autoscaling capacity daemon")]
struct Cli {
    /// Engine configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for the metadata store; overrides the config file.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Re-evaluate on an interval from a snapshot file until Ctrl-C.
    Run {
        /// Cluster snapshot (JSON), re-read before every cycle.
        #[arg(long)]
        snapshot: PathBuf,

        /// Evaluation interval in seconds; overrides the config file.
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Run a single evaluation cycle and print the published status.
    Evaluate {
        /// Cluster snapshot (JSON).
        #[arg(long)]
        snapshot: PathBuf,
    },

    /// Create or replace a policy from a TOML policy file.
    PutPolicy {
        #[arg(long)]
        file: PathBuf,
    },

    /// Delete a policy by name.
    DeletePolicy { name: String },

    /// Print the last published results as JSON.
    Status {
        /// Only report this policy.
        #[arg(long)]
        policy: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = load_config(cli.config.as_deref(), cli.data_dir)?;
    let registry = Arc::new(DeciderRegistry::builtin());
    let engine = AutoscalingEngine::open(&config, registry)?;

    match cli.command {
        Command::Run { snapshot, interval } => {
            let interval = interval
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.evaluate_interval());
            run(Arc::new(engine), snapshot, interval).await
        }
        Command::Evaluate { snapshot } => {
            let snapshot = read_snapshot(&snapshot)?;
            let outcome = engine
                .on_cluster_state_change(ClusterStateChange::new(snapshot))
                .await?;
            info!(version = outcome.version, "evaluation published");
            print_json(&engine.status()?)
        }
        Command::PutPolicy { file } => {
            let policy = PolicyFile::from_file(&file)
                .with_context(|| format!("reading policy file {}", file.display()))?;
            let published = engine.put_policy(&policy.name, policy.deciders)?;
            print_json(&engine.policy_status(&policy.name)?)?;
            info!(policy = %policy.name, version = published.version, "policy stored");
            Ok(())
        }
        Command::DeletePolicy { name } => {
            let published = engine.delete_policy(&name)?;
            info!(policy = %name, version = published.version, "policy deleted");
            Ok(())
        }
        Command::Status { policy } => match policy {
            Some(name) => print_json(&engine.policy_status(&name)?),
            None => print_json(&engine.status()?),
        },
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER));
    // Logs go to stderr so stdout stays machine-readable.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>, data_dir: Option<PathBuf>) -> anyhow::Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir;
    }
    Ok(config)
}

fn read_snapshot(path: &Path) -> anyhow::Result<ClusterSnapshot> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing snapshot {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(engine: Arc<AutoscalingEngine>, snapshot: PathBuf, interval: Duration) -> anyhow::Result<()> {
    info!(?snapshot, ?interval, "tierscale daemon starting");

    let (change_tx, change_rx) = watch::channel(None);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut poll_shutdown = shutdown_rx.clone();

    let runner = Arc::clone(&engine);
    let engine_handle = tokio::spawn(async move {
        runner.run(change_rx, shutdown_rx).await;
    });

    let poll_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match read_snapshot(&snapshot) {
                        Ok(snapshot) => {
                            let previous = engine.published().ok().map(|p| p.metadata);
                            let mut change = ClusterStateChange::new(snapshot);
                            change.previous = previous;
                            if change_tx.send(Some(change)).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "skipping cycle, snapshot unreadable"),
                    }
                }
                _ = poll_shutdown.changed() => break,
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("installing Ctrl-C handler")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = engine_handle.await;
    let _ = poll_handle.await;

    info!("tierscale daemon stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_flag_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "data_dir = \"/srv/a\"\ndecider_timeout_ms = 100\n").unwrap();

        let config = load_config(Some(&path), None).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/a"));

        let config = load_config(Some(&path), Some(PathBuf::from("/srv/b"))).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/b"));
        assert_eq!(config.decider_timeout_ms, 100);
    }

    #[test]
    fn snapshot_file_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster.json");
        std::fs::write(
            &path,
            r#"{"version":7,"nodes":[{"node_id":"n1","policies":["hot"],"storage":100,"memory":50}]}"#,
        )
        .unwrap();
        let snapshot = read_snapshot(&path).unwrap();
        assert_eq!(snapshot.version(), 7);
        assert_eq!(snapshot.nodes_for_policy("hot").count(), 1);
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "tierscaled",
            "status",
            "--policy",
            "hot",
            "--data-dir",
            "/tmp/ts",
            "--log-json",
        ])
        .unwrap();
        assert!(cli.log_json);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/ts")));
        assert!(matches!(cli.command, Command::Status { policy: Some(ref p) } if p == "hot"));
    }
}
