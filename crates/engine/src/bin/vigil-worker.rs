//! vigil-worker — standalone execution monitor.
//!
//! Loads task definitions from a directory, wires the in-memory
//! repositories, and runs the watchdog, aggregator, and roller loops until
//! interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use vigil_core::config::{self, Config};
use vigil_engine::tasks::{self, LoadStatus};
use vigil_engine::Supervisor;
use vigil_store::{MemoryExecutionRepository, MemoryStatsRepository, MemoryTaskRepository};

// ── CLI ─────────────────────────────────────────────────────────────

/// Dead-man's-switch monitor for externally-run scheduled jobs.
#[derive(Parser, Debug)]
#[command(name = "vigil-worker", version, about)]
struct Cli {
    /// Directory of task definition YAML files.
    #[arg(long, env = "VIGIL_TASKS_DIR", default_value = "data/tasks")]
    tasks_dir: PathBuf,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut cfg = Config::from_env();
    cfg.tasks_dir = cli.tasks_dir;
    cfg.log_summary();

    let task_repo = Arc::new(MemoryTaskRepository::new());
    match tasks::load_dir(&cfg.tasks_dir, cfg.watchdog.default_grace_secs) {
        Ok((loaded, results)) => {
            let skipped = results
                .iter()
                .filter(|r| matches!(r.status, LoadStatus::Skipped { .. }))
                .count();
            info!(
                loaded = loaded.len(),
                skipped,
                dir = %cfg.tasks_dir.display(),
                "task definitions loaded"
            );
            for task in loaded {
                task_repo.insert(task);
            }
        }
        Err(e) => {
            warn!(
                error = %e,
                dir = %cfg.tasks_dir.display(),
                "failed to read tasks directory — starting with no tasks"
            );
        }
    }

    let executions = Arc::new(MemoryExecutionRepository::new());
    let stats = Arc::new(MemoryStatsRepository::new());

    let handle = Supervisor::new(cfg, task_repo, executions, stats).start();
    info!("vigil-worker running — press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("interrupt received — shutting down");
    handle.shutdown().await;
    info!("vigil-worker exited cleanly");
    Ok(())
}
