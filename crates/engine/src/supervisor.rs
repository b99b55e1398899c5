//! Top-level supervisor for the engine's background loops.
//!
//! Owns the event bus, the repositories, and one long-lived tokio task per
//! loop (watchdog scan, aggregator delivery, roller timer). A single
//! `watch` channel is the shared cancellation signal: shutdown flips it,
//! closes the bus, and joins every loop with a bounded timeout so the
//! process only reports shutdown complete once each loop has finished its
//! current iteration and exited.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use vigil_core::{Config, EventKind};
use vigil_store::{ExecutionRepository, StatsRepository, TaskRepository};

use crate::aggregator::FailureAggregator;
use crate::bus::EventBus;
use crate::roller::ReconciliationRoller;
use crate::watchdog::Watchdog;

pub struct Supervisor {
    config: Config,
    bus: Arc<EventBus>,
    tasks: Arc<dyn TaskRepository>,
    executions: Arc<dyn ExecutionRepository>,
    stats: Arc<dyn StatsRepository>,
}

/// Handle to a running engine: the shutdown signal plus the loop handles.
pub struct EngineHandle {
    bus: Arc<EventBus>,
    shutdown_tx: watch::Sender<bool>,
    loops: Vec<(&'static str, JoinHandle<()>)>,
    shutdown_timeout: Duration,
}

impl Supervisor {
    pub fn new(
        config: Config,
        tasks: Arc<dyn TaskRepository>,
        executions: Arc<dyn ExecutionRepository>,
        stats: Arc<dyn StatsRepository>,
    ) -> Self {
        let bus = Arc::new(EventBus::new(config.bus.subscriber_buffer));
        Self {
            config,
            bus,
            tasks,
            executions,
            stats,
        }
    }

    /// The bus, for ingestion boundaries and extra consumers (notification
    /// dispatch, dashboard push). Subscribe before `start()` to be certain
    /// of seeing the first watchdog verdicts.
    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    /// Spawn the watchdog, aggregator, and roller loops.
    pub fn start(self) -> EngineHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Subscribe before any loop can publish so no startup event is lost.
        let failed_rx = self.bus.subscribe(EventKind::ExecutionFailed);
        let missed_rx = self.bus.subscribe(EventKind::ExecutionMissed);

        let watchdog = Watchdog::new(
            self.tasks.clone(),
            self.executions.clone(),
            self.bus.clone(),
            Duration::from_secs(self.config.watchdog.scan_interval_secs),
        );
        let aggregator = FailureAggregator::new(self.stats.clone());
        let roller = ReconciliationRoller::new(
            self.tasks,
            self.executions,
            self.stats,
            Duration::from_secs(self.config.roller.interval_secs),
        );

        let mut loops = Vec::new();

        let rx = shutdown_rx.clone();
        loops.push((
            "watchdog",
            tokio::spawn(async move { watchdog.run(rx).await }),
        ));

        let rx = shutdown_rx.clone();
        loops.push((
            "aggregator",
            tokio::spawn(async move { aggregator.run(failed_rx, missed_rx, rx).await }),
        ));

        loops.push((
            "roller",
            tokio::spawn(async move { roller.run(shutdown_rx).await }),
        ));

        info!("engine started: watchdog, aggregator, and roller loops running");

        EngineHandle {
            bus: self.bus,
            shutdown_tx,
            loops,
            shutdown_timeout: Duration::from_secs(self.config.shutdown_timeout_secs),
        }
    }
}

impl EngineHandle {
    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    /// Close the bus, signal every loop, and wait for the loops to exit.
    pub async fn shutdown(self) {
        info!("engine shutdown requested");
        // Bus first: subscriber channels close, so the aggregator drains what
        // is already buffered and exits; the timer loops exit on the signal.
        self.bus.close();
        let _ = self.shutdown_tx.send(true);

        for (name, handle) in self.loops {
            match tokio::time::timeout(self.shutdown_timeout, handle).await {
                Ok(Ok(())) => info!(loop_name = name, "loop stopped"),
                Ok(Err(e)) => warn!(loop_name = name, error = %e, "loop panicked"),
                Err(_) => warn!(loop_name = name, "loop did not stop within timeout"),
            }
        }

        info!("engine shutdown complete");
    }
}
