use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub watchdog: WatchdogConfig,
    pub roller: RollerConfig,
    pub bus: BusConfig,
    /// Directory of task definition YAML files.
    pub tasks_dir: PathBuf,
    /// Maximum time to wait for each background loop during shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            watchdog: WatchdogConfig::from_env(),
            roller: RollerConfig::from_env(),
            bus: BusConfig::from_env(),
            tasks_dir: PathBuf::from(env_or("VIGIL_TASKS_DIR", "data/tasks")),
            shutdown_timeout_secs: env_u64("VIGIL_SHUTDOWN_TIMEOUT_SECS", 10),
        }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!(
            "  watchdog:  scan_interval={}s, default_grace={}s",
            self.watchdog.scan_interval_secs,
            self.watchdog.default_grace_secs
        );
        tracing::info!("  roller:    interval={}s", self.roller.interval_secs);
        tracing::info!("  bus:       subscriber_buffer={}", self.bus.subscriber_buffer);
        tracing::info!("  tasks_dir: {}", self.tasks_dir.display());
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watchdog: WatchdogConfig::default(),
            roller: RollerConfig::default(),
            bus: BusConfig::default(),
            tasks_dir: PathBuf::from("data/tasks"),
            shutdown_timeout_secs: 10,
        }
    }
}

// ── Watchdog ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Seconds between missed-execution scans.
    pub scan_interval_secs: u64,
    /// Grace period applied to tasks whose definition does not set one.
    pub default_grace_secs: u64,
}

impl WatchdogConfig {
    fn from_env() -> Self {
        Self {
            scan_interval_secs: env_u64("VIGIL_WATCHDOG_SCAN_SECS", 60),
            default_grace_secs: env_u64("VIGIL_DEFAULT_GRACE_SECS", 300),
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 60,
            default_grace_secs: 300,
        }
    }
}

// ── Reconciliation roller ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollerConfig {
    /// Seconds between full failure-stat recomputations.
    pub interval_secs: u64,
}

impl RollerConfig {
    fn from_env() -> Self {
        Self {
            interval_secs: env_u64("VIGIL_ROLLER_INTERVAL_SECS", 21_600),
        }
    }
}

impl Default for RollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 21_600,
        }
    }
}

// ── Event bus ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Per-subscriber buffered event capacity; a full buffer drops events
    /// for that subscriber.
    pub subscriber_buffer: usize,
}

impl BusConfig {
    fn from_env() -> Self {
        Self {
            subscriber_buffer: env_usize("VIGIL_BUS_BUFFER", 256),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 256,
        }
    }
}
