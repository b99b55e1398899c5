//! Task-definition loader: one YAML file per task.
//!
//! A file that fails to parse or validate is skipped with a per-file reason;
//! a single bad definition never prevents the rest from loading.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use vigil_core::{ScheduleConfig, Task, TaskStatus};

/// Raw task definition as written in YAML.
#[derive(Debug, Deserialize)]
struct TaskDefinition {
    /// Stable id; generated when omitted.
    #[serde(default)]
    id: Option<Uuid>,
    project_id: Uuid,
    name: String,
    #[serde(default)]
    status: TaskStatus,
    schedule: ScheduleConfig,
    /// Per-task grace override; the config default applies when omitted.
    #[serde(default)]
    grace_secs: Option<u64>,
}

/// Why a definition file did or did not produce a task.
#[derive(Debug)]
pub enum LoadStatus {
    Loaded { task_id: Uuid },
    Skipped { reason: String },
}

/// Outcome of loading a single definition file.
#[derive(Debug)]
pub struct LoadResult {
    pub path: PathBuf,
    pub status: LoadStatus,
}

/// Load every `.yaml`/`.yml` file in `dir`.
///
/// Returns the loaded tasks plus a per-file result list for logging and
/// diagnostics.
pub fn load_dir(dir: &Path, default_grace_secs: u64) -> std::io::Result<(Vec<Task>, Vec<LoadResult>)> {
    let mut tasks = Vec::new();
    let mut results = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => {}
            _ => continue,
        }

        match load_file(&path, default_grace_secs) {
            Ok(task) => {
                info!(path = %path.display(), task = %task.name, task_id = %task.id, "task definition loaded");
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Loaded { task_id: task.id },
                });
                tasks.push(task);
            }
            Err(reason) => {
                warn!(path = %path.display(), reason = %reason, "skipping task definition");
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped { reason },
                });
            }
        }
    }

    Ok((tasks, results))
}

fn load_file(path: &Path, default_grace_secs: u64) -> Result<Task, String> {
    let text = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let definition: TaskDefinition =
        serde_yaml::from_str(&text).map_err(|e| e.to_string())?;

    let task = Task {
        id: definition.id.unwrap_or_else(Uuid::new_v4),
        project_id: definition.project_id,
        name: definition.name,
        status: definition.status,
        schedule: definition.schedule,
        grace_secs: definition.grace_secs.unwrap_or(default_grace_secs),
    };

    task.validate().map_err(|e| e.to_string())?;
    Ok(task)
}
