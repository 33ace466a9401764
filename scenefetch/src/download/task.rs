//! Download task state tracking.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::catalog::Scene;

/// Suffix appended to a task's target path while the transfer is in
/// flight. The partial file is atomically renamed to the final name only
/// after verification succeeds.
pub const PART_SUFFIX: &str = ".part";

/// Lifecycle of one download task.
///
/// `Pending → InProgress → Verifying → Complete`, or `Failed` once the
/// retry budget is exhausted. `Complete` and `Failed` are terminal; a
/// cancelled task drops back to `Pending` with its partial file intact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    InProgress,
    Verifying,
    Complete,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Complete | TaskState::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Pending => "pending",
            TaskState::InProgress => "in-progress",
            TaskState::Verifying => "verifying",
            TaskState::Complete => "complete",
            TaskState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One scheduled transfer. Mutated only by the download manager.
#[derive(Clone, Debug)]
pub struct DownloadTask {
    /// Scene being retrieved.
    pub scene: Scene,
    /// Final path of the completed file; unique among all tasks in a run.
    pub target: PathBuf,
    pub state: TaskState,
    /// Bytes present locally (partial or complete).
    pub bytes_transferred: u64,
    /// Retries consumed so far (0 on the first attempt).
    pub retries: u32,
    /// Most recent error, kept for the summary and script export.
    pub last_error: Option<String>,
}

impl DownloadTask {
    pub fn new(scene: Scene, target: PathBuf) -> Self {
        Self {
            scene,
            target,
            state: TaskState::Pending,
            bytes_transferred: 0,
            retries: 0,
            last_error: None,
        }
    }

    /// Path of the in-flight partial file.
    pub fn part_path(&self) -> PathBuf {
        append_suffix(&self.target, PART_SUFFIX)
    }
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}
