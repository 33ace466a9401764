//! Download orchestration: dedup planning, worker pool, retries,
//! verification, and the final summary.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::checksum::file_digest;
use super::http::{transfer_to_part, Fetcher, TransferError, TransferResult};
use super::task::{DownloadTask, TaskState};
use crate::config::{Credentials, DownloadConfig};
use crate::overlap::ScoredScene;

/// Outcome of the planning pass.
#[derive(Debug, Default)]
pub struct Plan {
    /// Tasks that actually need a transfer.
    pub tasks: Vec<DownloadTask>,
    /// Scenes already present locally with a matching size.
    pub skipped_existing: usize,
    /// Scenes whose declared size fell below the plausibility floor.
    pub skipped_undersized: usize,
}

/// Final counts per task state after a batch run.
///
/// Individual task failures are reported here, never raised; one bad scene
/// must not abort the batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub complete: usize,
    pub failed: usize,
    /// Tasks never started or interrupted by cancellation; their partial
    /// files remain resumable.
    pub pending: usize,
    /// Bytes present locally across all tasks, partial files included.
    pub bytes_transferred: u64,
}

impl DownloadSummary {
    pub fn from_tasks(tasks: &[DownloadTask]) -> Self {
        let mut summary = Self::default();
        for task in tasks {
            match task.state {
                TaskState::Complete => summary.complete += 1,
                TaskState::Failed => summary.failed += 1,
                // In-flight states cannot survive a finished batch; count
                // anything non-terminal as pending.
                _ => summary.pending += 1,
            }
            summary.bytes_transferred += task.bytes_transferred;
        }
        summary
    }
}

/// Result of `download_all`: every task in its true final state, plus the
/// aggregate summary.
#[derive(Debug)]
pub struct BatchOutcome {
    pub tasks: Vec<DownloadTask>,
    pub summary: DownloadSummary,
}

/// Schedules and runs resumable, verified, deduplicated transfers.
pub struct DownloadManager<F: Fetcher> {
    fetcher: F,
    credentials: Credentials,
    config: DownloadConfig,
    cancel: Arc<AtomicBool>,
}

impl<F: Fetcher> DownloadManager<F> {
    pub fn new(fetcher: F, credentials: Credentials, config: DownloadConfig) -> Self {
        Self {
            fetcher,
            credentials,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared cancellation flag. Setting it stops acceptance of new
    /// transfers and interrupts in-flight ones at the next chunk boundary;
    /// partial files stay resumable and are never marked complete.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Builds the task list for a filtered result set.
    ///
    /// A scene is skipped when a file with its derived name and declared
    /// size already exists in the download directory or any registered
    /// data directory (idempotent re-run), or when its declared size is
    /// implausibly small. Target paths are unique within the plan; a
    /// second scene deriving the same filename is dropped as existing.
    pub fn plan(&self, scenes: impl IntoIterator<Item = ScoredScene>) -> TransferResult<Plan> {
        fs::create_dir_all(&self.config.download_dir).map_err(|e| TransferError::Io {
            path: self.config.download_dir.clone(),
            source: e,
        })?;

        let mut plan = Plan::default();
        let mut claimed: Vec<PathBuf> = Vec::new();

        for scored in scenes {
            let scene = scored.scene;
            if scene.size < self.config.min_scene_size {
                warn!(
                    id = %scene.id,
                    size = scene.size,
                    "skipping scene with implausibly small declared size"
                );
                plan.skipped_undersized += 1;
                continue;
            }

            let filename = scene.filename();
            let target = self.config.download_dir.join(&filename);

            if claimed.contains(&target) || self.already_downloaded(&filename, scene.size) {
                debug!(id = %scene.id, file = %filename, "scene already present, skipping");
                plan.skipped_existing += 1;
                continue;
            }

            claimed.push(target.clone());
            plan.tasks.push(DownloadTask::new(scene, target));
        }

        info!(
            tasks = plan.tasks.len(),
            skipped_existing = plan.skipped_existing,
            skipped_undersized = plan.skipped_undersized,
            "download plan ready"
        );
        Ok(plan)
    }

    /// Checks the download directory and every data directory for a file
    /// with this name and size.
    fn already_downloaded(&self, filename: &str, size: u64) -> bool {
        std::iter::once(&self.config.download_dir)
            .chain(self.config.data_dirs.iter())
            .any(|dir| {
                dir.join(filename)
                    .metadata()
                    .map(|m| m.is_file() && m.len() == size)
                    .unwrap_or(false)
            })
    }

    /// Runs all tasks through a bounded worker pool and returns every task
    /// in its final state together with the aggregate summary.
    pub fn download_all(&self, tasks: Vec<DownloadTask>, concurrency: usize) -> BatchOutcome {
        let workers = concurrency.max(1);
        let (task_tx, task_rx) = mpsc::channel::<DownloadTask>();
        let (done_tx, done_rx) = mpsc::channel::<DownloadTask>();

        let expected = tasks.len();
        for task in tasks {
            // Receiver outlives this loop; send cannot fail here.
            let _ = task_tx.send(task);
        }
        drop(task_tx);

        let task_rx = Arc::new(Mutex::new(task_rx));

        let finished: Vec<DownloadTask> = thread::scope(|scope| {
            for _ in 0..workers {
                let task_rx = Arc::clone(&task_rx);
                let done_tx = done_tx.clone();
                scope.spawn(move || loop {
                    let next = { task_rx.lock().recv() };
                    let Ok(mut task) = next else { break };

                    if self.cancel.load(Ordering::SeqCst) {
                        task.last_error = Some("cancelled before start".into());
                        let _ = done_tx.send(task);
                        continue;
                    }

                    self.run_task(&mut task);
                    let _ = done_tx.send(task);
                });
            }
            drop(done_tx);
            done_rx.iter().collect()
        });

        debug_assert_eq!(finished.len(), expected);
        let summary = DownloadSummary::from_tasks(&finished);
        info!(
            complete = summary.complete,
            failed = summary.failed,
            pending = summary.pending,
            "download batch finished"
        );
        BatchOutcome {
            tasks: finished,
            summary,
        }
    }

    /// Drives one task through its state machine, consuming retries until
    /// it completes, fails permanently, or is cancelled.
    fn run_task(&self, task: &mut DownloadTask) {
        let part = task.part_path();

        loop {
            task.state = TaskState::InProgress;
            let attempt = transfer_to_part(
                &self.fetcher,
                &self.credentials,
                &task.scene.url,
                &part,
                &self.cancel,
            )
            .and_then(|bytes| {
                task.bytes_transferred = bytes;
                task.state = TaskState::Verifying;
                self.verify(task)
            });

            let err = match attempt {
                Ok(()) => {
                    match fs::rename(&part, &task.target) {
                        Ok(()) => {
                            task.state = TaskState::Complete;
                            info!(id = %task.scene.id, path = %task.target.display(), "scene complete");
                            return;
                        }
                        Err(e) => TransferError::Io {
                            path: task.target.clone(),
                            source: e,
                        },
                    }
                }
                Err(TransferError::Cancelled) => {
                    // Resumable: drop back to pending, keep the partial.
                    task.state = TaskState::Pending;
                    task.last_error = Some(TransferError::Cancelled.to_string());
                    return;
                }
                Err(err @ TransferError::Unauthorized(_)) => {
                    // A credential problem will not fix itself.
                    task.state = TaskState::Failed;
                    task.last_error = Some(err.to_string());
                    return;
                }
                Err(err) => err,
            };

            if err.forces_restart() {
                // The partial (or freshly renamed-over) bytes are garbage.
                let _ = fs::remove_file(&part);
                task.bytes_transferred = 0;
            } else {
                task.bytes_transferred = part.metadata().map(|m| m.len()).unwrap_or(0);
            }

            task.retries += 1;
            task.last_error = Some(err.to_string());
            match self.config.retry.delay_for_attempt(task.retries) {
                Some(delay) => {
                    warn!(
                        id = %task.scene.id,
                        retry = task.retries,
                        error = %err,
                        "task attempt failed, retrying"
                    );
                    thread::sleep(delay);
                }
                None => {
                    warn!(id = %task.scene.id, error = %err, "task failed permanently");
                    task.state = TaskState::Failed;
                    return;
                }
            }
        }
    }

    /// Verifies the completed partial file against the declared size and
    /// checksum.
    fn verify(&self, task: &DownloadTask) -> TransferResult<()> {
        let part = task.part_path();
        let actual = part
            .metadata()
            .map(|m| m.len())
            .map_err(|e| TransferError::Io {
                path: part.clone(),
                source: e,
            })?;
        if actual != task.scene.size {
            return Err(TransferError::SizeMismatch {
                declared: task.scene.size,
                actual,
            });
        }

        let digest =
            file_digest(&part, task.scene.checksum.algorithm).map_err(|e| TransferError::Io {
                path: part.clone(),
                source: e,
            })?;
        if !task.scene.checksum.matches(&digest) {
            return Err(TransferError::ChecksumMismatch {
                filename: task.scene.filename(),
                expected: task.scene.checksum.digest.clone(),
                actual: digest,
            });
        }
        Ok(())
    }
}
