//! Resumable, verified scene downloads.
//!
//! Transfers stream into a `.part` file next to the final target and are
//! atomically renamed into place only after size and checksum
//! verification. A worker pool bounded by the configured concurrency runs
//! the batch; cancellation and per-task retry with exponential backoff are
//! handled by [`DownloadManager`].

mod checksum;
mod http;
mod manager;
mod task;

pub use checksum::file_digest;
pub use http::{transfer_to_part, FetchStart, Fetcher, ReqwestFetcher, TransferError, TransferResult};
pub use manager::{BatchOutcome, DownloadManager, DownloadSummary, Plan};
pub use task::{DownloadTask, TaskState, PART_SUFFIX};

#[cfg(test)]
pub(crate) use http::tests::MockFetcher;
