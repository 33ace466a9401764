//! Resumable HTTP transfers.
//!
//! The [`Fetcher`] trait abstracts the download endpoint so tests can
//! drive the manager with scripted byte streams. The real implementation
//! issues authenticated GETs and attempts a `Range` request when a partial
//! file exists; a server that ignores the range (plain 200) forces a full
//! restart.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::config::Credentials;

/// Stream buffer size (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Result type for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;

/// Errors from a single transfer attempt or its verification.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The download endpoint rejected the credentials. Never retried.
    #[error("authentication rejected (HTTP {0})")]
    Unauthorized(u16),

    /// Any other non-success HTTP status.
    #[error("download returned HTTP {0}")]
    Http(u16),

    /// Connection-level failure; the partial file is kept for resumption.
    #[error("network error: {0}")]
    Network(String),

    /// Local filesystem failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Cooperative cancellation; the partial file is kept for resumption.
    #[error("transfer cancelled")]
    Cancelled,

    /// The completed transfer's byte count disagrees with the declared
    /// size. Forces a restart from scratch.
    #[error("transferred {actual} bytes but catalog declared {declared}")]
    SizeMismatch { declared: u64, actual: u64 },

    /// The completed transfer's checksum disagrees with the declaration.
    /// Forces a restart from scratch.
    #[error("checksum mismatch for {filename}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        filename: String,
        expected: String,
        actual: String,
    },
}

impl TransferError {
    /// Errors that invalidate the partial file entirely.
    pub fn forces_restart(&self) -> bool {
        matches!(
            self,
            TransferError::SizeMismatch { .. } | TransferError::ChecksumMismatch { .. }
        )
    }

    fn io(path: &Path, source: io::Error) -> Self {
        TransferError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// An opened transfer: the body stream plus whether the server honored the
/// requested byte range.
pub struct FetchStart {
    pub reader: Box<dyn Read + Send>,
    /// True when the server answered 206 to a ranged request, i.e. the
    /// stream continues from the requested offset.
    pub resumed: bool,
}

/// Trait for opening download streams.
pub trait Fetcher: Send + Sync {
    /// Starts an authenticated GET. When `offset > 0` a
    /// `Range: bytes={offset}-` header is sent; `FetchStart::resumed`
    /// reports whether the server honored it.
    fn fetch(&self, url: &str, credentials: &Credentials, offset: u64)
        -> TransferResult<FetchStart>;
}

/// Real fetcher backed by a blocking reqwest client.
pub struct ReqwestFetcher {
    client: reqwest::blocking::Client,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> TransferResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransferError::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl Fetcher for ReqwestFetcher {
    fn fetch(
        &self,
        url: &str,
        credentials: &Credentials,
        offset: u64,
    ) -> TransferResult<FetchStart> {
        let mut request = self
            .client
            .get(url)
            .basic_auth(&credentials.username, Some(&credentials.password));
        if offset > 0 {
            request = request.header(reqwest::header::RANGE, format!("bytes={offset}-"));
        }

        let response = request
            .send()
            .map_err(|e| TransferError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(TransferError::Unauthorized(status.as_u16()));
        }
        if !status.is_success() {
            return Err(TransferError::Http(status.as_u16()));
        }

        Ok(FetchStart {
            resumed: status == reqwest::StatusCode::PARTIAL_CONTENT,
            reader: Box::new(response),
        })
    }
}

/// Streams a scene into its partial file, resuming from the existing
/// partial length when the server honors ranges.
///
/// Returns the total bytes now present in the partial file. On a network
/// error or cancellation the partial file keeps every flushed byte, so a
/// later attempt resumes instead of restarting.
pub fn transfer_to_part<F: Fetcher + ?Sized>(
    fetcher: &F,
    credentials: &Credentials,
    url: &str,
    part: &Path,
    cancel: &AtomicBool,
) -> TransferResult<u64> {
    let existing = part.metadata().map(|m| m.len()).unwrap_or(0);

    let start = fetcher.fetch(url, credentials, existing)?;

    let (file, mut total) = if existing > 0 && start.resumed {
        debug!(path = %part.display(), offset = existing, "resuming partial download");
        let file = OpenOptions::new()
            .append(true)
            .open(part)
            .map_err(|e| TransferError::io(part, e))?;
        (file, existing)
    } else {
        if existing > 0 {
            debug!(path = %part.display(), "server ignored range request, restarting");
        }
        let file = File::create(part).map_err(|e| TransferError::io(part, e))?;
        (file, 0)
    };

    let mut reader = start.reader;
    let mut writer = BufWriter::new(file);
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        if cancel.load(Ordering::SeqCst) {
            writer.flush().map_err(|e| TransferError::io(part, e))?;
            return Err(TransferError::Cancelled);
        }

        let bytes_read = match reader.read(&mut buffer) {
            Ok(n) => n,
            Err(e) => {
                // Keep what we have; the next attempt resumes.
                writer.flush().map_err(|e| TransferError::io(part, e))?;
                return Err(TransferError::Network(format!("read error: {e}")));
            }
        };
        if bytes_read == 0 {
            break;
        }

        writer
            .write_all(&buffer[..bytes_read])
            .map_err(|e| TransferError::io(part, e))?;
        total += bytes_read as u64;
    }

    writer.flush().map_err(|e| TransferError::io(part, e))?;
    Ok(total)
}
