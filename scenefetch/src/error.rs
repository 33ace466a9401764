//! Top-level error type aggregating the component errors.

use thiserror::Error;

use crate::catalog::SearchError;
use crate::download::TransferError;
use crate::geometry::GeometryError;
use crate::query::ConfigError;

/// Result type for top-level harvest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can surface from a harvest run.
///
/// Per-task download failures are not represented here; they are contained
/// to their task and reported through the download summary instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid parameter combination supplied by the caller.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Malformed, unreprojectable, or invalid input geometry.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Catalog search failed (exhausted retries or rejected credentials).
    #[error(transparent)]
    Search(#[from] SearchError),

    /// A transfer failed outside the per-task containment, e.g. the
    /// download directory could not be created.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Failed to initialize an HTTP client.
    #[error("failed to initialize HTTP client: {0}")]
    Init(String),

    /// Failed to serialize the export payload.
    #[error("export serialization failed: {0}")]
    Export(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_converts() {
        let err: Error = ConfigError::MinOverlapOutOfRange(1.5).into();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_filesystem_errors_surface_through_transfer() {
        let source = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: Error = TransferError::Io {
            path: "/data/scenes".into(),
            source,
        }
        .into();
        assert!(matches!(err, Error::Transfer(_)));
    }

    #[test]
    fn test_error_display_passes_through() {
        let err: Error = GeometryError::UnsupportedProjection(27700).into();
        assert!(err.to_string().contains("27700"));
    }
}
