//! HTTP transport abstraction for the catalog search protocol.
//!
//! The trait exists for dependency injection: tests drive the search
//! client with scripted responses instead of a live catalog.

use std::time::Duration;

use thiserror::Error;

use crate::config::Credentials;

/// Errors from a single catalog request.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The catalog explicitly rejected the credentials. Never retried.
    #[error("authentication rejected (HTTP {0})")]
    Unauthorized(u16),

    /// Any other non-success HTTP status.
    #[error("catalog returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Connection-level failure (DNS, timeout, reset).
    #[error("network error: {0}")]
    Network(String),
}

/// Trait for catalog page fetches.
pub trait Transport: Send + Sync {
    /// Performs an authenticated GET and returns the response body.
    fn get(&self, url: &str, credentials: &Credentials) -> Result<String, FetchError>;
}

/// Real transport backed by a blocking reqwest client.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &str, credentials: &Credentials) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .basic_auth(&credentials.username, Some(&credentials.password))
            .send()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(FetchError::Unauthorized(status.as_u16()));
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(FetchError::Http {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        response
            .text()
            .map_err(|e| FetchError::Network(format!("failed to read response: {e}")))
    }
}
