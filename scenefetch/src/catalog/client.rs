//! Paginated catalog search client.
//!
//! `search()` returns a lazy [`SceneStream`]: pages are fetched on demand
//! as the caller consumes scenes, in server page order. The stream is
//! finite and non-restartable; once it yields an error or runs dry it
//! stays done.

use std::collections::HashSet;
use std::collections::VecDeque;
use std::thread;

use thiserror::Error;
use tracing::{debug, warn};

use super::parse::{parse_feed, ParseError};
use super::scene::Scene;
use super::transport::{FetchError, Transport};
use crate::config::{Credentials, SearchConfig};
use crate::query::SearchQuery;

/// Errors from a catalog search.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The catalog rejected the credentials; not retried.
    #[error("authentication rejected by catalog")]
    Unauthorized,

    /// Transient failures exhausted the retry budget.
    #[error("search failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    /// The catalog answered with something unparseable.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Pagination state for one query execution.
///
/// Discarded once the owning [`SceneStream`] is dropped.
#[derive(Debug, Default)]
pub struct SearchSession {
    /// Next page's start offset.
    offset: usize,
    /// Scenes yielded so far.
    collected: usize,
    /// Identifiers seen so far; protects against server-side page overlap.
    seen: HashSet<String>,
    /// Set once the server signals the end or a cap is reached.
    exhausted: bool,
}

impl SearchSession {
    /// Number of scenes yielded so far.
    pub fn collected(&self) -> usize {
        self.collected
    }
}

/// Search client for the remote catalog.
pub struct CatalogClient<T: Transport> {
    transport: T,
    credentials: Credentials,
    config: SearchConfig,
}

impl<T: Transport> CatalogClient<T> {
    pub fn new(transport: T, credentials: Credentials, config: SearchConfig) -> Self {
        Self {
            transport,
            credentials,
            config,
        }
    }

    /// Executes a query lazily. Consuming the returned stream drives the
    /// pagination; a query matching nothing yields an empty stream, not an
    /// error.
    pub fn search(&self, query: &SearchQuery) -> SceneStream<'_, T> {
        SceneStream {
            client: self,
            query: query.clone(),
            session: SearchSession::default(),
            buffer: VecDeque::new(),
            failed: false,
        }
    }

    /// Builds the request URL for one page.
    fn page_url(&self, query: &SearchQuery, offset: usize) -> String {
        format!(
            "{}/search?format=json&rows={}&start={}&q={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.page_size,
            offset,
            query.render(),
        )
    }

    /// Fetches one page with bounded retries and exponential backoff.
    /// An explicit authentication rejection fails immediately.
    fn fetch_page(&self, query: &SearchQuery, offset: usize) -> Result<String, SearchError> {
        let url = self.page_url(query, offset);
        let mut failures = 0;
        loop {
            match self.transport.get(&url, &self.credentials) {
                Ok(body) => return Ok(body),
                Err(FetchError::Unauthorized(status)) => {
                    warn!(status, "catalog rejected credentials");
                    return Err(SearchError::Unauthorized);
                }
                Err(err) => {
                    failures += 1;
                    match self.config.retry.delay_for_attempt(failures) {
                        Some(delay) => {
                            warn!(
                                offset,
                                attempt = failures,
                                delay_ms = delay.as_millis() as u64,
                                error = %err,
                                "page fetch failed, backing off"
                            );
                            thread::sleep(delay);
                        }
                        None => {
                            return Err(SearchError::RetriesExhausted {
                                attempts: failures,
                                last: err.to_string(),
                            })
                        }
                    }
                }
            }
        }
    }
}

/// Lazy, finite, non-restartable sequence of scenes.
pub struct SceneStream<'a, T: Transport> {
    client: &'a CatalogClient<T>,
    query: SearchQuery,
    session: SearchSession,
    buffer: VecDeque<Scene>,
    failed: bool,
}

impl<T: Transport> SceneStream<'_, T> {
    /// Pagination state, mainly for diagnostics.
    pub fn session(&self) -> &SearchSession {
        &self.session
    }

    fn fill_buffer(&mut self) -> Result<(), SearchError> {
        let page_size = self.client.config.page_size;
        let body = self.client.fetch_page(&self.query, self.session.offset)?;
        let scenes = parse_feed(&body)?;
        let fetched = scenes.len();

        for scene in scenes {
            if !self.session.seen.insert(scene.id.clone()) {
                debug!(id = %scene.id, "dropping duplicate scene across pages");
                continue;
            }
            if let Some(cap) = self.client.config.max_results {
                if self.session.collected + self.buffer.len() >= cap {
                    self.session.exhausted = true;
                    break;
                }
            }
            self.buffer.push_back(scene);
        }

        // Fewer entries than requested means the server ran out.
        if fetched < page_size {
            self.session.exhausted = true;
        }
        self.session.offset += page_size;
        Ok(())
    }
}

impl<T: Transport> Iterator for SceneStream<'_, T> {
    type Item = Result<Scene, SearchError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(scene) = self.buffer.pop_front() {
                self.session.collected += 1;
                return Some(Ok(scene));
            }
            if self.failed || self.session.exhausted {
                return None;
            }
            if let Err(err) = self.fill_buffer() {
                self.failed = true;
                return Some(Err(err));
            }
        }
    }
}
