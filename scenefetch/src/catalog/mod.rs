//! Catalog search: query execution, pagination, and feed parsing.

mod client;
mod parse;
mod scene;
mod transport;

pub use client::{CatalogClient, SceneStream, SearchError, SearchSession};
pub use parse::{parse_feed, ParseError};
pub use scene::{Checksum, ChecksumAlgorithm, Scene};
pub use transport::{FetchError, ReqwestTransport, Transport};

#[cfg(test)]
pub(crate) use parse::tests::{make_entry, make_feed};
#[cfg(test)]
pub(crate) use transport::tests::MockTransport;
