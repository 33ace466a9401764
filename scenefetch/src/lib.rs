//! Scene search and download for Earth-observation catalogs.
//!
//! `scenefetch` queries an OpenSearch-style scene catalog, filters the
//! results by geometric overlap with a set of named sites, and downloads
//! the retained scenes concurrently with resumption and checksum
//! verification. Scenes already present locally are never downloaded
//! twice, so an interrupted run can simply be repeated.
//!
//! The [`Harvester`] facade wires the components together:
//!
//! ```no_run
//! use scenefetch::{Credentials, ExportFormat, HarvestConfig, HttpHarvester, SearchQuery};
//!
//! # fn main() -> scenefetch::Result<()> {
//! let config = HarvestConfig::new(
//!     Credentials::new("user", "pass"),
//!     "https://catalog.example.com/api",
//! );
//! let mut harvester = HttpHarvester::connect(config)?;
//! harvester.set_geometry("berlin", "POLYGON ((13.0 52.3, 13.8 52.3, 13.8 52.7, 13.0 52.7, 13.0 52.3))")?;
//! harvester.search(&SearchQuery::builder("S1A*"))?;
//! harvester.filter()?;
//! let summary = harvester.download()?;
//! println!("{} complete, {} failed", summary.complete, summary.failed);
//! # Ok(())
//! # }
//! ```
//!
//! Every component is also usable on its own; the catalog client, overlap
//! filter, and download manager take explicit configuration structs and
//! talk to the network only through injectable traits.

pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod export;
pub mod geometry;
pub mod harvester;
pub mod overlap;
pub mod query;

pub use catalog::{CatalogClient, Scene, SceneStream, SearchError};
pub use config::{Credentials, DownloadConfig, FilterConfig, HarvestConfig, RetryConfig, SearchConfig};
pub use download::{DownloadManager, DownloadSummary, DownloadTask, TaskState};
pub use error::{Error, Result};
pub use export::{export_tasks, ExportFormat};
pub use geometry::{Site, SiteStore};
pub use harvester::{Harvester, HarvestReport, HttpHarvester};
pub use overlap::{filter_scenes, OverlapDenominator, ScoredScene};
pub use query::{DateField, QueryBuilder, SearchQuery};
