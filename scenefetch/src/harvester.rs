//! Top-level facade tying search, filtering, and download together.
//!
//! A [`Harvester`] owns the site store and the accumulated scene list, so
//! successive searches merge into one result set before filtering. The
//! usual flow is `load_sites` (or `set_geometry`), one or more `search`
//! calls, `filter`, then `download` or `export`.

use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use tracing::info;

use crate::catalog::{CatalogClient, ReqwestTransport, Scene, Transport};
use crate::config::HarvestConfig;
use crate::download::{
    DownloadManager, DownloadSummary, DownloadTask, Fetcher, ReqwestFetcher,
};
use crate::error::{Error, Result};
use crate::export::{export_tasks, ExportFormat};
use crate::geometry::SiteStore;
use crate::overlap::{filter_scenes, ScoredScene};
use crate::query::QueryBuilder;

/// Harvester over the production HTTP stack.
pub type HttpHarvester = Harvester<ReqwestTransport, ReqwestFetcher>;

/// Counts reported at the end of a run.
#[derive(Clone, Copy, Debug, Default)]
pub struct HarvestReport {
    /// Scenes found across all searches, after cross-query merging.
    pub found: usize,
    /// Scenes retained by the overlap filter.
    pub retained: usize,
    /// Download counts, present once a batch has run.
    pub downloads: Option<DownloadSummary>,
}

/// Search, filter, and download scenes for a set of sites.
pub struct Harvester<T: Transport, F: Fetcher> {
    config: HarvestConfig,
    sites: SiteStore,
    client: CatalogClient<T>,
    manager: DownloadManager<F>,
    scenes: Vec<Scene>,
    retained: Vec<ScoredScene>,
    tasks: Vec<DownloadTask>,
    last_summary: Option<DownloadSummary>,
}

impl Harvester<ReqwestTransport, ReqwestFetcher> {
    /// Builds a harvester backed by real HTTP clients.
    pub fn connect(config: HarvestConfig) -> Result<Self> {
        let transport =
            ReqwestTransport::new(config.search.timeout).map_err(|e| Error::Init(e.to_string()))?;
        let fetcher =
            ReqwestFetcher::new(config.download.timeout).map_err(|e| Error::Init(e.to_string()))?;
        Ok(Self::with_clients(transport, fetcher, config))
    }
}

impl<T: Transport, F: Fetcher> Harvester<T, F> {
    /// Builds a harvester over caller-supplied transport and fetcher.
    pub fn with_clients(transport: T, fetcher: F, config: HarvestConfig) -> Self {
        let client = CatalogClient::new(
            transport,
            config.credentials.clone(),
            config.search.clone(),
        );
        let manager = DownloadManager::new(
            fetcher,
            config.credentials.clone(),
            config.download.clone(),
        );
        Self {
            config,
            sites: SiteStore::new(),
            client,
            manager,
            scenes: Vec::new(),
            retained: Vec::new(),
            tasks: Vec::new(),
            last_summary: None,
        }
    }

    /// Loads sites from a GeoJSON feature collection, merging into any
    /// sites already present.
    pub fn load_sites(&mut self, geojson: &str) -> Result<()> {
        let loaded = SiteStore::from_geojson(geojson)?;
        for site in loaded.iter() {
            self.sites.insert(site.clone())?;
        }
        Ok(())
    }

    /// Adds one site from a WKT polygon already in WGS84.
    pub fn set_geometry(&mut self, id: impl Into<String>, wkt: &str) -> Result<()> {
        self.sites.set_geometry(id, wkt)?;
        Ok(())
    }

    pub fn sites(&self) -> &SiteStore {
        &self.sites
    }

    /// Runs the query once per site, constrained to each site's bounding
    /// box, and merges the results by scene identifier. With no sites
    /// loaded the query runs once, unconstrained.
    ///
    /// Returns the number of scenes newly added to the result set.
    pub fn search(&mut self, query: &QueryBuilder) -> Result<usize> {
        let queries = if self.sites.is_empty() {
            vec![query.clone().build()?]
        } else {
            self.sites
                .iter()
                .map(|site| query.clone().footprint(site.polygon.clone()).build())
                .collect::<std::result::Result<Vec<_>, _>>()?
        };

        let before = self.scenes.len();
        let mut known: HashSet<String> = self.scenes.iter().map(|s| s.id.clone()).collect();
        for query in &queries {
            for scene in self.client.search(query) {
                let scene = scene?;
                if known.insert(scene.id.clone()) {
                    self.scenes.push(scene);
                }
            }
        }

        let added = self.scenes.len() - before;
        info!(
            added,
            total = self.scenes.len(),
            queries = queries.len(),
            "search complete"
        );
        Ok(added)
    }

    /// All scenes found so far, across every search.
    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    /// Scene titles sorted by their embedded acquisition timestamp
    /// (`YYYYMMDDTHHMMSS`); titles without one sort by full title at the
    /// end.
    pub fn sorted_titles(&self) -> Vec<String> {
        static TIMESTAMP: OnceLock<Regex> = OnceLock::new();
        let timestamp = TIMESTAMP.get_or_init(|| Regex::new("[0-9T]{15}").unwrap());

        let mut titles: Vec<String> = self.scenes.iter().map(|s| s.title.clone()).collect();
        titles.sort_by_cached_key(|title| match timestamp.find(title) {
            Some(found) => (0, found.as_str().to_string(), title.clone()),
            None => (1, String::new(), title.clone()),
        });
        titles
    }

    /// Serializes the collected scene metadata as a JSON array, one record
    /// per scene found so far.
    pub fn scenes_json(&self) -> Result<String> {
        #[derive(serde::Serialize)]
        struct SceneRecord<'a> {
            id: &'a str,
            title: &'a str,
            acquired: String,
            product_type: &'a str,
            sensor_mode: &'a str,
            url: &'a str,
            size: u64,
        }

        let records: Vec<SceneRecord<'_>> = self
            .scenes
            .iter()
            .map(|s| SceneRecord {
                id: &s.id,
                title: &s.title,
                acquired: s.acquired.to_rfc3339(),
                product_type: &s.product_type,
                sensor_mode: &s.sensor_mode,
                url: &s.url,
                size: s.size,
            })
            .collect();
        Ok(serde_json::to_string_pretty(&records)?)
    }

    /// Scores the accumulated scenes against the sites and retains those
    /// reaching the configured minimum overlap. Returns the retained count.
    ///
    /// Fails with `ConfigError` when the configured threshold lies outside
    /// [0, 1].
    pub fn filter(&mut self) -> Result<usize> {
        self.retained =
            filter_scenes(self.scenes.iter().cloned(), &self.sites, &self.config.filter)?;
        info!(
            found = self.scenes.len(),
            retained = self.retained.len(),
            "overlap filter complete"
        );
        Ok(self.retained.len())
    }

    /// Retained scenes with their per-site overlap ratios.
    pub fn retained(&self) -> &[ScoredScene] {
        &self.retained
    }

    /// Shared cancellation flag for in-flight downloads.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.manager.cancel_flag()
    }

    /// Plans and runs the download batch over the retained scenes.
    pub fn download(&mut self) -> Result<DownloadSummary> {
        let plan = self.manager.plan(self.retained.iter().cloned())?;
        let outcome = self
            .manager
            .download_all(plan.tasks, self.config.download.concurrency);
        self.tasks = outcome.tasks;
        self.last_summary = Some(outcome.summary);
        Ok(outcome.summary)
    }

    /// Exports the tasks that still need downloading.
    ///
    /// Before any batch has run, this plans the retained scenes (applying
    /// the existing-file dedup) and exports the resulting tasks; afterwards
    /// it exports the pending and failed remainder of the last batch.
    pub fn export(&self, format: ExportFormat) -> Result<String> {
        let planned;
        let tasks: &[DownloadTask] = if self.tasks.is_empty() {
            planned = self.manager.plan(self.retained.iter().cloned())?.tasks;
            &planned
        } else {
            &self.tasks
        };
        Ok(export_tasks(tasks, &self.config.credentials, format)?)
    }

    /// Run counts for the final summary line.
    pub fn report(&self) -> HarvestReport {
        HarvestReport {
            found: self.scenes.len(),
            retained: self.retained.len(),
            downloads: self.last_summary,
        }
    }
}
