//! Integration tests for the full harvest flow.
//!
//! These tests verify the complete pipeline over scripted network mocks:
//! - GeoJSON sites → per-site catalog search → merged scene list
//! - Overlap filtering against the loaded sites
//! - Concurrent download with checksum verification
//! - Idempotent re-runs and script export of the remainder
//!
//! Run with: `cargo test --test harvest_integration`

use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Read};
use std::path::Path;

use md5::{Digest, Md5};
use parking_lot::Mutex;
use tempfile::TempDir;

use scenefetch::catalog::{FetchError, Transport};
use scenefetch::download::{FetchStart, Fetcher, TransferError, TransferResult};
use scenefetch::{Credentials, ExportFormat, HarvestConfig, Harvester, SearchQuery};

// ============================================================================
// Network Mocks
// ============================================================================

/// Scripted catalog transport: pops one canned page per request.
struct ScriptedCatalog {
    pages: Mutex<VecDeque<String>>,
}

impl ScriptedCatalog {
    fn new(pages: Vec<String>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
        }
    }
}

impl Transport for ScriptedCatalog {
    fn get(&self, _url: &str, _credentials: &Credentials) -> Result<String, FetchError> {
        self.pages
            .lock()
            .pop_front()
            .ok_or_else(|| FetchError::Network("catalog script exhausted".into()))
    }
}

/// Download endpoint serving fixed bodies per URL, with range support.
struct ScriptedArchive {
    bodies: HashMap<String, Vec<u8>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedArchive {
    fn new(bodies: HashMap<String, Vec<u8>>) -> Self {
        Self {
            bodies,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl Fetcher for ScriptedArchive {
    fn fetch(
        &self,
        url: &str,
        _credentials: &Credentials,
        offset: u64,
    ) -> TransferResult<FetchStart> {
        self.calls.lock().push(url.to_string());
        let body = self
            .bodies
            .get(url)
            .ok_or_else(|| TransferError::Http(404))?;
        let start = (offset as usize).min(body.len());
        let reader: Box<dyn Read + Send> = Box::new(Cursor::new(body[start..].to_vec()));
        Ok(FetchStart {
            reader,
            resumed: offset > 0,
        })
    }
}

// ============================================================================
// Fixture Builders
// ============================================================================

/// Footprint covering the test site; scenes using it pass the filter.
const NEAR_FOOTPRINT: &str = "POLYGON ((13.0 52.0, 13.5 52.0, 13.5 52.5, 13.0 52.5, 13.0 52.0))";

/// Footprint far from every test site; scenes using it are filtered out.
const FAR_FOOTPRINT: &str = "POLYGON ((-40.0 -10.0, -39.0 -10.0, -39.0 -9.0, -40.0 -9.0, -40.0 -10.0))";

fn md5_hex(content: &[u8]) -> String {
    format!("{:x}", Md5::digest(content))
}

fn scene_url(id: &str) -> String {
    format!("https://archive.example.com/{id}/$value")
}

/// One catalog feed entry for a scene serving `content`.
fn entry(id: &str, title: &str, footprint: &str, content: &[u8]) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "title": title,
        "link": [{"href": scene_url(id)}],
        "str": [
            {"name": "footprint", "content": footprint},
            {"name": "producttype", "content": "GRD"},
            {"name": "sensoroperationalmode", "content": "IW"},
            {"name": "checksum", "content": format!("MD5:{}", md5_hex(content))}
        ],
        "date": [{"name": "beginposition", "content": "2021-03-14T05:26:30.000Z"}],
        "int": [{"name": "size", "content": content.len().to_string()}]
    })
}

fn feed(entries: Vec<serde_json::Value>) -> String {
    serde_json::json!({"feed": {"entry": entries}}).to_string()
}

/// Two sites: "inner" inside the near footprint, "remote" far from both.
const SITES_GEOJSON: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {
            "type": "Feature",
            "properties": {"name": "inner"},
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[13.1, 52.1], [13.2, 52.1], [13.2, 52.2], [13.1, 52.2], [13.1, 52.1]]]
            }
        },
        {
            "type": "Feature",
            "properties": {"name": "remote"},
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[100.0, 10.0], [101.0, 10.0], [101.0, 11.0], [100.0, 11.0], [100.0, 10.0]]]
            }
        }
    ]
}"#;

fn test_config(download_dir: &Path) -> HarvestConfig {
    let mut config = HarvestConfig::new(
        Credentials::new("user", "pass"),
        "https://catalog.example.com/api",
    );
    config.search.page_size = 2;
    config.filter.min_overlap = 0.5;
    config.download.download_dir = download_dir.to_path_buf();
    config.download.min_scene_size = 1;
    config.download.concurrency = 2;
    config
}

// ============================================================================
// Integration Tests
// ============================================================================

/// The complete flow: load sites, search with pagination, filter by
/// overlap, download with verification, and confirm the export remainder
/// is empty.
#[test]
fn test_full_harvest_flow() {
    let dir = TempDir::new().unwrap();
    let content_a = b"scene-a-content".to_vec();
    let content_b = b"scene-b-content".to_vec();
    let content_c = b"scene-c-content".to_vec();

    // Query for site "inner" paginates: a full page of two entries, then a
    // short page. Query for site "remote" returns a single page repeating
    // scene "a", which the merge must drop.
    let catalog = ScriptedCatalog::new(vec![
        feed(vec![
            entry("a", "S1A_IW_GRDH_20210314T052630_A", NEAR_FOOTPRINT, &content_a),
            entry("b", "S1A_IW_GRDH_20210301T120000_B", FAR_FOOTPRINT, &content_b),
        ]),
        feed(vec![entry(
            "c",
            "S1A_IW_GRDH_20210220T090000_C",
            NEAR_FOOTPRINT,
            &content_c,
        )]),
        feed(vec![entry(
            "a",
            "S1A_IW_GRDH_20210314T052630_A",
            NEAR_FOOTPRINT,
            &content_a,
        )]),
    ]);
    let archive = ScriptedArchive::new(HashMap::from([
        (scene_url("a"), content_a.clone()),
        (scene_url("c"), content_c.clone()),
    ]));

    let mut harvester = Harvester::with_clients(catalog, archive, test_config(dir.path()));
    harvester
        .load_sites(SITES_GEOJSON)
        .expect("sites should load");
    assert_eq!(harvester.sites().len(), 2);

    let found = harvester
        .search(&SearchQuery::builder("S1A*"))
        .expect("search should succeed");
    assert_eq!(found, 3, "three distinct scenes across both site queries");

    // Titles sort by their embedded acquisition timestamp.
    let titles = harvester.sorted_titles();
    assert_eq!(
        titles,
        [
            "S1A_IW_GRDH_20210220T090000_C",
            "S1A_IW_GRDH_20210301T120000_B",
            "S1A_IW_GRDH_20210314T052630_A",
        ]
    );

    // Scene "b" is far from every site and falls below min_overlap.
    let retained = harvester.filter().unwrap();
    assert_eq!(retained, 2, "only scenes covering a site survive");

    let summary = harvester.download().expect("batch should run");
    assert_eq!(summary.complete, 2, "both retained scenes should download");
    assert_eq!(summary.failed, 0);

    // Completed files carry the verified content under their derived names.
    let file_a = dir.path().join("S1A_IW_GRDH_20210314T052630_A.zip");
    let file_c = dir.path().join("S1A_IW_GRDH_20210220T090000_C.zip");
    assert_eq!(std::fs::read(&file_a).unwrap(), content_a);
    assert_eq!(std::fs::read(&file_c).unwrap(), content_c);

    // Nothing left to export once everything completed.
    let script = harvester.export(ExportFormat::Wget).unwrap();
    assert_eq!(script.trim(), "", "no pending or failed tasks remain");

    let report = harvester.report();
    assert_eq!(report.found, 3);
    assert_eq!(report.retained, 2);
    assert_eq!(report.downloads.unwrap().complete, 2);
}

/// Re-running a harvest against a populated download directory schedules
/// nothing: the existing-file check recognizes completed scenes by name
/// and size.
#[test]
fn test_second_run_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let content = b"idempotent-scene".to_vec();
    let pages = vec![feed(vec![entry(
        "a",
        "S1A_IW_GRDH_20210314T052630_A",
        NEAR_FOOTPRINT,
        &content,
    )])];

    let run = |pages: Vec<String>| {
        let catalog = ScriptedCatalog::new(pages);
        let archive =
            ScriptedArchive::new(HashMap::from([(scene_url("a"), content.clone())]));
        let mut harvester =
            Harvester::with_clients(catalog, archive, test_config(dir.path()));
        harvester
            .set_geometry(
                "inner",
                "POLYGON ((13.1 52.1, 13.2 52.1, 13.2 52.2, 13.1 52.2, 13.1 52.1))",
            )
            .unwrap();
        harvester.search(&SearchQuery::builder("S1A*")).unwrap();
        harvester.filter().unwrap();
        harvester.download().unwrap()
    };

    let first = run(pages.clone());
    assert_eq!(first.complete, 1);

    let second = run(pages);
    assert_eq!(second.complete, 0, "no task should be scheduled");
    assert_eq!(second.failed, 0);
    assert_eq!(second.pending, 0);
}

/// A scene whose archive endpoint keeps failing ends up Failed without
/// sinking the batch, and the export script covers exactly the remainder.
#[test]
fn test_failed_scene_is_contained_and_exported() {
    let dir = TempDir::new().unwrap();
    let content_ok = b"healthy-scene".to_vec();
    let content_gone = b"missing-scene".to_vec();

    // A full page signals "maybe more", so the script ends with an empty
    // short page to terminate pagination.
    let catalog = ScriptedCatalog::new(vec![
        feed(vec![
            entry("ok", "S1A_IW_GRDH_20210314T052630_OK", NEAR_FOOTPRINT, &content_ok),
            entry("gone", "S1A_IW_GRDH_20210301T120000_GONE", NEAR_FOOTPRINT, &content_gone),
        ]),
        feed(vec![]),
    ]);
    // Only "ok" is actually served; "gone" answers 404 on every attempt.
    let archive = ScriptedArchive::new(HashMap::from([(scene_url("ok"), content_ok.clone())]));

    let mut config = test_config(dir.path());
    config.download.retry.max_attempts = 2;
    config.download.retry.initial_delay = std::time::Duration::from_millis(1);

    let mut harvester = Harvester::with_clients(catalog, archive, config);
    harvester
        .set_geometry(
            "inner",
            "POLYGON ((13.1 52.1, 13.2 52.1, 13.2 52.2, 13.1 52.2, 13.1 52.1))",
        )
        .unwrap();
    harvester.search(&SearchQuery::builder("S1A*")).unwrap();
    harvester.filter().unwrap();

    let summary = harvester.download().expect("batch itself should not fail");
    assert_eq!(summary.complete, 1);
    assert_eq!(summary.failed, 1, "the unreachable scene fails in isolation");

    let script = harvester.export(ExportFormat::Wget).unwrap();
    let lines: Vec<&str> = script.lines().collect();
    assert_eq!(lines.len(), 1, "export covers exactly the failed scene");
    assert!(lines[0].contains(&scene_url("gone")));
    assert!(lines[0].contains("--user=\"user\""));
    assert!(
        lines[0].contains("S1A_IW_GRDH_20210301T120000_GONE.zip"),
        "output path uses the derived filename"
    );
}

/// An interrupted transfer resumes from the flushed partial file instead
/// of restarting, and the resumed download still verifies.
#[test]
fn test_interrupted_download_resumes() {
    let dir = TempDir::new().unwrap();
    let content = b"0123456789abcdefghij".to_vec();

    /// Archive whose first response dies mid-stream.
    struct FlakyArchive {
        inner: ScriptedArchive,
        fail_first: Mutex<bool>,
    }

    impl Fetcher for FlakyArchive {
        fn fetch(
            &self,
            url: &str,
            credentials: &Credentials,
            offset: u64,
        ) -> TransferResult<FetchStart> {
            let start = self.inner.fetch(url, credentials, offset)?;
            let mut fail_first = self.fail_first.lock();
            if *fail_first {
                *fail_first = false;
                let mut body = vec![0u8; 8];
                let mut reader = start.reader;
                reader.read_exact(&mut body).map_err(|e| {
                    TransferError::Network(format!("mock read failed: {e}"))
                })?;
                let reader: Box<dyn Read + Send> = Box::new(
                    Cursor::new(body).chain(BrokenReader),
                );
                return Ok(FetchStart {
                    reader,
                    resumed: start.resumed,
                });
            }
            Ok(start)
        }
    }

    /// Reader that always fails, simulating a dropped connection.
    struct BrokenReader;

    impl Read for BrokenReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            ))
        }
    }

    let catalog = ScriptedCatalog::new(vec![feed(vec![entry(
        "r",
        "S1A_IW_GRDH_20210314T052630_R",
        NEAR_FOOTPRINT,
        &content,
    )])]);
    let archive = FlakyArchive {
        inner: ScriptedArchive::new(HashMap::from([(scene_url("r"), content.clone())])),
        fail_first: Mutex::new(true),
    };

    let mut config = test_config(dir.path());
    config.download.retry.initial_delay = std::time::Duration::from_millis(1);

    let mut harvester = Harvester::with_clients(catalog, archive, config);
    harvester
        .set_geometry(
            "inner",
            "POLYGON ((13.1 52.1, 13.2 52.1, 13.2 52.2, 13.1 52.2, 13.1 52.1))",
        )
        .unwrap();
    harvester.search(&SearchQuery::builder("S1A*")).unwrap();
    harvester.filter().unwrap();

    let summary = harvester.download().expect("batch should run");
    assert_eq!(summary.complete, 1, "resumed transfer should complete");

    let file = dir.path().join("S1A_IW_GRDH_20210314T052630_R.zip");
    assert_eq!(
        std::fs::read(&file).unwrap(),
        content,
        "resumed file must match the full content"
    );
}

/// Exporting before any download plans the retained scenes, so callers can
/// hand off the whole batch to an external downloader.
#[test]
fn test_export_without_download() {
    let dir = TempDir::new().unwrap();
    let content = b"exported-scene".to_vec();

    let catalog = ScriptedCatalog::new(vec![feed(vec![entry(
        "a",
        "S1A_IW_GRDH_20210314T052630_A",
        NEAR_FOOTPRINT,
        &content,
    )])]);
    let archive = ScriptedArchive::new(HashMap::new());

    let mut harvester = Harvester::with_clients(catalog, archive, test_config(dir.path()));
    harvester
        .set_geometry(
            "inner",
            "POLYGON ((13.1 52.1, 13.2 52.1, 13.2 52.2, 13.1 52.2, 13.1 52.1))",
        )
        .unwrap();
    harvester.search(&SearchQuery::builder("S1A*")).unwrap();
    harvester.filter().unwrap();

    let json = harvester.export(ExportFormat::Json).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.as_array().unwrap().len(), 1);
    assert_eq!(parsed[0]["id"], "a");
    assert_eq!(parsed[0]["url"], scene_url("a"));

    // No transfer happened.
    assert!(harvester.report().downloads.is_none());
}
