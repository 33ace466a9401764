//! Scene records produced by the search client.

use chrono::{DateTime, Utc};
use geo_types::Polygon;

/// Checksum algorithms the catalog protocol may declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha256,
}

impl ChecksumAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Md5 => "MD5",
            ChecksumAlgorithm::Sha256 => "SHA-256",
        }
    }

    /// Case-insensitive parse of the protocol's algorithm label.
    pub fn parse(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "md5" => Some(ChecksumAlgorithm::Md5),
            "sha256" | "sha-256" => Some(ChecksumAlgorithm::Sha256),
            _ => None,
        }
    }
}

/// A declared checksum: algorithm plus lowercase hex digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Checksum {
    pub algorithm: ChecksumAlgorithm,
    pub digest: String,
}

impl Checksum {
    pub fn new(algorithm: ChecksumAlgorithm, digest: impl Into<String>) -> Self {
        Self {
            algorithm,
            digest: digest.into().to_ascii_lowercase(),
        }
    }

    /// Compares against a computed hex digest, case-insensitively.
    pub fn matches(&self, computed: &str) -> bool {
        self.digest.eq_ignore_ascii_case(computed)
    }
}

/// One discoverable remote data product, created from a single catalog
/// entry. Read-only after parsing.
#[derive(Clone, Debug)]
pub struct Scene {
    /// Catalog-unique identifier.
    pub id: String,
    /// Product title; the local filename is derived from it.
    pub title: String,
    /// Ground-coverage polygon, WGS84.
    pub footprint: Polygon<f64>,
    /// Acquisition start timestamp.
    pub acquired: DateTime<Utc>,
    /// Product-type tag (e.g. `GRD`). Empty if the catalog omits it.
    pub product_type: String,
    /// Sensor-mode tag (e.g. `IW`). Empty if the catalog omits it.
    pub sensor_mode: String,
    /// Download URL.
    pub url: String,
    /// Declared size in bytes.
    pub size: u64,
    /// Declared checksum of the complete file.
    pub checksum: Checksum,
}

impl Scene {
    /// Deterministic local filename for this scene, stable across runs.
    ///
    /// Path separators and other filesystem-hostile characters in the
    /// title are replaced so the name stays a single path component.
    pub fn filename(&self) -> String {
        let stem: String = self
            .title
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                other => other,
            })
            .collect();
        format!("{stem}.zip")
    }
}
