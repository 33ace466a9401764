//! Catalog feed parsing.
//!
//! The search endpoint answers with an OpenSearch-style JSON feed:
//!
//! ```json
//! {
//!   "feed": {
//!     "entry": [
//!       {
//!         "id": "uuid",
//!         "title": "S1A_IW_GRDH_...",
//!         "link": [{"href": "https://.../download"}],
//!         "str": [
//!           {"name": "footprint", "content": "POLYGON ((...))"},
//!           {"name": "producttype", "content": "GRD"},
//!           {"name": "sensoroperationalmode", "content": "IW"},
//!           {"name": "checksum", "content": "MD5:90A53F..."}
//!         ],
//!         "date": [{"name": "beginposition", "content": "2021-01-01T05:30:00.000Z"}],
//!         "int": [{"name": "size", "content": "1734461111"}]
//!       }
//!     ]
//!   }
//! }
//! ```
//!
//! A feed with a single entry may carry it as a bare object rather than a
//! one-element array; both shapes are accepted. A feed without an `entry`
//! member is an empty result, not an error.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use super::scene::{Checksum, ChecksumAlgorithm, Scene};
use crate::geometry;

/// Errors for malformed catalog responses.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The body was not the expected feed JSON.
    #[error("malformed catalog feed: {0}")]
    MalformedFeed(String),

    /// A required entry field is absent.
    #[error("entry '{id}' is missing required field '{field}'")]
    MissingField { id: String, field: &'static str },

    /// A timestamp did not parse as RFC 3339.
    #[error("entry '{id}' has unparseable timestamp '{value}'")]
    BadTimestamp { id: String, value: String },

    /// The footprint WKT did not parse as a polygon.
    #[error("entry '{id}' has unusable footprint: {reason}")]
    BadFootprint { id: String, reason: String },

    /// The declared size was not a non-negative integer.
    #[error("entry '{id}' has unparseable size '{value}'")]
    BadSize { id: String, value: String },

    /// The checksum declared an algorithm this client cannot verify.
    #[error("entry '{id}' declares unsupported checksum '{value}'")]
    UnsupportedChecksum { id: String, value: String },
}

#[derive(Deserialize)]
struct Feed {
    feed: FeedBody,
}

#[derive(Deserialize)]
struct FeedBody {
    #[serde(default)]
    entry: Option<OneOrMany<RawEntry>>,
}

/// Single-entry feeds ship the entry as a bare object.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

#[derive(Deserialize)]
struct RawEntry {
    id: String,
    title: String,
    #[serde(default)]
    link: Vec<RawLink>,
    #[serde(default)]
    str: Vec<RawField>,
    #[serde(default)]
    date: Vec<RawField>,
    #[serde(default)]
    int: Vec<RawField>,
}

#[derive(Deserialize)]
struct RawLink {
    href: String,
}

#[derive(Deserialize)]
struct RawField {
    name: String,
    /// Numbers arrive as strings in some catalog deployments and as JSON
    /// numbers in others.
    content: serde_json::Value,
}

/// Parses one page body into scene records.
pub fn parse_feed(body: &str) -> Result<Vec<Scene>, ParseError> {
    let feed: Feed =
        serde_json::from_str(body).map_err(|e| ParseError::MalformedFeed(e.to_string()))?;

    let entries = match feed.feed.entry {
        None => return Ok(Vec::new()),
        Some(OneOrMany::One(entry)) => vec![entry],
        Some(OneOrMany::Many(entries)) => entries,
    };

    entries.into_iter().map(parse_entry).collect()
}

fn parse_entry(entry: RawEntry) -> Result<Scene, ParseError> {
    let id = entry.id;

    let url = entry
        .link
        .first()
        .map(|l| l.href.clone())
        .ok_or(ParseError::MissingField {
            id: id.clone(),
            field: "link",
        })?;

    let fields = collect_fields(&entry.str, &entry.date, &entry.int);

    let footprint_wkt = require(&fields, &id, "footprint")?;
    let footprint = geometry::parse_wkt_polygon(&footprint_wkt).map_err(|e| {
        ParseError::BadFootprint {
            id: id.clone(),
            reason: e.to_string(),
        }
    })?;

    let acquired_raw = require(&fields, &id, "beginposition")?;
    let acquired = parse_timestamp(&acquired_raw).ok_or_else(|| ParseError::BadTimestamp {
        id: id.clone(),
        value: acquired_raw.clone(),
    })?;

    let size_raw = require(&fields, &id, "size")?;
    let size = size_raw
        .parse::<u64>()
        .map_err(|_| ParseError::BadSize {
            id: id.clone(),
            value: size_raw.clone(),
        })?;

    let checksum_raw = require(&fields, &id, "checksum")?;
    let checksum = parse_checksum(&checksum_raw).ok_or_else(|| ParseError::UnsupportedChecksum {
        id: id.clone(),
        value: checksum_raw.clone(),
    })?;

    Ok(Scene {
        title: entry.title,
        footprint,
        acquired,
        product_type: fields.get("producttype").cloned().unwrap_or_default(),
        sensor_mode: fields
            .get("sensoroperationalmode")
            .cloned()
            .unwrap_or_default(),
        url,
        size,
        checksum,
        id,
    })
}

/// Flattens the typed field arrays into one name → text map.
fn collect_fields(
    strs: &[RawField],
    dates: &[RawField],
    ints: &[RawField],
) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for field in strs.iter().chain(dates).chain(ints) {
        let text = match &field.content {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        fields.insert(field.name.to_ascii_lowercase(), text);
    }
    fields
}

fn require(
    fields: &HashMap<String, String>,
    id: &str,
    field: &'static str,
) -> Result<String, ParseError> {
    fields.get(field).cloned().ok_or(ParseError::MissingField {
        id: id.to_string(),
        field,
    })
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Checksums are declared as `ALGORITHM:HEXDIGEST`.
fn parse_checksum(value: &str) -> Option<Checksum> {
    let (label, digest) = value.split_once(':')?;
    let algorithm = ChecksumAlgorithm::parse(label.trim())?;
    let digest = digest.trim();
    if digest.is_empty() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(Checksum::new(algorithm, digest))
}
