//! Catalog query construction.
//!
//! Turns a product-name pattern, an open-ended keyword-filter map, and an
//! optional date range into the canonical, ordered list of filter terms the
//! search client renders into the request. Pure code: no network, no state.
//!
//! Unrecognized keyword filters are passed through verbatim in sorted
//! order; the catalog protocol, not this module, defines their legality.

use chrono::{DateTime, Utc};
use geo::BoundingRect;
use geo_types::Polygon;
use thiserror::Error;

/// Result type for query construction.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors for invalid parameter combinations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The date range ends before it starts.
    #[error("date range starts at {start} but ends earlier at {end}")]
    InvertedDateRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// Minimum overlap must lie in [0, 1].
    #[error("min_overlap {0} is outside [0, 1]")]
    MinOverlapOutOfRange(f64),

    /// A query needs a non-empty product pattern.
    #[error("product pattern must not be empty")]
    EmptyPattern,
}

/// Which timestamp a date-range filter constrains.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateField {
    /// Acquisition start time.
    BeginPosition,
    /// Acquisition end time.
    EndPosition,
    /// Time the product entered the catalog.
    IngestionDate,
}

impl DateField {
    /// Protocol-level field name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DateField::BeginPosition => "beginposition",
            DateField::EndPosition => "endposition",
            DateField::IngestionDate => "ingestiondate",
        }
    }
}

/// Inclusive date range over a selectable date field.
#[derive(Clone, Debug)]
pub struct DateRange {
    pub field: DateField,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// One term of the canonical query, in final order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterTerm {
    pub name: String,
    pub value: String,
}

/// An immutable search query.
///
/// Construct via [`SearchQuery::builder`]; validation happens in
/// [`QueryBuilder::build`].
#[derive(Clone, Debug)]
pub struct SearchQuery {
    pattern: String,
    keywords: Vec<(String, String)>,
    date_range: Option<DateRange>,
    footprint: Option<Polygon<f64>>,
}

impl SearchQuery {
    /// Starts building a query for the given product-name pattern
    /// (wildcards allowed, e.g. `S1A*`).
    pub fn builder(pattern: impl Into<String>) -> QueryBuilder {
        QueryBuilder {
            pattern: pattern.into(),
            keywords: Vec::new(),
            date_range: None,
            footprint: None,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Canonical ordered term list: pattern, date range, footprint
    /// constraint, then keyword filters sorted by name.
    pub fn terms(&self) -> Vec<FilterTerm> {
        let mut terms = vec![FilterTerm {
            name: "pattern".into(),
            value: self.pattern.clone(),
        }];

        if let Some(range) = &self.date_range {
            terms.push(FilterTerm {
                name: range.field.as_str().into(),
                value: format!(
                    "[{} TO {}]",
                    range.start.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                    range.end.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                ),
            });
        }

        if let Some(polygon) = &self.footprint {
            if let Some(bbox) = polygon.bounding_rect() {
                let (min, max) = (bbox.min(), bbox.max());
                terms.push(FilterTerm {
                    name: "footprint".into(),
                    value: format!(
                        "\"Intersects(POLYGON (({minx} {miny}, {maxx} {miny}, {maxx} {maxy}, \
                         {minx} {maxy}, {minx} {miny})))\"",
                        minx = min.x,
                        miny = min.y,
                        maxx = max.x,
                        maxy = max.y,
                    ),
                });
            }
        }

        let mut keywords = self.keywords.clone();
        keywords.sort();
        for (name, value) in keywords {
            terms.push(FilterTerm { name, value });
        }
        terms
    }

    /// Renders the query string the catalog expects: terms joined with
    /// ` AND `, the pattern standing alone and every other term as
    /// `(name:value)`.
    pub fn render(&self) -> String {
        self.terms()
            .iter()
            .map(|term| {
                if term.name == "pattern" {
                    term.value.clone()
                } else {
                    format!("({}:{})", term.name, term.value)
                }
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

/// Builder for [`SearchQuery`].
#[derive(Clone, Debug)]
pub struct QueryBuilder {
    pattern: String,
    keywords: Vec<(String, String)>,
    date_range: Option<DateRange>,
    footprint: Option<Polygon<f64>>,
}

impl QueryBuilder {
    /// Adds a keyword filter, passed through to the protocol verbatim.
    pub fn keyword(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.keywords.push((name.into(), value.into()));
        self
    }

    /// Constrains the selected date field to `[start, end]`.
    pub fn date_range(mut self, field: DateField, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.date_range = Some(DateRange { field, start, end });
        self
    }

    /// Constrains results to footprints intersecting this polygon's
    /// bounding box.
    pub fn footprint(mut self, polygon: Polygon<f64>) -> Self {
        self.footprint = Some(polygon);
        self
    }

    /// Validates and produces the immutable query.
    pub fn build(self) -> ConfigResult<SearchQuery> {
        if self.pattern.is_empty() {
            return Err(ConfigError::EmptyPattern);
        }
        if let Some(range) = &self.date_range {
            if range.start > range.end {
                return Err(ConfigError::InvertedDateRange {
                    start: range.start,
                    end: range.end,
                });
            }
        }
        Ok(SearchQuery {
            pattern: self.pattern,
            keywords: self.keywords,
            date_range: self.date_range,
            footprint: self.footprint,
        })
    }
}
