//! Site geometry store.
//!
//! Holds named area-of-interest polygons, normalized to the fixed
//! geographic reference frame (longitude/latitude, WGS84 / EPSG:4326)
//! at load time. Overlap filtering never reprojects lazily; everything in
//! the store is already in the reference frame.
//!
//! Two input paths exist:
//! - [`SiteStore::from_geojson`] parses a GeoJSON-style feature collection
//!   with an optional legacy `crs` member declaring the source projection.
//!   EPSG:4326 passes through, EPSG:3857 is reprojected via the inverse
//!   Web Mercator transform, anything else is rejected.
//! - [`SiteStore::set_geometry`] accepts a WKT polygon that must already be
//!   in WGS84.

use std::collections::HashMap;
use std::f64::consts::PI;

use geo::{Area, Validation};
use geo_types::{Coord, MultiPolygon, Polygon};
use thiserror::Error;
use tracing::debug;
use wkt::TryFromWkt;

/// Earth radius used by the spherical Web Mercator projection, in meters.
const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Minimum accepted site area, in squared degrees.
///
/// Sites below this are rejected at load time so that overlap ratios never
/// divide by a near-zero area.
pub const MIN_SITE_AREA_DEG2: f64 = 1e-10;

/// EPSG code of the fixed reference frame.
pub const REFERENCE_EPSG: u32 = 4326;

/// Result type for geometry operations.
pub type GeometryResult<T> = Result<T, GeometryError>;

/// Errors raised while loading or validating site geometry.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// WKT input did not parse as a polygon.
    #[error("failed to parse WKT geometry: {0}")]
    WktParse(String),

    /// The vector source itself was malformed.
    #[error("failed to parse site source: {0}")]
    SourceParse(String),

    /// The source declared a projection this store cannot reproject from.
    #[error("no reprojection available for EPSG:{0}")]
    UnsupportedProjection(u32),

    /// A feature carried a non-polygonal geometry.
    #[error("geometry for site '{0}' is not a polygon")]
    NotAPolygon(String),

    /// The polygon is geometrically invalid (e.g. self-intersecting).
    #[error("geometry for site '{id}' is invalid: {reason}")]
    Invalid { id: String, reason: String },

    /// The polygon's area is below [`MIN_SITE_AREA_DEG2`].
    #[error("site '{id}' area {area:e} deg^2 is below the minimum {min:e}")]
    AreaBelowMinimum { id: String, area: f64, min: f64 },

    /// Two sites share an identifier.
    #[error("duplicate site identifier '{0}'")]
    DuplicateSite(String),
}

/// A named area of interest in the fixed reference frame.
///
/// Immutable once loaded; the store owns it for the session lifetime.
#[derive(Clone, Debug)]
pub struct Site {
    /// Unique identifier within the store.
    pub id: String,
    /// Polygon in WGS84 longitude/latitude.
    pub polygon: Polygon<f64>,
    /// Free-form attributes carried over from the source's properties.
    pub attributes: HashMap<String, String>,
}

/// Collection of validated sites, keyed by identifier.
#[derive(Clone, Debug, Default)]
pub struct SiteStore {
    sites: Vec<Site>,
}

impl SiteStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a GeoJSON-style feature collection into a store.
    ///
    /// An optional top-level `crs` member of the form
    /// `{"properties": {"name": "EPSG:3857"}}` (or the `urn:ogc:def:crs`
    /// spelling) declares the source projection. Features must carry
    /// `Polygon` or `MultiPolygon` geometry; for a `MultiPolygon` only the
    /// first member polygon is used, matching the catalog protocol's own
    /// footprint convention.
    pub fn from_geojson(source: &str) -> GeometryResult<Self> {
        let root: serde_json::Value = serde_json::from_str(source)
            .map_err(|e| GeometryError::SourceParse(e.to_string()))?;

        let epsg = declared_epsg(&root)?;
        let features = root
            .get("features")
            .and_then(|f| f.as_array())
            .ok_or_else(|| GeometryError::SourceParse("missing 'features' array".into()))?;

        let mut store = Self::new();
        for (index, feature) in features.iter().enumerate() {
            let id = feature_id(feature, index);
            let polygon = feature_polygon(feature, &id)?;
            let polygon = reproject(polygon, epsg)?;
            let attributes = feature_attributes(feature);
            store.insert(Site {
                id,
                polygon,
                attributes,
            })?;
        }

        debug!(sites = store.len(), "loaded site store");
        Ok(store)
    }

    /// Adds a site from a WKT polygon already expressed in WGS84.
    pub fn set_geometry(&mut self, id: impl Into<String>, wkt: &str) -> GeometryResult<()> {
        let id = id.into();
        let polygon = parse_wkt_polygon(wkt)?;
        self.insert(Site {
            id,
            polygon,
            attributes: HashMap::new(),
        })
    }

    /// Validates and stores a site.
    pub fn insert(&mut self, site: Site) -> GeometryResult<()> {
        if self.sites.iter().any(|s| s.id == site.id) {
            return Err(GeometryError::DuplicateSite(site.id));
        }
        validate_polygon(&site.id, &site.polygon)?;
        self.sites.push(site);
        Ok(())
    }

    /// Looks up a site by identifier.
    pub fn get(&self, id: &str) -> Option<&Site> {
        self.sites.iter().find(|s| s.id == id)
    }

    /// Iterates over all sites in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Site> {
        self.sites.iter()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

/// Parses a WKT string into a polygon, accepting `MULTIPOLYGON` input by
/// taking its first member.
pub fn parse_wkt_polygon(wkt: &str) -> GeometryResult<Polygon<f64>> {
    match Polygon::<f64>::try_from_wkt_str(wkt) {
        Ok(polygon) => Ok(polygon),
        Err(_) => {
            let multi = MultiPolygon::<f64>::try_from_wkt_str(wkt)
                .map_err(|e| GeometryError::WktParse(e.to_string()))?;
            multi
                .0
                .into_iter()
                .next()
                .ok_or_else(|| GeometryError::WktParse("empty MULTIPOLYGON".into()))
        }
    }
}

/// Checks validity and the minimum-area floor.
fn validate_polygon(id: &str, polygon: &Polygon<f64>) -> GeometryResult<()> {
    if !polygon.is_valid() {
        return Err(GeometryError::Invalid {
            id: id.to_string(),
            reason: "polygon fails validity checks (self-intersection or degenerate ring)".into(),
        });
    }
    let area = polygon.unsigned_area();
    if area < MIN_SITE_AREA_DEG2 {
        return Err(GeometryError::AreaBelowMinimum {
            id: id.to_string(),
            area,
            min: MIN_SITE_AREA_DEG2,
        });
    }
    Ok(())
}

/// Reprojects a polygon from `epsg` into the reference frame.
fn reproject(polygon: Polygon<f64>, epsg: u32) -> GeometryResult<Polygon<f64>> {
    use geo::MapCoords;
    match epsg {
        REFERENCE_EPSG => Ok(polygon),
        3857 => Ok(polygon.map_coords(mercator_to_wgs84)),
        other => Err(GeometryError::UnsupportedProjection(other)),
    }
}

/// Inverse spherical Web Mercator transform.
fn mercator_to_wgs84(coord: Coord<f64>) -> Coord<f64> {
    let lon = (coord.x / EARTH_RADIUS_M).to_degrees();
    let lat = (2.0 * (coord.y / EARTH_RADIUS_M).exp().atan() - PI / 2.0).to_degrees();
    Coord { x: lon, y: lat }
}

/// Extracts the declared EPSG code from the optional legacy `crs` member.
fn declared_epsg(root: &serde_json::Value) -> GeometryResult<u32> {
    let name = match root
        .get("crs")
        .and_then(|c| c.get("properties"))
        .and_then(|p| p.get("name"))
        .and_then(|n| n.as_str())
    {
        Some(name) => name,
        None => return Ok(REFERENCE_EPSG),
    };

    // Accept both "EPSG:4326" and "urn:ogc:def:crs:EPSG::4326".
    let code = name
        .rsplit(':')
        .next()
        .and_then(|tail| tail.parse::<u32>().ok())
        .ok_or_else(|| GeometryError::SourceParse(format!("unparseable crs name '{name}'")))?;
    Ok(code)
}

fn feature_id(feature: &serde_json::Value, index: usize) -> String {
    feature
        .get("properties")
        .and_then(|p| p.get("id").or_else(|| p.get("name")))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("site-{index}"))
}

fn feature_attributes(feature: &serde_json::Value) -> HashMap<String, String> {
    let mut attributes = HashMap::new();
    if let Some(props) = feature.get("properties").and_then(|p| p.as_object()) {
        for (key, value) in props {
            if let Some(text) = value.as_str() {
                attributes.insert(key.clone(), text.to_string());
            }
        }
    }
    attributes
}

/// Extracts the polygon from a feature's geometry member.
fn feature_polygon(feature: &serde_json::Value, id: &str) -> GeometryResult<Polygon<f64>> {
    let geometry = feature
        .get("geometry")
        .ok_or_else(|| GeometryError::SourceParse(format!("site '{id}' has no geometry")))?;
    let kind = geometry
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or_default();

    let rings = match kind {
        "Polygon" => geometry.get("coordinates").cloned(),
        // Only the first member polygon, as with MULTIPOLYGON WKT input.
        "MultiPolygon" => geometry
            .get("coordinates")
            .and_then(|c| c.as_array())
            .and_then(|polys| polys.first())
            .cloned(),
        _ => return Err(GeometryError::NotAPolygon(id.to_string())),
    };
    let rings = rings
        .ok_or_else(|| GeometryError::SourceParse(format!("site '{id}' has no coordinates")))?;

    let rings = rings
        .as_array()
        .ok_or_else(|| GeometryError::SourceParse(format!("site '{id}' coordinates malformed")))?;

    let mut parsed_rings = Vec::with_capacity(rings.len());
    for ring in rings {
        let ring = ring
            .as_array()
            .ok_or_else(|| GeometryError::SourceParse(format!("site '{id}' ring malformed")))?;
        let mut coords = Vec::with_capacity(ring.len());
        for position in ring {
            let pair = position.as_array().filter(|p| p.len() >= 2).ok_or_else(|| {
                GeometryError::SourceParse(format!("site '{id}' position malformed"))
            })?;
            let x = pair[0].as_f64();
            let y = pair[1].as_f64();
            match (x, y) {
                (Some(x), Some(y)) => coords.push(Coord { x, y }),
                _ => {
                    return Err(GeometryError::SourceParse(format!(
                        "site '{id}' has non-numeric coordinates"
                    )))
                }
            }
        }
        parsed_rings.push(geo_types::LineString::from(coords));
    }

    let mut rings_iter = parsed_rings.into_iter();
    let exterior = rings_iter
        .next()
        .ok_or_else(|| GeometryError::SourceParse(format!("site '{id}' has no exterior ring")))?;
    Ok(Polygon::new(exterior, rings_iter.collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Forward spherical Web Mercator, used as an independent reference for
    /// the round-trip test.
    fn wgs84_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
        let x = EARTH_RADIUS_M * lon.to_radians();
        let y = EARTH_RADIUS_M * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
        (x, y)
    }

    const SQUARE_WKT: &str = "POLYGON ((13.0 52.0, 13.5 52.0, 13.5 52.5, 13.0 52.5, 13.0 52.0))";

    #[test]
    fn test_set_geometry_accepts_valid_wkt() {
        let mut store = SiteStore::new();
        store.set_geometry("berlin", SQUARE_WKT).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get("berlin").is_some());
    }

    #[test]
    fn test_set_geometry_rejects_garbage() {
        let mut store = SiteStore::new();
        let err = store.set_geometry("bad", "POLYGON ((oops").unwrap_err();
        assert!(matches!(err, GeometryError::WktParse(_)));
    }

    #[test]
    fn test_set_geometry_rejects_self_intersection() {
        let mut store = SiteStore::new();
        let bowtie = "POLYGON ((0 0, 1 1, 1 0, 0 1, 0 0))";
        let err = store.set_geometry("bowtie", bowtie).unwrap_err();
        assert!(matches!(err, GeometryError::Invalid { .. }));
    }

    #[test]
    fn test_set_geometry_rejects_near_zero_area() {
        let mut store = SiteStore::new();
        let sliver = "POLYGON ((0 0, 1e-6 0, 1e-6 1e-6, 0 1e-6, 0 0))";
        let err = store.set_geometry("sliver", sliver).unwrap_err();
        assert!(matches!(err, GeometryError::AreaBelowMinimum { .. }));
    }

    #[test]
    fn test_duplicate_site_id_rejected() {
        let mut store = SiteStore::new();
        store.set_geometry("a", SQUARE_WKT).unwrap();
        let err = store.set_geometry("a", SQUARE_WKT).unwrap_err();
        assert!(matches!(err, GeometryError::DuplicateSite(_)));
    }

    #[test]
    fn test_multipolygon_takes_first_member() {
        let wkt = "MULTIPOLYGON (((0 0, 1 0, 1 1, 0 1, 0 0)), ((5 5, 6 5, 6 6, 5 6, 5 5)))";
        let polygon = parse_wkt_polygon(wkt).unwrap();
        let first = polygon.exterior().0[0];
        assert_eq!((first.x, first.y), (0.0, 0.0));
    }

    #[test]
    fn test_geojson_wgs84_passthrough() {
        let source = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"id": "wetland-1", "kind": "wetland"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[13.0, 52.0], [13.5, 52.0], [13.5, 52.5], [13.0, 52.5], [13.0, 52.0]]]
                }
            }]
        }"#;
        let store = SiteStore::from_geojson(source).unwrap();
        let site = store.get("wetland-1").unwrap();
        assert_eq!(site.attributes.get("kind").unwrap(), "wetland");
        let first = site.polygon.exterior().0[0];
        assert!((first.x - 13.0).abs() < 1e-12);
    }

    #[test]
    fn test_geojson_mercator_reprojected() {
        let (x0, y0) = wgs84_to_mercator(13.0, 52.0);
        let (x1, y1) = wgs84_to_mercator(13.5, 52.0);
        let (x2, y2) = wgs84_to_mercator(13.5, 52.5);
        let (x3, y3) = wgs84_to_mercator(13.0, 52.5);
        let source = format!(
            r#"{{
                "type": "FeatureCollection",
                "crs": {{"properties": {{"name": "EPSG:3857"}}}},
                "features": [{{
                    "type": "Feature",
                    "properties": {{"id": "berlin"}},
                    "geometry": {{
                        "type": "Polygon",
                        "coordinates": [[[{x0}, {y0}], [{x1}, {y1}], [{x2}, {y2}], [{x3}, {y3}], [{x0}, {y0}]]]
                    }}
                }}]
            }}"#
        );
        let store = SiteStore::from_geojson(&source).unwrap();
        let site = store.get("berlin").unwrap();
        let exterior = &site.polygon.exterior().0;
        assert!((exterior[0].x - 13.0).abs() < 1e-9);
        assert!((exterior[0].y - 52.0).abs() < 1e-9);
        assert!((exterior[2].x - 13.5).abs() < 1e-9);
        assert!((exterior[2].y - 52.5).abs() < 1e-9);
    }

    #[test]
    fn test_geojson_unknown_projection_rejected() {
        let source = r#"{
            "crs": {"properties": {"name": "EPSG:27700"}},
            "features": [{
                "properties": {"id": "a"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 1], [0, 0]]]
                }
            }]
        }"#;
        let err = SiteStore::from_geojson(source).unwrap_err();
        assert!(matches!(err, GeometryError::UnsupportedProjection(27700)));
    }

    #[test]
    fn test_geojson_non_polygon_rejected() {
        let source = r#"{
            "features": [{
                "properties": {"id": "pt"},
                "geometry": {"type": "Point", "coordinates": [1.0, 2.0]}
            }]
        }"#;
        let err = SiteStore::from_geojson(source).unwrap_err();
        assert!(matches!(err, GeometryError::NotAPolygon(_)));
    }

    #[test]
    fn test_geojson_urn_crs_spelling() {
        let source = r#"{
            "crs": {"properties": {"name": "urn:ogc:def:crs:EPSG::4326"}},
            "features": []
        }"#;
        let store = SiteStore::from_geojson(source).unwrap();
        assert!(store.is_empty());
    }
}
