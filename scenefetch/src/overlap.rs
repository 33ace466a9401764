//! Geometric overlap filtering between scene footprints and sites.
//!
//! The overlap ratio is the intersection area between a footprint and a
//! site polygon divided by a chosen reference area. The default reference
//! is the site area ("is this site covered"), so a scene fully containing
//! a small site scores 1.0 no matter how much larger the scene is. The
//! denominator is configurable because other conventions are equally
//! defensible for other workflows.

use geo::{Area, BooleanOps, Validation};
use geo_types::Polygon;
use tracing::{debug, warn};

use crate::catalog::Scene;
use crate::config::FilterConfig;
use crate::geometry::SiteStore;
use crate::query::{ConfigError, ConfigResult};

/// Reference area for the overlap ratio.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverlapDenominator {
    /// Intersection area relative to the site polygon's area.
    #[default]
    Site,
    /// Relative to the scene footprint's area. Useful when hunting scenes
    /// that lie mostly inside a large site.
    Footprint,
    /// Relative to the area of the union (Jaccard index).
    Union,
}

/// Overlap ratio of one scene against one site.
#[derive(Clone, Debug)]
pub struct SiteScore {
    pub site_id: String,
    /// Always within [0, 1].
    pub ratio: f64,
}

/// A scene with its per-site overlap ratios.
#[derive(Clone, Debug)]
pub struct ScoredScene {
    pub scene: Scene,
    pub scores: Vec<SiteScore>,
}

impl ScoredScene {
    /// Highest ratio over all evaluated sites.
    pub fn best_ratio(&self) -> f64 {
        self.scores.iter().map(|s| s.ratio).fold(0.0, f64::max)
    }
}

/// Computes the overlap ratio between a footprint and a site polygon.
///
/// Returns a value clamped to [0, 1]; disjoint geometries score 0.0.
pub fn overlap_ratio(
    footprint: &Polygon<f64>,
    site: &Polygon<f64>,
    denominator: OverlapDenominator,
) -> f64 {
    let intersection_area = footprint.intersection(site).unsigned_area();
    let reference_area = match denominator {
        OverlapDenominator::Site => site.unsigned_area(),
        OverlapDenominator::Footprint => footprint.unsigned_area(),
        OverlapDenominator::Union => {
            footprint.unsigned_area() + site.unsigned_area() - intersection_area
        }
    };
    if reference_area <= 0.0 {
        return 0.0;
    }
    (intersection_area / reference_area).clamp(0.0, 1.0)
}

/// Scores every scene against every site and retains those whose best
/// ratio reaches `config.min_overlap`.
///
/// A threshold outside [0, 1] is a caller mistake and fails with
/// `ConfigError` rather than silently discarding every scene. Scenes with
/// geometrically invalid footprints are skipped with a warning rather than
/// failing the pass. Near-duplicate scenes are not deduplicated here; the
/// download manager's existing-file check owns that.
pub fn filter_scenes(
    scenes: impl IntoIterator<Item = Scene>,
    sites: &SiteStore,
    config: &FilterConfig,
) -> ConfigResult<Vec<ScoredScene>> {
    if !(0.0..=1.0).contains(&config.min_overlap) {
        return Err(ConfigError::MinOverlapOutOfRange(config.min_overlap));
    }

    let mut retained = Vec::new();
    for scene in scenes {
        if !scene.footprint.is_valid() {
            warn!(id = %scene.id, "skipping scene with invalid footprint");
            continue;
        }

        let scores: Vec<SiteScore> = sites
            .iter()
            .map(|site| SiteScore {
                site_id: site.id.clone(),
                ratio: overlap_ratio(&scene.footprint, &site.polygon, config.denominator),
            })
            .collect();

        let scored = ScoredScene { scene, scores };
        if scored.best_ratio() >= config.min_overlap {
            retained.push(scored);
        } else {
            debug!(
                id = %scored.scene.id,
                best = scored.best_ratio(),
                "scene below overlap threshold"
            );
        }
    }
    Ok(retained)
}
