use serde::{Deserialize, Serialize};

/// Contour tracing, segmentation and corner extraction settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureParams {
    /// Chains whose endpoints lie within this distance (pixels) are joined;
    /// a chain whose own endpoints are this close is closed.
    pub link_gap: f32,
    /// Chains with fewer pixels are dropped.
    pub min_contour_len: usize,
    /// Number of points used to seed a straight run.
    pub min_run_len: usize,
    /// Maximum distance (pixels) of a seed point from the seed line.
    pub seed_max_deviation: f32,
    /// How far ahead (in chain steps) the extension test looks.
    pub lookahead: usize,
    /// Maximum deviation of the lookahead direction from the run's line.
    pub angle_tolerance_deg: f32,
    /// Runs shorter than this count as transition noise.
    pub min_segment_len: usize,
    /// Minimum angle between consecutive runs for a corner.
    pub min_corner_angle_deg: f32,
    /// Maximum distance from the line intersection to the transition pixel.
    pub max_corner_offset: f32,
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self {
            link_gap: 3.0,
            min_contour_len: 16,
            min_run_len: 5,
            seed_max_deviation: 1.0,
            lookahead: 5,
            angle_tolerance_deg: 20.0,
            min_segment_len: 8,
            min_corner_angle_deg: 30.0,
            max_corner_offset: 6.0,
        }
    }
}
