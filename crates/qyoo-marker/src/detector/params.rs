use std::path::Path;

use qyoo_features::{EdgeParams, FeatureParams};
use serde::{Deserialize, Serialize};

use crate::decoder::DecoderParams;
use crate::io::{read_json, write_json, QyooIoError};
use crate::matcher::MatcherParams;

/// Configuration for the full Qyoo detection pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QyooDetectorParams {
    /// Stretch the input to the full 8-bit range before edge detection.
    pub contrast_stretch: bool,
    pub edges: EdgeParams,
    pub features: FeatureParams,
    pub matcher: MatcherParams,
    pub decoder: DecoderParams,
}

impl Default for QyooDetectorParams {
    fn default() -> Self {
        Self {
            contrast_stretch: true,
            edges: EdgeParams::default(),
            features: FeatureParams::default(),
            matcher: MatcherParams::default(),
            decoder: DecoderParams::default(),
        }
    }
}

impl QyooDetectorParams {
    /// Load parameters from JSON; missing fields keep their defaults.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, QyooIoError> {
        read_json(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), QyooIoError> {
        write_json(self, path)
    }
}
