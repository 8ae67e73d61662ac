//! Analyzer tuning knobs.
//!
//! Every section defaults independently, so a JSON config only needs to name
//! the fields it overrides:
//!
//! ```json
//! { "led": { "channel": "lightness" } }
//! ```

use std::path::{Path, PathBuf};

use crate::color::LabChannel;
use crate::preprocess::HueRange;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Calibration-marker search parameters.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MarkerLocatorConfig {
    /// Contours smaller than this fraction of the ROI area are ignored.
    pub min_contour_area_frac: f64,
    /// Hue bands (halved-degree scale) removed from the foreground before
    /// contour search. Reds, oranges and achromatic pixels fall in the default.
    pub hue_exclusion: Vec<HueRange>,
}

impl Default for MarkerLocatorConfig {
    fn default() -> Self {
        Self {
            min_contour_area_frac: 0.001,
            hue_exclusion: vec![HueRange::new(0, 40), HueRange::new(150, 180)],
        }
    }
}

/// Resampling filter used when warping the ROI into template space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
}

impl From<Interpolation> for imageproc::geometric_transformations::Interpolation {
    fn from(value: Interpolation) -> Self {
        match value {
            Interpolation::Nearest => Self::Nearest,
            Interpolation::Bilinear => Self::Bilinear,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RectifyConfig {
    pub interpolation: Interpolation,
}

/// Status-LED intensity readout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LedDecodeConfig {
    /// Lab plane the LED intensity is read from.
    pub channel: LabChannel,
    /// Top of the quantized level scale.
    pub max_level: u8,
}

impl Default for LedDecodeConfig {
    fn default() -> Self {
        Self {
            channel: LabChannel::B,
            max_level: 31,
        }
    }
}

/// Top-level analyzer configuration.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub marker: MarkerLocatorConfig,
    pub rectify: RectifyConfig,
    pub led: LedDecodeConfig,
}

impl AnalyzerConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&data)
    }

    pub fn from_json_str(data: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let frac = self.marker.min_contour_area_frac;
        if !frac.is_finite() || !(0.0..1.0).contains(&frac) {
            return Err(ConfigError::Invalid(format!(
                "marker.min_contour_area_frac must be in [0, 1) (got {frac})"
            )));
        }
        if let Some(r) = self.marker.hue_exclusion.iter().find(|r| r.lo > r.hi) {
            return Err(ConfigError::Invalid(format!(
                "marker.hue_exclusion band [{}, {}] is inverted",
                r.lo, r.hi
            )));
        }
        if self.led.max_level == 0 {
            return Err(ConfigError::Invalid("led.max_level must be >= 1".into()));
        }
        Ok(())
    }
}
