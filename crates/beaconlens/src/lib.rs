//! beaconlens — read LED status patterns off beacon devices in camera frames.
//!
//! Given a frame and the rectangle where an upstream detector saw a device of
//! a known type, the analyzer:
//!
//! 1. **Locate** – finds the device's four calibration markers (one
//!    primary-color, three secondary-color) by Lab/HSV segmentation and
//!    contour scoring, ordered clockwise from the primary.
//! 2. **Rectify** – fits the marker → template perspective transform and
//!    resamples the ROI into the device's canonical template frame.
//! 3. **Decode** – averages one Lab channel under each status LED's mask and
//!    quantizes the readings onto `0..=31`.
//!
//! # Public API
//! - [`DeviceCatalog`] loads device definitions from JSON.
//! - [`BeaconAnalyzer`] owns a catalog and analyzes one detection at a time.
//! - [`AnalysisReport`] aggregates results into the per-frame output document.
//! - [`JobRegistry`] runs analyzers over frame sequences on worker threads.

mod analyzer;
mod color;
mod config;
mod device_catalog;
mod homography;
mod jobs;
mod led_decoder;
mod marker_locator;
mod preprocess;
mod rectify;
mod report;
mod request;

#[cfg(test)]
pub(crate) mod test_utils;

use std::collections::BTreeMap;

use image::RgbImage;

pub use analyzer::{AnalyzeError, BeaconAnalyzer};
pub use color::{hue_plane, LabChannel, LabPlanes};
pub use config::{
    AnalyzerConfig, ConfigError, Interpolation, LedDecodeConfig, MarkerLocatorConfig,
    RectifyConfig,
};
pub use device_catalog::{
    DefinitionError, DeviceCatalog, DeviceDefinition, LedSpec, MarkerId, MARKER_COUNT,
};
pub use homography::{
    estimate_homography_dlt, perspective_transform, project, reprojection_error,
    HomographyError,
};
pub use jobs::{FrameSource, ImageSequence, JobError, JobId, JobRegistry, JobStatus};
pub use led_decoder::{decode_levels, normalize_levels, read_raw_intensities, zero_levels};
pub use marker_locator::locate_markers;
pub use marker_locator::ordering::{clockwise_angle_deg, clockwise_sweep_deg, order_clockwise};
pub use preprocess::HueRange;
pub use rectify::{rectify, Rectification};
pub use report::AnalysisReport;
pub use request::{parse_detection_request, RequestError};

/// Integer pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// True when the rectangle is non-empty and lies inside `width × height`.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x as u64 + self.width as u64 <= width as u64
            && self.y as u64 + self.height as u64 <= height as u64
    }
}

/// Device rectangle as reported by the upstream detector, in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RoiRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RoiRect {
    /// Round every component to the nearest integer pixel.
    ///
    /// `None` when any component is non-finite or the origin is negative.
    pub fn to_pixel_rect(&self) -> Option<PixelRect> {
        let vals = [self.x, self.y, self.width, self.height];
        if vals.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let [x, y, w, h] = vals.map(f64::round);
        let in_range = |v: f64| (0.0..=u32::MAX as f64).contains(&v);
        if !(in_range(x) && in_range(y) && in_range(w) && in_range(h)) {
            return None;
        }
        Some(PixelRect {
            x: x as u32,
            y: y as u32,
            width: w as u32,
            height: h as u32,
        })
    }
}

impl From<PixelRect> for RoiRect {
    fn from(r: PixelRect) -> Self {
        Self {
            x: r.x as f64,
            y: r.y as f64,
            width: r.width as f64,
            height: r.height as f64,
        }
    }
}

/// One device sighting to analyze.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DetectionResult {
    /// Device type; must name an entry of the analyzer's catalog.
    pub device_name: String,
    /// Instance id distinguishing several devices of one type.
    pub device_id: u64,
    pub rect: RoiRect,
}

impl DetectionResult {
    pub fn new(device_name: impl Into<String>, device_id: u64, rect: RoiRect) -> Self {
        Self {
            device_name: device_name.into(),
            device_id,
            rect,
        }
    }

    /// Key used in reports: device name followed by the instance id.
    pub fn device_key(&self) -> String {
        format!("{}{}", self.device_name, self.device_id)
    }
}

/// Outcome of analyzing one detection.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnalyzationResult {
    pub device_name: String,
    pub device_id: u64,
    /// Integer ROI that was analyzed, in frame pixels.
    pub position: PixelRect,
    /// Beacon id → level in `0..=max_level`.
    pub beacon: BTreeMap<String, u8>,
    /// Calibration markers in ROI pixels, ordered `ID1..ID4`; `None` when
    /// they were not found and every level is 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker_points: Option<[[f32; 2]; MARKER_COUNT]>,
    /// ROI resampled into template space.
    #[serde(skip)]
    pub rectified: Option<RgbImage>,
}

impl AnalyzationResult {
    /// Key used in reports: device name followed by the instance id.
    pub fn device_key(&self) -> String {
        format!("{}{}", self.device_name, self.device_id)
    }

    /// True when the markers were not found and the levels are placeholders.
    pub fn is_degraded(&self) -> bool {
        self.marker_points.is_none()
    }
}
