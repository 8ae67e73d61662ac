//! High-level analysis API.
//!
//! [`BeaconAnalyzer`] is the primary entry point. It owns a
//! [`DeviceCatalog`] and an [`AnalyzerConfig`] and is immutable afterwards,
//! so one instance can serve many threads behind an `Arc`.

use std::path::Path;

use image::RgbImage;

use crate::config::AnalyzerConfig;
use crate::device_catalog::{DefinitionError, DeviceCatalog, DeviceDefinition};
use crate::led_decoder::{decode_levels, zero_levels};
use crate::marker_locator::locate_markers;
use crate::rectify::rectify;
use crate::{AnalyzationResult, DetectionResult, PixelRect};

/// Per-call failures. Markers that cannot be found are not an error; see
/// [`AnalyzationResult::is_degraded`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalyzeError {
    #[error("unknown device '{0}'")]
    UnknownDevice(String),
    #[error("detection rectangle {rect:?} does not fit a {image_width}x{image_height} frame")]
    RoiOutOfBounds {
        rect: Option<PixelRect>,
        image_width: u32,
        image_height: u32,
    },
}

/// Primary analysis interface.
///
/// Create once, analyze many frames.
///
/// # Examples
///
/// ```no_run
/// use beaconlens::{BeaconAnalyzer, DetectionResult, RoiRect};
/// use std::path::Path;
///
/// let analyzer = BeaconAnalyzer::from_definition_file(Path::new("devices.json")).unwrap();
/// let frame = image::open("frame.png").unwrap().to_rgb8();
/// let rect = RoiRect { x: 10.0, y: 5.0, width: 260.0, height: 165.0 };
/// let result = analyzer
///     .analyze(&frame, &DetectionResult::new("CM-Beacon", 0, rect))
///     .unwrap();
/// println!("{:?}", result.beacon);
/// ```
#[derive(Debug, Clone)]
pub struct BeaconAnalyzer {
    catalog: DeviceCatalog,
    config: AnalyzerConfig,
}

impl BeaconAnalyzer {
    /// Create an analyzer with default configuration.
    pub fn new(catalog: DeviceCatalog) -> Self {
        Self::with_config(catalog, AnalyzerConfig::default())
    }

    pub fn with_config(catalog: DeviceCatalog, config: AnalyzerConfig) -> Self {
        tracing::info!(devices = catalog.len(), "beacon analyzer ready");
        Self { catalog, config }
    }

    /// Load a definition document and create an analyzer in one step.
    pub fn from_definition_file(path: &Path) -> Result<Self, DefinitionError> {
        Ok(Self::new(DeviceCatalog::from_json_file(path)?))
    }

    pub fn catalog(&self) -> &DeviceCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze one detection in `frame`.
    ///
    /// When the calibration markers cannot be located, or they give a
    /// degenerate transform, the result carries level 0 for every beacon and
    /// no rectified image.
    pub fn analyze(
        &self,
        frame: &RgbImage,
        detection: &DetectionResult,
    ) -> Result<AnalyzationResult, AnalyzeError> {
        let device = self
            .catalog
            .get(&detection.device_name)
            .ok_or_else(|| AnalyzeError::UnknownDevice(detection.device_name.clone()))?;

        let (fw, fh) = frame.dimensions();
        let rect = detection.rect.to_pixel_rect();
        let position = match rect {
            Some(r) if r.fits_within(fw, fh) => r,
            _ => {
                return Err(AnalyzeError::RoiOutOfBounds {
                    rect,
                    image_width: fw,
                    image_height: fh,
                })
            }
        };

        let roi = image::imageops::crop_imm(
            frame,
            position.x,
            position.y,
            position.width,
            position.height,
        )
        .to_image();
        Ok(self.analyze_roi(&roi, device, detection, position))
    }

    fn analyze_roi(
        &self,
        roi: &RgbImage,
        device: &DeviceDefinition,
        detection: &DetectionResult,
        position: PixelRect,
    ) -> AnalyzationResult {
        let mut result = AnalyzationResult {
            device_name: detection.device_name.clone(),
            device_id: detection.device_id,
            position,
            beacon: zero_levels(device),
            marker_points: None,
            rectified: None,
        };

        let Some(markers) = locate_markers(roi, &self.config.marker) else {
            tracing::warn!(
                device = %detection.device_key(),
                "failed to find markers, reporting all beacons off"
            );
            return result;
        };

        let rectification = match rectify(roi, &markers, device, &self.config.rectify) {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!(
                    device = %detection.device_key(),
                    error = %err,
                    "marker transform rejected, reporting all beacons off"
                );
                return result;
            }
        };

        result.beacon = decode_levels(&rectification.image, device, &self.config.led);
        result.marker_points = Some(markers);
        result.rectified = Some(rectification.image);
        tracing::debug!(device = %detection.device_key(), levels = ?result.beacon, "analyzed");
        result
    }
}
