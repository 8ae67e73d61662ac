//! ROI → template-space resampling.

use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Projection};
use nalgebra::Matrix3;

use crate::config::RectifyConfig;
use crate::device_catalog::{DeviceDefinition, MARKER_COUNT};
use crate::homography::{perspective_transform, HomographyError};

/// A ROI resampled into a device's template frame.
#[derive(Debug, Clone)]
pub struct Rectification {
    /// Maps ROI pixels to template pixels.
    pub homography: Matrix3<f64>,
    /// Rectified image, exactly the device's template size.
    pub image: RgbImage,
}

/// Warp `roi` so that the detected markers land on the device's canonical
/// marker positions (pairs taken in `MarkerId` order). Pixels that map from
/// outside the ROI are black.
pub fn rectify(
    roi: &RgbImage,
    detected: &[[f32; 2]; MARKER_COUNT],
    device: &DeviceDefinition,
    config: &RectifyConfig,
) -> Result<Rectification, HomographyError> {
    let canonical = device.marker_positions();
    let homography = perspective_transform(detected, &canonical)?;

    let m = homography.map(|v| v as f32);
    #[rustfmt::skip]
    let row_major = [
        m[(0, 0)], m[(0, 1)], m[(0, 2)],
        m[(1, 0)], m[(1, 1)], m[(1, 2)],
        m[(2, 0)], m[(2, 1)], m[(2, 2)],
    ];
    let projection = Projection::from_matrix(row_major)
        .ok_or_else(|| HomographyError::NumericalFailure("projection not invertible".into()))?;

    let [tw, th] = device.template_size();
    let mut image = RgbImage::new(tw, th);
    warp_into(
        roi,
        &projection,
        config.interpolation.into(),
        Rgb([0, 0, 0]),
        &mut image,
    );

    Ok(Rectification { homography, image })
}
