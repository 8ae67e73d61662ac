//! Calibration-marker search inside a device ROI.
//!
//! Stages:
//! 1. Lab + hue planes of the ROI.
//! 2. Foreground = Otsu on lightness minus the excluded hue bands.
//! 3. Opponent channels `a` and `b` stretched over the foreground, then
//!    inverted so green (low `a`) and blue (low `b`) score high.
//! 4. Every foreground contour is a candidate, scored by the mean of each
//!    inverted channel under its filled polygon.
//! 5. Best three on inverted `a` are the secondary markers, best remaining on
//!    inverted `b` is the primary marker.
//! 6. Secondaries are ordered clockwise from the primary around the ROI
//!    center.

mod candidates;
mod enclosing_circle;
pub mod ordering;

use image::RgbImage;

use crate::color::{hue_plane, LabPlanes};
use crate::config::MarkerLocatorConfig;
use crate::preprocess::{
    hue_band_mask, invert, normalize_min_max_masked, otsu_foreground, subtract_mask,
};

use candidates::{extract_candidates, rank_by};

/// Number of secondary-color markers.
const SECONDARY_COUNT: usize = 3;

/// Locate the four calibration markers in `roi`.
///
/// Returns `[primary, s1, s2, s3]` in ROI pixel coordinates with the
/// secondaries in clockwise order, or `None` when the markers cannot be
/// identified.
pub fn locate_markers(roi: &RgbImage, config: &MarkerLocatorConfig) -> Option<[[f32; 2]; 4]> {
    let (w, h) = roi.dimensions();
    if w == 0 || h == 0 {
        return None;
    }

    let LabPlanes { l, mut a, mut b } = LabPlanes::from_rgb(roi);
    let hue = hue_plane(roi);

    let Some(mut foreground) = otsu_foreground(&l) else {
        tracing::debug!("flat lightness, no foreground split");
        return None;
    };
    let excluded = hue_band_mask(&hue, &config.hue_exclusion);
    subtract_mask(&mut foreground, &excluded);

    if !normalize_min_max_masked(&mut a, &foreground) {
        tracing::debug!("foreground empty after hue exclusion");
        return None;
    }
    normalize_min_max_masked(&mut b, &foreground);
    invert(&mut a);
    invert(&mut b);

    let min_area = config.min_contour_area_frac * (w as f64 * h as f64);
    let candidates = extract_candidates(&foreground, min_area);

    let secondaries: Vec<[f32; 2]> = rank_by(&candidates, &a)
        .into_iter()
        .take(SECONDARY_COUNT)
        .map(|(i, _)| candidates[i].center)
        .collect();
    if secondaries.len() < SECONDARY_COUNT {
        tracing::debug!(
            found = secondaries.len(),
            "not enough secondary marker candidates"
        );
        return None;
    }

    let Some(primary) = rank_by(&candidates, &b)
        .into_iter()
        .map(|(i, _)| candidates[i].center)
        .find(|c| !secondaries.contains(c))
    else {
        tracing::debug!("no primary marker candidate left");
        return None;
    };

    let pivot = [w as f32 / 2.0, h as f32 / 2.0];
    let secondaries = [secondaries[0], secondaries[1], secondaries[2]];
    Some(ordering::order_clockwise(pivot, primary, secondaries))
}
