//! Status-LED readout from a rectified device image.

use std::collections::BTreeMap;

use image::{GrayImage, RgbImage};

use crate::color::LabPlanes;
use crate::config::LedDecodeConfig;
use crate::device_catalog::DeviceDefinition;
use crate::preprocess::masked_mean;

/// Mean intensity of `channel` under each beacon's mask, keyed by beacon id.
pub fn read_raw_intensities(channel: &GrayImage, device: &DeviceDefinition) -> BTreeMap<String, f64> {
    device
        .beacons()
        .iter()
        .map(|(id, led)| {
            let origin = [led.bounding_box.x, led.bounding_box.y];
            (id.clone(), masked_mean(channel, origin, &led.mask))
        })
        .collect()
}

/// Quantize raw intensities onto `0..=max_level`, stretching the observed
/// minimum to 0 and maximum to `max_level`. All readings equal → all 0.
pub fn normalize_levels(raw: &BTreeMap<String, f64>, max_level: u8) -> BTreeMap<String, u8> {
    let lo = raw.values().copied().fold(f64::INFINITY, f64::min);
    let hi = raw.values().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = hi - lo;

    raw.iter()
        .map(|(id, &v)| {
            let level = if span > 0.0 && span.is_finite() {
                ((v - lo) / span * max_level as f64)
                    .round()
                    .clamp(0.0, max_level as f64) as u8
            } else {
                0
            };
            (id.clone(), level)
        })
        .collect()
}

/// Every beacon at level 0 (the result when the device cannot be read).
pub fn zero_levels(device: &DeviceDefinition) -> BTreeMap<String, u8> {
    device.beacon_ids().map(|id| (id.to_string(), 0)).collect()
}

/// Read and quantize every beacon of `device` from its rectified image.
pub fn decode_levels(
    rectified: &RgbImage,
    device: &DeviceDefinition,
    config: &LedDecodeConfig,
) -> BTreeMap<String, u8> {
    let channel = LabPlanes::from_rgb(rectified).into_channel(config.channel);
    let raw = read_raw_intensities(&channel, device);
    tracing::debug!(device = device.name(), ?raw, "raw beacon intensities");
    normalize_levels(&raw, config.max_level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::LabChannel;
    use crate::device_catalog::DeviceCatalog;
    use crate::test_utils::{definition_json, render_template, DeviceSketch};
    use approx::assert_relative_eq;

    fn raw(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn reference_device() -> DeviceDefinition {
        DeviceCatalog::from_json_str(&definition_json(&[DeviceSketch::reference()]))
            .unwrap()
            .get("GCB-Test")
            .unwrap()
            .clone()
    }

    #[test]
    fn extremes_map_to_ends_of_scale() {
        let levels = normalize_levels(&raw(&[("ID1", 40.0), ("ID2", 140.0), ("ID3", 90.0)]), 31);
        assert_eq!(levels["ID1"], 0);
        assert_eq!(levels["ID2"], 31);
        // 0.5 * 31 = 15.5 rounds away from zero.
        assert_eq!(levels["ID3"], 16);
    }

    #[test]
    fn equal_readings_collapse_to_zero() {
        let levels = normalize_levels(&raw(&[("ID1", 77.0), ("ID2", 77.0)]), 31);
        assert!(levels.values().all(|&l| l == 0));

        let single = normalize_levels(&raw(&[("ID1", 200.0)]), 31);
        assert_eq!(single["ID1"], 0);
    }

    #[test]
    fn levels_stay_in_range() {
        let readings: BTreeMap<String, f64> = (0..20)
            .map(|i| (format!("ID{}", i + 1), (i * 37 % 255) as f64 + 0.3))
            .collect();
        let levels = normalize_levels(&readings, 31);
        assert!(levels.values().all(|&l| l <= 31));
        assert_eq!(levels.values().copied().max(), Some(31));
        assert_eq!(levels.values().copied().min(), Some(0));
    }

    #[test]
    fn raw_intensity_is_mask_mean() {
        let device = reference_device();
        let template = render_template(
            &DeviceSketch::reference(),
            &[[255, 255, 255], [128, 128, 128], [0, 0, 0]],
        );
        let planes = LabPlanes::from_rgb(&template);
        let raw = read_raw_intensities(planes.channel(LabChannel::Lightness), &device);
        assert_relative_eq!(raw["ID1"], 255.0);
        assert_relative_eq!(raw["ID2"], 137.0);
        assert_relative_eq!(raw["ID3"], 0.0);
    }

    #[test]
    fn decode_reads_configured_channel() {
        let device = reference_device();
        let template = render_template(
            &DeviceSketch::reference(),
            &[[255, 255, 0], [128, 128, 128], [255, 255, 255]],
        );

        // b separates yellow from the neutrals; white and gray share b = 128.
        let on_b = decode_levels(&template, &device, &LedDecodeConfig::default());
        assert_eq!(on_b["ID1"], 31);
        assert_eq!(on_b["ID2"], 0);
        assert_eq!(on_b["ID3"], 0);

        let cfg = LedDecodeConfig {
            channel: LabChannel::Lightness,
            ..LedDecodeConfig::default()
        };
        let on_l = decode_levels(&template, &device, &cfg);
        assert_eq!(on_l["ID2"], 0);
        assert_eq!(on_l["ID3"], 31);
    }

    #[test]
    fn zero_levels_cover_every_beacon() {
        let device = reference_device();
        let zeros = zero_levels(&device);
        assert_eq!(zeros.len(), 3);
        assert!(zeros.values().all(|&l| l == 0));
    }
}
