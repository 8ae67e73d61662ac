//! Shared synthetic fixtures for unit tests: a reference device layout, its
//! definition document, a rendered template, and a perspective-distorted
//! view of it.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;
use nalgebra::Matrix3;

use crate::homography::project;

/// Sky blue: low Lab `b`, mid `a`, hue outside the excluded bands.
pub(crate) const PRIMARY_RGB: [u8; 3] = [100, 180, 255];
/// Pure green: low Lab `a`, high `b`.
pub(crate) const SECONDARY_RGB: [u8; 3] = [0, 255, 0];

/// Extra radius of a rendered LED beyond its nominal radius, so sampling
/// masks stay inside the lit area after resampling.
const LED_GLOW_PX: i32 = 2;

/// Frame size produced by [`distort`].
pub(crate) const DISTORTED_SIZE: (u32, u32) = (280, 180);

#[derive(Debug, Clone)]
pub(crate) struct DeviceSketch {
    pub name: String,
    pub template_size: [u32; 2],
    /// `ID1..ID4` centers; `ID1` is the primary marker.
    pub markers: [[f32; 2]; 4],
    pub marker_radius: f32,
    pub primary_color: String,
    pub secondary_color: String,
    pub beacons: Vec<[f32; 2]>,
    pub beacon_radius: f32,
}

impl DeviceSketch {
    /// 200×100 device: markers near the corners clockwise from top-left,
    /// three beacons on the horizontal midline.
    pub fn reference() -> Self {
        Self {
            name: "GCB-Test".to_string(),
            template_size: [200, 100],
            markers: [[20.0, 20.0], [180.0, 20.0], [180.0, 80.0], [20.0, 80.0]],
            marker_radius: 8.0,
            primary_color: "blue".to_string(),
            secondary_color: "green".to_string(),
            beacons: vec![[100.0, 50.0], [60.0, 50.0], [140.0, 50.0]],
            beacon_radius: 10.0,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        let mut marker = serde_json::Map::new();
        marker.insert("led_num".into(), serde_json::json!(4));
        for (i, p) in self.markers.iter().enumerate() {
            let color = if i == 0 {
                &self.primary_color
            } else {
                &self.secondary_color
            };
            marker.insert(
                format!("ID{}", i + 1),
                serde_json::json!({
                    "center_x": p[0], "center_y": p[1],
                    "radius": self.marker_radius, "color": color,
                }),
            );
        }

        let mut beacon = serde_json::Map::new();
        beacon.insert("led_num".into(), serde_json::json!(self.beacons.len()));
        for (i, p) in self.beacons.iter().enumerate() {
            beacon.insert(
                format!("ID{}", i + 1),
                serde_json::json!({
                    "center_x": p[0], "center_y": p[1], "radius": self.beacon_radius,
                }),
            );
        }

        serde_json::json!({
            "template_width": self.template_size[0],
            "template_height": self.template_size[1],
            "marker": marker,
            "beacon": beacon,
        })
    }
}

/// Definition document listing `devices` in order.
pub(crate) fn definition_json(devices: &[DeviceSketch]) -> String {
    let mut doc = serde_json::Map::new();
    doc.insert(
        "device_name".into(),
        serde_json::json!(devices.iter().map(|d| d.name.clone()).collect::<Vec<_>>()),
    );
    for d in devices {
        doc.insert(d.name.clone(), d.to_json());
    }
    serde_json::Value::Object(doc).to_string()
}

fn round_center(p: [f32; 2]) -> (i32, i32) {
    (p[0].round() as i32, p[1].round() as i32)
}

/// Render the device on black: markers in their colors, beacon `i` lit with
/// `beacon_colors[i]` (beacons past the end of the slice stay dark).
pub(crate) fn render_template(sketch: &DeviceSketch, beacon_colors: &[[u8; 3]]) -> RgbImage {
    let [w, h] = sketch.template_size;
    let mut img = RgbImage::new(w, h);
    for (i, p) in sketch.markers.iter().enumerate() {
        let color = if i == 0 { PRIMARY_RGB } else { SECONDARY_RGB };
        draw_filled_circle_mut(
            &mut img,
            round_center(*p),
            sketch.marker_radius as i32,
            Rgb(color),
        );
    }
    for (p, color) in sketch.beacons.iter().zip(beacon_colors) {
        draw_filled_circle_mut(
            &mut img,
            round_center(*p),
            sketch.beacon_radius as i32 + LED_GLOW_PX,
            Rgb(*color),
        );
    }
    img
}

/// Fixed template → frame homography: offset, shear and mild perspective.
#[rustfmt::skip]
pub(crate) fn distortion() -> Matrix3<f64> {
    Matrix3::new(
        1.0,     0.08,   40.0,
        -0.05,   0.95,   45.0,
        0.0004,  0.0002, 1.0,
    )
}

/// View `template` through [`distortion`] in a [`DISTORTED_SIZE`] frame
/// (nearest-neighbour, black outside). Returns the frame and the
/// template → frame homography.
pub(crate) fn distort(template: &RgbImage) -> (RgbImage, Matrix3<f64>) {
    let h = distortion();
    let h_inv = h.try_inverse().expect("distortion is invertible");
    let (tw, th) = template.dimensions();
    let (fw, fh) = DISTORTED_SIZE;

    let frame = RgbImage::from_fn(fw, fh, |x, y| {
        let src = project(&h_inv, x as f64, y as f64);
        let (sx, sy) = (src[0].round(), src[1].round());
        if sx >= 0.0 && sy >= 0.0 && sx < tw as f64 && sy < th as f64 {
            *template.get_pixel(sx as u32, sy as u32)
        } else {
            Rgb([0, 0, 0])
        }
    });
    (frame, h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distorted_device_fits_the_frame() {
        let h = distortion();
        let (fw, fh) = DISTORTED_SIZE;
        for p in [[0.0, 0.0], [200.0, 0.0], [200.0, 100.0], [0.0, 100.0]] {
            let q = project(&h, p[0], p[1]);
            assert!(q[0] > 5.0 && q[0] < fw as f64 - 5.0, "{:?}", q);
            assert!(q[1] > 5.0 && q[1] < fh as f64 - 5.0, "{:?}", q);
        }
    }
}
