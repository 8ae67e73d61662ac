//! Color-space conversions for 8-bit RGB frames.
//!
//! Both conversions follow the usual 8-bit camera-pipeline packing so that
//! thresholds written against other tooling carry over unchanged:
//!
//! - **Lab**: sRGB → linear → XYZ (D65) → CIE Lab, then `L * 255 / 100`,
//!   `a + 128`, `b + 128`, rounded and saturated to `u8`.
//! - **HSV**: hue in degrees halved to fit `[0, 180]`, saturation and value
//!   in `[0, 255]`.

use std::sync::OnceLock;

use image::{GrayImage, Luma, RgbImage};

/// D65 reference white, X and Z components (Y = 1).
const WHITE_X: f32 = 0.950456;
const WHITE_Z: f32 = 1.088754;

/// CIE epsilon for the cube-root branch of the Lab transfer function.
const LAB_EPSILON: f32 = 0.008856;

static SRGB_TO_LINEAR_LUT: OnceLock<[f32; 256]> = OnceLock::new();

fn srgb_to_linear(v: u8) -> f32 {
    let table = SRGB_TO_LINEAR_LUT.get_or_init(|| {
        let mut table = [0.0f32; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            let s = i as f32 / 255.0;
            *slot = if s <= 0.04045 {
                s / 12.92
            } else {
                ((s + 0.055) / 1.055).powf(2.4)
            };
        }
        table
    });
    table[v as usize]
}

#[inline]
fn lab_f(t: f32) -> f32 {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

#[inline]
fn saturate_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Which Lab plane to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabChannel {
    /// Lightness `L`.
    Lightness,
    /// Green–red opponent axis (`a`, low = green).
    A,
    /// Blue–yellow opponent axis (`b`, low = blue).
    #[default]
    B,
}

/// Convert one RGB pixel to packed 8-bit Lab.
pub(crate) fn lab_pixel(rgb: [u8; 3]) -> [u8; 3] {
    let r = srgb_to_linear(rgb[0]);
    let g = srgb_to_linear(rgb[1]);
    let b = srgb_to_linear(rgb[2]);

    let x = (0.412453 * r + 0.357580 * g + 0.180423 * b) / WHITE_X;
    let y = 0.212671 * r + 0.715160 * g + 0.072169 * b;
    let z = (0.019334 * r + 0.119193 * g + 0.950227 * b) / WHITE_Z;

    let fy = lab_f(y);
    let l = if y > LAB_EPSILON {
        116.0 * fy - 16.0
    } else {
        903.3 * y
    };
    let a = 500.0 * (lab_f(x) - fy);
    let bb = 200.0 * (fy - lab_f(z));

    [
        saturate_u8(l * 255.0 / 100.0),
        saturate_u8(a + 128.0),
        saturate_u8(bb + 128.0),
    ]
}

/// Hue of one RGB pixel in the halved 8-bit convention (`[0, 180]`).
///
/// Achromatic pixels (including black and white) have hue 0.
pub(crate) fn hue_pixel(rgb: [u8; 3]) -> u8 {
    let r = rgb[0] as f32;
    let g = rgb[1] as f32;
    let b = rgb[2] as f32;
    let v = r.max(g).max(b);
    let diff = v - r.min(g).min(b);
    if diff <= 0.0 {
        return 0;
    }

    let mut h = if v == r {
        60.0 * (g - b) / diff
    } else if v == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    if h < 0.0 {
        h += 360.0;
    }
    saturate_u8(h * 0.5)
}

/// An RGB frame split into its three packed Lab planes.
#[derive(Debug, Clone)]
pub struct LabPlanes {
    pub l: GrayImage,
    pub a: GrayImage,
    pub b: GrayImage,
}

impl LabPlanes {
    /// Convert and split an RGB image.
    pub fn from_rgb(img: &RgbImage) -> Self {
        let (w, h) = img.dimensions();
        let mut l = GrayImage::new(w, h);
        let mut a = GrayImage::new(w, h);
        let mut b = GrayImage::new(w, h);
        for (x, y, px) in img.enumerate_pixels() {
            let lab = lab_pixel(px.0);
            l.put_pixel(x, y, Luma([lab[0]]));
            a.put_pixel(x, y, Luma([lab[1]]));
            b.put_pixel(x, y, Luma([lab[2]]));
        }
        Self { l, a, b }
    }

    pub fn channel(&self, channel: LabChannel) -> &GrayImage {
        match channel {
            LabChannel::Lightness => &self.l,
            LabChannel::A => &self.a,
            LabChannel::B => &self.b,
        }
    }

    pub fn into_channel(self, channel: LabChannel) -> GrayImage {
        match channel {
            LabChannel::Lightness => self.l,
            LabChannel::A => self.a,
            LabChannel::B => self.b,
        }
    }
}

/// Hue plane of an RGB image (halved 8-bit convention).
pub fn hue_plane(img: &RgbImage) -> GrayImage {
    let (w, h) = img.dimensions();
    GrayImage::from_fn(w, h, |x, y| Luma([hue_pixel(img.get_pixel(x, y).0)]))
}
