//! Single-channel mask and intensity operations shared by the marker locator
//! and the LED decoder.
//!
//! All masks are `GrayImage`s where any non-zero pixel is "set".

use image::{GrayImage, Luma};

/// Inclusive band on the halved 8-bit hue axis (`[0, 180]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HueRange {
    pub lo: u8,
    pub hi: u8,
}

impl HueRange {
    pub const fn new(lo: u8, hi: u8) -> Self {
        Self { lo, hi }
    }

    #[inline]
    pub fn contains(&self, hue: u8) -> bool {
        hue >= self.lo && hue <= self.hi
    }
}

/// Binary foreground of `gray` at its Otsu level (`> level` is foreground).
///
/// Returns `None` for a flat image, where no two-class split exists.
pub fn otsu_foreground(gray: &GrayImage) -> Option<GrayImage> {
    let raw = gray.as_raw();
    let lo = raw.iter().copied().min()?;
    let hi = raw.iter().copied().max()?;
    if lo == hi {
        return None;
    }

    let level = imageproc::contrast::otsu_level(gray);
    let (w, h) = gray.dimensions();
    Some(GrayImage::from_fn(w, h, |x, y| {
        if gray.get_pixel(x, y)[0] > level {
            Luma([255])
        } else {
            Luma([0])
        }
    }))
}

/// Mask of pixels whose hue falls in any of `ranges`.
pub fn hue_band_mask(hue: &GrayImage, ranges: &[HueRange]) -> GrayImage {
    let (w, h) = hue.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let v = hue.get_pixel(x, y)[0];
        if ranges.iter().any(|r| r.contains(v)) {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Saturating per-pixel `mask - other`.
pub fn subtract_mask(mask: &mut GrayImage, other: &GrayImage) {
    debug_assert_eq!(mask.dimensions(), other.dimensions());
    for (m, o) in mask.iter_mut().zip(other.iter()) {
        *m = m.saturating_sub(*o);
    }
}

/// Stretch the values under `mask` so their min maps to 0 and max to 255.
///
/// Pixels outside the mask are left untouched. If every masked pixel has the
/// same value they all collapse to 0. Returns `false` when the mask is empty.
pub fn normalize_min_max_masked(img: &mut GrayImage, mask: &GrayImage) -> bool {
    debug_assert_eq!(img.dimensions(), mask.dimensions());
    let mut lo = u8::MAX;
    let mut hi = u8::MIN;
    let mut any = false;
    for (&v, &m) in img.iter().zip(mask.iter()) {
        if m != 0 {
            lo = lo.min(v);
            hi = hi.max(v);
            any = true;
        }
    }
    if !any {
        return false;
    }

    let scale = if hi > lo {
        255.0 / (hi - lo) as f32
    } else {
        0.0
    };
    let shift = -(lo as f32) * scale;
    for (v, &m) in img.iter_mut().zip(mask.iter()) {
        if m != 0 {
            *v = (*v as f32 * scale + shift).round().clamp(0.0, 255.0) as u8;
        }
    }
    true
}

/// Bitwise-invert every pixel in place.
pub fn invert(img: &mut GrayImage) {
    image::imageops::invert(img);
}

/// Mean of `img` under `mask`, with the mask's top-left placed at `origin`.
///
/// Mask pixels that land outside `img` are ignored. An empty mask yields 0.
pub fn masked_mean(img: &GrayImage, origin: [u32; 2], mask: &GrayImage) -> f64 {
    let (iw, ih) = img.dimensions();
    let mut sum = 0u64;
    let mut count = 0u64;
    for (mx, my, m) in mask.enumerate_pixels() {
        if m[0] == 0 {
            continue;
        }
        let x = origin[0] + mx;
        let y = origin[1] + my;
        if x >= iw || y >= ih {
            continue;
        }
        sum += img.get_pixel(x, y)[0] as u64;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}
