//! Contour candidates and their per-channel scores.

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, Contour};
use imageproc::point::Point;

use crate::preprocess::masked_mean;

use super::enclosing_circle::min_enclosing_circle;

/// One foreground contour considered as a marker.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    /// Minimal enclosing circle center, ROI pixels.
    pub center: [f32; 2],
    /// Contour area (shoelace over the traced border pixels).
    pub area: f64,
    /// Top-left of the contour bounding box.
    pub origin: [u32; 2],
    /// Filled contour polygon, sized to the bounding box.
    pub mask: GrayImage,
}

impl Candidate {
    pub fn score(&self, channel: &GrayImage) -> f64 {
        masked_mean(channel, self.origin, &self.mask)
    }
}

fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0i64;
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        twice += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    twice.abs() as f64 * 0.5
}

fn rasterize(contour: &Contour<i32>) -> Option<([u32; 2], GrayImage)> {
    let pts = &contour.points;
    let min_x = pts.iter().map(|p| p.x).min()?;
    let min_y = pts.iter().map(|p| p.y).min()?;
    let max_x = pts.iter().map(|p| p.x).max()?;
    let max_y = pts.iter().map(|p| p.y).max()?;
    if min_x < 0 || min_y < 0 {
        return None;
    }

    let w = (max_x - min_x + 1) as u32;
    let h = (max_y - min_y + 1) as u32;
    let mut mask = GrayImage::new(w, h);

    let mut local: Vec<Point<i32>> = pts
        .iter()
        .map(|p| Point::new(p.x - min_x, p.y - min_y))
        .collect();
    // The polygon filler rejects an explicitly closed ring.
    while local.len() > 1 && local.first() == local.last() {
        local.pop();
    }

    if local.len() < 3 {
        for p in &local {
            mask.put_pixel(p.x as u32, p.y as u32, Luma([255]));
        }
    } else {
        imageproc::drawing::draw_polygon_mut(&mut mask, &local, Luma([255]));
    }

    Some(([min_x as u32, min_y as u32], mask))
}

/// All contours (outer and hole borders) of `foreground` whose area is at
/// least `min_area`, in tracing order.
pub(crate) fn extract_candidates(foreground: &GrayImage, min_area: f64) -> Vec<Candidate> {
    let contours = find_contours::<i32>(foreground);
    let total = contours.len();

    let candidates: Vec<Candidate> = contours
        .iter()
        .filter_map(|contour| {
            let area = polygon_area(&contour.points);
            if area < min_area {
                return None;
            }
            let pts: Vec<[f64; 2]> = contour
                .points
                .iter()
                .map(|p| [p.x as f64, p.y as f64])
                .collect();
            let circle = min_enclosing_circle(&pts)?;
            let (origin, mask) = rasterize(contour)?;
            Some(Candidate {
                center: [circle.center[0] as f32, circle.center[1] as f32],
                area,
                origin,
                mask,
            })
        })
        .collect();

    tracing::debug!(
        contours = total,
        kept = candidates.len(),
        min_area,
        "marker contour candidates"
    );
    candidates
}

/// Candidate indices sorted by descending score on `channel`; equal scores
/// keep tracing order.
pub(crate) fn rank_by(candidates: &[Candidate], channel: &GrayImage) -> Vec<(usize, f64)> {
    let mut ranked: Vec<(usize, f64)> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, c.score(channel)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
    use imageproc::rect::Rect;

    #[test]
    fn shoelace_area_of_square() {
        let sq = [
            Point::new(0, 0),
            Point::new(4, 0),
            Point::new(4, 4),
            Point::new(0, 4),
        ];
        assert_eq!(polygon_area(&sq), 16.0);
        assert_eq!(polygon_area(&sq[..2]), 0.0);
    }

    #[test]
    fn filled_square_yields_one_centered_candidate() {
        let mut fg = GrayImage::new(40, 30);
        draw_filled_rect_mut(&mut fg, Rect::at(10, 5).of_size(11, 11), Luma([255]));

        let cands = extract_candidates(&fg, 1.0);
        assert_eq!(cands.len(), 1);
        let c = &cands[0];
        assert!((c.center[0] - 15.0).abs() < 1e-4);
        assert!((c.center[1] - 10.0).abs() < 1e-4);
        assert_eq!(c.origin, [10, 5]);
        assert_eq!(c.mask.dimensions(), (11, 11));
        assert_eq!(c.area, 100.0);
        for (x, y) in [(0, 0), (10, 0), (5, 5), (0, 10), (10, 10)] {
            assert_eq!(c.mask.get_pixel(x, y)[0], 255);
        }
    }

    #[test]
    fn ring_reports_outer_and_hole_borders() {
        let mut fg = GrayImage::new(40, 40);
        draw_filled_circle_mut(&mut fg, (20, 20), 12, Luma([255]));
        draw_filled_circle_mut(&mut fg, (20, 20), 5, Luma([0]));

        let cands = extract_candidates(&fg, 1.0);
        assert_eq!(cands.len(), 2);
        for c in &cands {
            assert!((c.center[0] - 20.0).abs() < 1.0);
            assert!((c.center[1] - 20.0).abs() < 1.0);
        }
    }

    #[test]
    fn small_blobs_are_filtered_by_area() {
        let mut fg = GrayImage::new(50, 20);
        draw_filled_rect_mut(&mut fg, Rect::at(2, 2).of_size(3, 3), Luma([255]));
        draw_filled_rect_mut(&mut fg, Rect::at(20, 2).of_size(12, 12), Luma([255]));

        assert_eq!(extract_candidates(&fg, 0.0).len(), 2);
        let big = extract_candidates(&fg, 50.0);
        assert_eq!(big.len(), 1);
        assert_eq!(big[0].origin, [20, 2]);
    }

    #[test]
    fn single_pixel_contour_is_rasterized() {
        let mut fg = GrayImage::new(8, 8);
        fg.put_pixel(3, 4, Luma([255]));
        let cands = extract_candidates(&fg, 0.0);
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].origin, [3, 4]);
        assert_eq!(cands[0].mask.as_raw(), &vec![255]);
    }

    #[test]
    fn ranking_is_descending_and_stable() {
        let mut fg = GrayImage::new(60, 20);
        for x0 in [2, 22, 42] {
            draw_filled_rect_mut(&mut fg, Rect::at(x0, 4).of_size(10, 10), Luma([255]));
        }
        let cands = extract_candidates(&fg, 1.0);
        assert_eq!(cands.len(), 3);

        let origins: Vec<u32> = cands.iter().map(|c| c.origin[0]).collect();
        assert_eq!(origins, vec![2, 22, 42]);

        let channel = GrayImage::from_fn(60, 20, |x, _| {
            Luma([if (20..40).contains(&x) { 200 } else { 90 }])
        });
        let order: Vec<usize> = rank_by(&cands, &channel).iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![1, 0, 2]);
    }
}
