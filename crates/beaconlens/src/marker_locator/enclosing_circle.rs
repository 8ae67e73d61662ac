//! Minimal enclosing circle of a point set (randomized incremental method).

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

const SHUFFLE_SEED: u64 = 0x6c65_6473;

/// Relative slack for the point-in-circle test.
const CONTAIN_EPS: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Circle {
    pub center: [f64; 2],
    pub radius: f64,
}

impl Circle {
    fn point(p: [f64; 2]) -> Self {
        Self {
            center: p,
            radius: 0.0,
        }
    }

    fn diameter(a: [f64; 2], b: [f64; 2]) -> Self {
        let center = [(a[0] + b[0]) * 0.5, (a[1] + b[1]) * 0.5];
        Self {
            center,
            radius: dist(center, a),
        }
    }

    /// Circle through three points; falls back to the widest diameter circle
    /// when they are collinear.
    fn circumscribed(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> Self {
        let bx = b[0] - a[0];
        let by = b[1] - a[1];
        let cx = c[0] - a[0];
        let cy = c[1] - a[1];
        let d = 2.0 * (bx * cy - by * cx);
        if d.abs() < 1e-12 {
            let candidates = [Self::diameter(a, b), Self::diameter(a, c), Self::diameter(b, c)];
            return candidates
                .into_iter()
                .max_by(|l, r| l.radius.total_cmp(&r.radius))
                .unwrap_or(Self::point(a));
        }
        let b2 = bx * bx + by * by;
        let c2 = cx * cx + cy * cy;
        let ux = (cy * b2 - by * c2) / d;
        let uy = (bx * c2 - cx * b2) / d;
        let center = [a[0] + ux, a[1] + uy];
        Self {
            center,
            radius: dist(center, a),
        }
    }

    fn contains(&self, p: [f64; 2]) -> bool {
        dist(self.center, p) <= self.radius * (1.0 + CONTAIN_EPS) + CONTAIN_EPS
    }
}

#[inline]
fn dist(a: [f64; 2], b: [f64; 2]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

/// Smallest circle containing every point. `None` for an empty input.
///
/// Points are visited in a fixed pseudo-random order, so the result is
/// reproducible for a given input.
pub(crate) fn min_enclosing_circle(points: &[[f64; 2]]) -> Option<Circle> {
    if points.is_empty() {
        return None;
    }
    let mut pts = points.to_vec();
    let mut rng = StdRng::seed_from_u64(SHUFFLE_SEED);
    pts.shuffle(&mut rng);

    let mut c = Circle::point(pts[0]);
    for i in 1..pts.len() {
        if c.contains(pts[i]) {
            continue;
        }
        c = Circle::point(pts[i]);
        for j in 0..i {
            if c.contains(pts[j]) {
                continue;
            }
            c = Circle::diameter(pts[i], pts[j]);
            for k in 0..j {
                if !c.contains(pts[k]) {
                    c = Circle::circumscribed(pts[i], pts[j], pts[k]);
                }
            }
        }
    }
    Some(c)
}
