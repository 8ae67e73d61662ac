//! Rotational ordering of calibration markers.
//!
//! Angles are measured in image coordinates (y axis pointing down), so an
//! increasing angle is a clockwise turn as seen on screen.

/// Direction of `v` in degrees, in `[0, 360)`.
#[inline]
fn direction_deg(v: [f64; 2]) -> f64 {
    let a = v[1].atan2(v[0]).to_degrees();
    if a < 0.0 {
        a + 360.0
    } else {
        a
    }
}

/// Signed clockwise angle in degrees from `from` to `to`, both taken relative
/// to `pivot`. The result lies in `[-180, 180]`: the shorter way round, with
/// the sign giving the turn direction.
pub fn clockwise_angle_deg(from: [f32; 2], to: [f32; 2], pivot: [f32; 2]) -> f64 {
    let v1 = [
        from[0] as f64 - pivot[0] as f64,
        from[1] as f64 - pivot[1] as f64,
    ];
    let v2 = [to[0] as f64 - pivot[0] as f64, to[1] as f64 - pivot[1] as f64];

    let delta = direction_deg(v2) - direction_deg(v1);
    let abs = delta.abs();
    if abs > 180.0 {
        -delta.signum() * (360.0 - abs)
    } else {
        delta
    }
}

/// Clockwise sweep in `[0, 360)` from `from` to `to` around `pivot`.
pub fn clockwise_sweep_deg(from: [f32; 2], to: [f32; 2], pivot: [f32; 2]) -> f64 {
    let a = clockwise_angle_deg(from, to, pivot);
    if a < 0.0 {
        360.0 + a
    } else {
        a
    }
}

/// `[primary, secondaries...]` with the secondaries sorted by ascending
/// clockwise sweep from the primary, in whole degrees. Secondaries within
/// the same degree keep their input order.
pub fn order_clockwise(pivot: [f32; 2], primary: [f32; 2], secondaries: [[f32; 2]; 3]) -> [[f32; 2]; 4] {
    let mut keyed: Vec<(f64, [f32; 2])> = secondaries
        .iter()
        .map(|&p| (clockwise_sweep_deg(primary, p, pivot).floor(), p))
        .collect();
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));

    [primary, keyed[0].1, keyed[1].1, keyed[2].1]
}
