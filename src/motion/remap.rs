//! Rotates a raw `(dx, dy)` delta from phone-sensor space into screen space according to the
//! phone's current screen orientation angle.

/// Rotate `(dx, dy)` by `screen_angle_deg` (the phone's screen-orientation angle, clockwise).
///
/// The four cardinal angles are special-cased to avoid floating point noise on the common
/// case; anything else falls back to the general rotation.
pub fn rotate(dx: f64, dy: f64, screen_angle_deg: f64) -> (f64, f64) {
    let angle = screen_angle_deg.rem_euclid(360.0);
    if (angle - 0.0).abs() < 1e-9 {
        (dx, dy)
    } else if (angle - 90.0).abs() < 1e-9 {
        (-dy, dx)
    } else if (angle - 180.0).abs() < 1e-9 {
        (-dx, -dy)
    } else if (angle - 270.0).abs() < 1e-9 {
        (dy, -dx)
    } else {
        let rad = angle.to_radians();
        let (sin, cos) = rad.sin_cos();
        (dx * cos - dy * sin, dx * sin + dy * cos)
    }
}
