//! Simplified 2D positional audio
//!
//! The listener-relative vector is rotated by the listener's facing, scaled
//! by the distance factor and turned into an inverse-square attenuation and
//! a pan value. This is not physically exact; it reproduces the driver's
//! arithmetic.

use crate::channels::Listener;

/// Result of a 2D positional mix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Positional {
    /// Attenuated volume in 0-100 logical units
    pub volume: f64,
    /// Pan in -100..100 logical units
    pub pan: f64,
    /// Squared distance after clamping to at least 1
    pub distance_sq: f64,
}

/// Mix a source at `(x, y)` relative to `listener`
pub fn mix_2d(
    listener: Listener,
    distance_factor: f64,
    x: i16,
    y: i16,
    base_volume: f64,
) -> Positional {
    let angle = f64::from(listener.angle);
    let mut near = 270.0 - angle;
    if listener.angle > 270 {
        near += 360.0;
    }
    let near = near.to_radians();
    let (sin, cos) = near.sin_cos();

    let dx = f64::from(x) - f64::from(listener.x);
    let dy = f64::from(y) - f64::from(listener.y);

    let xv = (dx * cos - dy * sin) / distance_factor;
    let yv = (dx * sin - dy * cos) / distance_factor;

    let xs = xv * xv;
    let mut distance_sq = xs + yv * yv;
    if distance_sq < 1.0 {
        distance_sq = 1.0;
    }

    let pan = if xs.abs() < 1.0 {
        0.0
    } else {
        let sign = xv.signum();
        100.0 * sign - 100.0 / (xs * sign)
    };

    Positional {
        volume: base_volume / distance_sq,
        pan,
        distance_sq,
    }
}
