//! Longitudinal direction cosines of the frequency grid.

use crate::{Resolution, Shape};
use ndarray::{Array2, ArrayViewMut2, Zip};

/// Floor applied to `1 - (c_alpha² + c_beta²)` before the square root.
pub const GAMMA_FLOOR: f32 = 1e-8;

/// Centered, wrapped frequency coordinate of index `i` on an axis of length `n`, in cycles per sample.
///
/// Covers `[-0.5, 0.5)` in FFT order: zero frequency at index 0, negative frequencies in the upper half.
pub fn near_zero(i: usize, n: usize) -> f32 {
    (i as f32 / n as f32 + 0.5) % 1.0 - 0.5
}

/// Transverse direction cosines along one axis of `n` samples at spacing `pitch` (in wavelengths).
pub fn direction_cosines(n: usize, pitch: f32) -> Vec<f32> {
    (0..n).map(|i| near_zero(i, n) / pitch).collect()
}

/// Cosine of the angle between the optical axis and the plane wave at one frequency grid point.
#[inline]
pub fn gamma(c_alpha: f32, c_beta: f32) -> f32 {
    (1.0 - (c_alpha * c_alpha + c_beta * c_beta))
        .max(GAMMA_FLOOR)
        .sqrt()
}

/// Fills a row-major `shape` grid with the direction cosine of every frequency point.
///
/// Values beyond the evanescent boundary are clamped rather than discarded; damping is left to the propagator.
pub fn c_gamma_into(out: ArrayViewMut2<f32>, resolution: Resolution) {
    let (h, w) = out.dim();
    let c_alpha = direction_cosines(h, resolution.y);
    let c_beta = direction_cosines(w, resolution.x);

    Zip::indexed(out).par_for_each(|(i, j), e| {
        *e = gamma(c_alpha[i], c_beta[j]);
    });
}

pub fn c_gamma(shape: Shape, resolution: Resolution) -> Array2<f32> {
    let mut out = Array2::zeros(shape.dims());
    c_gamma_into(out.view_mut(), resolution);
    out
}
