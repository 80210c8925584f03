//! Axial propagation of frequency-domain fields.
//!
//! The split-step non-paraxial (SSNP) model carries a field `U` together with its axial derivative `∂U`.
//! Over a step `dz` each frequency component evolves by the 2×2 transfer matrix
//!
//! ```text
//! | cos(kz·dz)        sin(kz·dz)/kz |
//! | -kz·sin(kz·dz)    cos(kz·dz)    |
//! ```
//!
//! with `kz = 2π·res_z·γ`, scaled by a smooth damping factor for components near or beyond the evanescent cutoff.
//! The paraxial beam propagation method (BPM) uses the scalar phase factor `exp(i·kz·eva·dz)` instead.

use ndarray::{aview1, aview_mut1, Zip};
use num_complex::Complex;
use std::f32::consts::PI;

/// Guard added to `kz` wherever it is a denominator.
pub const KZ_EPSILON: f32 = 1e-12;

/// Direction cosine below which components are progressively damped.
pub const EVANESCENT_THRESHOLD: f32 = 0.2;

/// Axial wavenumber, in radians per slice, for a direction cosine `gamma` at axial pitch `res_z`.
#[inline]
pub fn wavenumber(gamma: f32, res_z: f32) -> f32 {
    2.0 * PI * res_z * gamma
}

/// `exp(min((γ - 0.2)·5, 0))`: exactly one on the propagating band, decaying towards the cutoff.
#[inline]
pub fn evanescent_damping(gamma: f32) -> f32 {
    ((gamma - EVANESCENT_THRESHOLD) * 5.0).min(0.0).exp()
}

/// Per-point SSNP transfer matrix over one axial step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransferMatrix {
    pub p00: f32,
    pub p01: f32,
    pub p10: f32,
    pub p11: f32,
}

impl TransferMatrix {
    pub fn new(gamma: f32, res_z: f32, dz: f32) -> Self {
        let kz = wavenumber(gamma, res_z);
        let eva = evanescent_damping(gamma);
        let (sin, cos) = (kz * dz).sin_cos();
        TransferMatrix {
            p00: cos * eva,
            p01: sin / (kz + KZ_EPSILON) * eva,
            p10: -sin * kz * eva,
            p11: cos * eva,
        }
    }

    #[inline]
    pub fn apply(&self, u: Complex<f32>, ud: Complex<f32>) -> (Complex<f32>, Complex<f32>) {
        (u * self.p00 + ud * self.p01, u * self.p10 + ud * self.p11)
    }
}

/// Advance the (U, ∂U) pair by `dz` slices. A negative `dz` propagates backwards.
pub fn diffract(
    gamma: &[f32],
    u: &[Complex<f32>],
    ud: &[Complex<f32>],
    u_out: &mut [Complex<f32>],
    ud_out: &mut [Complex<f32>],
    res_z: f32,
    dz: f32,
) {
    Zip::from(aview_mut1(u_out))
        .and(aview_mut1(ud_out))
        .and(aview1(gamma))
        .and(aview1(u))
        .and(aview1(ud))
        .par_for_each(|u_out, ud_out, &g, &u, &ud| {
            let (u_new, ud_new) = TransferMatrix::new(g, res_z, dz).apply(u, ud);
            *u_out = u_new;
            *ud_out = ud_new;
        });
}

/// Advance a scalar paraxial field by `dz` slices.
pub fn diffract_bpm(
    gamma: &[f32],
    field: &[Complex<f32>],
    out: &mut [Complex<f32>],
    res_z: f32,
    dz: f32,
) {
    Zip::from(aview_mut1(out))
        .and(aview1(gamma))
        .and(aview1(field))
        .par_for_each(|out, &g, &e| {
            let phase = wavenumber(g, res_z) * evanescent_damping(g) * dz;
            *out = e * Complex::new(0.0, phase).exp();
        });
}

/// Convert forward/backward travelling amplitudes into the (U, ∂U) representation.
///
/// `U = f + b` and `∂U = i·kz·(f - b)`.
pub fn merge_prop(
    gamma: &[f32],
    forward: &[Complex<f32>],
    backward: &[Complex<f32>],
    u_out: &mut [Complex<f32>],
    ud_out: &mut [Complex<f32>],
    res_z: f32,
) {
    Zip::from(aview_mut1(u_out))
        .and(aview_mut1(ud_out))
        .and(aview1(gamma))
        .and(aview1(forward))
        .and(aview1(backward))
        .par_for_each(|u, ud, &g, &f, &b| {
            let kz = wavenumber(g, res_z);
            *u = f + b;
            *ud = (f - b) * Complex::new(0.0, kz);
        });
}

/// Inverse of [`merge_prop`]: recover the forward and backward travelling amplitudes from (U, ∂U).
pub fn split_prop(
    gamma: &[f32],
    u: &[Complex<f32>],
    ud: &[Complex<f32>],
    forward_out: &mut [Complex<f32>],
    backward_out: &mut [Complex<f32>],
    res_z: f32,
) {
    Zip::from(aview_mut1(forward_out))
        .and(aview_mut1(backward_out))
        .and(aview1(gamma))
        .and(aview1(u))
        .and(aview1(ud))
        .par_for_each(|f, b, &g, &u, &ud| {
            let kz = wavenumber(g, res_z) + KZ_EPSILON;
            let backward = (u + Complex::new(0.0, 1.0) * ud / kz) * 0.5;
            *b = backward;
            *f = u - backward;
        });
}
