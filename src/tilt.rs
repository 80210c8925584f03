//! Incident plane waves for oblique illumination.

use crate::{Angle, Resolution};
use ndarray::{ArrayViewMut2, Zip};
use num_complex::Complex;
use std::f32::consts::PI;

/// Number of phase cycles across the grid along (rows, columns) for `angle`.
///
/// With `truncate` the counts are rounded toward zero so the wave is periodic on the grid.
pub fn tilt_factors(angle: Angle, (h, w): (usize, usize), resolution: Resolution, truncate: bool) -> (f32, f32) {
    let fy = angle.c_alpha * h as f32 * resolution.y;
    let fx = angle.c_beta * w as f32 * resolution.x;
    if truncate {
        (fy.trunc(), fx.trunc())
    } else {
        (fy, fx)
    }
}

/// Fill `out` with a unit-amplitude plane wave travelling along `angle`.
///
/// The phase is referenced to the grid centre `(H/2, W/2)`, where the field is exactly one.
pub fn tilt(out: ArrayViewMut2<Complex<f32>>, angle: Angle, resolution: Resolution, truncate: bool) {
    let (h, w) = out.dim();
    let (fy, fx) = tilt_factors(angle, (h, w), resolution, truncate);
    let ky = 2.0 * PI * fy / h as f32;
    let kx = 2.0 * PI * fx / w as f32;

    Zip::indexed(out).par_for_each(|(y, x), e| {
        let y = y as f32 - (h / 2) as f32;
        let x = x as f32 - (w / 2) as f32;
        *e = Complex::new(0.0, ky * y + kx * x).exp();
    });
}

#[cfg(test)]
mod tests {
    use super::{tilt, tilt_factors};
    use crate::fft2::fft2;
    use crate::{Angle, Resolution};
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;
    use num_complex::Complex;

    #[test]
    fn normal_incidence_is_flat() {
        let mut field = Array2::zeros((4, 5));
        tilt(field.view_mut(), Angle::default(), Resolution::uniform(0.1), true);
        assert!(field.iter().all(|&e| e == Complex::new(1.0, 0.0)));
    }

    #[test]
    fn centre_is_unity() {
        let mut field = Array2::zeros((6, 8));
        tilt(field.view_mut(), Angle::new(0.31, -0.47), Resolution::uniform(0.5), false);
        assert_abs_diff_eq!(field[[3, 4]].re, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(field[[3, 4]].im, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn truncation_rounds_toward_zero() {
        let res = Resolution::uniform(0.1);
        let (fy, fx) = tilt_factors(Angle::new(0.49, -0.33), (64, 64), res, true);
        assert_eq!((fy, fx), (3.0, -2.0));
        let (fy, fx) = tilt_factors(Angle::new(0.49, -0.33), (64, 64), res, false);
        assert_abs_diff_eq!(fy, 3.136, epsilon = 1e-4);
        assert_abs_diff_eq!(fx, -2.112, epsilon = 1e-4);
    }

    #[test]
    fn truncated_wave_is_a_single_frequency() {
        let mut field = Array2::zeros((8, 8));
        // 0.3·8·1.0 = 2.4 cycles down the rows, truncated to 2
        tilt(field.view_mut(), Angle::new(0.3, 0.0), Resolution::uniform(1.0), true);
        let spectrum = fft2(field);
        let peak = spectrum[[2, 0]].norm();
        assert_abs_diff_eq!(peak, 8.0, epsilon = 1e-3);
        let rest: f32 = spectrum.iter().map(|e| e.norm_sqr()).sum::<f32>() - peak * peak;
        assert!(rest.abs() < 1e-3, "leakage {}", rest);
    }

    #[test]
    fn amplitude_is_unity_everywhere() {
        let mut field = Array2::zeros((5, 7));
        tilt(field.view_mut(), Angle::new(-0.2, 0.6), Resolution::new(0.2, 0.3, 0.1), false);
        for e in field.iter() {
            assert_abs_diff_eq!(e.norm(), 1.0, epsilon = 1e-5);
        }
    }
}
