//! Pointwise complex kernels over equal-length field buffers.

use ndarray::{aview1, aview_mut1, Zip};
use num_complex::Complex;

/// How a complex field is reduced to a real image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Extraction {
    /// |u|²
    Intensity,
    /// |u|
    Amplitude,
}

pub fn complex_mul(a: &[Complex<f32>], b: &[Complex<f32>], out: &mut [Complex<f32>]) {
    Zip::from(aview_mut1(out))
        .and(aview1(a))
        .and(aview1(b))
        .par_for_each(|out, &a, &b| *out = a * b);
}

/// Complex field times a real field of the same length.
pub fn real_mul(a: &[Complex<f32>], b: &[f32], out: &mut [Complex<f32>]) {
    Zip::from(aview_mut1(out))
        .and(aview1(a))
        .and(aview1(b))
        .par_for_each(|out, &a, &b| *out = a * b);
}

pub fn complex_sub(a: &[Complex<f32>], b: &[Complex<f32>], out: &mut [Complex<f32>]) {
    Zip::from(aview_mut1(out))
        .and(aview1(a))
        .and(aview1(b))
        .par_for_each(|out, &a, &b| *out = a - b);
}

pub fn extract(field: &[Complex<f32>], out: &mut [f32], extraction: Extraction) {
    let zip = Zip::from(aview_mut1(out)).and(aview1(field));
    match extraction {
        Extraction::Intensity => zip.par_for_each(|out, e| *out = e.norm_sqr()),
        Extraction::Amplitude => zip.par_for_each(|out, e| *out = e.norm()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elementwise_arithmetic() {
        let a = [Complex::new(1.0, 2.0), Complex::new(-1.0, 0.5)];
        let b = [Complex::new(0.0, 1.0), Complex::new(2.0, -2.0)];
        let mut out = [Complex::default(); 2];

        complex_mul(&a, &b, &mut out);
        assert_eq!(out, [Complex::new(-2.0, 1.0), Complex::new(-1.0, 3.0)]);

        complex_sub(&a, &b, &mut out);
        assert_eq!(out, [Complex::new(1.0, 1.0), Complex::new(-3.0, 2.5)]);

        real_mul(&a, &[0.0, 2.0], &mut out);
        assert_eq!(out, [Complex::new(0.0, 0.0), Complex::new(-2.0, 1.0)]);
    }

    #[test]
    fn extraction_modes() {
        let field = [Complex::new(3.0, 4.0), Complex::new(0.0, -2.0)];
        let mut out = [0.0; 2];
        extract(&field, &mut out, Extraction::Intensity);
        assert_eq!(out, [25.0, 4.0]);
        extract(&field, &mut out, Extraction::Amplitude);
        assert_eq!(out, [5.0, 2.0]);
    }
}
