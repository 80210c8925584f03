//! Index-dependent scattering terms for one depth slice.

use ndarray::{aview1, aview_mut1, Zip};
use num_complex::Complex;
use std::f32::consts::PI;

/// Parameters shared by the scattering kernels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScatterParams {
    /// Axial sample spacing, in wavelengths.
    pub res_z: f32,
    /// Step length, in slices.
    pub dz: f32,
    /// Reference index.
    pub n0: f32,
    /// Subtracted from each voxel to give the index contrast: `n0` for absolute volumes, zero for contrast volumes.
    pub background: f32,
}

impl ScatterParams {
    /// `(2π·res_z/n0)²·dz`
    pub fn factor(&self) -> f32 {
        let k = 2.0 * PI * self.res_z / self.n0;
        k * k * self.dz
    }

    /// Real coupling strength for one voxel, `factor·Δn·(2·n0 + Δn)`.
    #[inline]
    pub fn coupling(&self, factor: f32, n: f32) -> f32 {
        let dn = n - self.background;
        factor * dn * (2.0 * self.n0 + dn)
    }

    /// Paraxial phase delay for one voxel, `(2π·res_z/n0)·dz·Δn`.
    #[inline]
    pub fn phase(&self, n: f32) -> f32 {
        2.0 * PI * self.res_z / self.n0 * self.dz * (n - self.background)
    }
}

/// Per-voxel SSNP scattering potential of a slice.
pub fn scatter_factor(n: &[f32], out: &mut [f32], params: ScatterParams) {
    let factor = params.factor();
    Zip::from(aview_mut1(out))
        .and(aview1(n))
        .par_for_each(|out, &n| *out = params.coupling(factor, n));
}

/// Per-voxel BPM phase screen of a slice, `exp(i·phase)`.
pub fn phase_screen(n: &[f32], out: &mut [Complex<f32>], params: ScatterParams) {
    Zip::from(aview_mut1(out))
        .and(aview1(n))
        .par_for_each(|out, &n| *out = Complex::new(0.0, params.phase(n)).exp());
}

#[cfg(test)]
mod tests {
    use super::{phase_screen, scatter_factor, ScatterParams};
    use approx::assert_relative_eq;
    use num_complex::Complex;
    use std::f32::consts::PI;

    fn params(background: f32) -> ScatterParams {
        ScatterParams {
            res_z: 0.1,
            dz: 1.0,
            n0: 1.33,
            background,
        }
    }

    #[test]
    fn background_index_does_not_scatter() {
        let n = vec![1.33; 6];
        let mut out = vec![1.0; 6];
        scatter_factor(&n, &mut out, params(1.33));
        assert!(out.iter().all(|&v| v == 0.0));

        let mut screen = vec![Complex::default(); 6];
        phase_screen(&n, &mut screen, params(1.33));
        assert!(screen.iter().all(|&v| v == Complex::new(1.0, 0.0)));
    }

    #[test]
    fn contrast_volume_matches_reference_formula() {
        let dn = 0.01;
        let mut out = vec![0.0; 1];
        scatter_factor(&[dn], &mut out, params(0.0));
        let expected = (2.0 * PI * 0.1 / 1.33f32).powi(2) * dn * (2.0 * 1.33 + dn);
        assert_relative_eq!(out[0], expected, max_relative = 1e-5);
    }

    #[test]
    fn absolute_and_contrast_agree() {
        let mut absolute = vec![0.0; 1];
        let mut contrast = vec![0.0; 1];
        scatter_factor(&[1.36], &mut absolute, params(1.33));
        scatter_factor(&[0.03], &mut contrast, params(0.0));
        assert_relative_eq!(absolute[0], contrast[0], max_relative = 1e-3);
    }

    #[test]
    fn factor_scales_with_step() {
        let mut p = params(0.0);
        let one = p.factor();
        p.dz = 2.0;
        assert_relative_eq!(p.factor(), 2.0 * one, max_relative = 1e-6);
    }
}
