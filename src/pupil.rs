use ndarray::{aview1, aview_mut1, Zip};

/// Smallest direction cosine passed by a pupil of numerical aperture `na`.
pub fn cutoff(na: f32) -> f32 {
    (1.0 - na * na).sqrt()
}

/// Binary pupil over the frequency grid: one where `gamma > sqrt(1 - na²)`, zero elsewhere.
///
/// The result is used as a real-valued multiplier on a frequency-domain field.
pub fn binary_pupil(gamma: &[f32], out: &mut [f32], na: f32) {
    let cutoff = cutoff(na);
    Zip::from(aview_mut1(out))
        .and(aview1(gamma))
        .par_for_each(|e, &g| *e = if g > cutoff { 1.0 } else { 0.0 });
}
