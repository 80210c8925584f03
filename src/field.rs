use crate::Error;
use ndarray::Array2;
use num_complex::Complex;
use serde::Deserialize;
use std::fmt;

/// Transverse grid shape, `height` rows by `width` columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct Shape {
    pub height: usize,
    pub width: usize,
}

impl Shape {
    pub fn new(height: usize, width: usize) -> Self {
        Shape { height, width }
    }

    /// Number of grid points, H·W.
    pub fn points(&self) -> usize {
        self.height * self.width
    }

    /// Number of `f32` words in an interleaved complex field of this shape, 2·H·W.
    pub fn complex_len(&self) -> usize {
        2 * self.points()
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn is_degenerate(&self) -> bool {
        self.height == 0 || self.width == 0
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.height, self.width)
    }
}

/// Physical sample spacing, in wavelengths.
///
/// `x` is the spacing along the width (column) axis, `y` along the height (row) axis, and `z` along the optical axis.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct Resolution {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Resolution {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Resolution { x, y, z }
    }

    pub fn uniform(pitch: f32) -> Self {
        Resolution::new(pitch, pitch, pitch)
    }

    pub(crate) fn is_valid(&self) -> bool {
        [self.x, self.y, self.z]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution::uniform(0.1)
    }
}

/// Illumination direction as a pair of transverse direction cosines.
///
/// `c_alpha` is measured along the row (height) axis and `c_beta` along the column (width) axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
pub struct Angle {
    pub c_alpha: f32,
    pub c_beta: f32,
}

impl Angle {
    pub fn new(c_alpha: f32, c_beta: f32) -> Self {
        Angle { c_alpha, c_beta }
    }

    pub(crate) fn is_finite(&self) -> bool {
        self.c_alpha.is_finite() && self.c_beta.is_finite()
    }
}

impl From<(f32, f32)> for Angle {
    fn from((c_alpha, c_beta): (f32, f32)) -> Self {
        Angle::new(c_alpha, c_beta)
    }
}

/// A complex field stored as interleaved (re, im) pairs in row-major order.
///
/// The shape travels with the buffer, the length is always `2·H·W`.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    shape: Shape,
    values: Vec<f32>,
}

impl Field {
    pub fn zeros(shape: Shape) -> Self {
        Field {
            shape,
            values: vec![0.0; shape.complex_len()],
        }
    }

    pub fn from_interleaved(shape: Shape, values: Vec<f32>) -> Result<Self, Error> {
        if values.len() != shape.complex_len() {
            return Err(Error::Precondition(format!(
                "field of shape {} needs {} values, got {}",
                shape,
                shape.complex_len(),
                values.len()
            )));
        }
        Ok(Field { shape, values })
    }

    pub fn from_array(values: &Array2<Complex<f32>>) -> Self {
        let (height, width) = values.dim();
        let shape = Shape::new(height, width);
        let mut field = Field::zeros(shape);
        for (dst, src) in field.as_complex_mut().iter_mut().zip(values.iter()) {
            *dst = *src;
        }
        field
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn as_interleaved(&self) -> &[f32] {
        &self.values
    }

    pub fn into_interleaved(self) -> Vec<f32> {
        self.values
    }

    pub fn as_complex(&self) -> &[Complex<f32>] {
        bytemuck::cast_slice(&self.values)
    }

    pub fn as_complex_mut(&mut self) -> &mut [Complex<f32>] {
        bytemuck::cast_slice_mut(&mut self.values)
    }

    pub fn to_array(&self) -> Array2<Complex<f32>> {
        let (h, w) = self.shape.dims();
        let values = self.as_complex();
        Array2::from_shape_fn((h, w), |(i, j)| values[i * w + j])
    }

    /// Calculates the sum of the squared norm of the field.
    pub fn power(&self) -> f32 {
        self.as_complex()
            .iter()
            .fold(0.0, |sum, v| sum + v.norm_sqr())
    }
}
