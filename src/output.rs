use crate::Shape;
use ndarray::{Array2, Array3, ShapeError};
use num_complex::Complex;

/// Exit-plane image for one illumination angle.
#[derive(Clone, Debug, PartialEq)]
pub enum Image {
    /// Intensity or amplitude, H×W.
    Real(Array2<f32>),
    /// Real plane followed by imaginary plane, 2×H×W.
    Complex(Array3<f32>),
}

impl Image {
    pub fn shape(&self) -> Shape {
        match self {
            Image::Real(values) => {
                let (h, w) = values.dim();
                Shape::new(h, w)
            }
            Image::Complex(values) => {
                let (_, h, w) = values.dim();
                Shape::new(h, w)
            }
        }
    }

    pub fn as_real(&self) -> Option<&Array2<f32>> {
        match self {
            Image::Real(values) => Some(values),
            Image::Complex(_) => None,
        }
    }

    pub fn as_complex(&self) -> Option<&Array3<f32>> {
        match self {
            Image::Complex(values) => Some(values),
            Image::Real(_) => None,
        }
    }

    pub fn into_real(self) -> Option<Array2<f32>> {
        match self {
            Image::Real(values) => Some(values),
            Image::Complex(_) => None,
        }
    }

    /// Complex images as one complex value per grid point.
    pub fn to_complex_field(&self) -> Option<Array2<Complex<f32>>> {
        let planes = self.as_complex()?;
        let (_, h, w) = planes.dim();
        Some(Array2::from_shape_fn((h, w), |(i, j)| {
            Complex::new(planes[[0, i, j]], planes[[1, i, j]])
        }))
    }

    pub(crate) fn real_from_words(shape: Shape, words: Vec<f32>) -> Result<Self, ShapeError> {
        Array2::from_shape_vec(shape.dims(), words).map(Image::Real)
    }

    /// Splits an interleaved complex buffer into its real and imaginary planes.
    pub(crate) fn complex_from_words(shape: Shape, words: &[f32]) -> Result<Self, ShapeError> {
        let (h, w) = shape.dims();
        let interleaved = Array3::from_shape_vec((h, w, 2), words.to_vec())?;
        let planes = interleaved.permuted_axes([2, 0, 1]);
        Ok(Image::Complex(planes.as_standard_layout().into_owned()))
    }
}
