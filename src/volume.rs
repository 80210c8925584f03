use crate::Shape;
use ndarray::{Array2, Array3, Axis};

/// Ordered stack of refractive-index slices, outermost axis is depth.
///
/// The declared shape is kept separately from the slices, which are checked against it when a model run starts.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexVolume {
    shape: Shape,
    slices: Vec<Array2<f32>>,
}

impl IndexVolume {
    pub fn new(shape: Shape, slices: Vec<Array2<f32>>) -> Self {
        IndexVolume { shape, slices }
    }

    /// Volume from a `(depth, height, width)` array.
    pub fn from_array(volume: &Array3<f32>) -> Self {
        let (_, h, w) = volume.dim();
        IndexVolume {
            shape: Shape::new(h, w),
            slices: volume.axis_iter(Axis(0)).map(|s| s.to_owned()).collect(),
        }
    }

    pub fn uniform(shape: Shape, depth: usize, value: f32) -> Self {
        IndexVolume {
            shape,
            slices: vec![Array2::from_elem(shape.dims(), value); depth],
        }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn depth(&self) -> usize {
        self.slices.len()
    }

    pub fn slices(&self) -> &[Array2<f32>] {
        &self.slices
    }

    /// Describes the first inconsistency found, if any.
    pub(crate) fn check(&self) -> Result<(), String> {
        if self.shape.is_degenerate() {
            return Err(format!("declared shape {} has no grid points", self.shape));
        }
        if self.slices.is_empty() {
            return Err("index volume has no slices".to_string());
        }
        for (i, slice) in self.slices.iter().enumerate() {
            let (h, w) = slice.dim();
            if (h, w) != self.shape.dims() {
                return Err(format!(
                    "slice {} has shape {}x{}, declared shape is {}",
                    i, h, w, self.shape
                ));
            }
            if let Some(v) = slice.iter().find(|v| !v.is_finite()) {
                return Err(format!("slice {} holds non-finite index {}", i, v));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::IndexVolume;
    use crate::Shape;
    use ndarray::{Array2, Array3};

    #[test]
    fn array_volume_declares_its_slice_shape() {
        let volume = IndexVolume::from_array(&Array3::from_elem((3, 4, 5), 1.33));
        assert_eq!(volume.shape(), Shape::new(4, 5));
        assert_eq!(volume.depth(), 3);
        assert!(volume.check().is_ok());
    }

    #[test]
    fn mismatched_slice_is_reported() {
        let shape = Shape::new(4, 4);
        let slices = vec![Array2::zeros((4, 4)), Array2::zeros((4, 3))];
        let err = IndexVolume::new(shape, slices).check().unwrap_err();
        assert!(err.contains("slice 1"), "{}", err);
    }

    #[test]
    fn empty_and_degenerate_volumes_are_rejected() {
        assert!(IndexVolume::new(Shape::new(2, 2), vec![]).check().is_err());
        assert!(IndexVolume::uniform(Shape::new(0, 2), 1, 1.0).check().is_err());
    }

    #[test]
    fn non_finite_index_is_rejected() {
        let mut volume = Array3::from_elem((1, 2, 2), 1.0);
        volume[[0, 1, 1]] = f32::NAN;
        assert!(IndexVolume::from_array(&volume).check().is_err());
    }
}
