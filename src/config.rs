//! Model parameters, deserialisable from TOML.

use crate::{Error, Resolution};
use serde::Deserialize;

/// Propagation model used for a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Split-step non-paraxial: tracks the coupled (U, ∂U) pair.
    #[default]
    Ssnp,
    /// Paraxial beam propagation: a single scalar field.
    Bpm,
}

/// Form of the per-angle output image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// |u|², H×W
    #[default]
    Intensity,
    /// |u|, H×W
    Amplitude,
    /// real and imaginary planes, 2×H×W
    Complex,
}

/// How values in the index volume are interpreted.
///
/// Volumes that store the index difference from the medium, such as a phantom generated as `Δn` around zero, need
/// `index = "contrast"`. Reading them as absolute indices subtracts `n0` a second time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    /// Values are refractive indices, the contrast is `n - n0`.
    #[default]
    Absolute,
    /// Values are already the contrast `n - n0`.
    Contrast,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub model: ModelKind,
    pub resolution: Resolution,
    /// Numerical aperture of the collection pupil.
    pub na: f32,
    /// Reference (background) refractive index.
    pub n0: f32,
    pub output: OutputMode,
    /// Round the illumination tilt to a frequency that is periodic on the grid.
    pub truncate_tilt: bool,
    pub index: IndexMode,
    /// Additional back-propagation, in slices, applied when refocusing.
    pub focal_offset: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            model: ModelKind::Ssnp,
            resolution: Resolution::default(),
            na: 0.65,
            n0: 1.33,
            output: OutputMode::Intensity,
            truncate_tilt: true,
            index: IndexMode::Absolute,
            focal_offset: 0.0,
        }
    }
}

impl ModelConfig {
    /// Parse and validate a configuration. Missing keys take their default values.
    pub fn from_toml_str(source: &str) -> Result<Self, Error> {
        let config: ModelConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !self.resolution.is_valid() {
            return Err(Error::InvalidConfig(format!(
                "resolution must be positive and finite, got {:?}",
                self.resolution
            )));
        }
        if !(0.0..=1.0).contains(&self.na) {
            return Err(Error::InvalidConfig(format!(
                "numerical aperture must lie in [0, 1], got {}",
                self.na
            )));
        }
        if !(self.n0.is_finite() && self.n0 > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "reference index must be positive and finite, got {}",
                self.n0
            )));
        }
        if !self.focal_offset.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "focal offset must be finite, got {}",
                self.focal_offset
            )));
        }
        Ok(())
    }

    /// Value subtracted from each voxel to obtain the index contrast.
    pub(crate) fn background(&self) -> f32 {
        match self.index {
            IndexMode::Absolute => self.n0,
            IndexMode::Contrast => 0.0,
        }
    }
}
