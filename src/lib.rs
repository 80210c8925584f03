//! Multi-slice optical forward models for refractive-index volumes.
//!
//! A volume of index slices is illuminated by tilted plane waves and the field leaving the last slice is refocused,
//! filtered by the collection pupil and reduced to an image, one image per illumination angle. Two propagation models
//! share the same primitives:
//!
//! * SSNP (split-step non-paraxial) tracks a field together with its axial derivative, which accounts for
//!   high-angle and back-scattered components.
//! * BPM (beam propagation method) tracks a single paraxial field.
//!
//! All field arithmetic runs through a [`ComputeBackend`](backend::ComputeBackend) as a sequence of named kernels.
//! [`CpuBackend`] executes them on the host.

pub mod backend;
pub mod config;
pub mod error;
pub mod fft2;
mod field;
pub mod gamma;
mod model;
pub mod ops;
mod output;
pub mod propagate;
pub mod pupil;
pub mod scatter;
pub mod tilt;
mod volume;

pub use backend::CpuBackend;
pub use config::{IndexMode, ModelConfig, ModelKind, OutputMode};
pub use error::{Error, Failure, Location, Stage};
pub use field::{Angle, Field, Resolution, Shape};
pub use model::ForwardModel;
pub use output::Image;
pub use volume::IndexVolume;
