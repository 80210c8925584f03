//! Multi-slice forward model.
//!
//! Each illumination angle runs through the same sequence of stages: the tilted plane wave is transformed into the
//! frequency domain, stepped through every slice of the index volume with a diffraction step followed by a
//! scattering step, refocused to the nominal focal plane, filtered by the collection pupil and finally brought back
//! to the spatial domain to form the image.

use crate::backend::{
    BackendError, BufferUsage, ComputeBackend, DeviceBuffer, Element, Kernel, WORD,
};
use crate::error::{Failure, Location, Stage};
use crate::fft2::Direction;
use crate::ops::Extraction;
use crate::scatter::ScatterParams;
use crate::{Angle, Error, Image, IndexVolume, ModelConfig, ModelKind, OutputMode, Shape};
use log::{debug, info, trace};
use std::mem;
use uuid::Uuid;

/// Forward model bound to a compute backend.
pub struct ForwardModel<'b> {
    backend: &'b dyn ComputeBackend,
    config: ModelConfig,
}

impl<'b> ForwardModel<'b> {
    pub fn new(backend: &'b dyn ComputeBackend, config: ModelConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(ForwardModel { backend, config })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Computes one exit-plane image per illumination angle, in the order the angles are given.
    ///
    /// * `volume` - Refractive index slices, first slice nearest the source
    /// * `angles` - Illumination direction cosines. An empty list yields an empty result without touching the backend.
    ///
    /// Any failure aborts the whole run; no partial results are returned.
    pub fn forward(&self, volume: &IndexVolume, angles: &[Angle]) -> Result<Vec<Image>, Error> {
        let run = Uuid::new_v4();
        volume.check().map_err(|detail| {
            Error::run(run, Location::setup(), Stage::Init, Failure::Precondition(detail))
        })?;
        if let Some(index) = angles.iter().position(|angle| !angle.is_finite()) {
            return Err(Error::run(
                run,
                Location::angle(index),
                Stage::Init,
                Failure::Precondition(format!("angle {:?} is not finite", angles[index])),
            ));
        }
        if angles.is_empty() {
            debug!("run {}: no illumination angles", run);
            return Ok(Vec::new());
        }

        info!(
            "run {}: {:?} model over {} with {} slices and {} angles on {}",
            run,
            self.config.model,
            volume.shape(),
            volume.depth(),
            angles.len(),
            self.backend.device_info().name
        );

        let session = Session::open(self.backend, &self.config, run, volume)?;
        let images = angles
            .iter()
            .enumerate()
            .map(|(index, &angle)| session.image(index, angle))
            .collect::<Result<Vec<_>, _>>()?;

        info!("run {}: finished {} images", run, images.len());
        Ok(images)
    }
}

fn at<E: Into<Failure>>(run: Uuid, location: Location, stage: Stage) -> impl FnOnce(E) -> Error {
    move |source| Error::run(run, location, stage, source)
}

/// Device state shared by every angle of one run. Read-only once opened.
struct Session<'a> {
    backend: &'a dyn ComputeBackend,
    config: &'a ModelConfig,
    run: Uuid,
    shape: Shape,
    depth: usize,
    gamma: DeviceBuffer<'a>,
    pupil: DeviceBuffer<'a>,
    /// Scattering potential per slice: real for SSNP, a complex phase screen for BPM.
    potentials: Vec<DeviceBuffer<'a>>,
}

impl<'a> Session<'a> {
    fn open(
        backend: &'a dyn ComputeBackend,
        config: &'a ModelConfig,
        run: Uuid,
        volume: &IndexVolume,
    ) -> Result<Self, Error> {
        let shape = volume.shape();
        let init = at(run, Location::setup(), Stage::Init);
        let (gamma, pupil) = Self::spectral_factors(backend, config, shape).map_err(init)?;

        let mut session = Session {
            backend,
            config,
            run,
            shape,
            depth: volume.depth(),
            gamma,
            pupil,
            potentials: Vec::with_capacity(volume.depth()),
        };
        for (index, slice) in volume.slices().iter().enumerate() {
            let location = Location {
                angle: None,
                slice: Some(index),
            };
            let potential = session
                .potential(slice.iter().copied().collect())
                .map_err(at(run, location, Stage::Init))?;
            session.potentials.push(potential);
        }
        Ok(session)
    }

    /// Gamma and the pupil derived from it, both fixed for the run.
    fn spectral_factors(
        backend: &'a dyn ComputeBackend,
        config: &ModelConfig,
        shape: Shape,
    ) -> Result<(DeviceBuffer<'a>, DeviceBuffer<'a>), BackendError> {
        let bytes = shape.points() * WORD;
        let gamma = DeviceBuffer::new(backend, bytes, BufferUsage::ReadOnly)?;
        backend.dispatch(
            &Kernel::Gamma {
                resolution: config.resolution,
            },
            &[gamma.handle()],
            shape,
        )?;
        let pupil = DeviceBuffer::new(backend, bytes, BufferUsage::ReadOnly)?;
        backend.dispatch(
            &Kernel::Pupil { na: config.na },
            &[gamma.handle(), pupil.handle()],
            shape,
        )?;
        Ok((gamma, pupil))
    }

    fn potential(&self, slice: Vec<f32>) -> Result<DeviceBuffer<'a>, BackendError> {
        let index = DeviceBuffer::with_data(self.backend, &slice, BufferUsage::ReadOnly)?;
        let params = ScatterParams {
            res_z: self.config.resolution.z,
            dz: 1.0,
            n0: self.config.n0,
            background: self.config.background(),
        };
        let (kernel, element) = match self.config.model {
            ModelKind::Ssnp => (Kernel::ScatterFactor(params), Element::Real),
            ModelKind::Bpm => (Kernel::PhaseScreen(params), Element::Complex),
        };
        let potential = self.buffer(element, BufferUsage::ReadOnly)?;
        self.dispatch(kernel, &[&index, &potential])?;
        Ok(potential)
    }

    fn buffer(&self, element: Element, usage: BufferUsage) -> Result<DeviceBuffer<'a>, BackendError> {
        DeviceBuffer::new(self.backend, self.shape.points() * element.words() * WORD, usage)
    }

    fn dispatch(&self, kernel: Kernel, buffers: &[&DeviceBuffer<'_>]) -> Result<(), BackendError> {
        let handles: Vec<_> = buffers.iter().map(|buffer| buffer.handle()).collect();
        self.backend.dispatch(&kernel, &handles, self.shape)
    }

    fn res_z(&self) -> f32 {
        self.config.resolution.z
    }

    fn image(&self, index: usize, angle: Angle) -> Result<Image, Error> {
        debug!(
            "run {}: angle {} ({}, {})",
            self.run, index, angle.c_alpha, angle.c_beta
        );
        let here = Location::angle(index);

        let mut beam = Beam::illuminate(self, angle).map_err(at(self.run, here, Stage::Illuminate))?;
        for slice in 0..self.depth {
            trace!("run {}: angle {} slice {}", self.run, index, slice);
            let location = Location::slice(index, slice);
            beam.diffract(self, 1.0)
                .map_err(at(self.run, location, Stage::Propagate))?;
            beam.scatter(self, &self.potentials[slice])
                .map_err(at(self.run, location, Stage::Scatter))?;
        }

        let refocus = -(self.depth as f32 / 2.0 + self.config.focal_offset);
        beam.diffract(self, refocus)
            .map_err(at(self.run, here, Stage::Refocus))?;
        let filtered = beam.filter(self).map_err(at(self.run, here, Stage::Filter))?;
        self.extract(filtered).map_err(at(self.run, here, Stage::Extract))
    }

    fn extract(&self, spectrum: DeviceBuffer<'a>) -> Result<Image, Failure> {
        let usage = match self.config.output {
            OutputMode::Complex => BufferUsage::HostReadable,
            OutputMode::Intensity | OutputMode::Amplitude => BufferUsage::ReadWrite,
        };
        let exit = self.buffer(Element::Complex, usage)?;
        self.dispatch(
            Kernel::Fft2 {
                direction: Direction::Inverse,
            },
            &[&spectrum, &exit],
        )?;
        drop(spectrum);

        let extraction = match self.config.output {
            OutputMode::Complex => {
                return Image::complex_from_words(self.shape, &exit.read()?)
                    .map_err(|e| Failure::Precondition(e.to_string()));
            }
            OutputMode::Intensity => Extraction::Intensity,
            OutputMode::Amplitude => Extraction::Amplitude,
        };
        let image = self.buffer(Element::Real, BufferUsage::HostReadable)?;
        self.dispatch(Kernel::Extract(extraction), &[&exit, &image])?;
        Image::real_from_words(self.shape, image.read()?)
            .map_err(|e| Failure::Precondition(e.to_string()))
    }
}

/// Frequency-domain state of one illumination angle.
struct Beam<'a> {
    state: State<'a>,
    spatial: DeviceBuffer<'a>,
    product: DeviceBuffer<'a>,
}

enum State<'a> {
    /// The (U, ∂U) pair plus the buffers the next step writes into.
    Ssnp {
        u: DeviceBuffer<'a>,
        ud: DeviceBuffer<'a>,
        next_u: DeviceBuffer<'a>,
        next_ud: DeviceBuffer<'a>,
    },
    Bpm {
        field: DeviceBuffer<'a>,
        next: DeviceBuffer<'a>,
    },
}

impl<'a> Beam<'a> {
    fn illuminate(session: &Session<'a>, angle: Angle) -> Result<Self, BackendError> {
        let config = session.config;
        let complex = || session.buffer(Element::Complex, BufferUsage::ReadWrite);

        let incident = complex()?;
        session.dispatch(
            Kernel::Tilt {
                angle,
                resolution: config.resolution,
                truncate: config.truncate_tilt,
            },
            &[&incident],
        )?;
        let spectrum = complex()?;
        session.dispatch(
            Kernel::Fft2 {
                direction: Direction::Forward,
            },
            &[&incident, &spectrum],
        )?;

        let state = match config.model {
            ModelKind::Ssnp => {
                let zero = DeviceBuffer::with_data(
                    session.backend,
                    &vec![0.0; session.shape.complex_len()],
                    BufferUsage::ReadOnly,
                )?;
                let u = complex()?;
                let ud = complex()?;
                session.dispatch(
                    Kernel::MergeProp {
                        res_z: session.res_z(),
                    },
                    &[&session.gamma, &spectrum, &zero, &u, &ud],
                )?;
                drop(zero);
                State::Ssnp {
                    u,
                    ud,
                    next_u: spectrum,
                    next_ud: complex()?,
                }
            }
            ModelKind::Bpm => State::Bpm {
                field: spectrum,
                next: complex()?,
            },
        };
        Ok(Beam {
            state,
            spatial: incident,
            product: complex()?,
        })
    }

    fn diffract(&mut self, session: &Session<'a>, dz: f32) -> Result<(), BackendError> {
        let res_z = session.res_z();
        match &mut self.state {
            State::Ssnp {
                u,
                ud,
                next_u,
                next_ud,
            } => {
                session.dispatch(
                    Kernel::Diffract { res_z, dz },
                    &[&session.gamma, &*u, &*ud, &*next_u, &*next_ud],
                )?;
                mem::swap(u, next_u);
                mem::swap(ud, next_ud);
            }
            State::Bpm { field, next } => {
                session.dispatch(
                    Kernel::BpmDiffract { res_z, dz },
                    &[&session.gamma, &*field, &*next],
                )?;
                mem::swap(field, next);
            }
        }
        Ok(())
    }

    /// Applies one slice's scattering potential in the spatial domain.
    fn scatter(&mut self, session: &Session<'a>, potential: &DeviceBuffer<'_>) -> Result<(), BackendError> {
        let forward = Kernel::Fft2 {
            direction: Direction::Forward,
        };
        let inverse = Kernel::Fft2 {
            direction: Direction::Inverse,
        };
        match &mut self.state {
            State::Ssnp { u, ud, next_ud, .. } => {
                session.dispatch(inverse, &[&*u, &self.spatial])?;
                session.dispatch(Kernel::RealMul, &[&self.spatial, potential, &self.product])?;
                session.dispatch(forward, &[&self.product, &self.spatial])?;
                session.dispatch(Kernel::ComplexSub, &[&*ud, &self.spatial, &*next_ud])?;
                mem::swap(ud, next_ud);
            }
            State::Bpm { field, .. } => {
                session.dispatch(inverse, &[&*field, &self.spatial])?;
                session.dispatch(Kernel::ComplexMul, &[&self.spatial, potential, &self.product])?;
                session.dispatch(forward, &[&self.product, &*field])?;
            }
        }
        Ok(())
    }

    /// Forward travelling spectrum restricted to the pupil.
    fn filter(self, session: &Session<'a>) -> Result<DeviceBuffer<'a>, BackendError> {
        let Beam { state, spatial, .. } = self;
        let forward = match state {
            State::Ssnp {
                u,
                ud,
                next_u,
                next_ud,
            } => {
                session.dispatch(
                    Kernel::SplitProp {
                        res_z: session.res_z(),
                    },
                    &[&session.gamma, &u, &ud, &next_u, &next_ud],
                )?;
                next_u
            }
            State::Bpm { field, .. } => field,
        };
        session.dispatch(Kernel::RealMul, &[&forward, &session.pupil, &spatial])?;
        Ok(spatial)
    }
}
