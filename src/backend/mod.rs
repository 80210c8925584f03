//! Compute backend abstraction.
//!
//! The forward models never touch field data directly. They allocate device buffers, upload inputs, dispatch
//! named [`Kernel`]s over them in program order and read finished images back, all through [`ComputeBackend`].
//! Every buffer is wrapped in a [`DeviceBuffer`] so it is released when the stage that owns it finishes.

use crate::fft2::Direction;
use crate::ops::Extraction;
use crate::scatter::ScatterParams;
use crate::{Angle, Resolution, Shape};
use std::fmt;
use thiserror::Error;

pub mod cpu;

pub use cpu::CpuBackend;

/// Size in bytes of one `f32` word, the unit all buffers are made of.
pub const WORD: usize = std::mem::size_of::<f32>();

/// Errors originating from compute backends.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("allocation of {requested} bytes failed: {reason}")]
    Allocation { requested: usize, reason: String },

    #[error("unknown buffer {0}")]
    UnknownBuffer(BufferHandle),

    #[error("size mismatch on {buffer}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        buffer: BufferHandle,
        expected: usize,
        actual: usize,
    },

    #[error("kernel {kernel} takes {expected} bindings, got {actual}")]
    BindingCount {
        kernel: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("kernel {kernel} binding {index} needs exactly {expected} bytes, buffer {buffer} has {actual}")]
    BindingSizeMismatch {
        kernel: &'static str,
        index: usize,
        buffer: BufferHandle,
        expected: usize,
        actual: usize,
    },

    #[error("kernel {kernel} binds buffer {buffer} more than once with write access")]
    Aliased {
        kernel: &'static str,
        buffer: BufferHandle,
    },

    #[error("buffer {0} is read-only and already written")]
    ReadOnly(BufferHandle),

    #[error("buffer {0} was never written")]
    Unwritten(BufferHandle),

    #[error("buffer {0} is not host readable")]
    NotHostReadable(BufferHandle),

    #[error("kernel {kernel} failed: {detail}")]
    Kernel { kernel: &'static str, detail: String },
}

/// Opaque reference to a device buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Written once, by upload or dispatch, then only read by kernels.
    ReadOnly,
    ReadWrite,
    /// May be copied back to the host.
    HostReadable,
}

/// Describes the capabilities of a compute backend.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub compute_units: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// Element type stored per grid point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Element {
    Real,
    Complex,
}

impl Element {
    pub fn words(&self) -> usize {
        match self {
            Element::Real => 1,
            Element::Complex => 2,
        }
    }
}

/// One slot of a kernel's binding signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Binding {
    pub access: Access,
    pub element: Element,
}

impl Binding {
    const fn new(access: Access, element: Element) -> Self {
        Binding { access, element }
    }

    /// Buffer size a dispatch over `work` binds.
    pub fn required_bytes(&self, work: Shape) -> usize {
        work.points() * self.element.words() * WORD
    }
}

const READ_REAL: Binding = Binding::new(Access::Read, Element::Real);
const READ_COMPLEX: Binding = Binding::new(Access::Read, Element::Complex);
const WRITE_REAL: Binding = Binding::new(Access::Write, Element::Real);
const WRITE_COMPLEX: Binding = Binding::new(Access::Write, Element::Complex);

/// A named kernel together with its scalar parameters.
///
/// Binding order for each kernel is given by [`Kernel::signature`]: inputs first, then outputs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Kernel {
    /// → gamma
    Gamma { resolution: Resolution },
    /// field → transformed
    Fft2 { direction: Direction },
    /// a, b → a·b
    ComplexMul,
    /// complex, real → complex·real
    RealMul,
    /// a, b → a - b
    ComplexSub,
    /// gamma, U, ∂U → U', ∂U'
    Diffract { res_z: f32, dz: f32 },
    /// gamma, field → field'
    BpmDiffract { res_z: f32, dz: f32 },
    /// gamma, forward, backward → U, ∂U
    MergeProp { res_z: f32 },
    /// gamma, U, ∂U → forward, backward
    SplitProp { res_z: f32 },
    /// index slice → real scattering potential
    ScatterFactor(ScatterParams),
    /// index slice → complex phase screen
    PhaseScreen(ScatterParams),
    /// → incident plane wave
    Tilt {
        angle: Angle,
        resolution: Resolution,
        truncate: bool,
    },
    /// gamma → 0/1 mask
    Pupil { na: f32 },
    /// field → real image
    Extract(Extraction),
}

impl Kernel {
    pub fn name(&self) -> &'static str {
        match self {
            Kernel::Gamma { .. } => "gamma",
            Kernel::Fft2 {
                direction: Direction::Forward,
            } => "fft2",
            Kernel::Fft2 {
                direction: Direction::Inverse,
            } => "ifft2",
            Kernel::ComplexMul => "complex_mul",
            Kernel::RealMul => "real_mul",
            Kernel::ComplexSub => "complex_sub",
            Kernel::Diffract { .. } => "diffract",
            Kernel::BpmDiffract { .. } => "bpm_diffract",
            Kernel::MergeProp { .. } => "merge_prop",
            Kernel::SplitProp { .. } => "split_prop",
            Kernel::ScatterFactor(_) => "scatter_factor",
            Kernel::PhaseScreen(_) => "phase_screen",
            Kernel::Tilt { .. } => "tilt",
            Kernel::Pupil { .. } => "pupil",
            Kernel::Extract(_) => "extract",
        }
    }

    pub fn signature(&self) -> &'static [Binding] {
        match self {
            Kernel::Gamma { .. } => &[WRITE_REAL],
            Kernel::Fft2 { .. } => &[READ_COMPLEX, WRITE_COMPLEX],
            Kernel::ComplexMul | Kernel::ComplexSub => {
                &[READ_COMPLEX, READ_COMPLEX, WRITE_COMPLEX]
            }
            Kernel::RealMul => &[READ_COMPLEX, READ_REAL, WRITE_COMPLEX],
            Kernel::Diffract { .. } | Kernel::MergeProp { .. } | Kernel::SplitProp { .. } => &[
                READ_REAL,
                READ_COMPLEX,
                READ_COMPLEX,
                WRITE_COMPLEX,
                WRITE_COMPLEX,
            ],
            Kernel::BpmDiffract { .. } => &[READ_REAL, READ_COMPLEX, WRITE_COMPLEX],
            Kernel::ScatterFactor(_) => &[READ_REAL, WRITE_REAL],
            Kernel::PhaseScreen(_) => &[READ_REAL, WRITE_COMPLEX],
            Kernel::Tilt { .. } => &[WRITE_COMPLEX],
            Kernel::Pupil { .. } => &[READ_REAL, WRITE_REAL],
            Kernel::Extract(_) => &[READ_COMPLEX, WRITE_REAL],
        }
    }
}

/// Checks a dispatch against the kernel's signature.
///
/// `bindings` pairs each handle with the byte size of its buffer, which must match the work size exactly. A handle
/// bound for writing may not appear in any other slot.
pub fn validate_bindings(
    kernel: &Kernel,
    bindings: &[(BufferHandle, usize)],
    work: Shape,
) -> Result<(), BackendError> {
    let signature = kernel.signature();
    if bindings.len() != signature.len() {
        return Err(BackendError::BindingCount {
            kernel: kernel.name(),
            expected: signature.len(),
            actual: bindings.len(),
        });
    }

    for (index, (&(buffer, actual), binding)) in bindings.iter().zip(signature).enumerate() {
        let expected = binding.required_bytes(work);
        if actual != expected {
            return Err(BackendError::BindingSizeMismatch {
                kernel: kernel.name(),
                index,
                buffer,
                expected,
                actual,
            });
        }
        if binding.access == Access::Write
            && bindings
                .iter()
                .enumerate()
                .any(|(other, &(h, _))| other != index && h == buffer)
        {
            return Err(BackendError::Aliased {
                kernel: kernel.name(),
                buffer,
            });
        }
    }
    Ok(())
}

/// Abstraction over compute backends.
///
/// One instance serves a whole run. Dispatches are executed in the order they are issued, and `readback` blocks until
/// every earlier dispatch has completed.
pub trait ComputeBackend: Send + Sync {
    /// Return information about the device.
    fn device_info(&self) -> DeviceInfo;

    fn allocate(&self, size_bytes: usize, usage: BufferUsage) -> Result<BufferHandle, BackendError>;

    /// Copy host data into a device buffer. `data` must fill the buffer exactly.
    fn upload(&self, buffer: BufferHandle, data: &[f32]) -> Result<(), BackendError>;

    fn dispatch(
        &self,
        kernel: &Kernel,
        bindings: &[BufferHandle],
        work: Shape,
    ) -> Result<(), BackendError>;

    /// Copy the first `size_bytes` of a written, host readable buffer back to the host.
    fn readback(&self, buffer: BufferHandle, size_bytes: usize) -> Result<Vec<f32>, BackendError>;

    fn release(&self, buffer: BufferHandle);
}

/// A device buffer released on drop.
pub struct DeviceBuffer<'b> {
    backend: &'b dyn ComputeBackend,
    handle: BufferHandle,
    size_bytes: usize,
}

impl<'b> DeviceBuffer<'b> {
    pub fn new(
        backend: &'b dyn ComputeBackend,
        size_bytes: usize,
        usage: BufferUsage,
    ) -> Result<Self, BackendError> {
        let handle = backend.allocate(size_bytes, usage)?;
        Ok(DeviceBuffer {
            backend,
            handle,
            size_bytes,
        })
    }

    pub fn with_data(
        backend: &'b dyn ComputeBackend,
        data: &[f32],
        usage: BufferUsage,
    ) -> Result<Self, BackendError> {
        let buffer = DeviceBuffer::new(backend, data.len() * WORD, usage)?;
        backend.upload(buffer.handle, data)?;
        Ok(buffer)
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn read(&self) -> Result<Vec<f32>, BackendError> {
        self.backend.readback(self.handle, self.size_bytes)
    }
}

impl Drop for DeviceBuffer<'_> {
    fn drop(&mut self) {
        self.backend.release(self.handle);
    }
}

impl fmt::Debug for DeviceBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("handle", &self.handle)
            .field("size_bytes", &self.size_bytes)
            .finish()
    }
}
