//! Host backend. Buffers live in host memory and kernels run on the Rayon thread pool.

use super::{
    validate_bindings, Access, BackendError, BufferHandle, BufferUsage, ComputeBackend,
    DeviceInfo, Kernel, WORD,
};
use crate::fft2::{fft2_inplace, Direction, Fft2Plan};
use crate::{gamma, ops, propagate, pupil, scatter, tilt, Shape};
use log::{trace, warn};
use ndarray::{ArrayViewMut2, ShapeError};
use num_complex::Complex;
use parking_lot::Mutex;
use rustfft::FftPlanner;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

struct Stored {
    words: Vec<f32>,
    usage: BufferUsage,
    written: bool,
}

/// CPU backend that runs every kernel with the same `f32` formulas a device would.
pub struct CpuBackend {
    buffers: Mutex<HashMap<BufferHandle, Stored>>,
    plans: Mutex<HashMap<(Shape, Direction), Fft2Plan>>,
    next_handle: AtomicU64,
    num_threads: usize,
}

impl CpuBackend {
    pub fn new() -> Self {
        CpuBackend {
            buffers: Mutex::new(HashMap::new()),
            plans: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(0),
            num_threads: rayon::current_num_threads(),
        }
    }

    /// Number of buffers currently allocated.
    pub fn live_buffers(&self) -> usize {
        self.buffers.lock().len()
    }

    fn plan(&self, shape: Shape, direction: Direction) -> Fft2Plan {
        self.plans
            .lock()
            .entry((shape, direction))
            .or_insert_with(|| Fft2Plan::new(&mut FftPlanner::new(), shape, direction))
            .clone()
    }

    fn execute(
        &self,
        kernel: &Kernel,
        inputs: &[&[f32]],
        outputs: &mut [Vec<f32>],
        work: Shape,
    ) -> Result<(), BackendError> {
        let n = work.points();
        let fail = |e: ShapeError| BackendError::Kernel {
            kernel: kernel.name(),
            detail: e.to_string(),
        };

        match *kernel {
            Kernel::Gamma { resolution } => {
                let out = ArrayViewMut2::from_shape(work.dims(), real_mut(&mut outputs[0], n))
                    .map_err(fail)?;
                gamma::c_gamma_into(out, resolution);
            }
            Kernel::Fft2 { direction } => {
                let plan = self.plan(work, direction);
                let out = complex_mut(&mut outputs[0], n);
                out.copy_from_slice(complex(inputs[0], n));
                let out = ArrayViewMut2::from_shape(work.dims(), out).map_err(fail)?;
                fft2_inplace(out, &plan);
            }
            Kernel::ComplexMul => ops::complex_mul(
                complex(inputs[0], n),
                complex(inputs[1], n),
                complex_mut(&mut outputs[0], n),
            ),
            Kernel::RealMul => ops::real_mul(
                complex(inputs[0], n),
                real(inputs[1], n),
                complex_mut(&mut outputs[0], n),
            ),
            Kernel::ComplexSub => ops::complex_sub(
                complex(inputs[0], n),
                complex(inputs[1], n),
                complex_mut(&mut outputs[0], n),
            ),
            Kernel::Diffract { res_z, dz } => {
                let (first, second) = pair_mut(outputs, n);
                propagate::diffract(
                    real(inputs[0], n),
                    complex(inputs[1], n),
                    complex(inputs[2], n),
                    first,
                    second,
                    res_z,
                    dz,
                );
            }
            Kernel::BpmDiffract { res_z, dz } => propagate::diffract_bpm(
                real(inputs[0], n),
                complex(inputs[1], n),
                complex_mut(&mut outputs[0], n),
                res_z,
                dz,
            ),
            Kernel::MergeProp { res_z } => {
                let (first, second) = pair_mut(outputs, n);
                propagate::merge_prop(
                    real(inputs[0], n),
                    complex(inputs[1], n),
                    complex(inputs[2], n),
                    first,
                    second,
                    res_z,
                );
            }
            Kernel::SplitProp { res_z } => {
                let (first, second) = pair_mut(outputs, n);
                propagate::split_prop(
                    real(inputs[0], n),
                    complex(inputs[1], n),
                    complex(inputs[2], n),
                    first,
                    second,
                    res_z,
                );
            }
            Kernel::ScatterFactor(params) => {
                scatter::scatter_factor(real(inputs[0], n), real_mut(&mut outputs[0], n), params)
            }
            Kernel::PhaseScreen(params) => scatter::phase_screen(
                real(inputs[0], n),
                complex_mut(&mut outputs[0], n),
                params,
            ),
            Kernel::Tilt {
                angle,
                resolution,
                truncate,
            } => {
                let out = ArrayViewMut2::from_shape(work.dims(), complex_mut(&mut outputs[0], n))
                    .map_err(fail)?;
                tilt::tilt(out, angle, resolution, truncate);
            }
            Kernel::Pupil { na } => {
                pupil::binary_pupil(real(inputs[0], n), real_mut(&mut outputs[0], n), na)
            }
            Kernel::Extract(extraction) => ops::extract(
                complex(inputs[0], n),
                real_mut(&mut outputs[0], n),
                extraction,
            ),
        }
        Ok(())
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn real(words: &[f32], n: usize) -> &[f32] {
    &words[..n]
}

fn real_mut(words: &mut [f32], n: usize) -> &mut [f32] {
    &mut words[..n]
}

fn complex(words: &[f32], n: usize) -> &[Complex<f32>] {
    bytemuck::cast_slice(&words[..2 * n])
}

fn complex_mut(words: &mut [f32], n: usize) -> &mut [Complex<f32>] {
    bytemuck::cast_slice_mut(&mut words[..2 * n])
}

fn pair_mut(outputs: &mut [Vec<f32>], n: usize) -> (&mut [Complex<f32>], &mut [Complex<f32>]) {
    let (first, rest) = outputs.split_at_mut(1);
    (complex_mut(&mut first[0], n), complex_mut(&mut rest[0], n))
}

impl ComputeBackend for CpuBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("CPU ({} threads)", self.num_threads),
            compute_units: Some(self.num_threads),
        }
    }

    fn allocate(&self, size_bytes: usize, usage: BufferUsage) -> Result<BufferHandle, BackendError> {
        if size_bytes == 0 || size_bytes % WORD != 0 {
            return Err(BackendError::Allocation {
                requested: size_bytes,
                reason: format!("size must be a positive multiple of {} bytes", WORD),
            });
        }
        let handle = BufferHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.buffers.lock().insert(
            handle,
            Stored {
                words: vec![0.0; size_bytes / WORD],
                usage,
                written: false,
            },
        );
        Ok(handle)
    }

    fn upload(&self, buffer: BufferHandle, data: &[f32]) -> Result<(), BackendError> {
        let mut buffers = self.buffers.lock();
        let stored = buffers
            .get_mut(&buffer)
            .ok_or(BackendError::UnknownBuffer(buffer))?;
        if stored.words.len() != data.len() {
            return Err(BackendError::SizeMismatch {
                buffer,
                expected: stored.words.len() * WORD,
                actual: data.len() * WORD,
            });
        }
        if stored.usage == BufferUsage::ReadOnly && stored.written {
            return Err(BackendError::ReadOnly(buffer));
        }
        stored.words.copy_from_slice(data);
        stored.written = true;
        Ok(())
    }

    fn dispatch(
        &self,
        kernel: &Kernel,
        bindings: &[BufferHandle],
        work: Shape,
    ) -> Result<(), BackendError> {
        let mut buffers = self.buffers.lock();

        let mut sized = Vec::with_capacity(bindings.len());
        for &handle in bindings {
            let stored = buffers
                .get(&handle)
                .ok_or(BackendError::UnknownBuffer(handle))?;
            sized.push((handle, stored.words.len() * WORD));
        }
        validate_bindings(kernel, &sized, work)?;

        let signature = kernel.signature();
        for (&handle, binding) in bindings.iter().zip(signature) {
            let (written, usage) = buffers
                .get(&handle)
                .map_or((false, BufferUsage::ReadWrite), |stored| (stored.written, stored.usage));
            match binding.access {
                Access::Read if !written => return Err(BackendError::Unwritten(handle)),
                Access::Write if written && usage == BufferUsage::ReadOnly => {
                    return Err(BackendError::ReadOnly(handle))
                }
                _ => {}
            }
        }

        // outputs are moved out of the map while the kernel runs, inputs are borrowed in place
        let mut outputs = Vec::new();
        let mut words = Vec::new();
        for (&handle, binding) in bindings.iter().zip(signature) {
            if binding.access == Access::Write {
                if let Some(stored) = buffers.get_mut(&handle) {
                    outputs.push(handle);
                    words.push(std::mem::take(&mut stored.words));
                }
            }
        }
        let inputs: Vec<&[f32]> = bindings
            .iter()
            .zip(signature)
            .filter(|(_, binding)| binding.access == Access::Read)
            .filter_map(|(handle, _)| buffers.get(handle).map(|stored| stored.words.as_slice()))
            .collect();

        trace!("dispatch {} over {} with {:?}", kernel.name(), work, bindings);
        let result = self.execute(kernel, &inputs, &mut words, work);
        drop(inputs);

        for (handle, words) in outputs.into_iter().zip(words) {
            if let Some(stored) = buffers.get_mut(&handle) {
                stored.words = words;
                stored.written |= result.is_ok();
            }
        }
        result
    }

    fn readback(&self, buffer: BufferHandle, size_bytes: usize) -> Result<Vec<f32>, BackendError> {
        let buffers = self.buffers.lock();
        let stored = buffers
            .get(&buffer)
            .ok_or(BackendError::UnknownBuffer(buffer))?;
        if stored.usage != BufferUsage::HostReadable {
            return Err(BackendError::NotHostReadable(buffer));
        }
        if !stored.written {
            return Err(BackendError::Unwritten(buffer));
        }
        let available = stored.words.len() * WORD;
        if size_bytes % WORD != 0 || size_bytes > available {
            return Err(BackendError::SizeMismatch {
                buffer,
                expected: available,
                actual: size_bytes,
            });
        }
        Ok(stored.words[..size_bytes / WORD].to_vec())
    }

    fn release(&self, buffer: BufferHandle) {
        if self.buffers.lock().remove(&buffer).is_none() {
            warn!("release of unknown buffer {}", buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CpuBackend;
    use crate::backend::{BackendError, BufferUsage, ComputeBackend, DeviceBuffer, Kernel};
    use crate::fft2::Direction;
    use crate::Shape;

    #[test]
    fn upload_then_readback() {
        let backend = CpuBackend::new();
        let buffer = DeviceBuffer::with_data(&backend, &[1.0, 2.0, 3.0], BufferUsage::HostReadable)
            .unwrap();
        assert_eq!(buffer.read().unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn upload_size_must_match() {
        let backend = CpuBackend::new();
        let handle = backend.allocate(16, BufferUsage::ReadWrite).unwrap();
        let err = backend.upload(handle, &[1.0; 3]).unwrap_err();
        assert!(matches!(err, BackendError::SizeMismatch { .. }));
    }

    #[test]
    fn readback_requires_written_host_readable_buffer() {
        let backend = CpuBackend::new();
        let unwritten = DeviceBuffer::new(&backend, 8, BufferUsage::HostReadable).unwrap();
        assert!(matches!(unwritten.read(), Err(BackendError::Unwritten(_))));

        let private = DeviceBuffer::with_data(&backend, &[1.0, 2.0], BufferUsage::ReadWrite).unwrap();
        assert!(matches!(private.read(), Err(BackendError::NotHostReadable(_))));
    }

    #[test]
    fn buffers_are_released_on_drop() {
        let backend = CpuBackend::new();
        {
            let _a = DeviceBuffer::new(&backend, 8, BufferUsage::ReadWrite).unwrap();
            let _b = DeviceBuffer::new(&backend, 8, BufferUsage::ReadWrite).unwrap();
            assert_eq!(backend.live_buffers(), 2);
        }
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn dispatch_runs_kernel_and_marks_output_written() {
        let backend = CpuBackend::new();
        let shape = Shape::new(1, 2);
        let a = DeviceBuffer::with_data(&backend, &[1.0, 1.0, 2.0, 0.0], BufferUsage::ReadOnly)
            .unwrap();
        let b = DeviceBuffer::with_data(&backend, &[0.5, 0.0, 1.0, 1.0], BufferUsage::ReadOnly)
            .unwrap();
        let out = DeviceBuffer::new(&backend, 16, BufferUsage::HostReadable).unwrap();
        backend
            .dispatch(
                &Kernel::ComplexSub,
                &[a.handle(), b.handle(), out.handle()],
                shape,
            )
            .unwrap();
        assert_eq!(out.read().unwrap(), vec![0.5, 1.0, 1.0, -1.0]);
    }

    #[test]
    fn dispatch_rejects_unwritten_inputs() {
        let backend = CpuBackend::new();
        let shape = Shape::new(2, 2);
        let input = DeviceBuffer::new(&backend, 32, BufferUsage::ReadWrite).unwrap();
        let output = DeviceBuffer::new(&backend, 32, BufferUsage::ReadWrite).unwrap();
        let err = backend
            .dispatch(
                &Kernel::Fft2 {
                    direction: Direction::Forward,
                },
                &[input.handle(), output.handle()],
                shape,
            )
            .unwrap_err();
        assert!(matches!(err, BackendError::Unwritten(_)));
        // a failed dispatch leaves the buffers intact
        assert_eq!(backend.live_buffers(), 2);
    }

    #[test]
    fn dispatch_rejects_oversized_fft_input() {
        let backend = CpuBackend::new();
        let input = DeviceBuffer::with_data(&backend, &[1.0; 10], BufferUsage::ReadOnly).unwrap();
        let output = DeviceBuffer::new(&backend, 32, BufferUsage::HostReadable).unwrap();
        let err = backend
            .dispatch(
                &Kernel::Fft2 {
                    direction: Direction::Forward,
                },
                &[input.handle(), output.handle()],
                Shape::new(2, 2),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            BackendError::BindingSizeMismatch { index: 0, expected: 32, actual: 40, .. }
        ));
        assert!(matches!(output.read(), Err(BackendError::Unwritten(_))));
    }

    #[test]
    fn read_only_buffers_are_written_once() {
        let backend = CpuBackend::new();
        let shape = Shape::new(1, 2);
        let gamma = DeviceBuffer::new(&backend, 8, BufferUsage::ReadOnly).unwrap();
        let gamma_kernel = Kernel::Gamma {
            resolution: crate::Resolution::uniform(0.1),
        };
        backend.dispatch(&gamma_kernel, &[gamma.handle()], shape).unwrap();
        let err = backend
            .dispatch(&gamma_kernel, &[gamma.handle()], shape)
            .unwrap_err();
        assert!(matches!(err, BackendError::ReadOnly(_)));

        let uploaded = DeviceBuffer::with_data(&backend, &[1.0, 2.0], BufferUsage::ReadOnly).unwrap();
        let err = backend.upload(uploaded.handle(), &[3.0, 4.0]).unwrap_err();
        assert!(matches!(err, BackendError::ReadOnly(_)));

        // read-write buffers may be overwritten freely
        let scratch = DeviceBuffer::with_data(&backend, &[1.0, 2.0], BufferUsage::ReadWrite).unwrap();
        backend.upload(scratch.handle(), &[3.0, 4.0]).unwrap();
        backend.dispatch(&gamma_kernel, &[scratch.handle()], shape).unwrap();
    }

    #[test]
    fn dispatch_rejects_unknown_handles() {
        let backend = CpuBackend::new();
        let out = DeviceBuffer::new(&backend, 4, BufferUsage::ReadWrite).unwrap();
        let err = backend
            .dispatch(
                &Kernel::Pupil { na: 0.5 },
                &[crate::backend::BufferHandle(999), out.handle()],
                Shape::new(1, 1),
            )
            .unwrap_err();
        assert!(matches!(err, BackendError::UnknownBuffer(_)));
    }
}
