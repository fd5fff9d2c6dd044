//! Compute kernels
//!
//! A kernel owns one square matrix resident on its device and multiplies it
//! by itself on every step. The result is discarded; the point is the work.

mod cpu;
#[cfg(feature = "cuda")]
mod cuda;

pub use cpu::CpuKernel;
#[cfg(feature = "cuda")]
pub use cuda::CudaKernel;

use gpurunner_core::{device_range, Backend, DeviceId, GpuRunnerError, GpuRunnerResult};
use ndarray::Array2;
use ndarray_rand::rand_distr::Uniform;
use rand::Rng;

/// One device's compute primitive
pub trait Kernel: Send {
    /// Issue one matrix self-multiplication and wait for it to finish
    fn step(&mut self) -> GpuRunnerResult<()>;

    /// Device this kernel is bound to
    fn device(&self) -> DeviceId;

    /// Get the backend name
    fn name(&self) -> &'static str;
}

/// Bind to `device` and allocate its `matrix_size x matrix_size` buffer
pub fn open_kernel(
    backend: Backend,
    device: DeviceId,
    matrix_size: usize,
) -> GpuRunnerResult<Box<dyn Kernel>> {
    match backend {
        Backend::Cpu => Ok(Box::new(CpuKernel::new(device, matrix_size)?)),
        #[cfg(feature = "cuda")]
        Backend::Cuda => Ok(Box::new(CudaKernel::new(device, matrix_size)?)),
        #[cfg(not(feature = "cuda"))]
        Backend::Cuda => Err(missing_cuda()),
    }
}

/// Enumerate every device the backend can see
pub fn detect_devices(backend: Backend) -> GpuRunnerResult<Vec<DeviceId>> {
    match backend {
        Backend::Cpu => Ok(device_range(cpu::lane_count())),
        #[cfg(feature = "cuda")]
        Backend::Cuda => Ok(device_range(cuda::device_count()?)),
        #[cfg(not(feature = "cuda"))]
        Backend::Cuda => Err(missing_cuda()),
    }
}

/// Number of elements in a square matrix, guarding against overflow
pub(crate) fn matrix_len(matrix_size: usize) -> GpuRunnerResult<usize> {
    matrix_size
        .checked_mul(matrix_size)
        .filter(|&len| len > 0)
        .ok_or_else(|| {
            GpuRunnerError::Device(format!("Unusable matrix size {}", matrix_size))
        })
}

/// Square matrix of uniform values in `[-1, 1)`, built on the host.
///
/// The buffer is reserved up front so an oversized matrix is a `Device` error
/// rather than an allocation abort.
pub(crate) fn random_matrix(
    matrix_size: usize,
    device: DeviceId,
) -> GpuRunnerResult<Array2<f32>> {
    let len = matrix_len(matrix_size)?;
    let dist = Uniform::new(-1.0f32, 1.0)
        .map_err(|e| GpuRunnerError::Device(format!("Bad value range: {}", e)))?;

    let mut values = reserve(len, device)?;
    values.extend(rand::rng().sample_iter(dist).take(len));
    into_square(values, matrix_size)
}

/// Square matrix of zeros, reserved the same way as [`random_matrix`]
pub(crate) fn zero_matrix(
    matrix_size: usize,
    device: DeviceId,
) -> GpuRunnerResult<Array2<f32>> {
    let len = matrix_len(matrix_size)?;
    let mut values = reserve(len, device)?;
    values.resize(len, 0.0);
    into_square(values, matrix_size)
}

fn reserve(len: usize, device: DeviceId) -> GpuRunnerResult<Vec<f32>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|e| {
        GpuRunnerError::Device(format!(
            "Failed to allocate {} floats for device {}: {}",
            len, device, e
        ))
    })?;
    Ok(buf)
}

fn into_square(values: Vec<f32>, matrix_size: usize) -> GpuRunnerResult<Array2<f32>> {
    Array2::from_shape_vec((matrix_size, matrix_size), values)
        .map_err(|e| GpuRunnerError::Device(format!("Bad matrix shape: {}", e)))
}

#[cfg(not(feature = "cuda"))]
fn missing_cuda() -> GpuRunnerError {
    GpuRunnerError::Device(
        "built without CUDA support; rebuild with `--features cuda` or use `--backend cpu`"
            .to_string(),
    )
}
