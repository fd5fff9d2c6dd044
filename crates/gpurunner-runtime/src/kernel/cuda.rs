//! CUDA kernel: cuBLAS SGEMM on a device-resident matrix

use std::sync::Arc;

use cudarc::cublas::{sys::cublasOperation_t, CudaBlas, Gemm, GemmConfig};
use cudarc::driver::{CudaContext, CudaSlice, CudaStream};
use gpurunner_core::{DeviceId, GpuRunnerError, GpuRunnerResult};

use super::{random_matrix, Kernel};

pub(super) fn device_count() -> GpuRunnerResult<u32> {
    let count = CudaContext::device_count()
        .map_err(|e| GpuRunnerError::Device(format!("Failed to count CUDA devices: {}", e)))?;
    Ok(count.max(0) as u32)
}

pub struct CudaKernel {
    device: DeviceId,
    size: i32,
    // keeps the context alive for the stream and buffers below
    _ctx: Arc<CudaContext>,
    stream: Arc<CudaStream>,
    blas: CudaBlas,
    data: CudaSlice<f32>,
    out: CudaSlice<f32>,
}

impl CudaKernel {
    /// Bind this process to `device` and upload a random matrix to it
    pub fn new(device: DeviceId, matrix_size: usize) -> GpuRunnerResult<Self> {
        let size = i32::try_from(matrix_size).map_err(|_| {
            GpuRunnerError::Device(format!("Matrix size {} too large for cuBLAS", matrix_size))
        })?;
        let host = random_matrix(matrix_size, device)?;
        let host = host.as_slice().ok_or_else(|| {
            GpuRunnerError::Device("Host matrix is not contiguous".to_string())
        })?;

        let ctx = CudaContext::new(device.ordinal()).map_err(|e| driver_error(device, e))?;
        let stream = ctx.default_stream();
        let blas = CudaBlas::new(stream.clone()).map_err(|e| {
            GpuRunnerError::Device(format!("cuBLAS init on device {}: {}", device, e))
        })?;

        let data = stream
            .memcpy_stod(host)
            .map_err(|e| driver_error(device, e))?;
        let out = stream
            .alloc_zeros::<f32>(host.len())
            .map_err(|e| driver_error(device, e))?;

        Ok(Self {
            device,
            size,
            _ctx: ctx,
            stream,
            blas,
            data,
            out,
        })
    }
}

impl Kernel for CudaKernel {
    fn step(&mut self) -> GpuRunnerResult<()> {
        let n = self.size;
        let cfg = GemmConfig {
            transa: cublasOperation_t::CUBLAS_OP_N,
            transb: cublasOperation_t::CUBLAS_OP_N,
            m: n,
            n,
            k: n,
            alpha: 1.0f32,
            lda: n,
            ldb: n,
            beta: 0.0f32,
            ldc: n,
        };
        // SAFETY: all three buffers hold exactly n * n elements on this stream
        unsafe { self.blas.gemm(cfg, &self.data, &self.data, &mut self.out) }.map_err(|e| {
            GpuRunnerError::Worker(format!("SGEMM failed on device {}: {}", self.device, e))
        })?;
        self.stream.synchronize().map_err(|e| {
            GpuRunnerError::Worker(format!("Synchronize failed on device {}: {}", self.device, e))
        })
    }

    fn device(&self) -> DeviceId {
        self.device
    }

    fn name(&self) -> &'static str {
        "cuda"
    }
}

fn driver_error(device: DeviceId, err: cudarc::driver::DriverError) -> GpuRunnerError {
    GpuRunnerError::Device(format!("CUDA device {}: {}", device, err))
}
