//! Host CPU kernel

use gpurunner_core::{DeviceId, GpuRunnerError, GpuRunnerResult};
use ndarray::{linalg, Array2};

use super::{random_matrix, zero_matrix, Kernel};

/// Logical CPU slots available as devices
pub(super) fn lane_count() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}

/// Matrix self-multiply on the host
pub struct CpuKernel {
    device: DeviceId,
    data: Array2<f32>,
    out: Array2<f32>,
}

impl CpuKernel {
    pub fn new(device: DeviceId, matrix_size: usize) -> GpuRunnerResult<Self> {
        let lanes = lane_count();
        if device.0 >= lanes {
            return Err(GpuRunnerError::Device(format!(
                "Invalid CPU device {}: only {} lanes available",
                device, lanes
            )));
        }

        Ok(Self {
            device,
            data: random_matrix(matrix_size, device)?,
            out: zero_matrix(matrix_size, device)?,
        })
    }
}

impl Kernel for CpuKernel {
    fn step(&mut self) -> GpuRunnerResult<()> {
        // beta = 0 overwrites the previous product
        linalg::general_mat_mul(1.0, &self.data, &self.data, 0.0, &mut self.out);
        std::hint::black_box(&self.out);
        Ok(())
    }

    fn device(&self) -> DeviceId {
        self.device
    }

    fn name(&self) -> &'static str {
        "cpu"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_step_multiplies_matrix_by_itself() {
        let mut kernel = CpuKernel::new(DeviceId(0), 2).unwrap();
        kernel.data = array![[1.0, 2.0], [3.0, 4.0]];

        kernel.step().unwrap();
        assert_eq!(kernel.out, array![[7.0, 10.0], [15.0, 22.0]]);

        // the previous product is discarded, not accumulated
        kernel.step().unwrap();
        assert_eq!(kernel.out, array![[7.0, 10.0], [15.0, 22.0]]);
    }

    #[test]
    fn test_buffer_is_square() {
        let kernel = CpuKernel::new(DeviceId(0), 16).unwrap();
        assert_eq!(kernel.data.dim(), (16, 16));
        assert_eq!(kernel.out.dim(), (16, 16));
        assert!(kernel.data.iter().all(|v| (-1.0..1.0).contains(v)));
    }

    #[test]
    fn test_rejects_unknown_lane() {
        let result = CpuKernel::new(DeviceId(u32::MAX), 2);
        assert!(matches!(result, Err(GpuRunnerError::Device(_))));
    }
}
