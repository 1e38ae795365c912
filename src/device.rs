//! # Device Detection
//!
//! Selects the compute device used for model inference. Accelerated devices
//! are preferred (CUDA, then Metal) with CPU as the fallback. The choice is
//! made once per process and cached; it is not re-evaluated per request.

use candle_core::Device;
use serde::Serialize;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Cached resolved device, fixed for the lifetime of the process.
static RESOLVED_DEVICE: OnceLock<Device> = OnceLock::new();

/// Device detection and selection utilities
pub struct DeviceManager;

impl DeviceManager {
    /// Get the resolved device (cached after the first call).
    pub fn resolved_device() -> Device {
        RESOLVED_DEVICE.get_or_init(Self::detect_device).clone()
    }

    /// Probe for the best available device.
    fn detect_device() -> Device {
        info!("Detecting compute device for inference...");

        if let Some(cuda) = Self::cuda_device() {
            info!("Selected CUDA GPU for inference");
            return cuda;
        }

        if let Some(metal) = Self::metal_device() {
            info!("Selected Metal GPU for inference");
            return metal;
        }

        info!("Using CPU for inference (no GPU acceleration available)");
        Device::Cpu
    }

    fn cuda_device() -> Option<Device> {
        match Device::new_cuda(0) {
            Ok(device) => {
                debug!("CUDA device 0 available");
                Some(device)
            }
            Err(e) => {
                debug!("CUDA not available: {}", e);
                None
            }
        }
    }

    fn metal_device() -> Option<Device> {
        match Device::new_metal(0) {
            Ok(device) => {
                debug!("Metal device 0 available");
                Some(device)
            }
            Err(e) => {
                debug!("Metal not available: {}", e);
                None
            }
        }
    }

    /// Short human-readable name for a device.
    pub fn describe(device: &Device) -> String {
        match device {
            Device::Cpu => "CPU".to_string(),
            Device::Cuda(_) => "CUDA GPU".to_string(),
            Device::Metal(_) => "Metal GPU".to_string(),
        }
    }

    /// Device availability summary for the health surface.
    pub fn summary() -> DeviceSummary {
        let cuda_available = Self::cuda_device().is_some();
        let metal_available = Self::metal_device().is_some();
        DeviceSummary {
            cuda_available,
            metal_available,
            gpu_available: cuda_available || metal_available,
            resolved: Self::describe(&Self::resolved_device()),
        }
    }
}

/// Device availability summary
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    pub cuda_available: bool,
    pub metal_available: bool,
    pub gpu_available: bool,
    pub resolved: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_resolution_is_stable() {
        let first = DeviceManager::resolved_device();
        let second = DeviceManager::resolved_device();
        assert_eq!(
            DeviceManager::describe(&first),
            DeviceManager::describe(&second)
        );
    }

    #[test]
    fn test_describe_cpu() {
        assert_eq!(DeviceManager::describe(&Device::Cpu), "CPU");
    }

    #[test]
    fn test_summary_resolves() {
        let summary = DeviceManager::summary();
        assert!(!summary.resolved.is_empty());
    }
}
