//! Compute-device placement.

use candle_core::Device;
use serde::{Deserialize, Serialize};

use crate::errors::{ModelError, Result};

/// Where the model parameters live.
///
/// Serialised as `"cpu"`, `"auto"`, `{ cuda = 0 }` or `{ metal = 0 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSpec {
    Cpu,
    Auto,
    Cuda(usize),
    Metal(usize),
}

impl DeviceSpec {
    pub fn resolve(&self) -> Result<Device> {
        match *self {
            DeviceSpec::Cpu => Ok(Device::Cpu),
            DeviceSpec::Auto => setup_device(),
            DeviceSpec::Cuda(ordinal) => Device::new_cuda(ordinal)
                .map_err(|err| ModelError::Device(format!("cuda:{ordinal}: {err}"))),
            DeviceSpec::Metal(ordinal) => Device::new_metal(ordinal)
                .map_err(|err| ModelError::Device(format!("metal:{ordinal}: {err}"))),
        }
    }
}

/// Picks the best available backend: Metal (with the `metal` feature), then CUDA, then CPU.
///
/// Setting `CANDLE_FORCE_CPU` skips detection.
pub fn setup_device() -> Result<Device> {
    if std::env::var("CANDLE_FORCE_CPU").is_ok() {
        log::info!("CANDLE_FORCE_CPU set, using CPU backend");
        return Ok(Device::Cpu);
    }

    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => {
                log::info!("Metal device selected: {:?}", device.location());
                return Ok(device);
            }
            Err(err) => log::info!("Metal unavailable ({err}), falling back"),
        }
    }

    match Device::cuda_if_available(0) {
        Ok(device) if device.is_cuda() => {
            log::info!("CUDA device selected: {:?}", device.location());
            Ok(device)
        }
        Ok(_) | Err(_) => {
            log::info!("Using CPU backend");
            Ok(Device::Cpu)
        }
    }
}
