//! Placement of the generator and the sentence embedder.
//!
//! Both models share one device. Accelerators compiled into the build are tried in
//! order; any that fails to open is logged and the next one is tried, ending on the CPU.

use candle_core::Device;
use tracing::{debug, info, warn};

/// Set to a non-empty value to pin every model to the CPU.
pub const ENV_FORCE_CPU: &str = "SIEVE_FORCE_CPU";

type AcceleratorProbe = fn(usize) -> candle_core::Result<Device>;

/// Where model weights should be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// First accelerator that opens, else CPU.
    #[default]
    Auto,
    Cpu,
}

impl DevicePreference {
    /// `Cpu` when [`ENV_FORCE_CPU`] is set to a non-empty value.
    pub fn from_env() -> Self {
        match std::env::var(ENV_FORCE_CPU) {
            Ok(value) if !value.trim().is_empty() => DevicePreference::Cpu,
            _ => DevicePreference::Auto,
        }
    }
}

/// Accelerators compiled into this build, in probe order.
fn accelerators() -> Vec<(&'static str, AcceleratorProbe)> {
    #[allow(unused_mut)]
    let mut probes: Vec<(&'static str, AcceleratorProbe)> = Vec::new();
    #[cfg(feature = "metal")]
    probes.push(("metal", Device::new_metal as AcceleratorProbe));
    #[cfg(feature = "cuda")]
    probes.push(("cuda", Device::new_cuda as AcceleratorProbe));
    probes
}

/// Selects the device for the preference read from the environment.
pub fn select_device() -> Device {
    select_device_for(DevicePreference::from_env())
}

/// Selects a device for `preference`. Never fails: the CPU is always available.
pub fn select_device_for(preference: DevicePreference) -> Device {
    if preference == DevicePreference::Cpu {
        debug!(env = ENV_FORCE_CPU, "CPU placement requested");
        return Device::Cpu;
    }

    let probes = accelerators();
    if probes.is_empty() {
        debug!("No accelerator compiled in, using CPU");
        return Device::Cpu;
    }

    let mut failures = Vec::with_capacity(probes.len());
    for (name, open) in probes {
        match open(0) {
            Ok(device) => {
                info!(accelerator = name, "Models placed on accelerator");
                return device;
            }
            Err(e) => {
                warn!(accelerator = name, error = %e, "Accelerator unavailable");
                failures.push(format!("{name}: {e}"));
            }
        }
    }

    warn!(reason = %failures.join("; "), "Falling back to CPU device");
    Device::Cpu
}
