//! Audio input device enumeration and selection.

use serde::{Deserialize, Serialize};

/// Metadata about an audio input device, for settings UIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    /// Whether this is the system default input device.
    pub is_default: bool,
}

/// List all available audio input devices on the system.
///
/// Returns an empty `Vec` if cpal is unavailable or no devices exist.
#[cfg(feature = "audio-cpal")]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    match host.input_devices() {
        Ok(devices) => devices
            .enumerate()
            .map(|(idx, device)| {
                let name = device
                    .name()
                    .unwrap_or_else(|_| format!("Input Device {}", idx + 1));
                let is_default = default_name.as_deref() == Some(name.as_str());
                DeviceInfo { name, is_default }
            })
            .collect(),
        Err(e) => {
            tracing::warn!("failed to enumerate input devices: {e}");
            vec![]
        }
    }
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    vec![]
}

/// Resolve the capture device: preferred name first, then the system
/// default, then the first device the host reports.
#[cfg(feature = "audio-cpal")]
pub(crate) fn select_input_device(
    host: &cpal::Host,
    preferred_name: Option<&str>,
) -> crate::error::Result<cpal::Device> {
    use cpal::traits::{DeviceTrait, HostTrait};
    use tracing::warn;

    use crate::error::HarkError;

    if let Some(preferred) = preferred_name {
        match host.input_devices() {
            Ok(mut devices) => {
                if let Some(device) =
                    devices.find(|d| d.name().map(|n| n == preferred).unwrap_or(false))
                {
                    return Ok(device);
                }
                warn!("preferred input device '{preferred}' not found, falling back");
            }
            Err(e) => {
                warn!("failed to list input devices while resolving preference: {e}");
            }
        }
    }

    if let Some(default) = host.default_input_device() {
        return Ok(default);
    }

    let mut devices = host
        .input_devices()
        .map_err(|e| HarkError::AudioDevice(e.to_string()))?;
    let fallback = devices.next().ok_or(HarkError::NoDefaultInputDevice)?;
    warn!("no default input device, falling back to first available input");
    Ok(fallback)
}
