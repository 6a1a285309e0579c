//! Input device enumeration through the cpal default host.

use cpal::traits::{DeviceTrait, HostTrait};

use mic_recorder_core::models::error::StreamError;

/// A capture endpoint visible to the default host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    pub name: String,
    pub is_default: bool,
}

/// Lists microphones on the default cpal host.
pub struct DeviceEnumerator {
    host: cpal::Host,
}

impl DeviceEnumerator {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    /// Name of the host API in use (ALSA, CoreAudio, WASAPI, ...).
    pub fn host_name(&self) -> &'static str {
        self.host.id().name()
    }

    /// List every input device the host reports. Devices whose name cannot
    /// be read are skipped.
    pub fn list_input_devices(&self) -> Result<Vec<InputDevice>, StreamError> {
        let default_name = self
            .host
            .default_input_device()
            .and_then(|d| d.name().ok());

        let devices = self
            .host
            .input_devices()
            .map_err(|e| StreamError::OpenFailed(format!("failed to enumerate inputs: {}", e)))?;

        Ok(devices
            .filter_map(|device| match device.name() {
                Ok(name) => Some(InputDevice {
                    is_default: default_name.as_deref() == Some(name.as_str()),
                    name,
                }),
                Err(e) => {
                    log::debug!("skipping input device without a name: {}", e);
                    None
                }
            })
            .collect())
    }

    /// Resolve `name` to a device, or the default input when `name` is `None`.
    pub fn input_device(&self, name: Option<&str>) -> Result<cpal::Device, StreamError> {
        let Some(name) = name else {
            return self
                .host
                .default_input_device()
                .ok_or_else(|| StreamError::OpenFailed("no default input device".into()));
        };

        self.host
            .input_devices()
            .map_err(|e| StreamError::OpenFailed(format!("failed to enumerate inputs: {}", e)))?
            .find(|device| device.name().is_ok_and(|n| n == name))
            .ok_or_else(|| StreamError::OpenFailed(format!("input device not found: {}", name)))
    }
}

impl Default for DeviceEnumerator {
    fn default() -> Self {
        Self::new()
    }
}
