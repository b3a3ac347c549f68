use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::backend::{DeviceKind, InputProvider, StreamLease};
use crate::error::{CaptureError, CaptureResult};

/// Input device as presented to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDevice {
    pub id: String,
    pub label: String,
    pub is_default: bool,
}

/// Enumerated input devices and the advisory selection
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<AudioDevice>,
    selected: Option<String>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-enumerate input devices
    ///
    /// Permission is requested transiently: the permission stream is released before
    /// enumeration so the device is not held open. A selection that disappeared
    /// from the new set is cleared. A failed refresh forgets the previous list
    /// and selection.
    pub async fn refresh(&mut self, provider: &dyn InputProvider) -> CaptureResult<&[AudioDevice]> {
        info!("Enumerating input devices via {}", provider.name());

        let devices = match Self::request_and_enumerate(provider).await {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Device refresh failed, clearing device list: {}", e);
                self.devices.clear();
                self.selected = None;
                return Err(e);
            }
        };

        if let Some(selected) = &self.selected {
            if !devices.iter().any(|d| &d.id == selected) {
                warn!("Selected device {} is no longer available", selected);
                self.selected = None;
            }
        }

        info!("Found {} input devices", devices.len());
        self.devices = devices;

        Ok(&self.devices)
    }

    async fn request_and_enumerate(provider: &dyn InputProvider) -> CaptureResult<Vec<AudioDevice>> {
        let permission = provider.open(None).await?;
        drop(StreamLease::new(permission));

        let devices = provider
            .enumerate()
            .await?
            .into_iter()
            .filter(|d| d.kind == DeviceKind::AudioInput)
            .map(|d| AudioDevice {
                id: d.id,
                label: d.label,
                is_default: d.is_default,
            })
            .collect();

        Ok(devices)
    }

    /// Select one of the last enumerated devices
    ///
    /// Selection does not open a stream.
    pub fn select(&mut self, device_id: &str) -> CaptureResult<&AudioDevice> {
        let device = self
            .devices
            .iter()
            .find(|d| d.id == device_id)
            .ok_or_else(|| CaptureError::UnknownDevice(device_id.to_string()))?;

        info!("Selected input device: {} ({})", device.id, device.label);
        self.selected = Some(device.id.clone());

        Ok(device)
    }

    pub fn selected(&self) -> Option<&AudioDevice> {
        let id = self.selected.as_ref()?;
        self.devices.iter().find(|d| &d.id == id)
    }

    pub fn devices(&self) -> &[AudioDevice] {
        &self.devices
    }

    /// The platform default, or the first device when none is flagged
    pub fn default_device(&self) -> Option<&AudioDevice> {
        self.devices
            .iter()
            .find(|d| d.is_default)
            .or(self.devices.first())
    }
}
