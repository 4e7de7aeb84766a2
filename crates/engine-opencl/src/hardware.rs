//! Hardware provider: OpenCL platform/device discovery and context ownership.
//!
//! One platform, one GPU device, one context. Multi-device load balancing is
//! out of scope; the first usable GPU (falling back to any device type) is
//! the enabled device for the whole engine lifetime. Absence of an OpenCL
//! runtime or device is a normal, handled state reported as
//! [`EngineError::NoDevice`].

use crate::error::EngineError;
use log::{debug, warn};
use opencl3::context::Context;
use opencl3::device::{Device, CL_DEVICE_TYPE_ALL, CL_DEVICE_TYPE_GPU};
use opencl3::platform::get_platforms;
use opencl3::types::cl_device_id;

/// Capability snapshot of the enabled device.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub platform_name: String,
    pub device_name: String,
    pub vendor: String,
    /// Maximum single allocation size in bytes; 0 when the query failed.
    pub max_mem_alloc_size: u64,
}

/// Owns the OpenCL context and the enabled device.
pub struct OpenClHardware {
    device: Device,
    context: Context,
    info: DeviceInfo,
}

// SAFETY: the raw OpenCL handles inside Context/Device are valid for the
// lifetime of this struct, and all queue operations are serialized by the
// engine's execution lock.
unsafe impl Send for OpenClHardware {}
unsafe impl Sync for OpenClHardware {}

impl OpenClHardware {
    /// Discover a device and create the context.
    ///
    /// Prefers GPU devices across all platforms; falls back to any device
    /// type so headless CI machines with CPU-only runtimes still work.
    pub fn new() -> Result<Self, EngineError> {
        let platforms = get_platforms().map_err(|e| {
            debug!(target: "engine", "OpenCL platform enumeration failed: {e}");
            EngineError::NoDevice
        })?;
        if platforms.is_empty() {
            return Err(EngineError::NoDevice);
        }

        for device_type in [CL_DEVICE_TYPE_GPU, CL_DEVICE_TYPE_ALL] {
            for platform in &platforms {
                let platform_name = platform.name().unwrap_or_default();
                let device_ids = platform.get_devices(device_type).unwrap_or_default();
                let Some(&device_id) = device_ids.first() else {
                    continue;
                };

                let device = Device::new(device_id);
                let device_name = device.name().unwrap_or_default();
                let vendor = device.vendor().unwrap_or_default();

                // Non-fatal capability query: a zero value degrades batch
                // sizing but does not block rendering.
                let max_mem_alloc_size = match device.max_mem_alloc_size() {
                    Ok(size) => size,
                    Err(e) => {
                        warn!(
                            target: "engine",
                            "CL_DEVICE_MAX_MEM_ALLOC_SIZE query failed for {device_name}: {e}; using 0"
                        );
                        0
                    }
                };

                let context = Context::from_device(&device)
                    .map_err(EngineError::api("Context::from_device"))?;

                debug!(
                    target: "engine",
                    "selected OpenCL device: {device_name} ({vendor}) on {platform_name}"
                );

                return Ok(Self {
                    device,
                    context,
                    info: DeviceInfo {
                        platform_name,
                        device_name,
                        vendor,
                        max_mem_alloc_size,
                    },
                });
            }
        }

        Err(EngineError::NoDevice)
    }

    /// List every visible device without creating a context (CLI probe).
    pub fn enumerate() -> Vec<DeviceInfo> {
        let mut found = Vec::new();
        let Ok(platforms) = get_platforms() else {
            return found;
        };
        for platform in &platforms {
            let platform_name = platform.name().unwrap_or_default();
            for device_id in platform.get_devices(CL_DEVICE_TYPE_ALL).unwrap_or_default() {
                let device = Device::new(device_id);
                found.push(DeviceInfo {
                    platform_name: platform_name.clone(),
                    device_name: device.name().unwrap_or_default(),
                    vendor: device.vendor().unwrap_or_default(),
                    max_mem_alloc_size: device.max_mem_alloc_size().unwrap_or(0),
                });
            }
        }
        found
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// The enabled device (single active device per engine).
    pub fn device_id(&self) -> cl_device_id {
        self.device.id()
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }
}
