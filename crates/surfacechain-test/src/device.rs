//! Scriptable device context.

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use ash::vk;
use surfacechain_swapchain::DeviceContext;

/// Device whose configuration result and device mask can be changed at will.
#[derive(Debug)]
pub struct MockDevice {
    result: AtomicI32,
    mask: AtomicU32,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// Healthy single-device context.
    pub const fn new() -> Self {
        Self {
            result: AtomicI32::new(vk::Result::SUCCESS.as_raw()),
            mask: AtomicU32::new(1),
        }
    }

    /// Report `mask` as the set of physical devices.
    #[must_use]
    pub fn with_device_mask(self, mask: u32) -> Self {
        self.mask.store(mask, Ordering::Relaxed);
        self
    }

    /// Make every later status query report `result`.
    pub fn set_configuration_result(&self, result: vk::Result) {
        self.result.store(result.as_raw(), Ordering::Release);
    }
}

impl DeviceContext for MockDevice {
    fn configuration_result(&self) -> vk::Result {
        vk::Result::from_raw(self.result.load(Ordering::Acquire))
    }

    fn device_mask(&self) -> u32 {
        self.mask.load(Ordering::Relaxed)
    }
}
