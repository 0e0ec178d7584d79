//! Device context collaborator.

use ash::vk;

/// The device or context a swapchain was created from.
///
/// Its configuration result is sticky: once the device reports an error,
/// every status query on every swapchain it owns reports that error first.
pub trait DeviceContext: Send + Sync {
    /// `SUCCESS`, or the error that invalidated the device configuration.
    fn configuration_result(&self) -> vk::Result;

    /// Mask of the physical devices in this device group.
    fn device_mask(&self) -> u32 {
        1
    }
}
