//! Swapchain error types.

use ash::vk;
use thiserror::Error;

/// Swapchain-related errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwapchainError {
    /// The owning device reports a configuration error.
    #[error("Device configuration error: {0}")]
    Device(#[from] vk::Result),

    /// The bound surface is gone; the swapchain must be recreated.
    #[error("Surface lost")]
    SurfaceLost,

    /// No image was available and the caller asked not to wait.
    #[error("No image ready")]
    NotReady,

    /// No image became available before the timeout elapsed.
    #[error("Timed out waiting for an image")]
    Timeout,

    /// Image index outside the swapchain.
    #[error("Image index {index} out of range (image count {count})")]
    OutOfRange { index: u32, count: u32 },

    /// Acquired an image that is already held.
    #[error("Image {0} is already acquired or presenting")]
    ImageBusy(u32),

    /// Released an image that is not held.
    #[error("Image {0} released while not acquired or presenting")]
    DoubleRelease(u32),

    /// Presented an image that was not acquired.
    #[error("Image {0} presented while not acquired")]
    ImageNotAcquired(u32),

    /// Device mask is zero or names devices the context does not have.
    #[error("Invalid device mask {mask:#x} (device mask {available:#x})")]
    InvalidDeviceMask { mask: u32, available: u32 },

    /// Present mode outside the swapchain's compatible set.
    #[error("Present mode {0:?} is not compatible with this swapchain")]
    IncompatiblePresentMode(vk::PresentModeKHR),

    /// The surface is not on a display, so it has no refresh cycle.
    #[error("Surface is not presenting to a display")]
    SurfaceNotPresenting,

    /// Swapchain configuration rejected.
    #[error("Invalid swapchain configuration: {0}")]
    InvalidConfig(String),
}

impl SwapchainError {
    /// Device errors and surface loss persist until the swapchain is recreated.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Device(_) | Self::SurfaceLost)
    }

    /// Timeouts never alter state and may be retried immediately.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::NotReady | Self::Timeout)
    }

    /// Precondition violations by the caller.
    #[must_use]
    pub const fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Self::OutOfRange { .. }
                | Self::ImageBusy(_)
                | Self::DoubleRelease(_)
                | Self::ImageNotAcquired(_)
                | Self::InvalidDeviceMask { .. }
                | Self::IncompatiblePresentMode(_)
                | Self::InvalidConfig(_)
        )
    }

    /// The Vulkan status code a C-facing caller would see.
    #[must_use]
    pub const fn to_vk_result(&self) -> vk::Result {
        match self {
            Self::Device(result) => *result,
            Self::SurfaceLost => vk::Result::ERROR_SURFACE_LOST_KHR,
            Self::NotReady => vk::Result::NOT_READY,
            Self::Timeout => vk::Result::TIMEOUT,
            Self::SurfaceNotPresenting => vk::Result::ERROR_UNKNOWN,
            Self::OutOfRange { .. }
            | Self::ImageBusy(_)
            | Self::DoubleRelease(_)
            | Self::ImageNotAcquired(_)
            | Self::InvalidDeviceMask { .. }
            | Self::IncompatiblePresentMode(_)
            | Self::InvalidConfig(_) => vk::Result::ERROR_VALIDATION_FAILED_EXT,
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, SwapchainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_disjoint() {
        let errors = [
            SwapchainError::Device(vk::Result::ERROR_DEVICE_LOST),
            SwapchainError::SurfaceLost,
            SwapchainError::NotReady,
            SwapchainError::Timeout,
            SwapchainError::OutOfRange { index: 4, count: 3 },
            SwapchainError::DoubleRelease(1),
            SwapchainError::ImageNotAcquired(0),
            SwapchainError::SurfaceNotPresenting,
        ];

        for error in &errors {
            let classes = [
                error.is_fatal(),
                error.is_transient(),
                error.is_programming_error(),
            ];
            assert!(classes.iter().filter(|c| **c).count() <= 1, "{error:?}");
        }
    }

    #[test]
    fn device_error_passes_through() {
        let error = SwapchainError::from(vk::Result::ERROR_INITIALIZATION_FAILED);
        assert!(error.is_fatal());
        assert_eq!(
            error.to_vk_result(),
            vk::Result::ERROR_INITIALIZATION_FAILED
        );
    }

    #[test]
    fn transient_codes() {
        assert_eq!(SwapchainError::NotReady.to_vk_result(), vk::Result::NOT_READY);
        assert_eq!(SwapchainError::Timeout.to_vk_result(), vk::Result::TIMEOUT);
        assert_eq!(
            SwapchainError::SurfaceLost.to_vk_result(),
            vk::Result::ERROR_SURFACE_LOST_KHR
        );
    }
}
