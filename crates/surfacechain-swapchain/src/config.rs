//! Swapchain configuration.

use std::time::Duration;

use ash::vk;
use surfacechain_core::constants::{MAX_SWAPCHAIN_IMAGES, MIN_SWAPCHAIN_IMAGES};
use surfacechain_core::{PresentScaling, Result, SwapchainError};

/// Swapchain configuration.
#[derive(Clone, Debug)]
pub struct SwapchainConfig {
    /// Requested number of images, clamped to the supported range.
    pub image_count: u32,
    /// Image extent in pixels.
    pub extent: vk::Extent2D,
    /// Image format.
    pub format: vk::Format,
    /// Initial present mode.
    pub present_mode: vk::PresentModeKHR,
    /// Present modes that can be switched to without recreating the swapchain.
    pub compatible_present_modes: Vec<vk::PresentModeKHR>,
    /// Deliberate scaling intent; any flag accepts a size mismatch.
    pub scaling: PresentScaling,
    /// Log frame statistics every N frames (0 disables).
    pub perf_log_frame_count: u32,
    /// How long destruction waits for in-flight presentations.
    pub destroy_timeout: Duration,
}

impl Default for SwapchainConfig {
    fn default() -> Self {
        Self {
            image_count: MAX_SWAPCHAIN_IMAGES,
            extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            format: vk::Format::B8G8R8A8_SRGB,
            present_mode: vk::PresentModeKHR::FIFO,
            compatible_present_modes: Vec::new(),
            scaling: PresentScaling::empty(),
            perf_log_frame_count: 0,
            destroy_timeout: Duration::from_secs(1),
        }
    }
}

impl SwapchainConfig {
    /// Create a new config with the given extent.
    pub fn new(width: u32, height: u32) -> Self {
        Self::default().with_extent(width, height)
    }

    /// Set the image extent.
    #[must_use]
    pub fn with_extent(mut self, width: u32, height: u32) -> Self {
        self.extent = vk::Extent2D { width, height };
        self
    }

    /// Set the requested image count.
    #[must_use]
    pub fn with_image_count(mut self, image_count: u32) -> Self {
        self.image_count = image_count;
        self
    }

    /// Set the image format.
    #[must_use]
    pub fn with_format(mut self, format: vk::Format) -> Self {
        self.format = format;
        self
    }

    /// Set the initial present mode.
    #[must_use]
    pub fn with_present_mode(mut self, present_mode: vk::PresentModeKHR) -> Self {
        self.present_mode = present_mode;
        self
    }

    /// Set the present modes switchable without recreation.
    #[must_use]
    pub fn with_compatible_present_modes(
        mut self,
        modes: impl IntoIterator<Item = vk::PresentModeKHR>,
    ) -> Self {
        self.compatible_present_modes = modes.into_iter().collect();
        self
    }

    /// Declare deliberate scaling.
    #[must_use]
    pub fn with_scaling(mut self, scaling: PresentScaling) -> Self {
        self.scaling = scaling;
        self
    }

    /// Log frame statistics every `frames` frames.
    #[must_use]
    pub fn with_perf_log_frame_count(mut self, frames: u32) -> Self {
        self.perf_log_frame_count = frames;
        self
    }

    /// Set how long destruction waits for in-flight presentations.
    #[must_use]
    pub fn with_destroy_timeout(mut self, timeout: Duration) -> Self {
        self.destroy_timeout = timeout;
        self
    }

    /// Image count after clamping to the supported range.
    pub fn clamped_image_count(&self) -> u32 {
        self.image_count
            .clamp(MIN_SWAPCHAIN_IMAGES, MAX_SWAPCHAIN_IMAGES)
    }

    /// Compatible present modes, with the initial mode first and no repeats.
    pub fn compatible_modes(&self) -> Vec<vk::PresentModeKHR> {
        let mut modes = vec![self.present_mode];
        for &mode in &self.compatible_present_modes {
            if !modes.contains(&mode) {
                modes.push(mode);
            }
        }
        modes
    }

    /// Reject configurations no swapchain can be built from.
    pub fn validate(&self) -> Result<()> {
        if self.extent.width == 0 || self.extent.height == 0 {
            return Err(SwapchainError::InvalidConfig(format!(
                "extent {}x{} has a zero dimension",
                self.extent.width, self.extent.height
            )));
        }
        if !self.compatible_present_modes.is_empty()
            && !self.compatible_present_modes.contains(&self.present_mode)
        {
            return Err(SwapchainError::InvalidConfig(format!(
                "present mode {:?} missing from its compatible set",
                self.present_mode
            )));
        }
        Ok(())
    }
}
