//! Core swapchain value types.

use std::time::{Duration, Instant};

use ash::vk;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Identifier minted on every successful acquisition.
///
/// Tokens are strictly increasing within one swapchain and never reused.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct AcquisitionToken(pub u64);

impl AcquisitionToken {
    /// Raw counter value
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Opaque command-recording handle handed to overlay renderers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct CommandHandle(pub u64);

/// Caller-visible reference to one presentable image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ImageHandle {
    /// Index within the swapchain
    pub index: u32,
    /// Pixel extent the image was created with
    pub extent: vk::Extent2D,
    /// Pixel format
    pub format: vk::Format,
}

/// Outcome of a "query count, then fill" enumeration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Enumeration {
    /// Entries copied into the caller's buffer.
    pub written: usize,
    /// Entries available in total.
    pub total: usize,
    /// The caller's buffer was too small to receive everything.
    pub truncated: bool,
}

impl Enumeration {
    /// Enumeration that only reported the count.
    #[inline]
    pub const fn count_only(total: usize) -> Self {
        Self {
            written: 0,
            total,
            truncated: false,
        }
    }

    /// Enumeration that copied `written` of `total` entries.
    #[inline]
    pub const fn filled(written: usize, total: usize) -> Self {
        Self {
            written,
            total,
            truncated: written < total,
        }
    }

    /// True unless entries were left behind.
    #[inline]
    pub const fn is_complete(&self) -> bool {
        !self.truncated
    }

    /// `SUCCESS`, or `INCOMPLETE` when truncated.
    #[must_use]
    pub const fn to_vk_result(&self) -> vk::Result {
        if self.is_complete() {
            vk::Result::SUCCESS
        } else {
            vk::Result::INCOMPLETE
        }
    }
}

/// How long an acquisition may block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// Do not wait.
    Poll,
    /// Wait at most this long.
    After(Duration),
    /// Wait until an image is available.
    Infinite,
}

impl Timeout {
    /// Interpret a Vulkan-style nanosecond timeout.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        match nanos {
            0 => Self::Poll,
            u64::MAX => Self::Infinite,
            n => Self::After(Duration::from_nanos(n)),
        }
    }

    /// Instant after which waiting stops, `None` for infinite waits.
    #[must_use]
    pub fn deadline(self, now: Instant) -> Option<Instant> {
        match self {
            Self::Poll => Some(now),
            Self::After(duration) => now.checked_add(duration),
            Self::Infinite => None,
        }
    }
}

/// Non-error surface states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SurfaceStatus {
    /// Swapchain geometry matches the surface.
    Optimal,
    /// Presentation works but the swapchain should be reconfigured.
    Suboptimal,
}

impl SurfaceStatus {
    /// Vulkan status code for this state.
    #[must_use]
    pub const fn to_vk_result(self) -> vk::Result {
        match self {
            Self::Optimal => vk::Result::SUCCESS,
            Self::Suboptimal => vk::Result::SUBOPTIMAL_KHR,
        }
    }
}

/// Requested and observed times of one presentation, in nanoseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentTiming {
    /// Application-supplied present identifier
    pub present_id: u32,
    /// Acquisition the presented image came from
    pub token: AcquisitionToken,
    /// Requested present time, 0 for as soon as possible
    pub desired_present_time: u64,
    /// Time the image was actually shown
    pub actual_present_time: u64,
    /// Earliest time the image could have been shown
    pub earliest_present_time: u64,
    /// Slack between submission and the display deadline
    pub present_margin: u64,
}

/// Refresh cycle of the display the surface is on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshCycle {
    /// Nominal interval between refreshes
    pub refresh_duration: Duration,
    /// How much longer than nominal a refresh may take
    pub variance: Duration,
}

/// Chromaticity coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct XyColor {
    pub x: f32,
    pub y: f32,
}

/// HDR mastering metadata, forwarded to the surface untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HdrMetadata {
    pub display_primary_red: XyColor,
    pub display_primary_green: XyColor,
    pub display_primary_blue: XyColor,
    pub white_point: XyColor,
    /// Nits
    pub max_luminance: f32,
    /// Nits
    pub min_luminance: f32,
    pub max_content_light_level: f32,
    pub max_frame_average_light_level: f32,
}

bitflags! {
    /// Caller intent for presenting at a size other than the surface's.
    ///
    /// Any flag set marks the swapchain as deliberately scaled.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct PresentScaling: u32 {
        /// Present pixels one to one, cropping or padding
        const ONE_TO_ONE = 0b001;
        /// Stretch preserving aspect ratio
        const ASPECT_RATIO_STRETCH = 0b010;
        /// Stretch to fill
        const STRETCH = 0b100;
    }
}

impl PresentScaling {
    /// True when the caller accepts a size mismatch.
    #[inline]
    pub const fn is_deliberate(self) -> bool {
        !self.is_empty()
    }
}
