//! Core types and errors for the surfacechain swapchain manager.
//!
//! This crate provides the value types shared between the swapchain and its
//! collaborators:
//! - Image handles and acquisition tokens
//! - Presentation timing records and refresh cycle reports
//! - Surface geometry and natural-extent rounding
//! - The swapchain error taxonomy

pub mod error;
pub mod geometry;
pub mod types;

pub use error::{Result, SwapchainError};
pub use geometry::{natural_extent, round_half_even, LogicalSize};
pub use types::{
    AcquisitionToken, CommandHandle, Enumeration, HdrMetadata, ImageHandle, PresentScaling,
    PresentTiming, RefreshCycle, SurfaceStatus, Timeout, XyColor,
};

/// Swapchain-wide constants
pub mod constants {
    /// Fewest images a swapchain is created with
    pub const MIN_SWAPCHAIN_IMAGES: u32 = 2;
    /// Most images a swapchain is created with
    pub const MAX_SWAPCHAIN_IMAGES: u32 = 3;
    /// Number of presentation timing records kept per swapchain
    pub const MAX_PRESENTATION_HISTORY: usize = 60;
    /// Nanoseconds per second, for refresh rate conversions
    pub const NANOS_PER_SECOND: f64 = 1_000_000_000.0;
}
