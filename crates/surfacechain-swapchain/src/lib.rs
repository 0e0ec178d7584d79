//! Swapchain management for compositor surfaces.
//!
//! This crate provides:
//! - A fixed pool of presentable images with explicit state transitions
//! - Acquisition sequencing with timeouts and monotonic acquisition tokens
//! - Release and presentation protocols
//! - Surface binding: natural extent, optimality and surface-loss tracking
//! - Bounded presentation timing history and frame interval statistics

pub mod config;
pub mod device;
pub mod frame_stats;
pub mod image;
pub mod overlay;
pub mod pool;
pub mod present;
pub mod signal;
pub mod surface;
pub mod swapchain;
pub mod timing;

pub use config::SwapchainConfig;
pub use device::DeviceContext;
pub use frame_stats::{FrameIntervalTracker, FrameStats};
pub use image::{ImageState, PresentableImage};
pub use overlay::{OverlayError, OverlayRenderer};
pub use pool::ImagePool;
pub use present::{PresentFeedback, PresentInfo, PresentOutcome, PresentRequest};
pub use signal::Signal;
pub use surface::{
    DisplayRefresh, DrawableRequest, NativeSurface, SurfaceBinding, SurfaceConfig, SurfaceEvent,
};
pub use swapchain::{AcquiredImage, Swapchain, SwapchainBuilder};
pub use timing::PresentHistory;

pub use surfacechain_core::{
    AcquisitionToken, CommandHandle, Enumeration, HdrMetadata, ImageHandle, PresentScaling,
    PresentTiming, RefreshCycle, Result, SurfaceStatus, SwapchainError, Timeout,
};
