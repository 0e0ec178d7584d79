//! Test harness for surfacechain.
//!
//! Provides scriptable stand-ins for the collaborators a swapchain talks to:
//! a native surface, a device context, overlays and a compositor thread that
//! confirms presentations asynchronously.

pub mod compositor;
pub mod device;
pub mod overlay;
pub mod surface;

pub use compositor::{CompositorConfig, CompositorRequest, SimulatedCompositor};
pub use device::MockDevice;
pub use overlay::{FailingOverlay, RecordingOverlay};
pub use surface::{DrawablePolicy, MockSurface, PresentPolicy};

use std::sync::Arc;

use surfacechain_swapchain::{Swapchain, SwapchainConfig};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TestError {
    #[error("Failed to spawn compositor thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TestError>;

/// Build a swapchain over mock collaborators.
pub fn create_test_swapchain(
    device: &Arc<MockDevice>,
    surface: &Arc<MockSurface>,
    config: SwapchainConfig,
) -> surfacechain_swapchain::Result<Swapchain> {
    Swapchain::builder(Arc::clone(device) as _, Arc::clone(surface) as _)
        .config(config)
        .build()
}
