//! Optional per-frame overlay rendering.

use surfacechain_core::{CommandHandle, ImageHandle};
use thiserror::Error;

/// Overlay rendering errors. These never abort presentation.
#[derive(Error, Debug)]
pub enum OverlayError {
    /// The overlay could not record its commands.
    #[error("Overlay rendering failed: {0}")]
    Render(String),
}

/// Draws decoration into an image just before it is presented.
///
/// Injected into a swapchain at construction; the swapchain owns the
/// reference for its lifetime.
pub trait OverlayRenderer: Send + Sync {
    /// Record overlay commands targeting `image`.
    fn render(&self, image: ImageHandle, commands: CommandHandle) -> Result<(), OverlayError>;
}
