//! Overlay renderers for tests.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use surfacechain_core::{CommandHandle, ImageHandle};
use surfacechain_swapchain::{OverlayError, OverlayRenderer};

/// Remembers every image it was asked to draw into.
#[derive(Debug, Default)]
pub struct RecordingOverlay {
    renders: Mutex<Vec<(ImageHandle, CommandHandle)>>,
}

impl RecordingOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Images and command handles seen so far, in order.
    pub fn renders(&self) -> Vec<(ImageHandle, CommandHandle)> {
        self.renders.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.renders.lock().len()
    }
}

impl OverlayRenderer for RecordingOverlay {
    fn render(&self, image: ImageHandle, commands: CommandHandle) -> Result<(), OverlayError> {
        self.renders.lock().push((image, commands));
        Ok(())
    }
}

/// Fails every render.
#[derive(Debug, Default)]
pub struct FailingOverlay {
    attempts: AtomicU32,
}

impl FailingOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }
}

impl OverlayRenderer for FailingOverlay {
    fn render(&self, image: ImageHandle, _commands: CommandHandle) -> Result<(), OverlayError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        Err(OverlayError::Render(format!(
            "no pipeline for image {}",
            image.index
        )))
    }
}
