//! Presentable images and their state transitions.

use surfacechain_core::{AcquisitionToken, Result, SwapchainError};

/// Ownership state of a presentable image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ImageState {
    /// Free to be acquired.
    #[default]
    Available,
    /// Handed to the caller for rendering.
    Acquired,
    /// Submitted to the compositor, awaiting confirmation.
    Presenting,
}

/// One render target owned by a swapchain's image pool.
///
/// The pool drives every transition through the methods below; an image is
/// never destroyed by a transition, only returned to [`ImageState::Available`].
#[derive(Clone, Debug)]
pub struct PresentableImage {
    index: u32,
    state: ImageState,
    token: Option<AcquisitionToken>,
}

impl PresentableImage {
    pub(crate) const fn new(index: u32) -> Self {
        Self {
            index,
            state: ImageState::Available,
            token: None,
        }
    }

    /// Index within the swapchain.
    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Current state.
    #[inline]
    pub const fn state(&self) -> ImageState {
        self.state
    }

    /// Token of the acquisition currently holding this image.
    #[inline]
    pub const fn token(&self) -> Option<AcquisitionToken> {
        self.token
    }

    #[inline]
    pub fn is_available(&self) -> bool {
        self.state == ImageState::Available
    }

    /// Available -> Acquired.
    pub(crate) fn acquire(&mut self, token: AcquisitionToken) -> Result<()> {
        if self.state != ImageState::Available {
            return Err(SwapchainError::ImageBusy(self.index));
        }
        self.state = ImageState::Acquired;
        self.token = Some(token);
        Ok(())
    }

    /// Acquired -> Presenting.
    pub(crate) fn begin_present(&mut self) -> Result<AcquisitionToken> {
        match (self.state, self.token) {
            (ImageState::Acquired, Some(token)) => {
                self.state = ImageState::Presenting;
                Ok(token)
            }
            _ => Err(SwapchainError::ImageNotAcquired(self.index)),
        }
    }

    /// Presenting -> Available, only for the presentation that owns `token`.
    ///
    /// Returns `false` when the confirmation is stale: the image was released
    /// and possibly re-acquired since it was presented.
    pub(crate) fn complete_present(&mut self, token: AcquisitionToken) -> bool {
        if self.state != ImageState::Presenting || self.token != Some(token) {
            return false;
        }
        self.make_available();
        true
    }

    /// Acquired or Presenting -> Available.
    pub(crate) fn release(&mut self) -> Result<()> {
        if self.state == ImageState::Available {
            return Err(SwapchainError::DoubleRelease(self.index));
        }
        self.make_available();
        Ok(())
    }

    fn make_available(&mut self) {
        self.state = ImageState::Available;
        self.token = None;
    }
}
