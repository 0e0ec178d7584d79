//! Presentable image pool and acquisition waiting.

use std::time::{Duration, Instant};

use ash::vk;
use parking_lot::{Condvar, Mutex};
use surfacechain_core::{
    AcquisitionToken, Enumeration, ImageHandle, Result, SwapchainError, Timeout,
};

use crate::image::{ImageState, PresentableImage};

/// Longest a blocked acquirer sleeps before re-checking fatal conditions.
pub const FATAL_CHECK_INTERVAL: Duration = Duration::from_millis(5);

struct PoolState {
    images: Vec<PresentableImage>,
    /// Set when the owning swapchain is destroyed; late confirmations are ignored.
    retired: bool,
}

/// Fixed set of presentable images created together with a swapchain.
///
/// Per-image state is guarded as a unit, so every transition is atomic with
/// respect to concurrent acquire, release and present calls. Threads blocked
/// in [`ImagePool::acquire`] wake whenever an image may have become available
/// or a fatal condition may have been raised.
pub struct ImagePool {
    state: Mutex<PoolState>,
    changed: Condvar,
    extent: vk::Extent2D,
    format: vk::Format,
    count: u32,
}

impl ImagePool {
    /// Create `count` available images.
    pub fn new(count: u32, extent: vk::Extent2D, format: vk::Format) -> Self {
        Self {
            state: Mutex::new(PoolState {
                images: (0..count).map(PresentableImage::new).collect(),
                retired: false,
            }),
            changed: Condvar::new(),
            extent,
            format,
            count,
        }
    }

    /// Number of images; fixed for the pool's lifetime.
    #[inline]
    pub const fn image_count(&self) -> u32 {
        self.count
    }

    /// Extent the images were created with.
    #[inline]
    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Handle of the image at `index`.
    pub fn image(&self, index: u32) -> Result<ImageHandle> {
        self.check_index(index)?;
        Ok(self.handle(index))
    }

    /// Copy image handles into `dest`, lowest index first.
    ///
    /// Without a destination only the count is reported.
    pub fn images(&self, dest: Option<&mut [ImageHandle]>) -> Enumeration {
        let total = self.count as usize;
        let Some(dest) = dest else {
            return Enumeration::count_only(total);
        };

        let written = dest.len().min(total);
        for (index, slot) in (0u32..).zip(dest.iter_mut().take(written)) {
            *slot = self.handle(index);
        }
        Enumeration::filled(written, total)
    }

    /// State of the image at `index`.
    pub fn state_of(&self, index: u32) -> Result<ImageState> {
        self.check_index(index)?;
        Ok(self.state.lock().images[index as usize].state())
    }

    /// Number of images currently awaiting compositor confirmation.
    pub fn presenting_count(&self) -> usize {
        self.state
            .lock()
            .images
            .iter()
            .filter(|image| image.state() == ImageState::Presenting)
            .count()
    }

    /// Acquire the lowest-index available image.
    ///
    /// `check` runs before every attempt, including after each wakeup, so
    /// fatal conditions raised while waiting abort the wait. `mint` is called
    /// under the pool lock only once an image has been selected, so tokens are
    /// ordered the same way acquisitions are.
    pub fn acquire<C, M>(
        &self,
        timeout: Timeout,
        mut check: C,
        mint: M,
    ) -> Result<(ImageHandle, AcquisitionToken)>
    where
        C: FnMut() -> Result<()>,
        M: FnOnce() -> AcquisitionToken,
    {
        let deadline = timeout.deadline(Instant::now());
        let mut state = self.state.lock();

        loop {
            check()?;
            if state.retired {
                return Err(SwapchainError::SurfaceLost);
            }

            if let Some(image) = state.images.iter_mut().find(|image| image.is_available()) {
                let token = mint();
                image.acquire(token)?;
                return Ok((self.handle(image.index()), token));
            }

            let now = Instant::now();
            if let Some(deadline) = deadline {
                if now >= deadline {
                    return Err(match timeout {
                        Timeout::Poll => SwapchainError::NotReady,
                        _ => SwapchainError::Timeout,
                    });
                }
            }
            // Device errors and silent detaches raise no wakeup, so `check`
            // must be re-run at least every slice.
            let slice_end = now + FATAL_CHECK_INTERVAL;
            let wake_at = deadline.map_or(slice_end, |deadline| deadline.min(slice_end));
            let _ = self.changed.wait_until(&mut state, wake_at);
        }
    }

    /// Move an acquired image to presenting, returning its acquisition token.
    pub fn begin_present(&self, index: u32) -> Result<AcquisitionToken> {
        self.check_index(index)?;
        self.state.lock().images[index as usize].begin_present()
    }

    /// Return a presented image to the pool once the compositor is done with it.
    ///
    /// Stale confirmations (the image was released in the meantime, or the
    /// pool retired) are ignored and return `false`.
    pub fn complete_present(&self, index: u32, token: AcquisitionToken) -> bool {
        let mut state = self.state.lock();
        if state.retired {
            return false;
        }
        let Some(image) = state.images.get_mut(index as usize) else {
            return false;
        };
        let completed = image.complete_present(token);
        if completed {
            self.changed.notify_all();
        }
        completed
    }

    /// Release acquired or presenting images back to the pool.
    ///
    /// Either every index is released or none is: the whole list is validated
    /// before any state changes.
    pub fn release(&self, indices: &[u32]) -> Result<()> {
        for &index in indices {
            self.check_index(index)?;
        }

        let mut state = self.state.lock();
        for (position, &index) in indices.iter().enumerate() {
            let held = state.images[index as usize].state() != ImageState::Available;
            if !held || indices[..position].contains(&index) {
                return Err(SwapchainError::DoubleRelease(index));
            }
        }

        for &index in indices {
            state.images[index as usize].release()?;
        }
        self.changed.notify_all();
        Ok(())
    }

    /// Wake blocked acquirers so they re-evaluate fatal conditions.
    pub fn wake_all(&self) {
        let _state = self.state.lock();
        self.changed.notify_all();
    }

    /// Wait until no image is presenting. Returns `false` on timeout.
    pub fn wait_for_presentations(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();
        while state
            .images
            .iter()
            .any(|image| image.state() == ImageState::Presenting)
        {
            match deadline {
                None => self.changed.wait(&mut state),
                Some(deadline) => {
                    if self.changed.wait_until(&mut state, deadline).timed_out() {
                        return !state
                            .images
                            .iter()
                            .any(|image| image.state() == ImageState::Presenting);
                    }
                }
            }
        }
        true
    }

    /// Invalidate in-flight presentations and fail future acquisitions.
    pub fn retire(&self) {
        let mut state = self.state.lock();
        state.retired = true;
        self.changed.notify_all();
    }

    fn check_index(&self, index: u32) -> Result<()> {
        if index >= self.count {
            return Err(SwapchainError::OutOfRange {
                index,
                count: self.count,
            });
        }
        Ok(())
    }

    const fn handle(&self, index: u32) -> ImageHandle {
        ImageHandle {
            index,
            extent: self.extent,
            format: self.format,
        }
    }
}
