//! Presentation requests and compositor feedback.

use std::sync::Arc;

use ash::vk;
use surfacechain_core::{AcquisitionToken, CommandHandle, ImageHandle, PresentTiming};
use tracing::{debug, trace};

use crate::pool::ImagePool;
use crate::timing::PresentHistory;

/// Caller-supplied parameters of one presentation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PresentInfo {
    /// Application identifier echoed back in the timing history.
    pub present_id: u32,
    /// Requested present time in nanoseconds, 0 for as soon as possible.
    pub desired_present_time: u64,
    /// Switch to this present mode; must be in the compatible set.
    pub present_mode: Option<vk::PresentModeKHR>,
    /// Command handle overlay rendering records into.
    pub commands: CommandHandle,
}

impl PresentInfo {
    /// Present as soon as possible with the given identifier.
    pub fn new(present_id: u32) -> Self {
        Self {
            present_id,
            ..Self::default()
        }
    }

    /// Request presentation no earlier than `time` nanoseconds.
    #[must_use]
    pub const fn at(mut self, time: u64) -> Self {
        self.desired_present_time = time;
        self
    }

    /// Switch present mode with this presentation.
    #[must_use]
    pub const fn with_present_mode(mut self, mode: vk::PresentModeKHR) -> Self {
        self.present_mode = Some(mode);
        self
    }

    /// Attach the command handle overlays record into.
    #[must_use]
    pub const fn with_commands(mut self, commands: CommandHandle) -> Self {
        self.commands = commands;
        self
    }
}

/// Result of a successful presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresentOutcome {
    /// Acquisition the presented image came from.
    pub token: AcquisitionToken,
    /// The surface geometry no longer matches; consider reconfiguring.
    pub suboptimal: bool,
}

/// What the native surface is asked to display.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresentRequest {
    /// Image to display.
    pub image: ImageHandle,
    /// Acquisition the image came from.
    pub token: AcquisitionToken,
    /// Application identifier.
    pub present_id: u32,
    /// Requested present time in nanoseconds, 0 for as soon as possible.
    pub desired_present_time: u64,
}

/// One-shot confirmation channel from the compositor back to the swapchain.
///
/// Completing it with [`PresentFeedback::presented`] records the actual
/// present time. Dropping it unconfirmed treats the frame as discarded. In
/// both cases the image returns to the pool exactly once.
pub struct PresentFeedback {
    request: PresentRequest,
    pool: Arc<ImagePool>,
    history: Arc<PresentHistory>,
    completed: bool,
}

impl PresentFeedback {
    pub(crate) fn new(
        request: PresentRequest,
        pool: Arc<ImagePool>,
        history: Arc<PresentHistory>,
    ) -> Self {
        Self {
            request,
            pool,
            history,
            completed: false,
        }
    }

    /// The presentation this feedback belongs to.
    pub const fn request(&self) -> &PresentRequest {
        &self.request
    }

    /// The compositor displayed the image at `actual_present_time` nanoseconds.
    ///
    /// An actual time of 0 means the compositor did not report one; the
    /// desired time is recorded instead.
    pub fn presented(mut self, actual_present_time: u64) {
        self.complete(actual_present_time);
    }

    /// The compositor dropped the frame without displaying it.
    pub fn discarded(mut self) {
        debug!(
            "Presentation of image {} (token {}) discarded",
            self.request.image.index,
            self.request.token.get()
        );
        self.complete(0);
    }

    fn complete(&mut self, actual_present_time: u64) {
        if self.completed {
            return;
        }
        self.completed = true;

        let actual_present_time = if actual_present_time == 0 {
            self.request.desired_present_time
        } else {
            actual_present_time
        };
        self.history.record(PresentTiming {
            present_id: self.request.present_id,
            token: self.request.token,
            desired_present_time: self.request.desired_present_time,
            actual_present_time,
            earliest_present_time: actual_present_time,
            present_margin: 0,
        });

        if !self
            .pool
            .complete_present(self.request.image.index, self.request.token)
        {
            trace!(
                "Stale present confirmation for image {} (token {})",
                self.request.image.index,
                self.request.token.get()
            );
        }
    }
}

impl Drop for PresentFeedback {
    fn drop(&mut self) {
        if !self.completed {
            debug!(
                "Present feedback for image {} dropped unconfirmed",
                self.request.image.index
            );
            self.complete(0);
        }
    }
}

impl std::fmt::Debug for PresentFeedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresentFeedback")
            .field("request", &self.request)
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageState;
    use surfacechain_core::Timeout;

    fn presenting_pool() -> (Arc<ImagePool>, PresentRequest) {
        let pool = Arc::new(ImagePool::new(
            2,
            vk::Extent2D {
                width: 64,
                height: 64,
            },
            vk::Format::B8G8R8A8_SRGB,
        ));
        let (image, token) = pool
            .acquire(Timeout::Poll, || Ok(()), || AcquisitionToken(9))
            .unwrap();
        pool.begin_present(image.index).unwrap();
        let request = PresentRequest {
            image,
            token,
            present_id: 4,
            desired_present_time: 1_000,
        };
        (pool, request)
    }

    #[test]
    fn presented_records_actual_time() {
        let (pool, request) = presenting_pool();
        let history = Arc::new(PresentHistory::new());
        let feedback = PresentFeedback::new(request, Arc::clone(&pool), Arc::clone(&history));

        feedback.presented(1_500);

        assert_eq!(pool.state_of(0).unwrap(), ImageState::Available);
        let records = history.drain();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].present_id, 4);
        assert_eq!(records[0].token, AcquisitionToken(9));
        assert_eq!(records[0].actual_present_time, 1_500);
        assert_eq!(records[0].earliest_present_time, 1_500);
    }

    #[test]
    fn dropped_feedback_counts_as_discarded() {
        let (pool, request) = presenting_pool();
        let history = Arc::new(PresentHistory::new());
        drop(PresentFeedback::new(
            request,
            Arc::clone(&pool),
            Arc::clone(&history),
        ));

        assert_eq!(pool.state_of(0).unwrap(), ImageState::Available);
        let records = history.drain();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].actual_present_time, 1_000);
    }

    #[test]
    fn builder_sets_fields() {
        let info = PresentInfo::new(3)
            .at(42)
            .with_present_mode(vk::PresentModeKHR::IMMEDIATE)
            .with_commands(CommandHandle(7));
        assert_eq!(info.present_id, 3);
        assert_eq!(info.desired_present_time, 42);
        assert_eq!(info.present_mode, Some(vk::PresentModeKHR::IMMEDIATE));
        assert_eq!(info.commands, CommandHandle(7));
    }
}
