//! Scriptable native surface.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use ash::vk;
use crossbeam::channel::Sender;
use parking_lot::Mutex;
use surfacechain_core::{HdrMetadata, LogicalSize};
use surfacechain_swapchain::{
    DisplayRefresh, DrawableRequest, NativeSurface, PresentFeedback, PresentRequest,
    SurfaceConfig, SurfaceEvent,
};

use crate::compositor::CompositorRequest;

/// Simulated vertical blank interval used when confirming inline.
const INLINE_REFRESH_NANOS: u64 = 16_666_667;

/// What the surface does with a presentation.
#[derive(Debug, Clone, Default)]
pub enum PresentPolicy {
    /// Confirm on the presenting thread before `present` returns.
    #[default]
    Confirm,
    /// Keep the feedback until the test confirms or discards it.
    Hold,
    /// Hand the presentation to a compositor thread.
    Forward(Sender<CompositorRequest>),
}

/// When drawables for acquired images become ready.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DrawablePolicy {
    /// Fulfil every request as it arrives.
    #[default]
    Immediate,
    /// Queue requests until [`MockSurface::fulfil_drawables`].
    Manual,
}

#[derive(Default)]
struct Recorded {
    configs: Vec<SurfaceConfig>,
    needs_display: Vec<Vec<vk::Rect2D>>,
    hdr_metadata: Vec<HdrMetadata>,
    presented: Vec<PresentRequest>,
    pending_drawables: Vec<DrawableRequest>,
    held: Vec<PresentFeedback>,
}

struct Geometry {
    bounds: LogicalSize,
    scale: f64,
    refresh: Option<DisplayRefresh>,
}

/// Native surface double that records everything the swapchain asks of it.
pub struct MockSurface {
    geometry: Mutex<Geometry>,
    recorded: Mutex<Recorded>,
    present_policy: PresentPolicy,
    drawable_policy: DrawablePolicy,
    attached: AtomicBool,
    detach_calls: AtomicU32,
    vblank: AtomicU64,
}

impl MockSurface {
    /// Attached surface at scale 1 on a 60 Hz display.
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            geometry: Mutex::new(Geometry {
                bounds: LogicalSize::new(width, height),
                scale: 1.0,
                refresh: Some(DisplayRefresh::fixed(60.0)),
            }),
            recorded: Mutex::new(Recorded::default()),
            present_policy: PresentPolicy::Confirm,
            drawable_policy: DrawablePolicy::Immediate,
            attached: AtomicBool::new(true),
            detach_calls: AtomicU32::new(0),
            vblank: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_scale(self, scale: f64) -> Self {
        self.geometry.lock().scale = scale;
        self
    }

    /// Report `refresh` as the display; `None` simulates an off-screen surface.
    #[must_use]
    pub fn with_refresh(self, refresh: Option<DisplayRefresh>) -> Self {
        self.geometry.lock().refresh = refresh;
        self
    }

    #[must_use]
    pub fn with_present_policy(mut self, policy: PresentPolicy) -> Self {
        self.present_policy = policy;
        self
    }

    #[must_use]
    pub fn with_drawable_policy(mut self, policy: DrawablePolicy) -> Self {
        self.drawable_policy = policy;
        self
    }

    /// Change the logical bounds and scale, returning the matching event.
    pub fn resize(&self, bounds: LogicalSize, scale: f64) -> SurfaceEvent {
        let mut geometry = self.geometry.lock();
        geometry.bounds = bounds;
        geometry.scale = scale;
        SurfaceEvent::Resized { bounds, scale }
    }

    /// Remove the layer from its window without telling the swapchain.
    pub fn remove_from_window(&self) {
        self.attached.store(false, Ordering::Release);
    }

    /// Every configuration pushed so far.
    pub fn configs(&self) -> Vec<SurfaceConfig> {
        self.recorded.lock().configs.clone()
    }

    pub fn last_config(&self) -> Option<SurfaceConfig> {
        self.recorded.lock().configs.last().copied()
    }

    /// Region lists passed to `set_needs_display`, in call order.
    pub fn needs_display_calls(&self) -> Vec<Vec<vk::Rect2D>> {
        self.recorded.lock().needs_display.clone()
    }

    /// HDR metadata forwarded so far.
    pub fn hdr_metadata(&self) -> Vec<HdrMetadata> {
        self.recorded.lock().hdr_metadata.clone()
    }

    /// Every presentation received, in order.
    pub fn presented(&self) -> Vec<PresentRequest> {
        self.recorded.lock().presented.clone()
    }

    pub fn pending_drawables(&self) -> usize {
        self.recorded.lock().pending_drawables.len()
    }

    /// Fulfil every queued drawable request.
    pub fn fulfil_drawables(&self) -> usize {
        let pending = std::mem::take(&mut self.recorded.lock().pending_drawables);
        let count = pending.len();
        for request in pending {
            request.fulfil();
        }
        count
    }

    pub fn held_count(&self) -> usize {
        self.recorded.lock().held.len()
    }

    /// Confirm held presentations as displayed at `actual_present_time`.
    pub fn confirm_held(&self, actual_present_time: u64) -> usize {
        let held = std::mem::take(&mut self.recorded.lock().held);
        let count = held.len();
        for feedback in held {
            feedback.presented(actual_present_time);
        }
        count
    }

    /// Discard held presentations.
    pub fn discard_held(&self) -> usize {
        let held = std::mem::take(&mut self.recorded.lock().held);
        let count = held.len();
        for feedback in held {
            feedback.discarded();
        }
        count
    }

    /// Take held feedback so a test can complete it later.
    pub fn take_held(&self) -> Vec<PresentFeedback> {
        std::mem::take(&mut self.recorded.lock().held)
    }

    pub fn detach_calls(&self) -> u32 {
        self.detach_calls.load(Ordering::Acquire)
    }

    fn next_vblank(&self, desired: u64) -> u64 {
        let vblank = self.vblank.fetch_add(INLINE_REFRESH_NANOS, Ordering::AcqRel)
            + INLINE_REFRESH_NANOS;
        vblank.max(desired)
    }
}

impl NativeSurface for MockSurface {
    fn bounds(&self) -> LogicalSize {
        self.geometry.lock().bounds
    }

    fn contents_scale(&self) -> f64 {
        self.geometry.lock().scale
    }

    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    fn display_refresh(&self) -> Option<DisplayRefresh> {
        self.geometry.lock().refresh
    }

    fn configure(&self, config: &SurfaceConfig) {
        self.recorded.lock().configs.push(*config);
    }

    fn request_drawable(&self, request: DrawableRequest) {
        match self.drawable_policy {
            DrawablePolicy::Immediate => request.fulfil(),
            DrawablePolicy::Manual => self.recorded.lock().pending_drawables.push(request),
        }
    }

    fn present(&self, request: PresentRequest, feedback: PresentFeedback) {
        self.recorded.lock().presented.push(request);
        match &self.present_policy {
            PresentPolicy::Confirm => {
                feedback.presented(self.next_vblank(request.desired_present_time));
            }
            PresentPolicy::Hold => self.recorded.lock().held.push(feedback),
            PresentPolicy::Forward(sender) => {
                // A stopped compositor drops the request, discarding the frame.
                let _ = sender.send(CompositorRequest::Present { request, feedback });
            }
        }
    }

    fn set_needs_display(&self, regions: &[vk::Rect2D]) {
        self.recorded.lock().needs_display.push(regions.to_vec());
    }

    fn set_hdr_metadata(&self, metadata: &HdrMetadata) {
        self.recorded.lock().hdr_metadata.push(*metadata);
    }

    fn detach(&self) {
        self.detach_calls.fetch_add(1, Ordering::AcqRel);
    }
}
