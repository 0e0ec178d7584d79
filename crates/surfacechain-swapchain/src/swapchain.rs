//! Swapchain management.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ash::vk;
use surfacechain_core::{
    AcquisitionToken, CommandHandle, Enumeration, HdrMetadata, ImageHandle, PresentScaling,
    PresentTiming, RefreshCycle, Result, SurfaceStatus, SwapchainError, Timeout,
};
use tracing::{debug, warn};

use crate::config::SwapchainConfig;
use crate::device::DeviceContext;
use crate::frame_stats::{FrameIntervalTracker, FrameStats};
use crate::image::ImageState;
use crate::overlay::OverlayRenderer;
use crate::pool::ImagePool;
use crate::present::{PresentFeedback, PresentInfo, PresentOutcome, PresentRequest};
use crate::signal::Signal;
use crate::surface::{DrawableRequest, NativeSurface, SurfaceBinding, SurfaceConfig, SurfaceEvent};
use crate::timing::PresentHistory;

/// Image handed out by a successful acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcquiredImage {
    /// The acquired image.
    pub image: ImageHandle,
    /// Token correlating this acquisition with its presentation.
    pub token: AcquisitionToken,
    /// The surface geometry no longer matches; consider reconfiguring.
    pub suboptimal: bool,
}

impl AcquiredImage {
    /// Index of the acquired image.
    #[inline]
    pub const fn index(&self) -> u32 {
        self.image.index
    }
}

/// Presentable images bound to one native surface.
///
/// Each swapchain owns its pool, timing history and surface binding; no
/// state is shared between swapchains.
pub struct Swapchain {
    device: Arc<dyn DeviceContext>,
    binding: SurfaceBinding,
    pool: Arc<ImagePool>,
    history: Arc<PresentHistory>,
    frames: FrameIntervalTracker,
    overlay: Option<Arc<dyn OverlayRenderer>>,
    acquisition_counter: AtomicU64,
    requested_image_count: u32,
    destroy_timeout: Duration,
}

impl Swapchain {
    /// Start building a swapchain for `surface`.
    pub fn builder(
        device: Arc<dyn DeviceContext>,
        surface: Arc<dyn NativeSurface>,
    ) -> SwapchainBuilder {
        SwapchainBuilder::new(device, surface)
    }

    /// Number of images in this swapchain.
    pub fn image_count(&self) -> u32 {
        self.pool.image_count()
    }

    /// Image count the caller asked for, before clamping.
    pub const fn requested_image_count(&self) -> u32 {
        self.requested_image_count
    }

    /// Handle of the image at `index`.
    pub fn image(&self, index: u32) -> Result<ImageHandle> {
        self.pool.image(index)
    }

    /// Copy image handles into `dest`, or report the count when `dest` is `None`.
    pub fn images(&self, dest: Option<&mut [ImageHandle]>) -> Enumeration {
        self.pool.images(dest)
    }

    /// State of the image at `index`.
    pub fn image_state(&self, index: u32) -> Result<ImageState> {
        self.pool.state_of(index)
    }

    /// Acquire the next image to render into.
    ///
    /// Blocks up to `timeout` while no image is available. `semaphore` and
    /// `fence` are signaled once the surface has the image's drawable ready,
    /// which may be after this call returns.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn acquire_next_image(
        &self,
        timeout: Timeout,
        semaphore: Option<&Signal>,
        fence: Option<&Signal>,
        device_mask: u32,
    ) -> Result<AcquiredImage> {
        self.check_device()?;
        self.validate_device_mask(device_mask)?;

        let (image, token) = self
            .pool
            .acquire(timeout, || self.check_presentable(), || self.next_token())?;

        let signals = semaphore.into_iter().chain(fence).cloned().collect();
        self.binding
            .request_drawable(DrawableRequest::new(image, token, signals));

        Ok(AcquiredImage {
            image,
            token,
            suboptimal: !self.binding.is_optimal(),
        })
    }

    /// Return acquired or presenting images to the pool without presenting.
    pub fn release_images(&self, indices: &[u32]) -> Result<()> {
        self.pool.release(indices)
    }

    /// Present an acquired image.
    ///
    /// The image stays presenting until the surface confirms or discards the
    /// frame, then returns to the pool.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn present(&self, index: u32, info: &PresentInfo) -> Result<PresentOutcome> {
        let status = self.surface_status()?;
        if let Some(mode) = info.present_mode {
            if !self.binding.is_compatible_present_mode(mode) {
                return Err(SwapchainError::IncompatiblePresentMode(mode));
            }
        }

        let token = self.pool.begin_present(index)?;
        let image = self.pool.image(index)?;
        if let Some(mode) = info.present_mode {
            // The compatible set never changes, so this cannot fail now.
            self.binding.set_present_mode(mode)?;
        }

        self.render_overlay(image, info.commands);
        self.frames.mark();

        let request = PresentRequest {
            image,
            token,
            present_id: info.present_id,
            desired_present_time: info.desired_present_time,
        };
        let feedback =
            PresentFeedback::new(request, Arc::clone(&self.pool), Arc::clone(&self.history));
        self.binding.present(request, feedback);

        Ok(PresentOutcome {
            token,
            suboptimal: status == SurfaceStatus::Suboptimal,
        })
    }

    /// Whether the surface has been lost. Sticky until recreation.
    pub fn is_surface_lost(&self) -> bool {
        self.binding.is_surface_lost()
    }

    /// Whether the configured extent suits the surface.
    pub fn has_optimal_surface(&self) -> bool {
        self.binding.is_optimal()
    }

    /// Device error, then surface loss, then suboptimal, then optimal.
    pub fn surface_status(&self) -> Result<SurfaceStatus> {
        self.binding.status(self.device.as_ref())
    }

    /// Pixel size the surface would like.
    pub fn natural_extent(&self) -> vk::Extent2D {
        self.binding.natural_extent()
    }

    /// Extent the swapchain is configured for.
    pub fn configured_extent(&self) -> vk::Extent2D {
        self.binding.configured_extent()
    }

    /// Change the configured extent and scaling intent without recreating images.
    pub fn reconfigure(&self, extent: vk::Extent2D, scaling: PresentScaling) {
        self.binding.reconfigure(extent, scaling);
    }

    /// Current present mode.
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.binding.present_mode()
    }

    /// Switch to a compatible present mode.
    pub fn set_present_mode(&self, mode: vk::PresentModeKHR) -> Result<()> {
        self.binding.set_present_mode(mode)
    }

    /// Present modes usable without recreating the swapchain.
    pub fn compatible_present_modes(&self) -> Vec<vk::PresentModeKHR> {
        self.binding.compatible_present_modes()
    }

    /// Latch surface loss and wake blocked acquirers.
    pub fn mark_surface_lost(&self) {
        self.binding.mark_surface_lost();
        self.pool.wake_all();
    }

    /// Feed a native surface notification into the swapchain.
    pub fn handle_surface_event(&self, event: SurfaceEvent) {
        self.binding.handle_event(event);
        if self.binding.is_surface_lost() {
            self.pool.wake_all();
        }
    }

    /// Store HDR metadata and forward it to the surface unchanged.
    pub fn set_hdr_metadata(&self, metadata: HdrMetadata) {
        self.binding.set_hdr_metadata(metadata);
    }

    /// Last HDR metadata set on this swapchain.
    pub fn hdr_metadata(&self) -> Option<HdrMetadata> {
        self.binding.hdr_metadata()
    }

    /// Nominal refresh interval and its variance.
    pub fn refresh_cycle_duration(&self) -> Result<RefreshCycle> {
        self.check_device()?;
        self.binding.refresh_cycle()
    }

    /// Move unread presentation timings into `dest`, oldest first.
    pub fn past_presentation_timing(&self, dest: Option<&mut [PresentTiming]>) -> Enumeration {
        self.history.read(dest)
    }

    /// Mark layer regions as needing redisplay; `None` marks everything.
    pub fn set_layer_needs_display(&self, regions: Option<&[vk::Rect2D]>) {
        self.binding.set_needs_display(regions);
    }

    /// Frame interval statistics since creation.
    pub fn frame_stats(&self) -> FrameStats {
        self.frames.stats()
    }

    /// When the last frame was presented.
    pub fn last_frame_time(&self) -> Option<Instant> {
        self.frames.last_frame_time()
    }

    /// Token of the most recent acquisition, if any.
    pub fn last_acquisition_token(&self) -> Option<AcquisitionToken> {
        match self.acquisition_counter.load(Ordering::Acquire) {
            0 => None,
            value => Some(AcquisitionToken(value)),
        }
    }

    /// Destroy the swapchain, waiting for in-flight presentations first.
    pub fn destroy(self) {
        drop(self);
    }

    fn next_token(&self) -> AcquisitionToken {
        AcquisitionToken(self.acquisition_counter.fetch_add(1, Ordering::AcqRel) + 1)
    }

    fn check_device(&self) -> Result<()> {
        let result = self.device.configuration_result();
        if result != vk::Result::SUCCESS {
            return Err(SwapchainError::Device(result));
        }
        Ok(())
    }

    fn check_presentable(&self) -> Result<()> {
        self.check_device()?;
        if !self.binding.check_attached() || self.binding.is_surface_lost() {
            return Err(SwapchainError::SurfaceLost);
        }
        Ok(())
    }

    fn validate_device_mask(&self, mask: u32) -> Result<()> {
        let available = self.device.device_mask();
        if mask == 0 || mask & !available != 0 {
            return Err(SwapchainError::InvalidDeviceMask { mask, available });
        }
        Ok(())
    }

    fn render_overlay(&self, image: ImageHandle, commands: CommandHandle) {
        if let Some(overlay) = &self.overlay {
            if let Err(e) = overlay.render(image, commands) {
                warn!("Overlay rendering failed on image {}: {e}", image.index);
            }
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        if !self.pool.wait_for_presentations(self.destroy_timeout) {
            warn!(
                "Destroying swapchain with {} presentations in flight; invalidating them",
                self.pool.presenting_count()
            );
        }
        self.pool.retire();
        self.binding.detach();
        debug!("Swapchain destroyed");
    }
}

/// Builder for creating a swapchain.
pub struct SwapchainBuilder {
    device: Arc<dyn DeviceContext>,
    surface: Arc<dyn NativeSurface>,
    config: SwapchainConfig,
    overlay: Option<Arc<dyn OverlayRenderer>>,
}

impl SwapchainBuilder {
    /// Create a new builder with the default configuration.
    pub fn new(device: Arc<dyn DeviceContext>, surface: Arc<dyn NativeSurface>) -> Self {
        Self {
            device,
            surface,
            config: SwapchainConfig::default(),
            overlay: None,
        }
    }

    /// Set the swapchain configuration.
    #[must_use]
    pub fn config(mut self, config: SwapchainConfig) -> Self {
        self.config = config;
        self
    }

    /// Render an overlay into every frame before it is presented.
    #[must_use]
    pub fn overlay(mut self, overlay: Arc<dyn OverlayRenderer>) -> Self {
        self.overlay = Some(overlay);
        self
    }

    /// Build the swapchain.
    pub fn build(self) -> Result<Swapchain> {
        let config = self.config;
        config.validate()?;

        let result = self.device.configuration_result();
        if result != vk::Result::SUCCESS {
            return Err(SwapchainError::Device(result));
        }

        let image_count = config.clamped_image_count();
        if image_count != config.image_count {
            debug!(
                "Requested {} swapchain images, using {}",
                config.image_count, image_count
            );
        }

        let binding = SurfaceBinding::new(
            self.surface,
            SurfaceConfig {
                drawable_extent: config.extent,
                format: config.format,
                maximum_drawable_count: image_count,
                display_sync: true,
                scaling: config.scaling,
            },
            config.present_mode,
            config.compatible_modes(),
        );

        debug!(
            "Created swapchain: {}x{}, {} images, format {:?}, present mode {:?}",
            config.extent.width,
            config.extent.height,
            image_count,
            config.format,
            config.present_mode
        );

        Ok(Swapchain {
            device: self.device,
            binding,
            pool: Arc::new(ImagePool::new(image_count, config.extent, config.format)),
            history: Arc::new(PresentHistory::new()),
            frames: FrameIntervalTracker::new(config.perf_log_frame_count),
            overlay: self.overlay,
            acquisition_counter: AtomicU64::new(0),
            requested_image_count: config.image_count,
            destroy_timeout: config.destroy_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicI32;
    use surfacechain_core::LogicalSize;

    use crate::surface::DisplayRefresh;

    struct StubDevice(AtomicI32);

    impl StubDevice {
        fn healthy() -> Arc<Self> {
            Arc::new(Self(AtomicI32::new(vk::Result::SUCCESS.as_raw())))
        }
    }

    impl DeviceContext for StubDevice {
        fn configuration_result(&self) -> vk::Result {
            vk::Result::from_raw(self.0.load(Ordering::Relaxed))
        }
    }

    /// Confirms every presentation immediately and keeps nothing else.
    struct StubSurface {
        bounds: LogicalSize,
        held: Mutex<Vec<PresentFeedback>>,
        hold: bool,
    }

    impl StubSurface {
        fn new(width: f64, height: f64) -> Arc<Self> {
            Arc::new(Self {
                bounds: LogicalSize::new(width, height),
                held: Mutex::new(Vec::new()),
                hold: false,
            })
        }
    }

    impl NativeSurface for StubSurface {
        fn bounds(&self) -> LogicalSize {
            self.bounds
        }

        fn contents_scale(&self) -> f64 {
            1.0
        }

        fn display_refresh(&self) -> Option<DisplayRefresh> {
            Some(DisplayRefresh::fixed(60.0))
        }

        fn configure(&self, _config: &SurfaceConfig) {}

        fn request_drawable(&self, request: DrawableRequest) {
            request.fulfil();
        }

        fn present(&self, request: PresentRequest, feedback: PresentFeedback) {
            if self.hold {
                self.held.lock().push(feedback);
            } else {
                feedback.presented(request.desired_present_time + 100);
            }
        }

        fn set_needs_display(&self, _regions: &[vk::Rect2D]) {}

        fn set_hdr_metadata(&self, _metadata: &HdrMetadata) {}
    }

    fn swapchain(device: Arc<StubDevice>, surface: Arc<StubSurface>) -> Swapchain {
        Swapchain::builder(device, surface)
            .config(SwapchainConfig::new(640, 480).with_image_count(2))
            .build()
            .unwrap()
    }

    #[test]
    fn acquire_present_cycle() {
        let chain = swapchain(StubDevice::healthy(), StubSurface::new(640.0, 480.0));
        let fence = Signal::new();

        let acquired = chain
            .acquire_next_image(Timeout::Poll, None, Some(&fence), 1)
            .unwrap();
        assert_eq!(acquired.index(), 0);
        assert_eq!(acquired.token, AcquisitionToken(1));
        assert!(!acquired.suboptimal);
        assert!(fence.is_signaled());
        assert_eq!(chain.last_acquisition_token(), Some(AcquisitionToken(1)));

        let outcome = chain
            .present(acquired.index(), &PresentInfo::new(5).at(1_000))
            .unwrap();
        assert_eq!(outcome.token, acquired.token);
        assert_eq!(chain.image_state(0).unwrap(), ImageState::Available);

        let mut timings = [PresentTiming::default(); 4];
        let result = chain.past_presentation_timing(Some(&mut timings));
        assert_eq!(result.written, 1);
        assert_eq!(timings[0].present_id, 5);
        assert_eq!(timings[0].actual_present_time, 1_100);
    }

    #[test]
    fn tokens_increase() {
        let chain = swapchain(StubDevice::healthy(), StubSurface::new(640.0, 480.0));
        let first = chain
            .acquire_next_image(Timeout::Poll, None, None, 1)
            .unwrap();
        let second = chain
            .acquire_next_image(Timeout::Poll, None, None, 1)
            .unwrap();
        assert!(second.token > first.token);
        assert_eq!(
            chain.acquire_next_image(Timeout::Poll, None, None, 1),
            Err(SwapchainError::NotReady)
        );
    }

    #[test]
    fn mismatched_surface_is_suboptimal() {
        let chain = swapchain(StubDevice::healthy(), StubSurface::new(800.0, 600.0));
        assert_eq!(chain.surface_status(), Ok(SurfaceStatus::Suboptimal));

        let acquired = chain
            .acquire_next_image(Timeout::Poll, None, None, 1)
            .unwrap();
        assert!(acquired.suboptimal);

        chain.reconfigure(
            vk::Extent2D {
                width: 640,
                height: 480,
            },
            PresentScaling::STRETCH,
        );
        assert!(chain.has_optimal_surface());
    }

    #[test]
    fn device_error_takes_precedence() {
        let device = StubDevice::healthy();
        let chain = swapchain(Arc::clone(&device), StubSurface::new(800.0, 600.0));
        chain.mark_surface_lost();
        assert_eq!(chain.surface_status(), Err(SwapchainError::SurfaceLost));

        device
            .0
            .store(vk::Result::ERROR_DEVICE_LOST.as_raw(), Ordering::Relaxed);
        assert_eq!(
            chain.surface_status(),
            Err(SwapchainError::Device(vk::Result::ERROR_DEVICE_LOST))
        );
        assert_eq!(
            chain.refresh_cycle_duration(),
            Err(SwapchainError::Device(vk::Result::ERROR_DEVICE_LOST))
        );
    }

    #[test]
    fn invalid_device_mask() {
        let chain = swapchain(StubDevice::healthy(), StubSurface::new(640.0, 480.0));
        assert_eq!(
            chain.acquire_next_image(Timeout::Poll, None, None, 0b10),
            Err(SwapchainError::InvalidDeviceMask {
                mask: 0b10,
                available: 1
            })
        );
        assert_eq!(chain.image_state(0).unwrap(), ImageState::Available);
    }

    #[test]
    fn incompatible_present_mode_is_rejected() {
        let chain = swapchain(StubDevice::healthy(), StubSurface::new(640.0, 480.0));
        let acquired = chain
            .acquire_next_image(Timeout::Poll, None, None, 1)
            .unwrap();
        assert_eq!(
            chain.present(
                acquired.index(),
                &PresentInfo::new(1).with_present_mode(vk::PresentModeKHR::IMMEDIATE)
            ),
            Err(SwapchainError::IncompatiblePresentMode(
                vk::PresentModeKHR::IMMEDIATE
            ))
        );
        assert_eq!(chain.image_state(0).unwrap(), ImageState::Acquired);
    }

    #[test]
    fn failed_present_keeps_present_mode() {
        let chain = Swapchain::builder(StubDevice::healthy(), StubSurface::new(640.0, 480.0))
            .config(
                SwapchainConfig::new(640, 480).with_compatible_present_modes([
                    vk::PresentModeKHR::FIFO,
                    vk::PresentModeKHR::IMMEDIATE,
                ]),
            )
            .build()
            .unwrap();
        let acquired = chain
            .acquire_next_image(Timeout::Poll, None, None, 1)
            .unwrap();
        chain.release_images(&[acquired.index()]).unwrap();

        let info = PresentInfo::new(1).with_present_mode(vk::PresentModeKHR::IMMEDIATE);
        assert_eq!(
            chain.present(acquired.index(), &info),
            Err(SwapchainError::ImageNotAcquired(acquired.index()))
        );
        assert_eq!(chain.present_mode(), vk::PresentModeKHR::FIFO);

        let acquired = chain
            .acquire_next_image(Timeout::Poll, None, None, 1)
            .unwrap();
        chain.present(acquired.index(), &info).unwrap();
        assert_eq!(chain.present_mode(), vk::PresentModeKHR::IMMEDIATE);
    }

    #[test]
    fn image_count_is_clamped() {
        let chain = Swapchain::builder(
            StubDevice::healthy(),
            StubSurface::new(640.0, 480.0),
        )
        .config(SwapchainConfig::new(640, 480).with_image_count(8))
        .build()
        .unwrap();
        assert_eq!(chain.image_count(), 3);
        assert_eq!(chain.requested_image_count(), 8);
    }

    #[test]
    fn unbounded_destroy_timeout() {
        let chain = Swapchain::builder(StubDevice::healthy(), StubSurface::new(640.0, 480.0))
            .config(SwapchainConfig::new(640, 480).with_destroy_timeout(Duration::MAX))
            .build()
            .unwrap();
        let acquired = chain
            .acquire_next_image(Timeout::Poll, None, None, 1)
            .unwrap();
        chain.present(acquired.index(), &PresentInfo::new(1)).unwrap();
        chain.destroy();
    }

    #[test]
    fn destroy_invalidates_held_presentations() {
        let surface = Arc::new(StubSurface {
            bounds: LogicalSize::new(640.0, 480.0),
            held: Mutex::new(Vec::new()),
            hold: true,
        });
        let chain = Swapchain::builder(StubDevice::healthy(), Arc::clone(&surface) as _)
            .config(
                SwapchainConfig::new(640, 480)
                    .with_destroy_timeout(Duration::from_millis(5)),
            )
            .build()
            .unwrap();

        let acquired = chain
            .acquire_next_image(Timeout::Poll, None, None, 1)
            .unwrap();
        chain.present(acquired.index(), &PresentInfo::new(1)).unwrap();
        assert_eq!(chain.image_state(0).unwrap(), ImageState::Presenting);

        chain.destroy();
        // Late confirmation after destruction is harmless.
        for feedback in surface.held.lock().drain(..) {
            feedback.presented(1);
        }
    }
}
