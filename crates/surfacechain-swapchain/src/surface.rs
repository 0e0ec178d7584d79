//! Binding between a swapchain and its native compositor surface.
//!
//! The native surface is the collaborator that actually displays frames. It
//! may be resized, moved between displays or torn down at any time, so the
//! binding keeps its own lock around the layer state and latches surface loss
//! in an atomic that never clears.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ash::vk;
use parking_lot::Mutex;
use surfacechain_core::constants::NANOS_PER_SECOND;
use surfacechain_core::{
    natural_extent, AcquisitionToken, HdrMetadata, ImageHandle, LogicalSize, PresentScaling,
    RefreshCycle, Result, SurfaceStatus, SwapchainError,
};
use tracing::{debug, warn};

use crate::device::DeviceContext;
use crate::present::{PresentFeedback, PresentRequest};
use crate::signal::Signal;

/// Refresh rates reported by the display a surface is on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayRefresh {
    /// Nominal refresh rate in Hz.
    pub nominal_hz: f64,
    /// Lowest rate the display may drop to, in Hz. Equal to the nominal rate
    /// on fixed-rate displays.
    pub min_hz: f64,
}

impl DisplayRefresh {
    /// Fixed-rate display.
    pub const fn fixed(hz: f64) -> Self {
        Self {
            nominal_hz: hz,
            min_hz: hz,
        }
    }

    /// Nominal refresh interval and how much longer a refresh may take.
    pub fn refresh_cycle(&self) -> Result<RefreshCycle> {
        if self.nominal_hz.is_nan() || self.nominal_hz <= 0.0 {
            return Err(SwapchainError::SurfaceNotPresenting);
        }
        let nominal = NANOS_PER_SECOND / self.nominal_hz;
        let slowest = if self.min_hz > 0.0 && self.min_hz < self.nominal_hz {
            NANOS_PER_SECOND / self.min_hz
        } else {
            nominal
        };
        Ok(RefreshCycle {
            refresh_duration: nanos(nominal),
            variance: nanos(slowest - nominal),
        })
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn nanos(value: f64) -> std::time::Duration {
    std::time::Duration::from_nanos(value.round() as u64)
}

/// Layer configuration pushed to the native surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceConfig {
    /// Pixel size of the drawables.
    pub drawable_extent: vk::Extent2D,
    /// Drawable pixel format.
    pub format: vk::Format,
    /// How many drawables the surface may hand out at once.
    pub maximum_drawable_count: u32,
    /// Synchronize presentation with the display refresh.
    pub display_sync: bool,
    /// Scaling applied when drawables do not match the layer size.
    pub scaling: PresentScaling,
}

/// Geometry and lifecycle notifications from the native surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SurfaceEvent {
    /// Logical bounds or content scale changed. Checked against the live
    /// surface, which stays authoritative.
    Resized {
        /// New logical bounds.
        bounds: LogicalSize,
        /// New content scale.
        scale: f64,
    },
    /// The surface was torn down.
    Detached,
}

/// Request for the drawable backing an acquired image.
///
/// The surface fulfils it once the drawable is ready, on any thread; that
/// signals the caller's semaphore and fence. Dropping the request unfulfilled
/// still signals them, so no waiter blocks forever.
pub struct DrawableRequest {
    image: ImageHandle,
    token: AcquisitionToken,
    signals: Vec<Signal>,
    fulfilled: bool,
}

impl DrawableRequest {
    pub(crate) fn new(image: ImageHandle, token: AcquisitionToken, signals: Vec<Signal>) -> Self {
        Self {
            image,
            token,
            signals,
            fulfilled: false,
        }
    }

    /// Image whose drawable is requested.
    pub const fn image(&self) -> ImageHandle {
        self.image
    }

    /// Acquisition the request belongs to.
    pub const fn token(&self) -> AcquisitionToken {
        self.token
    }

    /// The drawable is ready to render into.
    pub fn fulfil(mut self) {
        self.signal_all();
    }

    fn signal_all(&mut self) {
        self.fulfilled = true;
        for signal in self.signals.drain(..) {
            signal.signal();
        }
    }
}

impl Drop for DrawableRequest {
    fn drop(&mut self) {
        if !self.fulfilled {
            debug!(
                "Drawable request for image {} dropped unfulfilled",
                self.image.index
            );
            self.signal_all();
        }
    }
}

impl std::fmt::Debug for DrawableRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrawableRequest")
            .field("image", &self.image)
            .field("token", &self.token)
            .field("fulfilled", &self.fulfilled)
            .finish_non_exhaustive()
    }
}

/// Native compositor surface a swapchain presents to.
pub trait NativeSurface: Send + Sync {
    /// Logical bounds of the layer.
    fn bounds(&self) -> LogicalSize;

    /// Device pixels per logical unit.
    fn contents_scale(&self) -> f64;

    /// False once the layer has been removed from its window.
    fn is_attached(&self) -> bool {
        true
    }

    /// Refresh rates of the current display, `None` when not on a display.
    fn display_refresh(&self) -> Option<DisplayRefresh>;

    /// Apply a new layer configuration.
    fn configure(&self, config: &SurfaceConfig);

    /// Provide the drawable for an acquired image.
    fn request_drawable(&self, request: DrawableRequest);

    /// Display an image, confirming through `feedback`.
    fn present(&self, request: PresentRequest, feedback: PresentFeedback);

    /// Mark regions as needing redisplay; an empty slice means everything.
    fn set_needs_display(&self, regions: &[vk::Rect2D]);

    /// Apply HDR metadata.
    fn set_hdr_metadata(&self, metadata: &HdrMetadata);

    /// The swapchain no longer uses this surface.
    fn detach(&self) {}
}

struct LayerState {
    config: SurfaceConfig,
    present_mode: vk::PresentModeKHR,
    compatible_present_modes: Vec<vk::PresentModeKHR>,
    hdr_metadata: Option<HdrMetadata>,
}

/// Live association with a native surface.
pub struct SurfaceBinding {
    surface: Arc<dyn NativeSurface>,
    layer: Mutex<LayerState>,
    surface_lost: AtomicBool,
}

impl SurfaceBinding {
    /// Bind to `surface` and push the initial layer configuration.
    pub fn new(
        surface: Arc<dyn NativeSurface>,
        config: SurfaceConfig,
        present_mode: vk::PresentModeKHR,
        compatible_present_modes: Vec<vk::PresentModeKHR>,
    ) -> Self {
        let config = SurfaceConfig {
            display_sync: display_sync(present_mode),
            ..config
        };
        surface.configure(&config);
        Self {
            surface,
            layer: Mutex::new(LayerState {
                config,
                present_mode,
                compatible_present_modes,
                hdr_metadata: None,
            }),
            surface_lost: AtomicBool::new(false),
        }
    }

    /// The bound native surface.
    pub fn surface(&self) -> &Arc<dyn NativeSurface> {
        &self.surface
    }

    /// Surface bounds times its content scale, rounded half-to-even.
    pub fn natural_extent(&self) -> vk::Extent2D {
        natural_extent(self.surface.bounds(), self.surface.contents_scale())
    }

    /// Extent the swapchain is configured for.
    pub fn configured_extent(&self) -> vk::Extent2D {
        self.layer.lock().config.drawable_extent
    }

    /// Current layer configuration.
    pub fn config(&self) -> SurfaceConfig {
        self.layer.lock().config
    }

    /// True when the caller declared that a size mismatch is intended.
    pub fn is_deliberately_scaled(&self) -> bool {
        self.layer.lock().config.scaling.is_deliberate()
    }

    /// Configured extent matches the surface, or scaling is deliberate.
    pub fn is_optimal(&self) -> bool {
        let config = self.layer.lock().config;
        config.scaling.is_deliberate() || config.drawable_extent == self.natural_extent()
    }

    /// Whether surface loss has been observed.
    pub fn is_surface_lost(&self) -> bool {
        self.surface_lost.load(Ordering::Acquire)
    }

    /// Latch surface loss. Returns `true` if this call latched it.
    pub fn mark_surface_lost(&self) -> bool {
        let newly_lost = !self.surface_lost.swap(true, Ordering::AcqRel);
        if newly_lost {
            warn!("Surface lost; swapchain must be recreated");
        }
        newly_lost
    }

    /// Latch surface loss if the native surface has been detached.
    pub fn check_attached(&self) -> bool {
        if self.surface.is_attached() {
            return true;
        }
        self.mark_surface_lost();
        false
    }

    /// Status in precedence order: device error, surface lost, suboptimal.
    pub fn status(&self, device: &dyn DeviceContext) -> Result<SurfaceStatus> {
        let result = device.configuration_result();
        if result != vk::Result::SUCCESS {
            return Err(SwapchainError::Device(result));
        }
        if self.is_surface_lost() {
            return Err(SwapchainError::SurfaceLost);
        }
        if !self.is_optimal() {
            return Ok(SurfaceStatus::Suboptimal);
        }
        Ok(SurfaceStatus::Optimal)
    }

    /// Update the configured extent and scaling intent.
    ///
    /// Images are not recreated; only the layer's drawable size changes.
    pub fn reconfigure(&self, extent: vk::Extent2D, scaling: PresentScaling) {
        let mut layer = self.layer.lock();
        layer.config.drawable_extent = extent;
        layer.config.scaling = scaling;
        self.surface.configure(&layer.config);
        debug!(
            "Surface reconfigured to {}x{} (scaling {:?})",
            extent.width, extent.height, scaling
        );
    }

    /// Current present mode.
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.layer.lock().present_mode
    }

    /// Modes switchable without recreating the swapchain.
    pub fn compatible_present_modes(&self) -> Vec<vk::PresentModeKHR> {
        self.layer.lock().compatible_present_modes.clone()
    }

    /// Whether `mode` can be switched to without recreating the swapchain.
    pub fn is_compatible_present_mode(&self, mode: vk::PresentModeKHR) -> bool {
        self.layer.lock().compatible_present_modes.contains(&mode)
    }

    /// Switch to another compatible present mode.
    pub fn set_present_mode(&self, mode: vk::PresentModeKHR) -> Result<()> {
        let mut layer = self.layer.lock();
        if !layer.compatible_present_modes.contains(&mode) {
            return Err(SwapchainError::IncompatiblePresentMode(mode));
        }
        if layer.present_mode != mode {
            layer.present_mode = mode;
            layer.config.display_sync = display_sync(mode);
            self.surface.configure(&layer.config);
            debug!("Present mode switched to {:?}", mode);
        }
        Ok(())
    }

    /// Store HDR metadata and forward it unchanged.
    pub fn set_hdr_metadata(&self, metadata: HdrMetadata) {
        let mut layer = self.layer.lock();
        layer.hdr_metadata = Some(metadata);
        self.surface.set_hdr_metadata(&metadata);
    }

    /// Last HDR metadata set.
    pub fn hdr_metadata(&self) -> Option<HdrMetadata> {
        self.layer.lock().hdr_metadata
    }

    /// Mark regions of the layer as needing redisplay.
    ///
    /// `None` or an empty list marks the whole layer.
    pub fn set_needs_display(&self, regions: Option<&[vk::Rect2D]>) {
        let _layer = self.layer.lock();
        self.surface.set_needs_display(regions.unwrap_or(&[]));
    }

    /// Refresh cycle of the display the surface is on.
    pub fn refresh_cycle(&self) -> Result<RefreshCycle> {
        self.surface
            .display_refresh()
            .ok_or(SwapchainError::SurfaceNotPresenting)?
            .refresh_cycle()
    }

    /// React to a native surface notification.
    pub fn handle_event(&self, event: SurfaceEvent) {
        match event {
            SurfaceEvent::Resized { bounds, scale } => {
                let reported = natural_extent(bounds, scale);
                let live = self.natural_extent();
                if reported == live {
                    debug!(
                        "Surface resized to {}x{} points at scale {} ({}x{} pixels)",
                        bounds.width, bounds.height, scale, live.width, live.height
                    );
                } else {
                    // Optimality always follows the live surface query.
                    warn!(
                        "Stale resize event ({}x{} pixels); surface now reports {}x{}",
                        reported.width, reported.height, live.width, live.height
                    );
                }
            }
            SurfaceEvent::Detached => {
                self.mark_surface_lost();
            }
        }
    }

    pub(crate) fn request_drawable(&self, request: DrawableRequest) {
        self.surface.request_drawable(request);
    }

    pub(crate) fn present(&self, request: PresentRequest, feedback: PresentFeedback) {
        self.surface.present(request, feedback);
    }

    pub(crate) fn detach(&self) {
        let _layer = self.layer.lock();
        self.surface.detach();
    }
}

/// Immediate presentation tears; every other mode waits for refresh.
fn display_sync(mode: vk::PresentModeKHR) -> bool {
    mode != vk::PresentModeKHR::IMMEDIATE
}
