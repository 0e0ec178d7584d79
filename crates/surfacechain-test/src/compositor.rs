//! Background thread standing in for the window server's compositor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use surfacechain_swapchain::{PresentFeedback, PresentRequest};
use tracing::{debug, trace};

use crate::Result;

/// Work sent to the compositor thread.
#[derive(Debug)]
pub enum CompositorRequest {
    /// Display an image and confirm through its feedback.
    Present {
        request: PresentRequest,
        feedback: PresentFeedback,
    },
    /// Stop the compositor thread.
    Shutdown,
}

/// Timing behaviour of a simulated compositor.
#[derive(Debug, Clone, Copy)]
pub struct CompositorConfig {
    /// Interval between simulated vertical blanks.
    pub refresh: Duration,
    /// Wall-clock delay before each confirmation.
    pub latency: Duration,
    /// Discard every Nth frame instead of displaying it (0 never discards).
    pub drop_every: u32,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            refresh: Duration::from_nanos(16_666_667),
            latency: Duration::ZERO,
            drop_every: 0,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    presented: AtomicU64,
    discarded: AtomicU64,
}

/// Compositor running on its own thread.
///
/// Frames are displayed at the first simulated vertical blank no earlier than
/// their desired present time. Requests still queued at shutdown are dropped,
/// which the swapchain observes as discarded frames.
pub struct SimulatedCompositor {
    request_tx: Sender<CompositorRequest>,
    counters: Arc<Counters>,
    thread: Option<JoinHandle<()>>,
}

impl SimulatedCompositor {
    /// Spawn the compositor thread.
    pub fn spawn(config: CompositorConfig) -> Result<Self> {
        let (request_tx, request_rx) = channel::unbounded();
        let counters = Arc::new(Counters::default());

        let thread = {
            let counters = Arc::clone(&counters);
            thread::Builder::new()
                .name("simulated-compositor".to_string())
                .spawn(move || Self::run(config, &request_rx, &counters))?
        };

        Ok(Self {
            request_tx,
            counters,
            thread: Some(thread),
        })
    }

    /// Channel surfaces forward their presentations into.
    pub fn sender(&self) -> Sender<CompositorRequest> {
        self.request_tx.clone()
    }

    /// Frames confirmed as displayed.
    pub fn presented_count(&self) -> u64 {
        self.counters.presented.load(Ordering::Acquire)
    }

    /// Frames confirmed as discarded.
    pub fn discarded_count(&self) -> u64 {
        self.counters.discarded.load(Ordering::Acquire)
    }

    /// Stop the thread and wait for it to finish.
    pub fn shutdown(&mut self) {
        let _ = self.request_tx.send(CompositorRequest::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    fn run(config: CompositorConfig, request_rx: &Receiver<CompositorRequest>, counters: &Counters) {
        let refresh = u64::try_from(config.refresh.as_nanos())
            .unwrap_or(u64::MAX)
            .max(1);
        let mut vblank = refresh;
        let mut frame = 0u32;

        while let Ok(CompositorRequest::Present { request, feedback }) = request_rx.recv() {
            if !config.latency.is_zero() {
                thread::sleep(config.latency);
            }
            frame = frame.wrapping_add(1);

            if config.drop_every > 0 && frame % config.drop_every == 0 {
                counters.discarded.fetch_add(1, Ordering::AcqRel);
                feedback.discarded();
                continue;
            }

            if vblank < request.desired_present_time {
                let behind = request.desired_present_time - vblank;
                vblank = vblank.saturating_add(behind.div_ceil(refresh).saturating_mul(refresh));
            }
            trace!(
                "Compositor displaying image {} at {}",
                request.image.index,
                vblank
            );
            counters.presented.fetch_add(1, Ordering::AcqRel);
            feedback.presented(vblank);
            vblank = vblank.saturating_add(refresh);
        }
        debug!("Simulated compositor stopped after {frame} frames");
    }
}

impl Drop for SimulatedCompositor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
