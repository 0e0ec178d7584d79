//! Frame interval statistics.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::info;

/// Aggregated frame interval statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    /// Number of intervals recorded.
    pub count: u32,
    /// Sum of all intervals.
    pub total: Duration,
    /// Shortest interval.
    pub min: Duration,
    /// Longest interval.
    pub max: Duration,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameStats {
    /// Create empty stats.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            count: 0,
            total: Duration::ZERO,
            min: Duration::MAX,
            max: Duration::ZERO,
        }
    }

    /// Record one interval.
    pub fn record(&mut self, interval: Duration) {
        self.count = self.count.saturating_add(1);
        self.total = self.total.saturating_add(interval);
        self.min = self.min.min(interval);
        self.max = self.max.max(interval);
    }

    /// Mean interval, zero when nothing was recorded.
    #[must_use]
    pub fn average(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total / self.count
        }
    }

    /// Frames per second implied by the mean interval.
    #[must_use]
    pub fn fps(&self) -> f64 {
        let average = self.average().as_secs_f64();
        if average > 0.0 {
            1.0 / average
        } else {
            0.0
        }
    }
}

struct FrameState {
    last_frame: Option<Instant>,
    frames_since_log: u32,
    lifetime: FrameStats,
    window: FrameStats,
}

/// Tracks the time between presented frames.
///
/// Every `log_every` frames (0 disables) a summary of the frames since the
/// previous summary is logged at info level.
pub struct FrameIntervalTracker {
    state: Mutex<FrameState>,
    log_every: u32,
}

impl FrameIntervalTracker {
    /// Create a tracker that logs every `log_every` frames.
    #[must_use]
    pub const fn new(log_every: u32) -> Self {
        Self {
            state: Mutex::new(FrameState {
                last_frame: None,
                frames_since_log: 0,
                lifetime: FrameStats::new(),
                window: FrameStats::new(),
            }),
            log_every,
        }
    }

    /// Mark a frame boundary now.
    pub fn mark(&self) -> Option<Duration> {
        self.mark_at(Instant::now())
    }

    /// Mark a frame boundary at `now`, returning the interval since the
    /// previous one. The first frame only starts the clock.
    pub fn mark_at(&self, now: Instant) -> Option<Duration> {
        let mut state = self.state.lock();
        let previous = state.last_frame.replace(now)?;
        let interval = now.saturating_duration_since(previous);
        state.lifetime.record(interval);
        state.window.record(interval);

        if self.log_every > 0 {
            state.frames_since_log += 1;
            if state.frames_since_log >= self.log_every {
                let window = std::mem::take(&mut state.window);
                state.frames_since_log = 0;
                info!(
                    "Frame statistics over {} frames: avg {:.2} fps, interval avg {:.3} ms, min {:.3} ms, max {:.3} ms",
                    window.count,
                    window.fps(),
                    window.average().as_secs_f64() * 1000.0,
                    window.min.as_secs_f64() * 1000.0,
                    window.max.as_secs_f64() * 1000.0,
                );
            }
        }
        Some(interval)
    }

    /// Time of the last marked frame.
    pub fn last_frame_time(&self) -> Option<Instant> {
        self.state.lock().last_frame
    }

    /// Frames counted towards the next periodic summary.
    pub fn frames_since_log(&self) -> u32 {
        self.state.lock().frames_since_log
    }

    /// Statistics over the tracker's whole lifetime.
    pub fn stats(&self) -> FrameStats {
        self.state.lock().lifetime
    }
}
