//! Surfacechain soak test.
//!
//! Drives one swapchain from several render threads against a simulated
//! compositor, resizes the surface halfway through, and prints a timing
//! report at the end.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use crossbeam::channel::{self, Receiver, Sender};
use surfacechain_core::{LogicalSize, PresentScaling};
use surfacechain_swapchain::{
    PresentInfo, PresentTiming, Swapchain, SwapchainConfig, SwapchainError, Timeout,
};
use surfacechain_test::{
    create_test_swapchain, CompositorConfig, MockDevice, MockSurface, PresentPolicy,
    SimulatedCompositor,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
#[cfg(feature = "profiling-tracy")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: surfacechain-soak [--frames N] [--images N] [--threads N] \
                     [--log-every N] [--latency-us N] [--drop-every N]";

/// Soak run parameters.
#[derive(Debug, Clone)]
struct SoakConfig {
    frames: u32,
    image_count: u32,
    threads: usize,
    log_every: u32,
    latency: Duration,
    drop_every: u32,
}

impl Default for SoakConfig {
    fn default() -> Self {
        Self {
            frames: 600,
            image_count: 3,
            threads: 2,
            log_every: 120,
            latency: Duration::from_micros(500),
            drop_every: 0,
        }
    }
}

impl SoakConfig {
    fn from_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let mut config = Self::default();
        while let Some(flag) = args.next() {
            if flag == "--help" || flag == "-h" {
                println!("{USAGE}");
                std::process::exit(0);
            }
            let value = args
                .next()
                .with_context(|| format!("missing value for {flag}\n{USAGE}"))?;
            let parse = |value: &str| -> anyhow::Result<u64> {
                value
                    .parse()
                    .with_context(|| format!("invalid value {value:?} for {flag}"))
            };
            match flag.as_str() {
                "--frames" => config.frames = u32::try_from(parse(&value)?)?,
                "--images" => config.image_count = u32::try_from(parse(&value)?)?,
                "--threads" => config.threads = usize::try_from(parse(&value)?)?.max(1),
                "--log-every" => config.log_every = u32::try_from(parse(&value)?)?,
                "--latency-us" => config.latency = Duration::from_micros(parse(&value)?),
                "--drop-every" => config.drop_every = u32::try_from(parse(&value)?)?,
                _ => bail!("unknown argument {flag}\n{USAGE}"),
            }
        }
        Ok(config)
    }
}

/// What a render thread saw for one frame.
#[derive(Debug, Clone, Copy)]
struct FrameReport {
    acquire_wait: Duration,
    suboptimal: bool,
}

fn init_logging() {
    #[cfg(feature = "profiling-tracy")]
    {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,surfacechain_swapchain=trace,surfacechain_soak=trace")
        });
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .with(tracing_tracy::TracyLayer::default())
            .init();
    }
    #[cfg(not(feature = "profiling-tracy"))]
    {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    }
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let config = SoakConfig::from_args(std::env::args().skip(1))?;
    info!("Surfacechain soak starting: {config:?}");

    let compositor_config = CompositorConfig {
        latency: config.latency,
        drop_every: config.drop_every,
        ..CompositorConfig::default()
    };
    let mut compositor = SimulatedCompositor::spawn(compositor_config)?;

    let device = Arc::new(MockDevice::new());
    let surface = Arc::new(
        MockSurface::new(1280.0, 720.0)
            .with_present_policy(PresentPolicy::Forward(compositor.sender())),
    );
    let swapchain = create_test_swapchain(
        &device,
        &surface,
        SwapchainConfig::new(1280, 720)
            .with_image_count(config.image_count)
            .with_perf_log_frame_count(config.log_every),
    )?;
    info!(
        "Swapchain ready: {} images, refresh {:?}",
        swapchain.image_count(),
        swapchain.refresh_cycle_duration()?
    );

    let (report_tx, report_rx) = channel::unbounded();
    let start = Instant::now();
    let (reports, timings) =
        thread::scope(|scope| -> anyhow::Result<(Vec<FrameReport>, Vec<PresentTiming>)> {
            let frames_per_thread = config.frames / u32::try_from(config.threads)?;
            let workers: Vec<_> = (0..config.threads)
                .map(|_| {
                    let report_tx = report_tx.clone();
                    let swapchain = &swapchain;
                    scope.spawn(move || render_loop(swapchain, frames_per_thread, &report_tx))
                })
                .collect();
            drop(report_tx);

            let collected =
                collect(&swapchain, &surface, &compositor, &report_rx, config.frames);
            for worker in workers {
                match worker.join() {
                    Ok(result) => result?,
                    Err(_) => bail!("render thread panicked"),
                }
            }
            Ok(collected)
        })?;
    let elapsed = start.elapsed();

    let stats = swapchain.frame_stats();
    swapchain.destroy();
    compositor.shutdown();

    print_report(&reports, &timings, &compositor, elapsed);
    info!(
        "Frame intervals: avg {:.3} ms, min {:.3} ms, max {:.3} ms",
        stats.average().as_secs_f64() * 1000.0,
        stats.min.as_secs_f64() * 1000.0,
        stats.max.as_secs_f64() * 1000.0
    );
    Ok(())
}

fn render_loop(
    swapchain: &Swapchain,
    frames: u32,
    reports: &Sender<FrameReport>,
) -> anyhow::Result<()> {
    for frame in 0..frames {
        let wait_start = Instant::now();
        let timeout = Timeout::After(Duration::from_secs(1));
        let acquired = match swapchain.acquire_next_image(timeout, None, None, 1) {
            Ok(acquired) => acquired,
            Err(SwapchainError::Timeout) => {
                warn!("Acquire timed out on frame {frame}");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let acquire_wait = wait_start.elapsed();

        let desired = u64::from(frame) * 16_666_667;
        swapchain.present(acquired.index(), &PresentInfo::new(frame).at(desired))?;

        if reports
            .send(FrameReport {
                acquire_wait,
                suboptimal: acquired.suboptimal,
            })
            .is_err()
        {
            break;
        }
    }
    Ok(())
}

/// Gather frame reports and drain timing history while frames are in
/// flight. The surface is resized once half of the frames have been reported.
fn collect(
    swapchain: &Swapchain,
    surface: &MockSurface,
    compositor: &SimulatedCompositor,
    reports: &Receiver<FrameReport>,
    frames: u32,
) -> (Vec<FrameReport>, Vec<PresentTiming>) {
    let mut collected = Vec::with_capacity(frames as usize);
    let mut timings = Vec::with_capacity(frames as usize);
    let mut buffer = [PresentTiming::default(); 16];
    let mut resized = false;

    for report in reports {
        collected.push(report);
        drain_timings(swapchain, &mut buffer, &mut timings);

        if !resized && collected.len() >= (frames / 2) as usize {
            resized = true;
            let event = surface.resize(LogicalSize::new(1600.0, 900.0), 1.0);
            swapchain.handle_surface_event(event);
            debug!(
                "Surface resized, swapchain optimal: {}",
                swapchain.has_optimal_surface()
            );
            swapchain.reconfigure(swapchain.natural_extent(), PresentScaling::empty());
        }
    }

    // Render threads are done; wait for the compositor to catch up.
    let deadline = Instant::now() + Duration::from_secs(2);
    let submitted = collected.len() as u64;
    while compositor.presented_count() + compositor.discarded_count() < submitted
        && Instant::now() < deadline
    {
        thread::sleep(Duration::from_millis(1));
    }
    drain_timings(swapchain, &mut buffer, &mut timings);
    (collected, timings)
}

fn drain_timings(
    swapchain: &Swapchain,
    buffer: &mut [PresentTiming],
    timings: &mut Vec<PresentTiming>,
) {
    loop {
        let result = swapchain.past_presentation_timing(Some(&mut *buffer));
        timings.extend_from_slice(&buffer[..result.written]);
        if result.is_complete() {
            break;
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn print_report(
    reports: &[FrameReport],
    timings: &[PresentTiming],
    compositor: &SimulatedCompositor,
    elapsed: Duration,
) {
    let suboptimal = reports.iter().filter(|report| report.suboptimal).count();
    let max_wait = reports
        .iter()
        .map(|report| report.acquire_wait)
        .max()
        .unwrap_or_default();
    let total_wait: Duration = reports.iter().map(|report| report.acquire_wait).sum();
    let latency: u64 = timings
        .iter()
        .map(|timing| timing.actual_present_time.saturating_sub(timing.desired_present_time))
        .sum();

    println!("=== Surfacechain soak report ===");
    println!("Frames submitted:   {}", reports.len());
    println!("Frames presented:   {}", compositor.presented_count());
    println!("Frames discarded:   {}", compositor.discarded_count());
    println!("Suboptimal frames:  {suboptimal}");
    println!("Timing records:     {}", timings.len());
    println!("Elapsed:            {:.3} s", elapsed.as_secs_f64());
    if !reports.is_empty() {
        println!(
            "Acquire wait:       avg {:.3} ms, max {:.3} ms",
            total_wait.as_secs_f64() * 1000.0 / reports.len() as f64,
            max_wait.as_secs_f64() * 1000.0
        );
    }
    if !timings.is_empty() {
        println!(
            "Present latency:    avg {:.3} ms past desired",
            latency as f64 / timings.len() as f64 / 1_000_000.0
        );
    }
}
