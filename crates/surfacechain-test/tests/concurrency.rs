//! Multi-threaded acquisition and asynchronous compositor confirmation.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ash::vk;
use surfacechain_swapchain::{
    ImageState, PresentInfo, Swapchain, SwapchainConfig, SwapchainError, Timeout,
};
use surfacechain_test::{
    create_test_swapchain, CompositorConfig, MockDevice, MockSurface, PresentPolicy,
    SimulatedCompositor,
};

const THREADS: usize = 4;
const FRAMES_PER_THREAD: usize = 50;

fn with_compositor(
    config: CompositorConfig,
) -> (SimulatedCompositor, Arc<MockSurface>, Swapchain) {
    let compositor = SimulatedCompositor::spawn(config).unwrap();
    let device = Arc::new(MockDevice::new());
    let surface = Arc::new(
        MockSurface::new(640.0, 480.0)
            .with_present_policy(PresentPolicy::Forward(compositor.sender())),
    );
    let chain = create_test_swapchain(&device, &surface, SwapchainConfig::new(640, 480)).unwrap();
    (compositor, surface, chain)
}

#[test]
fn concurrent_acquirers_get_unique_tokens() {
    let (compositor, _surface, chain) = with_compositor(CompositorConfig {
        latency: Duration::from_micros(200),
        ..CompositorConfig::default()
    });

    let tokens: Vec<_> = thread::scope(|scope| {
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    let mut tokens = Vec::with_capacity(FRAMES_PER_THREAD);
                    for frame in 0..FRAMES_PER_THREAD {
                        let acquired = chain
                            .acquire_next_image(
                                Timeout::After(Duration::from_secs(5)),
                                None,
                                None,
                                1,
                            )
                            .unwrap();
                        let id = u32::try_from(frame).unwrap();
                        chain.present(acquired.index(), &PresentInfo::new(id)).unwrap();
                        tokens.push(acquired.token);
                    }
                    tokens
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect()
    });

    let unique: HashSet<_> = tokens.iter().copied().collect();
    assert_eq!(unique.len(), THREADS * FRAMES_PER_THREAD);
    // Tokens seen by any single thread are increasing.
    for chunk in tokens.chunks(FRAMES_PER_THREAD) {
        assert!(chunk.windows(2).all(|pair| pair[0] < pair[1]));
    }

    drop(chain);
    assert_eq!(
        compositor.presented_count(),
        (THREADS * FRAMES_PER_THREAD) as u64
    );
}

#[test]
fn poll_with_every_image_presenting_returns_immediately() {
    let device = Arc::new(MockDevice::new());
    let surface =
        Arc::new(MockSurface::new(640.0, 480.0).with_present_policy(PresentPolicy::Hold));
    let chain = create_test_swapchain(&device, &surface, SwapchainConfig::new(640, 480)).unwrap();

    for id in 0..3 {
        let acquired = chain
            .acquire_next_image(Timeout::Poll, None, None, 1)
            .unwrap();
        chain.present(acquired.index(), &PresentInfo::new(id)).unwrap();
    }
    let token_before = chain.last_acquisition_token();

    let start = Instant::now();
    let result = chain.acquire_next_image(Timeout::Poll, None, None, 1);
    let elapsed = start.elapsed();

    assert_eq!(result, Err(SwapchainError::NotReady));
    assert!(elapsed < Duration::from_millis(50), "poll took {elapsed:?}");
    assert_eq!(chain.last_acquisition_token(), token_before);
    for index in 0..3 {
        assert_eq!(chain.image_state(index).unwrap(), ImageState::Presenting);
    }
}

#[test]
fn bounded_wait_times_out() {
    let device = Arc::new(MockDevice::new());
    let surface =
        Arc::new(MockSurface::new(640.0, 480.0).with_present_policy(PresentPolicy::Hold));
    let chain = create_test_swapchain(
        &device,
        &surface,
        SwapchainConfig::new(640, 480).with_image_count(2),
    )
    .unwrap();
    for _ in 0..2 {
        chain
            .acquire_next_image(Timeout::Poll, None, None, 1)
            .unwrap();
    }

    let start = Instant::now();
    let result =
        chain.acquire_next_image(Timeout::After(Duration::from_millis(30)), None, None, 1);
    assert_eq!(result, Err(SwapchainError::Timeout));
    assert!(start.elapsed() >= Duration::from_millis(30));
}

#[test]
fn blocked_acquire_wakes_on_confirmation() {
    let device = Arc::new(MockDevice::new());
    let surface =
        Arc::new(MockSurface::new(640.0, 480.0).with_present_policy(PresentPolicy::Hold));
    let chain = create_test_swapchain(
        &device,
        &surface,
        SwapchainConfig::new(640, 480).with_image_count(2),
    )
    .unwrap();
    for id in 0..2 {
        let acquired = chain
            .acquire_next_image(Timeout::Poll, None, None, 1)
            .unwrap();
        chain.present(acquired.index(), &PresentInfo::new(id)).unwrap();
    }

    thread::scope(|scope| {
        let waiter = scope.spawn(|| {
            chain.acquire_next_image(Timeout::After(Duration::from_secs(5)), None, None, 1)
        });
        thread::sleep(Duration::from_millis(20));
        let mut held = surface.take_held();
        held.remove(1).presented(16_666_667);

        let acquired = waiter.join().unwrap().unwrap();
        assert_eq!(acquired.index(), 1);
        drop(held);
    });
}

#[test]
fn blocked_acquire_wakes_on_surface_loss() {
    let device = Arc::new(MockDevice::new());
    let surface = Arc::new(MockSurface::new(640.0, 480.0));
    let chain = create_test_swapchain(
        &device,
        &surface,
        SwapchainConfig::new(640, 480).with_image_count(2),
    )
    .unwrap();
    for _ in 0..2 {
        chain
            .acquire_next_image(Timeout::Poll, None, None, 1)
            .unwrap();
    }

    thread::scope(|scope| {
        let waiter =
            scope.spawn(|| chain.acquire_next_image(Timeout::Infinite, None, None, 1));
        thread::sleep(Duration::from_millis(20));
        chain.mark_surface_lost();
        assert_eq!(waiter.join().unwrap(), Err(SwapchainError::SurfaceLost));
    });
}

#[test]
fn blocked_acquire_wakes_on_device_error() {
    let device = Arc::new(MockDevice::new());
    let surface = Arc::new(MockSurface::new(640.0, 480.0));
    let chain = create_test_swapchain(
        &device,
        &surface,
        SwapchainConfig::new(640, 480).with_image_count(2),
    )
    .unwrap();
    for _ in 0..2 {
        chain
            .acquire_next_image(Timeout::Poll, None, None, 1)
            .unwrap();
    }

    thread::scope(|scope| {
        let waiter =
            scope.spawn(|| chain.acquire_next_image(Timeout::Infinite, None, None, 1));
        thread::sleep(Duration::from_millis(20));
        let raised = Instant::now();
        device.set_configuration_result(vk::Result::ERROR_DEVICE_LOST);

        assert_eq!(
            waiter.join().unwrap(),
            Err(SwapchainError::Device(vk::Result::ERROR_DEVICE_LOST))
        );
        assert!(raised.elapsed() < Duration::from_millis(500));
    });
    assert_eq!(chain.image_state(0).unwrap(), ImageState::Acquired);
    assert_eq!(chain.image_state(1).unwrap(), ImageState::Acquired);
}

#[test]
fn blocked_acquire_notices_removed_layer() {
    let device = Arc::new(MockDevice::new());
    let surface = Arc::new(MockSurface::new(640.0, 480.0));
    let chain = create_test_swapchain(
        &device,
        &surface,
        SwapchainConfig::new(640, 480).with_image_count(2),
    )
    .unwrap();
    for _ in 0..2 {
        chain
            .acquire_next_image(Timeout::Poll, None, None, 1)
            .unwrap();
    }

    thread::scope(|scope| {
        let waiter =
            scope.spawn(|| chain.acquire_next_image(Timeout::Infinite, None, None, 1));
        thread::sleep(Duration::from_millis(20));
        surface.remove_from_window();
        assert_eq!(waiter.join().unwrap(), Err(SwapchainError::SurfaceLost));
    });
    assert!(chain.is_surface_lost());
}

#[test]
fn compositor_discards_are_reclaimed() {
    let (compositor, _surface, chain) = with_compositor(CompositorConfig {
        drop_every: 3,
        ..CompositorConfig::default()
    });

    for id in 0..30 {
        let acquired = chain
            .acquire_next_image(Timeout::After(Duration::from_secs(5)), None, None, 1)
            .unwrap();
        chain.present(acquired.index(), &PresentInfo::new(id)).unwrap();
    }
    drop(chain);

    assert_eq!(compositor.discarded_count(), 10);
    assert_eq!(compositor.presented_count(), 20);
}

#[test]
fn destroy_waits_for_in_flight_presentations() {
    let (compositor, surface, chain) = with_compositor(CompositorConfig {
        latency: Duration::from_millis(10),
        ..CompositorConfig::default()
    });

    for id in 0..3 {
        let acquired = chain
            .acquire_next_image(Timeout::Poll, None, None, 1)
            .unwrap();
        chain.present(acquired.index(), &PresentInfo::new(id)).unwrap();
    }
    chain.destroy();

    assert_eq!(compositor.presented_count(), 3);
    assert_eq!(surface.detach_calls(), 1);
}

#[test]
fn destroy_gives_up_on_stalled_compositor() {
    let device = Arc::new(MockDevice::new());
    let surface =
        Arc::new(MockSurface::new(640.0, 480.0).with_present_policy(PresentPolicy::Hold));
    let chain = create_test_swapchain(
        &device,
        &surface,
        SwapchainConfig::new(640, 480).with_destroy_timeout(Duration::from_millis(10)),
    )
    .unwrap();
    let acquired = chain
        .acquire_next_image(Timeout::Poll, None, None, 1)
        .unwrap();
    chain.present(acquired.index(), &PresentInfo::new(0)).unwrap();

    let start = Instant::now();
    chain.destroy();
    assert!(start.elapsed() < Duration::from_secs(1));

    // Confirmations arriving after destruction are ignored.
    assert_eq!(surface.confirm_held(1), 1);
    assert_eq!(surface.detach_calls(), 1);
}
