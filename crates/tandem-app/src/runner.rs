//! Application runner and event loop.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use tandem_core::FrameConfig;
use tandem_frame::{FrameCycle, FrameOutcome};
use tandem_gpu::{GpuContextBuilder, SwapchainPresenter, VulkanFrameDevice};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

use crate::app::TandemApp;
use crate::context::{AppContext, VulkanFrameCycle};
use crate::frame::FrameContext;
use crate::instance::EngineInstance;

/// Application configuration.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Frame ring size and timeouts.
    pub frame: FrameConfig,
    /// How long the event loop sleeps per iteration while the window is
    /// minimized or hidden.
    pub minimized_throttle: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Tandem".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            validation: cfg!(debug_assertions),
            frame: FrameConfig::default(),
            minimized_throttle: Duration::from_millis(100),
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Enable or disable vsync.
    #[must_use]
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Replace the frame ring configuration.
    #[must_use]
    pub fn with_frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }

    /// Set the event loop sleep used while minimized.
    #[must_use]
    pub fn with_minimized_throttle(mut self, throttle: Duration) -> Self {
        self.minimized_throttle = throttle;
        self
    }
}

/// Install the `tracing` subscriber.
///
/// Honors `RUST_LOG`, defaulting to `info`. Calling it again is harmless.
pub fn init_logging() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
    if installed.is_err() {
        tracing::debug!("Logging already initialized");
    }
}

/// Run a [`TandemApp`] with the given configuration.
///
/// Initializes logging, creates the window, GPU context and frame cycle, and
/// runs the event loop until the application exits. A startup failure or a
/// fatal frame error stops the loop and is returned.
pub fn run_app<A: TandemApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    init_logging();

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
        error: None,
    };

    event_loop.run_app(&mut runner)?;

    runner.error.map_or(Ok(()), Err)
}

/// Internal application runner that implements winit's `ApplicationHandler`.
struct AppRunner<A: TandemApp> {
    config: AppConfig,
    state: Option<AppState<A>>,
    /// First fatal error; returned from [`run_app`].
    error: Option<anyhow::Error>,
}

/// Internal application state.
struct AppState<A: TandemApp> {
    ctx: AppContext,
    frames: VulkanFrameCycle,
    device: VulkanFrameDevice,
    app: A,
    last_frame_time: Instant,
    /// No logical frame runs while set.
    paused: bool,
    minimized: bool,
    /// Swapchain must be recreated before the next frame.
    needs_resize: bool,
    // FPS tracking
    presented: u64,
    min_fps: f64,
    max_fps: f64,
    fps_sum: f64,
}

impl<A: TandemApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() || self.error.is_some() {
            return;
        }

        info!("Creating application state...");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => {
                error!("Failed to initialize application: {e:#}");
                self.error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(state) = &mut self.state else {
            return;
        };

        // Let the app handle the event first
        if state.app.on_event(&event) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.exit(event_loop);
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                info!("Escape pressed");
                self.exit(event_loop);
            }
            WindowEvent::Resized(size) => state.on_resized(size),
            WindowEvent::Occluded(occluded) => state.set_paused(occluded, "occluded"),
            WindowEvent::RedrawRequested => {
                if state.paused {
                    return;
                }
                if let Err(e) = state.render_frame() {
                    error!("Fatal frame error: {e:#}");
                    self.error = Some(e);
                    self.exit(event_loop);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        let Some(state) = &mut self.state else {
            return;
        };

        match state.ctx.window.is_minimized() {
            Some(true) => {
                state.minimized = true;
                state.set_paused(true, "minimized");
            }
            Some(false) if state.minimized => {
                state.minimized = false;
                state.set_paused(false, "restored");
                state.needs_resize = true;
            }
            _ => {}
        }

        if state.paused {
            thread::sleep(self.config.minimized_throttle);
        } else {
            state.ctx.window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

impl<A: TandemApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        let instance = EngineInstance::claim()?;

        let window_attrs = Window::default_attributes()
            .with_title(self.config.title.as_str())
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let gpu = GpuContextBuilder::new()
            .app_name(self.config.title.as_str())
            .validation(self.config.validation)
            .build()?;

        // SAFETY: The window was just created and is kept alive by the context
        let mut ctx = unsafe { AppContext::new(instance, window, gpu, self.config.vsync)? };

        let mut device = ctx.gpu.frame_device();
        let mut frames = FrameCycle::new(&mut device, self.config.frame)?;

        let app = match A::init(&mut ctx, &mut frames) {
            Ok(app) => app,
            Err(e) => {
                if let Err(shutdown) = frames.shutdown(&mut device) {
                    error!("Frame cycle shutdown after failed init: {shutdown}");
                }
                return Err(e);
            }
        };

        Ok(AppState {
            ctx,
            frames,
            device,
            app,
            last_frame_time: Instant::now(),
            paused: false,
            minimized: false,
            needs_resize: false,
            presented: 0,
            min_fps: f64::MAX,
            max_fps: 0.0,
            fps_sum: 0.0,
        })
    }

    fn exit(&mut self, event_loop: &ActiveEventLoop) {
        self.shutdown();
        event_loop.exit();
    }

    fn shutdown(&mut self) {
        if let Some(state) = self.state.take() {
            if let Err(e) = state.shutdown() {
                error!("Shutdown error: {e:#}");
                self.error.get_or_insert(e);
            }
        }
    }
}

impl<A: TandemApp> AppState<A> {
    fn set_paused(&mut self, paused: bool, reason: &str) {
        if self.paused != paused {
            info!("Rendering {} ({reason})", if paused { "paused" } else { "resumed" });
            self.paused = paused;
        }
    }

    fn on_resized(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            self.set_paused(true, "zero-sized window");
        } else {
            self.set_paused(false, "restored");
            self.needs_resize = true;
        }
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn render_frame(&mut self) -> anyhow::Result<()> {
        if self.needs_resize {
            self.handle_resize()?;
            if self.paused {
                return Ok(());
            }
        }

        let now = Instant::now();
        let dt = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;

        self.app.update(&self.ctx, dt);

        let Self {
            ctx,
            frames,
            device,
            app,
            ..
        } = self;
        let ctx: &AppContext = ctx;

        let mut presenter = SwapchainPresenter::new(
            &ctx.swapchain,
            &ctx.surface.swapchain_loader,
            ctx.gpu.graphics_queue(),
        );

        let outcome = frames.run_frame(device, &mut presenter, |rec| {
            let image_index = rec.info.image_index;
            let swapchain_image = ctx
                .swapchain_image(image_index)
                .ok_or_else(|| anyhow!("Acquired image {image_index} is not in the swapchain"))?;
            let mut frame = FrameContext::new(
                rec.recorder.handle(),
                image_index,
                swapchain_image,
                dt,
                rec.info.frame_number,
                rec.info.slot_index,
                &mut *rec.deletions,
            );
            app.render(ctx, &mut frame)
        })?;

        match outcome {
            FrameOutcome::Presented { .. } => self.record_fps(dt),
            FrameOutcome::NeedsResize { advanced } => {
                if advanced {
                    self.record_fps(dt);
                }
                self.needs_resize = true;
            }
        }

        Ok(())
    }

    fn record_fps(&mut self, dt: f32) {
        self.presented += 1;
        if dt > 0.0 {
            let fps = 1.0 / f64::from(dt);
            self.min_fps = self.min_fps.min(fps);
            self.max_fps = self.max_fps.max(fps);
            self.fps_sum += fps;
        }
    }

    /// Drain every slot, recreate the swapchain and notify the app.
    fn handle_resize(&mut self) -> anyhow::Result<()> {
        let size = self.ctx.window.inner_size();
        if size.width == 0 || size.height == 0 {
            self.set_paused(true, "zero-sized window");
            return Ok(());
        }

        self.frames.wait_idle(&mut self.device)?;
        // SAFETY: Every frame slot has drained
        unsafe { self.ctx.recreate_swapchain(size.width, size.height)? };
        self.needs_resize = false;

        let extent = self.ctx.extent();
        self.app
            .on_resize(&mut self.ctx, extent.width, extent.height)?;

        info!("Resized to {}x{}", extent.width, extent.height);
        Ok(())
    }

    /// Drain the GPU, release everything and report the first failure.
    fn shutdown(self) -> anyhow::Result<()> {
        let Self {
            mut ctx,
            frames,
            mut device,
            mut app,
            presented,
            min_fps,
            max_fps,
            fps_sum,
            ..
        } = self;

        if presented > 0 {
            #[allow(clippy::cast_precision_loss)]
            let avg_fps = fps_sum / presented as f64;
            info!("FPS Statistics:");
            info!("  Min: {min_fps:.1}");
            info!("  Max: {max_fps:.1}");
            info!("  Avg: {avg_fps:.1}");
            info!("  Total frames: {}", frames.frame_number());
        }

        info!("Starting cleanup...");

        // The app cleans up with the GPU idle, before the deletion queues run
        let drained = frames.wait_idle(&mut device);
        if drained.is_ok() {
            app.cleanup(&mut ctx);
        }
        let result = frames.shutdown(&mut device);

        drop(app);
        // Swapchain, surface, device and instance go last
        drop(ctx);

        info!("Cleanup complete");
        drained.and(result).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder_overrides_defaults() {
        let config = AppConfig::new("viewer")
            .with_size(640, 480)
            .with_vsync(false)
            .with_validation(true)
            .with_frame_config(FrameConfig::default().with_frame_overlap(3))
            .with_minimized_throttle(Duration::from_millis(20));

        assert_eq!(config.title, "viewer");
        assert_eq!((config.width, config.height), (640, 480));
        assert!(!config.vsync);
        assert!(config.validation);
        assert_eq!(config.frame.frame_overlap, 3);
        assert_eq!(config.minimized_throttle, Duration::from_millis(20));
    }

    #[test]
    fn default_config_double_buffers_and_throttles() {
        let config = AppConfig::default();
        assert_eq!(config.frame, FrameConfig::default());
        assert_eq!(config.frame.frame_overlap, tandem_core::constants::FRAME_OVERLAP);
        assert_eq!(config.minimized_throttle, Duration::from_millis(100));
    }
}
