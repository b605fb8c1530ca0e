//! Window creation and event handling via winit.
//!
//! [`AppState`] implements winit's [`ApplicationHandler`]. It creates the
//! window and GPU context on resume, forwards resizes, and calls the
//! [`FrameHandler`] on every redraw.

use std::sync::Arc;

use tracing::{error, info, warn};
use umbra_config::Config;
use umbra_render::{RenderContext, ResourceError, SurfaceError, init_render_context_blocking};
use winit::application::ApplicationHandler;
use winit::error::EventLoopError;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::frame_clock::FrameClock;

/// What the application renders.
pub trait FrameHandler {
    /// Create GPU resources once the context exists.
    fn init(&mut self, ctx: &RenderContext) -> Result<(), ResourceError>;

    /// The surface was resized to `width` x `height` physical pixels.
    fn resized(&mut self, ctx: &RenderContext, width: u32, height: u32);

    /// Render one frame `dt` seconds after the previous one.
    fn frame(&mut self, ctx: &RenderContext, dt: f32) -> Result<(), SurfaceError>;

    /// The event loop is shutting down.
    fn exiting(&mut self) {}
}

/// Returns [`WindowAttributes`] based on the given configuration.
pub fn window_attributes_from_config(config: &Config) -> WindowAttributes {
    WindowAttributes::default()
        .with_title(config.window.title.clone())
        .with_inner_size(winit::dpi::LogicalSize::new(
            config.window.width as f64,
            config.window.height as f64,
        ))
}

/// Window, GPU context and the handler they feed.
pub struct AppState<H> {
    pub window: Option<Arc<Window>>,
    pub gpu: Option<RenderContext>,
    pub config: Config,
    pub clock: FrameClock,
    handler: H,
}

impl<H: FrameHandler> AppState<H> {
    pub fn new(config: Config, handler: H) -> Self {
        Self {
            window: None,
            gpu: None,
            config,
            clock: FrameClock::new(),
            handler,
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            // Minimized; keep the old targets until the window comes back.
            return;
        }
        if let Some(gpu) = &mut self.gpu {
            gpu.resize(width, height);
            self.handler.resized(gpu, width, height);
            info!("Window resized to {width}x{height}");
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let dt = self.clock.tick();
        let Some(gpu) = &self.gpu else {
            return;
        };
        match self.handler.frame(gpu, dt) {
            Ok(()) => {}
            Err(SurfaceError::OutOfMemory) => {
                error!("GPU out of memory, shutting down");
                event_loop.exit();
                return;
            }
            Err(SurfaceError::Lost) => {
                let (width, height) = gpu.size();
                warn!("Surface lost, reconfiguring at {width}x{height}");
                self.resize(width, height);
            }
            Err(SurfaceError::Timeout) => warn!("Surface acquire timed out, skipping frame"),
        }
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

impl<H: FrameHandler> ApplicationHandler for AppState<H> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attrs = window_attributes_from_config(&self.config);
        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                error!("Window creation failed: {e}");
                event_loop.exit();
                return;
            }
        };

        let ctx = match init_render_context_blocking(window.clone(), self.config.window.vsync) {
            Ok(ctx) => ctx,
            Err(e) => {
                error!("GPU initialization failed: {e}");
                event_loop.exit();
                return;
            }
        };
        if let Err(e) = self.handler.init(&ctx) {
            error!("Renderer initialization failed: {e}");
            event_loop.exit();
            return;
        }

        let (width, height) = ctx.size();
        info!("Rendering at {width}x{height} ({:?})", ctx.surface_format);
        self.gpu = Some(ctx);
        self.clock.reset();
        window.request_redraw();
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => self.resize(new_size.width, new_size.height),
            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(window) = &self.window {
                    let size = window.inner_size();
                    self.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        info!("Rendered {} frames", self.clock.frame_count());
        self.handler.exiting();
    }
}

/// Open a window for `config` and drive `handler` until it closes.
pub fn run<H: FrameHandler>(config: Config, handler: H) -> Result<(), EventLoopError> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);
    let mut app = AppState::new(config, handler);
    event_loop.run_app(&mut app)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingHandler {
        frames: u32,
    }

    impl FrameHandler for CountingHandler {
        fn init(&mut self, _ctx: &RenderContext) -> Result<(), ResourceError> {
            Ok(())
        }

        fn resized(&mut self, _ctx: &RenderContext, _width: u32, _height: u32) {}

        fn frame(&mut self, _ctx: &RenderContext, _dt: f32) -> Result<(), SurfaceError> {
            self.frames += 1;
            Ok(())
        }
    }

    #[test]
    fn test_app_state_starts_without_window() {
        let state = AppState::new(Config::default(), CountingHandler::default());
        assert!(state.window.is_none());
        assert!(state.gpu.is_none());
        assert_eq!(state.handler().frames, 0);
    }

    #[test]
    fn test_resize_without_gpu_is_ignored() {
        let mut state = AppState::new(Config::default(), CountingHandler::default());
        state.resize(800, 600);
        state.resize(0, 0);
        assert!(state.gpu.is_none());
    }

    #[test]
    fn test_window_attributes_use_config() {
        let mut config = Config::default();
        config.window.title = "Shadows".to_string();
        let attrs = window_attributes_from_config(&config);
        assert_eq!(attrs.title, "Shadows");
        assert!(attrs.inner_size.is_some());
    }
}
