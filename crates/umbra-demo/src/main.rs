//! Demo binary that renders a small shadowed, reflective scene with the
//! deferred renderer.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p umbra-demo -- --ssao false --shadow-resolution 2048`.

mod demo_scene;

use std::path::PathBuf;

use clap::Parser;
use glam::Vec3;
use tracing::{debug, error, info, warn};
use umbra_app::FrameHandler;
use umbra_config::{CliArgs, Config, default_config_dir};
use umbra_lighting::CascadeSplits;
use umbra_render::{
    Camera, DeferredRenderer, RenderContext, RendererSettings, ResourceError, Scene, SsaoSettings,
    SurfaceError,
};

use crate::demo_scene::{
    CAMERA_START, CAMERA_TARGET, ORBITER, add_lights, build_scene, camera_eye, default_lights,
    orbiter_position,
};

/// Renderer settings described by `config`.
fn renderer_settings(config: &Config) -> RendererSettings {
    let render = &config.render;
    RendererSettings {
        ssao: SsaoSettings {
            enabled: render.ssao,
            kernel_size: render.ssao_kernel_size as usize,
            radius: render.ssao_radius,
            bias: render.ssao_bias,
        },
        ambient: Vec3::splat(render.ambient),
        cascade_splits: CascadeSplits::new(render.cascade_splits.clone()),
    }
}

fn viewer_camera(config: &Config) -> Camera {
    Camera {
        fov_y: config.camera.fov_y_degrees.to_radians(),
        near: config.camera.near,
        far: config.camera.far,
        ..Camera::look_at(CAMERA_START, CAMERA_TARGET)
    }
}

struct DemoApp {
    config: Config,
    camera: Camera,
    time: f32,
    renderer: Option<DeferredRenderer>,
    scene: Scene,
    orbiter: Option<usize>,
}

impl DemoApp {
    fn new(config: Config) -> Self {
        Self {
            camera: viewer_camera(&config),
            config,
            time: 0.0,
            renderer: None,
            scene: Scene::new(),
            orbiter: None,
        }
    }

    fn animate(&mut self, dt: f32) {
        self.time += dt;
        self.camera.eye = camera_eye(self.time);
        if let Some(entity) = self.orbiter.and_then(|i| self.scene.entity_mut(i)) {
            entity.set_position(orbiter_position(self.time));
        }
    }
}

impl FrameHandler for DemoApp {
    fn init(&mut self, ctx: &RenderContext) -> Result<(), ResourceError> {
        let (width, height) = ctx.size();
        let mut renderer = DeferredRenderer::new(
            &ctx.device,
            &ctx.queue,
            ctx.surface_format,
            (width, height),
            renderer_settings(&self.config),
        )?;
        self.scene = build_scene(&ctx.device, &ctx.queue, &renderer, &self.config.render)?;
        self.orbiter = self.scene.entities.iter().position(|e| e.name == ORBITER);

        let lights = default_lights(self.config.render.shadow_resolution);
        let requested = lights.len();
        let added = add_lights(&ctx.device, &ctx.queue, &mut renderer, lights);
        info!("Added {added}/{requested} demo lights");

        self.camera.set_aspect_ratio(width as f32, height as f32);
        self.renderer = Some(renderer);
        Ok(())
    }

    fn resized(&mut self, ctx: &RenderContext, width: u32, height: u32) {
        self.camera.set_aspect_ratio(width as f32, height as f32);
        if let Some(renderer) = &mut self.renderer
            && let Err(e) = renderer.resize(&ctx.device, width, height)
        {
            warn!("Keeping previous render targets: {e}");
        }
    }

    fn frame(&mut self, ctx: &RenderContext, dt: f32) -> Result<(), SurfaceError> {
        self.animate(dt);
        let Some(renderer) = &mut self.renderer else {
            return Ok(());
        };
        let stats = renderer.render_frame(ctx, &mut self.scene, &self.camera, dt)?;
        debug!(
            reflections = stats.reflections,
            point_shadows = stats.point_shadows,
            cascade_shadows = stats.cascade_shadows,
            "frame"
        );
        Ok(())
    }

    fn exiting(&mut self) {
        if let Some(renderer) = self.renderer.take() {
            renderer.release();
        }
    }
}

fn main() {
    let args = CliArgs::parse();

    let config_dir = args
        .config
        .clone()
        .or_else(default_config_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    umbra_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {e}");
        std::process::exit(2);
    }

    info!(
        "Starting Umbra demo {}x{}",
        config.window.width, config.window.height
    );
    let app = DemoApp::new(config.clone());
    if let Err(e) = umbra_app::run(config, app) {
        error!("Event loop failed: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_follow_config() {
        let mut config = Config::default();
        config.render.ssao = false;
        config.render.ssao_kernel_size = 16;
        config.render.cascade_splits = vec![50.0, 10.0];
        let settings = renderer_settings(&config);
        assert!(!settings.ssao.enabled);
        assert_eq!(settings.ssao.kernel_size, 16);
        assert_eq!(settings.ambient, Vec3::splat(config.render.ambient));
        assert_eq!(settings.cascade_splits.splits(), &[10.0, 50.0]);
    }

    #[test]
    fn test_camera_uses_config_projection() {
        let mut config = Config::default();
        config.camera.fov_y_degrees = 90.0;
        config.camera.far = 300.0;
        let camera = viewer_camera(&config);
        assert!((camera.fov_y - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
        assert_eq!(camera.far, 300.0);
        assert_eq!(camera.eye, CAMERA_START);
        assert_eq!(camera.target, CAMERA_TARGET);
    }

    #[test]
    fn test_animate_moves_camera() {
        let mut app = DemoApp::new(Config::default());
        app.animate(2.0);
        assert_eq!(app.time, 2.0);
        assert_ne!(app.camera.eye, CAMERA_START);
    }
}
