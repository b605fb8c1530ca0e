//! The deferred frame: reflections, shadows, G-buffer, lights, SSAO and
//! composite, recorded into one command encoder.

use glam::Vec3;
use umbra_lighting::{CascadeSplits, LightInfo, LightType};

use crate::camera::{Camera, FrameUniform};
use crate::composite::Composite;
use crate::environment::CapturePipeline;
use crate::error::{LightsError, ResourceError};
use crate::gbuffer::{GBuffer, GeometryPipelines, render_geometry};
use crate::gpu::{RenderContext, SurfaceError};
use crate::layouts::{SceneLayouts, uniform_bind_group};
use crate::lights::Lights;
use crate::pass::FrameEncoder;
use crate::scene::{ObjectUniforms, Scene, SceneView, update_reflections};
use crate::shader::ShaderLibrary;
use crate::ssao::{Ssao, SsaoSettings};

/// Renderer options that are fixed at construction or changed rarely.
#[derive(Clone, Debug, PartialEq)]
pub struct RendererSettings {
    pub ssao: SsaoSettings,
    /// Ambient term added to every lit pixel, scaled by albedo.
    pub ambient: Vec3,
    pub cascade_splits: CascadeSplits,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            ssao: SsaoSettings::default(),
            ambient: Vec3::splat(0.1),
            cascade_splits: CascadeSplits::default(),
        }
    }
}

/// Work done by one frame, for logging and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Environment captures that redrew at least one face.
    pub reflections: usize,
    pub point_shadows: usize,
    pub cascade_shadows: usize,
}

pub struct DeferredRenderer {
    shaders: ShaderLibrary,
    layouts: SceneLayouts,
    frame_uniform: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    objects: ObjectUniforms,
    gbuffer: GBuffer,
    geometry: GeometryPipelines,
    capture: CapturePipeline,
    lights: Lights,
    ssao: Ssao,
    composite: Composite,
    settings: RendererSettings,
}

impl DeferredRenderer {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        (width, height): (u32, u32),
        settings: RendererSettings,
    ) -> Result<Self, ResourceError> {
        let mut shaders = ShaderLibrary::new();
        let layouts = SceneLayouts::new(device);

        let frame_uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame-uniform"),
            size: FrameUniform::SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let frame_bind_group = uniform_bind_group(device, "frame", &layouts.frame, &frame_uniform);

        let geometry = GeometryPipelines::new(device, &mut shaders, &layouts)?;
        let capture = CapturePipeline::new(device, &mut shaders, &layouts)?;
        let lights = Lights::new(device, &mut shaders, &layouts, settings.cascade_splits.clone())?;
        let ssao = Ssao::new(device, queue, &mut shaders, settings.ssao)?;
        let composite = Composite::new(device, &mut shaders, surface_format)?;
        composite.set_params(queue, settings.ambient, settings.ssao.enabled);

        let gbuffer = GBuffer::new(device, width, height)?;
        let objects = ObjectUniforms::new(device, &layouts);

        let mut renderer = Self {
            shaders,
            layouts,
            frame_uniform,
            frame_bind_group,
            objects,
            gbuffer,
            geometry,
            capture,
            lights,
            ssao,
            composite,
            settings,
        };
        renderer.bind_screen_targets(device);
        log::info!(
            "Deferred renderer ready at {width}x{height} ({} shaders)",
            renderer.shaders.len()
        );
        Ok(renderer)
    }

    pub fn layouts(&self) -> &SceneLayouts {
        &self.layouts
    }

    pub fn lights(&self) -> &Lights {
        &self.lights
    }

    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn size(&self) -> (u32, u32) {
        self.gbuffer.size()
    }

    pub fn add_light(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        ty: LightType,
        info: LightInfo,
    ) -> Result<usize, LightsError> {
        self.lights.add_light(device, queue, &self.layouts, ty, info)
    }

    pub fn update_light(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        ty: LightType,
        index: usize,
        info: LightInfo,
    ) -> Result<(), LightsError> {
        self.lights.update_light(device, queue, &self.layouts, ty, index, info)
    }

    pub fn delete_light(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        ty: LightType,
        index: usize,
    ) -> Result<LightInfo, LightsError> {
        self.lights.delete_light(device, queue, ty, index)
    }

    pub fn change_shadowed(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        ty: LightType,
        index: usize,
    ) -> Result<(LightType, usize), LightsError> {
        self.lights.change_shadowed(device, queue, &self.layouts, ty, index)
    }

    pub fn set_ssao(&mut self, queue: &wgpu::Queue, settings: SsaoSettings) {
        self.ssao.set_settings(queue, settings);
        self.settings.ssao = self.ssao.settings();
        self.composite
            .set_params(queue, self.settings.ambient, self.settings.ssao.enabled);
    }

    pub fn set_ambient(&mut self, queue: &wgpu::Queue, ambient: Vec3) {
        self.settings.ambient = ambient;
        self.composite
            .set_params(queue, ambient, self.settings.ssao.enabled);
    }

    /// Recreate the screen-sized targets. The previous targets stay in use
    /// when the new size is invalid.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) -> Result<(), ResourceError> {
        if self.gbuffer.size() == (width, height) {
            return Ok(());
        }
        self.gbuffer.resize(device, width, height)?;
        self.bind_screen_targets(device);
        log::info!("Renderer resized to {width}x{height}");
        Ok(())
    }

    fn bind_screen_targets(&mut self, device: &wgpu::Device) {
        self.lights
            .create_frame_buffer(device, &self.gbuffer, &self.frame_uniform);
        self.ssao
            .create_target(device, &self.gbuffer, &self.frame_uniform);
        if let (Some(light), Some(ao)) = (self.lights.light_texture(), self.ssao.output_view()) {
            self.composite.bind(device, &self.gbuffer, light, ao);
        }
    }

    /// Record one frame into `encoder`, composited onto `target`.
    #[allow(clippy::too_many_arguments)]
    pub fn encode_frame(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        target: &wgpu::TextureView,
        scene: &mut Scene,
        camera: &Camera,
        dt: f32,
    ) -> FrameStats {
        let (width, height) = self.gbuffer.size();
        queue.write_buffer(
            &self.frame_uniform,
            0,
            bytemuck::bytes_of(&camera.to_uniform(width, height)),
        );
        self.objects
            .upload(device, queue, &self.layouts, &scene.entities);

        let reflections = update_reflections(
            encoder,
            device,
            queue,
            &self.layouts,
            &self.capture,
            scene,
            &self.objects,
            dt,
        );

        let view = SceneView::new(scene, &self.objects);
        let refresh =
            self.lights
                .update_shadow_maps(encoder, device, queue, &self.layouts, view, camera, dt);

        render_geometry(
            encoder,
            &self.gbuffer,
            &self.geometry,
            &self.frame_bind_group,
            view,
        );
        self.lights.render_lights(encoder, &self.gbuffer);
        self.ssao.render(encoder);
        self.composite.render(encoder, target);

        FrameStats {
            reflections,
            point_shadows: refresh.points.len(),
            cascade_shadows: refresh.cascades.len(),
        }
    }

    /// Render and present one frame to the window surface.
    pub fn render_frame(
        &mut self,
        ctx: &RenderContext,
        scene: &mut Scene,
        camera: &Camera,
        dt: f32,
    ) -> Result<FrameStats, SurfaceError> {
        let surface_texture = ctx.get_current_texture()?;
        let mut frame = FrameEncoder::new(&ctx.device, surface_texture);
        let (encoder, target) = frame.parts();
        let stats = self.encode_frame(encoder, &ctx.device, &ctx.queue, target, scene, camera, dt);
        frame.submit(&ctx.queue);
        Ok(stats)
    }

    /// Free every GPU resource the renderer owns.
    pub fn release(self) {
        self.lights.release();
        self.ssao.release();
        self.gbuffer.release();
        self.frame_uniform.destroy();
    }
}
