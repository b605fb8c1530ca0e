//! Dynamic cube map reflections.
//!
//! An [`EnvironmentMap`] renders the scene around its owner into a color cube
//! that the reflective G-buffer pipeline samples. Faces are refreshed round
//! robin by the same scheduler the point shadows use, so a full capture is
//! spread across several frames.

use glam::{Mat4, UVec2, Vec3};
use umbra_lighting::{CUBE_FACE_COUNT, FaceMask, RefreshSchedule, cube_face_transforms};

use crate::bind_cache::{BindCache, PipelineId};
use crate::buffer::{UniformSlots, Vertex};
use crate::error::ResourceError;
use crate::layouts::{FaceUniform, SceneLayouts};
use crate::pass::RenderPassBuilder;
use crate::scene::{SceneView, draw_entities};
use crate::shader::ShaderLibrary;
use crate::texture::{LayeredTarget, SHADOW_DEPTH_FORMAT, create_linear_sampler};

pub const DEFAULT_RESOLUTION: u32 = 480;
/// Full sweeps per second.
pub const DEFAULT_FREQUENCY: f32 = 10.0;
pub const CAPTURE_FAR: f32 = 1000.0;
pub const CAPTURE_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Faces are cleared to black before they are redrawn.
const CAPTURE_CLEAR: wgpu::Color = wgpu::Color::BLACK;

/// Near plane of a capture around an object of `radius`.
pub fn capture_near(radius: f32) -> f32 {
    radius.clamp(1e-3, 0.5)
}

pub const CAPTURE_SHADER_SOURCE: &str = r#"
struct Face {
    view_proj: mat4x4<f32>,
    origin_far: vec4<f32>,
};

struct Object {
    model: mat4x4<f32>,
    normal: mat4x4<f32>,
    tint: vec4<f32>,
};

@group(0) @binding(0) var<uniform> face: Face;
@group(1) @binding(0) var<uniform> object: Object;
@group(2) @binding(0) var albedo_tex: texture_2d<f32>;
@group(2) @binding(1) var albedo_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) normal: vec3<f32>,
    @location(1) uv: vec2<f32>,
};

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world = object.model * vec4<f32>(in.position, 1.0);
    out.clip = face.view_proj * world;
    out.normal = (object.normal * vec4<f32>(in.normal, 0.0)).xyz;
    out.uv = in.uv;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let albedo = textureSample(albedo_tex, albedo_sampler, in.uv).rgb * object.tint.rgb;
    // Hemisphere term so captured geometry is not flat.
    let sky = normalize(in.normal).y * 0.5 + 0.5;
    return vec4<f32>(albedo * mix(0.4, 1.0, sky), 1.0);
}
"#;

/// Pipeline drawing scene entities into capture cube faces.
pub struct CapturePipeline {
    pub pipeline: wgpu::RenderPipeline,
}

impl CapturePipeline {
    pub fn new(
        device: &wgpu::Device,
        shaders: &mut ShaderLibrary,
        layouts: &SceneLayouts,
    ) -> Result<Self, ResourceError> {
        let shader = shaders.get_or_load(device, "environment-capture", CAPTURE_SHADER_SOURCE)?;

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("capture-pipeline-layout"),
            bind_group_layouts: &[&layouts.face, &layouts.object, &layouts.material],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("capture-pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                // Cube faces flip Y, which flips winding.
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: SHADOW_DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: CAPTURE_COLOR_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview_mask: None,
            cache: None,
        });

        Ok(Self { pipeline })
    }
}

/// Color and depth cubes plus everything needed to refresh and sample them.
pub struct EnvironmentMap {
    color: LayeredTarget,
    depth: LayeredTarget,
    faces: UniformSlots,
    sampler: wgpu::Sampler,
    bind_group: wgpu::BindGroup,
    schedule: RefreshSchedule,
    transforms: [Mat4; CUBE_FACE_COUNT],
    center: Vec3,
    radius: f32,
    resolution: u32,
    frequency: f32,
}

impl EnvironmentMap {
    pub fn new(
        device: &wgpu::Device,
        layouts: &SceneLayouts,
        center: Vec3,
        radius: f32,
        resolution: u32,
    ) -> Result<Self, ResourceError> {
        let (color, depth) = create_targets(device, resolution)?;
        let sampler = create_linear_sampler(device, "environment-sampler");
        let bind_group = create_bind_group(device, layouts, &color, &sampler);
        let faces = UniformSlots::new(
            device,
            &layouts.face,
            "environment-faces",
            FaceUniform::SIZE,
            CUBE_FACE_COUNT,
        );

        Ok(Self {
            color,
            depth,
            faces,
            sampler,
            bind_group,
            schedule: RefreshSchedule::cube(),
            transforms: cube_face_transforms(center, capture_near(radius), CAPTURE_FAR),
            center,
            radius,
            resolution,
            frequency: DEFAULT_FREQUENCY,
        })
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn transforms(&self) -> &[Mat4; CUBE_FACE_COUNT] {
        &self.transforms
    }

    pub fn schedule(&self) -> &RefreshSchedule {
        &self.schedule
    }

    /// `@group(3)` of the reflective G-buffer pipeline.
    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    /// Recompute all six face transforms around a new center.
    pub fn update_position(&mut self, center: Vec3, radius: f32) {
        self.center = center;
        self.radius = radius;
        self.transforms = cube_face_transforms(center, capture_near(radius), CAPTURE_FAR);
    }

    /// Ignored unless `frequency` is finite and positive.
    pub fn set_frequency(&mut self, frequency: f32) {
        if frequency.is_finite() && frequency > 0.0 {
            self.frequency = frequency;
        } else {
            log::warn!("Ignoring environment refresh frequency {frequency}");
        }
    }

    /// Release the cubes and allocate new ones at `resolution`.
    ///
    /// On error the current targets are kept.
    pub fn resize(
        &mut self,
        device: &wgpu::Device,
        layouts: &SceneLayouts,
        resolution: u32,
    ) -> Result<(), ResourceError> {
        if resolution == self.resolution {
            return Ok(());
        }
        let (color, depth) = create_targets(device, resolution)?;
        let bind_group = create_bind_group(device, layouts, &color, &self.sampler);
        let old_color = std::mem::replace(&mut self.color, color);
        let old_depth = std::mem::replace(&mut self.depth, depth);
        old_color.release();
        old_depth.release();
        self.bind_group = bind_group;
        self.resolution = resolution;
        self.schedule.reset();
        log::debug!("Resized environment map to {resolution}");
        Ok(())
    }

    /// Advance the refresh schedule and redraw the dirty faces.
    ///
    /// Draws every entity of `view` flagged `reflected`. The caller is
    /// responsible for clearing the owner's flag.
    #[allow(clippy::too_many_arguments)]
    pub fn update_scene(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layouts: &SceneLayouts,
        pipeline: &CapturePipeline,
        dt: f32,
        view: SceneView<'_>,
    ) -> Option<FaceMask> {
        let mask = self.schedule.advance(self.frequency, dt)?;

        let uniforms = self
            .transforms
            .map(|view_proj| FaceUniform::new(view_proj, self.center, CAPTURE_FAR));
        self.faces.write(device, queue, &layouts.face, &uniforms);

        for face in mask.iter() {
            let mut pass = RenderPassBuilder::new("environment-capture")
                .clear_color(&self.color.layer_views[face], CAPTURE_CLEAR)
                .clear_depth(&self.depth.layer_views[face], 1.0)
                .begin(encoder);
            let mut cache = BindCache::new();
            cache.bind_pipeline(&mut pass, PipelineId::EnvironmentCapture, &pipeline.pipeline);
            pass.set_bind_group(0, self.faces.bind_group(), &[UniformSlots::offset(face)]);
            draw_entities(&mut pass, view, &mut cache, true, |entity| entity.reflected);
        }
        Some(mask)
    }

    pub fn release(self) {
        self.color.release();
        self.depth.release();
    }
}

fn create_targets(
    device: &wgpu::Device,
    resolution: u32,
) -> Result<(LayeredTarget, LayeredTarget), ResourceError> {
    let size = UVec2::splat(resolution);
    let color = LayeredTarget::new(
        device,
        "environment-color",
        CAPTURE_COLOR_FORMAT,
        size,
        CUBE_FACE_COUNT as u32,
        wgpu::TextureViewDimension::Cube,
    )?;
    let depth = LayeredTarget::new(
        device,
        "environment-depth",
        SHADOW_DEPTH_FORMAT,
        size,
        CUBE_FACE_COUNT as u32,
        wgpu::TextureViewDimension::Cube,
    )?;
    Ok((color, depth))
}

fn create_bind_group(
    device: &wgpu::Device,
    layouts: &SceneLayouts,
    color: &LayeredTarget,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("environment-bind-group"),
        layout: &layouts.environment,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&color.sample_view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::validate_wgsl;
    use crate::test_util::create_test_device_queue;

    #[test]
    fn test_capture_shader_validates() {
        validate_wgsl("environment-capture", CAPTURE_SHADER_SOURCE).unwrap();
    }

    #[test]
    fn test_capture_near_clamped() {
        assert_eq!(capture_near(2.0), 0.5);
        assert_eq!(capture_near(0.25), 0.25);
        assert!(capture_near(0.0) > 0.0);
    }

    #[test]
    fn test_defaults() {
        let Some((device, _queue)) = create_test_device_queue() else {
            return;
        };
        let layouts = SceneLayouts::new(&device);
        let map = EnvironmentMap::new(&device, &layouts, Vec3::ZERO, 1.0, DEFAULT_RESOLUTION).unwrap();
        assert_eq!(map.resolution(), 480);
        assert_eq!(map.frequency(), 10.0);
        map.release();
    }

    #[test]
    fn test_update_position_recomputes_transforms() {
        let Some((device, _queue)) = create_test_device_queue() else {
            return;
        };
        let layouts = SceneLayouts::new(&device);
        let mut map = EnvironmentMap::new(&device, &layouts, Vec3::ZERO, 1.0, 32).unwrap();
        let center = Vec3::new(3.0, 1.0, -2.0);
        map.update_position(center, 0.2);
        assert_eq!(*map.transforms(), cube_face_transforms(center, 0.2, CAPTURE_FAR));
    }

    #[test]
    fn test_invalid_frequency_ignored() {
        let Some((device, _queue)) = create_test_device_queue() else {
            return;
        };
        let layouts = SceneLayouts::new(&device);
        let mut map = EnvironmentMap::new(&device, &layouts, Vec3::ZERO, 1.0, 32).unwrap();
        map.set_frequency(-1.0);
        assert_eq!(map.frequency(), DEFAULT_FREQUENCY);
        map.set_frequency(2.5);
        assert_eq!(map.frequency(), 2.5);
    }

    #[test]
    fn test_resize_resets_schedule() {
        let Some((device, _queue)) = create_test_device_queue() else {
            return;
        };
        let layouts = SceneLayouts::new(&device);
        let mut map = EnvironmentMap::new(&device, &layouts, Vec3::ZERO, 1.0, 32).unwrap();
        map.schedule.advance_by(2.5);
        map.resize(&device, &layouts, 64).unwrap();
        assert_eq!(map.resolution(), 64);
        assert_eq!(map.schedule().phase(), 0.0);
        assert!(map.resize(&device, &layouts, 0).is_err());
        assert_eq!(map.resolution(), 64);
    }
}
