//! Geometry buffer targets and the pipelines that fill them.
//!
//! The G-buffer pass writes albedo and view-space normals, reverse-Z depth,
//! and a stencil bit for surfaces that ignore shadows. Later passes read the
//! targets by pixel; none of them filter.

use crate::bind_cache::{BindCache, PipelineId};
use crate::buffer::Vertex;
use crate::error::ResourceError;
use crate::layouts::SceneLayouts;
use crate::pass::RenderPassBuilder;
use crate::scene::{SceneView, draw_entity};
use crate::shader::ShaderLibrary;
use crate::texture::check_extent;

pub const ALBEDO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const NORMAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;
/// Accumulated light, before ambient and occlusion.
pub const LIGHT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Stencil value of pixels whose surface does not receive shadows.
pub const STENCIL_NO_SHADOW: u32 = 1;
/// Depth of pixels no geometry covered. Depth is reverse-Z.
pub const CLEAR_DEPTH: f32 = 0.0;

const ENVIRONMENT_GROUP: u32 = 3;

pub const GBUFFER_SHADER_SOURCE: &str = r#"
struct Frame {
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    inv_proj: mat4x4<f32>,
    inv_view: mat4x4<f32>,
    camera_pos: vec4<f32>,
    screen: vec4<f32>,
    depth_range: vec4<f32>,
};

struct Object {
    model: mat4x4<f32>,
    normal: mat4x4<f32>,
    tint: vec4<f32>,
};

@group(0) @binding(0) var<uniform> frame: Frame;
@group(1) @binding(0) var<uniform> object: Object;
@group(2) @binding(0) var albedo_tex: texture_2d<f32>;
@group(2) @binding(1) var albedo_sampler: sampler;
@group(3) @binding(0) var environment_tex: texture_cube<f32>;
@group(3) @binding(1) var environment_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) world: vec3<f32>,
    @location(1) world_normal: vec3<f32>,
    @location(2) view_normal: vec3<f32>,
    @location(3) uv: vec2<f32>,
};

struct GBufferOutput {
    @location(0) albedo: vec4<f32>,
    @location(1) normal: vec4<f32>,
};

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world = object.model * vec4<f32>(in.position, 1.0);
    let world_normal = normalize((object.normal * vec4<f32>(in.normal, 0.0)).xyz);
    out.clip = frame.proj * frame.view * world;
    out.world = world.xyz;
    out.world_normal = world_normal;
    out.view_normal = (frame.view * vec4<f32>(world_normal, 0.0)).xyz;
    out.uv = in.uv;
    return out;
}

fn base_color(in: VertexOutput) -> vec3<f32> {
    return textureSample(albedo_tex, albedo_sampler, in.uv).rgb * object.tint.rgb;
}

@fragment
fn fs_opaque(in: VertexOutput) -> GBufferOutput {
    var out: GBufferOutput;
    out.albedo = vec4<f32>(base_color(in), 1.0);
    out.normal = vec4<f32>(normalize(in.view_normal), 1.0);
    return out;
}

@fragment
fn fs_reflective(in: VertexOutput) -> GBufferOutput {
    let incident = normalize(in.world - frame.camera_pos.xyz);
    let direction = reflect(incident, normalize(in.world_normal));
    let reflected = textureSample(environment_tex, environment_sampler, direction).rgb;

    var out: GBufferOutput;
    out.albedo = vec4<f32>(mix(base_color(in), reflected, 0.8), 1.0);
    out.normal = vec4<f32>(normalize(in.view_normal), 1.0);
    return out;
}
"#;

/// Screen-sized targets of one frame.
pub struct GBuffer {
    width: u32,
    height: u32,
    albedo: wgpu::Texture,
    pub albedo_view: wgpu::TextureView,
    normal: wgpu::Texture,
    pub normal_view: wgpu::TextureView,
    depth: wgpu::Texture,
    /// Depth-stencil attachment view.
    pub depth_view: wgpu::TextureView,
    /// Depth aspect only, for sampling.
    pub depth_sample_view: wgpu::TextureView,
}

impl GBuffer {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Result<Self, ResourceError> {
        check_extent(&device.limits(), "gbuffer", glam::UVec2::new(width, height), 1)?;

        let (albedo, albedo_view) = create_target(device, "gbuffer-albedo", ALBEDO_FORMAT, width, height);
        let (normal, normal_view) = create_target(device, "gbuffer-normal", NORMAL_FORMAT, width, height);
        let (depth, depth_view) = create_target(device, "gbuffer-depth", DEPTH_FORMAT, width, height);
        let depth_sample_view = depth.create_view(&wgpu::TextureViewDescriptor {
            label: Some("gbuffer-depth-sample"),
            aspect: wgpu::TextureAspect::DepthOnly,
            ..Default::default()
        });

        Ok(Self {
            width,
            height,
            albedo,
            albedo_view,
            normal,
            normal_view,
            depth,
            depth_view,
            depth_sample_view,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Recreate every target at the new size. The old targets survive an error.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) -> Result<(), ResourceError> {
        let resized = Self::new(device, width, height)?;
        std::mem::replace(self, resized).release();
        Ok(())
    }

    /// Group 0 of the light pass: camera plus the three G-buffer planes.
    pub fn read_bind_group(
        &self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        frame: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("gbuffer-read-bind-group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: frame.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&self.albedo_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&self.normal_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&self.depth_sample_view),
                },
            ],
        })
    }

    pub fn release(self) {
        self.albedo.destroy();
        self.normal.destroy();
        self.depth.destroy();
    }
}

pub(crate) fn create_target(
    device: &wgpu::Device,
    label: &'static str,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

/// Opaque and reflective G-buffer pipelines.
pub struct GeometryPipelines {
    pub opaque: wgpu::RenderPipeline,
    pub reflective: wgpu::RenderPipeline,
}

impl GeometryPipelines {
    pub fn new(
        device: &wgpu::Device,
        shaders: &mut ShaderLibrary,
        layouts: &SceneLayouts,
    ) -> Result<Self, ResourceError> {
        let shader = shaders.get_or_load(device, "gbuffer", GBUFFER_SHADER_SOURCE)?;

        let opaque_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("gbuffer-opaque-layout"),
            bind_group_layouts: &[&layouts.frame, &layouts.object, &layouts.material],
            immediate_size: 0,
        });
        let reflective_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("gbuffer-reflective-layout"),
            bind_group_layouts: &[
                &layouts.frame,
                &layouts.object,
                &layouts.material,
                &layouts.environment,
            ],
            immediate_size: 0,
        });

        let stencil_face = wgpu::StencilFaceState {
            compare: wgpu::CompareFunction::Always,
            fail_op: wgpu::StencilOperation::Keep,
            depth_fail_op: wgpu::StencilOperation::Keep,
            pass_op: wgpu::StencilOperation::Replace,
        };
        let targets = [
            Some(wgpu::ColorTargetState {
                format: ALBEDO_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            }),
            Some(wgpu::ColorTargetState {
                format: NORMAL_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            }),
        ];

        let create = |label: &'static str, layout: &wgpu::PipelineLayout, entry_point: &'static str| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[Vertex::layout()],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: Some(wgpu::Face::Back),
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::GreaterEqual,
                    stencil: wgpu::StencilState {
                        front: stencil_face,
                        back: stencil_face,
                        read_mask: 0xff,
                        write_mask: 0xff,
                    },
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(entry_point),
                    targets: &targets,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview_mask: None,
                cache: None,
            })
        };

        Ok(Self {
            opaque: create("gbuffer-opaque-pipeline", &opaque_layout, "fs_opaque"),
            reflective: create("gbuffer-reflective-pipeline", &reflective_layout, "fs_reflective"),
        })
    }
}

/// Fill `gbuffer` with every entity of `view`.
///
/// Plain entities are drawn first, then entities that sample their own
/// environment capture.
pub fn render_geometry(
    encoder: &mut wgpu::CommandEncoder,
    gbuffer: &GBuffer,
    pipelines: &GeometryPipelines,
    frame_bind_group: &wgpu::BindGroup,
    view: SceneView<'_>,
) {
    let mut pass = RenderPassBuilder::new("gbuffer")
        .clear_color(&gbuffer.albedo_view, wgpu::Color::TRANSPARENT)
        .clear_color(&gbuffer.normal_view, wgpu::Color::TRANSPARENT)
        .clear_depth_stencil(&gbuffer.depth_view, CLEAR_DEPTH, 0)
        .begin(encoder);
    pass.set_bind_group(0, frame_bind_group, &[]);

    let mut cache = BindCache::new();
    for (index, entity) in view.entities.iter().enumerate() {
        if entity.generates_reflection() {
            continue;
        }
        cache.bind_pipeline(&mut pass, PipelineId::GBufferOpaque, &pipelines.opaque);
        pass.set_stencil_reference(stencil_reference(entity.receive_shadow));
        draw_entity(&mut pass, view, index, &mut cache, true);
    }
    for (index, entity) in view.entities.iter().enumerate() {
        let Some(environment) = entity.environment() else {
            continue;
        };
        cache.bind_pipeline(&mut pass, PipelineId::GBufferReflective, &pipelines.reflective);
        pass.set_bind_group(ENVIRONMENT_GROUP, environment.bind_group(), &[]);
        pass.set_stencil_reference(stencil_reference(entity.receive_shadow));
        draw_entity(&mut pass, view, index, &mut cache, true);
    }
}

fn stencil_reference(receive_shadow: bool) -> u32 {
    if receive_shadow { 0 } else { STENCIL_NO_SHADOW }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::validate_wgsl;
    use crate::test_util::create_test_device_queue;

    #[test]
    fn test_gbuffer_shader_validates() {
        let module = validate_wgsl("gbuffer", GBUFFER_SHADER_SOURCE).unwrap();
        let entries: Vec<_> = module.entry_points.iter().map(|e| e.name.as_str()).collect();
        assert!(entries.contains(&"fs_opaque"));
        assert!(entries.contains(&"fs_reflective"));
    }

    #[test]
    fn test_stencil_marks_unshadowed_surfaces() {
        assert_eq!(stencil_reference(true), 0);
        assert_eq!(stencil_reference(false), STENCIL_NO_SHADOW);
    }

    #[test]
    fn test_gbuffer_zero_size_rejected() {
        let Some((device, _queue)) = create_test_device_queue() else {
            return;
        };
        assert!(matches!(
            GBuffer::new(&device, 0, 720),
            Err(ResourceError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_geometry_pipelines_build() {
        let Some((device, _queue)) = create_test_device_queue() else {
            return;
        };
        let layouts = SceneLayouts::new(&device);
        let mut shaders = ShaderLibrary::new();
        assert!(GeometryPipelines::new(&device, &mut shaders, &layouts).is_ok());
        let mut gbuffer = GBuffer::new(&device, 64, 32).unwrap();
        assert_eq!(gbuffer.size(), (64, 32));
        assert!(gbuffer.resize(&device, 0, 32).is_err());
        assert_eq!(gbuffer.size(), (64, 32));
        gbuffer.resize(&device, 128, 96).unwrap();
        assert_eq!(gbuffer.size(), (128, 96));
        gbuffer.release();
    }
}
