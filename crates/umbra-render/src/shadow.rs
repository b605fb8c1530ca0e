//! Shadow map targets and the depth pipelines that fill them.
//!
//! Each shadow-casting light owns exactly one map. Faces (cube sides or
//! cascade slices) are redrawn only when the light's refresh schedule marks
//! them dirty; each dirty face gets its own pass that clears it to 1.0 and
//! draws every shadow caster. Untouched faces keep last frame's depth.

use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, UVec2, Vec3};
use umbra_lighting::{
    CUBE_FACE_COUNT, FaceMask, LightGpu, LightInfo, LightSource, cube_face_transforms,
};

use crate::bind_cache::{BindCache, PipelineId};
use crate::buffer::{UniformSlots, Vertex};
use crate::error::ResourceError;
use crate::layouts::{FaceUniform, SceneLayouts};
use crate::pass::RenderPassBuilder;
use crate::scene::{SceneView, draw_entities};
use crate::shader::ShaderLibrary;
use crate::texture::{LayeredTarget, SHADOW_DEPTH_FORMAT};

/// Near plane of the point light cube projections.
pub const POINT_SHADOW_NEAR: f32 = 0.01;
/// Depth bias of point lookups, in units of the light radius.
pub const POINT_SHADOW_BIAS: f32 = 0.01;
/// Depth bias of cascade lookups, in normalized depth.
pub const CASCADE_SHADOW_BIAS: f32 = 0.002;

pub const SHADOW_SHADER_SOURCE: &str = r#"
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

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) world: vec3<f32>,
};

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> VertexOutput {
    var out: VertexOutput;
    let world = object.model * vec4<f32>(position, 1.0);
    out.clip = face.view_proj * world;
    out.world = world.xyz;
    return out;
}

// Linear distance to the light, so lookups compare distances directly.
@fragment
fn fs_point(in: VertexOutput) -> @builtin(frag_depth) f32 {
    return clamp(distance(in.world, face.origin_far.xyz) / face.origin_far.w, 0.0, 1.0);
}
"#;

/// Light parameters of one shadowed light, `@group(2) @binding(0)` of the
/// shadowed lighting pipelines.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ShadowedLightUniform {
    pub light: LightGpu,
    /// Point: (far, bias, 0, 0). Cascade: (cascade count, bias, 0, 0).
    pub params: [f32; 4],
}

/// One cascade slice as seen at shading time.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CascadeGpu {
    pub view_proj: [[f32; 4]; 4],
    /// View distance covered by the slice: (near, far, 0, 0).
    pub range: [f32; 4],
}

static_assertions::assert_eq_size!(ShadowedLightUniform, [u8; 64]);
static_assertions::assert_eq_size!(CascadeGpu, [u8; 80]);

/// Far plane of a point shadow, kept above the near plane for dim lights.
pub fn point_shadow_far(radius: f32) -> f32 {
    radius.max(POINT_SHADOW_NEAR * 2.0)
}

/// Layouts of the per-light bind groups the shadowed lighting passes read.
pub struct ShadowLayouts {
    pub point: wgpu::BindGroupLayout,
    pub cascade: wgpu::BindGroupLayout,
}

impl ShadowLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let light_entry = wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: NonZeroU64::new(std::mem::size_of::<ShadowedLightUniform>() as u64),
            },
            count: None,
        };
        let depth_entry = |view_dimension| wgpu::BindGroupLayoutEntry {
            binding: 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Depth,
                view_dimension,
                multisampled: false,
            },
            count: None,
        };
        let sampler_entry = wgpu::BindGroupLayoutEntry {
            binding: 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
            count: None,
        };

        let point = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("point-shadow-bgl"),
            entries: &[
                light_entry,
                depth_entry(wgpu::TextureViewDimension::Cube),
                sampler_entry,
            ],
        });
        let cascade = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("cascade-shadow-bgl"),
            entries: &[
                light_entry,
                depth_entry(wgpu::TextureViewDimension::D2Array),
                sampler_entry,
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(std::mem::size_of::<CascadeGpu>() as u64),
                    },
                    count: None,
                },
            ],
        });

        Self { point, cascade }
    }
}

/// Depth pipelines for point cubes and cascade arrays.
pub struct ShadowPipelines {
    pub point: wgpu::RenderPipeline,
    pub cascade: wgpu::RenderPipeline,
}

impl ShadowPipelines {
    pub fn new(
        device: &wgpu::Device,
        shaders: &mut ShaderLibrary,
        layouts: &SceneLayouts,
    ) -> Result<Self, ResourceError> {
        let shader = shaders.get_or_load(device, "shadow", SHADOW_SHADER_SOURCE)?;

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("shadow-pipeline-layout"),
            bind_group_layouts: &[&layouts.face, &layouts.object],
            immediate_size: 0,
        });

        let create = |label: &'static str, fragment: Option<wgpu::FragmentState<'_>>, bias| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
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
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: SHADOW_DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias,
                }),
                multisample: wgpu::MultisampleState::default(),
                fragment,
                multiview_mask: None,
                cache: None,
            })
        };

        let point = create(
            "point-shadow-pipeline",
            Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_point"),
                targets: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            wgpu::DepthBiasState::default(),
        );
        let cascade = create(
            "cascade-shadow-pipeline",
            None,
            wgpu::DepthBiasState {
                constant: 2,
                slope_scale: 2.0,
                clamp: 0.0,
            },
        );

        Ok(Self { point, cascade })
    }
}

/// Redraw the `mask` faces of `target`, one clearing pass per face.
#[allow(clippy::too_many_arguments)]
fn render_layers(
    encoder: &mut wgpu::CommandEncoder,
    label: &'static str,
    target: &LayeredTarget,
    faces: &UniformSlots,
    pipeline_id: PipelineId,
    pipeline: &wgpu::RenderPipeline,
    mask: FaceMask,
    view: SceneView<'_>,
) {
    for face in mask.iter() {
        let Some(layer) = target.layer_views.get(face) else {
            continue;
        };
        let mut pass = RenderPassBuilder::new(label)
            .clear_depth(layer, 1.0)
            .begin(encoder);
        let mut cache = BindCache::new();
        cache.bind_pipeline(&mut pass, pipeline_id, pipeline);
        pass.set_bind_group(0, faces.bind_group(), &[UniformSlots::offset(face)]);
        draw_entities(&mut pass, view, &mut cache, false, |entity| entity.cast_shadow);
    }
}

/// Clear every layer of `target` to 1.0.
fn clear_layers(encoder: &mut wgpu::CommandEncoder, label: &'static str, target: &LayeredTarget) {
    for layer in &target.layer_views {
        drop(RenderPassBuilder::new(label).clear_depth(layer, 1.0).begin(encoder));
    }
}

/// Omnidirectional shadow of one point light.
pub struct PointShadowMap {
    target: LayeredTarget,
    faces: UniformSlots,
    uniform: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    position: Vec3,
    far: f32,
    needs_clear: bool,
}

impl PointShadowMap {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        scene_layouts: &SceneLayouts,
        shadow_layouts: &ShadowLayouts,
        sampler: &wgpu::Sampler,
        info: &LightInfo,
    ) -> Result<Self, ResourceError> {
        let LightSource::Point { position } = info.source else {
            return Err(ResourceError::UnsupportedSource {
                label: "point-shadow",
                kind: info.source.kind(),
            });
        };
        let target = LayeredTarget::new(
            device,
            "point-shadow",
            SHADOW_DEPTH_FORMAT,
            info.shadow_map_size(),
            CUBE_FACE_COUNT as u32,
            wgpu::TextureViewDimension::Cube,
        )?;

        let far = point_shadow_far(info.point_radius());
        let uniform = create_light_uniform(
            device,
            queue,
            "point-shadow-light",
            ShadowedLightUniform {
                light: LightGpu::from(info),
                params: [far, POINT_SHADOW_BIAS, 0.0, 0.0],
            },
        );
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("point-shadow-bind-group"),
            layout: &shadow_layouts.point,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&target.sample_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });

        let mut faces = UniformSlots::new(
            device,
            &scene_layouts.face,
            "point-shadow-faces",
            FaceUniform::SIZE,
            CUBE_FACE_COUNT,
        );
        let uniforms = cube_face_transforms(position, POINT_SHADOW_NEAR, far)
            .map(|view_proj| FaceUniform::new(view_proj, position, far));
        faces.write(device, queue, &scene_layouts.face, &uniforms);

        log::debug!(
            "Created point shadow at {position} ({}px, far {far:.2})",
            target.size.x
        );
        Ok(Self {
            target,
            faces,
            uniform,
            bind_group,
            position,
            far,
            needs_clear: true,
        })
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn far(&self) -> f32 {
        self.far
    }

    pub fn size(&self) -> UVec2 {
        self.target.size
    }

    /// `@group(2)` of the shadowed point lighting pipeline.
    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    /// The six-layer depth texture, one layer per cube face.
    pub fn texture(&self) -> &wgpu::Texture {
        &self.target.texture
    }

    /// Clear all faces once after creation so unrendered faces read as lit.
    pub fn clear_if_new(&mut self, encoder: &mut wgpu::CommandEncoder) {
        if std::mem::take(&mut self.needs_clear) {
            clear_layers(encoder, "point-shadow-init", &self.target);
        }
    }

    pub fn render_faces(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipelines: &ShadowPipelines,
        mask: FaceMask,
        view: SceneView<'_>,
    ) {
        render_layers(
            encoder,
            "point-shadow",
            &self.target,
            &self.faces,
            PipelineId::PointShadow,
            &pipelines.point,
            mask,
            view,
        );
    }

    pub fn release(self) {
        self.target.release();
        self.uniform.destroy();
    }
}

/// Cascaded shadow of one directional light.
pub struct CascadeShadowMap {
    target: LayeredTarget,
    faces: UniformSlots,
    uniform: wgpu::Buffer,
    cascades: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    needs_clear: bool,
}

impl CascadeShadowMap {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        scene_layouts: &SceneLayouts,
        shadow_layouts: &ShadowLayouts,
        sampler: &wgpu::Sampler,
        info: &LightInfo,
        cascade_count: usize,
    ) -> Result<Self, ResourceError> {
        let target = LayeredTarget::new(
            device,
            "cascade-shadow",
            SHADOW_DEPTH_FORMAT,
            info.shadow_map_size(),
            cascade_count as u32,
            wgpu::TextureViewDimension::D2Array,
        )?;

        let uniform = create_light_uniform(
            device,
            queue,
            "cascade-shadow-light",
            ShadowedLightUniform {
                light: LightGpu::from(info),
                params: [cascade_count as f32, CASCADE_SHADOW_BIAS, 0.0, 0.0],
            },
        );
        let cascades = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("cascade-shadow-slices"),
            size: (std::mem::size_of::<CascadeGpu>() * cascade_count) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("cascade-shadow-bind-group"),
            layout: &shadow_layouts.cascade,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&target.sample_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: cascades.as_entire_binding(),
                },
            ],
        });
        let faces = UniformSlots::new(
            device,
            &scene_layouts.face,
            "cascade-shadow-faces",
            FaceUniform::SIZE,
            cascade_count,
        );

        log::debug!(
            "Created cascade shadow {}x{} with {cascade_count} slices",
            target.size.x,
            target.size.y
        );
        Ok(Self {
            target,
            faces,
            uniform,
            cascades,
            bind_group,
            needs_clear: true,
        })
    }

    pub fn cascade_count(&self) -> usize {
        self.target.layer_views.len()
    }

    pub fn size(&self) -> UVec2 {
        self.target.size
    }

    /// `@group(2)` of the shadowed directional lighting pipeline.
    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub fn clear_if_new(&mut self, encoder: &mut wgpu::CommandEncoder) {
        if std::mem::take(&mut self.needs_clear) {
            clear_layers(encoder, "cascade-shadow-init", &self.target);
        }
    }

    /// Upload the slice transforms used for rendering and shading.
    ///
    /// `transforms` is the light's snapshot, so slices that were not redrawn
    /// keep the transform their depth was rendered with.
    pub fn write_cascades(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        scene_layouts: &SceneLayouts,
        transforms: &[Mat4],
        ranges: &[(f32, f32)],
    ) {
        debug_assert_eq!(transforms.len(), self.cascade_count());
        let faces: Vec<FaceUniform> = transforms
            .iter()
            .map(|view_proj| FaceUniform::new(*view_proj, Vec3::ZERO, 1.0))
            .collect();
        self.faces.write(device, queue, &scene_layouts.face, &faces);

        let slices: Vec<CascadeGpu> = transforms
            .iter()
            .zip(ranges)
            .map(|(view_proj, (near, far))| CascadeGpu {
                view_proj: view_proj.to_cols_array_2d(),
                range: [*near, *far, 0.0, 0.0],
            })
            .collect();
        queue.write_buffer(&self.cascades, 0, bytemuck::cast_slice(&slices));
    }

    pub fn render_cascades(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipelines: &ShadowPipelines,
        mask: FaceMask,
        view: SceneView<'_>,
    ) {
        render_layers(
            encoder,
            "cascade-shadow",
            &self.target,
            &self.faces,
            PipelineId::CascadeShadow,
            &pipelines.cascade,
            mask,
            view,
        );
    }

    pub fn release(self) {
        self.target.release();
        self.uniform.destroy();
        self.cascades.destroy();
    }
}

fn create_light_uniform(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &'static str,
    data: ShadowedLightUniform,
) -> wgpu::Buffer {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: std::mem::size_of::<ShadowedLightUniform>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    queue.write_buffer(&buffer, 0, bytemuck::bytes_of(&data));
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::validate_wgsl;
    use crate::test_util::create_test_device_queue;
    use crate::texture::create_comparison_sampler;

    #[test]
    fn test_shadow_shader_validates() {
        validate_wgsl("shadow", SHADOW_SHADER_SOURCE).unwrap();
    }

    #[test]
    fn test_dim_light_far_above_near() {
        assert!(point_shadow_far(0.0) > POINT_SHADOW_NEAR);
        assert_eq!(point_shadow_far(12.0), 12.0);
    }

    #[test]
    fn test_point_map_is_square_cube() {
        let Some((device, queue)) = create_test_device_queue() else {
            return;
        };
        let scene_layouts = SceneLayouts::new(&device);
        let shadow_layouts = ShadowLayouts::new(&device);
        let sampler = create_comparison_sampler(&device);
        let info = LightInfo::point(Vec3::ONE, Vec3::new(0.0, 4.0, 0.0)).with_shadow_resolution(128, 64);
        let map = PointShadowMap::new(&device, &queue, &scene_layouts, &shadow_layouts, &sampler, &info)
            .unwrap();
        assert_eq!(map.size(), UVec2::splat(128));
        assert_eq!(map.far(), info.point_radius());
        map.release();
    }

    #[test]
    fn test_point_map_rejects_directional_source() {
        let Some((device, queue)) = create_test_device_queue() else {
            return;
        };
        let scene_layouts = SceneLayouts::new(&device);
        let shadow_layouts = ShadowLayouts::new(&device);
        let sampler = create_comparison_sampler(&device);
        let info = LightInfo::directional(Vec3::ONE, Vec3::NEG_Y);
        let result =
            PointShadowMap::new(&device, &queue, &scene_layouts, &shadow_layouts, &sampler, &info);
        assert!(matches!(result, Err(ResourceError::UnsupportedSource { .. })));
    }

    #[test]
    fn test_cascade_map_layers_follow_count() {
        let Some((device, queue)) = create_test_device_queue() else {
            return;
        };
        let scene_layouts = SceneLayouts::new(&device);
        let shadow_layouts = ShadowLayouts::new(&device);
        let sampler = create_comparison_sampler(&device);
        let info = LightInfo::directional(Vec3::ONE, Vec3::NEG_Y).with_shadow_resolution(256, 128);
        let map = CascadeShadowMap::new(
            &device,
            &queue,
            &scene_layouts,
            &shadow_layouts,
            &sampler,
            &info,
            3,
        )
        .unwrap();
        assert_eq!(map.cascade_count(), 3);
        assert_eq!(map.size(), UVec2::new(256, 128));
        map.release();
    }

    #[test]
    fn test_oversized_shadow_is_recoverable() {
        let Some((device, queue)) = create_test_device_queue() else {
            return;
        };
        let scene_layouts = SceneLayouts::new(&device);
        let shadow_layouts = ShadowLayouts::new(&device);
        let sampler = create_comparison_sampler(&device);
        let too_big = device.limits().max_texture_dimension_2d + 1;
        let info = LightInfo::point(Vec3::ONE, Vec3::ZERO).with_shadow_resolution(too_big, too_big);
        let result =
            PointShadowMap::new(&device, &queue, &scene_layouts, &shadow_layouts, &sampler, &info);
        assert!(matches!(result, Err(ResourceError::ExceedsDeviceLimit { .. })));
    }
}
