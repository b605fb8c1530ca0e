//! Pipelines of the additive light pass.
//!
//! Point lights are drawn as screen-space quads bounding their radius,
//! directional lights as full-screen triangles. Every pipeline reads the
//! G-buffer at group 0 and the unshadowed light storage at group 1; the
//! shadowed variants take one light and its shadow map at group 2.
//!
//! The stencil written by the G-buffer pass selects which pipelines touch a
//! pixel: shadowed lights only shade pixels that receive shadows, and pixels
//! that ignore shadows get the plain shaders instead.

use std::num::NonZeroU64;

use umbra_lighting::LightGpu;

use crate::camera::FrameUniform;
use crate::error::ResourceError;
use crate::gbuffer::{DEPTH_FORMAT, LIGHT_FORMAT, STENCIL_NO_SHADOW};
use crate::shader::ShaderLibrary;
use crate::shadow::ShadowLayouts;

/// Declarations and helpers shared by every light shader.
pub const LIGHT_COMMON_SOURCE: &str = r#"
struct Frame {
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    inv_proj: mat4x4<f32>,
    inv_view: mat4x4<f32>,
    camera_pos: vec4<f32>,
    screen: vec4<f32>,
    depth_range: vec4<f32>,
};

struct Light {
    color_intensity: vec4<f32>,
    position_or_direction: vec4<f32>,
    params: vec4<f32>,
};

@group(0) @binding(0) var<uniform> frame: Frame;
@group(0) @binding(1) var albedo_tex: texture_2d<f32>;
@group(0) @binding(2) var normal_tex: texture_2d<f32>;
@group(0) @binding(3) var depth_tex: texture_2d<f32>;

@group(1) @binding(0) var<storage, read> lights: array<Light>;

struct LightVertex {
    @builtin(position) clip: vec4<f32>,
    @location(0) @interpolate(flat) index: u32,
};

struct Surface {
    albedo: vec3<f32>,
    normal: vec3<f32>,
    view_pos: vec3<f32>,
    world_pos: vec3<f32>,
};

// Two triangles covering [-1, 1]^2.
fn quad_corner(i: u32) -> vec2<f32> {
    let x = select(-1.0, 1.0, i == 1u || i == 2u || i == 4u);
    let y = select(-1.0, 1.0, i == 2u || i == 4u || i == 5u);
    return vec2<f32>(x, y);
}

fn fullscreen_corner(i: u32) -> vec4<f32> {
    let uv = vec2<f32>(f32((i << 1u) & 2u), f32(i & 2u));
    return vec4<f32>(uv * 2.0 - 1.0, 0.5, 1.0);
}

// Screen-space square covering the light's sphere of influence. Lights the
// camera is inside of, or nearly so, cover the whole screen.
fn point_proxy(light: Light, i: u32) -> vec4<f32> {
    let corner = quad_corner(i);
    let center = (frame.view * vec4<f32>(light.position_or_direction.xyz, 1.0)).xyz;
    let radius = light.params.x;
    let d = -center.z;
    if (d - radius <= 2.0 * frame.depth_range.x) {
        return vec4<f32>(corner, 0.5, 1.0);
    }
    let half_size = radius * (length(center.xy) + d) / (d - radius);
    var clip = frame.proj * vec4<f32>(center.xy + corner * half_size, center.z, 1.0);
    clip.z = 0.5 * clip.w;
    return clip;
}

fn load_depth(frag: vec4<f32>) -> f32 {
    return textureLoad(depth_tex, vec2<i32>(frag.xy), 0).r;
}

fn load_surface(frag: vec4<f32>, depth: f32) -> Surface {
    let pixel = vec2<i32>(frag.xy);
    let uv = frag.xy * frame.screen.zw;
    let ndc = vec4<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, depth, 1.0);
    let view = frame.inv_proj * ndc;

    var s: Surface;
    s.view_pos = view.xyz / view.w;
    s.world_pos = (frame.inv_view * vec4<f32>(s.view_pos, 1.0)).xyz;
    s.albedo = textureLoad(albedo_tex, pixel, 0).rgb;
    s.normal = normalize(textureLoad(normal_tex, pixel, 0).xyz);
    return s;
}

// Lambert plus Blinn-Phong, `to_light` in view space.
fn shade(s: Surface, to_light: vec3<f32>, radiance: vec3<f32>) -> vec3<f32> {
    let n_dot_l = max(dot(s.normal, to_light), 0.0);
    let half_dir = normalize(to_light + normalize(-s.view_pos));
    let specular = pow(max(dot(s.normal, half_dir), 0.0), 32.0) * 0.25;
    return (s.albedo + vec3<f32>(specular)) * n_dot_l * radiance;
}

fn point_distance(light: Light, s: Surface) -> f32 {
    return distance(light.position_or_direction.xyz, s.world_pos);
}

fn point_light(light: Light, s: Surface) -> vec3<f32> {
    let center = (frame.view * vec4<f32>(light.position_or_direction.xyz, 1.0)).xyz;
    let offset = center - s.view_pos;
    let d = length(offset);
    let window = clamp(1.0 - d / light.params.x, 0.0, 1.0);
    let radiance = light.color_intensity.rgb * light.color_intensity.w / (1.0 + d * d) * window * window;
    return shade(s, offset / max(d, 1e-4), radiance);
}

fn directional_light(light: Light, s: Surface) -> vec3<f32> {
    let to_light = normalize((frame.view * vec4<f32>(-light.position_or_direction.xyz, 0.0)).xyz);
    return shade(s, to_light, light.color_intensity.rgb);
}
"#;

/// Instanced over the light storage.
pub const LIGHT_PLAIN_SOURCE: &str = r#"
@vertex
fn vs_point(@builtin(vertex_index) vertex: u32, @builtin(instance_index) instance: u32) -> LightVertex {
    var out: LightVertex;
    out.clip = point_proxy(lights[instance], vertex);
    out.index = instance;
    return out;
}

@vertex
fn vs_directional(@builtin(vertex_index) vertex: u32, @builtin(instance_index) instance: u32) -> LightVertex {
    var out: LightVertex;
    out.clip = fullscreen_corner(vertex);
    out.index = instance;
    return out;
}

@fragment
fn fs_point(in: LightVertex) -> @location(0) vec4<f32> {
    let depth = load_depth(in.clip);
    if (depth <= 0.0) {
        discard;
    }
    let light = lights[in.index];
    let s = load_surface(in.clip, depth);
    if (point_distance(light, s) > light.params.x) {
        discard;
    }
    return vec4<f32>(point_light(light, s), 1.0);
}

@fragment
fn fs_directional(in: LightVertex) -> @location(0) vec4<f32> {
    let depth = load_depth(in.clip);
    if (depth <= 0.0) {
        discard;
    }
    let s = load_surface(in.clip, depth);
    return vec4<f32>(directional_light(lights[in.index], s), 1.0);
}
"#;

pub const LIGHT_POINT_SHADOW_SOURCE: &str = r#"
struct ShadowedLight {
    light: Light,
    params: vec4<f32>,
};

@group(2) @binding(0) var<uniform> shadowed: ShadowedLight;
@group(2) @binding(1) var shadow_cube: texture_depth_cube;
@group(2) @binding(2) var shadow_sampler: sampler_comparison;

// Stored depth is distance / far, see the shadow shader.
fn point_shadow(world: vec3<f32>) -> f32 {
    let to_frag = world - shadowed.light.position_or_direction.xyz;
    let reference = length(to_frag) / shadowed.params.x - shadowed.params.y;
    return textureSampleCompareLevel(shadow_cube, shadow_sampler, to_frag, reference);
}

@vertex
fn vs_main(@builtin(vertex_index) vertex: u32) -> LightVertex {
    var out: LightVertex;
    out.clip = point_proxy(shadowed.light, vertex);
    out.index = 0u;
    return out;
}

@fragment
fn fs_main(in: LightVertex) -> @location(0) vec4<f32> {
    let depth = load_depth(in.clip);
    if (depth <= 0.0) {
        discard;
    }
    let light = shadowed.light;
    let s = load_surface(in.clip, depth);
    if (point_distance(light, s) > light.params.x) {
        discard;
    }
    return vec4<f32>(point_light(light, s) * point_shadow(s.world_pos), 1.0);
}
"#;

pub const LIGHT_CASCADE_SHADOW_SOURCE: &str = r#"
struct ShadowedLight {
    light: Light,
    params: vec4<f32>,
};

struct Cascade {
    view_proj: mat4x4<f32>,
    range: vec4<f32>,
};

@group(2) @binding(0) var<uniform> shadowed: ShadowedLight;
@group(2) @binding(1) var shadow_array: texture_depth_2d_array;
@group(2) @binding(2) var shadow_sampler: sampler_comparison;
@group(2) @binding(3) var<storage, read> cascades: array<Cascade>;

// Slice selection by view distance; beyond the last slice is lit.
fn cascade_shadow(world: vec3<f32>, view_depth: f32) -> f32 {
    let count = u32(shadowed.params.x);
    var layer = count;
    for (var i = 0u; i < count; i = i + 1u) {
        if (view_depth < cascades[i].range.y) {
            layer = i;
            break;
        }
    }
    if (layer >= count) {
        return 1.0;
    }

    let clip = cascades[layer].view_proj * vec4<f32>(world, 1.0);
    let ndc = clip.xyz / clip.w;
    let uv = vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
    if (any(uv < vec2<f32>(0.0)) || any(uv > vec2<f32>(1.0)) || ndc.z > 1.0) {
        return 1.0;
    }
    return textureSampleCompareLevel(shadow_array, shadow_sampler, uv, layer, ndc.z - shadowed.params.y);
}

@vertex
fn vs_main(@builtin(vertex_index) vertex: u32) -> LightVertex {
    var out: LightVertex;
    out.clip = fullscreen_corner(vertex);
    out.index = 0u;
    return out;
}

@fragment
fn fs_main(in: LightVertex) -> @location(0) vec4<f32> {
    let depth = load_depth(in.clip);
    if (depth <= 0.0) {
        discard;
    }
    let s = load_surface(in.clip, depth);
    let shadow = cascade_shadow(s.world_pos, -s.view_pos.z);
    return vec4<f32>(directional_light(shadowed.light, s) * shadow, 1.0);
}
"#;

/// Full WGSL of a light shader body.
pub fn light_shader_source(body: &str) -> String {
    format!("{LIGHT_COMMON_SOURCE}{body}")
}

/// Which pixels a light pipeline may touch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StencilMode {
    /// Every pixel.
    Any,
    /// Pixels that do not receive shadows, stencil reference [`STENCIL_NO_SHADOW`].
    Unshadowed,
    /// Pixels that receive shadows, stencil reference 0.
    Shadowed,
}

impl StencilMode {
    pub fn reference(self) -> u32 {
        match self {
            StencilMode::Any | StencilMode::Shadowed => 0,
            StencilMode::Unshadowed => STENCIL_NO_SHADOW,
        }
    }

    fn state(self) -> wgpu::StencilState {
        let compare = match self {
            StencilMode::Any => wgpu::CompareFunction::Always,
            StencilMode::Unshadowed | StencilMode::Shadowed => wgpu::CompareFunction::Equal,
        };
        let face = wgpu::StencilFaceState {
            compare,
            fail_op: wgpu::StencilOperation::Keep,
            depth_fail_op: wgpu::StencilOperation::Keep,
            pass_op: wgpu::StencilOperation::Keep,
        };
        wgpu::StencilState {
            front: face,
            back: face,
            read_mask: 0xff,
            write_mask: 0,
        }
    }
}

/// Groups 0 and 1 of every light pipeline.
pub struct LightLayouts {
    pub gbuffer: wgpu::BindGroupLayout,
    pub lights: wgpu::BindGroupLayout,
}

impl LightLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let unfilterable = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let gbuffer = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gbuffer-read-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(FrameUniform::SIZE),
                    },
                    count: None,
                },
                unfilterable(1),
                unfilterable(2),
                // Depth aspect read as plain floats; GL cannot textureLoad depth textures.
                unfilterable(3),
            ],
        });
        let lights = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("light-storage-bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(std::mem::size_of::<LightGpu>() as u64),
                },
                count: None,
            }],
        });
        Self { gbuffer, lights }
    }
}

/// The six light pipelines: point and directional, for each [`StencilMode`].
pub struct LightPipelines {
    pub point: wgpu::RenderPipeline,
    pub directional: wgpu::RenderPipeline,
    pub point_unshadowed: wgpu::RenderPipeline,
    pub directional_unshadowed: wgpu::RenderPipeline,
    pub point_shadowed: wgpu::RenderPipeline,
    pub directional_shadowed: wgpu::RenderPipeline,
}

impl LightPipelines {
    pub fn new(
        device: &wgpu::Device,
        shaders: &mut ShaderLibrary,
        layouts: &LightLayouts,
        shadow_layouts: &ShadowLayouts,
    ) -> Result<Self, ResourceError> {
        let plain = shaders.get_or_load(device, "light-plain", &light_shader_source(LIGHT_PLAIN_SOURCE))?;
        let point_shadow = shaders.get_or_load(
            device,
            "light-point-shadow",
            &light_shader_source(LIGHT_POINT_SHADOW_SOURCE),
        )?;
        let cascade_shadow = shaders.get_or_load(
            device,
            "light-cascade-shadow",
            &light_shader_source(LIGHT_CASCADE_SHADOW_SOURCE),
        )?;

        let plain_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("light-plain-layout"),
            bind_group_layouts: &[&layouts.gbuffer, &layouts.lights],
            immediate_size: 0,
        });
        let point_shadow_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("light-point-shadow-layout"),
            bind_group_layouts: &[&layouts.gbuffer, &layouts.lights, &shadow_layouts.point],
            immediate_size: 0,
        });
        let cascade_shadow_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("light-cascade-shadow-layout"),
            bind_group_layouts: &[&layouts.gbuffer, &layouts.lights, &shadow_layouts.cascade],
            immediate_size: 0,
        });

        let create = |label: &'static str,
                      layout: &wgpu::PipelineLayout,
                      module: &wgpu::ShaderModule,
                      (vs, fs): (&'static str, &'static str),
                      mode: StencilMode| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some(vs),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: false,
                    depth_compare: wgpu::CompareFunction::Always,
                    stencil: mode.state(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: Some(fs),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: LIGHT_FORMAT,
                        blend: Some(wgpu::BlendState {
                            color: wgpu::BlendComponent {
                                src_factor: wgpu::BlendFactor::One,
                                dst_factor: wgpu::BlendFactor::One,
                                operation: wgpu::BlendOperation::Add,
                            },
                            alpha: wgpu::BlendComponent {
                                src_factor: wgpu::BlendFactor::One,
                                dst_factor: wgpu::BlendFactor::One,
                                operation: wgpu::BlendOperation::Add,
                            },
                        }),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview_mask: None,
                cache: None,
            })
        };

        let point_entries = ("vs_point", "fs_point");
        let directional_entries = ("vs_directional", "fs_directional");
        let shadowed_entries = ("vs_main", "fs_main");

        Ok(Self {
            point: create("light-point", &plain_layout, &*plain, point_entries, StencilMode::Any),
            directional: create(
                "light-directional",
                &plain_layout,
                &*plain,
                directional_entries,
                StencilMode::Any,
            ),
            point_unshadowed: create(
                "light-point-unshadowed",
                &plain_layout,
                &*plain,
                point_entries,
                StencilMode::Unshadowed,
            ),
            directional_unshadowed: create(
                "light-directional-unshadowed",
                &plain_layout,
                &*plain,
                directional_entries,
                StencilMode::Unshadowed,
            ),
            point_shadowed: create(
                "light-point-shadowed",
                &point_shadow_layout,
                &*point_shadow,
                shadowed_entries,
                StencilMode::Shadowed,
            ),
            directional_shadowed: create(
                "light-directional-shadowed",
                &cascade_shadow_layout,
                &*cascade_shadow,
                shadowed_entries,
                StencilMode::Shadowed,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::validate_wgsl;
    use crate::test_util::{create_test_device_queue, plain_depth_textures};

    #[test]
    fn test_gbuffer_depth_read_as_float() {
        let module = validate_wgsl("plain", &light_shader_source(LIGHT_PLAIN_SOURCE)).unwrap();
        assert!(plain_depth_textures(&module).is_empty());
    }

    #[test]
    fn test_light_shaders_validate() {
        for (name, body) in [
            ("plain", LIGHT_PLAIN_SOURCE),
            ("point-shadow", LIGHT_POINT_SHADOW_SOURCE),
            ("cascade-shadow", LIGHT_CASCADE_SHADOW_SOURCE),
        ] {
            if let Err(err) = validate_wgsl(name, &light_shader_source(body)) {
                panic!("{name}: {err}");
            }
        }
    }

    #[test]
    fn test_stencil_references() {
        assert_eq!(StencilMode::Shadowed.reference(), 0);
        assert_eq!(StencilMode::Unshadowed.reference(), STENCIL_NO_SHADOW);
        assert_eq!(StencilMode::Any.state().front.compare, wgpu::CompareFunction::Always);
        assert_eq!(StencilMode::Shadowed.state().write_mask, 0);
    }

    #[test]
    fn test_light_pipelines_build() {
        let Some((device, _queue)) = create_test_device_queue() else {
            return;
        };
        let mut shaders = ShaderLibrary::new();
        let layouts = LightLayouts::new(&device);
        let shadow_layouts = ShadowLayouts::new(&device);
        assert!(LightPipelines::new(&device, &mut shaders, &layouts, &shadow_layouts).is_ok());
        assert_eq!(shaders.len(), 3);
    }
}
