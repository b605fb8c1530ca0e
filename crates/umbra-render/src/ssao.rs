//! Screen-space ambient occlusion.
//!
//! A hemisphere kernel oriented along each pixel's view-space normal is
//! compared against the depth buffer. The kernel and the 4x4 rotation noise
//! come from a seeded RNG, so every run produces the same pattern.

use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::camera::FrameUniform;
use crate::error::ResourceError;
use crate::gbuffer::GBuffer;
use crate::pass::RenderPassBuilder;
use crate::shader::ShaderLibrary;

/// Largest kernel the shader's uniform array holds.
pub const MAX_KERNEL_SIZE: usize = 64;
/// Side of the square noise tile, in pixels.
pub const NOISE_SIZE: u32 = 4;
pub const SSAO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R8Unorm;
const SEED: u64 = 0x55a0;

pub const SSAO_SHADER_SOURCE: &str = r#"
struct Frame {
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    inv_proj: mat4x4<f32>,
    inv_view: mat4x4<f32>,
    camera_pos: vec4<f32>,
    screen: vec4<f32>,
    depth_range: vec4<f32>,
};

struct Params {
    kernel: array<vec4<f32>, 64>,
    // radius, bias, sample count, unused
    settings: vec4<f32>,
};

@group(0) @binding(0) var<uniform> frame: Frame;
@group(0) @binding(1) var normal_tex: texture_2d<f32>;
@group(0) @binding(2) var depth_tex: texture_2d<f32>;
@group(0) @binding(3) var noise_tex: texture_2d<f32>;
@group(0) @binding(4) var<uniform> params: Params;

@vertex
fn vs_main(@builtin(vertex_index) i: u32) -> @builtin(position) vec4<f32> {
    let uv = vec2<f32>(f32((i << 1u) & 2u), f32(i & 2u));
    return vec4<f32>(uv * 2.0 - 1.0, 0.5, 1.0);
}

fn view_position(uv: vec2<f32>, depth: f32) -> vec3<f32> {
    let ndc = vec4<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, depth, 1.0);
    let view = frame.inv_proj * ndc;
    return view.xyz / view.w;
}

fn perpendicular(n: vec3<f32>) -> vec3<f32> {
    let axis = select(vec3<f32>(1.0, 0.0, 0.0), vec3<f32>(0.0, 1.0, 0.0), abs(n.x) > 0.9);
    return normalize(cross(n, axis));
}

@fragment
fn fs_main(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    let pixel = vec2<i32>(frag.xy);
    let depth = textureLoad(depth_tex, pixel, 0).r;
    if (depth <= 0.0) {
        return vec4<f32>(1.0);
    }

    let position = view_position(frag.xy * frame.screen.zw, depth);
    let normal = normalize(textureLoad(normal_tex, pixel, 0).xyz);
    let random = textureLoad(noise_tex, pixel % vec2<i32>(4), 0).xyz;
    let projected = random - normal * dot(random, normal);
    let tangent = select(normalize(projected), perpendicular(normal), dot(projected, projected) < 1e-6);
    let tbn = mat3x3<f32>(tangent, cross(normal, tangent), normal);

    let radius = params.settings.x;
    let bias = params.settings.y;
    let count = u32(params.settings.z);
    let size = vec2<f32>(textureDimensions(depth_tex));
    var occlusion = 0.0;
    for (var i = 0u; i < count; i = i + 1u) {
        let sample = position + tbn * params.kernel[i].xyz * radius;
        let clip = frame.proj * vec4<f32>(sample, 1.0);
        let ndc = clip.xy / clip.w;
        let uv = vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
        if (any(uv < vec2<f32>(0.0)) || any(uv >= vec2<f32>(1.0))) {
            continue;
        }
        let sample_depth = textureLoad(depth_tex, vec2<i32>(uv * size), 0).r;
        if (sample_depth <= 0.0) {
            continue;
        }
        let scene_z = view_position(uv, sample_depth).z;
        let range = smoothstep(0.0, 1.0, radius / abs(position.z - scene_z));
        if (scene_z >= sample.z + bias) {
            occlusion = occlusion + range;
        }
    }
    return vec4<f32>(1.0 - occlusion / f32(max(count, 1u)), 0.0, 0.0, 1.0);
}
"#;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SsaoSettings {
    pub enabled: bool,
    pub kernel_size: usize,
    /// View-space sampling radius.
    pub radius: f32,
    pub bias: f32,
}

impl Default for SsaoSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            kernel_size: MAX_KERNEL_SIZE,
            radius: 0.5,
            bias: 0.025,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct SsaoUniform {
    kernel: [[f32; 4]; MAX_KERNEL_SIZE],
    settings: [f32; 4],
}

static_assertions::assert_eq_size!(SsaoUniform, [u8; 1040]);

/// Hemisphere sample offsets along +Z, denser near the origin.
///
/// Sample `i` is a random unit vector in the upper hemisphere, scaled by a
/// random length and by `lerp(0.1, 1.0, (i / count)^2)`.
pub fn generate_kernel(seed: u64, count: usize) -> Vec<Vec3> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let direction = loop {
                let candidate = Vec3::new(
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                    rng.random::<f32>(),
                );
                if let Some(direction) = candidate.try_normalize() {
                    break direction;
                }
            };
            let t = i as f32 / count as f32;
            let scale = 0.1 + 0.9 * t * t;
            direction * rng.random::<f32>() * scale
        })
        .collect()
}

/// `NOISE_SIZE`² rotation vectors in the XY plane, none of zero length.
pub fn generate_noise(seed: u64) -> Vec<[f32; 4]> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..NOISE_SIZE * NOISE_SIZE)
        .map(|_| loop {
            let x: f32 = rng.random_range(-1.0..1.0);
            let y: f32 = rng.random_range(-1.0..1.0);
            if x * x + y * y > 1e-4 {
                break [x, y, 0.0, 0.0];
            }
        })
        .collect()
}

/// Occlusion pass and its full-resolution target.
pub struct Ssao {
    settings: SsaoSettings,
    kernel: Vec<Vec3>,
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
    uniform: wgpu::Buffer,
    noise: wgpu::Texture,
    noise_view: wgpu::TextureView,
    output: Option<SsaoOutput>,
}

struct SsaoOutput {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    bind_group: wgpu::BindGroup,
}

impl Ssao {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        shaders: &mut ShaderLibrary,
        settings: SsaoSettings,
    ) -> Result<Self, ResourceError> {
        let shader = shaders.get_or_load(device, "ssao", SSAO_SHADER_SOURCE)?;
        let layout = create_layout(device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ssao-pipeline-layout"),
            bind_group_layouts: &[&layout],
            immediate_size: 0,
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("ssao-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: SSAO_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview_mask: None,
            cache: None,
        });

        let uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ssao-params"),
            size: std::mem::size_of::<SsaoUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let (noise, noise_view) = create_noise_texture(device, queue);

        let mut ssao = Self {
            settings,
            kernel: generate_kernel(SEED, MAX_KERNEL_SIZE),
            layout,
            pipeline,
            uniform,
            noise,
            noise_view,
            output: None,
        };
        ssao.set_settings(queue, settings);
        Ok(ssao)
    }

    pub fn settings(&self) -> SsaoSettings {
        self.settings
    }

    pub fn enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Apply new settings. The kernel size is clamped to `1..=MAX_KERNEL_SIZE`.
    pub fn set_settings(&mut self, queue: &wgpu::Queue, settings: SsaoSettings) {
        let kernel_size = settings.kernel_size.clamp(1, MAX_KERNEL_SIZE);
        if kernel_size != settings.kernel_size {
            log::warn!(
                "SSAO kernel size {} clamped to {kernel_size}",
                settings.kernel_size
            );
        }
        self.settings = SsaoSettings {
            kernel_size,
            ..settings
        };

        let mut data = SsaoUniform::zeroed();
        for (slot, sample) in data.kernel.iter_mut().zip(&self.kernel) {
            *slot = sample.extend(0.0).to_array();
        }
        data.settings = [settings.radius, settings.bias, kernel_size as f32, 0.0];
        queue.write_buffer(&self.uniform, 0, bytemuck::bytes_of(&data));
    }

    /// (Re)create the occlusion target for `gbuffer`.
    pub fn create_target(&mut self, device: &wgpu::Device, gbuffer: &GBuffer, frame_uniform: &wgpu::Buffer) {
        let (width, height) = gbuffer.size();
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("ssao-output"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SSAO_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ssao-bind-group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: frame_uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&gbuffer.normal_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&gbuffer.depth_sample_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&self.noise_view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: self.uniform.as_entire_binding(),
                },
            ],
        });
        if let Some(old) = self.output.replace(SsaoOutput {
            texture,
            view,
            bind_group,
        }) {
            old.texture.destroy();
        }
    }

    pub fn output_view(&self) -> Option<&wgpu::TextureView> {
        self.output.as_ref().map(|output| &output.view)
    }

    /// Compute occlusion into the output target. Does nothing when disabled.
    pub fn render(&self, encoder: &mut wgpu::CommandEncoder) {
        if !self.settings.enabled {
            return;
        }
        let Some(output) = &self.output else {
            return;
        };
        let mut pass = RenderPassBuilder::new("ssao")
            .clear_color(&output.view, wgpu::Color::WHITE)
            .begin(encoder);
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &output.bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    pub fn release(self) {
        self.noise.destroy();
        self.uniform.destroy();
        if let Some(output) = self.output {
            output.texture.destroy();
        }
    }
}

fn create_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let texture = |binding, sample_type| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    };
    let uniform = |binding, size| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(size),
        },
        count: None,
    };
    let unfilterable = wgpu::TextureSampleType::Float { filterable: false };
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("ssao-bgl"),
        entries: &[
            uniform(0, FrameUniform::SIZE),
            texture(1, unfilterable),
            texture(2, unfilterable),
            texture(3, unfilterable),
            uniform(4, std::mem::size_of::<SsaoUniform>() as u64),
        ],
    })
}

fn create_noise_texture(device: &wgpu::Device, queue: &wgpu::Queue) -> (wgpu::Texture, wgpu::TextureView) {
    let size = wgpu::Extent3d {
        width: NOISE_SIZE,
        height: NOISE_SIZE,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("ssao-noise"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba32Float,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let noise = generate_noise(SEED);
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        bytemuck::cast_slice(&noise),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(NOISE_SIZE * 16),
            rows_per_image: Some(NOISE_SIZE),
        },
        size,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::validate_wgsl;
    use crate::test_util::{create_test_device_queue, plain_depth_textures};

    #[test]
    fn test_ssao_shader_validates() {
        let module = validate_wgsl("ssao", SSAO_SHADER_SOURCE).unwrap();
        assert_eq!(plain_depth_textures(&module), Vec::<String>::new());
    }

    #[test]
    fn test_kernel_in_hemisphere() {
        let kernel = generate_kernel(SEED, MAX_KERNEL_SIZE);
        assert_eq!(kernel.len(), MAX_KERNEL_SIZE);
        for sample in &kernel {
            assert!(sample.z >= 0.0);
            assert!(sample.length() <= 1.0 + 1e-5);
        }
    }

    #[test]
    fn test_kernel_scale_grows_with_index() {
        let kernel = generate_kernel(3, 16);
        let t = 15.0f32 / 16.0;
        assert!(kernel[0].length() <= 0.1 + 1e-6);
        assert!(kernel[15].length() <= 0.1 + 0.9 * t * t + 1e-6);
    }

    #[test]
    fn test_generation_is_deterministic() {
        assert_eq!(generate_kernel(9, 8), generate_kernel(9, 8));
        assert_eq!(generate_noise(9), generate_noise(9));
        assert_ne!(generate_noise(9), generate_noise(10));
    }

    #[test]
    fn test_noise_vectors_nonzero_in_plane() {
        let noise = generate_noise(SEED);
        assert_eq!(noise.len(), 16);
        for [x, y, z, _] in noise {
            assert_eq!(z, 0.0);
            assert!(x * x + y * y > 0.0);
        }
    }

    #[test]
    fn test_kernel_size_clamped() {
        let Some((device, queue)) = create_test_device_queue() else {
            return;
        };
        let mut shaders = ShaderLibrary::new();
        let settings = SsaoSettings {
            kernel_size: 500,
            ..SsaoSettings::default()
        };
        let mut ssao = Ssao::new(&device, &queue, &mut shaders, settings).unwrap();
        assert_eq!(ssao.settings().kernel_size, MAX_KERNEL_SIZE);
        ssao.set_settings(&queue, SsaoSettings {
            kernel_size: 0,
            ..settings
        });
        assert_eq!(ssao.settings().kernel_size, 1);
        assert!(ssao.output_view().is_none());
    }
}
