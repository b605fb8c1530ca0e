//! Final resolve of accumulated light, ambient and occlusion to the surface.

use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::error::ResourceError;
use crate::gbuffer::GBuffer;
use crate::pass::{RenderPassBuilder, SKY_COLOR};
use crate::shader::ShaderLibrary;

pub const COMPOSITE_SHADER_SOURCE: &str = r#"
struct Params {
    // rgb ambient, w = 1 when occlusion is applied
    ambient: vec4<f32>,
    sky: vec4<f32>,
};

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var albedo_tex: texture_2d<f32>;
@group(0) @binding(2) var depth_tex: texture_2d<f32>;
@group(0) @binding(3) var light_tex: texture_2d<f32>;
@group(0) @binding(4) var ao_tex: texture_2d<f32>;

@vertex
fn vs_main(@builtin(vertex_index) i: u32) -> @builtin(position) vec4<f32> {
    let uv = vec2<f32>(f32((i << 1u) & 2u), f32(i & 2u));
    return vec4<f32>(uv * 2.0 - 1.0, 0.5, 1.0);
}

@fragment
fn fs_main(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    let pixel = vec2<i32>(frag.xy);
    if (textureLoad(depth_tex, pixel, 0).r <= 0.0) {
        return params.sky;
    }
    let albedo = textureLoad(albedo_tex, pixel, 0).rgb;
    let light = textureLoad(light_tex, pixel, 0).rgb;
    let ao = select(1.0, textureLoad(ao_tex, pixel, 0).r, params.ambient.w > 0.5);
    return vec4<f32>((light + params.ambient.rgb * albedo) * ao, 1.0);
}
"#;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct CompositeUniform {
    ambient: [f32; 4],
    sky: [f32; 4],
}

/// Writes `(light + ambient * albedo) * ao` to the surface.
pub struct Composite {
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
    uniform: wgpu::Buffer,
    bind_group: Option<wgpu::BindGroup>,
}

impl Composite {
    pub fn new(
        device: &wgpu::Device,
        shaders: &mut ShaderLibrary,
        surface_format: wgpu::TextureFormat,
    ) -> Result<Self, ResourceError> {
        let shader = shaders.get_or_load(device, "composite", COMPOSITE_SHADER_SOURCE)?;

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
        let unfilterable = wgpu::TextureSampleType::Float { filterable: false };
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("composite-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(std::mem::size_of::<CompositeUniform>() as u64),
                    },
                    count: None,
                },
                texture(1, unfilterable),
                texture(2, unfilterable),
                texture(3, unfilterable),
                texture(4, unfilterable),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("composite-pipeline-layout"),
            bind_group_layouts: &[&layout],
            immediate_size: 0,
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("composite-pipeline"),
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
                    format: surface_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview_mask: None,
            cache: None,
        });
        let uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("composite-params"),
            size: std::mem::size_of::<CompositeUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            layout,
            pipeline,
            uniform,
            bind_group: None,
        })
    }

    pub fn set_params(&self, queue: &wgpu::Queue, ambient: Vec3, apply_occlusion: bool) {
        let data = CompositeUniform {
            ambient: ambient.extend(if apply_occlusion { 1.0 } else { 0.0 }).to_array(),
            sky: [
                SKY_COLOR.r as f32,
                SKY_COLOR.g as f32,
                SKY_COLOR.b as f32,
                SKY_COLOR.a as f32,
            ],
        };
        queue.write_buffer(&self.uniform, 0, bytemuck::bytes_of(&data));
    }

    /// Rebind the inputs after any of them was recreated.
    pub fn bind(
        &mut self,
        device: &wgpu::Device,
        gbuffer: &GBuffer,
        light: &wgpu::TextureView,
        ao: &wgpu::TextureView,
    ) {
        self.bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("composite-bind-group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&gbuffer.albedo_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&gbuffer.depth_sample_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(light),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(ao),
                },
            ],
        }));
    }

    pub fn render(&self, encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView) {
        let Some(bind_group) = &self.bind_group else {
            log::warn!("Composite has no inputs bound");
            return;
        };
        let mut pass = RenderPassBuilder::new("composite")
            .clear_color(target, SKY_COLOR)
            .begin(encoder);
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}
