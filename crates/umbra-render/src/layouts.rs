//! Bind group layouts shared by every pipeline that draws scene geometry.
//!
//! G-buffer, shadow and capture pipelines all bind the same object slot
//! buffer, so one [`SceneLayouts`] is created up front and handed to each
//! pipeline constructor.

use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::camera::FrameUniform;

/// Per-entity transform slot, `@group(1) @binding(0)` with a dynamic offset.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ObjectUniform {
    pub model: [[f32; 4]; 4],
    /// Inverse transpose of `model`.
    pub normal: [[f32; 4]; 4],
    pub tint: [f32; 4],
}

impl ObjectUniform {
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    pub fn new(model: Mat4, tint: Vec3) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            normal: model.inverse().transpose().to_cols_array_2d(),
            tint: tint.extend(1.0).to_array(),
        }
    }
}

/// One cube face or cascade slice: where to render from and how far.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct FaceUniform {
    pub view_proj: [[f32; 4]; 4],
    /// xyz = eye position, w = far distance used for linear depth.
    pub origin_far: [f32; 4],
}

impl FaceUniform {
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    pub fn new(view_proj: Mat4, origin: Vec3, far: f32) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            origin_far: origin.extend(far).to_array(),
        }
    }
}

static_assertions::assert_eq_size!(ObjectUniform, [u8; 144]);
static_assertions::assert_eq_size!(FaceUniform, [u8; 80]);

pub struct SceneLayouts {
    /// Camera uniform.
    pub frame: wgpu::BindGroupLayout,
    /// Dynamic-offset [`ObjectUniform`] slot.
    pub object: wgpu::BindGroupLayout,
    /// Albedo texture and sampler.
    pub material: wgpu::BindGroupLayout,
    /// Dynamic-offset [`FaceUniform`] slot.
    pub face: wgpu::BindGroupLayout,
    /// Environment cube and sampler for reflective surfaces.
    pub environment: wgpu::BindGroupLayout,
}

impl SceneLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let frame = uniform_layout(device, "frame-bgl", FrameUniform::SIZE, false);
        let object = uniform_layout(device, "object-bgl", ObjectUniform::SIZE, true);
        let face = uniform_layout(device, "face-bgl", FaceUniform::SIZE, true);
        let material = texture_sampler_layout(device, "material-bgl", wgpu::TextureViewDimension::D2);
        let environment =
            texture_sampler_layout(device, "environment-bgl", wgpu::TextureViewDimension::Cube);

        Self {
            frame,
            object,
            material,
            face,
            environment,
        }
    }
}

fn uniform_layout(
    device: &wgpu::Device,
    label: &'static str,
    size: u64,
    has_dynamic_offset: bool,
) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset,
                min_binding_size: NonZeroU64::new(size),
            },
            count: None,
        }],
    })
}

fn texture_sampler_layout(
    device: &wgpu::Device,
    label: &'static str,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

/// Bind group over a single whole uniform buffer at binding 0.
pub fn uniform_bind_group(
    device: &wgpu::Device,
    label: &'static str,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_uniform_normal_matrix() {
        let model = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let uniform = ObjectUniform::new(model, Vec3::ONE);
        let normal = Mat4::from_cols_array_2d(&uniform.normal);
        assert!((normal.x_axis.x - 0.5).abs() < 1e-6);
        assert_eq!(uniform.tint, [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_face_uniform_packs_far() {
        let face = FaceUniform::new(Mat4::IDENTITY, Vec3::new(1.0, 2.0, 3.0), 27.0);
        assert_eq!(face.origin_far, [1.0, 2.0, 3.0, 27.0]);
    }
}
