//! Albedo textures bound at `@group(2)` of the geometry pipelines.

use glam::UVec2;

use crate::error::ResourceError;
use crate::texture::check_extent;

/// Index into a [`Scene`](crate::Scene)'s material list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MaterialId(pub usize);

/// An sRGB albedo texture with a repeating sampler.
pub struct Material {
    pub name: String,
    pub texture: wgpu::Texture,
    pub bind_group: wgpu::BindGroup,
}

impl Material {
    /// Upload tightly packed RGBA8 texels.
    pub fn from_rgba8(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        name: &str,
        size: UVec2,
        texels: &[u8],
    ) -> Result<Self, ResourceError> {
        check_extent(&device.limits(), "material", size, 1)?;
        let expected = (size.x * size.y * 4) as usize;
        if texels.len() != expected {
            return Err(ResourceError::InvalidDimensions {
                label: "material",
                width: size.x,
                height: size.y,
                layers: 1,
            });
        }

        let extent = wgpu::Extent3d {
            width: size.x,
            height: size.y,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(name),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            texels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(size.x * 4),
                rows_per_image: Some(size.y),
            },
            extent,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(name),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(name),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        log::debug!("Created material '{name}' ({}x{})", size.x, size.y);
        Ok(Self {
            name: name.to_string(),
            texture,
            bind_group,
        })
    }

    /// 1x1 texture of a single color.
    pub fn solid(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        name: &str,
        rgba: [u8; 4],
    ) -> Result<Self, ResourceError> {
        Self::from_rgba8(device, queue, layout, name, UVec2::ONE, &rgba)
    }

    /// `cells`x`cells` checkerboard, 8 texels per cell.
    pub fn checker(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        name: &str,
        cells: u32,
        a: [u8; 4],
        b: [u8; 4],
    ) -> Result<Self, ResourceError> {
        let texels = checker_texels(cells, a, b);
        let side = cells * CHECKER_CELL;
        Self::from_rgba8(device, queue, layout, name, UVec2::splat(side), &texels)
    }
}

const CHECKER_CELL: u32 = 8;

fn checker_texels(cells: u32, a: [u8; 4], b: [u8; 4]) -> Vec<u8> {
    let side = cells * CHECKER_CELL;
    let mut texels = Vec::with_capacity((side * side * 4) as usize);
    for y in 0..side {
        for x in 0..side {
            let even = (x / CHECKER_CELL + y / CHECKER_CELL) % 2 == 0;
            texels.extend_from_slice(if even { &a } else { &b });
        }
    }
    texels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layouts::SceneLayouts;
    use crate::test_util::create_test_device_queue;

    #[test]
    fn test_checker_alternates_cells() {
        let texels = checker_texels(2, [255; 4], [0; 4]);
        assert_eq!(texels.len(), 16 * 16 * 4);
        assert_eq!(&texels[0..4], &[255; 4]);
        let second_cell = (CHECKER_CELL * 4) as usize;
        assert_eq!(&texels[second_cell..second_cell + 4], &[0; 4]);
    }

    #[test]
    fn test_texel_count_mismatch_rejected() {
        let Some((device, queue)) = create_test_device_queue() else {
            return;
        };
        let layouts = SceneLayouts::new(&device);
        let result = Material::from_rgba8(
            &device,
            &queue,
            &layouts.material,
            "short",
            UVec2::splat(2),
            &[0; 4],
        );
        assert!(matches!(result, Err(ResourceError::InvalidDimensions { .. })));
    }

    #[test]
    fn test_solid_material() {
        let Some((device, queue)) = create_test_device_queue() else {
            return;
        };
        let layouts = SceneLayouts::new(&device);
        let material = Material::solid(&device, &queue, &layouts.material, "white", [255; 4]).unwrap();
        assert_eq!(material.texture.width(), 1);
        assert_eq!(material.name, "white");
    }
}
