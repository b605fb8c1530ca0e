//! Layered render targets and the samplers used to read them.
//!
//! Shadow maps and environment captures are all "one texture, one view per
//! layer, one view for sampling". [`LayeredTarget`] owns that triple and is
//! the single place where their sizes are checked against device limits.

use glam::UVec2;

use crate::error::ResourceError;

/// Depth format of every shadow map and capture depth buffer.
pub const SHADOW_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Check a `width`x`height` texture with `layers` layers against `limits`.
pub fn check_extent(
    limits: &wgpu::Limits,
    label: &'static str,
    size: UVec2,
    layers: u32,
) -> Result<(), ResourceError> {
    if size.x == 0 || size.y == 0 || layers == 0 {
        return Err(ResourceError::InvalidDimensions {
            label,
            width: size.x,
            height: size.y,
            layers,
        });
    }
    let max_dim = limits.max_texture_dimension_2d;
    let requested = size.max_element();
    if requested > max_dim {
        return Err(ResourceError::ExceedsDeviceLimit {
            label,
            requested,
            limit: max_dim,
        });
    }
    if layers > limits.max_texture_array_layers {
        return Err(ResourceError::ExceedsDeviceLimit {
            label,
            requested: layers,
            limit: limits.max_texture_array_layers,
        });
    }
    Ok(())
}

/// A 2D array texture with a render view per layer and one sampling view.
pub struct LayeredTarget {
    pub texture: wgpu::Texture,
    /// Single-layer views, used as render attachments.
    pub layer_views: Vec<wgpu::TextureView>,
    /// Cube or 2D-array view over all layers.
    pub sample_view: wgpu::TextureView,
    pub size: UVec2,
}

impl LayeredTarget {
    /// Allocate `layers` layers of `format`. Cube targets need six square layers.
    pub fn new(
        device: &wgpu::Device,
        label: &'static str,
        format: wgpu::TextureFormat,
        size: UVec2,
        layers: u32,
        sample_dimension: wgpu::TextureViewDimension,
    ) -> Result<Self, ResourceError> {
        let is_cube = sample_dimension == wgpu::TextureViewDimension::Cube;
        if is_cube && (layers != 6 || size.x != size.y) {
            return Err(ResourceError::InvalidDimensions {
                label,
                width: size.x,
                height: size.y,
                layers,
            });
        }
        check_extent(&device.limits(), label, size, layers)?;

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.x,
                height: size.y,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        let layer_views = (0..layers)
            .map(|layer| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some(label),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();

        let sample_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            dimension: Some(sample_dimension),
            array_layer_count: Some(layers),
            ..Default::default()
        });

        log::debug!("Created {label} target {}x{} with {layers} layers", size.x, size.y);
        Ok(Self {
            texture,
            layer_views,
            sample_view,
            size,
        })
    }

    pub fn layer_count(&self) -> u32 {
        self.layer_views.len() as u32
    }

    /// Free the GPU memory now instead of when the last view drops.
    pub fn release(self) {
        self.texture.destroy();
    }
}

/// Depth comparison sampler for shadow lookups (standard depth, less-equal).
pub fn create_comparison_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("shadow-comparison-sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::MipmapFilterMode::Nearest,
        compare: Some(wgpu::CompareFunction::LessEqual),
        ..Default::default()
    })
}

/// Bilinear clamp-to-edge sampler for cube captures.
pub fn create_linear_sampler(device: &wgpu::Device, label: &'static str) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::MipmapFilterMode::Nearest,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::create_test_device_queue;

    #[test]
    fn test_zero_size_rejected() {
        let limits = wgpu::Limits::default();
        let err = check_extent(&limits, "t", UVec2::new(0, 16), 1).unwrap_err();
        assert!(matches!(err, ResourceError::InvalidDimensions { width: 0, .. }));
    }

    #[test]
    fn test_zero_layers_rejected() {
        let limits = wgpu::Limits::default();
        assert!(check_extent(&limits, "t", UVec2::splat(16), 0).is_err());
    }

    #[test]
    fn test_oversized_rejected() {
        let limits = wgpu::Limits::default();
        let too_big = limits.max_texture_dimension_2d + 1;
        let err = check_extent(&limits, "t", UVec2::new(16, too_big), 1).unwrap_err();
        assert!(matches!(
            err,
            ResourceError::ExceedsDeviceLimit { requested, .. } if requested == too_big
        ));
    }

    #[test]
    fn test_within_limits_accepted() {
        let limits = wgpu::Limits::default();
        assert!(check_extent(&limits, "t", UVec2::new(1024, 512), 6).is_ok());
    }

    #[test]
    fn test_cube_target_views() {
        let Some((device, _queue)) = create_test_device_queue() else {
            return;
        };
        let target = LayeredTarget::new(
            &device,
            "test-cube",
            SHADOW_DEPTH_FORMAT,
            UVec2::splat(64),
            6,
            wgpu::TextureViewDimension::Cube,
        )
        .unwrap();
        assert_eq!(target.layer_count(), 6);
        assert_eq!(target.texture.depth_or_array_layers(), 6);
        target.release();
    }

    #[test]
    fn test_non_square_cube_rejected() {
        let Some((device, _queue)) = create_test_device_queue() else {
            return;
        };
        let result = LayeredTarget::new(
            &device,
            "test-cube",
            SHADOW_DEPTH_FORMAT,
            UVec2::new(64, 32),
            6,
            wgpu::TextureViewDimension::Cube,
        );
        assert!(matches!(
            result,
            Err(ResourceError::InvalidDimensions { .. })
        ));
    }
}
