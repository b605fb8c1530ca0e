//! Render pass construction and per-frame command encoding.
//!
//! [`RenderPassBuilder`] collects attachments with a fluent API so the many
//! small passes of a deferred frame (one per shadow face, G-buffer, lights,
//! SSAO, composite) stay one expression each. [`FrameEncoder`] ties the
//! command encoder to the surface texture it presents.

/// Background color behind all geometry.
pub const SKY_COLOR: wgpu::Color = wgpu::Color {
    r: 0.125,
    g: 0.25,
    b: 0.5,
    a: 1.0,
};

/// Builder for render pass descriptors.
#[derive(Default)]
pub struct RenderPassBuilder<'a> {
    label: Option<&'static str>,
    color_attachments: Vec<Option<wgpu::RenderPassColorAttachment<'a>>>,
    depth_stencil: Option<wgpu::RenderPassDepthStencilAttachment<'a>>,
}

impl<'a> RenderPassBuilder<'a> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label: Some(label),
            ..Self::default()
        }
    }

    /// Add a color attachment cleared to `color`.
    pub fn clear_color(mut self, view: &'a wgpu::TextureView, color: wgpu::Color) -> Self {
        self.color_attachments
            .push(Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(color),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            }));
        self
    }

    /// Depth-only attachment cleared to `depth`.
    pub fn clear_depth(mut self, view: &'a wgpu::TextureView, depth: f32) -> Self {
        self.depth_stencil = Some(wgpu::RenderPassDepthStencilAttachment {
            view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(depth),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        });
        self
    }

    /// Depth-stencil attachment with both aspects cleared.
    pub fn clear_depth_stencil(
        mut self,
        view: &'a wgpu::TextureView,
        depth: f32,
        stencil: u32,
    ) -> Self {
        self.depth_stencil = Some(wgpu::RenderPassDepthStencilAttachment {
            view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(depth),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(stencil),
                store: wgpu::StoreOp::Store,
            }),
        });
        self
    }

    /// Depth-stencil attachment used only for testing. The same texture may
    /// be sampled in the pass.
    pub fn read_only_depth_stencil(mut self, view: &'a wgpu::TextureView) -> Self {
        self.depth_stencil = Some(wgpu::RenderPassDepthStencilAttachment {
            view,
            depth_ops: None,
            stencil_ops: None,
        });
        self
    }

    pub fn begin<'e>(&self, encoder: &'e mut wgpu::CommandEncoder) -> wgpu::RenderPass<'e> {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: self.label,
            color_attachments: &self.color_attachments,
            depth_stencil_attachment: self.depth_stencil.clone(),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        })
    }
}

/// Command encoder for one frame plus the surface texture it will present.
pub struct FrameEncoder {
    encoder: wgpu::CommandEncoder,
    surface_texture: wgpu::SurfaceTexture,
    surface_view: wgpu::TextureView,
}

impl FrameEncoder {
    pub fn new(device: &wgpu::Device, surface_texture: wgpu::SurfaceTexture) -> Self {
        let encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame-encoder"),
        });
        let surface_view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            encoder,
            surface_texture,
            surface_view,
        }
    }

    /// The encoder and the view of the texture being presented.
    pub fn parts(&mut self) -> (&mut wgpu::CommandEncoder, &wgpu::TextureView) {
        (&mut self.encoder, &self.surface_view)
    }

    /// Submit the recorded commands and present. Consumes self, so a frame
    /// can only be submitted once.
    pub fn submit(self, queue: &wgpu::Queue) {
        queue.submit(std::iter::once(self.encoder.finish()));
        self.surface_texture.present();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::create_test_device_queue;

    #[test]
    fn test_sky_color_is_opaque() {
        assert_eq!(SKY_COLOR.a, 1.0);
        assert_eq!((SKY_COLOR.r, SKY_COLOR.g, SKY_COLOR.b), (0.125, 0.25, 0.5));
    }

    #[test]
    fn test_builder_collects_attachments() {
        let Some((device, queue)) = create_test_device_queue() else {
            return;
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("test-target"),
            size: wgpu::Extent3d {
                width: 4,
                height: 4,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let builder = RenderPassBuilder::new("test-pass").clear_color(&view, SKY_COLOR);
        assert_eq!(builder.color_attachments.len(), 1);
        assert!(builder.depth_stencil.is_none());

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
        drop(builder.begin(&mut encoder));
        queue.submit([encoder.finish()]);
    }
}
