//! wgpu deferred renderer: G-buffer, light accumulation with point and
//! cascaded shadows, environment reflections, SSAO and the final composite.

pub mod bind_cache;
pub mod buffer;
pub mod camera;
pub mod composite;
pub mod environment;
pub mod error;
pub mod gbuffer;
pub mod gpu;
pub mod layouts;
pub mod light_pipeline;
pub mod lights;
pub mod material;
pub mod mesh;
pub mod pass;
pub mod renderer;
pub mod scene;
pub mod shader;
pub mod shadow;
pub mod ssao;
pub mod texture;

pub use buffer::{BufferAllocator, IndexData, MeshBuffer, UniformSlots, Vertex};
pub use camera::{Camera, FrameUniform};
pub use composite::Composite;
pub use environment::{CapturePipeline, EnvironmentMap};
pub use error::{LightsError, ResourceError};
pub use gbuffer::GBuffer;
pub use gpu::{RenderContext, RenderContextError, SurfaceError, init_render_context_blocking};
pub use lights::{LightBuffer, Lights};
pub use material::{Material, MaterialId};
pub use mesh::MeshData;
pub use pass::{FrameEncoder, RenderPassBuilder, SKY_COLOR};
pub use renderer::{DeferredRenderer, FrameStats, RendererSettings};
pub use scene::{Scene, SceneEntity, SceneView};
pub use shader::{ShaderError, ShaderLibrary};
pub use shadow::{CascadeShadowMap, PointShadowMap};
pub use ssao::{Ssao, SsaoSettings};

#[cfg(test)]
pub(crate) mod test_util {
    /// Create a test GPU device and queue. Returns `None` if no GPU is available.
    pub(crate) fn create_test_device_queue() -> Option<(wgpu::Device, wgpu::Queue)> {
        let adapter = request_test_adapter()?;
        pollster::block_on(async {
            adapter
                .request_device(&wgpu::DeviceDescriptor {
                    label: Some("test-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                    experimental_features: Default::default(),
                    ..Default::default()
                })
                .await
                .ok()
        })
    }

    fn request_test_adapter() -> Option<wgpu::Adapter> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok()
    }

    /// Whether the test adapter can copy depth textures into buffers.
    pub(crate) fn supports_depth_copies() -> bool {
        request_test_adapter().is_some_and(|adapter| {
            adapter
                .get_downlevel_capabilities()
                .flags
                .contains(wgpu::DownlevelFlags::DEPTH_TEXTURE_AND_BUFFER_COPIES)
        })
    }

    /// Names of plain 2D depth textures in `module`. Only comparison sampling
    /// of depth textures translates to GLSL, so screen-space passes must read
    /// depth through float views instead.
    pub(crate) fn plain_depth_textures(module: &naga::Module) -> Vec<String> {
        module
            .global_variables
            .iter()
            .filter(|(_, var)| {
                matches!(
                    module.types[var.ty].inner,
                    naga::TypeInner::Image {
                        dim: naga::ImageDimension::D2,
                        arrayed: false,
                        class: naga::ImageClass::Depth { .. },
                    }
                )
            })
            .filter_map(|(_, var)| var.name.clone())
            .collect()
    }
}
