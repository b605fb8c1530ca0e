//! Redundant-bind elimination for scene draw loops.
//!
//! A [`BindCache`] lives for one render pass. Nothing is shared between
//! passes, so a capture pass can never leave stale state behind for the
//! G-buffer pass that follows it.

use crate::material::MaterialId;

/// Pipelines that draw scene entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineId {
    GBufferOpaque,
    GBufferReflective,
    PointShadow,
    CascadeShadow,
    EnvironmentCapture,
}

#[derive(Debug, Default)]
pub struct BindCache {
    pipeline: Option<PipelineId>,
    material: Option<MaterialId>,
}

impl BindCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything, e.g. after the pass's bind state was disturbed.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record `pipeline` as bound. Returns `true` when the caller must bind it.
    ///
    /// Switching pipelines invalidates the material, since the new pipeline
    /// may use a different layout at that group.
    pub fn use_pipeline(&mut self, pipeline: PipelineId) -> bool {
        if self.pipeline == Some(pipeline) {
            return false;
        }
        self.pipeline = Some(pipeline);
        self.material = None;
        true
    }

    /// Record `material` as bound. Returns `true` when the caller must bind it.
    pub fn use_material(&mut self, material: MaterialId) -> bool {
        if self.material == Some(material) {
            return false;
        }
        self.material = Some(material);
        true
    }

    pub fn bind_pipeline(
        &mut self,
        pass: &mut wgpu::RenderPass<'_>,
        id: PipelineId,
        pipeline: &wgpu::RenderPipeline,
    ) {
        if self.use_pipeline(id) {
            pass.set_pipeline(pipeline);
        }
    }

    pub fn bind_material(
        &mut self,
        pass: &mut wgpu::RenderPass<'_>,
        group: u32,
        id: MaterialId,
        bind_group: &wgpu::BindGroup,
    ) {
        if self.use_material(id) {
            pass.set_bind_group(group, bind_group, &[]);
        }
    }
}
