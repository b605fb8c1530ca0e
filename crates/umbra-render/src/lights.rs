//! GPU light registry and the light accumulation pass.
//!
//! [`Lights`] wraps a [`LightRegistry`] and mirrors it on the GPU: one
//! storage buffer per [`LightType`], plus one shadow map per shadowed light
//! kept at the same index as its light. Every structural change goes through
//! the registry first, so the CPU lists stay the source of truth.

use std::num::NonZeroU64;

use umbra_lighting::{
    CascadeCamera, CascadeSplits, LightGpu, LightInfo, LightKind, LightRegistry, LightType,
    ShadowRefresh,
};

use crate::error::{LightsError, ResourceError};
use crate::gbuffer::{GBuffer, LIGHT_FORMAT, create_target};
use crate::layouts::SceneLayouts;
use crate::light_pipeline::{LightLayouts, LightPipelines, StencilMode};
use crate::pass::RenderPassBuilder;
use crate::scene::SceneView;
use crate::shader::ShaderLibrary;
use crate::shadow::{CascadeShadowMap, PointShadowMap, ShadowLayouts, ShadowPipelines};
use crate::texture::create_comparison_sampler;

const LIGHT_SIZE: u64 = std::mem::size_of::<LightGpu>() as u64;

/// Storage buffer mirror of one light list.
pub struct LightBuffer {
    light_type: LightType,
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    capacity: usize,
    len: usize,
}

impl LightBuffer {
    pub fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, light_type: LightType) -> Self {
        let (buffer, bind_group) = Self::allocate(device, layout, light_type, 1);
        Self {
            light_type,
            buffer,
            bind_group,
            capacity: 1,
            len: 0,
        }
    }

    fn allocate(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        light_type: LightType,
        capacity: usize,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(light_type.name()),
            size: LIGHT_SIZE * capacity as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(light_type.name()),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(LIGHT_SIZE * capacity as u64),
                }),
            }],
        });
        (buffer, bind_group)
    }

    /// Rewrite the whole list, reallocating when it outgrew the buffer.
    pub fn upload_all(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        infos: &[LightInfo],
    ) {
        if infos.len() > self.capacity {
            let capacity = infos.len().next_power_of_two();
            log::debug!("Growing {} light buffer to {capacity}", self.light_type.name());
            let (buffer, bind_group) = Self::allocate(device, layout, self.light_type, capacity);
            self.buffer.destroy();
            self.buffer = buffer;
            self.bind_group = bind_group;
            self.capacity = capacity;
        }
        self.len = infos.len();
        if infos.is_empty() {
            return;
        }
        let data: Vec<LightGpu> = infos.iter().map(LightGpu::from).collect();
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&data));
    }

    /// Rewrite the single entry at `index`.
    pub fn update_at(&self, queue: &wgpu::Queue, index: usize, info: &LightInfo) {
        debug_assert!(index < self.len);
        let data = LightGpu::from(info);
        queue.write_buffer(&self.buffer, LIGHT_SIZE * index as u64, bytemuck::bytes_of(&data));
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }
}

/// Light accumulation target and its G-buffer bindings.
struct LightTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    gbuffer_bind_group: wgpu::BindGroup,
}

/// A freshly created shadow map, not yet stored.
enum NewShadow {
    None,
    Point(PointShadowMap),
    Cascade(CascadeShadowMap),
}

/// All lights of a scene and their GPU resources.
pub struct Lights {
    registry: LightRegistry,
    buffers: [LightBuffer; 4],
    point_maps: Vec<PointShadowMap>,
    cascade_maps: Vec<CascadeShadowMap>,
    layouts: LightLayouts,
    shadow_layouts: ShadowLayouts,
    pipelines: LightPipelines,
    shadow_pipelines: ShadowPipelines,
    comparison_sampler: wgpu::Sampler,
    target: Option<LightTarget>,
}

impl Lights {
    pub fn new(
        device: &wgpu::Device,
        shaders: &mut ShaderLibrary,
        scene_layouts: &SceneLayouts,
        splits: CascadeSplits,
    ) -> Result<Self, ResourceError> {
        let registry = LightRegistry::new(splits)?;
        let layouts = LightLayouts::new(device);
        let shadow_layouts = ShadowLayouts::new(device);
        let pipelines = LightPipelines::new(device, shaders, &layouts, &shadow_layouts)?;
        let shadow_pipelines = ShadowPipelines::new(device, shaders, scene_layouts)?;
        let buffers = LightType::ALL.map(|ty| LightBuffer::new(device, &layouts.lights, ty));

        log::info!("Light system ready with {} cascades", registry.cascade_count());
        Ok(Self {
            registry,
            buffers,
            point_maps: Vec::new(),
            cascade_maps: Vec::new(),
            layouts,
            shadow_layouts,
            pipelines,
            shadow_pipelines,
            comparison_sampler: create_comparison_sampler(device),
            target: None,
        })
    }

    pub fn registry(&self) -> &LightRegistry {
        &self.registry
    }

    pub fn info(&self, ty: LightType, index: usize) -> Result<&LightInfo, LightsError> {
        Ok(self.registry.info(ty, index)?)
    }

    pub fn infos(&self, ty: LightType) -> &[LightInfo] {
        self.registry.infos(ty)
    }

    pub fn len(&self, ty: LightType) -> usize {
        self.registry.len(ty)
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn buffer(&self, ty: LightType) -> &LightBuffer {
        &self.buffers[ty.index()]
    }

    pub fn point_shadow_maps(&self) -> &[PointShadowMap] {
        &self.point_maps
    }

    pub fn cascade_shadow_maps(&self) -> &[CascadeShadowMap] {
        &self.cascade_maps
    }

    /// Append a light. Shadowed lights get their shadow map now.
    pub fn add_light(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        scene_layouts: &SceneLayouts,
        ty: LightType,
        info: LightInfo,
    ) -> Result<usize, LightsError> {
        let index = self.registry.add_light(ty, info)?;
        let stored = *self.registry.info(ty, index)?;
        match self.create_shadow(device, queue, scene_layouts, ty, &stored) {
            Ok(NewShadow::None) => {}
            Ok(NewShadow::Point(map)) => self.point_maps.push(map),
            Ok(NewShadow::Cascade(map)) => self.cascade_maps.push(map),
            Err(source) => {
                self.registry.delete_light(ty, index)?;
                return Err(LightsError::Resource {
                    light_type: ty,
                    source,
                });
            }
        }
        self.upload(device, queue, ty);
        self.debug_check_lockstep();

        log::info!("Added {} light {index}", ty.name());
        Ok(index)
    }

    /// Replace the light at `index`. Its shadow map is always recreated.
    pub fn update_light(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        scene_layouts: &SceneLayouts,
        ty: LightType,
        index: usize,
        info: LightInfo,
    ) -> Result<(), LightsError> {
        let previous = *self.registry.info(ty, index)?;
        self.registry.update_light(ty, index, info)?;
        let stored = *self.registry.info(ty, index)?;

        match self.create_shadow(device, queue, scene_layouts, ty, &stored) {
            Ok(NewShadow::None) => {}
            Ok(NewShadow::Point(map)) => {
                std::mem::replace(&mut self.point_maps[index], map).release();
            }
            Ok(NewShadow::Cascade(map)) => {
                std::mem::replace(&mut self.cascade_maps[index], map).release();
            }
            Err(source) => {
                self.registry.update_light(ty, index, previous)?;
                return Err(LightsError::Resource {
                    light_type: ty,
                    source,
                });
            }
        }
        self.buffers[ty.index()].update_at(queue, index, &stored);

        log::debug!("Updated {} light {index}", ty.name());
        Ok(())
    }

    /// Remove the light at `index`. Later lights of `ty` shift down by one.
    pub fn delete_light(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        ty: LightType,
        index: usize,
    ) -> Result<LightInfo, LightsError> {
        let info = self.registry.delete_light(ty, index)?;
        match ty {
            LightType::PointShadowed => self.point_maps.remove(index).release(),
            LightType::DirectionalShadowed => self.cascade_maps.remove(index).release(),
            LightType::PointLight | LightType::DirectionalLight => {}
        }
        self.upload(device, queue, ty);
        self.debug_check_lockstep();

        log::info!("Deleted {} light {index}", ty.name());
        Ok(info)
    }

    /// Move a light between the shadowed and unshadowed list of its kind.
    ///
    /// The light is added to the destination before it leaves the source, so
    /// a failed shadow map allocation leaves both lists untouched. Returns the
    /// destination type and the light's new index there.
    pub fn change_shadowed(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        scene_layouts: &SceneLayouts,
        ty: LightType,
        index: usize,
    ) -> Result<(LightType, usize), LightsError> {
        let info = *self.registry.info(ty, index)?;
        let destination = ty.toggled_shadow();
        info.validate(destination)?;

        let new_index = self.add_light(device, queue, scene_layouts, destination, info)?;
        self.delete_light(device, queue, ty, index)?;
        Ok((destination, new_index))
    }

    fn create_shadow(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        scene_layouts: &SceneLayouts,
        ty: LightType,
        info: &LightInfo,
    ) -> Result<NewShadow, ResourceError> {
        let shadow = match ty {
            LightType::PointShadowed => NewShadow::Point(PointShadowMap::new(
                device,
                queue,
                scene_layouts,
                &self.shadow_layouts,
                &self.comparison_sampler,
                info,
            )?),
            LightType::DirectionalShadowed => NewShadow::Cascade(CascadeShadowMap::new(
                device,
                queue,
                scene_layouts,
                &self.shadow_layouts,
                &self.comparison_sampler,
                info,
                self.registry.cascade_count(),
            )?),
            LightType::PointLight | LightType::DirectionalLight => NewShadow::None,
        };
        Ok(shadow)
    }

    fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, ty: LightType) {
        self.buffers[ty.index()].upload_all(
            device,
            queue,
            &self.layouts.lights,
            self.registry.infos(ty),
        );
    }

    fn debug_check_lockstep(&self) {
        debug_assert_eq!(self.point_maps.len(), self.registry.len(LightType::PointShadowed));
        debug_assert_eq!(
            self.cascade_maps.len(),
            self.registry.len(LightType::DirectionalShadowed)
        );
    }

    /// Step every shadow schedule and redraw the faces that came due.
    ///
    /// New maps are cleared in full the first time through, so faces the
    /// schedule has not reached yet read as unoccluded.
    #[allow(clippy::too_many_arguments)]
    pub fn update_shadow_maps(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        scene_layouts: &SceneLayouts,
        view: SceneView<'_>,
        camera: &impl CascadeCamera,
        dt: f32,
    ) -> ShadowRefresh {
        for map in &mut self.point_maps {
            map.clear_if_new(encoder);
        }
        for map in &mut self.cascade_maps {
            map.clear_if_new(encoder);
        }

        let refresh = self.registry.refresh_shadows(dt, camera);
        for &(index, mask) in &refresh.points {
            if let Some(map) = self.point_maps.get(index) {
                map.render_faces(encoder, &self.shadow_pipelines, mask, view);
            }
        }

        if !refresh.cascades.is_empty() {
            let ranges = self.registry.splits().ranges(camera.near(), camera.far());
            let states = self.registry.cascade_shadows();
            for &(index, mask) in &refresh.cascades {
                let (Some(map), Some(state)) = (self.cascade_maps.get_mut(index), states.get(index))
                else {
                    continue;
                };
                map.write_cascades(device, queue, scene_layouts, state.transforms(), &ranges);
                map.render_cascades(encoder, &self.shadow_pipelines, mask, view);
            }
        }

        if !refresh.is_empty() {
            log::trace!(
                "Shadow refresh: {} point, {} cascade",
                refresh.points.len(),
                refresh.cascades.len()
            );
        }
        refresh
    }

    /// Create the light accumulation target matching `gbuffer`.
    ///
    /// Must be called again whenever the G-buffer is recreated.
    pub fn create_frame_buffer(
        &mut self,
        device: &wgpu::Device,
        gbuffer: &GBuffer,
        frame_uniform: &wgpu::Buffer,
    ) {
        let (width, height) = gbuffer.size();
        let (texture, view) = create_target(device, "light-accumulation", LIGHT_FORMAT, width, height);
        let gbuffer_bind_group = gbuffer.read_bind_group(device, &self.layouts.gbuffer, frame_uniform);
        if let Some(old) = self.target.replace(LightTarget {
            texture,
            view,
            gbuffer_bind_group,
        }) {
            old.texture.destroy();
        }
        log::debug!("Light target {width}x{height}");
    }

    /// Accumulated light of the last [`render_lights`](Self::render_lights).
    pub fn light_texture(&self) -> Option<&wgpu::TextureView> {
        self.target.as_ref().map(|target| &target.view)
    }

    /// Accumulate every light into the light target.
    ///
    /// Order: unshadowed point, unshadowed directional, then shadowed point
    /// and shadowed directional on pixels that receive shadows, and finally
    /// the shadowed lights without shadows on pixels that do not.
    pub fn render_lights(&self, encoder: &mut wgpu::CommandEncoder, gbuffer: &GBuffer) {
        let Some(target) = &self.target else {
            log::warn!("render_lights called before create_frame_buffer");
            return;
        };

        let mut pass = RenderPassBuilder::new("lights")
            .clear_color(&target.view, wgpu::Color::TRANSPARENT)
            .read_only_depth_stencil(&gbuffer.depth_view)
            .begin(encoder);
        pass.set_bind_group(0, &target.gbuffer_bind_group, &[]);
        pass.set_bind_group(1, self.buffers[0].bind_group(), &[]);

        self.draw_instanced(&mut pass, LightType::PointLight, &self.pipelines.point);
        self.draw_instanced(&mut pass, LightType::DirectionalLight, &self.pipelines.directional);

        pass.set_stencil_reference(StencilMode::Shadowed.reference());
        if !self.point_maps.is_empty() {
            pass.set_pipeline(&self.pipelines.point_shadowed);
            for map in &self.point_maps {
                pass.set_bind_group(2, map.bind_group(), &[]);
                pass.draw(0..6, 0..1);
            }
        }
        if !self.cascade_maps.is_empty() {
            pass.set_pipeline(&self.pipelines.directional_shadowed);
            for map in &self.cascade_maps {
                pass.set_bind_group(2, map.bind_group(), &[]);
                pass.draw(0..3, 0..1);
            }
        }

        pass.set_stencil_reference(StencilMode::Unshadowed.reference());
        self.draw_instanced(&mut pass, LightType::PointShadowed, &self.pipelines.point_unshadowed);
        self.draw_instanced(
            &mut pass,
            LightType::DirectionalShadowed,
            &self.pipelines.directional_unshadowed,
        );
    }

    /// One instance per light of `ty`: a six-vertex quad for point lights,
    /// a full-screen triangle for directional ones.
    fn draw_instanced(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        ty: LightType,
        pipeline: &wgpu::RenderPipeline,
    ) {
        let buffer = &self.buffers[ty.index()];
        if buffer.is_empty() {
            return;
        }
        let vertices = match ty.kind() {
            LightKind::Point => 0..6,
            LightKind::Directional => 0..3,
        };
        pass.set_pipeline(pipeline);
        pass.set_bind_group(1, buffer.bind_group(), &[]);
        pass.draw(vertices, 0..buffer.len() as u32);
    }

    /// Free every shadow map and the light target.
    pub fn release(self) {
        for map in self.point_maps {
            map.release();
        }
        for map in self.cascade_maps {
            map.release();
        }
        if let Some(target) = self.target {
            target.texture.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use umbra_lighting::{FaceMask, LightError};

    use super::*;
    use crate::camera::Camera;
    use crate::material::Material;
    use crate::mesh::MeshData;
    use crate::scene::{ObjectUniforms, Scene, SceneEntity};
    use crate::test_util::{create_test_device_queue, supports_depth_copies};

    struct Fixture {
        device: wgpu::Device,
        queue: wgpu::Queue,
        layouts: SceneLayouts,
        lights: Lights,
    }

    fn fixture() -> Option<Fixture> {
        let (device, queue) = create_test_device_queue()?;
        let layouts = SceneLayouts::new(&device);
        let mut shaders = ShaderLibrary::new();
        let lights = Lights::new(&device, &mut shaders, &layouts, CascadeSplits::default()).ok()?;
        Some(Fixture {
            device,
            queue,
            layouts,
            lights,
        })
    }

    fn point(x: f32) -> LightInfo {
        LightInfo::point(Vec3::ONE, Vec3::new(x, 2.0, 0.0)).with_shadow_resolution(64, 64)
    }

    fn sun() -> LightInfo {
        LightInfo::directional(Vec3::ONE, Vec3::new(-1.0, -2.0, -1.0)).with_shadow_resolution(128, 128)
    }

    #[test]
    fn test_too_many_cascades_is_an_error() {
        let Some((device, _queue)) = create_test_device_queue() else {
            return;
        };
        let layouts = SceneLayouts::new(&device);
        let mut shaders = ShaderLibrary::new();
        let splits = CascadeSplits::new((1..=40).map(|i| i as f32).collect());
        let result = Lights::new(&device, &mut shaders, &layouts, splits);
        assert!(matches!(
            result,
            Err(ResourceError::Light(LightError::TooManyCascades { count: 41, .. }))
        ));
    }

    #[test]
    fn test_light_buffer_keeps_one_slot() {
        let Some(Fixture { device, queue, lights, .. }) = fixture() else {
            return;
        };
        let mut buffer = LightBuffer::new(&device, &lights.layouts.lights, LightType::PointLight);
        assert_eq!(buffer.capacity(), 1);
        buffer.upload_all(&device, &queue, &lights.layouts.lights, &[]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 1);

        let infos = [point(0.0), point(1.0), point(2.0)];
        buffer.upload_all(&device, &queue, &lights.layouts.lights, &infos);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.capacity(), 4);
    }

    #[test]
    fn test_shadow_maps_follow_registry() {
        let Some(Fixture { device, queue, layouts, mut lights }) = fixture() else {
            return;
        };
        for x in 0..3 {
            lights
                .add_light(&device, &queue, &layouts, LightType::PointShadowed, point(x as f32))
                .unwrap();
        }
        lights
            .add_light(&device, &queue, &layouts, LightType::DirectionalShadowed, sun())
            .unwrap();
        assert_eq!(lights.point_shadow_maps().len(), 3);
        assert_eq!(lights.cascade_shadow_maps().len(), 1);
        assert_eq!(
            lights.cascade_shadow_maps()[0].cascade_count(),
            lights.registry().cascade_count()
        );

        lights.delete_light(&device, &queue, LightType::PointShadowed, 1).unwrap();
        assert_eq!(lights.point_shadow_maps().len(), 2);
        assert_eq!(lights.buffer(LightType::PointShadowed).len(), 2);
        assert_eq!(
            lights.info(LightType::PointShadowed, 1).unwrap().source,
            point(2.0).source
        );
    }

    #[test]
    fn test_failed_shadow_map_rolls_back() {
        let Some(Fixture { device, queue, layouts, mut lights }) = fixture() else {
            return;
        };
        let too_big = device.limits().max_texture_dimension_2d + 1;
        let info = point(0.0).with_shadow_resolution(too_big, too_big);
        let err = lights
            .add_light(&device, &queue, &layouts, LightType::PointShadowed, info)
            .unwrap_err();
        assert!(matches!(err, LightsError::Resource { light_type: LightType::PointShadowed, .. }));
        assert_eq!(lights.len(LightType::PointShadowed), 0);
        assert!(lights.point_shadow_maps().is_empty());

        lights
            .add_light(&device, &queue, &layouts, LightType::PointShadowed, point(0.0))
            .unwrap();
        let err = lights
            .update_light(&device, &queue, &layouts, LightType::PointShadowed, 0, info)
            .unwrap_err();
        assert!(matches!(err, LightsError::Resource { .. }));
        assert_eq!(*lights.info(LightType::PointShadowed, 0).unwrap(), {
            let mut stored = point(0.0);
            stored.cast_shadow = true;
            stored
        });
    }

    #[test]
    fn test_change_shadowed_moves_map() {
        let Some(Fixture { device, queue, layouts, mut lights }) = fixture() else {
            return;
        };
        lights
            .add_light(&device, &queue, &layouts, LightType::PointLight, point(5.0))
            .unwrap();
        let (ty, index) = lights
            .change_shadowed(&device, &queue, &layouts, LightType::PointLight, 0)
            .unwrap();
        assert_eq!((ty, index), (LightType::PointShadowed, 0));
        assert_eq!(lights.len(LightType::PointLight), 0);
        assert_eq!(lights.point_shadow_maps().len(), 1);

        let (ty, _) = lights.change_shadowed(&device, &queue, &layouts, ty, index).unwrap();
        assert_eq!(ty, LightType::PointLight);
        assert!(lights.point_shadow_maps().is_empty());
        let info = lights.info(LightType::PointLight, 0).unwrap();
        assert_eq!(info.source, point(5.0).source);
        assert_eq!(info.shadow_resolution, point(5.0).shadow_resolution);
    }

    #[test]
    fn test_out_of_range_reported() {
        let Some(Fixture { device, queue, mut lights, .. }) = fixture() else {
            return;
        };
        let err = lights
            .delete_light(&device, &queue, LightType::DirectionalLight, 0)
            .unwrap_err();
        assert!(matches!(
            err,
            LightsError::Light(LightError::IndexOutOfRange { index: 0, len: 0, .. })
        ));
    }

    #[test]
    fn test_point_shadow_round_robin_on_gpu() {
        let Some(Fixture { device, queue, layouts, mut lights }) = fixture() else {
            return;
        };
        lights
            .add_light(
                &device,
                &queue,
                &layouts,
                LightType::PointShadowed,
                point(0.0).with_refresh_frequency(1.0),
            )
            .unwrap();

        let scene = Scene::new();
        let objects = ObjectUniforms::new(&device, &layouts);
        let camera = Camera::default();
        let mut refreshed = [0u32; 6];
        for tick in 0..6 {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
            let refresh = lights.update_shadow_maps(
                &mut encoder,
                &device,
                &queue,
                &layouts,
                SceneView::new(&scene, &objects),
                &camera,
                1.0 / 6.0,
            );
            queue.submit([encoder.finish()]);

            assert_eq!(refresh.points, vec![(0, FaceMask::from_bits(1 << tick))]);
            for (_, mask) in &refresh.points {
                for face in mask.iter() {
                    refreshed[face] += 1;
                }
            }
        }
        assert_eq!(refreshed, [1; 6]);
    }

    /// Depth at the center texel of each cube face.
    fn read_face_centers(device: &wgpu::Device, queue: &wgpu::Queue, map: &PointShadowMap) -> [f32; 6] {
        let row = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("shadow-readback"),
            size: u64::from(row) * 6,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let center = map.size() / 2;
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: map.texture(),
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: center.x,
                    y: center.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::DepthOnly,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(row),
                    rows_per_image: Some(1),
                },
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 6,
            },
        );
        queue.submit([encoder.finish()]);

        let slice = buffer.slice(..);
        slice.map_async(wgpu::MapMode::Read, |_| {});
        device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .unwrap();
        let mapped = slice.get_mapped_range();
        std::array::from_fn(|face| {
            let start = face * row as usize;
            bytemuck::pod_read_unaligned::<f32>(&mapped[start..start + 4])
        })
    }

    #[test]
    fn test_clean_faces_keep_depth_until_redrawn() {
        if !supports_depth_copies() {
            return;
        }
        let Some(Fixture { device, queue, layouts, mut lights }) = fixture() else {
            return;
        };
        lights
            .add_light(
                &device,
                &queue,
                &layouts,
                LightType::PointShadowed,
                point(0.0).with_refresh_frequency(1.0),
            )
            .unwrap();

        // A box around the light puts a wall in front of every face.
        let mut walled = Scene::new();
        let white = walled.add_material(
            Material::solid(&device, &queue, &layouts.material, "white", [255; 4]).unwrap(),
        );
        let cube = std::sync::Arc::new(MeshData::cube(1.0).upload(&device, "cube"));
        walled.add_entity(
            SceneEntity::new("walls", cube, white)
                .with_position(Vec3::new(0.0, 2.0, 0.0))
                .with_scale(Vec3::splat(4.0)),
        );
        let mut walled_objects = ObjectUniforms::new(&device, &layouts);
        walled_objects.upload(&device, &queue, &layouts, &walled.entities);

        let empty = Scene::new();
        let empty_objects = ObjectUniforms::new(&device, &layouts);
        let step = |lights: &mut Lights, view: SceneView<'_>| {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
            let refresh = lights.update_shadow_maps(
                &mut encoder,
                &device,
                &queue,
                &layouts,
                view,
                &Camera::default(),
                1.0 / 6.0,
            );
            queue.submit([encoder.finish()]);
            refresh
        };

        // Face 0 sees the walls; the rest keep the initial clear.
        step(&mut lights, SceneView::new(&walled, &walled_objects));
        let depths = read_face_centers(&device, &queue, &lights.point_shadow_maps()[0]);
        assert!(depths[0] < 1.0, "face 0 depth {}", depths[0]);
        assert_eq!(&depths[1..], &[1.0; 5]);

        // Faces 1..5 redraw an empty scene; face 0 is clean and keeps the walls.
        for _ in 1..6 {
            step(&mut lights, SceneView::new(&empty, &empty_objects));
        }
        let depths = read_face_centers(&device, &queue, &lights.point_shadow_maps()[0]);
        assert!(depths[0] < 1.0, "face 0 depth {}", depths[0]);
        assert_eq!(&depths[1..], &[1.0; 5]);

        // The next sweep reaches face 0 again, clears it and finds nothing.
        let refresh = step(&mut lights, SceneView::new(&empty, &empty_objects));
        assert_eq!(refresh.points, vec![(0, FaceMask::from_bits(1))]);
        let depths = read_face_centers(&device, &queue, &lights.point_shadow_maps()[0]);
        assert_eq!(depths, [1.0; 6]);
    }

    #[test]
    fn test_render_lights_without_target_is_noop() {
        let Some(Fixture { device, queue, lights, .. }) = fixture() else {
            return;
        };
        let gbuffer = GBuffer::new(&device, 32, 32).unwrap();
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
        lights.render_lights(&mut encoder, &gbuffer);
        queue.submit([encoder.finish()]);
        assert!(lights.light_texture().is_none());
    }
}
