//! Renderable entities, their materials, and the draw loop every scene pass
//! shares.

use std::sync::Arc;

use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::bind_cache::BindCache;
use crate::buffer::{MeshBuffer, UniformSlots};
use crate::environment::{CapturePipeline, EnvironmentMap};
use crate::error::ResourceError;
use crate::layouts::{ObjectUniform, SceneLayouts};
use crate::material::{Material, MaterialId};

/// Bind group index of the per-entity transform in every scene pipeline.
pub const OBJECT_GROUP: u32 = 1;
/// Bind group index of the albedo material in pipelines that sample it.
pub const MATERIAL_GROUP: u32 = 2;

/// A mesh instance placed in the world.
pub struct SceneEntity {
    pub name: String,
    pub mesh: Arc<MeshBuffer>,
    pub material: MaterialId,
    pub position: Vec3,
    /// Euler angles in degrees, applied Y, then X, then Z.
    pub rotation: Vec3,
    pub scale: Vec3,
    pub tint: Vec3,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
    /// Whether environment captures see this entity.
    pub reflected: bool,
    environment: Option<EnvironmentMap>,
}

impl SceneEntity {
    pub fn new(name: impl Into<String>, mesh: Arc<MeshBuffer>, material: MaterialId) -> Self {
        Self {
            name: name.into(),
            mesh,
            material,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            tint: Vec3::ONE,
            cast_shadow: true,
            receive_shadow: true,
            reflected: true,
            environment: None,
        }
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_rotation(mut self, degrees: Vec3) -> Self {
        self.rotation = degrees;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_tint(mut self, tint: Vec3) -> Self {
        self.tint = tint;
        self
    }

    /// `T * (Ry * Rx * Rz) * S`.
    pub fn model_matrix(&self) -> Mat4 {
        let r = self.rotation * (std::f32::consts::PI / 180.0);
        let rotation = Quat::from_euler(EulerRot::YXZ, r.y, r.x, r.z);
        Mat4::from_scale_rotation_translation(self.scale, rotation, self.position)
    }

    /// Radius of the capture sphere used to clamp the reflection near plane.
    pub fn bounding_radius(&self) -> f32 {
        self.scale.abs().max_element()
    }

    pub fn environment(&self) -> Option<&EnvironmentMap> {
        self.environment.as_ref()
    }

    pub fn environment_mut(&mut self) -> Option<&mut EnvironmentMap> {
        self.environment.as_mut()
    }

    pub fn generates_reflection(&self) -> bool {
        self.environment.is_some()
    }

    /// Attach or drop this entity's environment capture.
    pub fn set_generate_reflection(
        &mut self,
        device: &wgpu::Device,
        layouts: &SceneLayouts,
        enabled: bool,
        resolution: u32,
    ) -> Result<(), ResourceError> {
        match (enabled, self.environment.take()) {
            (true, Some(map)) => self.environment = Some(map),
            (true, None) => {
                let map = EnvironmentMap::new(
                    device,
                    layouts,
                    self.position,
                    self.bounding_radius(),
                    resolution,
                )?;
                log::info!("Entity '{}' now captures reflections", self.name);
                self.environment = Some(map);
            }
            (false, Some(map)) => map.release(),
            (false, None) => {}
        }
        Ok(())
    }

    /// Move the entity, keeping its capture centered on it.
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.moved();
    }

    /// Re-center the environment capture after `position` or `scale` changed.
    pub fn moved(&mut self) {
        let (center, radius) = (self.position, self.bounding_radius());
        if let Some(map) = self.environment.as_mut() {
            map.update_position(center, radius);
        }
    }

    fn take_environment(&mut self) -> Option<EnvironmentMap> {
        self.environment.take()
    }

    fn restore_environment(&mut self, map: EnvironmentMap) {
        self.environment = Some(map);
    }
}

/// Materials plus the entities that reference them.
#[derive(Default)]
pub struct Scene {
    pub materials: Vec<Material>,
    pub entities: Vec<SceneEntity>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.materials.push(material);
        MaterialId(self.materials.len() - 1)
    }

    pub fn add_entity(&mut self, entity: SceneEntity) -> usize {
        debug_assert!(
            entity.material.0 < self.materials.len(),
            "entity '{}' references unknown material {:?}",
            entity.name,
            entity.material
        );
        self.entities.push(entity);
        self.entities.len() - 1
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0)
    }

    pub fn entity_mut(&mut self, index: usize) -> Option<&mut SceneEntity> {
        self.entities.get_mut(index)
    }
}

/// Per-frame transforms of every entity, one dynamic-offset slot each.
///
/// Slot `i` belongs to `scene.entities[i]`.
pub struct ObjectUniforms {
    slots: UniformSlots,
}

impl ObjectUniforms {
    pub fn new(device: &wgpu::Device, layouts: &SceneLayouts) -> Self {
        Self {
            slots: UniformSlots::new(
                device,
                &layouts.object,
                "object-uniforms",
                ObjectUniform::SIZE,
                16,
            ),
        }
    }

    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layouts: &SceneLayouts,
        entities: &[SceneEntity],
    ) {
        let uniforms: Vec<ObjectUniform> = entities
            .iter()
            .map(|entity| ObjectUniform::new(entity.model_matrix(), entity.tint))
            .collect();
        self.slots.write(device, queue, &layouts.object, &uniforms);
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        self.slots.bind_group()
    }

    pub fn offset(index: usize) -> u32 {
        UniformSlots::offset(index)
    }
}

/// What a scene pass draws from: entities, their materials and their slots.
#[derive(Clone, Copy)]
pub struct SceneView<'a> {
    pub entities: &'a [SceneEntity],
    pub materials: &'a [Material],
    pub objects: &'a ObjectUniforms,
}

impl<'a> SceneView<'a> {
    pub fn new(scene: &'a Scene, objects: &'a ObjectUniforms) -> Self {
        Self {
            entities: &scene.entities,
            materials: &scene.materials,
            objects,
        }
    }
}

/// Draw entity `index` of `view`.
///
/// The caller has already bound the pipeline and every group other than
/// [`OBJECT_GROUP`] and [`MATERIAL_GROUP`].
pub fn draw_entity(
    pass: &mut wgpu::RenderPass<'_>,
    view: SceneView<'_>,
    index: usize,
    cache: &mut BindCache,
    with_materials: bool,
) {
    let entity = &view.entities[index];
    if with_materials {
        let Some(material) = view.materials.get(entity.material.0) else {
            return;
        };
        cache.bind_material(pass, MATERIAL_GROUP, entity.material, &material.bind_group);
    }
    pass.set_bind_group(
        OBJECT_GROUP,
        view.objects.bind_group(),
        &[ObjectUniforms::offset(index)],
    );
    entity.mesh.bind(pass);
    entity.mesh.draw(pass);
}

/// Draw every entity accepted by `filter`.
pub fn draw_entities(
    pass: &mut wgpu::RenderPass<'_>,
    view: SceneView<'_>,
    cache: &mut BindCache,
    with_materials: bool,
    filter: impl Fn(&SceneEntity) -> bool,
) {
    for (index, entity) in view.entities.iter().enumerate() {
        if filter(entity) {
            draw_entity(pass, view, index, cache, with_materials);
        }
    }
}

/// Refresh the environment capture of every reflective entity.
///
/// Each owner is hidden from its own capture while it renders. Returns the
/// number of captures that redrew at least one face.
#[allow(clippy::too_many_arguments)]
pub fn update_reflections(
    encoder: &mut wgpu::CommandEncoder,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layouts: &SceneLayouts,
    pipeline: &CapturePipeline,
    scene: &mut Scene,
    objects: &ObjectUniforms,
    dt: f32,
) -> usize {
    let mut updated = 0;
    for index in 0..scene.entities.len() {
        let Some(mut map) = scene.entities[index].take_environment() else {
            continue;
        };
        let reflected = std::mem::replace(&mut scene.entities[index].reflected, false);
        let view = SceneView::new(scene, objects);
        let mask = map.update_scene(encoder, device, queue, layouts, pipeline, dt, view);
        if mask.is_some() {
            updated += 1;
        }
        let owner = &mut scene.entities[index];
        owner.reflected = reflected;
        owner.restore_environment(map);
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshData;
    use crate::test_util::create_test_device_queue;

    fn test_entity(device: &wgpu::Device) -> SceneEntity {
        let mesh = Arc::new(MeshData::cube(1.0).upload(device, "cube"));
        SceneEntity::new("cube", mesh, MaterialId(0))
    }

    #[test]
    fn test_model_matrix_order() {
        let Some((device, _queue)) = create_test_device_queue() else {
            return;
        };
        let entity = test_entity(&device)
            .with_position(Vec3::new(1.0, 2.0, 3.0))
            .with_rotation(Vec3::new(30.0, 45.0, 60.0))
            .with_scale(Vec3::new(2.0, 3.0, 4.0));
        let to_rad = |d: f32| d.to_radians();
        let expected = Mat4::from_translation(entity.position)
            * Mat4::from_rotation_y(to_rad(45.0))
            * Mat4::from_rotation_x(to_rad(30.0))
            * Mat4::from_rotation_z(to_rad(60.0))
            * Mat4::from_scale(entity.scale);
        assert!(entity.model_matrix().abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn test_entity_flag_defaults() {
        let Some((device, _queue)) = create_test_device_queue() else {
            return;
        };
        let entity = test_entity(&device);
        assert!(entity.cast_shadow);
        assert!(entity.receive_shadow);
        assert!(entity.reflected);
        assert!(!entity.generates_reflection());
    }

    #[test]
    fn test_generate_reflection_toggles_map() {
        let Some((device, _queue)) = create_test_device_queue() else {
            return;
        };
        let layouts = SceneLayouts::new(&device);
        let mut entity = test_entity(&device).with_position(Vec3::new(0.0, 5.0, 0.0));
        entity
            .set_generate_reflection(&device, &layouts, true, 64)
            .unwrap();
        assert_eq!(entity.environment().unwrap().center(), Vec3::new(0.0, 5.0, 0.0));

        entity.set_position(Vec3::new(1.0, 5.0, 0.0));
        assert_eq!(entity.environment().unwrap().center(), Vec3::new(1.0, 5.0, 0.0));

        entity
            .set_generate_reflection(&device, &layouts, false, 64)
            .unwrap();
        assert!(!entity.generates_reflection());
    }

    #[test]
    fn test_update_reflections_restores_owner() {
        let Some((device, queue)) = create_test_device_queue() else {
            return;
        };
        let layouts = SceneLayouts::new(&device);
        let mut shaders = crate::shader::ShaderLibrary::new();
        let pipeline = CapturePipeline::new(&device, &mut shaders, &layouts).unwrap();
        let mut scene = Scene::new();
        let white = Material::solid(&device, &queue, &layouts.material, "white", [255; 4]).unwrap();
        scene.add_material(white);
        let mut mirror = test_entity(&device);
        mirror
            .set_generate_reflection(&device, &layouts, true, 32)
            .unwrap();
        scene.add_entity(mirror);
        scene.add_entity(test_entity(&device));

        let mut objects = ObjectUniforms::new(&device, &layouts);
        objects.upload(&device, &queue, &layouts, &scene.entities);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
        let updated = update_reflections(
            &mut encoder,
            &device,
            &queue,
            &layouts,
            &pipeline,
            &mut scene,
            &objects,
            1.0,
        );
        queue.submit([encoder.finish()]);

        assert_eq!(updated, 1);
        assert!(scene.entities[0].reflected);
        assert!(scene.entities[0].generates_reflection());
    }
}
