//! The showcase scene: a ground plane, boxes, spheres, one mirror sphere and
//! a handful of lights.

use std::sync::Arc;

use glam::Vec3;
use tracing::{info, warn};
use umbra_config::RenderConfig;
use umbra_lighting::{LightInfo, LightType};
use umbra_render::{DeferredRenderer, Material, MeshData, ResourceError, Scene, SceneEntity};

/// Where the viewer starts and what it looks at.
pub const CAMERA_START: Vec3 = Vec3::new(10.0, 40.0, 10.0);
pub const CAMERA_TARGET: Vec3 = Vec3::new(0.0, 15.0, 0.0);

/// Name of the box that circles the mirror sphere.
pub const ORBITER: &str = "orbiter";
const ORBIT_RADIUS: f32 = 9.0;
const ORBIT_HEIGHT: f32 = 6.0;

/// Build the demo entities. The mirror sphere captures its surroundings at
/// the configured environment resolution and frequency.
pub fn build_scene(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    renderer: &DeferredRenderer,
    render: &RenderConfig,
) -> Result<Scene, ResourceError> {
    let layout = &renderer.layouts().material;
    let mut scene = Scene::new();

    let ground_mat = scene.add_material(Material::checker(
        device,
        queue,
        layout,
        "ground",
        8,
        [200, 200, 200, 255],
        [120, 120, 130, 255],
    )?);
    let red = scene.add_material(Material::solid(device, queue, layout, "red", [200, 60, 50, 255])?);
    let blue = scene.add_material(Material::solid(device, queue, layout, "blue", [60, 90, 200, 255])?);
    let white = scene.add_material(Material::solid(device, queue, layout, "white", [235, 235, 235, 255])?);

    let plane = Arc::new(MeshData::plane(120.0, 12.0).upload(device, "plane"));
    let cube = Arc::new(MeshData::cube(1.0).upload(device, "cube"));
    let sphere = Arc::new(MeshData::uv_sphere(1.0, 32, 16).upload(device, "sphere"));

    let mut ground = SceneEntity::new("ground", plane, ground_mat);
    ground.cast_shadow = false;
    scene.add_entity(ground);

    scene.add_entity(
        SceneEntity::new(ORBITER, Arc::clone(&cube), red)
            .with_position(Vec3::new(ORBIT_RADIUS, ORBIT_HEIGHT, 0.0))
            .with_scale(Vec3::splat(2.0)),
    );
    let boxes = [
        (Vec3::new(-12.0, 3.0, -6.0), Vec3::new(6.0, 6.0, 6.0), 0.0),
        (Vec3::new(14.0, 4.0, -14.0), Vec3::new(4.0, 8.0, 4.0), 30.0),
        (Vec3::new(-6.0, 10.0, 14.0), Vec3::new(3.0, 20.0, 3.0), 15.0),
    ];
    for (i, (position, scale, yaw)) in boxes.into_iter().enumerate() {
        scene.add_entity(
            SceneEntity::new(format!("box-{i}"), Arc::clone(&cube), blue)
                .with_position(position)
                .with_scale(scale)
                .with_rotation(Vec3::new(0.0, yaw, 0.0)),
        );
    }

    for (i, position) in [Vec3::new(-4.0, 2.0, 8.0), Vec3::new(6.0, 3.0, 10.0)]
        .into_iter()
        .enumerate()
    {
        scene.add_entity(
            SceneEntity::new(format!("sphere-{i}"), Arc::clone(&sphere), white)
                .with_position(position)
                .with_scale(Vec3::splat(2.0 + i as f32)),
        );
    }

    // Glass-like ball that never darkens under shadowed lights.
    let mut ghost = SceneEntity::new("ghost", Arc::clone(&sphere), white)
        .with_position(Vec3::new(-10.0, 2.0, 4.0))
        .with_scale(Vec3::splat(1.5))
        .with_tint(Vec3::new(0.6, 1.0, 0.8));
    ghost.receive_shadow = false;
    scene.add_entity(ghost);

    let mut mirror = SceneEntity::new("mirror", sphere, white)
        .with_position(Vec3::new(0.0, 5.0, 0.0))
        .with_scale(Vec3::splat(4.0));
    mirror.set_generate_reflection(device, renderer.layouts(), true, render.environment_resolution)?;
    if let Some(environment) = mirror.environment_mut() {
        environment.set_frequency(render.environment_frequency);
    }
    scene.add_entity(mirror);

    info!(
        entities = scene.entities.len(),
        materials = scene.materials.len(),
        "demo scene built"
    );
    Ok(scene)
}

/// The sun, one shadowed point light and a few unshadowed fill lights.
///
/// Lights that fail to create are logged and skipped.
pub fn default_lights(shadow_resolution: u32) -> Vec<(LightType, LightInfo)> {
    vec![
        (
            LightType::DirectionalShadowed,
            LightInfo::directional(Vec3::new(0.9, 0.85, 0.75), Vec3::new(-0.4, -1.0, -0.3))
                .with_shadow_resolution(shadow_resolution, shadow_resolution)
                .with_refresh_frequency(4.0),
        ),
        (
            LightType::PointShadowed,
            LightInfo::point(Vec3::new(1.5, 1.2, 0.8), Vec3::new(0.0, 14.0, 0.0))
                .with_shadow_resolution(shadow_resolution / 2, shadow_resolution / 2)
                .with_refresh_frequency(2.0),
        ),
        (
            LightType::PointLight,
            LightInfo::point(Vec3::new(0.8, 0.1, 0.1), Vec3::new(-15.0, 3.0, -15.0)),
        ),
        (
            LightType::PointLight,
            LightInfo::point(Vec3::new(0.1, 0.8, 0.2), Vec3::new(15.0, 3.0, 15.0)),
        ),
        (
            LightType::PointLight,
            LightInfo::point(Vec3::new(0.1, 0.2, 0.9), Vec3::new(-15.0, 3.0, 15.0)),
        ),
    ]
}

/// Register `lights` with the renderer. Returns how many were added.
pub fn add_lights(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    renderer: &mut DeferredRenderer,
    lights: Vec<(LightType, LightInfo)>,
) -> usize {
    let mut added = 0;
    for (ty, info) in lights {
        match renderer.add_light(device, queue, ty, info) {
            Ok(_) => added += 1,
            Err(e) => warn!("Skipping {} light: {e}", ty.name()),
        }
    }
    added
}

/// Position of the orbiting box `time` seconds in.
pub fn orbiter_position(time: f32) -> Vec3 {
    let angle = time * 0.5;
    Vec3::new(
        angle.cos() * ORBIT_RADIUS,
        ORBIT_HEIGHT,
        angle.sin() * ORBIT_RADIUS,
    )
}

/// Viewer position `time` seconds in: a slow circle at the start height.
pub fn camera_eye(time: f32) -> Vec3 {
    let start = CAMERA_START - CAMERA_TARGET;
    let radius = Vec3::new(start.x, 0.0, start.z).length();
    let angle = start.z.atan2(start.x) + time * 0.1;
    Vec3::new(
        CAMERA_TARGET.x + angle.cos() * radius,
        CAMERA_START.y,
        CAMERA_TARGET.z + angle.sin() * radius,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_starts_at_configured_eye() {
        assert!(camera_eye(0.0).abs_diff_eq(CAMERA_START, 1e-4));
    }

    #[test]
    fn test_camera_orbit_keeps_height_and_distance() {
        let start = (CAMERA_START - CAMERA_TARGET).length();
        for t in [1.0, 10.0, 100.0] {
            let eye = camera_eye(t);
            assert_eq!(eye.y, CAMERA_START.y);
            assert!(((eye - CAMERA_TARGET).length() - start).abs() < 1e-3);
        }
    }

    #[test]
    fn test_orbiter_stays_on_circle() {
        for t in [0.0, 2.5, 7.0] {
            let p = orbiter_position(t);
            assert!((Vec3::new(p.x, 0.0, p.z).length() - ORBIT_RADIUS).abs() < 1e-4);
            assert_eq!(p.y, ORBIT_HEIGHT);
        }
    }

    #[test]
    fn test_default_lights_cover_every_type() {
        let lights = default_lights(1024);
        for ty in [
            LightType::PointLight,
            LightType::PointShadowed,
            LightType::DirectionalShadowed,
        ] {
            assert!(lights.iter().any(|(t, _)| *t == ty));
        }
        for (ty, info) in &lights {
            assert!(info.validate(*ty).is_ok(), "{ty:?} light is invalid");
        }
    }
}
