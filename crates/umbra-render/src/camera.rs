//! Viewer camera with reverse-Z projection and the per-frame camera uniform.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use umbra_lighting::CascadeCamera;

/// Look-at perspective camera.
///
/// The main view uses reverse-Z (near maps to 1, far to 0). Cascade
/// sub-frusta from [`CascadeCamera::frustum_range`] use standard `[0, 1]`
/// depth, which is what the corner extraction expects.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub aspect_ratio: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y: std::f32::consts::FRAC_PI_4,
            aspect_ratio: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Camera {
    pub fn look_at(eye: Vec3, target: Vec3) -> Self {
        Self {
            eye,
            target,
            ..Self::default()
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    /// Reverse-Z perspective: near and far are swapped.
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect_ratio, self.far, self.near)
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn set_aspect_ratio(&mut self, width: f32, height: f32) {
        if height > 0.0 {
            self.aspect_ratio = width / height;
        }
    }

    pub fn to_uniform(&self, width: u32, height: u32) -> FrameUniform {
        let view = self.view_matrix();
        let proj = self.projection_matrix();
        let (w, h) = (width.max(1) as f32, height.max(1) as f32);
        FrameUniform {
            view: view.to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
            inv_proj: proj.inverse().to_cols_array_2d(),
            inv_view: view.inverse().to_cols_array_2d(),
            camera_pos: self.eye.extend(1.0).to_array(),
            screen: [w, h, 1.0 / w, 1.0 / h],
            depth_range: [self.near, self.far, 0.0, 0.0],
        }
    }
}

impl CascadeCamera for Camera {
    fn near(&self) -> f32 {
        self.near
    }

    fn far(&self) -> f32 {
        self.far
    }

    fn frustum_range(&self, near: f32, far: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect_ratio, near, far) * self.view_matrix()
    }
}

/// Camera data shared by every screen-space pass, `@group(0) @binding(0)`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct FrameUniform {
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub inv_proj: [[f32; 4]; 4],
    pub inv_view: [[f32; 4]; 4],
    /// xyz = eye position, w = 1.
    pub camera_pos: [f32; 4],
    /// width, height, 1/width, 1/height.
    pub screen: [f32; 4],
    /// near, far, unused, unused.
    pub depth_range: [f32; 4],
}

impl FrameUniform {
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_uniform_size() {
        assert_eq!(FrameUniform::SIZE, 304);
    }

    #[test]
    fn test_reverse_z_maps_near_to_one() {
        let camera = Camera::look_at(Vec3::ZERO, Vec3::NEG_Z);
        let vp = camera.view_projection_matrix();
        let near = vp.project_point3(Vec3::new(0.0, 0.0, -camera.near));
        let far = vp.project_point3(Vec3::new(0.0, 0.0, -camera.far));
        assert!((near.z - 1.0).abs() < 1e-4, "near depth {}", near.z);
        assert!(far.z.abs() < 1e-4, "far depth {}", far.z);
    }

    #[test]
    fn test_frustum_range_uses_standard_depth() {
        let camera = Camera::look_at(Vec3::ZERO, Vec3::NEG_Z);
        let m = camera.frustum_range(2.0, 8.0);
        assert!(m.project_point3(Vec3::new(0.0, 0.0, -2.0)).z.abs() < 1e-4);
        assert!((m.project_point3(Vec3::new(0.0, 0.0, -8.0)).z - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_uniform_inverse_projection_round_trips() {
        let camera = Camera::look_at(Vec3::new(10.0, 40.0, 10.0), Vec3::new(0.0, 15.0, 0.0));
        let uniform = camera.to_uniform(1280, 720);
        let proj = Mat4::from_cols_array_2d(&uniform.proj);
        let inv = Mat4::from_cols_array_2d(&uniform.inv_proj);
        assert!((proj * inv).abs_diff_eq(Mat4::IDENTITY, 1e-3));
        assert_eq!(uniform.screen[0], 1280.0);
        assert_eq!(uniform.screen[3], 1.0 / 720.0);
    }

    #[test]
    fn test_aspect_ignores_zero_height() {
        let mut camera = Camera::default();
        camera.set_aspect_ratio(800.0, 0.0);
        assert_eq!(camera.aspect_ratio, 16.0 / 9.0);
        camera.set_aspect_ratio(800.0, 400.0);
        assert_eq!(camera.aspect_ratio, 2.0);
    }
}
