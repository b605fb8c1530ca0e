//! Cascaded shadow map math for directional lights.
//!
//! The camera frustum is cut into depth slices. Each slice gets an
//! orthographic light-space projection that tightly encloses its eight world
//! corners, with the depth range padded so casters outside the slice still
//! land in the map.

use glam::{Mat4, Vec3, Vec4};

/// Depth padding factor applied to the light-space z bounds.
pub const Z_MULTIPLIER: f32 = 10.0;

/// Camera queries needed to build cascade transforms.
pub trait CascadeCamera {
    fn near(&self) -> f32;
    fn far(&self) -> f32;
    /// Projection-view matrix of the sub-frustum between `near` and `far`.
    fn frustum_range(&self, near: f32, far: f32) -> Mat4;
}

/// Split distances between cascades, in view-space units.
#[derive(Clone, Debug, PartialEq)]
pub struct CascadeSplits(Vec<f32>);

impl Default for CascadeSplits {
    fn default() -> Self {
        Self(vec![1000.0 / 50.0, 1000.0 / 25.0, 1000.0 / 10.0, 1000.0 / 2.0])
    }
}

impl CascadeSplits {
    /// Splits are sorted ascending; non-finite or non-positive values are dropped.
    pub fn new(mut splits: Vec<f32>) -> Self {
        splits.retain(|s| s.is_finite() && *s > 0.0);
        splits.sort_by(f32::total_cmp);
        splits.dedup();
        Self(splits)
    }

    /// `cascade_count - 1` splits spread logarithmically up to `far`.
    pub fn with_count(cascade_count: usize, near: f32, far: f32) -> Self {
        let count = cascade_count.max(1);
        let near = near.max(1e-3);
        let splits = (1..count)
            .map(|i| near * (far / near).powf(i as f32 / count as f32))
            .collect();
        Self::new(splits)
    }

    pub fn splits(&self) -> &[f32] {
        &self.0
    }

    /// Number of cascades these splits produce.
    pub fn cascade_count(&self) -> usize {
        self.0.len() + 1
    }

    /// Contiguous `(near, far)` ranges from the camera near plane to its far
    /// plane. Splits outside `(near, far)` are clamped to the camera range.
    pub fn ranges(&self, near: f32, far: f32) -> Vec<(f32, f32)> {
        let mut bounds = Vec::with_capacity(self.0.len() + 2);
        bounds.push(near);
        bounds.extend(self.0.iter().map(|s| s.clamp(near, far)));
        bounds.push(far);
        bounds.windows(2).map(|w| (w[0], w[1])).collect()
    }
}

/// The eight world-space corners of the frustum described by `proj_view`.
pub fn frustum_corners_world(proj_view: Mat4) -> [Vec3; 8] {
    let inverse = proj_view.inverse();
    let mut corners = [Vec3::ZERO; 8];
    let mut i = 0;
    for x in [-1.0, 1.0] {
        for y in [-1.0, 1.0] {
            for z in [0.0, 1.0] {
                let point = inverse * Vec4::new(x, y, z, 1.0);
                corners[i] = point.truncate() / point.w;
                i += 1;
            }
        }
    }
    corners
}

/// Widen light-space depth bounds away from zero by `multiplier`.
pub fn pad_depth_bounds(min_z: f32, max_z: f32, multiplier: f32) -> (f32, f32) {
    let min_z = if min_z < 0.0 {
        min_z * multiplier
    } else {
        min_z / multiplier
    };
    let max_z = if max_z < 0.0 {
        max_z / multiplier
    } else {
        max_z * multiplier
    };
    (min_z, max_z)
}

/// Orthographic light-space transform enclosing the frustum `proj_view`.
pub fn light_space_matrix(proj_view: Mat4, light_dir: Vec3) -> Mat4 {
    let corners = frustum_corners_world(proj_view);
    let center = corners.iter().copied().sum::<Vec3>() / corners.len() as f32;

    let light_dir = light_dir.normalize_or_zero();
    let up = if light_dir.y.abs() > 0.99 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let light_view = Mat4::look_at_rh(center + light_dir, center, up);

    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for corner in corners {
        let ls = light_view.transform_point3(corner);
        min = min.min(ls);
        max = max.max(ls);
    }

    let (min_z, max_z) = pad_depth_bounds(min.z, max.z, Z_MULTIPLIER);
    Mat4::orthographic_rh(min.x, max.x, min.y, max.y, min_z, max_z) * light_view
}

/// Light-space transform for the camera slice `range`.
pub fn cascade_transform(camera: &impl CascadeCamera, range: (f32, f32), light_dir: Vec3) -> Mat4 {
    let (near, far) = range;
    // Clamped splits can collapse a range; keep the projection invertible.
    let far = far.max(near + 1e-3);
    light_space_matrix(camera.frustum_range(near, far), light_dir)
}

/// One light-space transform per cascade range of `camera`.
pub fn cascade_transforms(
    camera: &impl CascadeCamera,
    splits: &CascadeSplits,
    light_dir: Vec3,
) -> Vec<Mat4> {
    splits
        .ranges(camera.near(), camera.far())
        .into_iter()
        .map(|range| cascade_transform(camera, range, light_dir))
        .collect()
}
