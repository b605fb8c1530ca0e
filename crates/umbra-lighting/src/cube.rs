//! Cube face view-projection transforms shared by point shadows and
//! environment captures.

use glam::{Mat4, Vec3};

use crate::schedule::CUBE_FACE_COUNT;

/// Look direction and up vector for each cube face, in layer order
/// +X, -X, +Y, -Y, +Z, -Z.
pub const CUBE_FACES: [(Vec3, Vec3); CUBE_FACE_COUNT] = [
    (Vec3::X, Vec3::NEG_Y),
    (Vec3::NEG_X, Vec3::NEG_Y),
    (Vec3::Y, Vec3::Z),
    (Vec3::NEG_Y, Vec3::NEG_Z),
    (Vec3::Z, Vec3::NEG_Y),
    (Vec3::NEG_Z, Vec3::NEG_Y),
];

/// Framebuffer row 0 is the top of the image, while cube sampling treats the
/// face's first row as the bottom of the up vector. Flipping Y keeps rendered
/// faces aligned with the sampling table above.
const CUBE_CLIP_FLIP: Mat4 = Mat4::from_cols_array(&[
    1.0, 0.0, 0.0, 0.0, //
    0.0, -1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
]);

/// 90 degree, square-aspect projection with standard `[0, 1]` depth.
pub fn cube_face_projection(near: f32, far: f32) -> Mat4 {
    CUBE_CLIP_FLIP * Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, near, far)
}

/// View-projection for every cube face around `center`.
pub fn cube_face_transforms(center: Vec3, near: f32, far: f32) -> [Mat4; CUBE_FACE_COUNT] {
    let projection = cube_face_projection(near, far);
    CUBE_FACES.map(|(dir, up)| projection * Mat4::look_at_rh(center, center + dir, up))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_face_centers_its_axis() {
        let center = Vec3::new(2.0, -1.0, 5.0);
        let transforms = cube_face_transforms(center, 0.1, 50.0);
        for (face, (dir, _)) in CUBE_FACES.iter().enumerate() {
            let ndc = transforms[face].project_point3(center + *dir * 10.0);
            assert!(
                ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4,
                "face {face} maps its axis to {ndc}"
            );
            assert!((0.0..=1.0).contains(&ndc.z), "face {face} depth {}", ndc.z);
        }
    }

    #[test]
    fn test_face_rejects_opposite_axis() {
        let transforms = cube_face_transforms(Vec3::ZERO, 0.1, 50.0);
        for (face, (dir, _)) in CUBE_FACES.iter().enumerate() {
            let clip = transforms[face] * (-*dir * 10.0).extend(1.0);
            assert!(clip.w < 0.0, "face {face} sees behind itself");
        }
    }

    #[test]
    fn test_up_vectors_match_cube_convention() {
        assert_eq!(CUBE_FACES[0].1, Vec3::NEG_Y);
        assert_eq!(CUBE_FACES[1].1, Vec3::NEG_Y);
        assert_eq!(CUBE_FACES[2].1, Vec3::Z);
        assert_eq!(CUBE_FACES[3].1, Vec3::NEG_Z);
        assert_eq!(CUBE_FACES[4].1, Vec3::NEG_Y);
        assert_eq!(CUBE_FACES[5].1, Vec3::NEG_Y);
    }

    #[test]
    fn test_far_plane_maps_to_one() {
        let transforms = cube_face_transforms(Vec3::ZERO, 0.5, 20.0);
        let ndc = transforms[4].project_point3(Vec3::new(0.0, 0.0, 20.0));
        assert!((ndc.z - 1.0).abs() < 1e-4, "far depth {}", ndc.z);
    }
}
