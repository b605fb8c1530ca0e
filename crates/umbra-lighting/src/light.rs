//! Light descriptors: [`LightInfo`], [`LightSource`], [`LightType`], and the
//! GPU record [`LightGpu`] mirrored into per-type storage buffers.

use bytemuck::{Pod, Zeroable};
use glam::{UVec2, Vec3};

use crate::error::LightError;

/// Where a light sits or which way it shines.
///
/// Point lights carry a world position, directional lights a direction. The
/// two never alias.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightSource {
    Point { position: Vec3 },
    Directional { direction: Vec3 },
}

impl LightSource {
    /// Geometric kind of this source.
    pub fn kind(&self) -> LightKind {
        match self {
            LightSource::Point { .. } => LightKind::Point,
            LightSource::Directional { .. } => LightKind::Directional,
        }
    }
}

/// Geometric kind shared by the shadowed and unshadowed variant of a light.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LightKind {
    Point,
    Directional,
}

/// The four light collections. Shadowed and unshadowed lights of the same
/// kind live in distinct collections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LightType {
    PointLight,
    DirectionalLight,
    PointShadowed,
    DirectionalShadowed,
}

impl LightType {
    /// All variants, in collection index order.
    pub const ALL: [LightType; 4] = [
        LightType::PointLight,
        LightType::DirectionalLight,
        LightType::PointShadowed,
        LightType::DirectionalShadowed,
    ];

    /// Index of this collection in [`LightType::ALL`].
    pub fn index(self) -> usize {
        match self {
            LightType::PointLight => 0,
            LightType::DirectionalLight => 1,
            LightType::PointShadowed => 2,
            LightType::DirectionalShadowed => 3,
        }
    }

    pub fn is_shadowed(self) -> bool {
        matches!(
            self,
            LightType::PointShadowed | LightType::DirectionalShadowed
        )
    }

    pub fn kind(self) -> LightKind {
        match self {
            LightType::PointLight | LightType::PointShadowed => LightKind::Point,
            LightType::DirectionalLight | LightType::DirectionalShadowed => LightKind::Directional,
        }
    }

    /// Same geometric kind with the opposite shadow state.
    pub fn toggled_shadow(self) -> LightType {
        match self {
            LightType::PointLight => LightType::PointShadowed,
            LightType::PointShadowed => LightType::PointLight,
            LightType::DirectionalLight => LightType::DirectionalShadowed,
            LightType::DirectionalShadowed => LightType::DirectionalLight,
        }
    }

    /// Human-readable collection name, used in logs and labels.
    pub fn name(self) -> &'static str {
        match self {
            LightType::PointLight => "point",
            LightType::DirectionalLight => "directional",
            LightType::PointShadowed => "point-shadowed",
            LightType::DirectionalShadowed => "directional-shadowed",
        }
    }
}

/// Parameters of one light.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightInfo {
    /// Linear RGB color. Its channel sum drives intensity and radius.
    pub color: Vec3,
    pub source: LightSource,
    /// Shadow map size. Point lights use `x` for every cube face; directional
    /// lights use `x` by `y` per cascade slice.
    pub shadow_resolution: UVec2,
    /// Full face sweeps per second.
    pub refresh_frequency: f32,
    pub cast_shadow: bool,
}

impl Default for LightInfo {
    fn default() -> Self {
        Self {
            color: Vec3::ZERO,
            source: LightSource::Point {
                position: Vec3::ZERO,
            },
            shadow_resolution: UVec2::new(1024, 1024),
            refresh_frequency: 1.0,
            cast_shadow: false,
        }
    }
}

impl LightInfo {
    pub fn point(color: Vec3, position: Vec3) -> Self {
        Self {
            color,
            source: LightSource::Point { position },
            ..Self::default()
        }
    }

    pub fn directional(color: Vec3, direction: Vec3) -> Self {
        Self {
            color,
            source: LightSource::Directional { direction },
            ..Self::default()
        }
    }

    pub fn with_shadow_resolution(mut self, width: u32, height: u32) -> Self {
        self.shadow_resolution = UVec2::new(width, height);
        self
    }

    pub fn with_refresh_frequency(mut self, frequency: f32) -> Self {
        self.refresh_frequency = frequency;
        self
    }

    /// Sum of the color channels.
    pub fn luminance(&self) -> f32 {
        self.color.x + self.color.y + self.color.z
    }

    /// Scalar intensity uploaded alongside the color: `sqrt(sum(rgb) / 0.05)`.
    pub fn intensity(&self) -> f32 {
        (self.luminance() / 0.05).max(0.0).sqrt()
    }

    /// Effective range of a point light: `sqrt(sum(rgb) * 25)`.
    pub fn point_radius(&self) -> f32 {
        (self.luminance() * 25.0).max(0.0).sqrt()
    }

    /// Pixel size of one shadow face or cascade slice.
    pub fn shadow_map_size(&self) -> UVec2 {
        match self.source {
            LightSource::Point { .. } => UVec2::splat(self.shadow_resolution.x),
            LightSource::Directional { .. } => self.shadow_resolution,
        }
    }

    /// Check the invariants required to store this light in collection `ty`.
    pub fn validate(&self, ty: LightType) -> Result<(), LightError> {
        if self.source.kind() != ty.kind() {
            return Err(LightError::SourceMismatch {
                light_type: ty,
                source_kind: self.source.kind(),
            });
        }
        if !(self.refresh_frequency.is_finite() && self.refresh_frequency > 0.0) {
            return Err(LightError::InvalidRefreshFrequency(self.refresh_frequency));
        }
        let size = self.shadow_map_size();
        if size.x == 0 || size.y == 0 {
            return Err(LightError::InvalidResolution {
                width: size.x,
                height: size.y,
            });
        }
        if let LightSource::Directional { direction } = self.source
            && direction.length_squared() <= f32::EPSILON
        {
            return Err(LightError::ZeroDirection);
        }
        Ok(())
    }
}

/// Per-light GPU data, 48 bytes, std430-compatible.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LightGpu {
    /// xyz = color (linear RGB), w = intensity.
    pub color_intensity: [f32; 4],
    /// xyz = world position (w = 1) or normalized direction (w = 0).
    pub position_or_direction: [f32; 4],
    /// x = point radius, yzw unused.
    pub params: [f32; 4],
}

static_assertions::assert_eq_size!(LightGpu, [u8; 48]);

impl From<&LightInfo> for LightGpu {
    fn from(info: &LightInfo) -> Self {
        let position_or_direction = match info.source {
            LightSource::Point { position } => position.extend(1.0),
            LightSource::Directional { direction } => direction.normalize_or_zero().extend(0.0),
        };
        Self {
            color_intensity: info.color.extend(info.intensity()).to_array(),
            position_or_direction: position_or_direction.to_array(),
            params: [info.point_radius(), 0.0, 0.0, 0.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_light_info() {
        let info = LightInfo::default();
        assert_eq!(info.color, Vec3::ZERO);
        assert_eq!(
            info.source,
            LightSource::Point {
                position: Vec3::ZERO
            }
        );
        assert_eq!(info.shadow_resolution, UVec2::new(1024, 1024));
        assert_eq!(info.refresh_frequency, 1.0);
        assert!(!info.cast_shadow);
    }

    #[test]
    fn test_point_radius_formula() {
        let info = LightInfo::point(Vec3::splat(10.0), Vec3::ZERO);
        let expected = (30.0f32 * 25.0).sqrt();
        assert!(
            (info.point_radius() - expected).abs() < 1e-5,
            "radius {} != {expected}",
            info.point_radius()
        );
    }

    #[test]
    fn test_intensity_formula() {
        let info = LightInfo::point(Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO);
        let expected = (6.0f32 / 0.05).sqrt();
        assert!((info.intensity() - expected).abs() < 1e-4);
    }

    #[test]
    fn test_point_shadow_size_is_square() {
        let info = LightInfo::point(Vec3::ONE, Vec3::ZERO).with_shadow_resolution(512, 2048);
        assert_eq!(info.shadow_map_size(), UVec2::new(512, 512));
        let dir = LightInfo::directional(Vec3::ONE, Vec3::NEG_Y).with_shadow_resolution(512, 256);
        assert_eq!(dir.shadow_map_size(), UVec2::new(512, 256));
    }

    #[test]
    fn test_validate_rejects_bad_frequency() {
        let info = LightInfo::point(Vec3::ONE, Vec3::ZERO).with_refresh_frequency(0.0);
        assert!(matches!(
            info.validate(LightType::PointLight),
            Err(LightError::InvalidRefreshFrequency(_))
        ));
        let nan = LightInfo::point(Vec3::ONE, Vec3::ZERO).with_refresh_frequency(f32::NAN);
        assert!(nan.validate(LightType::PointShadowed).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_resolution() {
        let info = LightInfo::directional(Vec3::ONE, Vec3::NEG_Y).with_shadow_resolution(1024, 0);
        assert!(matches!(
            info.validate(LightType::DirectionalShadowed),
            Err(LightError::InvalidResolution { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_kind_mismatch() {
        let info = LightInfo::point(Vec3::ONE, Vec3::ZERO);
        assert!(matches!(
            info.validate(LightType::DirectionalLight),
            Err(LightError::SourceMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_direction() {
        let info = LightInfo::directional(Vec3::ONE, Vec3::ZERO);
        assert_eq!(
            info.validate(LightType::DirectionalLight),
            Err(LightError::ZeroDirection)
        );
    }

    #[test]
    fn test_toggled_shadow_keeps_kind() {
        for ty in LightType::ALL {
            let toggled = ty.toggled_shadow();
            assert_eq!(ty.kind(), toggled.kind());
            assert_ne!(ty.is_shadowed(), toggled.is_shadowed());
            assert_eq!(toggled.toggled_shadow(), ty);
        }
    }

    #[test]
    fn test_light_type_indices_are_distinct() {
        for (i, ty) in LightType::ALL.iter().enumerate() {
            assert_eq!(ty.index(), i);
        }
    }

    #[test]
    fn test_light_gpu_encodes_kind_in_w() {
        let point = LightGpu::from(&LightInfo::point(Vec3::ONE, Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(point.position_or_direction, [1.0, 2.0, 3.0, 1.0]);
        let dir = LightGpu::from(&LightInfo::directional(Vec3::ONE, Vec3::new(0.0, -2.0, 0.0)));
        assert_eq!(dir.position_or_direction, [0.0, -1.0, 0.0, 0.0]);
    }
}
