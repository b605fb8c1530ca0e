//! CPU state of the shadow entries: refresh phase, point radius, and the
//! cascade transform snapshot used for shading.

use glam::Mat4;

use crate::light::LightInfo;
use crate::schedule::{FaceMask, RefreshSchedule};

/// Scheduling state of one shadow-casting point light.
#[derive(Clone, Debug, PartialEq)]
pub struct PointShadowState {
    schedule: RefreshSchedule,
    radius: f32,
}

impl PointShadowState {
    pub fn new(info: &LightInfo) -> Self {
        Self {
            schedule: RefreshSchedule::cube(),
            radius: info.point_radius(),
        }
    }

    /// Far plane of the cube face projections.
    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn schedule(&self) -> &RefreshSchedule {
        &self.schedule
    }

    /// Advance the refresh phase; `Some` lists the faces to clear and redraw.
    pub fn update(&mut self, frequency: f32, dt: f32) -> Option<FaceMask> {
        self.schedule.advance(frequency, dt)
    }
}

/// Scheduling state and transform snapshot of one cascaded directional light.
#[derive(Clone, Debug, PartialEq)]
pub struct CascadeShadowState {
    schedule: RefreshSchedule,
    transforms: Vec<Mat4>,
}

impl CascadeShadowState {
    pub fn new(cascade_count: usize) -> Self {
        Self {
            schedule: RefreshSchedule::new(cascade_count),
            transforms: vec![Mat4::IDENTITY; cascade_count],
        }
    }

    pub fn cascade_count(&self) -> usize {
        self.transforms.len()
    }

    /// Light-space transform per slice, as last rendered.
    pub fn transforms(&self) -> &[Mat4] {
        &self.transforms
    }

    pub fn schedule(&self) -> &RefreshSchedule {
        &self.schedule
    }

    /// Advance the refresh phase and snapshot `fresh[i]` for each dirty slice.
    pub fn update(&mut self, frequency: f32, dt: f32, fresh: &[Mat4]) -> Option<FaceMask> {
        debug_assert_eq!(fresh.len(), self.transforms.len());
        self.update_with(frequency, dt, |slice| fresh[slice])
    }

    /// Like [`update`](Self::update), computing transforms only for dirty slices.
    pub fn update_with(
        &mut self,
        frequency: f32,
        dt: f32,
        mut transform: impl FnMut(usize) -> Mat4,
    ) -> Option<FaceMask> {
        let mask = self.schedule.advance(frequency, dt)?;
        for slice in mask.iter() {
            self.transforms[slice] = transform(slice);
        }
        Some(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_point_state_radius_from_color() {
        let state = PointShadowState::new(&LightInfo::point(Vec3::splat(10.0), Vec3::ZERO));
        assert!((state.radius() - 750.0f32.sqrt()).abs() < 1e-4);
    }

    #[test]
    fn test_cascade_update_snapshots_only_dirty_slices() {
        let mut state = CascadeShadowState::new(5);
        let fresh: Vec<Mat4> = (0..5)
            .map(|i| Mat4::from_translation(Vec3::splat(i as f32 + 1.0)))
            .collect();

        // One sweep per second over 5 slices: 0.2 s crosses exactly one slot.
        let mask = state.update(1.0, 0.2, &fresh).expect("one slot crossed");
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![0]);
        assert_eq!(state.transforms()[0], fresh[0]);
        for slice in 1..5 {
            assert_eq!(
                state.transforms()[slice],
                Mat4::IDENTITY,
                "slice {slice} changed while clean"
            );
        }
    }

    #[test]
    fn test_cascade_noop_keeps_transforms() {
        let mut state = CascadeShadowState::new(5);
        let fresh = vec![Mat4::from_scale(Vec3::splat(2.0)); 5];
        assert!(state.update(1.0, 0.01, &fresh).is_none());
        assert!(state.transforms().iter().all(|m| *m == Mat4::IDENTITY));
    }

    #[test]
    fn test_update_with_skips_clean_slices() {
        let mut state = CascadeShadowState::new(4);
        let mut computed = Vec::new();
        state.update_with(1.0, 0.5, |slice| {
            computed.push(slice);
            Mat4::IDENTITY
        });
        assert_eq!(computed, vec![0, 1]);
    }
}
