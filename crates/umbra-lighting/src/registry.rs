//! Per-type light collections with index-parallel shadow state.
//!
//! [`LightRegistry`] is the CPU side of the light system. It holds one
//! ordered list per [`LightType`] and keeps the shadow states of the two
//! shadowed lists in lockstep with them. Indices are positions: deleting
//! entry `i` shifts every later entry down by one.

use crate::cascade::{CascadeCamera, CascadeSplits, cascade_transform};
use crate::error::LightError;
use crate::light::{LightInfo, LightSource, LightType};
use crate::schedule::{FaceMask, MAX_FACES};
use crate::shadow::{CascadeShadowState, PointShadowState};

/// Faces due for redraw after one scheduler step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShadowRefresh {
    /// `(point shadow index, dirty cube faces)`.
    pub points: Vec<(usize, FaceMask)>,
    /// `(cascade shadow index, dirty slices)`.
    pub cascades: Vec<(usize, FaceMask)>,
}

impl ShadowRefresh {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.cascades.is_empty()
    }
}

/// Owns the four light lists and the shadow state of shadow casters.
#[derive(Clone, Debug, Default)]
pub struct LightRegistry {
    lights: [Vec<LightInfo>; 4],
    point_shadows: Vec<PointShadowState>,
    cascade_shadows: Vec<CascadeShadowState>,
    splits: CascadeSplits,
}

impl LightRegistry {
    /// Fails when `splits` yield more cascades than a [`FaceMask`] holds.
    pub fn new(splits: CascadeSplits) -> Result<Self, LightError> {
        let count = splits.cascade_count();
        if count > MAX_FACES {
            return Err(LightError::TooManyCascades {
                count,
                max: MAX_FACES,
            });
        }
        Ok(Self {
            splits,
            ..Self::default()
        })
    }

    pub fn splits(&self) -> &CascadeSplits {
        &self.splits
    }

    /// Slices per directional shadow map.
    pub fn cascade_count(&self) -> usize {
        self.splits.cascade_count()
    }

    /// All lights of `ty` in index order.
    pub fn infos(&self, ty: LightType) -> &[LightInfo] {
        &self.lights[ty.index()]
    }

    pub fn info(&self, ty: LightType, index: usize) -> Result<&LightInfo, LightError> {
        self.check_index(ty, index)?;
        Ok(&self.lights[ty.index()][index])
    }

    pub fn len(&self, ty: LightType) -> usize {
        self.lights[ty.index()].len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.iter().all(Vec::is_empty)
    }

    pub fn point_shadows(&self) -> &[PointShadowState] {
        &self.point_shadows
    }

    pub fn cascade_shadows(&self) -> &[CascadeShadowState] {
        &self.cascade_shadows
    }

    /// Append `info` to `ty`; returns its index.
    pub fn add_light(&mut self, ty: LightType, mut info: LightInfo) -> Result<usize, LightError> {
        info.validate(ty)?;
        info.cast_shadow = ty.is_shadowed();

        let list = &mut self.lights[ty.index()];
        let index = list.len();
        list.push(info);
        match ty {
            LightType::PointShadowed => self.point_shadows.push(PointShadowState::new(&info)),
            LightType::DirectionalShadowed => self
                .cascade_shadows
                .push(CascadeShadowState::new(self.splits.cascade_count())),
            _ => {}
        }
        self.debug_check_lockstep();
        Ok(index)
    }

    /// Replace the light at `index`. Shadow state is rebuilt from scratch.
    pub fn update_light(
        &mut self,
        ty: LightType,
        index: usize,
        mut info: LightInfo,
    ) -> Result<(), LightError> {
        self.check_index(ty, index)?;
        info.validate(ty)?;
        info.cast_shadow = ty.is_shadowed();

        self.lights[ty.index()][index] = info;
        match ty {
            LightType::PointShadowed => self.point_shadows[index] = PointShadowState::new(&info),
            LightType::DirectionalShadowed => {
                self.cascade_shadows[index] = CascadeShadowState::new(self.splits.cascade_count())
            }
            _ => {}
        }
        Ok(())
    }

    /// Remove the light at `index`, shifting later lights down.
    pub fn delete_light(&mut self, ty: LightType, index: usize) -> Result<LightInfo, LightError> {
        self.check_index(ty, index)?;
        let info = self.lights[ty.index()].remove(index);
        match ty {
            LightType::PointShadowed => {
                self.point_shadows.remove(index);
            }
            LightType::DirectionalShadowed => {
                self.cascade_shadows.remove(index);
            }
            _ => {}
        }
        self.debug_check_lockstep();
        Ok(info)
    }

    /// Move a light between the shadowed and unshadowed list of its kind.
    ///
    /// Returns the destination type and the new index, which is the
    /// destination's length before the move.
    pub fn change_shadowed(
        &mut self,
        ty: LightType,
        index: usize,
    ) -> Result<(LightType, usize), LightError> {
        let destination = ty.toggled_shadow();
        let info = *self.info(ty, index)?;
        info.validate(destination)?;
        self.delete_light(ty, index)?;
        let new_index = self.add_light(destination, info)?;
        Ok((destination, new_index))
    }

    /// Step every shadow schedule by `dt` seconds.
    ///
    /// Cascade transforms are recomputed from `camera` for dirty slices only.
    pub fn refresh_shadows(&mut self, dt: f32, camera: &impl CascadeCamera) -> ShadowRefresh {
        let mut refresh = ShadowRefresh::default();

        let point_infos = &self.lights[LightType::PointShadowed.index()];
        for (index, (state, info)) in self.point_shadows.iter_mut().zip(point_infos).enumerate() {
            if let Some(mask) = state.update(info.refresh_frequency, dt) {
                refresh.points.push((index, mask));
            }
        }

        let ranges = self.splits.ranges(camera.near(), camera.far());
        let dir_infos = &self.lights[LightType::DirectionalShadowed.index()];
        for (index, (state, info)) in self.cascade_shadows.iter_mut().zip(dir_infos).enumerate() {
            let LightSource::Directional { direction } = info.source else {
                continue;
            };
            let updated = state.update_with(info.refresh_frequency, dt, |slice| {
                cascade_transform(camera, ranges[slice], direction)
            });
            if let Some(mask) = updated {
                refresh.cascades.push((index, mask));
            }
        }

        refresh
    }

    fn check_index(&self, ty: LightType, index: usize) -> Result<(), LightError> {
        let len = self.len(ty);
        if index < len {
            Ok(())
        } else {
            Err(LightError::IndexOutOfRange {
                light_type: ty,
                index,
                len,
            })
        }
    }

    fn debug_check_lockstep(&self) {
        debug_assert_eq!(
            self.point_shadows.len(),
            self.len(LightType::PointShadowed)
        );
        debug_assert_eq!(
            self.cascade_shadows.len(),
            self.len(LightType::DirectionalShadowed)
        );
    }
}
