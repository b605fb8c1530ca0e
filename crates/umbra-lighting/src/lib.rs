//! Light model, shadow refresh scheduling, and cascade math for the deferred renderer.
//!
//! Everything in this crate is CPU state. GPU resources mirroring it live in
//! `umbra-render`, which drives these types once per frame.

mod cascade;
mod cube;
mod error;
mod light;
mod registry;
mod schedule;
mod shadow;

pub use cascade::{
    CascadeCamera, CascadeSplits, Z_MULTIPLIER, cascade_transform, cascade_transforms,
    frustum_corners_world, light_space_matrix, pad_depth_bounds,
};
pub use cube::{CUBE_FACES, cube_face_projection, cube_face_transforms};
pub use error::LightError;
pub use light::{LightGpu, LightInfo, LightKind, LightSource, LightType};
pub use registry::{LightRegistry, ShadowRefresh};
pub use schedule::{CUBE_FACE_COUNT, FaceMask, MAX_FACES, RefreshSchedule, dirty_range};
pub use shadow::{CascadeShadowState, PointShadowState};
