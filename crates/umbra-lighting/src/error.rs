//! Light registry error types.

use crate::light::{LightKind, LightType};

/// Errors raised by light validation and registry operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LightError {
    /// Refresh frequency must be finite and strictly positive.
    #[error("refresh frequency must be > 0, got {0}")]
    InvalidRefreshFrequency(f32),

    /// Shadow map dimensions must be non-zero.
    #[error("shadow resolution must be non-zero, got {width}x{height}")]
    InvalidResolution { width: u32, height: u32 },

    /// Directional lights need a non-zero direction vector.
    #[error("directional light has a zero direction")]
    ZeroDirection,

    /// The light's source variant does not belong in the target collection.
    #[error("{source_kind:?} light cannot be stored as {light_type:?}")]
    SourceMismatch {
        light_type: LightType,
        source_kind: LightKind,
    },

    /// Caller passed an index outside the collection.
    #[error("light index {index} out of range for {light_type:?} (len {len})")]
    IndexOutOfRange {
        light_type: LightType,
        index: usize,
        len: usize,
    },

    /// More cascades than a [`FaceMask`](crate::FaceMask) can schedule.
    #[error("{count} shadow cascades exceed the maximum of {max}")]
    TooManyCascades { count: usize, max: usize },
}
