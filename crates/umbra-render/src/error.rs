//! Recoverable GPU resource errors.

use umbra_lighting::{LightError, LightKind, LightType};

use crate::shader::ShaderError;

/// A GPU resource could not be created.
///
/// Returned instead of aborting so callers can fall back (smaller shadow
/// maps, no reflection) or stop startup cleanly.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// A texture dimension or layer count is zero.
    #[error("{label}: invalid size {width}x{height} with {layers} layers")]
    InvalidDimensions {
        label: &'static str,
        width: u32,
        height: u32,
        layers: u32,
    },

    /// The device cannot allocate a texture this large.
    #[error("{label}: {requested} exceeds device limit {limit}")]
    ExceedsDeviceLimit {
        label: &'static str,
        requested: u32,
        limit: u32,
    },

    /// The light's source cannot carry this kind of shadow map.
    #[error("{label}: unsupported {kind:?} light source")]
    UnsupportedSource { label: &'static str, kind: LightKind },

    /// A pipeline's shader failed to parse or validate.
    #[error(transparent)]
    Shader(#[from] ShaderError),

    /// The light system was configured with unusable parameters.
    #[error(transparent)]
    Light(#[from] LightError),
}

/// Errors from [`Lights`](crate::Lights) operations.
#[derive(Debug, thiserror::Error)]
pub enum LightsError {
    /// Invalid light parameters or index.
    #[error(transparent)]
    Light(#[from] LightError),

    /// Shadow map creation failed.
    #[error("shadow map for {light_type:?} light: {source}")]
    Resource {
        light_type: LightType,
        #[source]
        source: ResourceError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_error_converts() {
        let err: LightsError = LightError::ZeroDirection.into();
        assert!(matches!(err, LightsError::Light(LightError::ZeroDirection)));
    }

    #[test]
    fn test_resource_error_message_names_label() {
        let err = ResourceError::ExceedsDeviceLimit {
            label: "point-shadow",
            requested: 65536,
            limit: 8192,
        };
        let message = err.to_string();
        assert!(message.contains("point-shadow"));
        assert!(message.contains("8192"));
    }
}
