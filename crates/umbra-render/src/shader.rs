//! Shader module loading with up-front WGSL validation.
//!
//! Sources are parsed and validated with naga before they reach the device,
//! so a broken shader surfaces as [`ShaderError::CompilationFailed`] rather
//! than a device validation panic.

use log::{debug, info};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use wgpu::{ShaderModuleDescriptor, ShaderSource};

/// Error types for shader loading operations.
#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("shader '{name}' failed to compile: {message}")]
    CompilationFailed { name: String, message: String },

    #[error("shader '{name}' not found in library")]
    NotLoaded { name: String },
}

/// Parse and validate `source` without touching the GPU.
pub fn validate_wgsl(name: &str, source: &str) -> Result<naga::Module, ShaderError> {
    let module =
        naga::front::wgsl::parse_str(source).map_err(|err| ShaderError::CompilationFailed {
            name: name.to_string(),
            message: err.emit_to_string(source),
        })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::default(),
    );
    validator
        .validate(&module)
        .map_err(|err| ShaderError::CompilationFailed {
            name: name.to_string(),
            message: err.emit_to_string(source),
        })?;

    Ok(module)
}

/// Named cache of compiled shader modules.
#[derive(Default)]
pub struct ShaderLibrary {
    modules: HashMap<String, Arc<wgpu::ShaderModule>>,
}

impl ShaderLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and compile a WGSL source string, replacing any module of the same name.
    pub fn load_from_source(
        &mut self,
        device: &wgpu::Device,
        name: &str,
        source: &str,
    ) -> Result<Arc<wgpu::ShaderModule>, ShaderError> {
        debug!("Loading shader '{}' from source", name);
        validate_wgsl(name, source)?;

        let module = Arc::new(device.create_shader_module(ShaderModuleDescriptor {
            label: Some(name),
            source: ShaderSource::Wgsl(source.into()),
        }));

        if self
            .modules
            .insert(name.to_string(), Arc::clone(&module))
            .is_some()
        {
            info!("Replaced shader '{}'", name);
        } else {
            info!("Loaded shader '{}'", name);
        }
        Ok(module)
    }

    /// Previously loaded module, or the cached one if `name` is already present.
    pub fn get_or_load(
        &mut self,
        device: &wgpu::Device,
        name: &str,
        source: &str,
    ) -> Result<Arc<wgpu::ShaderModule>, ShaderError> {
        match self.modules.get(name) {
            Some(module) => Ok(Arc::clone(module)),
            None => self.load_from_source(device, name, source),
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<wgpu::ShaderModule>, ShaderError> {
        self.modules
            .get(name)
            .cloned()
            .ok_or_else(|| ShaderError::NotLoaded {
                name: name.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::create_test_device_queue;

    const VALID_SHADER: &str = r#"
        @vertex
        fn vs_main(@builtin(vertex_index) idx: u32) -> @builtin(position) vec4<f32> {
            return vec4<f32>(f32(idx), 0.0, 0.0, 1.0);
        }

        @fragment
        fn fs_main() -> @location(0) vec4<f32> {
            return vec4<f32>(1.0, 0.0, 0.0, 1.0);
        }
    "#;

    const INVALID_SHADER: &str = r#"
        @vertex
        fn vs_main() -> @builtin(position) vec4<f32> {
            return undeclared_variable;
        }
    "#;

    #[test]
    fn test_validate_accepts_valid_source() {
        assert!(validate_wgsl("valid", VALID_SHADER).is_ok());
    }

    #[test]
    fn test_validate_rejects_invalid_source() {
        let err = validate_wgsl("bad", INVALID_SHADER).unwrap_err();
        match err {
            ShaderError::CompilationFailed { name, message } => {
                assert_eq!(name, "bad");
                assert!(message.contains("undeclared_variable"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_invalid_shader_is_recoverable_with_device() {
        let Some((device, _queue)) = create_test_device_queue() else {
            return;
        };
        let mut library = ShaderLibrary::new();
        assert!(library.load_from_source(&device, "bad", INVALID_SHADER).is_err());
        assert!(library.is_empty());
    }

    #[test]
    fn test_get_or_load_caches() {
        let Some((device, _queue)) = create_test_device_queue() else {
            return;
        };
        let mut library = ShaderLibrary::new();
        let a = library.get_or_load(&device, "shared", VALID_SHADER).unwrap();
        let b = library.get_or_load(&device, "shared", VALID_SHADER).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(library.len(), 1);
    }

    #[test]
    fn test_get_missing_shader_errors() {
        let library = ShaderLibrary::new();
        assert!(matches!(
            library.get("nonexistent"),
            Err(ShaderError::NotLoaded { .. })
        ));
    }
}
