//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";

/// Top-level renderer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Window settings.
    pub window: WindowConfig,
    /// Deferred pipeline, shadow, and reflection settings.
    pub render: RenderConfig,
    /// Viewer camera projection.
    pub camera: CameraConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Window configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    /// Window width in logical pixels.
    pub width: u32,
    /// Window height in logical pixels.
    pub height: u32,
    /// Enable vsync (PresentMode::Fifo).
    pub vsync: bool,
    /// Window title.
    pub title: String,
}

/// Rendering configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Apply screen-space ambient occlusion in the composite.
    pub ssao: bool,
    /// Number of hemisphere samples (1..=64).
    pub ssao_kernel_size: u32,
    /// Sample hemisphere radius in view-space units.
    pub ssao_radius: f32,
    /// Depth bias against self-occlusion.
    pub ssao_bias: f32,
    /// Ambient term added before occlusion.
    pub ambient: f32,
    /// View-space split distances between directional shadow cascades.
    pub cascade_splits: Vec<f32>,
    /// Default shadow map edge length for new lights.
    pub shadow_resolution: u32,
    /// Cube face edge length of new environment maps.
    pub environment_resolution: u32,
    /// Full environment sweeps per second.
    pub environment_frequency: f32,
}

/// Viewer camera configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees.
    pub fov_y_degrees: f32,
    /// Near clip plane distance.
    pub near: f32,
    /// Far clip plane distance. Also the outer bound of the last cascade.
    pub far: f32,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Write a JSON log file next to the config in debug builds.
    pub log_to_file: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            vsync: true,
            title: "Umbra".to_string(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            ssao: true,
            ssao_kernel_size: 64,
            ssao_radius: 0.5,
            ssao_bias: 0.025,
            ambient: 0.15,
            cascade_splits: vec![20.0, 40.0, 100.0, 500.0],
            shadow_resolution: 1024,
            environment_resolution: 480,
            environment_frequency: 10.0,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y_degrees: 45.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: true,
        }
    }
}

/// Platform config directory for the renderer, if one exists.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("umbra"))
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let config_path = config_dir.join(CONFIG_FILE);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        std::fs::write(&config_path, serialized).map_err(|source| ConfigError::Write {
            path: config_path,
            source,
        })
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join(CONFIG_FILE))?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Reject settings the renderer cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let render = &self.render;
        if !(1..=64).contains(&render.ssao_kernel_size) {
            return Err(ConfigError::Invalid {
                field: "render.ssao_kernel_size",
                reason: format!("{} not in 1..=64", render.ssao_kernel_size),
            });
        }
        if render.shadow_resolution == 0 || render.environment_resolution == 0 {
            return Err(ConfigError::Invalid {
                field: "render.shadow_resolution",
                reason: "shadow and environment resolutions must be non-zero".to_string(),
            });
        }
        if !(render.environment_frequency > 0.0) {
            return Err(ConfigError::Invalid {
                field: "render.environment_frequency",
                reason: format!("{} must be > 0", render.environment_frequency),
            });
        }
        if render.cascade_splits.len() >= 32 {
            return Err(ConfigError::Invalid {
                field: "render.cascade_splits",
                reason: format!("{} splits exceed 31", render.cascade_splits.len()),
            });
        }
        let camera = &self.camera;
        if !(camera.near > 0.0 && camera.far > camera.near) {
            return Err(ConfigError::Invalid {
                field: "camera.near",
                reason: format!("need 0 < near < far, got {} / {}", camera.near, camera.far),
            });
        }
        Ok(())
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
