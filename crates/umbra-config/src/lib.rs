//! Configuration system for the Umbra renderer.
//!
//! Renderer settings persist to disk as RON files and can be overridden from
//! the command line. Scene and light state are never persisted.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{CameraConfig, Config, DebugConfig, RenderConfig, WindowConfig, default_config_dir};
pub use error::ConfigError;
