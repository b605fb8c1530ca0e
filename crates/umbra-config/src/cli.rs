//! Command-line overrides for the renderer demo.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Umbra command-line arguments.
///
/// Anything given here wins over `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "umbra", about = "Deferred lighting demo")]
pub struct CliArgs {
    /// Window width.
    #[arg(long)]
    pub width: Option<u32>,

    /// Window height.
    #[arg(long)]
    pub height: Option<u32>,

    /// Enable or disable ambient occlusion.
    #[arg(long)]
    pub ssao: Option<bool>,

    /// Default shadow map edge length for demo lights.
    #[arg(long)]
    pub shadow_resolution: Option<u32>,

    /// Environment map sweeps per second.
    #[arg(long)]
    pub environment_frequency: Option<f32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(w) = args.width {
            self.window.width = w;
        }
        if let Some(h) = args.height {
            self.window.height = h;
        }
        if let Some(ssao) = args.ssao {
            self.render.ssao = ssao;
        }
        if let Some(res) = args.shadow_resolution {
            self.render.shadow_resolution = res;
        }
        if let Some(freq) = args.environment_frequency {
            self.render.environment_frequency = freq;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            width: Some(1920),
            ssao: Some(false),
            shadow_resolution: Some(2048),
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.window.width, 1920);
        assert!(!config.render.ssao);
        assert_eq!(config.render.shadow_resolution, 2048);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.render.environment_resolution, 480);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::parse_from([
            "umbra",
            "--ssao",
            "false",
            "--log-level",
            "debug",
            "--environment-frequency",
            "2.5",
        ]);
        assert_eq!(args.ssao, Some(false));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert_eq!(args.environment_frequency, Some(2.5));
        assert!(args.width.is_none());
    }
}
