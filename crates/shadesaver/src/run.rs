use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use renderer::{
    GpuPowerPreference, PacingMode, PresentationMode, Renderer, RendererConfig, ShaderOrigin,
    DEFAULT_PREVIEW_SIZE,
};
use saverconfig::{Pacing, Power, SaverConfig};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::paths::AppPaths;

/// What the process should do once arguments are understood.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launch {
    /// No mode was requested.
    Nothing,
    /// Print where settings live.
    Configure,
    Render(PresentationMode),
}

pub fn run(cli: Cli) -> Result<()> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => AppPaths::discover()?.config_file(),
    };

    match launch_for(&cli) {
        Launch::Nothing => {
            tracing::debug!("no presentation mode requested; exiting");
            Ok(())
        }
        Launch::Configure => {
            println!("{}", config_path.display());
            Ok(())
        }
        Launch::Render(mode) => {
            let settings = load_settings(&cli, &config_path)?;
            let search_dir =
                std::env::current_dir().context("failed to read the working directory")?;
            let config = renderer_config(&cli, &settings, mode, &search_dir);
            tracing::info!(
                mode = ?config.mode,
                shader = ?config.shader,
                pacing = ?config.pacing,
                settings = %config_path.display(),
                "starting shadesaver"
            );
            Renderer::new(config).run()
        }
    }
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn launch_for(cli: &Cli) -> Launch {
    if cli.configure {
        Launch::Configure
    } else if cli.fullscreen {
        Launch::Render(PresentationMode::Fullscreen)
    } else if let Some(parent) = cli.preview {
        Launch::Render(PresentationMode::Preview {
            parent,
            fallback_size: cli.size.unwrap_or(DEFAULT_PREVIEW_SIZE),
        })
    } else if cli.window {
        // Width and height are filled in from settings once they are loaded.
        Launch::Render(PresentationMode::Windowed {
            width: 0,
            height: 0,
        })
    } else {
        Launch::Nothing
    }
}

/// An explicit `--config` must exist; the default location may be absent.
fn load_settings(cli: &Cli, path: &Path) -> Result<SaverConfig> {
    let settings = if cli.config.is_some() {
        SaverConfig::load(path)
    } else {
        SaverConfig::load_or_default(path)
    };
    settings.with_context(|| format!("failed to load settings from {}", path.display()))
}

/// Merges command-line flags over the settings file.
pub fn renderer_config(
    cli: &Cli,
    settings: &SaverConfig,
    mode: PresentationMode,
    search_dir: &Path,
) -> RendererConfig {
    let mode = match mode {
        PresentationMode::Windowed { .. } => {
            let (width, height) = cli
                .size
                .unwrap_or((settings.window.width, settings.window.height));
            PresentationMode::Windowed { width, height }
        }
        other => other,
    };

    let shader_path: Option<PathBuf> = cli.shader.clone().or_else(|| settings.shader.clone());
    let hot_reload = settings.hot_reload && !cli.no_hot_reload;

    RendererConfig {
        mode,
        shader: ShaderOrigin::resolve(shader_path, hot_reload, search_dir),
        pacing: cli.pacing.unwrap_or(match settings.pacing {
            Pacing::Waitable => PacingMode::Waitable,
            Pacing::Vsync => PacingMode::Vsync,
        }),
        power: cli.power.unwrap_or(match settings.power {
            Power::Low => GpuPowerPreference::Low,
            Power::High => GpuPowerPreference::High,
        }),
        fps_overlay: cli.fps_overlay.unwrap_or(settings.fps_overlay),
        stats_interval: settings.stats_interval,
        wake_threshold: settings.wake_threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::time::Duration;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("shadesaver").chain(args.iter().copied()))
            .expect("arguments parse")
    }

    #[test]
    fn picks_launch_from_mode_flags() {
        assert_eq!(launch_for(&cli(&[])), Launch::Nothing);
        assert_eq!(launch_for(&cli(&["--configure"])), Launch::Configure);
        assert_eq!(
            launch_for(&cli(&["--fullscreen"])),
            Launch::Render(PresentationMode::Fullscreen)
        );
        assert_eq!(
            launch_for(&cli(&["--preview", "0x10"])),
            Launch::Render(PresentationMode::Preview {
                parent: 16,
                fallback_size: DEFAULT_PREVIEW_SIZE
            })
        );
    }

    #[test]
    fn settings_fill_in_what_flags_leave_out() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SaverConfig::from_toml_str(
            "pacing = \"vsync\"\npower = \"low\"\nfps_overlay = true\nstats_interval = \"2s\"\n\
             [window]\nwidth = 640\nheight = 480\n",
        )
        .unwrap();
        let args = cli(&["--window"]);
        let Launch::Render(mode) = launch_for(&args) else {
            panic!("expected a render launch");
        };

        let config = renderer_config(&args, &settings, mode, dir.path());
        assert_eq!(
            config.mode,
            PresentationMode::Windowed {
                width: 640,
                height: 480
            }
        );
        assert_eq!(config.pacing, PacingMode::Vsync);
        assert_eq!(config.power, GpuPowerPreference::Low);
        assert!(config.fps_overlay);
        assert_eq!(config.stats_interval, Duration::from_secs(2));
        assert_eq!(config.shader, ShaderOrigin::Builtin);
    }

    #[test]
    fn flags_override_settings() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SaverConfig::from_toml_str(
            "shader = \"from-file.wgsl\"\npacing = \"vsync\"\nfps_overlay = true\n",
        )
        .unwrap();
        let args = cli(&[
            "--window",
            "--size",
            "1024x768",
            "--pacing",
            "waitable",
            "--power",
            "low",
            "--fps-overlay=false",
            "--shader",
            "flag.wgsl",
            "--no-hot-reload",
        ]);
        let Launch::Render(mode) = launch_for(&args) else {
            panic!("expected a render launch");
        };

        let config = renderer_config(&args, &settings, mode, dir.path());
        assert_eq!(
            config.mode,
            PresentationMode::Windowed {
                width: 1024,
                height: 768
            }
        );
        assert_eq!(config.pacing, PacingMode::Waitable);
        assert_eq!(config.power, GpuPowerPreference::Low);
        assert!(!config.fps_overlay);
        assert_eq!(
            config.shader,
            ShaderOrigin::File {
                path: PathBuf::from("flag.wgsl"),
                hot_reload: false
            }
        );
    }

    #[test]
    fn explicit_settings_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let missing_arg = missing.to_str().unwrap();

        let args = cli(&["--window", "--config", missing_arg]);
        assert!(load_settings(&args, &missing).is_err());

        let args = cli(&["--window"]);
        assert_eq!(
            load_settings(&args, &missing).unwrap(),
            SaverConfig::default()
        );
    }
}
