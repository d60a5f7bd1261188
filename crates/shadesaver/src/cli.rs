use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;
use renderer::{GpuPowerPreference, PacingMode};

#[derive(Parser, Debug)]
#[command(
    name = "shadesaver",
    author,
    version,
    about = "Full-screen WGSL shader screensaver",
    long_about = "Full-screen WGSL shader screensaver.\n\n\
        Classic screensaver switches are accepted too: /s (full-screen), /w (window), \
        /c (configure), /p <handle> (preview) and /f0 or /f1 (frame-rate report)."
)]
pub struct Cli {
    /// Run full-screen; any key, click or mouse movement exits.
    #[arg(long, overrides_with_all = ["window", "preview", "configure"])]
    pub fullscreen: bool,

    /// Run in a resizable desktop window.
    #[arg(long, overrides_with_all = ["fullscreen", "preview", "configure"])]
    pub window: bool,

    /// Render inside the window identified by this native handle (decimal or 0x-prefixed hex).
    #[arg(
        long,
        value_name = "HANDLE",
        value_parser = parse_window_handle,
        overrides_with_all = ["fullscreen", "window", "configure"]
    )]
    pub preview: Option<u64>,

    /// Print the settings file location and exit.
    #[arg(long, overrides_with_all = ["fullscreen", "window", "preview"])]
    pub configure: bool,

    /// WGSL shader file to render; defaults to `shaders.wgsl` in the working directory.
    #[arg(long, value_name = "PATH", env = "SHADESAVER_SHADER")]
    pub shader: Option<PathBuf>,

    /// Settings file to read instead of the default location.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Do not watch the shader file for changes.
    #[arg(long)]
    pub no_hot_reload: bool,

    /// Frame pacing: `waitable` (present as soon as the GPU is idle) or `vsync`.
    #[arg(long, value_name = "MODE", value_parser = parse_pacing)]
    pub pacing: Option<PacingMode>,

    /// Window size, or the preview size when the parent cannot be measured (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_surface_size)]
    pub size: Option<(u32, u32)>,

    /// GPU preference: `high` (discrete) or `low` (integrated).
    #[arg(long, value_name = "PREFERENCE", value_parser = parse_power)]
    pub power: Option<GpuPowerPreference>,

    /// Report frames per second at info level.
    #[arg(
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub fps_overlay: Option<bool>,
}

pub fn parse() -> Cli {
    Cli::parse_from(translate_legacy_args(std::env::args_os()))
}

/// Rewrites screensaver-style switches (`/s`, `-p 1234`, `/c:5678`, ...) into long options.
///
/// Matching is case-insensitive and accepts `/` or `-` as the prefix; anything
/// else is passed through untouched. A bare `/p` without a usable handle after
/// it is dropped, so hosts that omit the handle get the no-mode exit.
pub fn translate_legacy_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args = args.into_iter().peekable();
    let mut translated: Vec<OsString> = args.next().into_iter().collect();
    while let Some(arg) = args.next() {
        match arg.to_str().and_then(legacy_switch) {
            Some(replacement) if replacement == "--preview" => {
                let has_handle = args
                    .peek()
                    .and_then(|next| next.to_str())
                    .is_some_and(|next| parse_window_handle(next).is_ok());
                if has_handle {
                    translated.push(replacement.into());
                }
            }
            Some(replacement) => translated.push(replacement.into()),
            None => translated.push(arg),
        }
    }
    translated
}

fn legacy_switch(arg: &str) -> Option<String> {
    let body = arg.strip_prefix('/').or_else(|| {
        arg.strip_prefix('-')
            .filter(|rest| !rest.starts_with('-'))
    })?;
    let body = body.to_ascii_lowercase();

    let switch = match body.as_str() {
        "s" => "--fullscreen".to_string(),
        "w" => "--window".to_string(),
        // `/c:<hwnd>` names the dialog parent, which printing a path never needs.
        "c" => "--configure".to_string(),
        other if other.starts_with("c:") => "--configure".to_string(),
        "p" => "--preview".to_string(),
        "f0" => "--fps-overlay=false".to_string(),
        "f1" => "--fps-overlay=true".to_string(),
        other => {
            let handle = other.strip_prefix('p')?;
            let handle = handle.strip_prefix(':').unwrap_or(handle);
            parse_window_handle(handle).ok()?;
            format!("--preview={handle}")
        }
    };
    Some(switch)
}

pub fn parse_window_handle(value: &str) -> Result<u64, String> {
    let trimmed = value.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse(),
    };
    parsed.map_err(|_| format!("invalid window handle '{value}'"))
}

pub fn parse_pacing(value: &str) -> Result<PacingMode, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "waitable" | "wait" => Ok(PacingMode::Waitable),
        "vsync" | "fifo" => Ok(PacingMode::Vsync),
        other => Err(format!(
            "invalid pacing '{other}'; expected 'waitable' or 'vsync'"
        )),
    }
}

pub fn parse_power(value: &str) -> Result<GpuPowerPreference, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "high" | "discrete" => Ok(GpuPowerPreference::High),
        "low" | "integrated" => Ok(GpuPowerPreference::Low),
        other => Err(format!(
            "invalid power preference '{other}'; expected 'high' or 'low'"
        )),
    }
}

pub fn parse_surface_size(spec: &str) -> Result<(u32, u32), String> {
    let (width, height) = spec
        .trim()
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| "expected WxH format, e.g. 1280x720".to_string())?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| "invalid width in size specification".to_string())?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| "invalid height in size specification".to_string())?;

    if width == 0 || height == 0 {
        return Err("surface dimensions must be greater than zero".to_string());
    }

    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_legacy(args: &[&str]) -> Cli {
        let args = std::iter::once("shadesaver")
            .chain(args.iter().copied())
            .map(OsString::from);
        Cli::try_parse_from(translate_legacy_args(args)).expect("arguments parse")
    }

    fn translate(args: &[&str]) -> Vec<String> {
        let args = std::iter::once("shadesaver")
            .chain(args.iter().copied())
            .map(OsString::from);
        translate_legacy_args(args)
            .into_iter()
            .skip(1)
            .map(|arg| arg.into_string().unwrap())
            .collect()
    }

    #[test]
    fn translates_screensaver_switches() {
        assert_eq!(translate(&["/s"]), ["--fullscreen"]);
        assert_eq!(translate(&["/S"]), ["--fullscreen"]);
        assert_eq!(translate(&["-w"]), ["--window"]);
        assert_eq!(translate(&["/c:1234"]), ["--configure"]);
        assert_eq!(translate(&["/p", "4242"]), ["--preview", "4242"]);
        assert_eq!(translate(&["/p4242"]), ["--preview=4242"]);
        assert_eq!(translate(&["/f1"]), ["--fps-overlay=true"]);
        assert_eq!(translate(&["/f0"]), ["--fps-overlay=false"]);
    }

    #[test]
    fn preview_switch_without_handle_is_dropped() {
        assert!(translate(&["/p"]).is_empty());
        assert_eq!(translate(&["/p", "/s"]), ["--fullscreen"]);
        assert_eq!(translate(&["-P", "window"]), ["window"]);

        let cli = parse_legacy(&["/p"]);
        assert_eq!(cli.preview, None);
        assert!(!cli.fullscreen && !cli.window && !cli.configure);
    }

    #[test]
    fn leaves_other_arguments_alone() {
        assert_eq!(
            translate(&["--shader", "/path/to/shaders.wgsl", "--size", "640x480"]),
            ["--shader", "/path/to/shaders.wgsl", "--size", "640x480"]
        );
        assert_eq!(translate(&["-h"]), ["-h"]);
    }

    #[test]
    fn last_mode_switch_wins() {
        let cli = parse_legacy(&["/s", "/w"]);
        assert!(cli.window);
        assert!(!cli.fullscreen);

        let cli = parse_legacy(&["/w", "/p", "99"]);
        assert_eq!(cli.preview, Some(99));
        assert!(!cli.window);

        let cli = parse_legacy(&["/p", "99", "/s"]);
        assert!(cli.fullscreen);
        assert_eq!(cli.preview, None);
    }

    #[test]
    fn fps_overlay_accepts_bare_flag_and_value() {
        assert_eq!(parse_legacy(&["--fps-overlay"]).fps_overlay, Some(true));
        assert_eq!(parse_legacy(&["/f0"]).fps_overlay, Some(false));
        assert_eq!(parse_legacy(&[]).fps_overlay, None);
    }

    #[test]
    fn parses_window_handles() {
        assert_eq!(parse_window_handle("1234"), Ok(1234));
        assert_eq!(parse_window_handle("0x1F"), Ok(31));
        assert!(parse_window_handle("window").is_err());
    }

    #[test]
    fn parses_surface_sizes() {
        assert_eq!(parse_surface_size("1280x720"), Ok((1280, 720)));
        assert_eq!(parse_surface_size(" 640 X 480 "), Ok((640, 480)));
        assert!(parse_surface_size("0x480").is_err());
        assert!(parse_surface_size("wide").is_err());
    }

    #[test]
    fn parses_pacing_and_power() {
        assert_eq!(parse_pacing("VSYNC"), Ok(PacingMode::Vsync));
        assert_eq!(parse_pacing("waitable"), Ok(PacingMode::Waitable));
        assert!(parse_pacing("immediate").is_err());
        assert_eq!(parse_power("low"), Ok(GpuPowerPreference::Low));
        assert!(parse_power("medium").is_err());
    }
}
