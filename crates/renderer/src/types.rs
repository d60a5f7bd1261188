use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default client size for windowed mode.
pub const DEFAULT_WINDOW_SIZE: (u32, u32) = (900, 600);

/// Preview child size used when the parent's client area cannot be queried.
pub const DEFAULT_PREVIEW_SIZE: (u32, u32) = (152, 112);

/// Shader file picked up from the working directory when none is configured.
pub const DEFAULT_SHADER_FILE: &str = "shaders.wgsl";

/// Cursor travel (in pixels, |dx| + |dy|) that wakes a running screensaver.
pub const DEFAULT_WAKE_THRESHOLD: u32 = 4;

/// How the renderer presents frames.
///
/// * `Windowed` opens a regular resizable top-level window.
/// * `Fullscreen` covers the primary monitor with a borderless window, blacks
///   out every other monitor and behaves like a screensaver (any input wakes it).
/// * `Preview` renders into a child of a surface owned by another process,
///   identified by its native handle. The child fills the parent's client
///   area; `fallback_size` is only used when that cannot be queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationMode {
    Windowed { width: u32, height: u32 },
    Fullscreen,
    Preview {
        parent: u64,
        fallback_size: (u32, u32),
    },
}

/// How the render loop throttles itself to the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacingMode {
    /// Spin on the frame-latency signal and present without waiting for vblank.
    #[default]
    Waitable,
    /// Let presentation block on vblank.
    Vsync,
}

/// Adapter preference handed to wgpu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    Low,
    #[default]
    High,
}

/// Where the shader programs come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderOrigin {
    /// The WGSL program compiled into the binary; never reloaded.
    Builtin,
    /// A WGSL file on disk, optionally watched for edits.
    File { path: PathBuf, hot_reload: bool },
}

impl ShaderOrigin {
    /// An explicit path wins; otherwise `shaders.wgsl` in `search_dir` if it
    /// exists, falling back to the built-in program.
    pub fn resolve(configured: Option<PathBuf>, hot_reload: bool, search_dir: &Path) -> Self {
        let path = configured.or_else(|| {
            let candidate = search_dir.join(DEFAULT_SHADER_FILE);
            candidate.is_file().then_some(candidate)
        });
        match path {
            Some(path) => ShaderOrigin::File { path, hot_reload },
            None => ShaderOrigin::Builtin,
        }
    }
}

/// Immutable configuration passed to the renderer at start-up.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Surface the renderer presents into.
    pub mode: PresentationMode,
    /// Shader asset to compile.
    pub shader: ShaderOrigin,
    /// Frame pacing strategy.
    pub pacing: PacingMode,
    /// Discrete or integrated GPU preference.
    pub power: GpuPowerPreference,
    /// Report frames-per-second at `info` level.
    pub fps_overlay: bool,
    /// How often frame statistics are reported.
    pub stats_interval: Duration,
    /// Cursor travel that dismisses full-screen mode.
    pub wake_threshold: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            mode: PresentationMode::Windowed {
                width: DEFAULT_WINDOW_SIZE.0,
                height: DEFAULT_WINDOW_SIZE.1,
            },
            shader: ShaderOrigin::Builtin,
            pacing: PacingMode::default(),
            power: GpuPowerPreference::default(),
            fps_overlay: false,
            stats_interval: Duration::from_secs(1),
            wake_threshold: DEFAULT_WAKE_THRESHOLD,
        }
    }
}

/// Adapter details captured once the device is created.
#[derive(Debug, Clone)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
}

impl AdapterProfile {
    pub(crate) fn from_wgpu(info: &wgpu::AdapterInfo) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
        }
    }

    pub fn is_software(&self) -> bool {
        matches!(self.device_type, wgpu::DeviceType::Cpu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_shader_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DEFAULT_SHADER_FILE), "").unwrap();
        let origin = ShaderOrigin::resolve(Some(PathBuf::from("/tmp/custom.wgsl")), false, dir.path());
        assert_eq!(
            origin,
            ShaderOrigin::File {
                path: PathBuf::from("/tmp/custom.wgsl"),
                hot_reload: false
            }
        );
    }

    #[test]
    fn working_directory_shader_is_discovered() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            ShaderOrigin::resolve(None, true, dir.path()),
            ShaderOrigin::Builtin
        );

        let path = dir.path().join(DEFAULT_SHADER_FILE);
        std::fs::write(&path, "").unwrap();
        assert_eq!(
            ShaderOrigin::resolve(None, true, dir.path()),
            ShaderOrigin::File {
                path,
                hot_reload: true
            }
        );
    }

    #[test]
    fn defaults_match_the_classic_window() {
        let config = RendererConfig::default();
        assert_eq!(
            config.mode,
            PresentationMode::Windowed {
                width: 900,
                height: 600
            }
        );
        assert_eq!(config.pacing, PacingMode::Waitable);
        assert_eq!(config.power, GpuPowerPreference::High);
        assert_eq!(config.wake_threshold, 4);
    }
}
