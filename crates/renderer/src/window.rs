use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopBuilder};
use winit::monitor::MonitorHandle;
use winit::window::{Fullscreen, Window, WindowBuilder, WindowLevel};

use tracing::{debug, error, info, warn};

use crate::compile::CompiledProgramSet;
use crate::diagnostics::{show_message_box, DialogDiagnostics};
use crate::gpu::GpuState;
use crate::reload::{FileAsset, ShaderAsset, ShaderWatcher};
use crate::runtime::FrameStats;
use crate::scheduler::FrameScheduler;
use crate::types::{PresentationMode, RendererConfig, ShaderOrigin};

const WINDOW_TITLE: &str = "Shadesaver";

/// Messages the render thread sends back to the event loop.
#[derive(Debug, Clone)]
pub enum HostEvent {
    RenderFailed(String),
}

/// How the host window reacts to input, fixed by the presentation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowRole {
    /// Regular top-level window; closes on request.
    Normal,
    /// Embedded in another process's window; closes when told to or destroyed.
    ChildPreview,
    /// Full-screen screensaver; any key, click or real mouse movement dismisses it.
    ScreensaverIdle,
}

impl WindowRole {
    pub fn for_mode(mode: &PresentationMode) -> Self {
        match mode {
            PresentationMode::Windowed { .. } => WindowRole::Normal,
            PresentationMode::Preview { .. } => WindowRole::ChildPreview,
            PresentationMode::Fullscreen => WindowRole::ScreensaverIdle,
        }
    }

    /// Whether `input` ends the session for this role.
    pub fn should_quit(self, input: HostInput, idle: &mut IdleDetector) -> bool {
        match (self, input) {
            (_, HostInput::CloseRequested | HostInput::Destroyed) => true,
            (WindowRole::ScreensaverIdle, HostInput::KeyPressed | HostInput::ButtonPressed) => {
                true
            }
            (WindowRole::ScreensaverIdle, HostInput::CursorMoved(position)) => {
                idle.cursor_moved(position)
            }
            _ => false,
        }
    }
}

/// The subset of window input the roles care about.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostInput {
    CloseRequested,
    Destroyed,
    KeyPressed,
    ButtonPressed,
    CursorMoved(PhysicalPosition<f64>),
}

impl HostInput {
    fn from_window_event(event: &WindowEvent) -> Option<Self> {
        match event {
            WindowEvent::CloseRequested => Some(HostInput::CloseRequested),
            WindowEvent::Destroyed => Some(HostInput::Destroyed),
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                Some(HostInput::KeyPressed)
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                ..
            } => Some(HostInput::ButtonPressed),
            WindowEvent::CursorMoved { position, .. } => Some(HostInput::CursorMoved(*position)),
            _ => None,
        }
    }

    /// Moves cursor positions from window-local to desktop coordinates, so
    /// samples from windows on different monitors compare correctly.
    fn on_desktop(self, window_origin: PhysicalPosition<i32>) -> Self {
        match self {
            HostInput::CursorMoved(position) => HostInput::CursorMoved(PhysicalPosition::new(
                position.x + f64::from(window_origin.x),
                position.y + f64::from(window_origin.y),
            )),
            other => other,
        }
    }
}

/// Distinguishes real mouse movement from the jitter and synthetic moves
/// a freshly shown full-screen window receives.
#[derive(Debug, Clone)]
pub struct IdleDetector {
    origin: Option<PhysicalPosition<f64>>,
    threshold: u32,
}

impl IdleDetector {
    pub fn new(threshold: u32) -> Self {
        Self {
            origin: None,
            threshold,
        }
    }

    /// The first sample only records where the cursor started.
    pub fn cursor_moved(&mut self, position: PhysicalPosition<f64>) -> bool {
        let Some(origin) = self.origin else {
            self.origin = Some(position);
            return false;
        };
        let travel = (position.x - origin.x).abs() + (position.y - origin.y).abs();
        travel > f64::from(self.threshold)
    }
}

/// Opens the surface for `config.mode`, starts the render thread and runs
/// the event loop on the calling thread until the session ends.
///
/// Any error that ends the session is also shown in a dialog.
pub fn run(config: &RendererConfig) -> Result<()> {
    let result = run_session(config);
    if let Err(err) = &result {
        show_message_box(WINDOW_TITLE, &format!("{err:#}"));
    }
    result
}

fn run_session(config: &RendererConfig) -> Result<()> {
    let event_loop = EventLoopBuilder::<HostEvent>::with_user_event()
        .build()
        .map_err(|err| anyhow!("failed to create event loop: {err}"))?;

    let (render_monitor, blackout_monitors) = match config.mode {
        PresentationMode::Fullscreen => {
            split_monitors(event_loop.primary_monitor(), event_loop.available_monitors().collect())
                .map_or((None, Vec::new()), |(render, others)| (Some(render), others))
        }
        _ => (None, Vec::new()),
    };

    let window = Arc::new(build_window(&event_loop, &config.mode, render_monitor)?);
    let blackout = blackout_monitors
        .into_iter()
        .map(|monitor| build_blackout_window(&event_loop, monitor))
        .collect::<Result<Vec<_>>>()?;
    if matches!(config.mode, PresentationMode::Fullscreen) {
        window.set_cursor_visible(false);
        for (cover, _) in &blackout {
            cover.set_cursor_visible(false);
        }
    }

    let (programs, watcher) = load_programs(&config.shader)?;
    let size = initial_size(&window, &config.mode);
    let gpu = GpuState::new(Arc::clone(&window), size, config, &programs, &blackout)
        .context("failed to initialise GPU renderer")?;
    let profile = gpu.adapter_profile();
    info!(
        adapter = %profile.name,
        backend = ?profile.backend,
        width = gpu.size().width,
        height = gpu.size().height,
        mode = ?config.mode,
        blacked_out = blackout.len(),
        "renderer ready"
    );
    if profile.is_software() {
        warn!(adapter = %profile.name, "software rasterizer detected; expect low frame rates");
    }

    let built_size = gpu.size();
    let mut scheduler = FrameScheduler::new(gpu, Arc::clone(&window), built_size)
        .with_stats(FrameStats::new(config.stats_interval, config.fps_overlay))
        .with_diagnostics(Box::new(DialogDiagnostics));
    if let Some(watcher) = watcher {
        scheduler = scheduler.with_watcher(watcher);
    }

    let proxy = event_loop.create_proxy();
    let _render_thread = scheduler.spawn(move |message| {
        let _ = proxy.send_event(HostEvent::RenderFailed(message));
    })?;

    // Blackout windows only exist in full-screen mode, so they share its role.
    let hosts: Vec<Arc<Window>> = std::iter::once(Arc::clone(&window))
        .chain(blackout.iter().map(|(cover, _)| Arc::clone(cover)))
        .collect();
    let role = WindowRole::for_mode(&config.mode);
    let mut idle = IdleDetector::new(config.wake_threshold);
    let mut failure = None;
    event_loop
        .run(|event, elwt| {
            elwt.set_control_flow(ControlFlow::Wait);
            match event {
                Event::UserEvent(HostEvent::RenderFailed(message)) => {
                    error!(error = %message, "render loop failed");
                    failure = Some(message);
                    elwt.exit();
                }
                Event::WindowEvent { window_id, event } => {
                    let Some(host) = hosts.iter().find(|host| host.id() == window_id) else {
                        return;
                    };
                    let Some(input) = HostInput::from_window_event(&event) else {
                        return;
                    };
                    let input = input.on_desktop(host.inner_position().unwrap_or_default());
                    if role.should_quit(input, &mut idle) {
                        info!(?role, ?input, "closing");
                        elwt.exit();
                    }
                }
                _ => {}
            }
        })
        .map_err(|err| anyhow!("event loop terminated abnormally: {err}"))?;

    match failure {
        Some(message) => Err(anyhow!("render loop failed: {message}")),
        None => Ok(()),
    }
}

fn load_programs(origin: &ShaderOrigin) -> Result<(CompiledProgramSet, Option<ShaderWatcher>)> {
    match origin {
        ShaderOrigin::Builtin => {
            let programs =
                CompiledProgramSet::builtin().context("failed to compile built-in shader")?;
            Ok((programs, None))
        }
        ShaderOrigin::File { path, hot_reload } => {
            let asset = FileAsset::new(path);
            // Sampled before reading so an edit saved mid-start-up is reloaded.
            let baseline = asset.modified().ok();
            let source = asset
                .read()
                .with_context(|| format!("failed to read shader at {}", path.display()))?;
            let programs = CompiledProgramSet::compile(&Arc::from(source))
                .with_context(|| format!("failed to compile shader {}", path.display()))?;
            let watcher = hot_reload.then(|| ShaderWatcher::with_baseline(asset, baseline));
            if watcher.is_some() {
                info!(shader = %path.display(), "watching shader for changes");
            }
            Ok((programs, watcher))
        }
    }
}

/// Picks the monitor the scene is rendered on and the ones to black out.
///
/// The primary monitor wins. Without one (Wayland reports none) the first
/// listed monitor is used instead.
fn split_monitors<M: PartialEq>(primary: Option<M>, available: Vec<M>) -> Option<(M, Vec<M>)> {
    let mut others = available;
    let render = match primary {
        Some(primary) => primary,
        None if others.is_empty() => return None,
        None => others.remove(0),
    };
    others.retain(|monitor| *monitor != render);
    Some((render, others))
}

fn build_window(
    event_loop: &EventLoop<HostEvent>,
    mode: &PresentationMode,
    monitor: Option<MonitorHandle>,
) -> Result<Window> {
    let builder = WindowBuilder::new().with_title(WINDOW_TITLE);
    let builder = match *mode {
        PresentationMode::Windowed { width, height } => {
            builder.with_inner_size(PhysicalSize::new(width, height))
        }
        // Borderless, never exclusive: the compositor keeps control of the display.
        PresentationMode::Fullscreen => builder
            .with_decorations(false)
            .with_window_level(WindowLevel::AlwaysOnTop)
            .with_fullscreen(Some(Fullscreen::Borderless(monitor))),
        PresentationMode::Preview {
            parent,
            fallback_size,
        } => {
            let size = preview_size(parent_client_size(parent), fallback_size);
            let parent = parent_handle(parent)?;
            let builder = builder
                .with_decorations(false)
                .with_resizable(false)
                .with_inner_size(size);
            // SAFETY: the handle names a window owned by the process that launched
            // us in preview mode; it outlives this child or destroys it first.
            unsafe { builder.with_parent_window(Some(parent)) }
        }
    };
    builder
        .build(event_loop)
        .map_err(|err| anyhow!("failed to create window: {err}"))
}

/// A borderless always-on-top window that keeps `monitor` dark.
fn build_blackout_window(
    event_loop: &EventLoop<HostEvent>,
    monitor: MonitorHandle,
) -> Result<(Arc<Window>, PhysicalSize<u32>)> {
    debug!(monitor = ?monitor.name(), size = ?monitor.size(), "blacking out monitor");
    let window = WindowBuilder::new()
        .with_title(WINDOW_TITLE)
        .with_decorations(false)
        .with_window_level(WindowLevel::AlwaysOnTop)
        .with_fullscreen(Some(Fullscreen::Borderless(Some(monitor))))
        .build(event_loop)
        .map_err(|err| anyhow!("failed to create blackout window: {err}"))?;
    let size = initial_size(&window, &PresentationMode::Fullscreen);
    Ok((Arc::new(window), size))
}

/// The size to build GPU resources at before the first resize is observed.
fn initial_size(window: &Window, mode: &PresentationMode) -> PhysicalSize<u32> {
    let size = window.inner_size();
    if size.width > 0 && size.height > 0 {
        return size;
    }
    match *mode {
        PresentationMode::Windowed { width, height } => PhysicalSize::new(width, height),
        PresentationMode::Preview { fallback_size, .. } => {
            PhysicalSize::new(fallback_size.0, fallback_size.1)
        }
        PresentationMode::Fullscreen => window
            .current_monitor()
            .map(|monitor| monitor.size())
            .unwrap_or_else(|| PhysicalSize::new(1, 1)),
    }
}

/// The parent's client area, or `fallback` when it cannot be measured.
fn preview_size(measured: Result<PhysicalSize<u32>>, fallback: (u32, u32)) -> PhysicalSize<u32> {
    let fallback_size = PhysicalSize::new(fallback.0, fallback.1);
    match measured {
        Ok(size) if size.width > 0 && size.height > 0 => size,
        Ok(size) => {
            warn!(?size, ?fallback, "preview parent has no client area; using fallback size");
            fallback_size
        }
        Err(err) => {
            warn!(error = %format!("{err:#}"), ?fallback, "could not measure preview parent; using fallback size");
            fallback_size
        }
    }
}

#[cfg(windows)]
fn parent_client_size(parent: u64) -> Result<PhysicalSize<u32>> {
    use windows::Win32::Foundation::{HWND, RECT};
    use windows::Win32::UI::WindowsAndMessaging::GetClientRect;

    let mut rect = RECT::default();
    // SAFETY: GetClientRect only writes into `rect`; a stale handle is reported as an error.
    unsafe { GetClientRect(HWND(parent as isize as *mut std::ffi::c_void), &mut rect) }
        .map_err(|err| anyhow!("GetClientRect failed for {parent:#x}: {err}"))?;
    Ok(PhysicalSize::new(
        u32::try_from(rect.right - rect.left).unwrap_or(0),
        u32::try_from(rect.bottom - rect.top).unwrap_or(0),
    ))
}

#[cfg(all(
    unix,
    not(any(target_os = "macos", target_os = "ios", target_os = "android"))
))]
fn parent_client_size(parent: u64) -> Result<PhysicalSize<u32>> {
    use x11rb::protocol::xproto::ConnectionExt as _;

    let window = u32::try_from(parent)
        .map_err(|_| anyhow!("X11 window id {parent:#x} is out of range"))?;
    let (conn, _screen) = x11rb::connect(None).context("failed to connect to the X server")?;
    let geometry = conn
        .get_geometry(window)
        .context("failed to send geometry request")?
        .reply()
        .with_context(|| format!("failed to query geometry of window {parent:#x}"))?;
    Ok(PhysicalSize::new(
        u32::from(geometry.width),
        u32::from(geometry.height),
    ))
}

#[cfg(not(any(
    windows,
    all(
        unix,
        not(any(target_os = "macos", target_os = "ios", target_os = "android"))
    )
)))]
fn parent_client_size(_parent: u64) -> Result<PhysicalSize<u32>> {
    anyhow::bail!("measuring a preview parent is not supported on this platform")
}

#[cfg(windows)]
fn parent_handle(parent: u64) -> Result<raw_window_handle::RawWindowHandle> {
    use std::num::NonZeroIsize;

    let hwnd = NonZeroIsize::new(parent as isize)
        .ok_or_else(|| anyhow!("preview parent handle must be non-zero"))?;
    Ok(raw_window_handle::RawWindowHandle::Win32(
        raw_window_handle::Win32WindowHandle::new(hwnd),
    ))
}

#[cfg(all(
    unix,
    not(any(target_os = "macos", target_os = "ios", target_os = "android"))
))]
fn parent_handle(parent: u64) -> Result<raw_window_handle::RawWindowHandle> {
    if parent == 0 {
        anyhow::bail!("preview parent handle must be non-zero");
    }
    Ok(raw_window_handle::RawWindowHandle::Xlib(
        raw_window_handle::XlibWindowHandle::new(parent as std::os::raw::c_ulong),
    ))
}

#[cfg(not(any(
    windows,
    all(
        unix,
        not(any(target_os = "macos", target_os = "ios", target_os = "android"))
    )
)))]
fn parent_handle(_parent: u64) -> Result<raw_window_handle::RawWindowHandle> {
    anyhow::bail!("preview mode is not supported on this platform")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(x: f64, y: f64) -> HostInput {
        HostInput::CursorMoved(PhysicalPosition::new(x, y))
    }

    #[test]
    fn roles_follow_presentation_mode() {
        assert_eq!(
            WindowRole::for_mode(&PresentationMode::Windowed {
                width: 900,
                height: 600
            }),
            WindowRole::Normal
        );
        assert_eq!(
            WindowRole::for_mode(&PresentationMode::Preview {
                parent: 42,
                fallback_size: (152, 112)
            }),
            WindowRole::ChildPreview
        );
        assert_eq!(
            WindowRole::for_mode(&PresentationMode::Fullscreen),
            WindowRole::ScreensaverIdle
        );
    }

    #[test]
    fn only_the_screensaver_wakes_on_input() {
        let mut idle = IdleDetector::new(4);
        for role in [WindowRole::Normal, WindowRole::ChildPreview] {
            assert!(!role.should_quit(HostInput::KeyPressed, &mut idle));
            assert!(!role.should_quit(HostInput::ButtonPressed, &mut idle));
            assert!(!role.should_quit(at(0.0, 0.0), &mut idle));
            assert!(!role.should_quit(at(500.0, 500.0), &mut idle));
            assert!(role.should_quit(HostInput::CloseRequested, &mut idle));
            assert!(role.should_quit(HostInput::Destroyed, &mut idle));
        }

        let screensaver = WindowRole::ScreensaverIdle;
        assert!(screensaver.should_quit(HostInput::KeyPressed, &mut IdleDetector::new(4)));
        assert!(screensaver.should_quit(HostInput::ButtonPressed, &mut IdleDetector::new(4)));
    }

    #[test]
    fn small_cursor_jitter_does_not_wake() {
        let role = WindowRole::ScreensaverIdle;
        let mut idle = IdleDetector::new(4);
        assert!(!role.should_quit(at(100.0, 100.0), &mut idle));
        assert!(!role.should_quit(at(102.0, 102.0), &mut idle));
        assert!(!role.should_quit(at(98.0, 100.0), &mut idle));
        assert!(role.should_quit(at(103.0, 102.0), &mut idle));
    }

    #[test]
    fn primary_monitor_renders_and_the_rest_go_dark() {
        assert_eq!(split_monitors(Some(2), vec![1, 2, 3]), Some((2, vec![1, 3])));
        assert_eq!(split_monitors(Some(1), vec![1]), Some((1, vec![])));
        assert_eq!(split_monitors(None, vec![4, 5]), Some((4, vec![5])));
        assert_eq!(split_monitors(Some(7), vec![]), Some((7, vec![])));
        assert_eq!(split_monitors::<u8>(None, vec![]), None);
    }

    #[test]
    fn cursor_samples_from_other_monitors_share_one_origin() {
        let role = WindowRole::ScreensaverIdle;
        let mut idle = IdleDetector::new(4);
        let left = PhysicalPosition::new(0, 0);
        let right = PhysicalPosition::new(1920, 0);

        assert!(!role.should_quit(at(1919.0, 500.0).on_desktop(left), &mut idle));
        // One pixel to the right, reported by the window on the next monitor.
        assert!(!role.should_quit(at(0.0, 500.0).on_desktop(right), &mut idle));
        assert!(role.should_quit(at(40.0, 500.0).on_desktop(right), &mut idle));

        assert_eq!(
            HostInput::KeyPressed.on_desktop(right),
            HostInput::KeyPressed
        );
    }

    #[test]
    fn preview_fills_the_measured_parent() {
        assert_eq!(
            preview_size(Ok(PhysicalSize::new(200, 150)), (152, 112)),
            PhysicalSize::new(200, 150)
        );
        assert_eq!(
            preview_size(Ok(PhysicalSize::new(0, 150)), (152, 112)),
            PhysicalSize::new(152, 112)
        );
        assert_eq!(
            preview_size(Err(anyhow!("no display")), (152, 112)),
            PhysicalSize::new(152, 112)
        );
    }

    #[test]
    fn first_sample_only_records_origin() {
        let mut idle = IdleDetector::new(4);
        assert!(!idle.cursor_moved(PhysicalPosition::new(1000.0, 1000.0)));
        assert!(idle.cursor_moved(PhysicalPosition::new(0.0, 0.0)));
    }
}
