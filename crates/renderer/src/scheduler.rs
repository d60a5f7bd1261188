use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, error};
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::diagnostics::{DiagnosticSink, LogDiagnostics};
use crate::gpu::{ResizeAction, ShaderConstants, SizeTracker};
use crate::reload::{PixelProgramSink, ShaderWatcher};
use crate::runtime::{FrameClock, FrameStats};

/// Name of the thread that runs the render loop.
pub const RENDER_THREAD_NAME: &str = "shadesaver-render";

/// How long the loop idles per iteration while the surface has no area.
const QUIESCENT_SLEEP: Duration = Duration::from_millis(10);

/// The drawable the render loop samples for its current client size.
pub trait SurfaceHost {
    fn client_size(&self) -> PhysicalSize<u32>;
}

impl SurfaceHost for Window {
    fn client_size(&self) -> PhysicalSize<u32> {
        self.inner_size()
    }
}

impl<H: SurfaceHost + ?Sized> SurfaceHost for Arc<H> {
    fn client_size(&self) -> PhysicalSize<u32> {
        (**self).client_size()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    Skipped,
}

/// GPU work the scheduler drives, one call per state of the frame.
pub trait FrameTarget: PixelProgramSink {
    /// Blocks (spinning) until another frame may be queued.
    fn wait_for_frame(&mut self) -> Result<()>;
    /// Rebuilds every size-dependent resource at `size`; both dimensions are non-zero.
    fn resize(&mut self, size: PhysicalSize<u32>) -> Result<()>;
    /// Uploads `constants`, draws both passes and presents.
    fn render(&mut self, constants: &ShaderConstants) -> Result<FrameOutcome>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Rendered,
    /// The back buffer was unavailable this iteration.
    Skipped,
    /// Zero-area surface; no GPU work was issued.
    Quiescent,
}

/// Paces, resizes, renders and hot-reloads, one iteration per `step`.
pub struct FrameScheduler<T, H> {
    target: T,
    host: H,
    sizes: SizeTracker,
    clock: FrameClock,
    stats: FrameStats,
    watcher: Option<ShaderWatcher>,
    diagnostics: Box<dyn DiagnosticSink>,
}

impl<T, H> FrameScheduler<T, H>
where
    T: FrameTarget,
    H: SurfaceHost,
{
    /// `built_size` is the size `target` allocated its resources at.
    pub fn new(target: T, host: H, built_size: PhysicalSize<u32>) -> Self {
        Self {
            target,
            host,
            sizes: SizeTracker::new(built_size),
            clock: FrameClock::new(),
            stats: FrameStats::new(Duration::from_secs(1), false),
            watcher: None,
            diagnostics: Box::new(LogDiagnostics),
        }
    }

    pub fn with_stats(mut self, stats: FrameStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_watcher(mut self, watcher: ShaderWatcher) -> Self {
        self.watcher = Some(watcher);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Box<dyn DiagnosticSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn step(&mut self) -> Result<StepOutcome> {
        self.target.wait_for_frame()?;

        match self.sizes.observe(self.host.client_size()) {
            ResizeAction::Quiescent => return Ok(StepOutcome::Quiescent),
            ResizeAction::Rebuild(size) => {
                debug!(width = size.width, height = size.height, "surface resized");
                self.target.resize(size)?;
            }
            ResizeAction::Unchanged => {}
        }

        let now = Instant::now();
        let constants = ShaderConstants::new(self.sizes.built(), self.clock.elapsed_seconds(now));
        let outcome = match self.target.render(&constants)? {
            FrameOutcome::Presented => {
                self.stats.record(now);
                StepOutcome::Rendered
            }
            FrameOutcome::Skipped => StepOutcome::Skipped,
        };

        if let Some(watcher) = self.watcher.as_mut() {
            watcher.poll(&mut self.target, self.diagnostics.as_mut());
        }

        Ok(outcome)
    }

    /// Steps until an error occurs; never returns `Ok`.
    pub fn run(mut self) -> Result<()> {
        loop {
            if self.step()? == StepOutcome::Quiescent {
                thread::sleep(QUIESCENT_SLEEP);
            }
        }
    }
}

impl<T, H> FrameScheduler<T, H>
where
    T: FrameTarget + Send + 'static,
    H: SurfaceHost + Send + 'static,
{
    /// Runs the loop on its own thread.
    ///
    /// Errors and panics stop the loop and are handed to `on_fatal` as text;
    /// nothing unwinds past the thread boundary.
    pub fn spawn<F>(self, on_fatal: F) -> Result<JoinHandle<()>>
    where
        F: FnOnce(String) + Send + 'static,
    {
        thread::Builder::new()
            .name(RENDER_THREAD_NAME.to_string())
            .spawn(move || {
                let message = match panic::catch_unwind(AssertUnwindSafe(|| self.run())) {
                    Ok(Ok(())) => return,
                    Ok(Err(err)) => format!("{err:#}"),
                    Err(payload) => format!("render thread panicked: {}", panic_message(&*payload)),
                };
                error!(error = %message, "render loop stopped");
                on_fatal(message);
            })
            .context("failed to spawn render thread")
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::fs;
    use std::rc::Rc;
    use std::sync::Mutex;
    use std::time::SystemTime;

    use super::*;
    use crate::compile::{ProgramSlot, ShaderBlob, BUILTIN_SHADER};
    use crate::reload::FileAsset;

    #[derive(Default)]
    struct FakeTarget {
        waits: u32,
        resizes: Vec<PhysicalSize<u32>>,
        frames: Vec<ShaderConstants>,
        swaps: Vec<ProgramSlot>,
        fail_render: bool,
    }

    impl PixelProgramSink for FakeTarget {
        fn hot_swap(&mut self, slot: ProgramSlot, _blob: &ShaderBlob) -> Result<()> {
            self.swaps.push(slot);
            Ok(())
        }
    }

    impl FrameTarget for FakeTarget {
        fn wait_for_frame(&mut self) -> Result<()> {
            self.waits += 1;
            Ok(())
        }

        fn resize(&mut self, size: PhysicalSize<u32>) -> Result<()> {
            self.resizes.push(size);
            Ok(())
        }

        fn render(&mut self, constants: &ShaderConstants) -> Result<FrameOutcome> {
            if self.fail_render {
                anyhow::bail!("device lost");
            }
            self.frames.push(*constants);
            Ok(FrameOutcome::Presented)
        }
    }

    struct FakeHost(Rc<Cell<PhysicalSize<u32>>>);

    impl SurfaceHost for FakeHost {
        fn client_size(&self) -> PhysicalSize<u32> {
            self.0.get()
        }
    }

    struct FixedHost(PhysicalSize<u32>);

    impl SurfaceHost for FixedHost {
        fn client_size(&self) -> PhysicalSize<u32> {
            self.0
        }
    }

    #[derive(Clone, Default)]
    struct SharedDiagnostics(Arc<Mutex<Vec<String>>>);

    impl DiagnosticSink for SharedDiagnostics {
        fn report(&mut self, title: &str, _message: &str) {
            self.0.lock().unwrap().push(title.to_string());
        }
    }

    fn scheduler(
        size: PhysicalSize<u32>,
    ) -> (FrameScheduler<FakeTarget, FakeHost>, Rc<Cell<PhysicalSize<u32>>>) {
        let surface = Rc::new(Cell::new(size));
        let scheduler =
            FrameScheduler::new(FakeTarget::default(), FakeHost(Rc::clone(&surface)), size);
        (scheduler, surface)
    }

    #[test]
    fn first_frame_uses_initial_size_and_zero_time() {
        let (mut scheduler, _surface) = scheduler(PhysicalSize::new(900, 600));
        assert_eq!(scheduler.step().unwrap(), StepOutcome::Rendered);

        let first = scheduler.target().frames[0];
        assert_eq!(first.timer, 0.0);
        assert_eq!(first.aspect_ratio, 600.0 / 900.0);
        assert_eq!(first.pixel_width, 1.0 / 600.0);
        assert!(scheduler.target().resizes.is_empty());
        assert_eq!(scheduler.target().waits, 1);
        assert_eq!(scheduler.stats().total_frames(), 1);
    }

    #[test]
    fn resize_rebuilds_before_the_next_frame() {
        let (mut scheduler, surface) = scheduler(PhysicalSize::new(900, 600));
        scheduler.step().unwrap();

        surface.set(PhysicalSize::new(1280, 720));
        scheduler.step().unwrap();
        scheduler.step().unwrap();

        let target = scheduler.target();
        assert_eq!(target.resizes, vec![PhysicalSize::new(1280, 720)]);
        assert_eq!(target.frames[1].pixel_width, 1.0 / 720.0);
        assert_eq!(target.frames[1].aspect_ratio, 720.0 / 1280.0);
        assert!(target.frames[2].timer >= target.frames[1].timer);
    }

    #[test]
    fn zero_area_skips_gpu_work_and_recovers() {
        let (mut scheduler, surface) = scheduler(PhysicalSize::new(900, 600));
        scheduler.step().unwrap();

        surface.set(PhysicalSize::new(0, 0));
        assert_eq!(scheduler.step().unwrap(), StepOutcome::Quiescent);
        surface.set(PhysicalSize::new(0, 600));
        assert_eq!(scheduler.step().unwrap(), StepOutcome::Quiescent);
        assert_eq!(scheduler.target().frames.len(), 1);
        assert!(scheduler.target().resizes.is_empty());

        surface.set(PhysicalSize::new(640, 480));
        assert_eq!(scheduler.step().unwrap(), StepOutcome::Rendered);
        assert_eq!(scheduler.target().resizes, vec![PhysicalSize::new(640, 480)]);
        assert_eq!(scheduler.target().frames.len(), 2);
    }

    #[test]
    fn broken_shader_edit_is_reported_and_rendering_continues() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shaders.wgsl");
        fs::write(&path, BUILTIN_SHADER).unwrap();
        let original = fs::metadata(&path).unwrap().modified().unwrap();

        let diagnostics = SharedDiagnostics::default();
        let (scheduler, _surface) = scheduler(PhysicalSize::new(900, 600));
        let mut scheduler = scheduler
            .with_watcher(ShaderWatcher::new(FileAsset::new(&path)))
            .with_diagnostics(Box::new(diagnostics.clone()));
        scheduler.step().unwrap();
        assert!(scheduler.target().swaps.is_empty());

        fs::write(&path, "@fragment fn ps_main( {").unwrap();
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(original + Duration::from_secs(5))
            .unwrap();
        scheduler.step().unwrap();
        scheduler.step().unwrap();

        assert_eq!(diagnostics.0.lock().unwrap().len(), 1);
        assert!(scheduler.target().swaps.is_empty());
        assert_eq!(scheduler.target().frames.len(), 3);

        fs::write(&path, BUILTIN_SHADER).unwrap();
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();
        scheduler.step().unwrap();
        assert_eq!(
            scheduler.target().swaps,
            vec![ProgramSlot::Primary, ProgramSlot::Composite]
        );
    }

    #[test]
    fn render_errors_stop_the_thread_and_reach_the_host() {
        let target = FakeTarget {
            fail_render: true,
            ..Default::default()
        };
        let size = PhysicalSize::new(320, 200);
        let (sender, receiver) = crossbeam_channel::bounded(1);
        let handle = FrameScheduler::new(target, FixedHost(size), size)
            .spawn(move |message| {
                let _ = sender.send(message);
            })
            .unwrap();

        let message = receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("fatal error forwarded");
        assert!(message.contains("device lost"));
        handle.join().expect("panic stays inside the render thread");
    }

    struct PanickingTarget;

    impl PixelProgramSink for PanickingTarget {
        fn hot_swap(&mut self, _slot: ProgramSlot, _blob: &ShaderBlob) -> Result<()> {
            Ok(())
        }
    }

    impl FrameTarget for PanickingTarget {
        fn wait_for_frame(&mut self) -> Result<()> {
            panic!("driver hang");
        }

        fn resize(&mut self, _size: PhysicalSize<u32>) -> Result<()> {
            Ok(())
        }

        fn render(&mut self, _constants: &ShaderConstants) -> Result<FrameOutcome> {
            Ok(FrameOutcome::Presented)
        }
    }

    #[test]
    fn panics_are_caught_at_the_thread_boundary() {
        let size = PhysicalSize::new(320, 200);
        let (sender, receiver) = crossbeam_channel::bounded(1);
        let handle = FrameScheduler::new(PanickingTarget, FixedHost(size), size)
            .spawn(move |message| {
                let name = thread::current().name().map(str::to_string);
                let _ = sender.send((message, name));
            })
            .unwrap();

        let (message, name) = receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("panic forwarded");
        assert_eq!(message, "render thread panicked: driver hang");
        assert_eq!(name.as_deref(), Some(RENDER_THREAD_NAME));
        assert!(handle.join().is_ok());
    }
}
