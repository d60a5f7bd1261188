use std::time::{Duration, Instant};

/// Wall-clock time fed to the shader's `timer` uniform.
///
/// The origin is latched by the first sample, so the first frame always
/// sees exactly zero regardless of how long start-up took.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameClock {
    origin: Option<Instant>,
}

impl FrameClock {
    /// Creates a clock that starts counting at its first sample.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds elapsed since the first sample.
    ///
    /// Computed from the full-resolution `Duration` each time, so there is no
    /// accumulated rounding across frames. Samples earlier than the origin
    /// saturate to zero.
    pub fn elapsed_seconds(&mut self, now: Instant) -> f32 {
        let origin = *self.origin.get_or_insert(now);
        now.saturating_duration_since(origin).as_secs_f64() as f32
    }
}

/// Frames-per-second accounting for presented frames.
#[derive(Debug, Clone)]
pub struct FrameStats {
    interval: Duration,
    overlay: bool,
    window_start: Option<Instant>,
    frames_in_window: u32,
    total_frames: u64,
    last_fps: Option<f32>,
}

impl FrameStats {
    /// `overlay` promotes the periodic report from `debug` to `info`.
    pub fn new(interval: Duration, overlay: bool) -> Self {
        Self {
            interval,
            overlay,
            window_start: None,
            frames_in_window: 0,
            total_frames: 0,
            last_fps: None,
        }
    }

    /// Counts one presented frame; returns the new rate when a window closes.
    pub fn record(&mut self, now: Instant) -> Option<f32> {
        self.total_frames = self.total_frames.saturating_add(1);
        let start = *self.window_start.get_or_insert(now);
        self.frames_in_window += 1;

        let elapsed = now.saturating_duration_since(start);
        if elapsed < self.interval || elapsed.is_zero() {
            return None;
        }

        let fps = self.frames_in_window as f32 / elapsed.as_secs_f32();
        self.frames_in_window = 0;
        self.window_start = Some(now);
        self.last_fps = Some(fps);

        if self.overlay {
            tracing::info!(fps = fps.round(), frames = self.total_frames, "render stats");
        } else {
            tracing::debug!(fps = fps.round(), frames = self.total_frames, "render stats");
        }
        Some(fps)
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn last_fps(&self) -> Option<f32> {
        self.last_fps
    }
}
