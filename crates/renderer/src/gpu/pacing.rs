use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};

/// Signals when the GPU has finished the most recent submission.
///
/// Armed after every `queue.submit`; the render loop spins on it before
/// starting the next frame so at most one frame is ever in flight.
pub(crate) struct FrameLatencyWaiter {
    ready: Arc<AtomicBool>,
}

impl FrameLatencyWaiter {
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Must be called right after the submit it should track.
    pub fn arm(&self, queue: &wgpu::Queue) {
        self.ready.store(false, Ordering::Release);
        let ready = Arc::clone(&self.ready);
        queue.on_submitted_work_done(move || ready.store(true, Ordering::Release));
    }

    /// Busy-polls the device until the armed submission completes.
    pub fn wait(&self, device: &wgpu::Device) -> Result<()> {
        while !self.is_ready() {
            device
                .poll(wgpu::PollType::Poll)
                .map_err(|err| anyhow!("device poll failed while pacing: {err}"))?;
            std::hint::spin_loop();
        }
        Ok(())
    }
}
