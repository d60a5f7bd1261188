//! GPU side of the renderer.
//!
//! - `context` owns the wgpu instance, device, queue and configured surface
//!   (the swap chain) and hands out back buffers.
//! - `pacing` is the frame-latency signal the render loop spins on.
//! - `targets` holds the two offscreen buffers pass 1 writes and pass 2 reads.
//! - `pipeline` builds render pipelines from validated WGSL and swaps pixel
//!   programs without ever leaving a slot empty.
//! - `resize` decides when size-dependent resources must be rebuilt.
//! - `uniforms` is the per-frame constant block shared with every shader.
//! - `state` glues these together behind the `FrameTarget` seam.

mod context;
mod pacing;
mod pipeline;
mod resize;
mod state;
mod targets;
mod uniforms;

pub(crate) use state::GpuState;

pub use resize::{ResizeAction, SizeTracker};
pub use uniforms::ShaderConstants;
