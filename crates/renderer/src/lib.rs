//! Renderer crate for Shadesaver, a full-screen WGSL shader screensaver.
//!
//! The crate owns the GPU device and swap chain, the two offscreen render
//! targets, the shader programs, and the render loop that ties them together.
//! The overall flow is:
//!
//! ```text
//!   shadesaver CLI
//!          │ RendererConfig
//!          ▼
//!   Renderer::run ──▶ window::run ──▶ winit event loop (main thread)
//!                          │
//!                          └─▶ FrameScheduler::spawn ──▶ "shadesaver-render" thread
//!                                 pace ─▶ resize? ─▶ uniforms ─▶ scene pass
//!                                   ▲                                │
//!                                   └── hot reload ◀── present ◀── composite pass
//! ```
//!
//! The event loop only watches for input that ends the session; the render
//! thread polls the window size itself and is the sole owner of every GPU
//! object. Errors and panics on the render thread are reported back to the
//! event loop, which then exits with the error.

mod compile;
mod diagnostics;
mod gpu;
mod reload;
mod runtime;
mod scheduler;
mod types;
mod window;

use anyhow::Result;

pub use compile::{
    compile_entry, CompileError, CompiledProgramSet, ProgramSlot, ProgramStage, ShaderBlob,
    COMPOSITE_PIXEL_ENTRY, PRIMARY_PIXEL_ENTRY, VERTEX_ENTRY,
};
pub use diagnostics::{DiagnosticSink, DialogDiagnostics, LogDiagnostics};
pub use gpu::{ResizeAction, ShaderConstants, SizeTracker};
pub use reload::{
    AssetError, FileAsset, PixelProgramSink, ReloadOutcome, ShaderAsset, ShaderWatcher,
};
pub use runtime::{FrameClock, FrameStats};
pub use scheduler::{
    FrameOutcome, FrameScheduler, FrameTarget, StepOutcome, SurfaceHost, RENDER_THREAD_NAME,
};
pub use types::{
    AdapterProfile, GpuPowerPreference, PacingMode, PresentationMode, RendererConfig,
    ShaderOrigin, DEFAULT_PREVIEW_SIZE, DEFAULT_SHADER_FILE, DEFAULT_WAKE_THRESHOLD,
    DEFAULT_WINDOW_SIZE,
};
pub use window::{HostEvent, HostInput, IdleDetector, WindowRole};

/// High-level entry point that owns the chosen configuration.
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    /// Builds a renderer for the supplied configuration.
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    /// Opens the surface and renders until the user ends the session.
    ///
    /// Returns an error if no compatible GPU is available, the initial shader
    /// fails to compile, or the render loop stops on an unrecoverable fault.
    pub fn run(&self) -> Result<()> {
        window::run(&self.config)
    }
}
