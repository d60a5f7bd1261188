use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::info;

use crate::compile::{compile_entry, ProgramSlot, ProgramStage, ShaderBlob};
use crate::diagnostics::DiagnosticSink;

/// Windows `ERROR_SHARING_VIOLATION`: another process has the file open for writing.
#[cfg(windows)]
const ERROR_SHARING_VIOLATION: i32 = 32;

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("shader asset is locked by another process")]
    Busy,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Shader source the watcher polls.
pub trait ShaderAsset {
    fn modified(&self) -> io::Result<SystemTime>;
    fn read(&self) -> Result<String, AssetError>;
    fn describe(&self) -> String;
}

/// A WGSL file on disk.
#[derive(Debug, Clone)]
pub struct FileAsset {
    path: PathBuf,
}

impl FileAsset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ShaderAsset for FileAsset {
    fn modified(&self) -> io::Result<SystemTime> {
        fs::metadata(&self.path)?.modified()
    }

    fn read(&self) -> Result<String, AssetError> {
        fs::read_to_string(&self.path).map_err(|err| {
            if is_sharing_violation(&err) {
                AssetError::Busy
            } else {
                AssetError::Io(err)
            }
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(windows)]
fn is_sharing_violation(err: &io::Error) -> bool {
    err.raw_os_error() == Some(ERROR_SHARING_VIOLATION)
}

#[cfg(not(windows))]
fn is_sharing_violation(_err: &io::Error) -> bool {
    false
}

/// Receives validated pixel programs; implemented by the GPU program store.
pub trait PixelProgramSink {
    fn hot_swap(&mut self, slot: ProgramSlot, blob: &ShaderBlob) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Unchanged,
    Reloaded,
    Failed,
}

/// Polls a shader asset's modification time and hot-swaps its pixel programs.
///
/// The stored timestamp advances after every attempt that got past a locked
/// file, including failed ones, so one bad edit is reported once and not
/// retried until the file changes again.
pub struct ShaderWatcher<A = FileAsset> {
    asset: A,
    last_modified: Option<SystemTime>,
}

impl<A: ShaderAsset> ShaderWatcher<A> {
    /// Starts watching from the asset's current timestamp.
    pub fn new(asset: A) -> Self {
        let last_modified = asset.modified().ok();
        Self::with_baseline(asset, last_modified)
    }

    /// Starts watching from a timestamp sampled before the initial read, so an
    /// edit landing between that read and this call is still picked up.
    pub fn with_baseline(asset: A, last_modified: Option<SystemTime>) -> Self {
        Self {
            asset,
            last_modified,
        }
    }

    pub fn poll(
        &mut self,
        sink: &mut dyn PixelProgramSink,
        diagnostics: &mut dyn DiagnosticSink,
    ) -> ReloadOutcome {
        // Editors can briefly remove the file while saving; try again next poll.
        let Ok(modified) = self.asset.modified() else {
            return ReloadOutcome::Unchanged;
        };
        if self.last_modified == Some(modified) {
            return ReloadOutcome::Unchanged;
        }

        let outcome = self.reload(sink, diagnostics);
        self.last_modified = Some(modified);
        outcome
    }

    fn read_source(&self) -> io::Result<String> {
        loop {
            match self.asset.read() {
                Ok(source) => return Ok(source),
                Err(AssetError::Busy) => std::hint::spin_loop(),
                Err(AssetError::Io(err)) => return Err(err),
            }
        }
    }

    fn reload(
        &self,
        sink: &mut dyn PixelProgramSink,
        diagnostics: &mut dyn DiagnosticSink,
    ) -> ReloadOutcome {
        let name = self.asset.describe();
        let source: Arc<str> = match self.read_source() {
            Ok(source) => Arc::from(source),
            Err(err) => {
                diagnostics.report("Shader reload failed", &format!("failed to read {name}: {err}"));
                return ReloadOutcome::Failed;
            }
        };

        for slot in ProgramSlot::ALL {
            let blob = match compile_entry(&source, slot.entry_point(), ProgramStage::Pixel) {
                Ok(blob) => blob,
                Err(err) => {
                    diagnostics.report("Shader compile error", &format!("{name}:\n{err}"));
                    return ReloadOutcome::Failed;
                }
            };
            if let Err(err) = sink.hot_swap(slot, &blob) {
                diagnostics.report("Shader reload failed", &format!("{name}: {err:#}"));
                return ReloadOutcome::Failed;
            }
        }

        info!(shader = %name, "reloaded shader programs");
        ReloadOutcome::Reloaded
    }
}
