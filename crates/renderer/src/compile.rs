use std::borrow::Cow;
use std::sync::Arc;

use wgpu::naga;

/// Vertex entry point every shader asset must export.
pub const VERTEX_ENTRY: &str = "vs_main";
/// Pixel entry point for the offscreen scene pass.
pub const PRIMARY_PIXEL_ENTRY: &str = "ps_main";
/// Pixel entry point for the composite pass into the back buffer.
pub const COMPOSITE_PIXEL_ENTRY: &str = "post_ps_main";

/// Shader used when no asset is configured and `shaders.wgsl` is absent.
pub(crate) const BUILTIN_SHADER: &str = include_str!("../shaders/default.wgsl");

/// Pipeline stage an entry point is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramStage {
    Vertex,
    Pixel,
}

impl ProgramStage {
    fn naga_stage(self) -> naga::ShaderStage {
        match self {
            ProgramStage::Vertex => naga::ShaderStage::Vertex,
            ProgramStage::Pixel => naga::ShaderStage::Fragment,
        }
    }
}

/// Hot-swappable pixel program slots, in the order they are reloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramSlot {
    /// Draws the scene into both offscreen targets.
    Primary,
    /// Samples both offscreen targets and writes the back buffer.
    Composite,
}

impl ProgramSlot {
    pub const ALL: [ProgramSlot; 2] = [ProgramSlot::Primary, ProgramSlot::Composite];

    pub fn entry_point(self) -> &'static str {
        match self {
            ProgramSlot::Primary => PRIMARY_PIXEL_ENTRY,
            ProgramSlot::Composite => COMPOSITE_PIXEL_ENTRY,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            ProgramSlot::Primary => 0,
            ProgramSlot::Composite => 1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("{0}")]
    Parse(String),
    #[error("shader validation failed: {0}")]
    Validation(String),
    #[error("entry point `{entry_point}` not found for {stage:?} stage")]
    MissingEntryPoint {
        entry_point: &'static str,
        stage: ProgramStage,
    },
}

/// A single validated entry point, ready to be turned into a GPU program.
///
/// Validation runs with every naga capability enabled; features the device
/// lacks are only caught when the blob becomes a GPU module.
#[derive(Debug, Clone)]
pub struct ShaderBlob {
    source: Arc<str>,
    entry_point: &'static str,
    stage: ProgramStage,
}

impl ShaderBlob {
    pub fn entry_point(&self) -> &'static str {
        self.entry_point
    }

    pub fn stage(&self) -> ProgramStage {
        self.stage
    }

    pub(crate) fn create_module(&self, device: &wgpu::Device) -> wgpu::ShaderModule {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(self.entry_point),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(self.source.to_string())),
        })
    }
}

/// Parses and validates `source`, then checks that `entry_point` exists for `stage`.
pub fn compile_entry(
    source: &Arc<str>,
    entry_point: &'static str,
    stage: ProgramStage,
) -> Result<ShaderBlob, CompileError> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|err| CompileError::Parse(err.emit_to_string(source)))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|err| CompileError::Validation(err.to_string()))?;

    let found = module
        .entry_points
        .iter()
        .any(|entry| entry.name == entry_point && entry.stage == stage.naga_stage());
    if !found {
        return Err(CompileError::MissingEntryPoint { entry_point, stage });
    }

    Ok(ShaderBlob {
        source: Arc::clone(source),
        entry_point,
        stage,
    })
}

/// Every program the renderer needs at start-up, compiled from one source.
#[derive(Debug, Clone)]
pub struct CompiledProgramSet {
    pub vertex: ShaderBlob,
    pub primary: ShaderBlob,
    pub composite: ShaderBlob,
}

impl CompiledProgramSet {
    pub fn compile(source: &Arc<str>) -> Result<Self, CompileError> {
        Ok(Self {
            vertex: compile_entry(source, VERTEX_ENTRY, ProgramStage::Vertex)?,
            primary: compile_entry(
                source,
                ProgramSlot::Primary.entry_point(),
                ProgramStage::Pixel,
            )?,
            composite: compile_entry(
                source,
                ProgramSlot::Composite.entry_point(),
                ProgramStage::Pixel,
            )?,
        })
    }

    pub fn builtin() -> Result<Self, CompileError> {
        Self::compile(&Arc::from(BUILTIN_SHADER))
    }
}
