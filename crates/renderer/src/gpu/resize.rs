use winit::dpi::PhysicalSize;

/// What the render loop must do after sampling the surface size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeAction {
    /// Same size the GPU resources were built for.
    Unchanged,
    /// One dimension is zero (minimized or collapsed); skip all GPU work.
    Quiescent,
    /// Tear down and rebuild every size-dependent resource at this size.
    Rebuild(PhysicalSize<u32>),
}

/// Remembers the last observed size and the size resources were built for.
#[derive(Debug, Clone, Copy)]
pub struct SizeTracker {
    observed: PhysicalSize<u32>,
    built: PhysicalSize<u32>,
}

impl SizeTracker {
    pub fn new(initial: PhysicalSize<u32>) -> Self {
        Self {
            observed: initial,
            built: initial,
        }
    }

    pub fn observed(&self) -> PhysicalSize<u32> {
        self.observed
    }

    pub fn built(&self) -> PhysicalSize<u32> {
        self.built
    }

    pub fn observe(&mut self, size: PhysicalSize<u32>) -> ResizeAction {
        self.observed = size;
        if size.width == 0 || size.height == 0 {
            return ResizeAction::Quiescent;
        }
        if size == self.built {
            return ResizeAction::Unchanged;
        }
        self.built = size;
        ResizeAction::Rebuild(size)
    }
}

/// Viewport and scissor applied to both passes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Viewport {
    pub width: u32,
    pub height: u32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn covering(size: PhysicalSize<u32>) -> Self {
        Self {
            width: size.width,
            height: size.height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    pub fn apply(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_viewport(
            0.0,
            0.0,
            self.width as f32,
            self.height as f32,
            self.min_depth,
            self.max_depth,
        );
        pass.set_scissor_rect(0, 0, self.width, self.height);
    }
}
