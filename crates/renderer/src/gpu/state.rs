use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::compile::{CompiledProgramSet, ProgramSlot, ShaderBlob};
use crate::reload::PixelProgramSink;
use crate::scheduler::{FrameOutcome, FrameTarget};
use crate::types::{AdapterProfile, RendererConfig};

use super::context::{BackBuffer, GpuContext};
use super::pipeline::ProgramStore;
use super::resize::Viewport;
use super::targets::{create_target_sampler, RenderTargetSet};
use super::uniforms::ShaderConstants;

/// Every GPU object the render thread owns, dropped together when it exits.
pub(crate) struct GpuState {
    context: GpuContext,
    programs: ProgramStore,
    targets: RenderTargetSet,
    viewport: Viewport,
    _blackout: Vec<wgpu::Surface<'static>>,
}

impl GpuState {
    pub(crate) fn new(
        window: Arc<Window>,
        initial_size: PhysicalSize<u32>,
        config: &RendererConfig,
        programs: &CompiledProgramSet,
        blackout: &[(Arc<Window>, PhysicalSize<u32>)],
    ) -> Result<Self> {
        let context = GpuContext::new(window, initial_size, config.pacing, config.power)?;
        // A monitor left uncovered is cosmetic; the session still runs.
        let blackout = blackout
            .iter()
            .filter_map(|(window, size)| {
                context
                    .paint_black(Arc::clone(window), *size)
                    .map_err(|err| warn!(error = %format!("{err:#}"), "failed to black out monitor"))
                    .ok()
            })
            .collect();
        let programs = ProgramStore::load(&context.device, context.surface_format, programs)
            .context("failed to create shader programs")?;
        let sampler = create_target_sampler(&context.device);
        let size = PhysicalSize::new(context.config.width, context.config.height);
        let targets = RenderTargetSet::create(
            &context.device,
            context.surface_format,
            size,
            &programs.layouts().target_layout,
            &sampler,
        );

        Ok(Self {
            viewport: Viewport::covering(size),
            context,
            programs,
            targets,
            _blackout: blackout,
        })
    }

    pub(crate) fn adapter_profile(&self) -> &AdapterProfile {
        &self.context.adapter_profile
    }

    /// Size every size-dependent resource is currently allocated at.
    pub(crate) fn size(&self) -> PhysicalSize<u32> {
        self.targets.size()
    }

    fn encode_passes(&self, back_buffer: &BackBuffer) -> wgpu::CommandBuffer {
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("frame encoder"),
                });

        {
            let attachments = self.targets.color_attachments();
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene pass"),
                color_attachments: &attachments,
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            self.viewport.apply(&mut pass);
            pass.set_pipeline(self.programs.pipeline(ProgramSlot::Primary));
            pass.set_bind_group(0, self.programs.uniform_bind_group(), &[]);
            pass.draw(0..4, 0..1);
        }

        // The scene pass has ended, so both targets can now be sampled.
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("composite pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &back_buffer.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            self.viewport.apply(&mut pass);
            pass.set_pipeline(self.programs.pipeline(ProgramSlot::Composite));
            pass.set_bind_group(0, self.programs.uniform_bind_group(), &[]);
            pass.set_bind_group(1, self.targets.bind_group(), &[]);
            pass.draw(0..4, 0..1);
        }

        encoder.finish()
    }
}

impl FrameTarget for GpuState {
    fn wait_for_frame(&mut self) -> Result<()> {
        self.context.wait_for_frame()
    }

    fn resize(&mut self, size: PhysicalSize<u32>) -> Result<()> {
        // Only reached between frames, so no pass still references the old targets.
        self.targets.recreate(&self.context.device, size);
        self.context.resize(size);
        self.viewport = Viewport::covering(size);
        debug!(
            width = size.width,
            height = size.height,
            pacing = ?self.context.pacing(),
            "rebuilt size-dependent resources"
        );
        Ok(())
    }

    fn render(&mut self, constants: &ShaderConstants) -> Result<FrameOutcome> {
        let Some(back_buffer) = self.context.acquire_backbuffer()? else {
            return Ok(FrameOutcome::Skipped);
        };
        if back_buffer.size() != self.targets.size() {
            debug!(
                back_buffer = ?back_buffer.size(),
                targets = ?self.targets.size(),
                "back buffer does not match render targets; skipping frame"
            );
            return Ok(FrameOutcome::Skipped);
        }

        self.programs
            .upload_constants(&self.context.queue, constants);
        let commands = self.encode_passes(&back_buffer);
        self.context.present(commands, back_buffer);
        Ok(FrameOutcome::Presented)
    }
}

impl PixelProgramSink for GpuState {
    fn hot_swap(&mut self, slot: ProgramSlot, blob: &ShaderBlob) -> Result<()> {
        self.programs.hot_swap(&self.context.device, slot, blob)
    }
}
