use anyhow::{anyhow, Context as AnyhowContext, Result};
use winit::dpi::PhysicalSize;

use crate::types::{AdapterProfile, GpuPowerPreference, PacingMode};

use super::pacing::FrameLatencyWaiter;

/// One queued frame keeps the swap chain at two images.
const MAX_FRAME_LATENCY: u32 = 1;

/// The swap-chain image currently being rendered into.
pub(crate) struct BackBuffer {
    frame: wgpu::SurfaceTexture,
    pub view: wgpu::TextureView,
}

impl BackBuffer {
    pub fn size(&self) -> PhysicalSize<u32> {
        PhysicalSize::new(self.frame.texture.width(), self.frame.texture.height())
    }
}

pub(crate) struct GpuContext {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub surface_format: wgpu::TextureFormat,
    pub adapter_profile: AdapterProfile,
    pacing: PacingMode,
    waiter: FrameLatencyWaiter,
}

impl GpuContext {
    pub(crate) fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        initial_size: PhysicalSize<u32>,
        pacing: PacingMode,
        gpu_power: GpuPowerPreference,
    ) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let surface = instance
            .create_surface(target)
            .context("failed to create rendering surface")?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: power_preference(gpu_power),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("failed to find a suitable GPU adapter")?;

        let adapter_info = adapter.get_info();
        let limits = adapter.limits();
        let adapter_profile = AdapterProfile::from_wgpu(&adapter_info);
        tracing::debug!(
            name = %adapter_profile.name,
            backend = ?adapter_profile.backend,
            device_type = ?adapter_profile.device_type,
            is_software = adapter_profile.is_software(),
            "selected GPU adapter"
        );

        let max_dimension = limits.max_texture_dimension_2d;
        let requested_width = initial_size.width.max(1);
        let requested_height = initial_size.height.max(1);
        if requested_width > max_dimension || requested_height > max_dimension {
            anyhow::bail!(
                "GPU max texture dimension is {max_dimension}, requested surface is {width}x{height}",
                max_dimension = max_dimension,
                width = requested_width,
                height = requested_height
            );
        }

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = select_surface_format(&surface_caps.formats)
            .ok_or_else(|| anyhow!("surface reports no supported formats"))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("shadesaver device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits.clone(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))
        .context("failed to create GPU device")?;

        let present_mode = select_present_mode(&surface_caps.present_modes, pacing);
        tracing::debug!(?present_mode, ?pacing, ?surface_format, "using present mode");

        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let size = PhysicalSize::new(requested_width, requested_height);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: MAX_FRAME_LATENCY,
        };
        surface.configure(&device, &config);

        Ok(Self {
            instance,
            adapter,
            surface,
            device,
            queue,
            config,
            surface_format,
            adapter_profile,
            pacing,
            waiter: FrameLatencyWaiter::new(),
        })
    }

    pub(crate) fn pacing(&self) -> PacingMode {
        self.pacing
    }

    /// Rebuilds the swap chain images at `new_size`, keeping format and present mode.
    pub(crate) fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }

        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
    }

    /// Presents one black frame into another window.
    ///
    /// The returned surface must be kept alive for the frame to stay up.
    pub(crate) fn paint_black(
        &self,
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        size: PhysicalSize<u32>,
    ) -> Result<wgpu::Surface<'static>> {
        let surface = self
            .instance
            .create_surface(target)
            .context("failed to create blackout surface")?;
        let caps = surface.get_capabilities(&self.adapter);
        let format = caps
            .formats
            .first()
            .copied()
            .ok_or_else(|| anyhow!("blackout surface is not supported by the selected adapter"))?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: MAX_FRAME_LATENCY,
        };
        surface.configure(&self.device, &config);

        let frame = surface
            .get_current_texture()
            .map_err(|err| anyhow!("failed to acquire blackout frame: {err}"))?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("blackout encoder"),
            });
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("blackout pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
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
        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(surface)
    }

    /// Spins until the previous frame's work has left the GPU.
    pub(crate) fn wait_for_frame(&self) -> Result<()> {
        self.waiter.wait(&self.device)
    }

    /// Acquires the next swap-chain image.
    ///
    /// Returns `Ok(None)` when the frame should be skipped: the surface was
    /// lost or outdated (it is reconfigured here) or acquisition timed out.
    pub(crate) fn acquire_backbuffer(&mut self) -> Result<Option<BackBuffer>> {
        match self.surface.get_current_texture() {
            Ok(frame) => {
                let view = frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                Ok(Some(BackBuffer { frame, view }))
            }
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::debug!(
                    width = self.config.width,
                    height = self.config.height,
                    "surface lost or outdated; reconfiguring"
                );
                self.surface.configure(&self.device, &self.config);
                Ok(None)
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::warn!("timed out acquiring back buffer; skipping frame");
                Ok(None)
            }
            Err(err) => Err(anyhow!("failed to acquire back buffer: {err}")),
        }
    }

    /// Submits the frame's commands, arms the latency signal and presents.
    pub(crate) fn present(&self, commands: wgpu::CommandBuffer, back_buffer: BackBuffer) {
        self.queue.submit(std::iter::once(commands));
        self.waiter.arm(&self.queue);
        back_buffer.frame.present();
    }
}

fn power_preference(gpu_power: GpuPowerPreference) -> wgpu::PowerPreference {
    match gpu_power {
        GpuPowerPreference::Low => wgpu::PowerPreference::LowPower,
        GpuPowerPreference::High => wgpu::PowerPreference::HighPerformance,
    }
}

/// Prefers a non-sRGB format so shader output reaches the display unconverted.
fn select_surface_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    let fallback = *formats.first()?;
    let format = formats
        .iter()
        .copied()
        .find(|format| !format.is_srgb())
        .unwrap_or_else(|| {
            tracing::warn!(
                ?fallback,
                "no linear (non-sRGB) surface format available; falling back to {:?}",
                fallback
            );
            fallback
        });
    Some(format)
}

/// Never selects `Immediate`: presentation must stay tear-free.
fn select_present_mode(modes: &[wgpu::PresentMode], pacing: PacingMode) -> wgpu::PresentMode {
    let supports = |wanted| modes.contains(&wanted);
    match pacing {
        PacingMode::Waitable if supports(wgpu::PresentMode::Mailbox) => wgpu::PresentMode::Mailbox,
        _ => wgpu::PresentMode::Fifo,
    }
}
