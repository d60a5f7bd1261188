use winit::dpi::PhysicalSize;

/// An offscreen color buffer that pass 1 writes and pass 2 samples.
pub(crate) struct RenderTexture {
    texture: wgpu::Texture,
    pub render_view: wgpu::TextureView,
    pub shader_view: wgpu::TextureView,
}

impl RenderTexture {
    fn new(
        device: &wgpu::Device,
        label: &'static str,
        format: wgpu::TextureFormat,
        size: PhysicalSize<u32>,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let render_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            ..Default::default()
        });
        let shader_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            ..Default::default()
        });
        Self {
            texture,
            render_view,
            shader_view,
        }
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        PhysicalSize::new(self.texture.width(), self.texture.height())
    }
}

/// The scene and glow buffers, always allocated together at the surface size.
///
/// There is no in-place resize: `recreate` releases both textures and
/// allocates a fresh pair, along with the bind group pass 2 reads them through.
pub(crate) struct RenderTargetSet {
    scene: RenderTexture,
    glow: RenderTexture,
    bind_group: wgpu::BindGroup,
    format: wgpu::TextureFormat,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
}

impl RenderTargetSet {
    pub fn create(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        size: PhysicalSize<u32>,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
    ) -> Self {
        let scene = RenderTexture::new(device, "scene target", format, size);
        let glow = RenderTexture::new(device, "glow target", format, size);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("render target bind group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&scene.shader_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&glow.shader_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });
        tracing::debug!(
            width = size.width,
            height = size.height,
            ?format,
            "allocated render targets"
        );

        Self {
            scene,
            glow,
            bind_group,
            format,
            layout: layout.clone(),
            sampler: sampler.clone(),
        }
    }

    /// Releases both textures immediately rather than waiting for the last handle to drop.
    pub fn destroy(&self) {
        self.scene.texture.destroy();
        self.glow.texture.destroy();
    }

    pub fn recreate(&mut self, device: &wgpu::Device, size: PhysicalSize<u32>) {
        self.destroy();
        *self = Self::create(device, self.format, size, &self.layout, &self.sampler);
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.scene.size()
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    /// Pass 1 attachments, cleared to opaque black.
    pub fn color_attachments(&self) -> [Option<wgpu::RenderPassColorAttachment<'_>>; 2] {
        [&self.scene, &self.glow].map(|target| {
            Some(wgpu::RenderPassColorAttachment {
                view: &target.render_view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })
        })
    }

    #[cfg(test)]
    pub fn textures(&self) -> [&RenderTexture; 2] {
        [&self.scene, &self.glow]
    }
}

/// Clamp-to-edge linear sampler pass 2 reads both targets with.
pub(crate) fn create_target_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("render target sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}
