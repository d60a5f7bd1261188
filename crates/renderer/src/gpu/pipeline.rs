use anyhow::{anyhow, Result};

use crate::compile::{CompiledProgramSet, ProgramSlot, ShaderBlob};

use super::uniforms::ShaderConstants;

/// Bind group and pipeline layouts shared by every program generation.
pub(crate) struct ProgramLayouts {
    pub uniform_layout: wgpu::BindGroupLayout,
    pub target_layout: wgpu::BindGroupLayout,
    scene_layout: wgpu::PipelineLayout,
    composite_layout: wgpu::PipelineLayout,
}

impl ProgramLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(
                        std::mem::size_of::<ShaderConstants>() as u64,
                    ),
                },
                count: None,
            }],
        });

        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let target_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("render target layout"),
            entries: &[
                texture_entry(0),
                texture_entry(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let scene_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("scene pipeline layout"),
            bind_group_layouts: &[&uniform_layout],
            push_constant_ranges: &[],
        });
        let composite_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("composite pipeline layout"),
            bind_group_layouts: &[&uniform_layout, &target_layout],
            push_constant_ranges: &[],
        });

        Self {
            uniform_layout,
            target_layout,
            scene_layout,
            composite_layout,
        }
    }
}

/// Two program slots whose contents are only ever replaced whole.
pub(crate) struct ProgramSlots<P> {
    programs: [P; 2],
}

impl<P> ProgramSlots<P> {
    pub fn new(primary: P, composite: P) -> Self {
        Self {
            programs: [primary, composite],
        }
    }

    pub fn get(&self, slot: ProgramSlot) -> &P {
        &self.programs[slot.index()]
    }

    /// Builds the replacement first and swaps it in only if that succeeded.
    ///
    /// Returns the program that was displaced so the caller decides when it is released.
    pub fn replace_with<E>(
        &mut self,
        slot: ProgramSlot,
        build: impl FnOnce() -> Result<P, E>,
    ) -> Result<P, E> {
        let replacement = build()?;
        Ok(std::mem::replace(
            &mut self.programs[slot.index()],
            replacement,
        ))
    }
}

/// Compiled GPU programs plus the per-frame uniform buffer they read.
pub(crate) struct ProgramStore {
    layouts: ProgramLayouts,
    vertex_module: wgpu::ShaderModule,
    slots: ProgramSlots<wgpu::RenderPipeline>,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    target_format: wgpu::TextureFormat,
}

impl ProgramStore {
    pub fn load(
        device: &wgpu::Device,
        target_format: wgpu::TextureFormat,
        programs: &CompiledProgramSet,
    ) -> Result<Self> {
        let layouts = ProgramLayouts::new(device);
        let vertex_module = create_checked_module(device, &programs.vertex)?;

        let primary = build_pipeline(
            device,
            &layouts,
            &vertex_module,
            ProgramSlot::Primary,
            &programs.primary,
            target_format,
        )?;
        let composite = build_pipeline(
            device,
            &layouts,
            &vertex_module,
            ProgramSlot::Composite,
            &programs.composite,
            target_format,
        )?;

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("shader constants"),
            size: std::mem::size_of::<ShaderConstants>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform bind group"),
            layout: &layouts.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        Ok(Self {
            layouts,
            vertex_module,
            slots: ProgramSlots::new(primary, composite),
            uniform_buffer,
            uniform_bind_group,
            target_format,
        })
    }

    pub fn layouts(&self) -> &ProgramLayouts {
        &self.layouts
    }

    /// Replaces the pipeline in `slot`; on error the current pipeline stays bound.
    pub fn hot_swap(
        &mut self,
        device: &wgpu::Device,
        slot: ProgramSlot,
        blob: &ShaderBlob,
    ) -> Result<()> {
        let layouts = &self.layouts;
        let vertex_module = &self.vertex_module;
        let format = self.target_format;
        let previous = self.slots.replace_with(slot, || {
            build_pipeline(device, layouts, vertex_module, slot, blob, format)
        })?;
        drop(previous);
        tracing::debug!(?slot, entry_point = blob.entry_point(), "swapped pixel program");
        Ok(())
    }

    pub fn pipeline(&self, slot: ProgramSlot) -> &wgpu::RenderPipeline {
        self.slots.get(slot)
    }

    pub fn uniform_bind_group(&self) -> &wgpu::BindGroup {
        &self.uniform_bind_group
    }

    pub fn upload_constants(&self, queue: &wgpu::Queue, constants: &ShaderConstants) {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(constants));
    }
}

/// Creates a module under its own validation scope so a device-level
/// rejection comes back as an error instead of reaching the uncaptured handler.
fn create_checked_module(device: &wgpu::Device, blob: &ShaderBlob) -> Result<wgpu::ShaderModule> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = blob.create_module(device);
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(anyhow!(
            "failed to create {:?} module `{}`: {err}",
            blob.stage(),
            blob.entry_point()
        ));
    }
    Ok(module)
}

fn build_pipeline(
    device: &wgpu::Device,
    layouts: &ProgramLayouts,
    vertex_module: &wgpu::ShaderModule,
    slot: ProgramSlot,
    blob: &ShaderBlob,
    format: wgpu::TextureFormat,
) -> Result<wgpu::RenderPipeline> {
    let target = Some(wgpu::ColorTargetState {
        format,
        blend: None,
        write_mask: wgpu::ColorWrites::ALL,
    });
    let (label, layout, targets) = match slot {
        ProgramSlot::Primary => (
            "scene pipeline",
            &layouts.scene_layout,
            vec![target.clone(), target],
        ),
        ProgramSlot::Composite => ("composite pipeline", &layouts.composite_layout, vec![target]),
    };

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pixel_module = blob.create_module(device);
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: vertex_module,
            entry_point: Some(crate::compile::VERTEX_ENTRY),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &pixel_module,
            entry_point: Some(blob.entry_point()),
            targets: &targets,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(anyhow!("failed to create {label}: {err}"));
    }
    Ok(pipeline)
}
