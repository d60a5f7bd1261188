use bytemuck::{Pod, Zeroable};
use winit::dpi::PhysicalSize;

/// Per-frame values read by every shader program through uniform slot 0.
///
/// Field order and the 16-byte block size are part of the shader contract;
/// `shaders/default.wgsl` declares the same struct.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ShaderConstants {
    pub aspect_ratio: f32,
    pub timer: f32,
    pub pixel_width: f32,
    pub _padding: f32,
}

unsafe impl Zeroable for ShaderConstants {}
unsafe impl Pod for ShaderConstants {}

impl ShaderConstants {
    /// Derives the uniforms for a non-zero surface at `timer` seconds.
    pub fn new(size: PhysicalSize<u32>, timer: f32) -> Self {
        let width = size.width as f32;
        let height = size.height as f32;
        Self {
            aspect_ratio: height / width,
            timer,
            pixel_width: 1.0 / height,
            _padding: 0.0,
        }
    }
}
