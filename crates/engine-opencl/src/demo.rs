//! Demo kernel: escape-time Mandelbrot rendered to an RGBA8 buffer.
//!
//! Exercises every engine operation end to end (the CLI's `render` command
//! runs it). The fractal body itself carries no correctness guarantees; it
//! exists to give the adaptive sizer real per-batch workloads.

use crate::engine::RenderKernel;
use render_core::{BufferSpec, RenderParams};

/// RGBA8 output, 4 bytes per pixel.
const BYTES_PER_PIXEL: u64 = 4;

/// Name of the demo kernel's single output buffer.
pub const IMAGE_BUFFER: &str = "image";

pub struct MandelbrotKernel {
    max_iter: u32,
}

impl MandelbrotKernel {
    pub fn new(max_iter: u32) -> Self {
        Self {
            max_iter: max_iter.max(1),
        }
    }
}

impl Default for MandelbrotKernel {
    fn default() -> Self {
        Self::new(256)
    }
}

impl RenderKernel for MandelbrotKernel {
    fn entry_point(&self) -> &'static str {
        "mandelbrot"
    }

    fn source(&self) -> String {
        include_str!("kernels/mandelbrot.cl").to_string()
    }

    fn defines(&self, params: &RenderParams) -> String {
        format!(
            "-DIMAGE_WIDTH={} -DIMAGE_HEIGHT={} -DMAX_ITER={}",
            params.width, params.height, self.max_iter
        )
    }

    fn per_pixel_bytes(&self, _params: &RenderParams) -> u64 {
        BYTES_PER_PIXEL
    }

    fn register_buffers(&self, params: &RenderParams) -> Vec<BufferSpec> {
        vec![BufferSpec::output(
            IMAGE_BUFFER,
            params.width * params.height * BYTES_PER_PIXEL as usize,
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use render_core::BufferCategory;

    #[test]
    fn defines_carry_the_image_dimensions() {
        let kernel = MandelbrotKernel::new(100);
        let params = RenderParams {
            width: 320,
            height: 200,
            ..Default::default()
        };
        let defines = kernel.defines(&params);
        assert!(defines.contains("-DIMAGE_WIDTH=320"));
        assert!(defines.contains("-DIMAGE_HEIGHT=200"));
        assert!(defines.contains("-DMAX_ITER=100"));
    }

    #[test]
    fn registers_one_output_buffer_sized_to_the_image() {
        let kernel = MandelbrotKernel::default();
        let params = RenderParams {
            width: 100,
            height: 50,
            ..Default::default()
        };
        let specs = kernel.register_buffers(&params);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, IMAGE_BUFFER);
        assert_eq!(specs[0].category, BufferCategory::Output);
        assert_eq!(specs[0].size_bytes, 100 * 50 * 4);
    }

    #[test]
    fn source_contains_the_entry_point() {
        let kernel = MandelbrotKernel::default();
        assert!(kernel.source().contains("__kernel void mandelbrot"));
    }
}
