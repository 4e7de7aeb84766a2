//! Buffer lifecycle: paired host/device allocations per category.
//!
//! Each tracked buffer owns its host block and its device buffer as one
//! value, so the pair is allocated together and released together — neither
//! half can outlive the other. The device buffer references the host block
//! via `CL_MEM_USE_HOST_PTR`, which is why the host `Vec` is never resized
//! after allocation and why the device handle is declared (and therefore
//! dropped) before the host block.

use crate::error::EngineError;
use opencl3::command_queue::CommandQueue;
use opencl3::context::Context;
use opencl3::memory::{
    Buffer, CL_MEM_READ_ONLY, CL_MEM_READ_WRITE, CL_MEM_USE_HOST_PTR, CL_MEM_WRITE_ONLY,
};
use opencl3::types::CL_BLOCKING;
use render_core::{BufferCategory, BufferSpec};
use std::ffi::c_void;

/// One named buffer with its paired host and device memory.
pub struct TrackedBuffer {
    spec: BufferSpec,
    // Drop order: device buffer first, then the host block it references.
    device: Buffer<u8>,
    host: Vec<u8>,
}

impl TrackedBuffer {
    fn allocate(context: &Context, spec: BufferSpec) -> Result<Self, EngineError> {
        let flags = match spec.category {
            BufferCategory::Input => CL_MEM_READ_ONLY,
            BufferCategory::Output => CL_MEM_WRITE_ONLY,
            BufferCategory::InputOutput => CL_MEM_READ_WRITE,
        } | CL_MEM_USE_HOST_PTR;

        let mut host = vec![0u8; spec.size_bytes];
        // SAFETY: the host block lives exactly as long as the device buffer
        // (both owned by this struct, device dropped first) and is never
        // reallocated.
        let device = unsafe {
            Buffer::<u8>::create(
                context,
                flags,
                spec.size_bytes,
                host.as_mut_ptr() as *mut c_void,
            )
        }
        .map_err(EngineError::buffer("Buffer::create", &spec.name))?;

        Ok(Self { spec, device, host })
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &BufferSpec {
        &self.spec
    }

    pub fn host(&self) -> &[u8] {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut [u8] {
        &mut self.host
    }

    pub(crate) fn device(&self) -> &Buffer<u8> {
        &self.device
    }

    fn write_to(&mut self, queue: &CommandQueue) -> Result<(), EngineError> {
        // SAFETY: blocking write from a host slice that matches the buffer
        // size by construction.
        unsafe {
            queue
                .enqueue_write_buffer(&mut self.device, CL_BLOCKING, 0, &self.host, &[])
                .map_err(EngineError::buffer("enqueue_write_buffer", &self.spec.name))?;
        }
        Ok(())
    }

    fn read_from(&mut self, queue: &CommandQueue) -> Result<(), EngineError> {
        // SAFETY: blocking read into a host slice that matches the buffer
        // size by construction.
        unsafe {
            queue
                .enqueue_read_buffer(&self.device, CL_BLOCKING, 0, &mut self.host, &[])
                .map_err(EngineError::buffer("enqueue_read_buffer", &self.spec.name))?;
        }
        Ok(())
    }
}

/// All tracked buffers of the engine, grouped by category.
#[derive(Default)]
pub struct BufferSet {
    inputs: Vec<TrackedBuffer>,
    outputs: Vec<TrackedBuffer>,
    input_outputs: Vec<TrackedBuffer>,
}

impl BufferSet {
    /// Allocate a fresh generation of buffers from the given specs.
    ///
    /// Any previously held buffers are released first, and any single
    /// allocation failure releases everything allocated so far — a failed
    /// call leaves no partially usable state behind.
    pub fn allocate(&mut self, context: &Context, specs: Vec<BufferSpec>) -> Result<(), EngineError> {
        self.release();
        for spec in specs {
            let buffer = match TrackedBuffer::allocate(context, spec) {
                Ok(b) => b,
                Err(e) => {
                    self.release();
                    return Err(e);
                }
            };
            match buffer.spec.category {
                BufferCategory::Input => self.inputs.push(buffer),
                BufferCategory::Output => self.outputs.push(buffer),
                BufferCategory::InputOutput => self.input_outputs.push(buffer),
            }
        }
        Ok(())
    }

    /// Release every host block and device buffer. Safe to call when the
    /// lists are already empty.
    pub fn release(&mut self) {
        self.inputs.clear();
        self.outputs.clear();
        self.input_outputs.clear();
    }

    /// Blocking host-to-device transfer of every kernel-readable buffer,
    /// followed by a queue-wide finish.
    pub fn write_to_queue(&mut self, queue: &CommandQueue) -> Result<(), EngineError> {
        for buffer in self.inputs.iter_mut().chain(self.input_outputs.iter_mut()) {
            buffer.write_to(queue)?;
        }
        queue
            .finish()
            .map_err(EngineError::api("CommandQueue::finish (write)"))?;
        Ok(())
    }

    /// Blocking device-to-host transfer of every kernel-writable buffer,
    /// followed by a queue-wide finish.
    pub fn read_from_queue(&mut self, queue: &CommandQueue) -> Result<(), EngineError> {
        for buffer in self.outputs.iter_mut().chain(self.input_outputs.iter_mut()) {
            buffer.read_from(queue)?;
        }
        queue
            .finish()
            .map_err(EngineError::api("CommandQueue::finish (read)"))?;
        Ok(())
    }

    /// Buffers in kernel argument slot order: inputs, outputs, input-outputs.
    pub fn bind_order(&self) -> impl Iterator<Item = &TrackedBuffer> {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .chain(self.input_outputs.iter())
    }

    pub fn find(&self, name: &str) -> Option<&TrackedBuffer> {
        self.bind_order().find(|b| b.name() == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut TrackedBuffer> {
        self.inputs
            .iter_mut()
            .chain(self.outputs.iter_mut())
            .chain(self.input_outputs.iter_mut())
            .find(|b| b.name() == name)
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty() && self.input_outputs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inputs.len() + self.outputs.len() + self.input_outputs.len()
    }
}
