#![deny(rust_2018_idioms)]

//! Adaptive OpenCL render engine.
//!
//! Turns "render N pixels" into a bounded sequence of device dispatches:
//! each batch is sized from the previous batch's wall-clock duration so
//! dispatches track a target cycle time, never exceed the memory-derived
//! work-item ceiling, and never request more work than remains.
//!
//! Responsibilities:
//! - Compile and cache the kernel program (content-hash comparison skips
//!   unchanged rebuilds).
//! - Provision paired host/device buffers in three categories and bind them
//!   to kernel argument slots in a fixed order.
//! - Run the per-batch loop: size, write, dispatch, read, measure.
//! - Serialize all engine state mutation behind one execution lock.
//!
//! "No OpenCL device" is a normal, handled state: [`OpenClHardware::new`]
//! returns [`EngineError::NoDevice`] and callers degrade gracefully.

pub mod buffers;
pub mod demo;
mod driver_cache;
pub mod engine;
pub mod error;
pub mod hardware;
pub mod lock;

pub use buffers::{BufferSet, TrackedBuffer};
pub use demo::MandelbrotKernel;
pub use engine::{ClEngine, RenderKernel, RenderStatus};
pub use error::EngineError;
pub use hardware::{DeviceInfo, OpenClHardware};
pub use lock::{ExecutionGuard, ExecutionLock};

#[cfg(test)]
mod tests;
