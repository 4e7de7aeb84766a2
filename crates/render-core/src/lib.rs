#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Device-free core for the adaptive render engine.
//!
//! This crate holds everything the engine needs that does not touch an
//! accelerator device, so the control loop and cache logic stay unit-testable
//! without any OpenCL runtime installed:
//! - `identity`: content digests deciding when a kernel program must be
//!   recompiled.
//! - `job`: the adaptive job sizer that converts wall-clock feedback into the
//!   next batch size, bounded by remaining work and the memory budget.
//! - `buffers`: buffer descriptors and categories shared with the device
//!   layer.
//! - `events`: structured engine events and the sinks that deliver them.
//! - `params`: the caller-supplied render parameter set.

pub mod buffers;
pub mod events;
pub mod identity;
pub mod job;
pub mod params;

pub use buffers::{BufferCategory, BufferSpec};
pub use events::{ChannelSink, EngineEvent, EventSink, LogSink, Severity};
pub use identity::{ContentDigest, ProgramIdentity};
pub use job::OptimalJob;
pub use params::RenderParams;
