//! The render engine: build/cache, kernel factory, queue, argument binding,
//! and the adaptive batch dispatch loop.
//!
//! Control flow for one render:
//! `build` → `create_kernel` → `create_command_queue` →
//! `pre_allocate_buffers` → `assign_parameters_to_kernel` → per batch:
//! `update_start` → write → dispatch → read → `update_end` → (buffers
//! released on drop or explicitly).
//!
//! All state mutation is serialized by the engine-wide [`ExecutionLock`];
//! the engine never parallelizes beyond its single command queue.

use crate::buffers::BufferSet;
use crate::driver_cache;
use crate::error::EngineError;
use crate::hardware::OpenClHardware;
use crate::lock::ExecutionLock;
use log::debug;
use opencl3::command_queue::CommandQueue;
use opencl3::kernel::{ExecuteKernel, Kernel};
use opencl3::memory::ClMem;
use opencl3::program::Program;
use render_core::{
    BufferSpec, EngineEvent, EventSink, OptimalJob, ProgramIdentity, RenderParams, Severity,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Baseline compiler flags; caller-supplied defines are appended.
const BASE_BUILD_FLAGS: &str = "-w -cl-single-precision-constant -cl-denorms-are-zero";

/// Maximum length of a compiler diagnostic surfaced in an event.
const BUILD_LOG_DISPLAY_LIMIT: usize = 500;

/// A concrete kernel the engine can run.
///
/// This is the engine's extension seam: a kernel implementation supplies its
/// entry point, source text, build defines, buffer layout, and any extra
/// non-buffer arguments. The engine owns everything else.
pub trait RenderKernel: Send + Sync {
    /// Kernel entry-point name inside the program.
    fn entry_point(&self) -> &'static str;

    /// Full kernel source text.
    fn source(&self) -> String;

    /// Build defines for the current parameters (e.g. `-DIMAGE_WIDTH=800`).
    fn defines(&self, params: &RenderParams) -> String;

    /// Device bytes consumed per work-item, converting the memory budget
    /// into a work-item ceiling. 0 means "not known yet".
    fn per_pixel_bytes(&self, params: &RenderParams) -> u64;

    /// Buffers this kernel needs for the current parameters.
    fn register_buffers(&self, params: &RenderParams) -> Vec<BufferSpec>;

    /// Bind non-buffer arguments starting at `first_slot`; return the next
    /// unused slot. The default binds nothing.
    fn bind_extra_args(
        &self,
        _kernel: &Kernel,
        first_slot: u32,
        _params: &RenderParams,
    ) -> Result<u32, EngineError> {
        Ok(first_slot)
    }
}

/// Outcome of a render loop.
#[derive(Debug)]
pub enum RenderStatus {
    Completed {
        batches: u64,
        elapsed: Duration,
    },
    /// The caller's cancel flag was observed between batches.
    Cancelled {
        batches: u64,
        pixels_processed: u64,
    },
}

/// Adaptive OpenCL render engine for one [`RenderKernel`].
pub struct ClEngine {
    hardware: Arc<OpenClHardware>,
    kernel_spec: Box<dyn RenderKernel>,
    sink: Arc<dyn EventSink>,

    program: Option<Program>,
    kernel: Option<Kernel>,
    queue: Option<CommandQueue>,
    buffers: BufferSet,
    job: OptimalJob,

    /// Identity of the last successful build; `None` forces a recompile.
    last_identity: Option<ProgramIdentity>,
    kernel_created: bool,
    ready_for_rendering: bool,

    exec_lock: Arc<ExecutionLock>,
}

impl ClEngine {
    pub fn new(
        hardware: Arc<OpenClHardware>,
        kernel_spec: Box<dyn RenderKernel>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            hardware,
            kernel_spec,
            sink,
            program: None,
            kernel: None,
            queue: None,
            buffers: BufferSet::default(),
            job: OptimalJob::new(),
            last_identity: None,
            kernel_created: false,
            ready_for_rendering: false,
            exec_lock: Arc::new(ExecutionLock::new()),
        }
    }

    fn emit_error(&self, message: impl Into<String>) {
        self.sink.emit(EngineEvent::new(Severity::Error, message));
    }

    /// Compile the kernel program, skipping the compile entirely when source
    /// and defines are unchanged since the last successful build.
    ///
    /// On failure the stored identity is cleared so the very next call
    /// recompiles instead of trusting a stale comparison.
    pub fn build(&mut self, params: &RenderParams) -> Result<(), EngineError> {
        let source = self.kernel_spec.source();
        let defines = self.kernel_spec.defines(params);
        let identity = ProgramIdentity::new(source.as_bytes(), &defines);

        if !params.use_build_cache {
            // Stale-cache workaround; see driver_cache.
            driver_cache::purge();
        } else if self.last_identity == Some(identity) && self.program.is_some() {
            debug!(target: "engine", "re-compile is not needed");
            return Ok(());
        }

        // The program is being replaced; any kernel derived from the old one
        // is no longer valid.
        self.kernel = None;
        self.kernel_created = false;

        let mut program =
            match Program::create_from_source(self.hardware.context(), &source) {
                Ok(p) => p,
                Err(e) => {
                    self.emit_error("OpenCL program cannot be created");
                    self.last_identity = None;
                    return Err(EngineError::api("Program::create_from_source")(e));
                }
            };

        let flags = build_flags(&defines);
        debug!(target: "engine", "build flags: {flags}");

        if program.build(&[self.hardware.device_id()], &flags).is_err() {
            let log = program
                .get_build_log(self.hardware.device_id())
                .unwrap_or_else(|e| format!("(build log unavailable: {e})"));
            self.emit_error(format!(
                "Error during compilation of OpenCL program\n{}",
                truncate_for_display(&log, BUILD_LOG_DISPLAY_LIMIT)
            ));
            self.last_identity = None;
            return Err(EngineError::BuildFailed { log });
        }

        debug!(
            target: "engine",
            "OpenCL kernel program compiled (source {}, defines {})",
            identity.source.short_hex(),
            identity.defines.short_hex()
        );
        self.program = Some(program);
        self.last_identity = Some(identity);
        Ok(())
    }

    /// Drop the stored build identity, forcing the next `build` to recompile.
    pub fn reset(&mut self) {
        self.last_identity = None;
    }

    /// Instantiate the kernel entry point from the built program, query the
    /// device's execution granularity, and reset the job sizer.
    pub fn create_kernel(&mut self, params: &RenderParams) -> Result<(), EngineError> {
        let program = self.program.as_ref().ok_or(EngineError::ProgramNotBuilt)?;

        let kernel = match Kernel::create(program, self.kernel_spec.entry_point()) {
            Ok(k) => k,
            Err(e) => {
                self.emit_error("OpenCL kernel cannot be created");
                self.kernel_created = false;
                return Err(EngineError::api("Kernel::create")(e));
            }
        };

        let device_id = self.hardware.device_id();
        // Capability queries are non-fatal: zero degrades batch sizing only.
        let work_group_size = kernel.get_work_group_size(device_id).unwrap_or_else(|e| {
            log::warn!(target: "engine", "CL_KERNEL_WORK_GROUP_SIZE query failed: {e}; using 0");
            0
        });
        let preferred_multiple =
            kernel.get_work_group_size_multiple(device_id).unwrap_or_else(|e| {
                log::warn!(
                    target: "engine",
                    "CL_KERNEL_PREFERRED_WORK_GROUP_SIZE_MULTIPLE query failed: {e}; using 0"
                );
                0
            });
        debug!(
            target: "engine",
            "kernel granularity: work_group_size={work_group_size}, preferred_multiple={preferred_multiple}"
        );

        self.job = OptimalJob::new();
        self.job
            .set_device_granularity(work_group_size as u64, preferred_multiple as u64);
        self.kernel = Some(kernel);
        self.kernel_created = true;

        self.init_optimal_job(params);
        Ok(())
    }

    /// Derive the initial batch shape and the memory-derived work-item
    /// ceiling from the current parameters.
    pub fn init_optimal_job(&mut self, params: &RenderParams) {
        self.job
            .set_per_pixel_bytes(self.kernel_spec.per_pixel_bytes(params));
        self.job.init(
            params.width as u64,
            params.height as u64,
            params.memory_limit_bytes(),
            self.hardware.info().max_mem_alloc_size,
            params.target_cycle_secs,
        );
    }

    /// Create the single command queue against the enabled device.
    pub fn create_command_queue(&mut self) -> Result<(), EngineError> {
        match CommandQueue::create_default_with_properties(self.hardware.context(), 0, 0) {
            Ok(queue) => {
                self.queue = Some(queue);
                self.ready_for_rendering = true;
                Ok(())
            }
            Err(e) => {
                self.emit_error("OpenCL command queue cannot be created");
                self.ready_for_rendering = false;
                Err(EngineError::api("CommandQueue::create")(e))
            }
        }
    }

    /// Allocate a fresh generation of paired host/device buffers.
    ///
    /// A `false`-equivalent error means no buffers are safely usable.
    pub fn pre_allocate_buffers(&mut self, params: &RenderParams) -> Result<(), EngineError> {
        let specs = self.kernel_spec.register_buffers(params);
        if let Err(e) = self.buffers.allocate(self.hardware.context(), specs) {
            if let EngineError::Buffer { ref name, .. } = e {
                self.emit_error(format!("OpenCL buffer '{name}' cannot be created"));
            }
            return Err(e);
        }
        Ok(())
    }

    /// Free every host block and device buffer. No-op when already empty.
    pub fn release_memory(&mut self) {
        self.buffers.release();
    }

    /// Bind kernel arguments: input buffers, then output buffers, then
    /// input-output buffers, then kernel-specific extra arguments, all at
    /// successive slots. Any failure aborts — partial binding is not a
    /// dispatchable state.
    pub fn assign_parameters_to_kernel(&self, params: &RenderParams) -> Result<(), EngineError> {
        let kernel = self.kernel.as_ref().ok_or(EngineError::KernelNotReady)?;

        let mut slot: u32 = 0;
        for buffer in self.buffers.bind_order() {
            // SAFETY: the bound cl_mem handle is owned by `self.buffers` and
            // outlives every dispatch; buffers are re-bound after any
            // reallocation before the next dispatch.
            if let Err(e) = unsafe { kernel.set_arg(slot, &buffer.device().get()) } {
                self.emit_error(format!(
                    "Cannot set OpenCL argument {slot} for '{}'",
                    buffer.name()
                ));
                return Err(EngineError::buffer("set_arg", buffer.name())(e));
            }
            slot += 1;
        }

        self.kernel_spec.bind_extra_args(kernel, slot, params)?;
        Ok(())
    }

    /// Blocking host-to-device transfer of all kernel-readable buffers.
    pub fn write_buffers_to_queue(&mut self) -> Result<(), EngineError> {
        let Self { queue, buffers, .. } = self;
        let queue = queue.as_ref().ok_or(EngineError::QueueNotCreated)?;
        if let Err(e) = buffers.write_to_queue(queue) {
            self.emit_error(format!("Cannot enqueue writing OpenCL buffers: {e}"));
            return Err(e);
        }
        Ok(())
    }

    /// Blocking device-to-host transfer of all kernel-writable buffers.
    pub fn read_buffers_from_queue(&mut self) -> Result<(), EngineError> {
        let Self { queue, buffers, .. } = self;
        let queue = queue.as_ref().ok_or(EngineError::QueueNotCreated)?;
        if let Err(e) = buffers.read_from_queue(queue) {
            self.emit_error(format!("Cannot enqueue reading OpenCL buffers: {e}"));
            return Err(e);
        }
        Ok(())
    }

    /// Dispatch one batch of `job.step_size()` work-items starting at
    /// `pixel_offset`, blocking until the device has finished it.
    pub fn enqueue_batch(&self, pixel_offset: u64) -> Result<(), EngineError> {
        let kernel = self.kernel.as_ref().ok_or(EngineError::KernelNotReady)?;
        let queue = self.queue.as_ref().ok_or(EngineError::QueueNotCreated)?;

        let mut exec = ExecuteKernel::new(kernel);
        exec.set_global_work_sizes(&[self.job.step_size() as usize])
            .set_global_work_offsets(&[pixel_offset as usize]);
        if self.job.work_group_size() > 0 {
            exec.set_local_work_sizes(&[self.job.work_group_size() as usize]);
        }

        // SAFETY: all argument slots were bound by
        // `assign_parameters_to_kernel` before any dispatch.
        let event = unsafe {
            exec.enqueue_nd_range(queue)
                .map_err(EngineError::api("enqueue_nd_range"))?
        };
        event.wait().map_err(EngineError::api("Event::wait"))?;
        Ok(())
    }

    /// Run the full adaptive render loop until every pixel has been
    /// dispatched or `cancel` is observed between batches.
    pub fn render(
        &mut self,
        params: &RenderParams,
        cancel: &AtomicBool,
    ) -> Result<RenderStatus, EngineError> {
        if !self.is_ready() {
            return Err(EngineError::KernelNotReady);
        }

        let exec_lock = Arc::clone(&self.exec_lock);
        let _guard = exec_lock.acquire();

        let total = params.pixel_count();
        let started = Instant::now();
        let mut processed: u64 = 0;
        let mut batches: u64 = 0;

        while processed < total {
            if cancel.load(Ordering::Relaxed) {
                debug!(target: "engine", "render cancelled after {batches} batches");
                return Ok(RenderStatus::Cancelled {
                    batches,
                    pixels_processed: processed,
                });
            }

            self.job.update_start(total - processed);
            self.write_buffers_to_queue()?;
            self.enqueue_batch(processed)?;
            self.read_buffers_from_queue()?;
            self.job.update_end();
            batches += 1;

            debug!(
                target: "engine",
                "batch {batches}: step_size={}, duration={:.4}s",
                self.job.step_size(),
                self.job.last_duration()
            );
            #[cfg(feature = "metrics")]
            {
                render_metrics::record_batch(
                    self.job.last_duration(),
                    self.job.step_size(),
                    self.job.step_size() * self.job.per_pixel_bytes(),
                );
            }

            // The preferred-multiple floor may dispatch past the remaining
            // work; the kernel guards out-of-range items.
            processed = (processed + self.job.step_size()).min(total);
        }

        Ok(RenderStatus::Completed {
            batches,
            elapsed: started.elapsed(),
        })
    }

    /// Whether the engine can dispatch: kernel created and queue ready.
    pub fn is_ready(&self) -> bool {
        self.kernel_created && self.ready_for_rendering
    }

    /// Engine-wide lock serializing configuration/dispatch sequences.
    pub fn execution_lock(&self) -> &Arc<ExecutionLock> {
        &self.exec_lock
    }

    pub fn job(&self) -> &OptimalJob {
        &self.job
    }

    pub fn buffers(&self) -> &BufferSet {
        &self.buffers
    }

    pub fn buffers_mut(&mut self) -> &mut BufferSet {
        &mut self.buffers
    }

    pub fn hardware(&self) -> &OpenClHardware {
        &self.hardware
    }
}

impl Drop for ClEngine {
    fn drop(&mut self) {
        // Kernel and queue drop before the program and context they derive
        // from; buffers release host and device halves together.
        self.buffers.release();
    }
}

/// Baseline flags with the caller-supplied defines appended.
fn build_flags(defines: &str) -> String {
    if defines.is_empty() {
        BASE_BUILD_FLAGS.to_string()
    } else {
        format!("{BASE_BUILD_FLAGS} {defines}")
    }
}

/// Bound a diagnostic string for user display without splitting a UTF-8
/// character.
fn truncate_for_display(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn build_flags_appends_defines_to_baseline() {
        assert_eq!(build_flags(""), BASE_BUILD_FLAGS);
        let flags = build_flags("-DIMAGE_WIDTH=800 -DIMAGE_HEIGHT=600");
        assert!(flags.starts_with(BASE_BUILD_FLAGS));
        assert!(flags.ends_with("-DIMAGE_HEIGHT=600"));
    }

    #[test]
    fn diagnostic_truncation_is_bounded_and_char_safe() {
        let long = "e".repeat(1000);
        assert_eq!(truncate_for_display(&long, 500).len(), 500);

        let short = "error: expected ';'";
        assert_eq!(truncate_for_display(short, 500), short);

        // 'é' is two bytes; a limit landing mid-character must back off.
        let accented = "é".repeat(300);
        let cut = truncate_for_display(&accented, 499);
        assert!(cut.len() <= 499);
        assert!(std::str::from_utf8(cut.as_bytes()).is_ok());
    }
}
