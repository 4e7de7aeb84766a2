//! Engine tests that need a real device probe first and skip cleanly on
//! machines without an OpenCL runtime.

use crate::demo::{MandelbrotKernel, IMAGE_BUFFER};
use crate::engine::{ClEngine, RenderKernel, RenderStatus};
use crate::error::EngineError;
use crate::hardware::OpenClHardware;
use render_core::{BufferSpec, ChannelSink, EventSink, LogSink, RenderParams, Severity};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn hardware() -> Option<Arc<OpenClHardware>> {
    match OpenClHardware::new() {
        Ok(hw) => Some(Arc::new(hw)),
        Err(_) => {
            eprintln!("skipping: no OpenCL device available");
            None
        }
    }
}

fn small_params() -> RenderParams {
    RenderParams {
        width: 64,
        height: 48,
        memory_limit_mib: 64,
        target_cycle_secs: 0.05,
        use_build_cache: true,
    }
}

fn ready_engine(
    hw: Arc<OpenClHardware>,
    sink: Arc<dyn EventSink>,
    params: &RenderParams,
) -> Result<ClEngine, EngineError> {
    let mut engine = ClEngine::new(hw, Box::new(MandelbrotKernel::new(64)), sink);
    engine.build(params)?;
    engine.create_kernel(params)?;
    engine.create_command_queue()?;
    engine.pre_allocate_buffers(params)?;
    engine.assign_parameters_to_kernel(params)?;
    Ok(engine)
}

/// Kernel with deliberately invalid source, for build-failure paths.
struct BrokenKernel;

impl RenderKernel for BrokenKernel {
    fn entry_point(&self) -> &'static str {
        "broken"
    }

    fn source(&self) -> String {
        "__kernel void broken(__global float *out) { this is not OpenCL C ".to_string()
    }

    fn defines(&self, _params: &RenderParams) -> String {
        String::new()
    }

    fn per_pixel_bytes(&self, _params: &RenderParams) -> u64 {
        4
    }

    fn register_buffers(&self, _params: &RenderParams) -> Vec<BufferSpec> {
        vec![BufferSpec::output("out", 4)]
    }
}

#[test]
fn full_render_completes_and_fills_the_image_buffer() {
    let Some(hw) = hardware() else { return };
    let params = small_params();
    let mut engine = ready_engine(hw, Arc::new(LogSink), &params).expect("engine setup");
    assert!(engine.is_ready());

    let cancel = AtomicBool::new(false);
    let status = engine.render(&params, &cancel).expect("render");
    match status {
        RenderStatus::Completed { batches, .. } => assert!(batches >= 1),
        other => panic!("expected Completed, got {other:?}"),
    }

    // Buffer pairing: the output host block exists and has the full size.
    let image = engine.buffers().find(IMAGE_BUFFER).expect("image buffer");
    assert_eq!(image.host().len(), params.width * params.height * 4);
    // The escape-time kernel writes alpha = 255 for every pixel.
    assert!(image.host().chunks_exact(4).all(|px| px[3] == 255));

    // Sizer invariants after a real feedback sequence.
    let job = engine.job();
    assert_eq!(job.step_size(), job.multiplier() * job.work_group_size());
    assert!(job.multiplier() >= job.preferred_multiple());
}

#[test]
fn release_memory_is_idempotent() {
    let Some(hw) = hardware() else { return };
    let params = small_params();
    let mut engine = ready_engine(hw, Arc::new(LogSink), &params).expect("engine setup");

    assert!(!engine.buffers().is_empty());
    engine.release_memory();
    assert!(engine.buffers().is_empty());
    engine.release_memory(); // no-op on empty lists
    assert!(engine.buffers().is_empty());

    // Reallocation after release works.
    engine.pre_allocate_buffers(&params).expect("reallocate");
    assert_eq!(engine.buffers().len(), 1);
}

#[test]
fn rebuild_with_unchanged_inputs_is_a_cache_hit() {
    let Some(hw) = hardware() else { return };
    let params = small_params();
    let mut engine = ClEngine::new(hw, Box::new(MandelbrotKernel::new(64)), Arc::new(LogSink));
    engine.build(&params).expect("first build");
    // Identical source and defines: must return quickly without error.
    engine.build(&params).expect("cached build");

    // Changing parameters changes the defines, forcing a recompile, which
    // also succeeds.
    let mut larger = params.clone();
    larger.width += 64;
    engine.build(&larger).expect("rebuild after defines change");
}

#[test]
fn broken_source_reports_a_bounded_diagnostic_and_retries() {
    let Some(hw) = hardware() else { return };
    let params = small_params();
    let (sink, events) = ChannelSink::new();
    let mut engine = ClEngine::new(hw, Box::new(BrokenKernel), Arc::new(sink));

    let err = engine.build(&params).expect_err("build must fail");
    match err {
        EngineError::BuildFailed { ref log } => assert!(!log.is_empty()),
        other => panic!("expected BuildFailed, got {other:?}"),
    }

    let event = events.try_recv().expect("an error event");
    assert_eq!(event.severity, Severity::Error);
    // Header line plus a diagnostic bounded to 500 characters.
    let diagnostic = event.message.splitn(2, '\n').nth(1).unwrap_or("");
    assert!(!diagnostic.is_empty());
    assert!(diagnostic.len() <= 500);

    // Hashes were cleared: the next call recompiles (and fails again)
    // instead of reporting a stale cache hit.
    assert!(engine.build(&params).is_err());
}

#[test]
fn render_respects_cancellation_between_batches() {
    let Some(hw) = hardware() else { return };
    let params = small_params();
    let mut engine = ready_engine(hw, Arc::new(LogSink), &params).expect("engine setup");

    let cancel = AtomicBool::new(true); // cancelled before the first batch
    match engine.render(&params, &cancel).expect("render") {
        RenderStatus::Cancelled {
            batches,
            pixels_processed,
        } => {
            assert_eq!(batches, 0);
            assert_eq!(pixels_processed, 0);
        }
        other => panic!("expected Cancelled, got {other:?}"),
    }
}

#[test]
fn dispatch_before_setup_is_rejected() {
    let Some(hw) = hardware() else { return };
    let engine = ClEngine::new(hw, Box::new(MandelbrotKernel::default()), Arc::new(LogSink));
    assert!(!engine.is_ready());
    assert!(matches!(
        engine.enqueue_batch(0),
        Err(EngineError::KernelNotReady)
    ));
}
