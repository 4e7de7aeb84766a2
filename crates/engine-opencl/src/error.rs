//! Engine error types.
//!
//! Every OpenCL status code is checked at its call site and converted into a
//! variant naming the offending operation. Errors propagate as values; the
//! engine never unwinds across a device call.

use opencl3::error_codes::ClError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// No OpenCL platform exposes a usable device. Treated by callers as a
    /// normal, handled state, not a fatal condition.
    #[error("no OpenCL device available")]
    NoDevice,

    /// A dispatch-path operation was attempted before the program was built.
    #[error("kernel program has not been built")]
    ProgramNotBuilt,

    /// A dispatch-path operation was attempted before `create_kernel`
    /// succeeded.
    #[error("kernel is not ready for dispatch")]
    KernelNotReady,

    /// A queue operation was attempted before `create_command_queue`.
    #[error("command queue has not been created")]
    QueueNotCreated,

    /// The compiler rejected the kernel source; `log` carries the full
    /// build diagnostics.
    #[error("OpenCL program build failed:\n{log}")]
    BuildFailed { log: String },

    /// A per-buffer operation (allocation, transfer, argument bind) failed.
    #[error("{op} failed for buffer '{name}': {source}")]
    Buffer {
        op: &'static str,
        name: String,
        source: ClError,
    },

    /// Any other device API failure, tagged with the operation's name.
    #[error("{op} failed: {source}")]
    Api { op: &'static str, source: ClError },
}

impl EngineError {
    pub(crate) fn api(op: &'static str) -> impl FnOnce(ClError) -> Self {
        move |source| Self::Api { op, source }
    }

    pub(crate) fn buffer(op: &'static str, name: &str) -> impl FnOnce(ClError) -> Self {
        let name = name.to_owned();
        move |source| Self::Buffer { op, name, source }
    }
}
