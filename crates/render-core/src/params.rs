//! Caller-supplied render parameters.

/// Runtime configuration for one render, provided by the caller (CLI flags,
/// config file, or an embedding application).
#[derive(Clone, Debug)]
pub struct RenderParams {
    /// Output image width in pixels.
    pub width: usize,
    /// Output image height in pixels.
    pub height: usize,
    /// User memory budget for device buffers, in mebibytes.
    pub memory_limit_mib: usize,
    /// Target wall-clock duration of one dispatched batch, in seconds.
    pub target_cycle_secs: f64,
    /// Whether to reuse the previously compiled program when source and
    /// defines are unchanged.
    pub use_build_cache: bool,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            memory_limit_mib: 256,
            target_cycle_secs: 0.1,
            use_build_cache: true,
        }
    }
}

impl RenderParams {
    /// Total number of work-items (pixels) for this render.
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// User memory budget converted to bytes.
    pub fn memory_limit_bytes(&self) -> u64 {
        self.memory_limit_mib as u64 * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_limit_is_interpreted_in_mebibytes() {
        let params = RenderParams {
            memory_limit_mib: 3,
            ..Default::default()
        };
        assert_eq!(params.memory_limit_bytes(), 3 * 1024 * 1024);
    }
}
