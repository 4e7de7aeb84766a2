//! Adaptive job sizing.
//!
//! Before each dispatch the engine asks `OptimalJob` how many work-items to
//! submit. The sizer scales a work-group multiplier proportionally to the
//! ratio of the target cycle time to the previous batch's measured duration,
//! then clamps the result against the remaining work and the memory-derived
//! ceiling, and finally floors it at the device's preferred multiple. The
//! floor is applied last and deliberately dominates both ceilings: a device's
//! minimum efficient granularity is always dispatched, and the kernel guards
//! out-of-range work-items.

use std::time::Instant;

/// Cap on the per-batch multiplier growth factor.
///
/// A batch that finishes in near-zero time would otherwise scale the next
/// multiplier by `target / ~0`, overflowing the batch size in one step.
const GROWTH_CAP: f64 = 16.0;

/// Mutable job-sizing state, persisting across batches within one render.
///
/// Reset to defaults whenever a kernel is (re)created.
#[derive(Debug)]
pub struct OptimalJob {
    /// Device-mandated execution granularity for one kernel invocation.
    work_group_size: u64,
    /// Device-reported multiple of the work-group size with best throughput.
    preferred_multiple: u64,
    /// Current work-group multiplier; `step_size = multiplier * work_group_size`.
    multiplier: u64,
    /// Work-items submitted per batch.
    step_size: u64,
    /// Near-square 2-D factorization of `step_size`, published through
    /// [`step_size_xy`](Self::step_size_xy) for kernels that dispatch tiled
    /// 2-D ranges. The built-in render loop dispatches 1-D and does not
    /// consume it.
    step_size_x: u64,
    step_size_y: u64,
    /// Device bytes consumed per work-item; 0 while unknown.
    per_pixel_bytes: u64,
    /// Maximum work-items affordable under the memory budget.
    job_size_limit: u64,
    /// Measured duration of the previous batch, in seconds.
    last_duration: f64,
    /// Target duration for one batch, in seconds.
    target_duration: f64,
    /// Running timer for the in-flight batch.
    timer: Option<Instant>,
}

impl Default for OptimalJob {
    fn default() -> Self {
        Self {
            work_group_size: 0,
            preferred_multiple: 0,
            multiplier: 0,
            step_size: 0,
            step_size_x: 0,
            step_size_y: 0,
            per_pixel_bytes: 0,
            job_size_limit: 0,
            // Seed so the first real measurement is the first feedback point.
            last_duration: 1.0,
            target_duration: 0.1,
            timer: None,
        }
    }
}

impl OptimalJob {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the device capabilities queried at kernel creation.
    ///
    /// A zero value means the capability query failed; sizing degrades but
    /// divisions below guard against it.
    pub fn set_device_granularity(&mut self, work_group_size: u64, preferred_multiple: u64) {
        self.work_group_size = work_group_size;
        self.preferred_multiple = preferred_multiple;
    }

    /// Bytes of device buffer memory consumed per work-item.
    pub fn set_per_pixel_bytes(&mut self, bytes: u64) {
        self.per_pixel_bytes = bytes;
    }

    /// Derive the initial batch shape and the memory-derived work-item ceiling.
    ///
    /// `max_alloc_bytes` is the device's maximum single allocation size
    /// (0 when unknown); only 75% of it is trusted.
    pub fn init(
        &mut self,
        width: u64,
        height: u64,
        user_memory_limit_bytes: u64,
        max_alloc_bytes: u64,
        target_cycle_secs: f64,
    ) {
        let pixel_count = width * height;

        self.step_size = self.work_group_size * self.preferred_multiple;

        // Power-of-two-biased near-square factorization so batches tile the
        // image without excessive aspect skew.
        let exp = ((self.step_size + 1) as f64).sqrt().log2().floor() as u32;
        self.step_size_x = 1u64 << exp;
        self.step_size_y = if self.step_size_x > 0 {
            self.step_size / self.step_size_x
        } else {
            0
        };

        self.multiplier = self.preferred_multiple;
        self.last_duration = 1.0;
        self.target_duration = target_cycle_secs;

        let mut mem_size = user_memory_limit_bytes;
        if max_alloc_bytes > 0 && (max_alloc_bytes as f64 * 0.75) < user_memory_limit_bytes as f64 {
            mem_size = (max_alloc_bytes as f64 * 0.75) as u64;
        }
        self.job_size_limit = if self.per_pixel_bytes != 0 {
            mem_size / self.per_pixel_bytes
        } else {
            // Per-pixel cost not yet known: no memory ceiling.
            pixel_count
        };

        log::debug!(
            target: "engine",
            "job init: step_size={} ({}x{}), job_size_limit={}",
            self.step_size,
            self.step_size_x,
            self.step_size_y,
            self.job_size_limit
        );
    }

    /// Size the next batch from the previous batch's wall-clock feedback and
    /// start the batch timer.
    pub fn update_start(&mut self, remaining_work_items: u64) {
        self.timer = Some(Instant::now());

        // Proportional feedback: overshoot/undershoot in one batch directly
        // rescales the next. Growth is capped so a near-zero measurement
        // cannot blow the multiplier up.
        let ratio = (self.target_duration / self.last_duration).min(GROWTH_CAP);
        self.multiplier = (self.multiplier as f64 * ratio) as u64;

        let wgs = self.work_group_size.max(1);

        let remaining_cap = remaining_work_items / wgs;
        if self.multiplier > remaining_cap {
            self.multiplier = remaining_cap;
        }

        if self.multiplier * wgs > self.job_size_limit {
            self.multiplier = self.job_size_limit / wgs;
        }

        let floor = self.preferred_multiple.max(1);
        if self.multiplier < floor {
            self.multiplier = floor;
        }

        self.step_size = self.multiplier * wgs;
    }

    /// Stop the batch timer and record the elapsed seconds as feedback for
    /// the next `update_start`.
    pub fn update_end(&mut self) {
        if let Some(timer) = self.timer.take() {
            self.last_duration = timer.elapsed().as_secs_f64();
        }
    }

    /// Inject a measured batch duration directly, so feedback sequences can
    /// be driven without real sleeps.
    #[cfg(test)]
    fn record_duration(&mut self, seconds: f64) {
        self.timer = None;
        self.last_duration = seconds;
    }

    pub fn work_group_size(&self) -> u64 {
        self.work_group_size
    }

    pub fn preferred_multiple(&self) -> u64 {
        self.preferred_multiple
    }

    pub fn multiplier(&self) -> u64 {
        self.multiplier
    }

    pub fn step_size(&self) -> u64 {
        self.step_size
    }

    /// 2-D batch shape for kernels that tile the image instead of indexing
    /// it linearly.
    pub fn step_size_xy(&self) -> (u64, u64) {
        (self.step_size_x, self.step_size_y)
    }

    pub fn job_size_limit(&self) -> u64 {
        self.job_size_limit
    }

    pub fn per_pixel_bytes(&self) -> u64 {
        self.per_pixel_bytes
    }

    pub fn last_duration(&self) -> f64 {
        self.last_duration
    }

    pub fn target_duration(&self) -> f64 {
        self.target_duration
    }
}
