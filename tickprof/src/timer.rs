use crate::probe::GC_GENERATIONS;
use profdata::Key;
use segbuf::SlotId;
use std::collections::HashMap;

/// Timer lifecycle. `StartedDisabled` is entered when profiling is globally
/// off or an ancestor is disabled, which makes the matching stop a correct
/// no-op without any branching at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Stopped,
    Running,
    WasRun,
    StartedDisabled,
}

/// Exponential moving average and variance of a timer's exclusive time.
/// A sample is an outlier when its deviation from the mean exceeds a
/// configured multiple of the standard deviation, gated by a minimum sample
/// count and a noise floor.
#[derive(Debug)]
pub(crate) struct RollingStats {
    mean: f64,
    variance: f64,
    samples: u64,
    window: f64,
}

impl RollingStats {
    pub(crate) fn new(window: u32) -> Self {
        RollingStats {
            mean: 0.0,
            variance: 0.0,
            samples: 0,
            window: window.max(1) as f64,
        }
    }

    /// Classify `sample` against the statistics so far, then fold it in.
    pub(crate) fn observe(
        &mut self,
        sample: f64,
        std_multiplier: f64,
        noise_floor: f64,
        min_samples: u64,
    ) -> bool {
        let deviation = sample - self.mean;
        let is_outlier = self.samples >= min_samples
            && deviation > noise_floor
            && deviation > std_multiplier * self.variance.sqrt();

        let n = self.window.min((self.samples + 1) as f64);
        self.mean += deviation / n;
        self.variance = (1.0 - 1.0 / n) * (self.variance + deviation * deviation / n);
        self.samples += 1;

        is_outlier
    }
}

/// Fixed-capacity circular history of per-frame metrics, one slot written
/// per frame at the shared cursor.
#[derive(Debug)]
pub struct FrameHistory {
    inclusive_ticks: Vec<u64>,
    exclusive_ticks: Vec<u64>,
    memory_delta: Vec<i64>,
    gc_collections: Vec<u64>,
    invoke_count: Vec<u32>,
    cursor: usize,
}

pub(crate) struct FrameSample {
    pub inclusive_ticks: u64,
    pub exclusive_ticks: u64,
    pub memory_delta: i64,
    pub gc_collections: u64,
    pub invoke_count: u32,
}

impl FrameHistory {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        FrameHistory {
            inclusive_ticks: vec![0; capacity],
            exclusive_ticks: vec![0; capacity],
            memory_delta: vec![0; capacity],
            gc_collections: vec![0; capacity],
            invoke_count: vec![0; capacity],
            cursor: 0,
        }
    }

    pub(crate) fn write(&mut self, sample: FrameSample) {
        let at = self.cursor;
        self.inclusive_ticks[at] = sample.inclusive_ticks;
        self.exclusive_ticks[at] = sample.exclusive_ticks;
        self.memory_delta[at] = sample.memory_delta;
        self.gc_collections[at] = sample.gc_collections;
        self.invoke_count[at] = sample.invoke_count;
        self.cursor = (at + 1) % self.inclusive_ticks.len();
    }

    pub fn capacity(&self) -> usize {
        self.inclusive_ticks.len()
    }

    /// Slot the next frame will be written to.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn inclusive_ticks(&self) -> &[u64] {
        &self.inclusive_ticks
    }

    pub fn exclusive_ticks(&self) -> &[u64] {
        &self.exclusive_ticks
    }

    pub fn memory_delta(&self) -> &[i64] {
        &self.memory_delta
    }

    pub fn gc_collections(&self) -> &[u64] {
        &self.gc_collections
    }

    pub fn invoke_count(&self) -> &[u32] {
        &self.invoke_count
    }
}

/// One node of a group's call tree, keyed by (parent, key). Created on first
/// visit, lives as long as its group.
pub struct Timer {
    pub(crate) key: Key,
    pub(crate) name: String,
    pub(crate) depth: u16,
    pub(crate) parent: Option<usize>,
    pub(crate) children: HashMap<Key, usize>,
    pub(crate) child_order: Vec<usize>,

    pub(crate) state: TimerState,
    pub(crate) start_ticks: u64,
    pub(crate) inclusive_ticks: u64,
    pub(crate) invoke_count: u32,
    pub(crate) open_slot: Option<SlotId>,

    pub(crate) mem_before: Option<i64>,
    pub(crate) mem_delta: i64,
    pub(crate) gc_before: [u64; GC_GENERATIONS],
    pub(crate) gc_frame: u64,
    pub(crate) children_gc: u64,
    pub(crate) gc_at_first_child: Option<u64>,
    pub(crate) first_child_start_ticks: Option<u64>,

    pub(crate) stats: RollingStats,
    pub(crate) history: FrameHistory,
}

impl Timer {
    pub(crate) fn new(
        key: Key,
        name: String,
        depth: u16,
        parent: Option<usize>,
        history_capacity: usize,
        stats_window: u32,
    ) -> Self {
        Timer {
            key,
            name,
            depth,
            parent,
            children: HashMap::new(),
            child_order: Vec::new(),
            state: TimerState::Stopped,
            start_ticks: 0,
            inclusive_ticks: 0,
            invoke_count: 0,
            open_slot: None,
            mem_before: None,
            mem_delta: 0,
            gc_before: [0; GC_GENERATIONS],
            gc_frame: 0,
            children_gc: 0,
            gc_at_first_child: None,
            first_child_start_ticks: None,
            stats: RollingStats::new(stats_window),
            history: FrameHistory::new(history_capacity),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn depth(&self) -> u16 {
        self.depth
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn history(&self) -> &FrameHistory {
        &self.history
    }

    /// Zero the per-frame accumulators after their sample is written.
    pub(crate) fn reset_frame_accumulators(&mut self) {
        self.inclusive_ticks = 0;
        self.invoke_count = 0;
        self.mem_before = None;
        self.mem_delta = 0;
        self.gc_before = [0; GC_GENERATIONS];
        self.gc_frame = 0;
        self.children_gc = 0;
        self.gc_at_first_child = None;
        self.first_child_start_ticks = None;
        self.open_slot = None;
        if self.state == TimerState::WasRun || self.state == TimerState::StartedDisabled {
            self.state = TimerState::Stopped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    fn test_steady_signal_never_flags() {
        let mut stats = RollingStats::new(50);
        for _ in 0..200 {
            assert!(!stats.observe(50_000.0, 5.0, 1000.0, 16));
        }
        assert!((stats.mean - 50_000.0).abs() < 1.0);
        assert_eq!(stats.samples, 200);
    }

    #[rstest]
    fn test_spike_after_steady_signal_flags() {
        let mut stats = RollingStats::new(50);
        for _ in 0..200 {
            stats.observe(50_000.0, 5.0, 1000.0, 16);
        }
        assert!(stats.observe(5_000_000.0, 5.0, 1000.0, 16));
    }

    #[rstest]
    fn test_noise_floor_suppresses_small_scopes() {
        let mut stats = RollingStats::new(50);
        for _ in 0..200 {
            stats.observe(40.0, 5.0, 1000.0, 16);
        }
        // 100x spike, but the absolute deviation stays under the floor.
        assert!(!stats.observe(400.0, 5.0, 1000.0, 16));
    }

    #[rstest]
    fn test_min_samples_gate() {
        let mut stats = RollingStats::new(50);
        stats.observe(50_000.0, 5.0, 1000.0, 16);
        assert!(!stats.observe(5_000_000.0, 5.0, 1000.0, 16));
    }

    #[rstest]
    fn test_history_ring_wraps() {
        let mut history = FrameHistory::new(3);
        for frame in 0..5u64 {
            history.write(FrameSample {
                inclusive_ticks: frame,
                exclusive_ticks: frame,
                memory_delta: frame as i64,
                gc_collections: 0,
                invoke_count: 1,
            });
        }
        assert_eq!(history.capacity(), 3);
        // Frames 3 and 4 overwrote slots 0 and 1; slot 2 still holds frame 2.
        assert_eq!(history.inclusive_ticks(), &[3, 4, 2]);
        assert_eq!(history.cursor(), 2);
    }
}
