use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine tuning knobs. The outlier constants are empirically tuned values,
/// not domain law; hosts override them per workload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Per-timer history ring capacity, in frames.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Window of the exclusive-time moving average/variance, in samples.
    #[serde(default = "default_stats_window")]
    pub stats_window: u32,

    /// A frame is an outlier when exclusive time deviates from the moving
    /// average by more than this multiple of the standard deviation.
    #[serde(default = "default_outlier_std_multiplier")]
    pub outlier_std_multiplier: f64,

    /// Deviations below this many raw ticks are never outliers, so
    /// sub-microsecond scopes do not flag on jitter.
    #[serde(default = "default_outlier_noise_floor_ticks")]
    pub outlier_noise_floor_ticks: u64,

    /// Minimum samples a timer must have before it can flag outliers.
    #[serde(default = "default_outlier_min_samples")]
    pub outlier_min_samples: u32,

    /// Event allocator segment capacity, in events.
    #[serde(default = "default_segment_capacity")]
    pub segment_capacity: usize,

    /// Bound of the recent-outlier-frame ring kept per group.
    #[serde(default = "default_outlier_frame_capacity")]
    pub outlier_frame_capacity: usize,

    /// Upper bound a session frame budget may request.
    #[serde(default = "default_max_recording_frames")]
    pub max_recording_frames: u32,

    /// Upper bound a session duration budget may request, seconds. Also the
    /// watchdog budget for frame-bounded sessions.
    #[serde(default = "default_max_recording_secs")]
    pub max_recording_secs: u64,

    /// Capture per-thread allocation counters and GC deltas.
    #[serde(default = "default_memory_tracking")]
    pub memory_tracking: bool,

    /// Append events outside recording sessions too.
    #[serde(default)]
    pub realtime_events: bool,

    /// Snapshot outlier frames into the recent-outlier ring while idle.
    #[serde(default = "default_capture_outlier_frames")]
    pub capture_outlier_frames: bool,
}

fn default_history_capacity() -> usize {
    300
}

fn default_stats_window() -> u32 {
    50
}

fn default_outlier_std_multiplier() -> f64 {
    5.0
}

fn default_outlier_noise_floor_ticks() -> u64 {
    1000
}

fn default_outlier_min_samples() -> u32 {
    16
}

fn default_segment_capacity() -> usize {
    4096
}

fn default_outlier_frame_capacity() -> usize {
    20
}

fn default_max_recording_frames() -> u32 {
    100_000
}

fn default_max_recording_secs() -> u64 {
    600
}

fn default_memory_tracking() -> bool {
    true
}

fn default_capture_outlier_frames() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str("").expect("empty config must deserialize from defaults")
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Config {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.history_capacity, 300);
        assert_eq!(config.stats_window, 50);
        assert_eq!(config.outlier_std_multiplier, 5.0);
        assert_eq!(config.outlier_noise_floor_ticks, 1000);
        assert_eq!(config.segment_capacity, 4096);
        assert_eq!(config.outlier_frame_capacity, 20);
        assert!(config.memory_tracking);
        assert!(!config.realtime_events);
        assert!(config.capture_outlier_frames);
    }

    #[rstest]
    fn test_partial_toml_overrides() {
        let config: Config = toml::from_str(
            r#"
            stats_window = 100
            outlier_std_multiplier = 3.0
            realtime_events = true
            "#,
        )
        .unwrap();
        assert_eq!(config.stats_window, 100);
        assert_eq!(config.outlier_std_multiplier, 3.0);
        assert!(config.realtime_events);
        assert_eq!(config.history_capacity, 300);
    }

    #[rstest]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tickprof.toml");
        std::fs::write(&path, "segment_capacity = 128\n").unwrap();

        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.segment_capacity, 128);
    }
}
