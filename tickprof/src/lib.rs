//! # tickprof - Embedded Frame Profiler
//!
//! Always-available profiling engine for real-time simulation hosts:
//! per-scope wall time, memory allocation, and GC activity across many
//! threads at high tick rates, with near-zero overhead when idle and bounded
//! overhead when active.
//!
//! Each thread owns a lazily-created group holding a nested-timer tree and a
//! segmented event allocator; the process-wide [`Profiler`] coordinates
//! interning caches and recording sessions across groups.
//!
//! ## Measuring scopes
//!
//! ```rust
//! use std::sync::Arc;
//! use tickprof::{Config, Profiler};
//!
//! let profiler = Arc::new(Profiler::new(Config::default()));
//! let group = profiler.group();
//!
//! profiler.begin_frame();
//! {
//!     let _update = group.scope("Update");
//!     let _physics = group.scope("Physics");
//! }
//! profiler.end_frame();
//! ```
//!
//! ## Recording a session
//!
//! ```rust
//! use std::sync::Arc;
//! use tickprof::{Config, Profiler, SessionOptions};
//!
//! let profiler = Arc::new(Profiler::new(Config::default()));
//! let group = profiler.group();
//!
//! profiler.start_recording(SessionOptions::frames("capture", 2))?;
//! for _ in 0..2 {
//!     profiler.begin_frame();
//!     {
//!         let _scope = group.scope("Update");
//!     }
//!     profiler.end_frame();
//! }
//!
//! let recording = profiler.stop_recording()?;
//! assert_eq!(recording.num_frames, 2);
//! recording.write_to(Vec::new())?;
//! # Ok::<(), tickprof::ProfilerError>(())
//! ```

use std::time::Duration;
use thiserror::Error;

pub mod clock;
pub mod config;
pub mod group;
pub mod interner;
pub mod probe;
pub mod profiler;
pub mod resolver;
pub mod scope;
pub mod timer;

pub use clock::{ClockSource, ManualClock, MonotonicClock};
pub use config::{Config, ConfigError};
pub use group::{GroupHandle, GroupKind, OutlierFrame, TimerSlot};
pub use probe::{MemoryProbe, NullProbe, GC_GENERATIONS};
pub use profiler::{Profiler, SessionOptions};
pub use resolver::{NullResolver, ObjectResolver, RawObjectRef};
pub use scope::Scope;
pub use timer::{FrameHistory, Timer, TimerState};

#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error("a recording session is already active")]
    AlreadyRecording,
    #[error("no recording session is active")]
    NotRecording,
    #[error("recording session needs a positive frame or duration budget")]
    MissingBudget,
    #[error("frame budget {requested} exceeds maximum {max}")]
    FrameBudgetTooLarge { requested: u32, max: u32 },
    #[error("duration budget {requested:?} exceeds maximum {max:?}")]
    DurationTooLarge { requested: Duration, max: Duration },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("recording format error: {0}")]
    Format(#[from] profdata::FormatError),
}

pub type Result<T> = std::result::Result<T, ProfilerError>;
