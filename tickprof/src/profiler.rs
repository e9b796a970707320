use arc_swap::ArcSwapOption;
use parking_lot::{Condvar, Mutex};
use profdata::{Event, ExtraValue, Key, ObjectRef, Recording};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use thread_local::ThreadLocal;
use tracing::{debug, warn};

use crate::clock::{ClockSource, MonotonicClock};
use crate::config::Config;
use crate::group::{Group, GroupHandle, GroupKind};
use crate::interner::{KeyCache, StringCache};
use crate::probe::{MemoryProbe, NullProbe};
use crate::resolver::{NullResolver, ObjectResolver};
use crate::{ProfilerError, Result};

const VIRTUAL_GROUP_PRIORITY: i32 = 10;

/// Shared engine services: caches, collaborators, the group registry, and
/// session state. Owned by [`Profiler`] and by any companion thread it
/// spawned.
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) clock: Box<dyn ClockSource>,
    pub(crate) probe: Box<dyn MemoryProbe>,
    pub(crate) keys: KeyCache,
    pub(crate) strings: StringCache,
    pub(crate) resolver: Mutex<Box<dyn ObjectResolver>>,
    pub(crate) gc_key: Key,

    pub(crate) groups: Mutex<Vec<Arc<Group>>>,
    thread_groups: ThreadLocal<Arc<Group>>,
    next_order: AtomicU32,

    pub(crate) enabled: AtomicBool,
    pub(crate) memory_tracking: AtomicBool,
    pub(crate) realtime: AtomicBool,
    pub(crate) recording: AtomicBool,

    session: Mutex<Option<Session>>,
    session_hot: ArcSwapOption<SessionHot>,
}

/// Session state read on the frame path without taking the session lock.
struct SessionHot {
    frame_budget: Option<u32>,
    frames_seen: AtomicU32,
}

struct Session {
    name: String,
    started_unix_ns: u64,
    completed: Option<Recording>,
    watchdog: Option<WatchdogHandle>,
}

/// Bounds of one recording session. At least one budget is required; the
/// watchdog uses `duration` (or the configured maximum for frame-bounded
/// sessions) as its wall-clock budget.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub name: String,
    pub frames: Option<u32>,
    pub duration: Option<Duration>,
}

impl SessionOptions {
    pub fn frames(name: &str, frames: u32) -> Self {
        SessionOptions {
            name: name.to_string(),
            frames: Some(frames),
            duration: None,
        }
    }

    pub fn duration(name: &str, duration: Duration) -> Self {
        SessionOptions {
            name: name.to_string(),
            frames: None,
            duration: Some(duration),
        }
    }
}

struct WatchdogHandle {
    signal: Arc<(Mutex<bool>, Condvar)>,
}

impl WatchdogHandle {
    fn cancel(&self) {
        let (lock, cvar) = &*self.signal;
        *lock.lock() = true;
        cvar.notify_all();
    }
}

/// Process-wide profiling facade. Create once per host, share as
/// `Arc<Profiler>`; teardown is tied to its drop.
pub struct Profiler {
    shared: Arc<Shared>,
}

impl Profiler {
    pub fn new(config: Config) -> Self {
        Self::with_collaborators(
            config,
            Box::new(MonotonicClock),
            Box::new(NullProbe),
            Box::new(NullResolver),
        )
    }

    pub fn with_collaborators(
        config: Config,
        clock: Box<dyn ClockSource>,
        probe: Box<dyn MemoryProbe>,
        resolver: Box<dyn ObjectResolver>,
    ) -> Self {
        let keys = KeyCache::new();
        let gc_key = keys.get_or_add("GC");
        let memory_tracking = config.memory_tracking;
        let realtime = config.realtime_events;
        Profiler {
            shared: Arc::new(Shared {
                config,
                clock,
                probe,
                keys,
                strings: StringCache::new(),
                resolver: Mutex::new(resolver),
                gc_key,
                groups: Mutex::new(Vec::new()),
                thread_groups: ThreadLocal::new(),
                next_order: AtomicU32::new(0),
                enabled: AtomicBool::new(true),
                memory_tracking: AtomicBool::new(memory_tracking),
                realtime: AtomicBool::new(realtime),
                recording: AtomicBool::new(false),
                session: Mutex::new(None),
                session_hot: ArcSwapOption::from(None),
            }),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Relaxed)
    }

    pub fn set_memory_tracking(&self, enabled: bool) {
        self.shared.memory_tracking.store(enabled, Ordering::Relaxed);
    }

    pub fn set_realtime_events(&self, enabled: bool) {
        self.shared.realtime.store(enabled, Ordering::Relaxed);
    }

    /// The calling thread's group, created lazily on first use and cached by
    /// thread identity for the rest of the process lifetime.
    pub fn group(&self) -> GroupHandle {
        let group = self.shared.thread_groups.get_or(|| {
            let tid = unsafe { libc::syscall(libc::SYS_gettid) as i32 };
            let name = thread::current()
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("thread-{tid}"));
            self.register_group(name, GroupKind::Thread(tid), 0)
        });
        GroupHandle {
            group: group.clone(),
            shared: self.shared.clone(),
        }
    }

    /// Named group for a non-thread context (job pools and the like). The
    /// caller owns exclusive use of the handle between frame boundaries.
    pub fn virtual_group(&self, name: &str) -> GroupHandle {
        let existing = self
            .shared
            .groups
            .lock()
            .iter()
            .find(|group| group.kind == GroupKind::Virtual && group.name == name)
            .cloned();
        let group = existing.unwrap_or_else(|| {
            self.register_group(name.to_string(), GroupKind::Virtual, VIRTUAL_GROUP_PRIORITY)
        });
        GroupHandle {
            group,
            shared: self.shared.clone(),
        }
    }

    fn register_group(&self, name: String, kind: GroupKind, sort_priority: i32) -> Arc<Group> {
        let order = self.shared.next_order.fetch_add(1, Ordering::Relaxed);
        let group = Arc::new(Group::new(
            name,
            kind,
            sort_priority,
            order,
            self.shared.config.segment_capacity,
            self.shared.recording.load(Ordering::SeqCst),
        ));
        debug!(group = group.name(), ?kind, order, "profiler group created");
        self.shared.groups.lock().push(group.clone());
        group
    }

    pub fn begin_frame(&self) {
        self.group().begin_frame();
    }

    /// Finalize the calling thread's frame and advance the session frame
    /// budget. The host's main loop calls this once per tick; worker threads
    /// end their own groups' frames through [`GroupHandle::end_frame`].
    pub fn end_frame(&self) -> bool {
        let outlier = self.group().end_frame();
        if let Some(hot) = self.shared.session_hot.load_full() {
            let frames = hot.frames_seen.fetch_add(1, Ordering::Relaxed) + 1;
            if hot.frame_budget.is_some_and(|budget| frames >= budget) {
                debug!(frames, "frame budget reached, finalizing recording session");
                let mut guard = self.shared.session.lock();
                if let Some(session) = guard.as_mut() {
                    finalize_locked(&self.shared, session);
                }
            }
        }
        outlier
    }

    pub fn is_recording(&self) -> bool {
        self.shared.session_hot.load().is_some()
    }

    /// Start a recording session across every group.
    ///
    /// Fails when a session is already active or the requested bounds are
    /// out of range.
    pub fn start_recording(&self, options: SessionOptions) -> Result<()> {
        let config = &self.shared.config;
        if (options.frames.is_none() && options.duration.is_none())
            || options.frames == Some(0)
            || options.duration == Some(Duration::ZERO)
        {
            return Err(ProfilerError::MissingBudget);
        }
        if let Some(frames) = options.frames {
            if frames > config.max_recording_frames {
                return Err(ProfilerError::FrameBudgetTooLarge {
                    requested: frames,
                    max: config.max_recording_frames,
                });
            }
        }
        let max_duration = Duration::from_secs(config.max_recording_secs);
        if let Some(duration) = options.duration {
            if duration > max_duration {
                return Err(ProfilerError::DurationTooLarge {
                    requested: duration,
                    max: max_duration,
                });
            }
        }

        let mut guard = self.shared.session.lock();
        if guard.is_some() {
            return Err(ProfilerError::AlreadyRecording);
        }

        self.shared.recording.store(true, Ordering::SeqCst);
        self.shared.resolver.lock().clear_cache();
        for group in self.shared.groups.lock().iter() {
            group.core.lock().start_event_recording();
        }

        let started_unix_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        self.shared
            .session_hot
            .store(Some(Arc::new(SessionHot {
                frame_budget: options.frames,
                frames_seen: AtomicU32::new(0),
            })));

        let wall_budget = options.duration.unwrap_or(max_duration);
        let watchdog = spawn_watchdog(self.shared.clone(), options.name.clone(), wall_budget)?;

        debug!(
            session = %options.name,
            frames = ?options.frames,
            duration = ?options.duration,
            "recording session started"
        );
        *guard = Some(Session {
            name: options.name,
            started_unix_ns,
            completed: None,
            watchdog: Some(watchdog),
        });
        Ok(())
    }

    /// Stop the active session and return its recording. Sessions that hit
    /// their frame budget or watchdog deadline are already finalized; this
    /// then just detaches the completed recording.
    pub fn stop_recording(&self) -> Result<Recording> {
        let mut guard = self.shared.session.lock();
        let Some(session) = guard.as_mut() else {
            return Err(ProfilerError::NotRecording);
        };
        finalize_locked(&self.shared, session);
        let session = guard.take().expect("session checked above");
        session.completed.ok_or(ProfilerError::NotRecording)
    }
}

impl Drop for Profiler {
    fn drop(&mut self) {
        let mut guard = self.shared.session.lock();
        if let Some(session) = guard.as_mut() {
            finalize_locked(&self.shared, session);
        }
        guard.take();
    }
}

/// Detach every group's capture and assemble the immutable recording.
/// Idempotent: the swap of the hot session state decides a single winner.
fn finalize_locked(shared: &Shared, session: &mut Session) -> bool {
    let Some(hot) = shared.session_hot.swap(None) else {
        return false;
    };
    shared.recording.store(false, Ordering::SeqCst);
    if let Some(watchdog) = session.watchdog.take() {
        watchdog.cancel();
    }
    let num_frames = hot.frames_seen.load(Ordering::Relaxed);

    let mut groups: Vec<Arc<Group>> = shared.groups.lock().clone();
    groups.sort_by(|a, b| {
        a.sort_priority
            .cmp(&b.sort_priority)
            .then(a.declared_order.cmp(&b.declared_order))
            .then_with(|| a.name.cmp(&b.name))
    });

    let mut objects = Vec::new();
    let mut group_recordings = Vec::new();
    for group in groups {
        let mut core = group.core.lock();
        if let Some((mut group_recording, resolved)) =
            core.stop_event_recording(shared, group.name())
        {
            let offset = objects.len() as u32;
            if offset > 0 {
                rebase_object_refs(&mut group_recording.events, offset);
            }
            objects.extend(resolved);
            group_recordings.push(group_recording);
        }
    }

    debug!(
        session = %session.name,
        num_frames,
        groups = group_recordings.len(),
        "recording session finalized"
    );
    session.completed = Some(Recording {
        name: session.name.clone(),
        started_unix_ns: session.started_unix_ns,
        num_frames,
        groups: group_recordings,
        event_names: shared.keys.snapshot(),
        strings: shared.strings.snapshot(),
        objects,
    });
    true
}

fn rebase_object_refs(events: &mut [Event], offset: u32) {
    for event in events {
        event.extra = match event.extra {
            ExtraValue::Object(ObjectRef(index)) => ExtraValue::Object(ObjectRef(index + offset)),
            ExtraValue::Category {
                label,
                object: Some(ObjectRef(index)),
            } => ExtraValue::Category {
                label,
                object: Some(ObjectRef(index + offset)),
            },
            other => other,
        };
    }
}

fn spawn_watchdog(
    shared: Arc<Shared>,
    session_name: String,
    budget: Duration,
) -> std::io::Result<WatchdogHandle> {
    let signal = Arc::new((Mutex::new(false), Condvar::new()));
    let thread_signal = signal.clone();

    thread::Builder::new()
        .name("tickprof-watchdog".to_string())
        .spawn(move || {
            let (lock, cvar) = &*thread_signal;
            let deadline = Instant::now() + budget;
            let mut cancelled = lock.lock();
            while !*cancelled {
                if cvar.wait_until(&mut cancelled, deadline).timed_out() {
                    break;
                }
            }
            let expired = !*cancelled;
            drop(cancelled);

            if expired {
                warn!(
                    session = %session_name,
                    ?budget,
                    "wall-clock budget elapsed before the frame budget, force-stopping recording"
                );
                let mut guard = shared.session.lock();
                if let Some(session) = guard.as_mut() {
                    finalize_locked(&shared, session);
                }
            }
        })?;

    Ok(WatchdogHandle { signal })
}
