use crate::profiler::Shared;
use crate::resolver::{RawObjectRef, ResolutionPass};
use crate::timer::{FrameSample, Timer, TimerState};
use parking_lot::Mutex;
use profdata::{flags, Event, ExtraValue, Key, ObjectRef, ResolvedObject};
use segbuf::{SegBuf, SlotId};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::trace;

/// Stable handle to a timer node in its group's arena. Hot call sites cache
/// one to skip the child lookup; [`GroupHandle::start_slot`] re-validates the
/// tree position on every use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSlot(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Thread(i32),
    Virtual,
}

/// Raw snapshot of one outlier frame, kept in a bounded ring while no
/// session is recording.
#[derive(Debug, Clone)]
pub struct OutlierFrame {
    pub frame_index: u64,
    pub events: Vec<Event>,
    pub objects: Vec<ResolvedObject>,
}

/// Per-thread (or virtual) container owning a timer tree, its event
/// allocator, and frame/recording bookkeeping. All mutable state sits behind
/// one group-local mutex: the owning thread takes it uncontended on every
/// call, a controller thread takes it only to start/stop/drain a session.
pub struct Group {
    pub(crate) name: String,
    pub(crate) kind: GroupKind,
    pub(crate) sort_priority: i32,
    pub(crate) declared_order: u32,
    pub(crate) core: Mutex<GroupCore>,
}

impl Group {
    pub(crate) fn new(
        name: String,
        kind: GroupKind,
        sort_priority: i32,
        declared_order: u32,
        segment_capacity: usize,
        recording: bool,
    ) -> Self {
        Group {
            name,
            kind,
            sort_priority,
            declared_order,
            core: Mutex::new(GroupCore {
                timers: Vec::new(),
                roots: HashMap::new(),
                root_order: Vec::new(),
                current: None,
                depth: 0,
                alloc: SegBuf::with_segment_capacity(segment_capacity),
                local_keys: HashMap::new(),
                frame_index: 0,
                frame_first_event: 0,
                frame_starts: Vec::new(),
                frame_ends: Vec::new(),
                outlier_frames: Vec::new(),
                recent_outliers: VecDeque::new(),
                raw_objects: Vec::new(),
                pending_slots: Vec::new(),
                resolved_objects: Vec::new(),
                last_snapshots: HashMap::new(),
                recording,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> GroupKind {
        self.kind
    }
}

pub(crate) struct GroupCore {
    pub(crate) timers: Vec<Timer>,
    roots: HashMap<Key, usize>,
    root_order: Vec<usize>,
    current: Option<usize>,
    pub(crate) depth: u16,
    alloc: SegBuf<Event>,
    local_keys: HashMap<String, Key>,

    frame_index: u64,
    frame_first_event: u64,
    frame_starts: Vec<u64>,
    frame_ends: Vec<u64>,
    outlier_frames: Vec<u64>,
    recent_outliers: VecDeque<OutlierFrame>,

    raw_objects: Vec<RawObjectRef>,
    pending_slots: Vec<SlotId>,
    resolved_objects: Vec<ResolvedObject>,
    last_snapshots: HashMap<usize, (RawObjectRef, u32)>,

    pub(crate) recording: bool,
}

impl GroupCore {
    fn intern(&mut self, shared: &Shared, name: &str) -> Key {
        if let Some(&key) = self.local_keys.get(name) {
            return key;
        }
        let key = shared.keys.get_or_add(name);
        self.local_keys.insert(name.to_string(), key);
        key
    }

    fn ensure_child(&mut self, shared: &Shared, name: &str) -> usize {
        let key = self.intern(shared, name);
        let existing = match self.current {
            Some(parent) => self.timers[parent].children.get(&key).copied(),
            None => self.roots.get(&key).copied(),
        };
        if let Some(idx) = existing {
            return idx;
        }

        let idx = self.timers.len();
        self.timers.push(Timer::new(
            key,
            name.to_string(),
            self.depth + 1,
            self.current,
            shared.config.history_capacity,
            shared.config.stats_window,
        ));
        match self.current {
            Some(parent) => {
                self.timers[parent].children.insert(key, idx);
                self.timers[parent].child_order.push(idx);
            }
            None => {
                self.roots.insert(key, idx);
                self.root_order.push(idx);
            }
        }
        idx
    }

    fn subtree_active(&self, shared: &Shared) -> bool {
        let ancestor_disabled = self
            .current
            .map(|idx| self.timers[idx].state == TimerState::StartedDisabled)
            .unwrap_or(false);
        shared.enabled.load(Ordering::Relaxed) && !ancestor_disabled
    }

    pub(crate) fn start(&mut self, shared: &Shared, name: &str) -> TimerSlot {
        let active = self.subtree_active(shared);
        let idx = self.ensure_child(shared, name);
        self.start_at(shared, idx, active);
        TimerSlot(idx)
    }

    pub(crate) fn start_slot(&mut self, shared: &Shared, slot: TimerSlot) {
        assert!(slot.0 < self.timers.len(), "stale timer slot");
        let active = self.subtree_active(shared);
        self.start_at(shared, slot.0, active);
    }

    fn start_at(&mut self, shared: &Shared, idx: usize, active: bool) {
        {
            let timer = &self.timers[idx];
            if timer.state == TimerState::Running {
                panic!("timer '{}' started while already running", timer.name);
            }
            assert_eq!(
                timer.depth,
                self.depth + 1,
                "timer '{}' started at depth {} but the group is at depth {}",
                timer.name,
                timer.depth,
                self.depth,
            );
            assert_eq!(
                timer.parent, self.current,
                "timer '{}' started under a different parent",
                timer.name,
            );
        }

        if !active {
            self.timers[idx].state = TimerState::StartedDisabled;
            self.current = Some(idx);
            self.depth += 1;
            return;
        }

        let memory = shared.memory_tracking.load(Ordering::Relaxed);
        let record_events = self.recording || shared.realtime.load(Ordering::Relaxed);

        let mem_before = if memory {
            shared.probe.allocated_bytes()
        } else {
            None
        };
        let gc_before = if memory && self.recording {
            shared.probe.gc_collections()
        } else {
            [0; crate::probe::GC_GENERATIONS]
        };
        let gc_total: u64 = gc_before.iter().sum();
        let parent = self.current;

        let open_slot = if record_events {
            let (key, depth) = {
                let timer = &self.timers[idx];
                (timer.key, timer.depth)
            };
            let mut event_flags = 0u8;
            if mem_before.is_some() {
                event_flags |= flags::MEMORY_TRACKED;
            }
            Some(self.alloc.alloc(Event {
                name_key: key,
                flags: event_flags,
                depth,
                start_ticks: 0,
                end_ticks: 0,
                mem_before: mem_before.unwrap_or(0),
                mem_after: 0,
                extra: ExtraValue::None,
            }))
        } else {
            None
        };

        {
            let timer = &mut self.timers[idx];
            timer.state = TimerState::Running;
            timer.invoke_count += 1;
            timer.open_slot = open_slot;
            timer.mem_before = mem_before;
            timer.gc_before = gc_before;
        }
        self.current = Some(idx);
        self.depth += 1;

        // Timestamp last so bookkeeping above is not measured.
        let now = shared.clock.now_ticks();
        self.timers[idx].start_ticks = now;
        if let Some(slot) = open_slot {
            if let Some(event) = self.alloc.get_mut(slot) {
                event.start_ticks = now;
            }
        }

        if memory && self.recording {
            if let Some(parent) = parent {
                let parent = &mut self.timers[parent];
                if parent.gc_at_first_child.is_none() {
                    parent.gc_at_first_child = Some(gc_total);
                    parent.first_child_start_ticks = Some(now);
                }
            }
        }
    }

    pub(crate) fn stop(&mut self, shared: &Shared) {
        // Timestamp first, mirroring start().
        let end = shared.clock.now_ticks();

        let idx = match self.current {
            Some(idx) => idx,
            None => panic!("stop called with no running timer"),
        };

        if self.timers[idx].state == TimerState::StartedDisabled {
            let timer = &mut self.timers[idx];
            timer.state = TimerState::Stopped;
            self.current = timer.parent;
            self.depth -= 1;
            return;
        }
        debug_assert_eq!(self.timers[idx].state, TimerState::Running);

        let record_events = self.recording || shared.realtime.load(Ordering::Relaxed);
        let memory = self.timers[idx].mem_before.is_some();
        let track_gc = shared.memory_tracking.load(Ordering::Relaxed) && self.recording;

        let mem_after = if memory {
            shared.probe.allocated_bytes()
        } else {
            None
        };
        let gc_after = if track_gc {
            Some(shared.probe.gc_collections())
        } else {
            None
        };

        let (parent, gc_inclusive, gc_markers, closed_slot, start_ticks) = {
            let timer = &mut self.timers[idx];
            let elapsed = end.saturating_sub(timer.start_ticks);
            timer.inclusive_ticks += elapsed;

            if let (Some(before), Some(after)) = (timer.mem_before, mem_after) {
                timer.mem_delta += after - before;
            }

            let mut gc_inclusive = 0u64;
            if let Some(after) = gc_after {
                gc_inclusive = after
                    .iter()
                    .zip(timer.gc_before.iter())
                    .map(|(a, b)| a.saturating_sub(*b))
                    .sum();
                timer.gc_frame += gc_inclusive;
            }

            // Collections not accounted to any child split into the portion
            // observed before the first child ran and the remainder, so the
            // pause lands on the scope that actually incurred it.
            let gc_exclusive = gc_inclusive.saturating_sub(timer.children_gc);
            let gc_markers = if gc_exclusive > 0 && record_events {
                let gc_before_total: u64 = timer.gc_before.iter().sum();
                let before_portion = timer
                    .gc_at_first_child
                    .map(|at_first| at_first.saturating_sub(gc_before_total))
                    .unwrap_or(0)
                    .min(gc_exclusive);
                Some((
                    before_portion,
                    gc_exclusive - before_portion,
                    timer.first_child_start_ticks.unwrap_or(end),
                    timer.depth,
                ))
            } else {
                None
            };

            timer.state = TimerState::WasRun;
            (
                timer.parent,
                gc_inclusive,
                gc_markers,
                timer.open_slot.take(),
                timer.start_ticks,
            )
        };

        if let Some(slot) = closed_slot {
            // The slot is gone if a controller drained the allocator while
            // this span was open; timing already accumulated above.
            if let Some(event) = self.alloc.get_mut(slot) {
                event.end_ticks = end.max(event.start_ticks);
                event.mem_after = mem_after.unwrap_or(0);
            }
        }

        if let Some((before_n, after_n, first_child_ticks, depth)) = gc_markers {
            if before_n > 0 {
                self.push_gc_marker(shared, depth + 1, first_child_ticks.max(start_ticks), before_n);
            }
            if after_n > 0 {
                self.push_gc_marker(shared, depth + 1, end, after_n);
            }
        }

        self.current = parent;
        self.depth -= 1;
        if let Some(parent) = parent {
            self.timers[parent].children_gc += gc_inclusive;
        }
    }

    fn push_gc_marker(&mut self, shared: &Shared, depth: u16, ticks: u64, collections: u64) {
        self.alloc.alloc(Event {
            name_key: shared.gc_key,
            flags: flags::SINGLE_POINT,
            depth,
            start_ticks: ticks,
            end_ticks: ticks,
            mem_before: 0,
            mem_after: 0,
            extra: ExtraValue::Long(collections as i64),
        });
    }

    pub(crate) fn start_or_split(&mut self, shared: &Shared, name: &str) -> TimerSlot {
        if let Some(idx) = self.current {
            let timer = &self.timers[idx];
            let running = matches!(
                timer.state,
                TimerState::Running | TimerState::StartedDisabled
            );
            if running && timer.name == name {
                // Disabled timers have no open event; split is then a no-op.
                self.split(shared, idx);
                return TimerSlot(idx);
            }
        }
        self.start(shared, name)
    }

    /// Close the current open event and reopen one with the same key/depth.
    /// The logical timer keeps running; the scope shows up as several
    /// sub-intervals.
    fn split(&mut self, shared: &Shared, idx: usize) {
        let Some(slot) = self.timers[idx].open_slot else {
            return;
        };
        let now = shared.clock.now_ticks();
        let (key, depth, event_flags) = match self.alloc.get_mut(slot) {
            Some(event) => {
                event.end_ticks = now.max(event.start_ticks);
                (event.name_key, event.depth, event.flags)
            }
            None => return,
        };
        let new_slot = self.alloc.alloc(Event {
            name_key: key,
            flags: event_flags,
            depth,
            start_ticks: now,
            end_ticks: 0,
            mem_before: 0,
            mem_after: 0,
            extra: ExtraValue::None,
        });
        self.timers[idx].open_slot = Some(new_slot);
    }

    pub(crate) fn instant(&mut self, shared: &Shared, name: &str, extra: ExtraValue) {
        if !shared.enabled.load(Ordering::Relaxed) {
            return;
        }
        if !(self.recording || shared.realtime.load(Ordering::Relaxed)) {
            return;
        }
        let key = self.intern(shared, name);
        let now = shared.clock.now_ticks();
        self.alloc.alloc(Event {
            name_key: key,
            flags: flags::SINGLE_POINT,
            depth: self.depth + 1,
            start_ticks: now,
            end_ticks: now,
            mem_before: 0,
            mem_after: 0,
            extra,
        });
    }

    pub(crate) fn set_extra(&mut self, extra: ExtraValue) {
        let Some(idx) = self.current else {
            panic!("set_extra called with no running timer");
        };
        if self.timers[idx].state != TimerState::Running {
            return;
        }
        if let Some(slot) = self.timers[idx].open_slot {
            if let Some(event) = self.alloc.get_mut(slot) {
                event.extra = extra;
            }
        }
    }

    pub(crate) fn attach_object(&mut self, raw: RawObjectRef) {
        let Some(idx) = self.current else {
            panic!("attach_object called with no running timer");
        };
        if self.timers[idx].state != TimerState::Running {
            return;
        }
        let Some(slot) = self.timers[idx].open_slot else {
            return;
        };
        let raw_index = self.raw_objects.len() as u32;
        self.raw_objects.push(raw);
        if let Some(event) = self.alloc.get_mut(slot) {
            event.extra = ExtraValue::Object(ObjectRef(raw_index));
            self.pending_slots.push(slot);
        }
    }

    pub(crate) fn attach_category(
        &mut self,
        shared: &Shared,
        label: &str,
        raw: Option<RawObjectRef>,
    ) {
        let Some(idx) = self.current else {
            panic!("attach_category called with no running timer");
        };
        if self.timers[idx].state != TimerState::Running {
            return;
        }
        let Some(slot) = self.timers[idx].open_slot else {
            return;
        };
        let label = shared.strings.get_or_add(label);
        let object = raw.map(|raw| {
            let raw_index = self.raw_objects.len() as u32;
            self.raw_objects.push(raw);
            ObjectRef(raw_index)
        });
        if let Some(event) = self.alloc.get_mut(slot) {
            event.extra = ExtraValue::Category { label, object };
            if object.is_some() {
                self.pending_slots.push(slot);
            }
        }
    }

    pub(crate) fn unwind_to_depth(&mut self, shared: &Shared, depth: u16) {
        while self.depth > depth && self.current.is_some() {
            self.stop(shared);
        }
    }

    pub(crate) fn begin_frame(&mut self) {
        self.frame_first_event = self.alloc.len();
    }

    pub(crate) fn end_frame(&mut self, shared: &Shared, group_name: &str) -> bool {
        if let Some(idx) = self.current {
            panic!(
                "end_frame called while timer '{}' is still running",
                self.timers[idx].name
            );
        }

        let mut any_outlier = false;
        for i in 0..self.root_order.len() {
            let root = self.root_order[i];
            let (_, outlier) = self.end_frame_timer(shared, root);
            any_outlier |= outlier;
        }

        let range = self.frame_first_event..self.alloc.len();
        let capture = shared.config.capture_outlier_frames;

        if self.recording || (any_outlier && capture) {
            self.resolve_pending(shared);
        }

        if self.recording {
            self.frame_starts.push(range.start);
            self.frame_ends.push(range.end);
            if any_outlier {
                self.outlier_frames.push(self.frame_index);
            }
            self.frame_first_event = self.alloc.len();
            trace!(
                group = group_name,
                frame = self.frame_index,
                events = range.end - range.start,
                outlier = any_outlier,
                "frame recorded"
            );
        } else {
            if any_outlier && capture {
                let events: Vec<Event> = self.alloc.iter_range(range).copied().collect();
                let objects = std::mem::take(&mut self.resolved_objects);
                self.last_snapshots.clear();
                if self.recent_outliers.len() >= shared.config.outlier_frame_capacity.max(1) {
                    self.recent_outliers.pop_front();
                }
                self.recent_outliers.push_back(OutlierFrame {
                    frame_index: self.frame_index,
                    events,
                    objects,
                });
            }
            self.raw_objects.clear();
            self.pending_slots.clear();
            self.alloc.reset();
            self.frame_first_event = 0;
        }

        self.frame_index += 1;
        any_outlier
    }

    fn end_frame_timer(&mut self, shared: &Shared, idx: usize) -> (u64, bool) {
        let mut child_sum = 0u64;
        let mut sub_outlier = false;
        for i in 0..self.timers[idx].child_order.len() {
            let child = self.timers[idx].child_order[i];
            let ran = self.timers[child].invoke_count > 0;
            let (child_inclusive, child_outlier) = self.end_frame_timer(shared, child);
            if ran {
                child_sum += child_inclusive;
            }
            sub_outlier |= child_outlier;
        }

        let timer = &mut self.timers[idx];
        let inclusive = timer.inclusive_ticks;
        let exclusive = inclusive.saturating_sub(child_sum);
        let ran = timer.invoke_count > 0;

        let outlier = ran
            && timer.stats.observe(
                exclusive as f64,
                shared.config.outlier_std_multiplier,
                shared.config.outlier_noise_floor_ticks as f64,
                shared.config.outlier_min_samples as u64,
            );

        timer.history.write(FrameSample {
            inclusive_ticks: inclusive,
            exclusive_ticks: exclusive,
            memory_delta: timer.mem_delta,
            gc_collections: timer.gc_frame,
            invoke_count: timer.invoke_count,
        });
        timer.reset_frame_accumulators();

        (inclusive, outlier || sub_outlier)
    }

    /// Convert every captured raw reference into a serializable snapshot and
    /// rewrite the referencing events. A reference that fails to resolve
    /// degrades that one event to a placeholder payload.
    fn resolve_pending(&mut self, shared: &Shared) {
        if self.pending_slots.is_empty() {
            self.raw_objects.clear();
            return;
        }

        let mut resolver = shared.resolver.lock();
        let mut pass = ResolutionPass::new(&mut **resolver);
        let pending = std::mem::take(&mut self.pending_slots);

        for slot in pending {
            let raw_index = match self.alloc.get(slot).map(|event| event.extra) {
                Some(ExtraValue::Object(ObjectRef(index))) => index,
                Some(ExtraValue::Category {
                    object: Some(ObjectRef(index)),
                    ..
                }) => index,
                _ => continue,
            };
            let Some(raw) = self.raw_objects.get(raw_index as usize).cloned() else {
                continue;
            };

            let resolved_index = pass.resolve(&raw).map(|snapshot| {
                let ptr = Arc::as_ptr(&raw) as *const () as usize;
                match self.last_snapshots.get(&ptr) {
                    Some((_, last)) if self.resolved_objects[*last as usize] == snapshot => *last,
                    _ => {
                        let id = self.resolved_objects.len() as u32;
                        self.resolved_objects.push(snapshot);
                        self.last_snapshots.insert(ptr, (raw.clone(), id));
                        id
                    }
                }
            });

            if let Some(event) = self.alloc.get_mut(slot) {
                event.extra = match (event.extra, resolved_index) {
                    (ExtraValue::Object(_), Some(id)) => ExtraValue::Object(ObjectRef(id)),
                    (ExtraValue::Object(_), None) => ExtraValue::None,
                    (ExtraValue::Category { label, .. }, Some(id)) => ExtraValue::Category {
                        label,
                        object: Some(ObjectRef(id)),
                    },
                    (ExtraValue::Category { label, .. }, None) => ExtraValue::Category {
                        label,
                        object: None,
                    },
                    (other, _) => other,
                };
            }
        }
        self.raw_objects.clear();
    }

    pub(crate) fn start_event_recording(&mut self) {
        self.frame_starts.clear();
        self.frame_ends.clear();
        self.outlier_frames.clear();
        self.alloc.reset();
        self.raw_objects.clear();
        self.pending_slots.clear();
        self.resolved_objects.clear();
        self.last_snapshots.clear();
        self.frame_index = 0;
        self.frame_first_event = 0;
        self.recording = true;
    }

    pub(crate) fn stop_event_recording(
        &mut self,
        shared: &Shared,
        group_name: &str,
    ) -> Option<(profdata::GroupRecording, Vec<ResolvedObject>)> {
        if !self.recording {
            return None;
        }
        self.recording = false;
        self.resolve_pending(shared);

        let events: Vec<Event> = self.alloc.take().into_iter().flatten().collect();
        let frame_start_indices = std::mem::take(&mut self.frame_starts);
        let frame_end_indices = std::mem::take(&mut self.frame_ends);
        let outlier_frames = std::mem::take(&mut self.outlier_frames);
        let resolved = std::mem::take(&mut self.resolved_objects);
        self.last_snapshots.clear();
        self.frame_index = 0;
        self.frame_first_event = 0;

        if events.is_empty() && frame_start_indices.is_empty() {
            return None;
        }
        Some((
            profdata::GroupRecording {
                name: group_name.to_string(),
                events,
                frame_start_indices,
                frame_end_indices,
                outlier_frames,
            },
            resolved,
        ))
    }
}

/// Caller-facing handle pairing a group with the engine's shared services.
#[derive(Clone)]
pub struct GroupHandle {
    pub(crate) group: Arc<Group>,
    pub(crate) shared: Arc<Shared>,
}

impl GroupHandle {
    pub fn name(&self) -> &str {
        self.group.name()
    }

    /// Start the named child of the currently running timer (or a root).
    /// Returns a slot hot call sites may cache for [`Self::start_slot`].
    ///
    /// # Panics
    /// Panics if that timer is already running: mismatched instrumentation
    /// would corrupt the nesting invariant for every later frame.
    pub fn start(&self, name: &str) -> TimerSlot {
        self.group.core.lock().start(&self.shared, name)
    }

    /// Start through a cached slot, skipping the child lookup. The slot must
    /// name a child of the currently running timer at the matching depth.
    pub fn start_slot(&self, slot: TimerSlot) {
        self.group.core.lock().start_slot(&self.shared, slot)
    }

    /// Start, or when the named timer is already the innermost running one,
    /// close its open event and open a new one with the same key and depth.
    pub fn start_or_split(&self, name: &str) -> TimerSlot {
        self.group.core.lock().start_or_split(&self.shared, name)
    }

    /// # Panics
    /// Panics if no timer is running.
    pub fn stop(&self) {
        self.group.core.lock().stop(&self.shared)
    }

    /// Append a single-point marker event at the current nesting depth.
    pub fn instant(&self, name: &str, extra: ExtraValue) {
        self.group.core.lock().instant(&self.shared, name, extra)
    }

    /// Set the extra payload of the running timer's open event.
    pub fn set_extra(&self, extra: ExtraValue) {
        self.group.core.lock().set_extra(extra)
    }

    /// Attach an object payload to the running timer's open event. Capturing
    /// is one `Arc` clone; the snapshot is produced later by the resolution
    /// pass.
    pub fn attach_object(&self, raw: RawObjectRef) {
        self.group.core.lock().attach_object(raw)
    }

    /// Attach a category payload (interned label plus optional object) to
    /// the running timer's open event.
    pub fn attach_category(&self, label: &str, raw: Option<RawObjectRef>) {
        self.group
            .core
            .lock()
            .attach_category(&self.shared, label, raw)
    }

    pub fn begin_frame(&self) {
        self.group.core.lock().begin_frame()
    }

    /// Finalize the frame for this group only. Returns whether any timer in
    /// the group flagged the frame as an outlier. The host's frame driver
    /// should go through [`crate::Profiler::end_frame`] instead, which also
    /// advances the session frame budget.
    ///
    /// # Panics
    /// Panics if a timer of this group is still running.
    pub fn end_frame(&self) -> bool {
        self.group
            .core
            .lock()
            .end_frame(&self.shared, &self.group.name)
    }

    /// Stop every active timer deeper than `depth`. Used by scope guards
    /// after an unwind skipped the normal stop calls.
    pub fn unwind_to_depth(&self, depth: u16) {
        self.group.core.lock().unwind_to_depth(&self.shared, depth)
    }

    pub fn depth(&self) -> u16 {
        self.group.core.lock().depth
    }

    pub fn timer_state(&self, slot: TimerSlot) -> Option<TimerState> {
        self.group
            .core
            .lock()
            .timers
            .get(slot.0)
            .map(|timer| timer.state)
    }

    /// Snapshot of the bounded recent-outlier-frame ring.
    pub fn recent_outlier_frames(&self) -> Vec<OutlierFrame> {
        self.group
            .core
            .lock()
            .recent_outliers
            .iter()
            .cloned()
            .collect()
    }

    /// Read access to the timer arena, for presentation layers and tests.
    pub fn visit_timers<R>(&self, f: impl FnOnce(&[Timer]) -> R) -> R {
        f(&self.group.core.lock().timers)
    }

    /// RAII scope: starts `name` now, unwinds and stops on drop — on every
    /// exit path, including panics.
    pub fn scope(&self, name: &str) -> crate::scope::Scope<'_> {
        self.start(name);
        crate::scope::Scope::new(self, self.depth())
    }
}
