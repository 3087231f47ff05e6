//! Cooperative frame scheduling.
//!
//! A [`Ticker`] holds every task that wants a callback on the next display
//! refresh. The host drives it by calling [`Ticker::tick`] once per frame; each
//! task runs at most once per tick and reports whether it wants another frame.
//! Nothing here spawns threads. Cancellation is synchronous: once
//! [`Ticker::cancel`] returns, the cancelled task never runs again, even when
//! the cancel happens from inside another task's callback.
//!
//! ```text
//!   host refresh ──▶ Ticker::tick(now) ──▶ task.on_frame(now) ──▶ Continue ─┐
//!                           ▲                                              │
//!                           └──────────────── next refresh ◀───────────────┘
//! ```

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("ticker is already dispatching a frame")]
    ReentrantTick,
}

/// What a task wants after its frame callback returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reschedule {
    Continue,
    Stop,
}

/// Work performed once per frame.
pub trait FrameTask {
    fn on_frame(&mut self, now: Instant) -> Reschedule;
}

impl<F> FrameTask for F
where
    F: FnMut(Instant) -> Reschedule,
{
    fn on_frame(&mut self, now: Instant) -> Reschedule {
        self(now)
    }
}

/// Token identifying a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

#[derive(Default)]
struct TickerState {
    next_id: u64,
    tasks: BTreeMap<TaskId, Box<dyn FrameTask>>,
    /// Task currently executing inside `tick`, if any.
    running: Option<TaskId>,
    /// Cancellations requested for the running task.
    cancelled: HashSet<TaskId>,
    dispatching: bool,
    frames: u64,
}

/// Single-threaded frame callback scheduler.
///
/// Cloning a `Ticker` yields another handle to the same schedule.
#[derive(Clone, Default)]
pub struct Ticker {
    state: Rc<RefCell<TickerState>>,
}

impl Ticker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `task` for the next tick. Tasks scheduled while a tick is in
    /// progress first run on the following tick.
    pub fn schedule(&self, task: impl FrameTask + 'static) -> TaskId {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = TaskId(state.next_id);
        state.tasks.insert(id, Box::new(task));
        tracing::trace!(%id, "task scheduled");
        id
    }

    /// Removes a task. Returns `false` when the task was already gone, so
    /// repeated cancellation is harmless.
    pub fn cancel(&self, id: TaskId) -> bool {
        let mut state = self.state.borrow_mut();
        if state.tasks.remove(&id).is_some() {
            tracing::trace!(%id, "task cancelled");
            return true;
        }
        if state.running == Some(id) {
            return state.cancelled.insert(id);
        }
        false
    }

    pub fn is_scheduled(&self, id: TaskId) -> bool {
        let state = self.state.borrow();
        (state.tasks.contains_key(&id) || state.running == Some(id))
            && !state.cancelled.contains(&id)
    }

    /// Number of live tasks waiting for a frame.
    pub fn len(&self) -> usize {
        let state = self.state.borrow();
        let running = state
            .running
            .filter(|id| !state.cancelled.contains(id))
            .is_some();
        state.tasks.len() + usize::from(running)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames dispatched so far.
    pub fn frames(&self) -> u64 {
        self.state.borrow().frames
    }

    /// Dispatches one frame to every task scheduled before this call and
    /// returns how many callbacks ran.
    pub fn tick(&self, now: Instant) -> Result<usize, SchedulerError> {
        let ids: Vec<TaskId> = {
            let mut state = self.state.borrow_mut();
            if state.dispatching {
                return Err(SchedulerError::ReentrantTick);
            }
            state.dispatching = true;
            state.frames += 1;
            state.tasks.keys().copied().collect()
        };

        let mut ran = 0;
        for id in ids {
            let task = {
                let mut state = self.state.borrow_mut();
                let task = state.tasks.remove(&id);
                if task.is_some() {
                    state.running = Some(id);
                }
                task
            };
            let Some(mut task) = task else {
                continue;
            };

            let outcome = task.on_frame(now);
            ran += 1;

            let mut state = self.state.borrow_mut();
            state.running = None;
            let cancelled = state.cancelled.remove(&id);
            if outcome == Reschedule::Continue && !cancelled {
                state.tasks.insert(id, task);
            }
        }

        self.state.borrow_mut().dispatching = false;
        Ok(ran)
    }
}

impl fmt::Debug for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Ticker")
            .field("tasks", &state.tasks.len())
            .field("frames", &state.frames)
            .finish()
    }
}

/// Gates frame dispatch to an optional frames-per-second cap.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Option<Duration>,
    last_frame: Option<Instant>,
}

fn normalize_fps(value: Option<f32>) -> Option<f32> {
    value.and_then(|fps| if fps > 0.0 && fps.is_finite() { Some(fps) } else { None })
}

impl FramePacer {
    /// `None` (or a non-positive value) means every refresh is a frame.
    pub fn new(target_fps: Option<f32>) -> Self {
        Self {
            interval: normalize_fps(target_fps)
                .map(|fps| Duration::from_secs_f64(1.0 / f64::from(fps))),
            last_frame: None,
        }
    }

    pub fn ready_for_frame(&self, now: Instant) -> bool {
        match (self.interval, self.last_frame) {
            (Some(interval), Some(last)) => now.saturating_duration_since(last) >= interval,
            _ => true,
        }
    }

    /// Deadline of the next capped frame; `None` when uncapped or idle.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.interval, self.last_frame) {
            (Some(interval), Some(last)) => Some(last + interval),
            _ => None,
        }
    }

    pub fn mark_rendered(&mut self, now: Instant) {
        self.last_frame = Some(now);
    }

    pub fn reset(&mut self) {
        self.last_frame = None;
    }
}
