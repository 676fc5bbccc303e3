//! Cooperative, priority-aware task scheduler.
//!
//! Tasks live in one of two min-heaps: the ready queue, ordered by expiration
//! time, and the delayed queue, ordered by start time. The host platform drives
//! the scheduler through two entry points: [`Scheduler::perform_work_until_deadline`]
//! for the zero-delay macrotask and [`Scheduler::handle_timeout`] for timers.
//! Each macrotask runs ready tasks until the time slice is exhausted, then asks
//! the host for another macrotask so input and other host callbacks can run in
//! between.

mod min_heap;

pub use min_heap::{HeapNode, MinHeap};

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::platform::{Clock, HostScheduler, Time};

/// Largest value of a 31-bit signed integer; the idle timeout.
const MAX_SIGNED_31_BIT_INT: Time = 1_073_741_823;

const DEFAULT_FRAME_INTERVAL_MS: Time = 5;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PriorityLevel {
    Immediate,
    UserBlocking,
    Normal,
    Low,
    Idle,
}

/// Time-slice length and the per-priority timeouts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub frame_interval_ms: Time,
    pub immediate_timeout_ms: Time,
    pub user_blocking_timeout_ms: Time,
    pub normal_timeout_ms: Time,
    pub low_timeout_ms: Time,
    pub idle_timeout_ms: Time,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
            // Overdue the moment it is scheduled.
            immediate_timeout_ms: -1,
            user_blocking_timeout_ms: 250,
            normal_timeout_ms: 5_000,
            low_timeout_ms: 10_000,
            idle_timeout_ms: MAX_SIGNED_31_BIT_INT,
        }
    }
}

impl SchedulerConfig {
    pub fn timeout_for(&self, priority: PriorityLevel) -> Time {
        match priority {
            PriorityLevel::Immediate => self.immediate_timeout_ms,
            PriorityLevel::UserBlocking => self.user_blocking_timeout_ms,
            PriorityLevel::Normal => self.normal_timeout_ms,
            PriorityLevel::Low => self.low_timeout_ms,
            PriorityLevel::Idle => self.idle_timeout_ms,
        }
    }
}

/// A unit of scheduled work.
///
/// The callback receives `true` when the task is already past its expiration
/// time. Returning `Some(continuation)` keeps the task queued with the
/// continuation as its new callback and yields back to the host.
pub struct TaskCallback(Box<dyn FnOnce(bool) -> Option<TaskCallback>>);

impl TaskCallback {
    pub fn new(callback: impl FnOnce(bool) -> Option<TaskCallback> + 'static) -> Self {
        Self(Box::new(callback))
    }

    fn call(self, did_timeout: bool) -> Option<TaskCallback> {
        (self.0)(did_timeout)
    }
}

impl fmt::Debug for TaskCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TaskCallback")
    }
}

struct Task {
    id: u64,
    callback: RefCell<Option<TaskCallback>>,
    cancelled: Cell<bool>,
    priority_level: PriorityLevel,
    start_time: Time,
    expiration_time: Time,
    sort_index: Cell<Time>,
}

impl HeapNode for Task {
    fn sort_index(&self) -> Time {
        self.sort_index.get()
    }

    fn id(&self) -> u64 {
        self.id
    }
}

/// Handle to a scheduled task, used for cancellation.
#[derive(Clone)]
pub struct TaskHandle {
    task: Rc<Task>,
}

impl TaskHandle {
    pub fn id(&self) -> u64 {
        self.task.id
    }

    pub fn priority_level(&self) -> PriorityLevel {
        self.task.priority_level
    }

    pub fn expiration_time(&self) -> Time {
        self.task.expiration_time
    }

    /// Logical cancellation: the callback is dropped and the queue entry is
    /// skipped when it reaches the top of its heap.
    pub fn cancel(&self) {
        self.task.cancelled.set(true);
        self.task.callback.borrow_mut().take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.task.cancelled.get()
    }

    /// `true` while the task still has a callback to run (or is running one).
    pub fn is_pending(&self) -> bool {
        !self.task.cancelled.get() && self.task.callback.borrow().is_some()
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.task.id)
            .field("priority_level", &self.task.priority_level)
            .field("start_time", &self.task.start_time)
            .field("expiration_time", &self.task.expiration_time)
            .field("cancelled", &self.task.cancelled.get())
            .finish()
    }
}

struct SchedulerInner {
    clock: Rc<dyn Clock>,
    host: Rc<dyn HostScheduler>,
    config: SchedulerConfig,
    task_queue: RefCell<MinHeap<Rc<Task>>>,
    timer_queue: RefCell<MinHeap<Rc<Task>>>,
    task_id_counter: Cell<u64>,
    current_priority_level: Cell<PriorityLevel>,
    is_performing_work: Cell<bool>,
    is_host_callback_scheduled: Cell<bool>,
    is_host_timeout_scheduled: Cell<bool>,
    is_message_loop_running: Cell<bool>,
    frame_interval: Cell<Time>,
    // Start of the current time slice; -1 outside a slice.
    start_time: Cell<Time>,
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(clock: Rc<dyn Clock>, host: Rc<dyn HostScheduler>) -> Self {
        Self::with_config(clock, host, SchedulerConfig::default())
    }

    pub fn with_config(
        clock: Rc<dyn Clock>,
        host: Rc<dyn HostScheduler>,
        config: SchedulerConfig,
    ) -> Self {
        let frame_interval = config.frame_interval_ms;
        Self {
            inner: Rc::new(SchedulerInner {
                clock,
                host,
                config,
                task_queue: RefCell::new(MinHeap::new()),
                timer_queue: RefCell::new(MinHeap::new()),
                task_id_counter: Cell::new(1),
                current_priority_level: Cell::new(PriorityLevel::Normal),
                is_performing_work: Cell::new(false),
                is_host_callback_scheduled: Cell::new(false),
                is_host_timeout_scheduled: Cell::new(false),
                is_message_loop_running: Cell::new(false),
                frame_interval: Cell::new(frame_interval),
                start_time: Cell::new(-1),
            }),
        }
    }

    pub fn now(&self) -> Time {
        self.inner.clock.now()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn current_priority_level(&self) -> PriorityLevel {
        self.inner.current_priority_level.get()
    }

    /// Runs `f` with `priority` as the current priority level, so work it
    /// schedules without an explicit priority inherits it.
    pub fn run_with_priority<R>(&self, priority: PriorityLevel, f: impl FnOnce() -> R) -> R {
        let previous = self.inner.current_priority_level.replace(priority);
        struct Restore<'a>(&'a Cell<PriorityLevel>, PriorityLevel);
        impl Drop for Restore<'_> {
            fn drop(&mut self) {
                self.0.set(self.1);
            }
        }
        let _restore = Restore(&self.inner.current_priority_level, previous);
        f()
    }

    pub fn schedule_callback(
        &self,
        priority: PriorityLevel,
        callback: impl FnOnce(bool) -> Option<TaskCallback> + 'static,
    ) -> TaskHandle {
        self.schedule_delayed_callback(priority, 0, callback)
    }

    /// Schedules `callback` to become ready `delay_ms` from now. A non-positive
    /// delay puts it straight into the ready queue.
    pub fn schedule_delayed_callback(
        &self,
        priority: PriorityLevel,
        delay_ms: Time,
        callback: impl FnOnce(bool) -> Option<TaskCallback> + 'static,
    ) -> TaskHandle {
        let inner = &self.inner;
        let current_time = self.now();
        let start_time = if delay_ms > 0 {
            current_time + delay_ms
        } else {
            current_time
        };
        let expiration_time = start_time + inner.config.timeout_for(priority);

        let id = inner.task_id_counter.get();
        inner.task_id_counter.set(id + 1);
        let task = Rc::new(Task {
            id,
            callback: RefCell::new(Some(TaskCallback::new(callback))),
            cancelled: Cell::new(false),
            priority_level: priority,
            start_time,
            expiration_time,
            sort_index: Cell::new(-1),
        });

        if start_time > current_time {
            task.sort_index.set(start_time);
            inner.timer_queue.borrow_mut().push(Rc::clone(&task));
            let is_earliest_timer = inner.task_queue.borrow().is_empty()
                && inner
                    .timer_queue
                    .borrow()
                    .peek()
                    .is_some_and(|first| Rc::ptr_eq(first, &task));
            if is_earliest_timer {
                if inner.is_host_timeout_scheduled.get() {
                    inner.host.cancel_host_timeout();
                } else {
                    inner.is_host_timeout_scheduled.set(true);
                }
                inner.host.request_host_timeout(start_time - current_time);
            }
        } else {
            task.sort_index.set(expiration_time);
            inner.task_queue.borrow_mut().push(Rc::clone(&task));
            if !inner.is_host_callback_scheduled.get() && !inner.is_performing_work.get() {
                inner.is_host_callback_scheduled.set(true);
                self.request_host_callback();
            }
        }

        log::trace!("scheduled task {id} at {priority:?}, expires at {expiration_time}");
        TaskHandle { task }
    }

    pub fn cancel_callback(&self, task: &TaskHandle) {
        task.cancel();
    }

    /// `true` once the current time slice is used up.
    pub fn should_yield_to_host(&self) -> bool {
        let elapsed = self.now() - self.inner.start_time.get();
        elapsed >= self.inner.frame_interval.get()
    }

    /// Overrides the slice length to match a target frame rate. `0` restores
    /// the configured default.
    pub fn force_frame_rate(&self, fps: u32) {
        if fps > 125 {
            log::error!(
                "force_frame_rate takes a frame rate between 0 and 125, got {fps}"
            );
            return;
        }
        let interval = if fps > 0 {
            Time::from(1000 / fps)
        } else {
            self.inner.config.frame_interval_ms
        };
        self.inner.frame_interval.set(interval);
    }

    pub fn has_pending_work(&self) -> bool {
        !self.inner.task_queue.borrow().is_empty() || !self.inner.timer_queue.borrow().is_empty()
    }

    /// Host macrotask entry point.
    pub fn perform_work_until_deadline(&self) {
        let inner = &self.inner;
        if !inner.is_message_loop_running.get() {
            return;
        }
        let current_time = self.now();
        inner.start_time.set(current_time);
        let has_more_work = self.flush_work(current_time);
        if has_more_work {
            log::debug!("time slice exhausted, yielding to host");
            inner.host.request_host_callback();
        } else {
            inner.is_message_loop_running.set(false);
        }
    }

    /// Host timer entry point.
    pub fn handle_timeout(&self) {
        let inner = &self.inner;
        inner.is_host_timeout_scheduled.set(false);
        let current_time = self.now();
        self.advance_timers(current_time);

        if inner.is_host_callback_scheduled.get() {
            return;
        }
        if !inner.task_queue.borrow().is_empty() {
            inner.is_host_callback_scheduled.set(true);
            self.request_host_callback();
        } else {
            let first_start = inner.timer_queue.borrow().peek().map(|timer| timer.start_time);
            if let Some(start_time) = first_start {
                self.request_host_timeout(start_time - current_time);
            }
        }
    }

    fn request_host_callback(&self) {
        if !self.inner.is_message_loop_running.replace(true) {
            self.inner.host.request_host_callback();
        }
    }

    fn request_host_timeout(&self, delay_ms: Time) {
        self.inner.is_host_timeout_scheduled.set(true);
        self.inner.host.request_host_timeout(delay_ms);
    }

    fn flush_work(&self, initial_time: Time) -> bool {
        let inner = &self.inner;
        inner.is_host_callback_scheduled.set(false);
        if inner.is_host_timeout_scheduled.replace(false) {
            inner.host.cancel_host_timeout();
        }

        inner.is_performing_work.set(true);
        let previous_priority = inner.current_priority_level.get();
        let has_more_work = self.work_loop(initial_time);
        inner.current_priority_level.set(previous_priority);
        inner.is_performing_work.set(false);
        has_more_work
    }

    /// Moves every delayed task whose start time has passed into the ready
    /// queue, re-keyed by expiration time. Cancelled timers are dropped.
    fn advance_timers(&self, current_time: Time) {
        let inner = &self.inner;
        let mut timers = inner.timer_queue.borrow_mut();
        while let Some(timer) = timers.peek() {
            if timer.cancelled.get() || timer.callback.borrow().is_none() {
                timers.pop();
            } else if timer.start_time <= current_time {
                let Some(timer) = timers.pop() else { break };
                timer.sort_index.set(timer.expiration_time);
                inner.task_queue.borrow_mut().push(timer);
            } else {
                return;
            }
        }
    }

    fn work_loop(&self, initial_time: Time) -> bool {
        let inner = &self.inner;
        let mut current_time = initial_time;
        self.advance_timers(current_time);

        loop {
            let Some(task) = inner.task_queue.borrow().peek().cloned() else {
                break;
            };
            if task.expiration_time > current_time && self.should_yield_to_host() {
                break;
            }

            let callback = task.callback.borrow_mut().take();
            match callback {
                Some(callback) => {
                    inner.current_priority_level.set(task.priority_level);
                    let did_timeout = task.expiration_time <= current_time;
                    log::trace!("running task {} (overdue: {did_timeout})", task.id);
                    let continuation = callback.call(did_timeout);
                    current_time = self.now();
                    match continuation {
                        Some(next) if !task.cancelled.get() => {
                            *task.callback.borrow_mut() = Some(next);
                            self.advance_timers(current_time);
                            return true;
                        }
                        _ => {
                            let mut queue = inner.task_queue.borrow_mut();
                            if queue.peek().is_some_and(|top| Rc::ptr_eq(top, &task)) {
                                queue.pop();
                            }
                        }
                    }
                    self.advance_timers(current_time);
                }
                None => {
                    inner.task_queue.borrow_mut().pop();
                }
            }
        }

        if !inner.task_queue.borrow().is_empty() {
            return true;
        }
        let first_start = inner.timer_queue.borrow().peek().map(|timer| timer.start_time);
        if let Some(start_time) = first_start {
            self.request_host_timeout(start_time - current_time);
        }
        false
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("ready", &self.inner.task_queue.borrow().len())
            .field("delayed", &self.inner.timer_queue.borrow().len())
            .field("priority", &self.inner.current_priority_level.get())
            .finish()
    }
}

#[cfg(test)]
#[path = "../tests/scheduler_tests.rs"]
mod tests;
