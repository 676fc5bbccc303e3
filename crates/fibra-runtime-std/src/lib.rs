//! Standard runtime services backed by Rust's `std` library.
//!
//! This crate provides concrete implementations of the platform traits
//! defined in `fibra-core`. The host's "zero-delay macrotask" and "timer"
//! requests are recorded and serviced by [`StdRuntime::run_until_idle`], which
//! plays the role of the platform event loop.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use fibra_core::{Clock, HostScheduler, Scheduler, SchedulerConfig, Time};
use web_time::Instant;

/// Milliseconds since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// The wall-clock instant matching a [`Clock::now`] reading.
    pub fn instant_at(&self, time: Time) -> Instant {
        self.origin + Duration::from_millis(time.max(0) as u64)
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now(&self) -> Time {
        self.origin.elapsed().as_millis() as Time
    }
}

/// Records the scheduler's host requests for the drive loop.
pub struct StdHostScheduler {
    callback_requested: Cell<bool>,
    timer_deadline: Cell<Option<Instant>>,
    waker: RefCell<Option<Rc<dyn Fn()>>>,
}

impl StdHostScheduler {
    pub fn new() -> Self {
        Self {
            callback_requested: Cell::new(false),
            timer_deadline: Cell::new(None),
            waker: RefCell::new(None),
        }
    }

    /// Returns whether a macrotask has been requested since the last call.
    pub fn take_callback_request(&self) -> bool {
        self.callback_requested.replace(false)
    }

    pub fn timer_deadline(&self) -> Option<Instant> {
        self.timer_deadline.get()
    }

    /// Registers a waker invoked whenever the scheduler asks for a macrotask,
    /// so an embedding event loop can wake up and call
    /// [`StdRuntime::run_until_idle`].
    pub fn set_waker(&self, waker: impl Fn() + 'static) {
        *self.waker.borrow_mut() = Some(Rc::new(waker));
    }

    pub fn clear_waker(&self) {
        self.waker.borrow_mut().take();
    }

    fn wake(&self) {
        let waker = self.waker.borrow().clone();
        if let Some(waker) = waker {
            waker();
        }
    }
}

impl Default for StdHostScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StdHostScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdHostScheduler")
            .field("callback_requested", &self.callback_requested.get())
            .field("timer_deadline", &self.timer_deadline.get())
            .finish()
    }
}

impl HostScheduler for StdHostScheduler {
    fn request_host_callback(&self) {
        self.callback_requested.set(true);
        self.wake();
    }

    fn request_host_timeout(&self, delay_ms: Time) {
        let delay = Duration::from_millis(delay_ms.max(0) as u64);
        self.timer_deadline.set(Some(Instant::now() + delay));
    }

    fn cancel_host_timeout(&self) {
        self.timer_deadline.set(None);
    }
}

/// Convenience container bundling the scheduler with the std clock and host.
#[derive(Clone)]
pub struct StdRuntime {
    clock: Rc<StdClock>,
    host: Rc<StdHostScheduler>,
    scheduler: Scheduler,
}

impl StdRuntime {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        let clock = Rc::new(StdClock::new());
        let host = Rc::new(StdHostScheduler::new());
        let scheduler = Scheduler::with_config(clock.clone(), host.clone(), config);
        Self {
            clock,
            host,
            scheduler,
        }
    }

    /// Returns the scheduler handle to pass to roots.
    pub fn scheduler(&self) -> Scheduler {
        self.scheduler.clone()
    }

    pub fn clock(&self) -> Rc<StdClock> {
        Rc::clone(&self.clock)
    }

    pub fn host_scheduler(&self) -> Rc<StdHostScheduler> {
        Rc::clone(&self.host)
    }

    /// Runs one pending macrotask, or the timer if it is due. Returns `false`
    /// when neither was ready.
    pub fn run_pending(&self) -> bool {
        if self.host.take_callback_request() {
            self.scheduler.perform_work_until_deadline();
            return true;
        }
        match self.host.timer_deadline() {
            Some(deadline) if deadline <= Instant::now() => {
                self.host.timer_deadline.set(None);
                self.scheduler.handle_timeout();
                true
            }
            _ => false,
        }
    }

    /// Services macrotasks and timers until the scheduler has nothing left,
    /// sleeping the thread while only a future timer remains. Returns the
    /// number of host callbacks delivered.
    pub fn run_until_idle(&self) -> usize {
        let mut delivered = 0;
        loop {
            if self.run_pending() {
                delivered += 1;
                continue;
            }
            let Some(deadline) = self.host.timer_deadline() else {
                break;
            };
            let wait = deadline.saturating_duration_since(Instant::now());
            log::trace!("idle until next timer in {wait:?}");
            std::thread::sleep(wait);
        }
        delivered
    }
}

impl fmt::Debug for StdRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdRuntime")
            .field("clock", &self.clock)
            .field("host", &self.host)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl Default for StdRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "tests/std_runtime_tests.rs"]
mod tests;
