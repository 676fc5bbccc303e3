//! Deterministic platform doubles for driving the scheduler in tests.

use std::cell::Cell;
use std::rc::Rc;

use crate::platform::{Clock, HostScheduler, Time};
use crate::scheduler::Scheduler;

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Time>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, millis: Time) {
        self.now.set(self.now.get() + millis);
    }

    pub fn set(&self, now: Time) {
        self.now.set(now);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Time {
        self.now.get()
    }
}

/// Records host callback and timer requests instead of arming anything.
#[derive(Debug, Default)]
pub struct TestHostScheduler {
    callback_requested: Cell<bool>,
    callback_requests: Cell<usize>,
    timeout: Cell<Option<Time>>,
}

impl TestHostScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_callback_request(&self) -> bool {
        self.callback_requested.replace(false)
    }

    pub fn has_callback_request(&self) -> bool {
        self.callback_requested.get()
    }

    pub fn callback_requests(&self) -> usize {
        self.callback_requests.get()
    }

    pub fn pending_timeout(&self) -> Option<Time> {
        self.timeout.get()
    }

    pub fn take_timeout(&self) -> Option<Time> {
        self.timeout.take()
    }
}

impl HostScheduler for TestHostScheduler {
    fn request_host_callback(&self) {
        self.callback_requested.set(true);
        self.callback_requests.set(self.callback_requests.get() + 1);
    }

    fn request_host_timeout(&self, delay_ms: Time) {
        self.timeout.set(Some(delay_ms));
    }

    fn cancel_host_timeout(&self) {
        self.timeout.set(None);
    }
}

/// Scheduler wired to a [`ManualClock`] and a [`TestHostScheduler`].
pub struct TestScheduler {
    pub clock: Rc<ManualClock>,
    pub host: Rc<TestHostScheduler>,
    pub scheduler: Scheduler,
}

impl Default for TestScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TestScheduler {
    pub fn new() -> Self {
        let clock = Rc::new(ManualClock::new());
        let host = Rc::new(TestHostScheduler::new());
        let scheduler = Scheduler::new(clock.clone(), host.clone());
        Self {
            clock,
            host,
            scheduler,
        }
    }

    /// Delivers one pending macrotask. Returns `false` if none was requested.
    pub fn run_macrotask(&self) -> bool {
        if !self.host.take_callback_request() {
            return false;
        }
        self.scheduler.perform_work_until_deadline();
        true
    }

    /// Delivers macrotasks until the host stops asking for them. Timers are
    /// left alone.
    pub fn flush(&self) -> usize {
        let mut slices = 0;
        while self.run_macrotask() {
            slices += 1;
        }
        slices
    }

    /// Jumps the clock to the pending timer, fires it, then flushes.
    pub fn fire_timer(&self) -> bool {
        let Some(delay) = self.host.take_timeout() else {
            return false;
        };
        self.clock.advance(delay.max(0));
        self.scheduler.handle_timeout();
        self.flush();
        true
    }

    /// Flushes ready work and fires timers until nothing is left.
    pub fn flush_all(&self) {
        self.flush();
        while self.fire_timer() {}
    }
}
