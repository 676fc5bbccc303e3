//! Platform abstraction traits for the scheduler.
//!
//! The scheduler never sleeps or spawns anything itself. It asks the host
//! platform to call back into it, either "as soon as possible but after other
//! queued host work" (a zero-delay macrotask) or after a delay (a timer).

/// Milliseconds on the scheduler's timeline.
///
/// Signed so that overdue expiration times (immediate priority) stay
/// representable below the current time.
pub type Time = i64;

/// Arms host callbacks on behalf of the [`Scheduler`](crate::Scheduler).
///
/// Implementations must deliver [`Scheduler::perform_work_until_deadline`]
/// for every `request_host_callback` and [`Scheduler::handle_timeout`] for
/// every timer that was not cancelled.
///
/// [`Scheduler::perform_work_until_deadline`]: crate::Scheduler::perform_work_until_deadline
/// [`Scheduler::handle_timeout`]: crate::Scheduler::handle_timeout
pub trait HostScheduler {
    /// Request a zero-delay macrotask. Must not be a clamped timer.
    fn request_host_callback(&self);

    /// Arm a timer that fires after `delay_ms`.
    fn request_host_timeout(&self, delay_ms: Time);

    /// Disarm the pending timer, if any.
    fn cancel_host_timeout(&self);
}

/// Provides timing information for the scheduler.
pub trait Clock {
    /// Milliseconds elapsed since an arbitrary, fixed origin.
    fn now(&self) -> Time;
}
