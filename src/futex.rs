//! Blocking on a 32-bit word until it changes.
//!
//! This is the layer the [`EventCount`](crate::sync::EventCount) is built on.
//! A [`FutexBackend`] can suspend a thread while a watched word still holds an
//! expected value, and wake threads suspended on that word. Which backend is
//! used by default depends on the target; see [`DefaultFutex`].
//!
//! If you don't know how to use a futex, you probably shouldn't be using this
//! module directly. The [`EventCount`](crate::sync::EventCount) takes care of
//! the lost-wakeup race for you.

use crate::time::{Clock, Deadline, MonotonicClock, RealtimeClock, TimePoint};
use core::sync::atomic::AtomicU32;
use core::time::Duration;

/// The atomic word threads block on.
pub type Futex = AtomicU32;

#[cfg(target_os = "linux")]
pub use crate::sys::futex::NativeFutex;
#[cfg(feature = "emulated")]
pub use crate::sys::emulated::EmulatedFutex;

/// The backend used when none is named explicitly: the futex syscall on Linux,
/// the emulated parking lot elsewhere or when the `emulated` feature is on.
#[cfg(all(target_os = "linux", not(feature = "emulated")))]
pub type DefaultFutex = NativeFutex;
/// The backend used when none is named explicitly: the futex syscall on Linux,
/// the emulated parking lot elsewhere or when the `emulated` feature is on.
#[cfg(feature = "emulated")]
pub type DefaultFutex = EmulatedFutex;

/// A mask matching every waiter, making a bitset wait or wake behave like a
/// plain one.
pub const MASK_ALL: u32 = !0;

/// The largest wake count the kernel accepts, meaning "wake everybody".
pub const WAKE_ALL: u32 = i32::MAX as u32;

/// Why a [`FutexBackend::wait`] returned.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FutexResult {
    /// The futex did not hold the expected value, so the thread never slept.
    ValueChanged,
    /// Woken by a matching wake, or spuriously. Callers must re-check their
    /// condition either way.
    Awoken,
    /// Woken by a signal delivered to the thread.
    Interrupted,
    /// The deadline elapsed. Only possible when a deadline was given.
    TimedOut,
}

/// A deadline in one of the two clock domains the backends understand.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FutexDeadline {
    /// Measured against `CLOCK_MONOTONIC`.
    Monotonic(TimePoint<MonotonicClock>),
    /// Measured against `CLOCK_REALTIME`, so it follows changes to the wall clock.
    Realtime(TimePoint<RealtimeClock>),
}

impl FutexDeadline {
    /// Moves an arbitrary deadline into the monotonic domain when its clock is
    /// steady, or into the realtime domain otherwise. Returns `None` for
    /// [`Deadline::Never`], or for a deadline that overflows on conversion.
    pub fn from_deadline<C: Clock>(deadline: Deadline<C>) -> Option<FutexDeadline> {
        if C::IS_STEADY {
            deadline.convert::<MonotonicClock>().time_point().map(FutexDeadline::Monotonic)
        } else {
            deadline.convert::<RealtimeClock>().time_point().map(FutexDeadline::Realtime)
        }
    }

    /// How long until the deadline elapses, zero if it already has.
    pub fn remaining(&self) -> Duration {
        match self {
            FutexDeadline::Monotonic(t) => t.saturating_duration_since(MonotonicClock::now()),
            FutexDeadline::Realtime(t) => t.saturating_duration_since(RealtimeClock::now()),
        }
    }
}

/// The capability to block on and wake a [`Futex`].
///
/// Implementations are stateless; everything they need is the address of the
/// futex. They must tolerate spurious wakeups on the waiting side and must
/// never fail on the waking side, since a wake may race with the destruction
/// of the memory holding the futex.
pub trait FutexBackend {
    /// Puts the thread to sleep while `futex` holds `expected`.
    ///
    /// Returns [`FutexResult::ValueChanged`] right away if `futex` no longer
    /// holds `expected`. Otherwise sleeps until woken by a [`wake`] whose mask
    /// intersects `wait_mask`, until `deadline` elapses, or until a signal
    /// arrives. `wait_mask` must not be zero.
    ///
    /// [`wake`]: Self::wake
    fn wait(
        futex: &Futex,
        expected: u32,
        wait_mask: u32,
        deadline: Option<&FutexDeadline>,
    ) -> FutexResult;

    /// Wakes up to `count` threads waiting on `futex` whose wait mask
    /// intersects `wake_mask`, returning how many were woken.
    ///
    /// Any failure is reported as zero threads woken.
    fn wake(futex: &Futex, count: u32, wake_mask: u32) -> u32;

    /// Like [`wait`](Self::wait), with a deadline on any clock.
    ///
    /// Steady clocks are waited on with the monotonic clock, all others with
    /// the realtime clock. [`Deadline::Never`] waits without a timeout.
    fn wait_until<C: Clock>(
        futex: &Futex,
        expected: u32,
        deadline: Deadline<C>,
        wait_mask: u32,
    ) -> FutexResult {
        match FutexDeadline::from_deadline(deadline) {
            Some(converted) => Self::wait(futex, expected, wait_mask, Some(&converted)),
            None => Self::wait(futex, expected, wait_mask, None),
        }
    }
}

/// Waits on `futex` with [`DefaultFutex`] and no deadline.
///
/// Never returns [`FutexResult::TimedOut`].
///
/// ```
/// use event_count::futex::{futex_wait, Futex, FutexResult, MASK_ALL};
///
/// let futex = Futex::new(1);
/// assert_eq!(futex_wait(&futex, 0, MASK_ALL), FutexResult::ValueChanged);
/// ```
pub fn futex_wait(futex: &Futex, expected: u32, wait_mask: u32) -> FutexResult {
    let result = DefaultFutex::wait(futex, expected, wait_mask, None);
    debug_assert_ne!(result, FutexResult::TimedOut);
    result
}

/// Waits on `futex` with [`DefaultFutex`] until `deadline`.
///
/// ```
/// use core::time::Duration;
/// use event_count::futex::{futex_wait_until, Futex, FutexResult, MASK_ALL};
/// use event_count::time::{Deadline, MonotonicClock};
///
/// let futex = Futex::new(0);
/// let deadline = Deadline::<MonotonicClock>::after(Duration::from_millis(1));
/// let result = futex_wait_until(&futex, 0, deadline, MASK_ALL);
/// assert!(matches!(result, FutexResult::TimedOut | FutexResult::Awoken | FutexResult::Interrupted));
/// ```
pub fn futex_wait_until<C: Clock>(
    futex: &Futex,
    expected: u32,
    deadline: Deadline<C>,
    wait_mask: u32,
) -> FutexResult {
    DefaultFutex::wait_until(futex, expected, deadline, wait_mask)
}

/// Wakes up to `count` waiters on `futex` with [`DefaultFutex`].
pub fn futex_wake(futex: &Futex, count: u32, wake_mask: u32) -> u32 {
    DefaultFutex::wake(futex, count, wake_mask)
}
