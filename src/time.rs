//! Clocks, time points and deadlines for bounded futex waits.
//!
//! The kernel only understands two clock domains: a monotonic clock and the
//! realtime (wall) clock. A [`Deadline`] can be expressed against any
//! [`Clock`], and is converted into one of those two domains right before it
//! reaches the backend.

use crate::sys::timespec::{ClockId, Timespec};
use core::any::TypeId;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::time::Duration;

/// A source of [`TimePoint`]s.
///
/// Implementors pick their own epoch; time points of different clocks are
/// never compared directly, only converted through [`Deadline::convert`].
pub trait Clock: Sized + 'static {
    /// Whether the clock never jumps backwards. Steady clocks are waited on
    /// with the kernel's monotonic clock, all others with the realtime clock.
    const IS_STEADY: bool;

    /// The current time according to this clock.
    fn now() -> TimePoint<Self>;
}

/// The system's monotonic clock (`CLOCK_MONOTONIC`).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    const IS_STEADY: bool = true;

    fn now() -> TimePoint<Self> {
        TimePoint::from_timespec(Timespec::now(ClockId::Monotonic))
    }
}

/// The system's wall clock (`CLOCK_REALTIME`), counted from the Unix epoch.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RealtimeClock;

impl Clock for RealtimeClock {
    const IS_STEADY: bool = false;

    fn now() -> TimePoint<Self> {
        TimePoint::from_timespec(Timespec::now(ClockId::Realtime))
    }
}

/// A point in time on the clock `C`, stored as a signed offset from the
/// clock's epoch.
pub struct TimePoint<C> {
    ts: Timespec,
    clock: PhantomData<fn() -> C>,
}

impl<C> TimePoint<C> {
    /// The clock's epoch itself.
    pub const EPOCH: TimePoint<C> = TimePoint::from_timespec(Timespec::ZERO);

    pub(crate) const fn from_timespec(ts: Timespec) -> TimePoint<C> {
        TimePoint { ts, clock: PhantomData }
    }

    pub(crate) const fn timespec(&self) -> Timespec {
        self.ts
    }

    /// Creates a time point from whole seconds and a sub-second nanosecond
    /// part. Returns `None` if `nanos` is not below one second.
    ///
    /// ```
    /// use event_count::time::{MonotonicClock, TimePoint};
    ///
    /// let t = TimePoint::<MonotonicClock>::from_parts(-2, 500_000_000).unwrap();
    /// assert!(t < TimePoint::EPOCH);
    /// assert!(TimePoint::<MonotonicClock>::from_parts(0, 1_000_000_000).is_none());
    /// ```
    pub const fn from_parts(secs: i64, nanos: u32) -> Option<TimePoint<C>> {
        match Timespec::try_new(secs, nanos) {
            Some(ts) => Some(TimePoint::from_timespec(ts)),
            None => None,
        }
    }

    /// The time point `since` after the epoch, or `None` on overflow.
    pub fn after_epoch(since: Duration) -> Option<TimePoint<C>> {
        Self::EPOCH.checked_add(since)
    }

    /// The time point `before` ahead of the epoch, or `None` on overflow.
    pub fn before_epoch(before: Duration) -> Option<TimePoint<C>> {
        Self::EPOCH.checked_sub(before)
    }

    /// Whole seconds since the epoch, rounded towards negative infinity.
    pub const fn secs(&self) -> i64 {
        self.ts.secs()
    }

    /// Nanoseconds past [`secs`](Self::secs), always below one second.
    pub const fn subsec_nanos(&self) -> u32 {
        self.ts.subsec_nanos()
    }

    pub fn checked_add(&self, duration: Duration) -> Option<TimePoint<C>> {
        self.ts.checked_add_duration(&duration).map(TimePoint::from_timespec)
    }

    pub fn checked_sub(&self, duration: Duration) -> Option<TimePoint<C>> {
        self.ts.checked_sub_duration(&duration).map(TimePoint::from_timespec)
    }

    /// Returns `Ok(self - earlier)`, or `Err(earlier - self)` if `earlier`
    /// is actually later than `self`.
    pub fn duration_since(&self, earlier: TimePoint<C>) -> Result<Duration, Duration> {
        self.ts.sub_timespec(&earlier.ts)
    }

    /// Like [`duration_since`](Self::duration_since), but zero when
    /// `earlier` is later than `self`.
    pub fn saturating_duration_since(&self, earlier: TimePoint<C>) -> Duration {
        self.duration_since(earlier).unwrap_or(Duration::ZERO)
    }

    /// Reinterprets the offset from the epoch as belonging to another clock.
    fn cast<T>(self) -> TimePoint<T> {
        TimePoint::from_timespec(self.ts)
    }
}

impl<C: Clock> TimePoint<C> {
    /// The current time on `C`.
    pub fn now() -> TimePoint<C> {
        C::now()
    }
}

impl<C> Clone for TimePoint<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for TimePoint<C> {}

impl<C> PartialEq for TimePoint<C> {
    fn eq(&self, other: &Self) -> bool {
        self.ts == other.ts
    }
}

impl<C> Eq for TimePoint<C> {}

impl<C> PartialOrd for TimePoint<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<C> Ord for TimePoint<C> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ts.cmp(&other.ts)
    }
}

impl<C> Hash for TimePoint<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ts.hash(state);
    }
}

impl<C> fmt::Debug for TimePoint<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimePoint")
            .field("secs", &self.ts.secs())
            .field("nanos", &self.ts.subsec_nanos())
            .finish()
    }
}

/// An absolute deadline on the clock `C`, or no deadline at all.
pub enum Deadline<C> {
    /// Stop waiting once `C` reaches this time point.
    At(TimePoint<C>),
    /// Wait without a time limit.
    Never,
}

impl<C> Deadline<C> {
    /// The time point of the deadline, or `None` for [`Deadline::Never`].
    pub fn time_point(&self) -> Option<TimePoint<C>> {
        match self {
            Deadline::At(t) => Some(*t),
            Deadline::Never => None,
        }
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Deadline::Never)
    }
}

impl<C: Clock> Deadline<C> {
    /// A deadline `timeout` from now on `C`. A timeout too large to be
    /// represented becomes [`Deadline::Never`].
    ///
    /// ```
    /// use core::time::Duration;
    /// use event_count::time::{Deadline, MonotonicClock};
    ///
    /// assert!(!Deadline::<MonotonicClock>::after(Duration::from_millis(10)).is_never());
    /// assert!(Deadline::<MonotonicClock>::after(Duration::MAX).is_never());
    /// ```
    pub fn after(timeout: Duration) -> Deadline<C> {
        match C::now().checked_add(timeout) {
            Some(t) => Deadline::At(t),
            None => Deadline::Never,
        }
    }

    /// Re-expresses this deadline on the clock `T`.
    ///
    /// When `T` is `C` this is a pure cast. Otherwise the time left until the
    /// deadline is measured on `C` and re-applied to `T::now()`, so both
    /// clocks are read once. Deadlines too far in the future to be
    /// represented on `T` become [`Deadline::Never`]; deadlines too far in the
    /// past become `T`'s epoch.
    pub fn convert<T: Clock>(self) -> Deadline<T> {
        let deadline = match self {
            Deadline::At(t) => t,
            Deadline::Never => return Deadline::Never,
        };

        if TypeId::of::<C>() == TypeId::of::<T>() {
            return Deadline::At(deadline.cast());
        }

        let converted = match deadline.duration_since(C::now()) {
            Ok(remaining) => T::now().checked_add(remaining),
            Err(overdue) => Some(T::now().checked_sub(overdue).unwrap_or(TimePoint::EPOCH)),
        };
        match converted {
            Some(t) => Deadline::At(t),
            None => Deadline::Never,
        }
    }
}

impl<C> Clone for Deadline<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Deadline<C> {}

impl<C> PartialEq for Deadline<C> {
    fn eq(&self, other: &Self) -> bool {
        self.time_point() == other.time_point()
    }
}

impl<C> Eq for Deadline<C> {}

impl<C> fmt::Debug for Deadline<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deadline::At(t) => f.debug_tuple("At").field(t).finish(),
            Deadline::Never => f.write_str("Never"),
        }
    }
}

impl<C> From<TimePoint<C>> for Deadline<C> {
    fn from(t: TimePoint<C>) -> Self {
        Deadline::At(t)
    }
}

impl<C> From<Option<TimePoint<C>>> for Deadline<C> {
    fn from(t: Option<TimePoint<C>>) -> Self {
        t.map_or(Deadline::Never, Deadline::At)
    }
}
