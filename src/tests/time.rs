use core::cell::Cell;
use core::time::Duration;

use crate::time::{Clock, Deadline, MonotonicClock, RealtimeClock, TimePoint};

std::thread_local! {
    static NOW_CALLS: Cell<usize> = const { Cell::new(0) };
}

fn take_now_calls() -> usize {
    NOW_CALLS.with(|c| c.replace(0))
}

/// Reads 100s and counts how often it is read.
struct ClockA;

impl Clock for ClockA {
    const IS_STEADY: bool = true;

    fn now() -> TimePoint<Self> {
        NOW_CALLS.with(|c| c.set(c.get() + 1));
        TimePoint::after_epoch(Duration::from_secs(100)).unwrap()
    }
}

/// Reads 5s and counts how often it is read.
struct ClockB;

impl Clock for ClockB {
    const IS_STEADY: bool = true;

    fn now() -> TimePoint<Self> {
        NOW_CALLS.with(|c| c.set(c.get() + 1));
        TimePoint::after_epoch(Duration::from_secs(5)).unwrap()
    }
}

/// Sits at the very bottom of the representable range.
struct Bottom;

impl Clock for Bottom {
    const IS_STEADY: bool = false;

    fn now() -> TimePoint<Self> {
        TimePoint::from_parts(i64::MIN, 0).unwrap()
    }
}

fn secs<C>(s: u64) -> TimePoint<C> {
    TimePoint::after_epoch(Duration::from_secs(s)).unwrap()
}

#[test]
fn add_and_sub_carry_nanoseconds() {
    let t = TimePoint::<ClockA>::from_parts(1, 900_000_000).unwrap();

    let later = t.checked_add(Duration::from_millis(200)).unwrap();
    assert_eq!((later.secs(), later.subsec_nanos()), (2, 100_000_000));

    let earlier = t.checked_sub(Duration::from_millis(2_950)).unwrap();
    assert_eq!((earlier.secs(), earlier.subsec_nanos()), (-2, 950_000_000));
    assert!(earlier < TimePoint::EPOCH);
}

#[test]
fn arithmetic_overflow_is_none() {
    let top = TimePoint::<ClockA>::from_parts(i64::MAX, 999_999_999).unwrap();
    assert!(top.checked_add(Duration::from_nanos(1)).is_none());

    let bottom = TimePoint::<ClockA>::from_parts(i64::MIN, 0).unwrap();
    assert!(bottom.checked_sub(Duration::from_nanos(1)).is_none());
}

#[test]
fn duration_since_is_signed() {
    let a = TimePoint::<ClockA>::from_parts(3, 250_000_000).unwrap();
    let b = TimePoint::<ClockA>::from_parts(1, 500_000_000).unwrap();

    assert_eq!(a.duration_since(b), Ok(Duration::from_millis(1_750)));
    assert_eq!(b.duration_since(a), Err(Duration::from_millis(1_750)));
    assert_eq!(b.saturating_duration_since(a), Duration::ZERO);
}

#[test]
fn duration_since_across_whole_range() {
    let top = TimePoint::<ClockA>::from_parts(i64::MAX, 0).unwrap();
    let bottom = TimePoint::<ClockA>::from_parts(i64::MIN, 0).unwrap();
    assert_eq!(top.duration_since(bottom), Ok(Duration::from_secs(u64::MAX)));
}

#[test]
fn same_clock_conversion_is_a_cast() {
    take_now_calls();
    let t = secs::<ClockA>(42);

    assert_eq!(Deadline::At(t).convert::<ClockA>(), Deadline::At(t));
    assert_eq!(take_now_calls(), 0);
}

#[test]
fn never_stays_never() {
    take_now_calls();
    assert!(Deadline::<ClockA>::Never.convert::<ClockB>().is_never());
    assert_eq!(take_now_calls(), 0);
}

#[test]
fn conversion_keeps_time_left() {
    take_now_calls();

    // 30s left on A, so 30s past B's now.
    let converted = Deadline::At(secs::<ClockA>(130)).convert::<ClockB>();
    assert_eq!(converted, Deadline::At(secs(35)));
    assert_eq!(take_now_calls(), 2);

    // 10s overdue on A lands before B's epoch.
    let converted = Deadline::At(secs::<ClockA>(90)).convert::<ClockB>();
    assert_eq!(converted, Deadline::At(TimePoint::before_epoch(Duration::from_secs(5)).unwrap()));
}

#[test]
fn conversion_clamps_unrepresentable() {
    // Overdue by more than Bottom can go back: clamp to its epoch.
    let converted = Deadline::At(secs::<ClockA>(90)).convert::<Bottom>();
    assert_eq!(converted, Deadline::At(TimePoint::EPOCH));

    // Further ahead of Bottom's now than ClockB can represent: no deadline at all.
    let far = TimePoint::<Bottom>::from_parts(i64::MAX, 0).unwrap();
    let converted = Deadline::At(far).convert::<ClockB>();
    assert!(converted.is_never());
}

#[test]
fn deadline_after() {
    let d = Deadline::<ClockB>::after(Duration::from_secs(1));
    assert_eq!(d, Deadline::At(secs(6)));
    assert!(Deadline::<ClockB>::after(Duration::MAX).is_never());
}

#[test]
fn deadline_from_option() {
    let d: Deadline<ClockA> = Some(secs(1)).into();
    assert_eq!(d.time_point(), Some(secs(1)));

    let d = Deadline::from(None::<TimePoint<ClockA>>);
    assert!(d.is_never());
}

#[test]
fn system_clocks_advance() {
    let a = MonotonicClock::now();
    let b = MonotonicClock::now();
    assert!(b >= a);

    // Somewhere after 2020-01-01.
    assert!(RealtimeClock::now().secs() > 1_577_836_800);
}

#[test]
fn system_clock_conversion_round_trips() {
    let deadline = Deadline::<RealtimeClock>::after(Duration::from_secs(60));
    let Deadline::At(on_monotonic) = deadline.convert::<MonotonicClock>() else {
        panic!("deadline was lost");
    };

    let left = on_monotonic.saturating_duration_since(MonotonicClock::now());
    assert!(left > Duration::from_secs(59) && left <= Duration::from_secs(60));
}

#[cfg(target_os = "linux")]
#[test]
fn kernel_timespec_clamps_negative() {
    let t = TimePoint::<MonotonicClock>::before_epoch(Duration::from_millis(1_500)).unwrap();
    let ts = t.timespec().to_timespec().unwrap();
    assert_eq!((ts.tv_sec, ts.tv_nsec), (0, 0));

    let t = TimePoint::<MonotonicClock>::from_parts(7, 5).unwrap();
    let ts = t.timespec().to_timespec().unwrap();
    assert_eq!((ts.tv_sec, ts.tv_nsec), (7, 5));
}
