mod time;

use crate::futex::{DefaultFutex, Futex, FutexBackend, FutexDeadline, FutexResult};
use core::cell::Cell;
use core::sync::atomic::AtomicUsize;
use core::sync::atomic::Ordering::Relaxed;
use core::time::Duration;

std::thread_local! {
    static WAITS: Cell<usize> = const { Cell::new(0) };
    static WAKES: Cell<usize> = const { Cell::new(0) };
    static LAST_DEADLINE: Cell<Option<Option<FutexDeadline>>> = const { Cell::new(None) };
}

/// Forwards to [`DefaultFutex`] while counting the calls made on this thread.
pub(crate) struct RecordingFutex;

impl FutexBackend for RecordingFutex {
    fn wait(
        futex: &Futex,
        expected: u32,
        wait_mask: u32,
        deadline: Option<&FutexDeadline>,
    ) -> FutexResult {
        WAITS.with(|w| w.set(w.get() + 1));
        LAST_DEADLINE.with(|d| d.set(Some(deadline.copied())));
        DefaultFutex::wait(futex, expected, wait_mask, deadline)
    }

    fn wake(futex: &Futex, count: u32, wake_mask: u32) -> u32 {
        WAKES.with(|w| w.set(w.get() + 1));
        DefaultFutex::wake(futex, count, wake_mask)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Recorded {
    pub waits: usize,
    pub wakes: usize,
    /// `None` if no wait was made, otherwise the deadline of the last one.
    pub last_deadline: Option<Option<FutexDeadline>>,
}

/// Returns what the current thread sent to [`RecordingFutex`] and resets it.
pub(crate) fn take_recorded() -> Recorded {
    Recorded {
        waits: WAITS.with(|w| w.replace(0)),
        wakes: WAKES.with(|w| w.replace(0)),
        last_deadline: LAST_DEADLINE.with(|d| d.replace(None)),
    }
}

static SPURIOUS_RETURNS: AtomicUsize = AtomicUsize::new(0);

/// Never sleeps for real: every wait naps for a millisecond and then reports
/// a wakeup or a signal, whatever the futex holds.
pub(crate) struct SpuriousFutex;

impl FutexBackend for SpuriousFutex {
    fn wait(_: &Futex, _: u32, _: u32, _: Option<&FutexDeadline>) -> FutexResult {
        std::thread::sleep(Duration::from_millis(1));
        if SPURIOUS_RETURNS.fetch_add(1, Relaxed) % 2 == 0 {
            FutexResult::Awoken
        } else {
            FutexResult::Interrupted
        }
    }

    fn wake(_: &Futex, _: u32, _: u32) -> u32 {
        0
    }
}

/// How many times [`SpuriousFutex`] has returned, across all threads.
pub(crate) fn spurious_returns() -> usize {
    SPURIOUS_RETURNS.load(Relaxed)
}
