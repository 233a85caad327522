use crate::futex::{Futex, FutexBackend, FutexDeadline, FutexResult};
use core::sync::atomic::Ordering::Acquire;
use parking_lot_core::{DEFAULT_UNPARK_TOKEN, FilterOp, ParkResult, ParkToken};
use std::time::Instant;

/// A futex emulated in user space on top of `parking_lot_core`.
///
/// Parked threads live in a global hash table of buckets keyed by the futex
/// address, each bucket guarded by its own lock, so a wait re-checks the value
/// under the same lock a wake takes. The wait mask travels as the park token.
///
/// There are no signals to interrupt a parked thread, so this backend never
/// returns [`FutexResult::Interrupted`].
///
/// The value check is an ordinary 32-bit atomic load. When the futex is one
/// half of a wider atomic, as the epoch of an
/// [`EventCount`](crate::sync::EventCount) is, that load races with 64-bit
/// read-modify-writes on the same bytes. Rust's memory model does not define
/// such mixed-size races and Miri reports them, even though every target the
/// parking lot runs on performs them atomically. The native backend leaves
/// the load to the kernel and is not affected.
#[derive(Copy, Clone, Debug, Default)]
pub struct EmulatedFutex;

impl FutexBackend for EmulatedFutex {
    fn wait(
        futex: &Futex,
        expected: u32,
        wait_mask: u32,
        deadline: Option<&FutexDeadline>,
    ) -> FutexResult {
        debug_assert_ne!(wait_mask, 0, "a waiter with an empty mask can never be woken");

        // An instant too far away to represent means no timeout at all.
        let timeout = deadline.and_then(|d| Instant::now().checked_add(d.remaining()));

        let result = unsafe {
            parking_lot_core::park(
                futex as *const Futex as usize,
                || futex.load(Acquire) == expected,
                || {},
                |_, _| {},
                ParkToken(wait_mask as usize),
                timeout,
            )
        };

        match result {
            ParkResult::Unparked(_) => FutexResult::Awoken,
            ParkResult::Invalid => FutexResult::ValueChanged,
            ParkResult::TimedOut => FutexResult::TimedOut,
        }
    }

    fn wake(futex: &Futex, count: u32, wake_mask: u32) -> u32 {
        let mut remaining = count;
        let result = unsafe {
            parking_lot_core::unpark_filter(
                futex as *const Futex as usize,
                |ParkToken(wait_mask)| {
                    if remaining == 0 {
                        FilterOp::Stop
                    } else if wait_mask as u32 & wake_mask != 0 {
                        remaining -= 1;
                        FilterOp::Unpark
                    } else {
                        FilterOp::Skip
                    }
                },
                |_| DEFAULT_UNPARK_TOKEN,
            )
        };
        result.unparked_threads as u32
    }
}
