use crate::futex::{Futex, FutexBackend, FutexDeadline, FutexResult};
use core::ptr::null;
use syscalls::{syscall, Errno, Sysno};

/// The Linux `futex(2)` syscall, made directly without libc.
///
/// Waits use `FUTEX_WAIT_BITSET`, which takes an absolute timeout and can be
/// told to measure it against `CLOCK_REALTIME` instead of `CLOCK_MONOTONIC`.
#[derive(Copy, Clone, Debug, Default)]
pub struct NativeFutex;

impl FutexBackend for NativeFutex {
    fn wait(
        futex: &Futex,
        expected: u32,
        wait_mask: u32,
        deadline: Option<&FutexDeadline>,
    ) -> FutexResult {
        debug_assert_ne!(wait_mask, 0, "FUTEX_WAIT_BITSET rejects an empty mask");

        #[cfg(feature = "not_process_private")]
        let mut op = nc::FUTEX_WAIT_BITSET;
        #[cfg(not(feature = "not_process_private"))]
        let mut op = nc::FUTEX_WAIT_BITSET | nc::FUTEX_PRIVATE_FLAG;
        // A timestamp that does not fit the kernel's time_t is so far away
        // that it is treated as no timeout at all.
        let timespec = match deadline {
            None => None,
            Some(FutexDeadline::Monotonic(t)) => t.timespec().to_timespec(),
            Some(FutexDeadline::Realtime(t)) => {
                op |= nc::FUTEX_CLOCK_REALTIME;
                t.timespec().to_timespec()
            }
        };

        let r = unsafe {
            syscall!(
                Sysno::futex,
                futex as *const Futex,
                op,
                expected,
                timespec.as_ref().map_or(null(), |t| t as *const nc::timespec_t),
                null::<u32>(), // This argument is unused for FUTEX_WAIT_BITSET.
                wait_mask
            )
        };

        match r {
            Ok(_) => FutexResult::Awoken,
            Err(Errno::ETIMEDOUT) => {
                debug_assert!(timespec.is_some());
                FutexResult::TimedOut
            }
            Err(Errno::EINTR) => FutexResult::Interrupted,
            Err(Errno::EAGAIN) => FutexResult::ValueChanged,
            Err(errno) => {
                // EINVAL, EACCES or EFAULT: a bad op, a bad timeout or a bad
                // address. Reported as a changed value, so the caller re-checks.
                log::warn!("futex wait on {futex:p} failed unexpectedly: {errno:?}");
                debug_assert!(false, "futex wait failed unexpectedly: {errno:?}");
                FutexResult::ValueChanged
            }
        }
    }

    fn wake(futex: &Futex, count: u32, wake_mask: u32) -> u32 {
        #[cfg(feature = "not_process_private")]
        let op = nc::FUTEX_WAKE_BITSET;
        #[cfg(not(feature = "not_process_private"))]
        let op = nc::FUTEX_WAKE_BITSET | nc::FUTEX_PRIVATE_FLAG;
        let r = unsafe {
            syscall!(
                Sysno::futex,
                futex as *const Futex,
                op,
                count.min(i32::MAX as u32),
                null::<nc::timespec_t>(), // This argument is unused for FUTEX_WAKE_BITSET.
                null::<u32>(),
                wake_mask
            )
        };

        // A primitive guarding its own destruction may wake on memory that is
        // already gone, so errors here are expected and not reported.
        match r {
            Ok(woken) => woken as u32,
            Err(errno) => {
                log::debug!("futex wake on {futex:p} failed, assuming no waiters: {errno:?}");
                0
            }
        }
    }
}
