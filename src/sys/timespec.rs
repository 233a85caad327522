use core::time::Duration;
#[cfg(target_os = "linux")]
use nc::timespec_t;

const NSEC_PER_SEC: u64 = 1_000_000_000;

/// The clocks a futex deadline can be measured against.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ClockId {
    Monotonic,
    Realtime,
}

/// A normalized signed timestamp: `tv_nsec` is always below one second, so
/// `-1.5s` is stored as `(-2, 500_000_000)` and the derived ordering holds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Timespec {
    tv_sec: i64,
    tv_nsec: u32,
}

impl Timespec {
    pub const ZERO: Timespec = Timespec { tv_sec: 0, tv_nsec: 0 };
    #[cfg(not(target_os = "linux"))]
    pub const MIN: Timespec = Timespec { tv_sec: i64::MIN, tv_nsec: 0 };
    #[cfg(not(target_os = "linux"))]
    pub const MAX: Timespec = Timespec { tv_sec: i64::MAX, tv_nsec: NSEC_PER_SEC as u32 - 1 };

    pub const fn try_new(tv_sec: i64, tv_nsec: u32) -> Option<Timespec> {
        if (tv_nsec as u64) < NSEC_PER_SEC {
            Some(Timespec { tv_sec, tv_nsec })
        } else {
            None
        }
    }

    #[cfg(target_os = "linux")]
    const fn new(tv_sec: i64, tv_nsec: u32) -> Timespec {
        match Self::try_new(tv_sec, tv_nsec) {
            Some(t) => t,
            None => panic!("invalid timestamp"),
        }
    }

    pub const fn secs(&self) -> i64 {
        self.tv_sec
    }

    pub const fn subsec_nanos(&self) -> u32 {
        self.tv_nsec
    }

    #[cfg(target_os = "linux")]
    pub fn now(clock: ClockId) -> Timespec {
        let id = match clock {
            ClockId::Monotonic => nc::CLOCK_MONOTONIC,
            ClockId::Realtime => nc::CLOCK_REALTIME,
        };

        let mut t = timespec_t { tv_sec: 0, tv_nsec: 0 };
        if let Err(errno) = unsafe { nc::clock_gettime(id, &mut t) } {
            // Both clock ids are always supported, so this is a broken kernel or seccomp filter.
            panic!("clock_gettime({clock:?}) failed with errno {errno}");
        }
        Timespec::new(t.tv_sec as i64, t.tv_nsec as u32)
    }

    #[cfg(not(target_os = "linux"))]
    pub fn now(clock: ClockId) -> Timespec {
        use std::sync::OnceLock;
        use std::time::{Instant, SystemTime};

        match clock {
            ClockId::Monotonic => {
                // std::time::Instant has no observable epoch, so anchor one at first use.
                static ANCHOR: OnceLock<Instant> = OnceLock::new();
                let elapsed = ANCHOR.get_or_init(Instant::now).elapsed();
                Timespec::ZERO.checked_add_duration(&elapsed).unwrap_or(Timespec::MAX)
            }
            ClockId::Realtime => match SystemTime::now().duration_since(SystemTime::UNIX_EPOCH) {
                Ok(since) => Timespec::ZERO.checked_add_duration(&since).unwrap_or(Timespec::MAX),
                Err(e) => Timespec::ZERO.checked_sub_duration(&e.duration()).unwrap_or(Timespec::MIN),
            },
        }
    }

    pub fn checked_add_duration(&self, other: &Duration) -> Option<Timespec> {
        let mut secs = self.tv_sec.checked_add_unsigned(other.as_secs())?;

        // Nano calculations can't overflow because nanos are <1B which fit
        // in a u32.
        let mut nsec = other.subsec_nanos() + self.tv_nsec;
        if nsec >= NSEC_PER_SEC as u32 {
            nsec -= NSEC_PER_SEC as u32;
            secs = secs.checked_add(1)?;
        }
        Some(Timespec { tv_sec: secs, tv_nsec: nsec })
    }

    pub fn checked_sub_duration(&self, other: &Duration) -> Option<Timespec> {
        let mut secs = self.tv_sec.checked_sub_unsigned(other.as_secs())?;

        let nsec = if self.tv_nsec >= other.subsec_nanos() {
            self.tv_nsec - other.subsec_nanos()
        } else {
            secs = secs.checked_sub(1)?;
            self.tv_nsec + NSEC_PER_SEC as u32 - other.subsec_nanos()
        };
        Some(Timespec { tv_sec: secs, tv_nsec: nsec })
    }

    /// Returns `Ok(self - other)` when `self` is not earlier than `other`,
    /// otherwise `Err(other - self)`.
    pub fn sub_timespec(&self, other: &Timespec) -> Result<Duration, Duration> {
        if self >= other {
            // The true difference always fits in a u64 even when the i64
            // subtraction would overflow, hence the wrapping arithmetic.
            let (secs, nsec) = if self.tv_nsec >= other.tv_nsec {
                (self.tv_sec.wrapping_sub(other.tv_sec) as u64, self.tv_nsec - other.tv_nsec)
            } else {
                (
                    self.tv_sec.wrapping_sub(other.tv_sec).wrapping_sub(1) as u64,
                    self.tv_nsec + NSEC_PER_SEC as u32 - other.tv_nsec,
                )
            };
            Ok(Duration::new(secs, nsec))
        } else {
            match other.sub_timespec(self) {
                Ok(d) => Err(d),
                Err(d) => Ok(d),
            }
        }
    }

    /// Converts to the kernel representation, clamping instants before the
    /// clock's epoch to zero since the kernel rejects negative timeouts.
    #[cfg(target_os = "linux")]
    pub fn to_timespec(&self) -> Option<timespec_t> {
        let t = if self.tv_sec < 0 { Timespec::ZERO } else { *self };
        Some(timespec_t {
            tv_sec: t.tv_sec.try_into().ok()?,
            tv_nsec: t.tv_nsec.try_into().ok()?,
        })
    }
}
