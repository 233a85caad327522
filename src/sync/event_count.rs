use crate::futex::{DefaultFutex, Futex, FutexBackend, MASK_ALL, WAKE_ALL};
use core::fmt;
use core::marker::PhantomData;
use core::sync::atomic::AtomicU64;
use core::sync::atomic::Ordering::{AcqRel, Acquire};

// The packed word holds the epoch in its upper half and the number of
// registered waiters in its lower half. Adding ADD_EPOCH never carries into
// the waiter bits and the epoch simply wraps around, which is why epochs are
// only ever compared for equality.
const EPOCH_SHIFT: u32 = 32;
const ADD_WAITER: u64 = 1;
const ADD_EPOCH: u64 = 1 << EPOCH_SHIFT;
const WAITER_MASK: u64 = ADD_EPOCH - 1;

// Index of the 32-bit half holding the epoch, which is what the futex watches.
#[cfg(target_endian = "little")]
const EPOCH_WORD: usize = 1;
#[cfg(target_endian = "big")]
const EPOCH_WORD: usize = 0;

/// An event count: lets threads wait for an arbitrary condition on shared
/// state to become true, without a lock and without a lost-wakeup race.
///
/// The condition and the state it looks at are owned by the caller. The only
/// contract is that whoever makes the condition true must call [`notify`] or
/// [`notify_all`] afterwards, on the same event count the waiters use.
///
/// Waiting is a three step protocol, which [`await_condition`] wraps up:
///
/// 1. [`prepare_wait`] registers the thread and returns a [`Key`].
/// 2. The thread checks its condition again.
/// 3. If it holds, [`cancel_wait`] gives up the registration. Otherwise
///    [`wait`] blocks until a notification newer than the key arrives.
///
/// A notification that lands between the check and the block is never
/// missed: it changes the epoch captured in the key, so [`wait`] returns
/// immediately. Notifying costs no syscall while nobody is registered.
///
/// # Examples
///
/// ```
/// use event_count::sync::EventCount;
/// use std::collections::VecDeque;
/// use std::sync::{Arc, Mutex};
/// use std::thread;
///
/// let queue = Arc::new((Mutex::new(VecDeque::new()), EventCount::new()));
/// let queue2 = Arc::clone(&queue);
///
/// thread::spawn(move || {
///     let (items, event) = &*queue2;
///     items.lock().unwrap().push_back(42);
///     // The state changed, so waiters must hear about it.
///     event.notify();
/// });
///
/// let (items, event) = &*queue;
/// event.await_condition(|| !items.lock().unwrap().is_empty());
/// assert_eq!(items.lock().unwrap().pop_front(), Some(42));
/// ```
///
/// [`notify`]: Self::notify
/// [`notify_all`]: Self::notify_all
/// [`await_condition`]: Self::await_condition
/// [`prepare_wait`]: Self::prepare_wait
/// [`cancel_wait`]: Self::cancel_wait
/// [`wait`]: Self::wait
pub struct EventCount<F: FutexBackend = DefaultFutex> {
    val: AtomicU64,
    backend: PhantomData<fn() -> F>,
}

/// A registration returned by [`EventCount::prepare_wait`].
///
/// It remembers the epoch at the time of registration and must be handed back
/// to either [`EventCount::wait`] or [`EventCount::cancel_wait`]. Dropping it
/// is the same as cancelling, so a panicking or failing condition cannot leak
/// a registration.
#[must_use = "a Key must be passed to `wait` or `cancel_wait`"]
#[clippy::has_significant_drop]
pub struct Key<'a, F: FutexBackend = DefaultFutex> {
    event: &'a EventCount<F>,
    epoch: u32,
}

impl EventCount {
    /// Creates a new event count with no waiters, backed by [`DefaultFutex`].
    #[must_use]
    #[inline]
    pub const fn new() -> EventCount {
        EventCount::with_backend()
    }
}

impl<F: FutexBackend> EventCount<F> {
    /// Creates a new event count with no waiters, backed by `F`.
    ///
    /// ```
    /// use event_count::futex::DefaultFutex;
    /// use event_count::sync::EventCount;
    ///
    /// let event = EventCount::<DefaultFutex>::with_backend();
    /// event.notify();
    /// ```
    #[must_use]
    #[inline]
    pub const fn with_backend() -> EventCount<F> {
        EventCount { val: AtomicU64::new(0), backend: PhantomData }
    }

    /// Wakes up one thread blocked in [`wait`](Self::wait), if any.
    ///
    /// Call this after changing the state a waiter's condition depends on.
    #[inline]
    pub fn notify(&self) {
        self.do_notify(1);
    }

    /// Wakes up every thread blocked in [`wait`](Self::wait).
    #[inline]
    pub fn notify_all(&self) {
        self.do_notify(WAKE_ALL);
    }

    fn do_notify(&self, count: u32) {
        let prev = self.val.fetch_add(ADD_EPOCH, AcqRel);
        if prev & WAITER_MASK != 0 {
            let woken = F::wake(self.epoch_futex(), count, MASK_ALL);
            log::trace!(
                "event count {:p}: {} registered, woke {woken}",
                self,
                prev & WAITER_MASK
            );
        }
    }

    /// Registers the calling thread as a waiter.
    ///
    /// The returned key captures the current epoch. After calling this, check
    /// the condition once more, then pass the key to [`wait`] if it is still
    /// false or to [`cancel_wait`] if it has become true.
    ///
    /// [`wait`]: Self::wait
    /// [`cancel_wait`]: Self::cancel_wait
    #[inline]
    pub fn prepare_wait(&self) -> Key<'_, F> {
        let prev = self.val.fetch_add(ADD_WAITER, AcqRel);
        debug_assert_ne!(prev & WAITER_MASK, WAITER_MASK, "waiter count overflow");
        Key { event: self, epoch: (prev >> EPOCH_SHIFT) as u32 }
    }

    /// Gives up a registration without blocking.
    #[inline]
    pub fn cancel_wait(&self, key: Key<'_, F>) {
        debug_assert!(core::ptr::eq(key.event, self), "key belongs to another event count");
        drop(key);
    }

    /// Blocks until the event count is notified after `key` was taken.
    ///
    /// Returns immediately if that already happened. Spurious wakeups from
    /// the backend are absorbed here: only a change of epoch ends the wait.
    pub fn wait(&self, key: Key<'_, F>) {
        debug_assert!(core::ptr::eq(key.event, self), "key belongs to another event count");
        while self.epoch() == key.epoch {
            F::wait(self.epoch_futex(), key.epoch, MASK_ALL, None);
        }
        // Dropping the key unregisters the waiter.
        drop(key);
    }

    /// Blocks until `condition` returns `true`.
    ///
    /// `condition` is checked right away, without registering, and then again
    /// after every registration and every wakeup. If it panics, the pending
    /// registration is cancelled while unwinding.
    ///
    /// # Examples
    ///
    /// ```
    /// use event_count::sync::EventCount;
    /// use std::sync::atomic::{AtomicBool, Ordering};
    /// use std::sync::Arc;
    /// use std::thread;
    ///
    /// let pair = Arc::new((AtomicBool::new(false), EventCount::new()));
    /// let pair2 = Arc::clone(&pair);
    ///
    /// thread::spawn(move || {
    ///     let (ready, event) = &*pair2;
    ///     ready.store(true, Ordering::Release);
    ///     event.notify_all();
    /// });
    ///
    /// let (ready, event) = &*pair;
    /// event.await_condition(|| ready.load(Ordering::Acquire));
    /// ```
    pub fn await_condition<C>(&self, mut condition: C)
    where
        C: FnMut() -> bool,
    {
        if condition() {
            return;
        }

        loop {
            let key = self.prepare_wait();
            if condition() {
                self.cancel_wait(key);
                return;
            }
            self.wait(key);
        }
    }

    /// Blocks until `condition` returns `Ok(true)`, or returns the first error
    /// it produces.
    ///
    /// On error the pending registration is cancelled before the error is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns whatever error `condition` returns.
    ///
    /// # Examples
    ///
    /// ```
    /// use event_count::sync::EventCount;
    ///
    /// let event = EventCount::new();
    /// let result: Result<(), &str> = event.try_await_condition(|| Err("disconnected"));
    /// assert_eq!(result, Err("disconnected"));
    /// ```
    pub fn try_await_condition<C, E>(&self, mut condition: C) -> Result<(), E>
    where
        C: FnMut() -> Result<bool, E>,
    {
        if condition()? {
            return Ok(());
        }

        loop {
            let key = self.prepare_wait();
            if condition()? {
                self.cancel_wait(key);
                return Ok(());
            }
            self.wait(key);
        }
    }

    /// The number of threads currently registered, between
    /// [`prepare_wait`](Self::prepare_wait) and the end of
    /// [`wait`](Self::wait) or [`cancel_wait`](Self::cancel_wait).
    ///
    /// Other threads may change this at any moment.
    pub fn waiter_count(&self) -> u32 {
        (self.val.load(Acquire) & WAITER_MASK) as u32
    }

    fn epoch(&self) -> u32 {
        (self.val.load(Acquire) >> EPOCH_SHIFT) as u32
    }

    fn epoch_futex(&self) -> &Futex {
        // SAFETY: an AtomicU64 is 8-byte aligned and made of two 4-byte
        // halves, each of which is a valid, aligned AtomicU32 for as long as
        // `self` lives.
        unsafe { &*self.val.as_ptr().cast::<Futex>().add(EPOCH_WORD) }
    }

    fn unregister(&self) {
        let prev = self.val.fetch_sub(ADD_WAITER, AcqRel);
        debug_assert_ne!(prev & WAITER_MASK, 0, "waiter count underflow");
    }
}

impl<F: FutexBackend> Default for EventCount<F> {
    fn default() -> EventCount<F> {
        EventCount::with_backend()
    }
}

impl<F: FutexBackend> fmt::Debug for EventCount<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let val = self.val.load(Acquire);
        f.debug_struct("EventCount")
            .field("epoch", &(val >> EPOCH_SHIFT))
            .field("waiters", &(val & WAITER_MASK))
            .finish()
    }
}

impl<F: FutexBackend> Drop for Key<'_, F> {
    #[inline]
    fn drop(&mut self) {
        self.event.unregister();
    }
}

impl<F: FutexBackend> fmt::Debug for Key<'_, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key").field("epoch", &self.epoch).finish_non_exhaustive()
    }
}

#[cfg(test)]
impl<F: FutexBackend> EventCount<F> {
    pub(crate) fn raw(&self) -> u64 {
        self.val.load(Acquire)
    }

    pub(crate) fn with_raw(val: u64) -> EventCount<F> {
        EventCount { val: AtomicU64::new(val), backend: PhantomData }
    }
}

#[cfg(test)]
impl<F: FutexBackend> Key<'_, F> {
    pub(crate) fn epoch(&self) -> u32 {
        self.epoch
    }
}
