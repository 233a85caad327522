//! Lock-free thread wakeup.
//!
//! - [`EventCount`]: Lets any number of threads block until a condition
//!   over state they don't own becomes true, without a lock, without
//!   missing a notification that races with the check, and without a
//!   syscall on the notifying side while nobody waits.
//!
//! - [`Key`]: A waiter's registration with an [`EventCount`], consumed by
//!   [`EventCount::wait`] or [`EventCount::cancel_wait`].
//!
//! [`EventCount`]: EventCount
//! [`Key`]: Key

mod event_count;

pub use event_count::EventCount;
pub use event_count::Key;
