/*!
An event count for Rust: a lock-free way for threads to sleep until a
condition over shared state becomes true, built on the Linux `futex`
syscall without the use of libc.

The [`sync::EventCount`] packs a notification epoch and a waiter count into
a single atomic word. Waiters register, re-check their condition and only
then block on the epoch, so a notification can never slip in unnoticed
between the check and the sleep. Notifiers bump the epoch and only make a
syscall when somebody is registered.

The [`futex`] module exposes the underlying wait/wake layer, including
bitset masks and absolute deadlines on any [`time::Clock`].

# Crate features

* **not_process_private** -
  Allows for sharing the futex words with other processes.
* **emulated** -
  Replaces the futex syscall with a user space parking lot
  (`parking_lot_core`). Required on targets other than Linux.
*/

#![no_std]

#[cfg(all(not(target_os = "linux"), not(feature = "emulated")))]
compile_error!("the futex syscall is only available on Linux; enable the `emulated` feature on other targets");

#[cfg(any(test, feature = "emulated"))]
extern crate std;

pub mod futex;
pub mod sync;
mod sys;
pub mod time;
#[cfg(test)]
mod tests;
