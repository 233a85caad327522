#[cfg(feature = "emulated")]
pub(crate) mod emulated;
#[cfg(target_os = "linux")]
pub(crate) mod futex;
pub(crate) mod timespec;
