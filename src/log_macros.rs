//! No-op shims for `log::trace!`/`log::debug!` when the `logging` feature
//! is disabled, so call sites elsewhere in the crate don't need to be
//! sprinkled with `#[cfg(feature = "logging")]`. Mirrors rustls's own
//! `log.rs`.

#[cfg(feature = "logging")]
macro_rules! trace (
    ($($arg:tt)+) => { log::trace!($($arg)+); }
);

#[cfg(not(feature = "logging"))]
macro_rules! trace (
    ($($arg:tt)+) => {}
);

#[cfg(feature = "logging")]
macro_rules! debug (
    ($($arg:tt)+) => { log::debug!($($arg)+); }
);

#[cfg(not(feature = "logging"))]
macro_rules! debug (
    ($($arg:tt)+) => {}
);
