//! Logging shims.
//!
//! With the `log` feature these forward to the `log` crate. Without it, the
//! arguments are still type-checked but nothing is emitted.

#[cfg(feature = "log")]
macro_rules! info {
    ($($arg:tt)+) => { ::log::info!($($arg)+) };
}

#[cfg(not(feature = "log"))]
macro_rules! info {
    ($($arg:tt)+) => {
        if false {
            ::core::mem::drop(format_args!($($arg)+));
        }
    };
}

#[cfg(feature = "log")]
macro_rules! debug {
    ($($arg:tt)+) => { ::log::debug!($($arg)+) };
}

#[cfg(not(feature = "log"))]
macro_rules! debug {
    ($($arg:tt)+) => {
        if false {
            ::core::mem::drop(format_args!($($arg)+));
        }
    };
}

#[cfg(feature = "log")]
macro_rules! warn {
    ($($arg:tt)+) => { ::log::warn!($($arg)+) };
}

#[cfg(not(feature = "log"))]
macro_rules! warn {
    ($($arg:tt)+) => {
        if false {
            ::core::mem::drop(format_args!($($arg)+));
        }
    };
}
