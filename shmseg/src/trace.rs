//! Diagnostics for shared memory operations.
//!
//! Every failing `shm_open`, `fstat`, `ftruncate`, `shm_unlink` or `mmap` is
//! logged at `error` with the object name and errno, so a process that only
//! checks for failure still leaves a readable reason on stderr. That is why
//! the `tracing` feature is on by default. Library users who report the
//! returned [`ShmError`](crate::ShmError) themselves can turn it off with
//! `default-features = false`, and the macros below then expand to nothing.

/// Installs the stderr subscriber.
///
/// Honors `RUST_LOG`; falls back to `shmseg=info`. Call once per process,
/// e.g. from `main` or a `Once` in tests.
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shmseg=info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(false)
                .with_line_number(false)
                .with_timer(fmt::time::uptime()),
        )
        .with(filter)
        .init();
}

#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() {}

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, error, info, warn};

#[cfg(not(feature = "tracing"))]
macro_rules! debug_noop {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! info_noop {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! warn_noop {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! error_noop {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use debug_noop as debug;
#[cfg(not(feature = "tracing"))]
pub(crate) use error_noop as error;
#[cfg(not(feature = "tracing"))]
pub(crate) use info_noop as info;
#[cfg(not(feature = "tracing"))]
pub(crate) use warn_noop as warn;
