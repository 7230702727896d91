//! Named POSIX shared memory objects: create-or-attach, size, unlink.
//!
//! Thin, stateless wrappers over `shm_open`, `fstat`, `ftruncate` and
//! `shm_unlink`. Nothing is cached in-process; every call asks the kernel.
//!
//! # Lifecycle
//!
//! ```text
//!  create_or_open("/x", n)          create_or_open("/x", m)
//!  ┌─────────────────────┐          ┌─────────────────────┐
//!  │ shm_open(O_CREAT)   │          │ shm_open(O_CREAT)   │
//!  │ fstat -> 0 bytes    │          │ fstat -> n bytes    │
//!  │ ftruncate(n)        │          │ (size kept, m lost) │
//!  └─────────┬───────────┘          └─────────┬───────────┘
//!            │ OwnedFd                        │ OwnedFd
//!            ▼                                ▼
//!        caller maps / closes            caller maps / closes
//!
//!  unlink("/x")  removes the name; open descriptors and mappings stay valid
//!                until their holders drop them.
//! ```
//!
//! The first process to find the object at zero bytes sizes it; later
//! openers inherit that size whatever they ask for.
//!
//! # Example
//!
//! ```no_run
//! use shmseg::shmem;
//!
//! let fd = shmem::create_or_open("/my-segment", 4096)?;
//! assert_eq!(shmem::query_size(&fd)?, 4096);
//! drop(fd);
//! shmem::unlink("/my-segment")?;
//! # Ok::<(), shmseg::ShmError>(())
//! ```
//!
//! # Races
//!
//! With [`InitStrategy::CheckThenResize`] the `fstat` → `ftruncate` pair is not
//! atomic: two processes can both see zero bytes and both resize. Processes
//! that need a single initializer should use
//! [`InitStrategy::ExclusiveCreate`] or their own named lock.

use std::fmt::Write as _;
use std::os::fd::{AsFd, AsRawFd, OwnedFd};

use rustix::fs::{Mode, fstat, ftruncate};
use rustix::io::Errno;
use rustix::shm;

use crate::config::{InitStrategy, ShmOptions};
use crate::error::{Result, ShmError};
use crate::trace::{debug, error, info};

/// Prefix of names produced by [`random_name`].
pub const RANDOM_NAME_PREFIX: &str = "/psm_";

/// Longest name accepted everywhere; FreeBSD caps names at 14 characters.
pub const SAFE_NAME_LENGTH: usize = 14;

const RANDOM_NAME_BYTES: usize = (SAFE_NAME_LENGTH - RANDOM_NAME_PREFIX.len()) / 2;

/// Result of a successful open, with what the caller needs to know about it.
#[derive(Debug)]
pub(crate) struct Opened {
    pub(crate) fd: OwnedFd,
    /// Size of the object after this call.
    pub(crate) size: u64,
    /// Whether this call performed the resize.
    pub(crate) created: bool,
}

/// Returns the current size in bytes of the object behind `fd`.
///
/// # Errors
///
/// [`ShmError::Stat`] if `fstat` fails (closed descriptor, `EBADF`, ...).
pub fn query_size<Fd: AsFd>(fd: Fd) -> Result<u64> {
    let fd = fd.as_fd();
    stat_size(fd, &format!("fd {}", fd.as_raw_fd()))
}

fn stat_size<Fd: AsFd>(fd: Fd, name: &str) -> Result<u64> {
    let stat = fstat(fd).map_err(|source| {
        error!(shm = name, error = %source, "fstat failed");
        ShmError::Stat {
            name: name.to_string(),
            source,
        }
    })?;

    u64::try_from(stat.st_size).map_err(|_| {
        error!(shm = name, st_size = stat.st_size, "fstat reported a negative size");
        ShmError::Stat {
            name: name.to_string(),
            source: Errno::OVERFLOW,
        }
    })
}

/// Opens `name`, creating it with mode `0666` if missing, and sizes it to
/// `size` bytes unless it already has a non-zero size.
///
/// The returned descriptor is read/write and owned by the caller; dropping
/// it closes it. Mapping it is up to the caller (see [`crate::ShmMap`]).
///
/// # Errors
///
/// - [`ShmError::InvalidSize`] if `size` is zero. No OS call is made.
/// - [`ShmError::Open`] if `shm_open` fails (bad name, `EACCES`, `EMFILE`, ...).
/// - [`ShmError::Stat`] if the freshly opened object cannot be inspected.
/// - [`ShmError::Resize`] if `ftruncate` fails, including sizes above
///   `i64::MAX`. The descriptor is closed before returning.
/// - [`ShmError::Unsized`] only under [`InitStrategy::ExclusiveCreate`], when
///   the object exists at zero bytes.
pub fn create_or_open(name: &str, size: u64) -> Result<OwnedFd> {
    create_or_open_with(name, size, &ShmOptions::default())
}

/// [`create_or_open`] with explicit creation mode and sizing strategy.
///
/// # Errors
///
/// Same as [`create_or_open`].
pub fn create_or_open_with(name: &str, size: u64, opts: &ShmOptions) -> Result<OwnedFd> {
    open_segment(name, size, opts).map(|opened| opened.fd)
}

pub(crate) fn open_segment(name: &str, size: u64, opts: &ShmOptions) -> Result<Opened> {
    if size == 0 {
        error!(shm = name, "refusing to create a zero-sized segment");
        return Err(ShmError::InvalidSize {
            name: name.to_string(),
            size,
        });
    }

    let (fd, won_create) = match opts.strategy {
        InitStrategy::CheckThenResize => (
            open_raw(name, shm::OFlags::CREATE | shm::OFlags::RDWR, opts.mode)?,
            false,
        ),
        InitStrategy::ExclusiveCreate => match shm::open(
            name,
            shm::OFlags::CREATE | shm::OFlags::EXCL | shm::OFlags::RDWR,
            opts.mode,
        ) {
            Ok(fd) => (fd, true),
            Err(err) if err == Errno::EXIST => {
                debug!(shm = name, "segment exists, attaching");
                (open_raw(name, shm::OFlags::RDWR, Mode::empty())?, false)
            }
            Err(source) => return Err(open_failed(name, source)),
        },
    };

    let current = stat_size(&fd, name)?;

    let should_resize = match opts.strategy {
        InitStrategy::CheckThenResize => current == 0,
        InitStrategy::ExclusiveCreate => won_create,
    };

    if !should_resize {
        if current == 0 {
            debug!(shm = name, "segment exists but is not sized yet");
            return Err(ShmError::Unsized {
                name: name.to_string(),
            });
        }
        debug!(shm = name, size = current, requested = size, "attached to existing segment");
        return Ok(Opened {
            fd,
            size: current,
            created: false,
        });
    }

    if let Err(source) = ftruncate(&fd, size) {
        drop(fd);
        error!(shm = name, size, error = %source, "ftruncate failed");
        return Err(ShmError::Resize {
            name: name.to_string(),
            size,
            source,
        });
    }

    info!(shm = name, size, mode = ?opts.mode, "created segment");
    Ok(Opened {
        fd,
        size,
        created: true,
    })
}

fn open_raw(name: &str, flags: shm::OFlags, mode: Mode) -> Result<OwnedFd> {
    shm::open(name, flags, mode).map_err(|source| open_failed(name, source))
}

fn open_failed(name: &str, source: Errno) -> ShmError {
    error!(shm = name, error = %source, "shm_open failed");
    ShmError::Open {
        name: name.to_string(),
        source,
    }
}

/// Removes `name` from the shared memory namespace.
///
/// Descriptors and mappings already held by any process stay valid; the
/// kernel frees the memory once the last of them is gone. A later
/// [`create_or_open`] with the same name starts from scratch.
///
/// # Errors
///
/// [`ShmError::Unlink`] if the name does not exist (`ENOENT`) or the caller
/// lacks permission.
pub fn unlink(name: &str) -> Result<()> {
    shm::unlink(name).map_err(|source| {
        error!(shm = name, error = %source, "shm_unlink failed");
        ShmError::Unlink {
            name: name.to_string(),
            source,
        }
    })?;
    debug!(shm = name, "unlinked segment");
    Ok(())
}

/// Generates a fresh name such as `/psm_1a2b3c4d`.
///
/// Short enough for every POSIX platform. Collisions are possible but
/// unlikely; [`crate::ShmSegment::create`] retries on them.
pub fn random_name() -> String {
    let bytes: [u8; RANDOM_NAME_BYTES] = rand::random();
    bytes
        .iter()
        .fold(String::from(RANDOM_NAME_PREFIX), |mut name, byte| {
            let _ = write!(name, "{byte:02x}");
            name
        })
}
