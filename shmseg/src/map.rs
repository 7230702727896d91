//! Read/write shared mappings of a segment descriptor.

use std::os::fd::{AsFd, AsRawFd};
use std::ptr::{NonNull, null_mut};

use rustix::mm::{MapFlags, ProtFlags, mmap, munmap};

use crate::error::{Result, ShmError};
use crate::trace::{debug, error, warn};

/// A `MAP_SHARED`, `PROT_READ | PROT_WRITE` mapping of a shared memory object.
///
/// Writes are visible to every process mapping the same object. The mapping
/// stays valid after the descriptor it was created from is closed and after
/// the object's name is unlinked; it is unmapped on drop.
///
/// The contents are shared with other processes that may write at any time,
/// so byte access goes through raw pointers or the `unsafe` slice views.
#[derive(Debug)]
pub struct ShmMap {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the mapping is process-wide, not tied to the creating thread.
unsafe impl Send for ShmMap {}

// SAFETY: &ShmMap only hands out raw pointers and unsafe views; callers of
// those take responsibility for synchronizing access.
unsafe impl Sync for ShmMap {}

impl ShmMap {
    /// Maps the first `len` bytes of the object behind `fd`.
    ///
    /// `len` should not exceed the object's size; touching pages past the end
    /// of the object raises `SIGBUS`.
    ///
    /// # Errors
    ///
    /// - [`ShmError::InvalidSize`] if `len` is zero.
    /// - [`ShmError::Map`] if `mmap` fails (e.g. descriptor not open for
    ///   writing, `ENOMEM`).
    pub fn new<Fd: AsFd>(fd: Fd, len: usize) -> Result<Self> {
        let fd = fd.as_fd();
        Self::map_named(fd, len, &format!("fd {}", fd.as_raw_fd()))
    }

    pub(crate) fn map_named<Fd: AsFd>(fd: Fd, len: usize, name: &str) -> Result<Self> {
        if len == 0 {
            error!(shm = name, "refusing to map zero bytes");
            return Err(ShmError::InvalidSize {
                name: name.to_string(),
                size: 0,
            });
        }

        // SAFETY: we request a fresh mapping chosen by the kernel (null hint,
        // no MAP_FIXED), so it cannot alias any existing Rust allocation.
        let ptr = unsafe {
            mmap(
                null_mut(),
                len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                fd,
                0,
            )
        }
        .map_err(|source| {
            error!(shm = name, len, error = %source, "mmap failed");
            ShmError::Map {
                name: name.to_string(),
                len,
                source,
            }
        })?;

        // mmap never returns null on success.
        let ptr = NonNull::new(ptr.cast::<u8>()).ok_or_else(|| ShmError::Map {
            name: name.to_string(),
            len,
            source: rustix::io::Errno::NOMEM,
        })?;

        debug!(shm = name, len, "mapped segment");
        Ok(Self { ptr, len })
    }

    /// Length of the mapping in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false: zero-length mappings are rejected at construction.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Views the mapping as bytes.
    ///
    /// # Safety
    ///
    /// No process may write to the mapped range while the slice is alive.
    pub unsafe fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr/len describe a live mapping; exclusivity is on the caller.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Views the mapping as mutable bytes.
    ///
    /// # Safety
    ///
    /// No other process or thread may access the mapped range while the
    /// slice is alive.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn as_mut_slice(&self) -> &mut [u8] {
        // SAFETY: ptr/len describe a live mapping; exclusivity is on the caller.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for ShmMap {
    fn drop(&mut self) {
        // `_err` is only read by `warn!`, a no-op without the `tracing` feature.
        // SAFETY: ptr/len are exactly what mmap returned and nothing else
        // unmaps them.
        if let Err(_err) = unsafe { munmap(self.ptr.as_ptr().cast(), self.len) } {
            warn!(len = self.len, error = %_err, "munmap failed");
        }
    }
}
