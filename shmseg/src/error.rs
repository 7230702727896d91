//! Error type shared by every shared memory operation.

use rustix::io::Errno;
use thiserror::Error;

/// Result alias for shared memory operations.
pub type Result<T> = std::result::Result<T, ShmError>;

/// Failure of one shared memory operation.
///
/// Each OS-backed variant names the object it was operating on and carries
/// the errno reported by the kernel.
#[derive(Debug, Error)]
pub enum ShmError {
    /// `shm_open` could not open or create the object.
    #[error("shm_open failed for `{name}`: {source}")]
    Open {
        name: String,
        #[source]
        source: Errno,
    },
    /// `fstat` could not report the object's size.
    #[error("fstat failed for `{name}`: {source}")]
    Stat {
        name: String,
        #[source]
        source: Errno,
    },
    /// `ftruncate` could not size the object. The descriptor has already
    /// been closed when this is returned.
    #[error("ftruncate to {size} bytes failed for `{name}`: {source}")]
    Resize {
        name: String,
        size: u64,
        #[source]
        source: Errno,
    },
    /// `shm_unlink` could not remove the name.
    #[error("shm_unlink failed for `{name}`: {source}")]
    Unlink {
        name: String,
        #[source]
        source: Errno,
    },
    /// `mmap` could not map the object.
    #[error("mmap of {len} bytes failed for `{name}`: {source}")]
    Map {
        name: String,
        len: usize,
        #[source]
        source: Errno,
    },
    /// The object exists but is still zero bytes, and the sizing strategy
    /// leaves resizing to its creator. Either the creator has not finished
    /// (retry) or its resize failed (unlink the name).
    #[error("`{name}` exists but has not been sized yet")]
    Unsized { name: String },
    /// A zero-byte size was requested; nothing was passed to the OS.
    #[error("invalid size {size} for `{name}`: must be greater than zero")]
    InvalidSize { name: String, size: u64 },
}

impl ShmError {
    /// The errno behind this error, if it came from the OS.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            ShmError::Open { source, .. }
            | ShmError::Stat { source, .. }
            | ShmError::Resize { source, .. }
            | ShmError::Unlink { source, .. }
            | ShmError::Map { source, .. } => Some(*source),
            ShmError::Unsized { .. } | ShmError::InvalidSize { .. } => None,
        }
    }

    /// Name of the shared memory object the failed operation targeted.
    pub fn name(&self) -> &str {
        match self {
            ShmError::Open { name, .. }
            | ShmError::Stat { name, .. }
            | ShmError::Resize { name, .. }
            | ShmError::Unlink { name, .. }
            | ShmError::Map { name, .. }
            | ShmError::Unsized { name }
            | ShmError::InvalidSize { name, .. } => name,
        }
    }
}
