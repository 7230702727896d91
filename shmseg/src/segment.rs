//! Owned handle to one named shared memory segment.

use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use crate::config::{InitStrategy, ShmOptions};
use crate::error::{Result, ShmError};
use crate::map::ShmMap;
use crate::shmem;
use crate::trace::{debug, warn};

/// Attempts at finding an unused random name in [`ShmSegment::create`].
const RANDOM_NAME_ATTEMPTS: usize = 16;

/// A descriptor for a named shared memory object, plus its name.
///
/// Dropping the segment closes the descriptor. The name is left in the
/// namespace unless [`unlink_on_drop`](Self::unlink_on_drop) is set or
/// [`unlink`](Self::unlink) is called.
///
/// # Example
///
/// ```no_run
/// use shmseg::ShmSegment;
///
/// // Process A
/// let seg = ShmSegment::create_or_open("/frames", 1 << 20)?;
/// let map = seg.map()?;
///
/// // Process B attaches; its requested size is ignored.
/// let other = ShmSegment::create_or_open("/frames", 1)?;
/// assert_eq!(other.size(), 1 << 20);
/// # Ok::<(), shmseg::ShmError>(())
/// ```
#[derive(Debug)]
pub struct ShmSegment {
    fd: OwnedFd,
    name: String,
    size: u64,
    created: bool,
    unlink_on_drop: bool,
}

impl ShmSegment {
    /// Creates or attaches to `name` with default options.
    ///
    /// See [`shmem::create_or_open`] for the sizing rules and errors.
    pub fn create_or_open(name: &str, size: u64) -> Result<Self> {
        Self::create_or_open_with(name, size, &ShmOptions::default())
    }

    /// Creates or attaches to `name` with explicit options.
    pub fn create_or_open_with(name: &str, size: u64, opts: &ShmOptions) -> Result<Self> {
        let opened = shmem::open_segment(name, size, opts)?;
        Ok(Self {
            fd: opened.fd,
            name: name.to_string(),
            size: opened.size,
            created: opened.created,
            unlink_on_drop: false,
        })
    }

    /// Creates a brand new segment under a random name.
    ///
    /// The segment unlinks its name on drop. Names already taken are skipped.
    ///
    /// # Errors
    ///
    /// Anything [`shmem::create_or_open`] returns, or [`ShmError::Open`]
    /// with `EEXIST` if every candidate name was taken.
    pub fn create(size: u64) -> Result<Self> {
        let opts = ShmOptions::default().strategy(InitStrategy::ExclusiveCreate);
        let mut name = shmem::random_name();

        for _ in 0..RANDOM_NAME_ATTEMPTS {
            match Self::create_or_open_with(&name, size, &opts) {
                Ok(mut seg) if seg.created => {
                    seg.unlink_on_drop = true;
                    return Ok(seg);
                }
                Ok(_) | Err(ShmError::Unsized { .. }) => {}
                Err(err) => return Err(err),
            }
            debug!(shm = %name, "random name already taken, retrying");
            name = shmem::random_name();
        }

        Err(ShmError::Open {
            name,
            source: rustix::io::Errno::EXIST,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size in bytes observed when the segment was opened. See
    /// [`query_size`](Self::query_size) for the current size.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Whether this handle sized the object (as opposed to attaching).
    pub fn created(&self) -> bool {
        self.created
    }

    /// Asks the kernel for the object's current size.
    pub fn query_size(&self) -> Result<u64> {
        shmem::query_size(&self.fd)
    }

    /// Whether dropping this handle also unlinks the name.
    pub fn unlink_on_drop(&mut self, unlink: bool) {
        self.unlink_on_drop = unlink;
    }

    /// Maps the whole segment read/write, at its current size.
    ///
    /// # Errors
    ///
    /// [`ShmError::Stat`] if the size cannot be queried,
    /// [`ShmError::InvalidSize`] if the object is zero bytes, [`ShmError::Map`]
    /// otherwise.
    pub fn map(&self) -> Result<ShmMap> {
        let size = self.query_size()?;
        let len = usize::try_from(size).map_err(|_| ShmError::Map {
            name: self.name.clone(),
            len: usize::MAX,
            source: rustix::io::Errno::OVERFLOW,
        })?;
        ShmMap::map_named(&self.fd, len, &self.name)
    }

    /// Closes the descriptor, then removes the name from the namespace.
    ///
    /// # Errors
    ///
    /// [`ShmError::Unlink`] if the name is already gone.
    pub fn unlink(mut self) -> Result<()> {
        self.unlink_on_drop = false;
        let name = std::mem::take(&mut self.name);
        drop(self);
        shmem::unlink(&name)
    }
}

impl AsFd for ShmSegment {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl Drop for ShmSegment {
    fn drop(&mut self) {
        if self.unlink_on_drop && shmem::unlink(&self.name).is_err() {
            warn!(shm = %self.name, "segment was unlinked elsewhere before drop");
        }
    }
}
