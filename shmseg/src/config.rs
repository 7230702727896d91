//! Options controlling how a segment is created.

use rustix::fs::{Mode, RawMode};

/// Permission bits used when a segment is first created: `rw-rw-rw-`.
///
/// Any local user can read and write such a segment (the process umask is
/// still applied by the kernel). Use [`ShmOptions::mode`] to tighten it.
pub const DEFAULT_MODE: Mode = Mode::from_raw_mode(0o666);

/// How [`create_or_open_with`](crate::shmem::create_or_open_with) decides
/// whether it is the process responsible for sizing the segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InitStrategy {
    /// Open with `O_CREAT`, then size the object only if `fstat` reports
    /// zero bytes.
    ///
    /// Not atomic across processes: two processes can both observe zero and
    /// both resize, or one can map the object before the other has sized it.
    #[default]
    CheckThenResize,
    /// Open with `O_CREAT | O_EXCL`. Whoever wins the create sizes the
    /// object; everybody else gets `EEXIST` and attaches without resizing.
    ///
    /// Only one process ever resizes. An attacher that finds the object still
    /// at zero bytes (creator not done yet, or its resize failed) gets
    /// [`ShmError::Unsized`](crate::ShmError::Unsized) instead of a descriptor.
    ExclusiveCreate,
}

/// Creation options for a shared memory segment.
///
/// # Example
///
/// ```
/// use shmseg::config::{InitStrategy, ShmOptions};
///
/// let opts = ShmOptions::default()
///     .mode_bits(0o600)
///     .strategy(InitStrategy::ExclusiveCreate);
/// assert_eq!(opts.raw_mode(), 0o600);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShmOptions {
    /// Permission bits applied when the object is created. Ignored when
    /// attaching to an existing object.
    pub mode: Mode,
    /// Who resizes the object, see [`InitStrategy`].
    pub strategy: InitStrategy,
}

impl Default for ShmOptions {
    fn default() -> Self {
        Self {
            mode: DEFAULT_MODE,
            strategy: InitStrategy::default(),
        }
    }
}

impl ShmOptions {
    /// Sets the creation mode.
    #[must_use]
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the creation mode from raw octal bits such as `0o600`.
    ///
    /// File type bits (`S_IFMT`) are dropped.
    #[must_use]
    pub fn mode_bits(mut self, bits: u32) -> Self {
        self.mode = Mode::from_raw_mode(bits as RawMode);
        self
    }

    /// Sets the sizing strategy.
    #[must_use]
    pub fn strategy(mut self, strategy: InitStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// The creation mode as raw bits.
    pub fn raw_mode(&self) -> u32 {
        u32::from(self.mode.as_raw_mode())
    }
}
