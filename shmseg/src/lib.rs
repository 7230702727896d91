//! Named POSIX shared memory segments.
//!
//! - [`shmem`]: stateless create-or-open / query-size / unlink on raw descriptors
//! - [`ShmSegment`]: owned descriptor + name, optional unlink on drop
//! - [`ShmMap`]: read/write shared mapping of a segment
//! - [`ShmOptions`]: creation mode and sizing strategy
//!
//! The first process to open a name sizes the object; everyone after
//! attaches with that size. No locking, layout or registry is provided.

// Logging macros expand to nothing without `tracing`; keep locals they read
// from going unused in that build.
#![cfg_attr(not(feature = "tracing"), deny(unused_variables))]

pub mod config;
pub mod error;
pub mod map;
pub mod segment;
pub mod shmem;
mod trace;

pub use config::{DEFAULT_MODE, InitStrategy, ShmOptions};
pub use error::{Result, ShmError};
pub use map::ShmMap;
pub use segment::ShmSegment;
pub use shmem::{create_or_open, create_or_open_with, query_size, random_name, unlink};
pub use trace::init_tracing;
