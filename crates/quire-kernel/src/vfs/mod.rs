//! Virtual Filesystem abstraction.
//!
//! Every content operation goes through [`VfsOps`]. Key components:
//!
//! - [`VfsOps`] - Core trait for filesystem operations
//! - [`VfsWriter`] - All-or-nothing write handle
//! - [`LocalBackend`] - Local disk, writes staged through [`AtomicWriter`]
//! - [`MemoryBackend`] - In-memory filesystem (for testing)
//!
//! ## Design Decisions
//!
//! - **String paths**: operations take content-relative `a/b/c` paths and
//!   reject anything [`validate_path`] refuses before any I/O.
//! - **Write-then-rename**: the local writer stages into a directory on the
//!   same volume as the content root, so publishing is a single `rename(2)`.

mod atomic;
pub mod backends;
mod error;
mod ops;
mod types;

pub use atomic::AtomicWriter;
pub use backends::{LocalBackend, MemoryBackend};
pub use error::{VfsError, VfsResult};
pub use ops::{VfsOps, VfsReader, VfsWriter, validate_path};
pub use types::{DirEntry, FileAttr, FileType};
