//! VFS operations trait.
//!
//! Paths are content-relative, slash-separated strings. Every operation
//! checks its paths with [`validate_path`] before touching storage.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::types::{DirEntry, FileAttr};
use super::{VfsError, VfsResult};

/// A readable file handle.
pub type VfsReader = Box<dyn AsyncRead + Send + Unpin>;

/// Check the relative-path predicate.
///
/// `""` names the root. Absolute paths, `.`/`..` segments, empty segments
/// (which also covers leading and trailing slashes) and NUL bytes are
/// rejected with `InvalidPath`.
pub fn validate_path(path: &str) -> VfsResult<()> {
    if path.is_empty() {
        return Ok(());
    }
    if path.contains('\0') {
        return Err(VfsError::invalid_path(path));
    }
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(VfsError::invalid_path(path));
        }
    }
    Ok(())
}

/// Handle returned by [`VfsOps::open_writer`].
///
/// Writes go to a private staging area; the destination is untouched
/// until [`close`](VfsWriter::close) succeeds. Dropping the handle without
/// closing discards everything written.
#[async_trait]
pub trait VfsWriter: Send {
    /// Append bytes. A failed write poisons the handle: the later `close`
    /// discards the staged data and returns `Ok`.
    async fn write(&mut self, buf: &[u8]) -> VfsResult<()>;

    /// Publish the staged data onto the destination. A second call fails
    /// with `AlreadyClosed`.
    async fn close(&mut self) -> VfsResult<()>;
}

/// Core VFS operations trait.
#[async_trait]
pub trait VfsOps: Send + Sync {
    // ========================================================================
    // Reading
    // ========================================================================

    /// Get file attributes.
    async fn stat(&self, path: &str) -> VfsResult<FileAttr>;

    /// Open a file for reading.
    async fn open(&self, path: &str) -> VfsResult<VfsReader>;

    /// Read directory entries, sorted by name.
    async fn read_dir(&self, path: &str) -> VfsResult<Vec<DirEntry>>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Open an all-or-nothing writer onto `path`.
    ///
    /// `perm` applies to new files. Replacing an existing file keeps that
    /// file's permission bits.
    async fn open_writer(&self, path: &str, perm: u32) -> VfsResult<Box<dyn VfsWriter>>;

    /// Create a single directory. The parent must already exist.
    async fn mkdir(&self, path: &str, perm: u32) -> VfsResult<()>;

    /// Remove a file or an empty directory.
    async fn remove(&self, path: &str) -> VfsResult<()>;

    /// Rename a file or directory.
    ///
    /// An existing non-directory at `to` is replaced; an existing directory
    /// at `to` is an error.
    async fn rename(&self, from: &str, to: &str) -> VfsResult<()>;

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Check if a path exists.
    async fn exists(&self, path: &str) -> bool {
        self.stat(path).await.is_ok()
    }

    /// Read entire file contents.
    async fn read(&self, path: &str) -> VfsResult<Vec<u8>> {
        let mut reader = self.open(path).await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Atomically replace the whole file.
    async fn write_file(&self, path: &str, data: &[u8], perm: u32) -> VfsResult<()> {
        let mut writer = self.open_writer(path, perm).await?;
        writer.write(data).await?;
        writer.close().await
    }
}
