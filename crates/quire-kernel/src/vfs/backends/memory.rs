//! In-memory filesystem backend.
//!
//! The test double for [`LocalBackend`](super::LocalBackend). All data is
//! ephemeral. Writers buffer privately and commit on close, which gives
//! the same all-or-nothing visibility as the local backend.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::SystemTime;

use quire_types::path::split_parent;

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::{VfsOps, VfsReader, VfsWriter, validate_path};
use crate::vfs::types::{DirEntry, FileAttr};

/// Entry in the memory filesystem.
#[derive(Debug, Clone)]
enum Entry {
    File { data: Arc<Vec<u8>>, attr: FileAttr },
    Directory { attr: FileAttr },
}

impl Entry {
    fn attr(&self) -> &FileAttr {
        match self {
            Entry::File { attr, .. } => attr,
            Entry::Directory { attr } => attr,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, Entry::Directory { .. })
    }
}

#[derive(Debug)]
struct Inner {
    entries: RwLock<HashMap<String, Entry>>,
    /// Per-writer byte limit; writes past it fail with `StorageFull`.
    write_limit: RwLock<Option<usize>>,
}

/// In-memory filesystem backend.
///
/// Cheap to clone; clones share the same tree.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a new empty in-memory filesystem.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        // Root directory always exists
        entries.insert(
            String::new(),
            Entry::Directory {
                attr: FileAttr::directory(0o755),
            },
        );
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(entries),
                write_limit: RwLock::new(None),
            }),
        }
    }

    /// Make every writer fail once it has buffered more than `limit` bytes.
    pub fn set_write_limit(&self, limit: Option<usize>) {
        *self.inner.write_limit.write() = limit;
    }

    fn require_dir(entries: &HashMap<String, Entry>, path: &str) -> VfsResult<()> {
        match entries.get(path) {
            Some(Entry::Directory { .. }) => Ok(()),
            Some(_) => Err(VfsError::not_a_directory(path)),
            None => Err(VfsError::not_found(path)),
        }
    }

    fn is_within(path: &str, dir: &str) -> bool {
        path.strip_prefix(dir)
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

#[async_trait]
impl VfsOps for MemoryBackend {
    async fn stat(&self, path: &str) -> VfsResult<FileAttr> {
        validate_path(path)?;
        let entries = self.inner.entries.read();
        entries
            .get(path)
            .map(|e| e.attr().clone())
            .ok_or_else(|| VfsError::not_found(path))
    }

    async fn open(&self, path: &str) -> VfsResult<VfsReader> {
        validate_path(path)?;
        let entries = self.inner.entries.read();
        match entries.get(path) {
            Some(Entry::File { data, .. }) => Ok(Box::new(io::Cursor::new(SharedBytes(
                Arc::clone(data),
            )))),
            Some(Entry::Directory { .. }) => Err(VfsError::is_a_directory(path)),
            None => Err(VfsError::not_found(path)),
        }
    }

    async fn read_dir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        validate_path(path)?;
        let entries = self.inner.entries.read();
        Self::require_dir(&entries, path)?;

        let mut result: Vec<DirEntry> = entries
            .iter()
            .filter(|(key, _)| !key.is_empty() && split_parent(key).0 == path)
            .map(|(key, entry)| DirEntry::new(split_parent(key).1, entry.attr().clone()))
            .collect();

        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn open_writer(&self, path: &str, perm: u32) -> VfsResult<Box<dyn VfsWriter>> {
        validate_path(path)?;
        if path.is_empty() {
            return Err(VfsError::is_a_directory(path));
        }
        {
            let entries = self.inner.entries.read();
            Self::require_dir(&entries, split_parent(path).0)?;
            if entries.get(path).is_some_and(Entry::is_dir) {
                return Err(VfsError::is_a_directory(path));
            }
        }
        Ok(Box::new(MemoryWriter {
            inner: Arc::clone(&self.inner),
            path: path.to_string(),
            perm,
            buf: Vec::new(),
            failed: false,
            closed: false,
        }))
    }

    async fn mkdir(&self, path: &str, perm: u32) -> VfsResult<()> {
        validate_path(path)?;
        let mut entries = self.inner.entries.write();
        if entries.contains_key(path) {
            return Err(VfsError::already_exists(path));
        }
        Self::require_dir(&entries, split_parent(path).0)?;
        entries.insert(
            path.to_string(),
            Entry::Directory {
                attr: FileAttr::directory(perm),
            },
        );
        Ok(())
    }

    async fn remove(&self, path: &str) -> VfsResult<()> {
        validate_path(path)?;
        if path.is_empty() {
            return Err(VfsError::invalid_path(path));
        }
        let mut entries = self.inner.entries.write();
        match entries.get(path) {
            Some(Entry::Directory { .. }) => {
                if entries.keys().any(|k| Self::is_within(k, path)) {
                    return Err(VfsError::directory_not_empty(path));
                }
            }
            Some(Entry::File { .. }) => {}
            None => return Err(VfsError::not_found(path)),
        }
        entries.remove(path);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        validate_path(from)?;
        validate_path(to)?;
        if from.is_empty() || to.is_empty() {
            return Err(VfsError::invalid_path(if from.is_empty() { from } else { to }));
        }
        if Self::is_within(to, from) {
            return Err(VfsError::invalid_path(to));
        }
        if from == to {
            let entries = self.inner.entries.read();
            return entries
                .contains_key(from)
                .then_some(())
                .ok_or_else(|| VfsError::not_found(from));
        }

        let mut entries = self.inner.entries.write();
        if !entries.contains_key(from) {
            return Err(VfsError::not_found(from));
        }
        if entries.get(to).is_some_and(Entry::is_dir) {
            return Err(VfsError::is_a_directory(to));
        }
        Self::require_dir(&entries, split_parent(to).0)?;

        let moved: Vec<String> = entries
            .keys()
            .filter(|k| k.as_str() == from || Self::is_within(k, from))
            .cloned()
            .collect();
        for old in moved {
            if let Some(entry) = entries.remove(&old) {
                let new = format!("{to}{}", &old[from.len()..]);
                entries.insert(new, entry);
            }
        }
        Ok(())
    }
}

/// `Arc<Vec<u8>>` viewed as a byte slice, so readers share the stored data.
struct SharedBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Buffering writer that commits into the tree on close.
struct MemoryWriter {
    inner: Arc<Inner>,
    path: String,
    perm: u32,
    buf: Vec<u8>,
    failed: bool,
    closed: bool,
}

#[async_trait]
impl VfsWriter for MemoryWriter {
    async fn write(&mut self, buf: &[u8]) -> VfsResult<()> {
        if self.closed {
            return Err(VfsError::AlreadyClosed(self.path.clone()));
        }
        let limit = *self.inner.write_limit.read();
        if limit.is_some_and(|limit| self.buf.len() + buf.len() > limit) {
            self.failed = true;
            return Err(VfsError::Io(io::Error::from(io::ErrorKind::StorageFull)));
        }
        self.buf.extend_from_slice(buf);
        Ok(())
    }

    async fn close(&mut self) -> VfsResult<()> {
        if self.closed {
            return Err(VfsError::AlreadyClosed(self.path.clone()));
        }
        self.closed = true;
        let data = std::mem::take(&mut self.buf);
        if self.failed {
            return Ok(());
        }

        let mut entries = self.inner.entries.write();
        MemoryBackend::require_dir(&entries, split_parent(&self.path).0)?;
        let perm = match entries.get(&self.path) {
            Some(Entry::Directory { .. }) => return Err(VfsError::is_a_directory(&self.path)),
            Some(Entry::File { attr, .. }) => attr.perm,
            None => self.perm,
        };
        let attr = FileAttr {
            size: data.len() as u64,
            mtime: SystemTime::now(),
            ..FileAttr::file(0, perm)
        };
        entries.insert(
            self.path.clone(),
            Entry::File {
                data: Arc::new(data),
                attr,
            },
        );
        Ok(())
    }
}
