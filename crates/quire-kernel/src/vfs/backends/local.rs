//! Local filesystem backend.
//!
//! Content lives under `root`; in-flight writes are staged under `staging`,
//! which must be on the same volume so that publishing is a rename.

use async_trait::async_trait;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tokio::fs;

use quire_types::path::split_parent;

use crate::vfs::atomic::AtomicWriter;
use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::{VfsOps, VfsReader, VfsWriter, validate_path};
use crate::vfs::types::{DirEntry, FileAttr, FileType};

/// Local filesystem backend.
///
/// All operations are relative to `root`. For example, if `root` is
/// `/srv/quire/content`, then `read("posts/hello.md")` reads
/// `/srv/quire/content/posts/hello.md`.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
    staging: PathBuf,
}

impl LocalBackend {
    /// Open a backend, creating `root` and `staging` if needed.
    ///
    /// Both are canonicalized (e.g. macOS `/tmp` → `/private/tmp`) and must
    /// share a device, otherwise this fails with `CrossDeviceLink`.
    pub fn open(root: impl Into<PathBuf>, staging: impl Into<PathBuf>) -> VfsResult<Self> {
        let root: PathBuf = root.into();
        let staging: PathBuf = staging.into();
        std::fs::create_dir_all(&root)?;
        std::fs::create_dir_all(&staging)?;
        let root = dunce::canonicalize(&root)?;
        let staging = dunce::canonicalize(&staging)?;

        if std::fs::metadata(&root)?.dev() != std::fs::metadata(&staging)?.dev() {
            return Err(VfsError::CrossDeviceLink(staging.display().to_string()));
        }

        Ok(Self { root, staging })
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the staging path.
    pub fn staging(&self) -> &Path {
        &self.staging
    }

    /// Resolve a relative path to an absolute path within the root.
    ///
    /// Fails if the path is invalid or, once symlinks are followed, lands
    /// outside the root. A path that does not exist yet is checked through
    /// its parent, so creating `link/new` through an escaping symlink fails
    /// too.
    fn resolve(&self, path: &str) -> VfsResult<PathBuf> {
        validate_path(path)?;
        if path.is_empty() {
            return Ok(self.root.clone());
        }
        let full = self.root.join(path);

        let canonical = dunce::canonicalize(&full).or_else(|e| match full.parent() {
            Some(parent) => dunce::canonicalize(parent),
            None => Err(e),
        });
        if let Ok(canonical) = canonical
            && !canonical.starts_with(&self.root)
        {
            return Err(VfsError::PathEscapesRoot(path.to_string()));
        }
        Ok(full)
    }

    /// Convert std::fs::Metadata to FileAttr.
    fn metadata_to_attr(meta: &std::fs::Metadata) -> FileAttr {
        let is_dir = meta.is_dir();
        FileAttr {
            size: if is_dir { 0 } else { meta.len() },
            kind: if is_dir {
                FileType::Directory
            } else {
                FileType::File
            },
            perm: meta.permissions().mode() & 0o7777,
            mtime: meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH),
        }
    }

    /// Require that the parent of `path` exists and is a directory.
    async fn check_parent(&self, path: &str) -> VfsResult<()> {
        let (parent, _) = split_parent(path);
        let meta = fs::metadata(self.resolve(parent)?)
            .await
            .map_err(|e| VfsError::from_io(e, parent))?;
        if !meta.is_dir() {
            return Err(VfsError::not_a_directory(parent));
        }
        Ok(())
    }
}

#[async_trait]
impl VfsOps for LocalBackend {
    async fn stat(&self, path: &str) -> VfsResult<FileAttr> {
        let full_path = self.resolve(path)?;
        let meta = fs::metadata(&full_path)
            .await
            .map_err(|e| VfsError::from_io(e, path))?;
        Ok(Self::metadata_to_attr(&meta))
    }

    async fn open(&self, path: &str) -> VfsResult<VfsReader> {
        let full_path = self.resolve(path)?;
        let meta = fs::metadata(&full_path)
            .await
            .map_err(|e| VfsError::from_io(e, path))?;
        if meta.is_dir() {
            return Err(VfsError::is_a_directory(path));
        }
        let file = fs::File::open(&full_path)
            .await
            .map_err(|e| VfsError::from_io(e, path))?;
        Ok(Box::new(file))
    }

    async fn read_dir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        let full_path = self.resolve(path)?;
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&full_path)
            .await
            .map_err(|e| VfsError::from_io(e, path))?;

        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| VfsError::from_io(e, path))?
        {
            // Non-UTF-8 names cannot be addressed through the string API.
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            // Entry removed between readdir and stat.
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            entries.push(DirEntry::new(name, Self::metadata_to_attr(&meta)));
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn open_writer(&self, path: &str, perm: u32) -> VfsResult<Box<dyn VfsWriter>> {
        let dest = self.resolve(path)?;
        if path.is_empty() {
            return Err(VfsError::is_a_directory(path));
        }
        self.check_parent(path).await?;

        let perm = match fs::metadata(&dest).await {
            Ok(meta) if meta.is_dir() => return Err(VfsError::is_a_directory(path)),
            Ok(meta) => meta.permissions().mode() & 0o7777,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => perm,
            Err(e) => return Err(VfsError::from_io(e, path)),
        };

        let writer = AtomicWriter::create(path, &self.staging, dest, perm)?;
        Ok(Box::new(writer))
    }

    async fn mkdir(&self, path: &str, perm: u32) -> VfsResult<()> {
        let full_path = self.resolve(path)?;
        if path.is_empty() {
            return Err(VfsError::already_exists(path));
        }
        let mut builder = fs::DirBuilder::new();
        builder.mode(perm);
        builder
            .create(&full_path)
            .await
            .map_err(|e| VfsError::from_io(e, path))
    }

    async fn remove(&self, path: &str) -> VfsResult<()> {
        let full_path = self.resolve(path)?;
        if path.is_empty() {
            return Err(VfsError::invalid_path(path));
        }
        let meta = fs::metadata(&full_path)
            .await
            .map_err(|e| VfsError::from_io(e, path))?;
        let result = if meta.is_dir() {
            fs::remove_dir(&full_path).await
        } else {
            fs::remove_file(&full_path).await
        };
        result.map_err(|e| VfsError::from_io(e, path))
    }

    async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let from_path = self.resolve(from)?;
        let to_path = self.resolve(to)?;
        if from.is_empty() || to.is_empty() {
            return Err(VfsError::invalid_path(if from.is_empty() { from } else { to }));
        }
        if to.starts_with(&format!("{from}/")) {
            return Err(VfsError::invalid_path(to));
        }

        fs::metadata(&from_path)
            .await
            .map_err(|e| VfsError::from_io(e, from))?;
        match fs::metadata(&to_path).await {
            Ok(meta) if meta.is_dir() && from != to => return Err(VfsError::is_a_directory(to)),
            _ => {}
        }
        self.check_parent(to).await?;

        fs::rename(&from_path, &to_path)
            .await
            .map_err(|e| VfsError::from_io(e, to))
    }
}
