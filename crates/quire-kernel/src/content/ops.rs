//! [`ContentOperations`] and the per-site handle that carries them out.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};
use uuid::Uuid;

use quire_types::path::{join, split_parent};
use quire_types::{ContentKind, Route, SitePrefix, UserId, clean_path, is_site_prefix};

use super::listing::{ListEntry, Listing, MAX_FILE_DETAILS, title_and_preview};
use super::locks::{PathGuard, PathLocks};
use super::validate::{ParentUse, check_parent, extension_error, validate_name};
use super::{ContentError, admin_url, storage_failure};
use crate::auth::{AuthorizationGate, Decision};
use crate::fields::FieldErrors;
use crate::token::Token;
use crate::vfs::{FileAttr, VfsError, VfsOps, VfsResult};

const FILE_PERM: u32 = 0o644;
const DIR_PERM: u32 = 0o755;
const COPY_BUF_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CreateFile {
    pub parent_folder: String,
    /// Empty under posts/ or notes/ picks a fresh time-ordered name.
    pub name: String,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CreateFolder {
    pub parent_folder: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Rename {
    pub parent_folder: String,
    pub old_name: String,
    pub new_name: String,
}

/// Source and destination of a move or copy. The entry keeps its name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Transfer {
    pub path: String,
    pub destination_folder: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Delete {
    pub path: String,
}

/// Result of a successful mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Outcome {
    /// Site-relative path of the entry the operation produced or touched.
    pub path: String,
    /// Admin URL of an entry that was already there; nothing was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub already_exists: Option<String>,
}

impl Outcome {
    fn done(path: String) -> Self {
        Self {
            path,
            already_exists: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileContent {
    pub path: String,
    pub content: Vec<u8>,
    pub size: u64,
    pub mtime: SystemTime,
}

impl FileContent {
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}

/// Orchestrates the VFS and the authorization gate. Holds no state beyond
/// the per-path locks.
#[derive(Clone)]
pub struct ContentOperations {
    vfs: Arc<dyn VfsOps>,
    gate: AuthorizationGate,
    locks: PathLocks,
}

impl std::fmt::Debug for ContentOperations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentOperations")
            .field("authless", &self.gate.is_authless())
            .field("locked_paths", &self.locks.len())
            .finish()
    }
}

impl ContentOperations {
    pub fn new(vfs: Arc<dyn VfsOps>, gate: AuthorizationGate) -> Self {
        Self {
            vfs,
            gate,
            locks: PathLocks::new(),
        }
    }

    pub fn vfs(&self) -> &Arc<dyn VfsOps> {
        &self.vfs
    }

    pub fn gate(&self) -> &AuthorizationGate {
        &self.gate
    }

    /// Authorize `token` on `site` and return a handle scoped to it.
    pub fn site(
        &self,
        site: SitePrefix,
        token: Option<&Token>,
    ) -> Result<SiteContent<'_>, ContentError> {
        let decision = self
            .gate
            .authorize(&site, token)
            .map_err(|e| storage_failure("authorize", site.as_str(), e))?;
        match decision {
            Decision::Allow { user } => Ok(SiteContent {
                ops: self,
                site,
                user,
            }),
            Decision::Deny(reason) => Err(ContentError::Denied(reason)),
        }
    }

    /// Resolve an admin URL path (`/admin/@alice/posts/`) and authorize it.
    /// Returns the scoped handle and the site-relative path.
    pub fn route(
        &self,
        url_path: &str,
        token: Option<&Token>,
    ) -> Result<(SiteContent<'_>, String), ContentError> {
        let Route { site, path } = quire_types::resolve_url_path(url_path, "admin")
            .ok_or_else(|| ContentError::NotFound(url_path.to_string()))?;
        Ok((self.site(site, token)?, path))
    }

    /// Create a site's root and its content folders. Existing folders are
    /// left alone.
    pub async fn init_site(&self, site: &SitePrefix) -> Result<(), ContentError> {
        let mut folders = Vec::new();
        if !site.is_default() {
            folders.push(site.as_str().to_string());
        }
        folders.extend(ContentKind::SITE_FOLDERS.iter().map(|k| site.join(k.as_str())));

        for folder in folders {
            match self.vfs.mkdir(&folder, DIR_PERM).await {
                Ok(()) => debug!(path = %folder, "created site folder"),
                Err(VfsError::AlreadyExists(_)) => {}
                Err(e) => return Err(storage_failure("mkdir", &folder, e)),
            }
        }
        info!(site = %site, "site initialized");
        Ok(())
    }
}

/// A checked move or copy. The path locks are held until it drops.
struct Prepared {
    source: String,
    attr: FileAttr,
    target: String,
    _guards: (PathGuard, Option<PathGuard>),
}

/// Content operations for one authorized site.
#[derive(Debug)]
pub struct SiteContent<'a> {
    ops: &'a ContentOperations,
    site: SitePrefix,
    user: Option<UserId>,
}

/// Record `raw` under `field` if it is not a single path segment.
fn check_segment(errors: &mut FieldErrors, field: &str, raw: &str) {
    if raw.is_empty() {
        errors.add(field, "cannot be empty");
    } else if raw.contains('/') || raw == "." || raw == ".." {
        errors.add(field, "invalid name");
    }
}

/// Clean a path naming an existing entry inside a content folder.
fn check_entry_path(errors: &mut FieldErrors, field: &str, raw: &str) -> Option<String> {
    if raw.is_empty() {
        errors.add(field, "cannot be empty");
        return None;
    }
    let Ok(path) = clean_path(raw) else {
        errors.add(field, "invalid path");
        return None;
    };
    if ContentKind::of(&path).is_none() || !path.contains('/') {
        errors.add(
            field,
            "must be inside posts, notes, pages, templates, themes or assets",
        );
        return None;
    }
    Some(path)
}

fn validated<T>(errors: FieldErrors, value: Option<T>) -> Result<T, ContentError> {
    match value {
        Some(value) if errors.is_empty() => Ok(value),
        _ => Err(ContentError::ValidationFailed(errors)),
    }
}

impl SiteContent<'_> {
    pub fn site(&self) -> &SitePrefix {
        &self.site
    }

    /// The authorized user; `None` in authless mode.
    pub fn user(&self) -> Option<UserId> {
        self.user
    }

    fn vfs(&self) -> &dyn VfsOps {
        self.ops.vfs.as_ref()
    }

    fn full(&self, path: &str) -> String {
        self.site.join(path)
    }

    /// Stat, with a missing entry (or a missing parent) as `None`.
    async fn stat(&self, full: &str) -> Result<Option<FileAttr>, ContentError> {
        match self.vfs().stat(full).await {
            Ok(attr) => Ok(Some(attr)),
            Err(VfsError::NotFound(_) | VfsError::NotADirectory(_)) => Ok(None),
            Err(e) => Err(storage_failure("stat", full, e)),
        }
    }

    /// Fail with a field error unless `folder` is an existing directory.
    async fn require_folder(&self, field: &str, folder: &str) -> Result<(), ContentError> {
        match self.stat(&self.full(folder)).await? {
            None => Err(ContentError::field(field, "folder does not exist")),
            Some(attr) if !attr.is_dir() => Err(ContentError::field(field, "not a folder")),
            Some(_) => Ok(()),
        }
    }

    pub async fn create_file(&self, req: &CreateFile) -> Result<Outcome, ContentError> {
        let mut errors = FieldErrors::new();
        let parent = check_parent(&mut errors, "parent_folder", &req.parent_folder, ParentUse::File);

        let mut name = req.name.clone();
        if name.is_empty()
            && let Some((_, kind)) = &parent
            && kind.is_flat()
        {
            name = format!("{}.md", Uuid::now_v7().simple());
        }
        if name.is_empty() {
            errors.add("name", "cannot be empty");
        } else {
            errors.extend("name", validate_name(&name));
            if let Some((_, kind)) = &parent
                && let Some(message) = extension_error(*kind, &name)
            {
                errors.add("name", message);
            }
        }
        let (parent, _) = validated(errors, parent)?;

        let path = join(&parent, &name);
        let full = self.full(&path);
        let _guard = self.ops.locks.lock(&full).await;

        self.require_folder("parent_folder", &parent).await?;
        match self.stat(&full).await? {
            Some(attr) if attr.is_dir() => {
                return Err(ContentError::field(
                    "name",
                    "folder with the same name already exists",
                ));
            }
            Some(_) => {
                return Ok(Outcome {
                    already_exists: Some(admin_url(&self.site, &path, false)),
                    path,
                });
            }
            None => {}
        }

        let mut writer = self
            .vfs()
            .open_writer(&full, FILE_PERM)
            .await
            .map_err(|e| storage_failure("open_writer", &full, e))?;
        if let Some(content) = &req.content {
            writer
                .write(content.as_bytes())
                .await
                .map_err(|e| storage_failure("write", &full, e))?;
        }
        writer
            .close()
            .await
            .map_err(|e| storage_failure("close", &full, e))?;

        info!(site = %self.site, path = %path, "created file");
        Ok(Outcome::done(path))
    }

    pub async fn create_folder(&self, req: &CreateFolder) -> Result<Outcome, ContentError> {
        let mut errors = FieldErrors::new();
        let parent = check_parent(
            &mut errors,
            "parent_folder",
            &req.parent_folder,
            ParentUse::Folder,
        );
        if req.name.is_empty() {
            errors.add("name", "cannot be empty");
        } else {
            errors.extend("name", validate_name(&req.name));
        }
        let (parent, _) = validated(errors, parent)?;

        let path = join(&parent, &req.name);
        let full = self.full(&path);
        let _guard = self.ops.locks.lock(&full).await;

        self.require_folder("parent_folder", &parent).await?;
        let existing = Outcome {
            already_exists: Some(admin_url(&self.site, &path, true)),
            path: path.clone(),
        };
        match self.stat(&full).await? {
            Some(attr) if attr.is_dir() => return Ok(existing),
            Some(_) => {
                return Err(ContentError::field(
                    "name",
                    "file with the same name already exists",
                ));
            }
            None => {}
        }

        match self.vfs().mkdir(&full, DIR_PERM).await {
            Ok(()) => {}
            Err(VfsError::AlreadyExists(_)) => return Ok(existing),
            Err(e) => return Err(storage_failure("mkdir", &full, e)),
        }
        info!(site = %self.site, path = %path, "created folder");
        Ok(Outcome::done(path))
    }

    pub async fn rename(&self, req: &Rename) -> Result<Outcome, ContentError> {
        let mut errors = FieldErrors::new();
        let parent = if req.parent_folder.is_empty() {
            errors.add("parent_folder", "cannot be empty");
            None
        } else {
            check_parent(&mut errors, "parent_folder", &req.parent_folder, ParentUse::File)
        };
        check_segment(&mut errors, "old_name", &req.old_name);
        if req.new_name.is_empty() {
            errors.add("new_name", "cannot be empty");
        } else {
            errors.extend("new_name", validate_name(&req.new_name));
        }
        let (parent, kind) = validated(errors, parent)?;

        let old_path = join(&parent, &req.old_name);
        let new_path = join(&parent, &req.new_name);
        let (old_full, new_full) = (self.full(&old_path), self.full(&new_path));
        let _guards = self.ops.locks.lock_pair(&old_full, &new_full).await;

        self.require_folder("parent_folder", &parent).await?;
        let Some(old) = self.stat(&old_full).await? else {
            return Err(ContentError::field("old_name", "file/folder does not exist"));
        };
        if old.is_file()
            && let Some(message) = extension_error(kind, &req.new_name)
        {
            return Err(ContentError::field("new_name", message));
        }
        if self.stat(&new_full).await?.is_some() {
            return Err(ContentError::field("new_name", "file/folder already exists"));
        }

        self.vfs()
            .rename(&old_full, &new_full)
            .await
            .map_err(|e| storage_failure("rename", &old_full, e))?;
        info!(site = %self.site, from = %old_path, to = %new_path, "renamed");
        Ok(Outcome::done(new_path))
    }

    /// Shared checks for move and copy, run with both paths locked.
    async fn prepare_transfer(
        &self,
        req: &Transfer,
        verb: &str,
    ) -> Result<Prepared, ContentError> {
        let mut errors = FieldErrors::new();
        let source = check_entry_path(&mut errors, "path", &req.path);
        let destination = if req.destination_folder.is_empty() {
            errors.add("destination_folder", "cannot be empty");
            None
        } else {
            check_parent(
                &mut errors,
                "destination_folder",
                &req.destination_folder,
                ParentUse::File,
            )
        };
        let (source, (destination, kind)) =
            validated(errors, source.zip(destination))?;

        let (_, name) = split_parent(&source);
        let target = join(&destination, name);
        let (source_full, target_full) = (self.full(&source), self.full(&target));
        let guards = self.ops.locks.lock_pair(&source_full, &target_full).await;

        let Some(attr) = self.stat(&source_full).await? else {
            return Err(ContentError::field("path", "file or folder does not exist"));
        };
        if attr.is_dir() {
            if destination == source || destination.starts_with(&format!("{source}/")) {
                return Err(ContentError::field(
                    "destination_folder",
                    format!("cannot {verb} a folder into itself"),
                ));
            }
            if kind.is_flat() {
                return Err(ContentError::field(
                    "destination_folder",
                    "not allowed to use this parent folder",
                ));
            }
        } else if let Some(message) = extension_error(kind, name) {
            return Err(ContentError::field("path", message));
        }

        self.require_folder("destination_folder", &destination).await?;
        if self.stat(&target_full).await?.is_some() {
            return Err(ContentError::field(
                "path",
                "file already exists in destination folder",
            ));
        }
        Ok(Prepared {
            source,
            attr,
            target,
            _guards: guards,
        })
    }

    /// Move a file or folder into another folder with one rename.
    pub async fn move_to(&self, req: &Transfer) -> Result<Outcome, ContentError> {
        let Prepared { source, target, .. } = &self.prepare_transfer(req, "move").await?;
        let (source_full, target_full) = (self.full(source), self.full(target));
        self.vfs()
            .rename(&source_full, &target_full)
            .await
            .map_err(|e| storage_failure("rename", &source_full, e))?;
        info!(site = %self.site, from = %source, to = %target, "moved");
        Ok(Outcome::done(target.clone()))
    }

    /// Copy a file, or a folder recursively, into another folder. Every
    /// file goes through an atomic writer with its permission bits kept.
    pub async fn copy(&self, req: &Transfer) -> Result<Outcome, ContentError> {
        let Prepared {
            source,
            attr,
            target,
            ..
        } = &self.prepare_transfer(req, "copy").await?;
        let (source_full, target_full) = (self.full(source), self.full(target));
        copy_entry(self.vfs(), &source_full, &target_full, attr)
            .await
            .map_err(|e| storage_failure("copy", &source_full, e))?;
        info!(site = %self.site, from = %source, to = %target, "copied");
        Ok(Outcome::done(target.clone()))
    }

    /// Delete a file or an empty folder.
    pub async fn delete(&self, req: &Delete) -> Result<Outcome, ContentError> {
        let mut errors = FieldErrors::new();
        let path = check_entry_path(&mut errors, "path", &req.path);
        let path = validated(errors, path)?;

        let full = self.full(&path);
        let _guard = self.ops.locks.lock(&full).await;
        if self.stat(&full).await?.is_none() {
            return Err(ContentError::field("path", "file or folder does not exist"));
        }
        match self.vfs().remove(&full).await {
            Ok(()) => {}
            Err(VfsError::DirectoryNotEmpty(_)) => {
                return Err(ContentError::field("path", "folder is not empty"));
            }
            Err(e) => return Err(storage_failure("remove", &full, e)),
        }
        info!(site = %self.site, path = %path, "deleted");
        Ok(Outcome::done(path))
    }

    /// List a folder.
    ///
    /// At the site root only content folders are shown, followed (on the
    /// default site) by the site folders the caller may administer. Files
    /// at the root are hidden. Elsewhere folders come before files.
    pub async fn list_folder(&self, path: &str) -> Result<Listing, ContentError> {
        let path = clean_path(path).map_err(|_| ContentError::NotFound(path.to_string()))?;
        if !path.is_empty() && ContentKind::of(&path).is_none() {
            return Err(ContentError::NotFound(path));
        }
        let full = self.full(&path);
        let entries = match self.vfs().read_dir(&full).await {
            Ok(entries) => entries,
            Err(VfsError::NotFound(_) | VfsError::NotADirectory(_)) => {
                return Err(ContentError::NotFound(path));
            }
            Err(e) => return Err(storage_failure("read_dir", &full, e)),
        };

        let entries = if path.is_empty() {
            self.root_entries(entries)?
        } else {
            self.folder_entries(&path, entries).await?
        };
        Ok(Listing {
            site: self.site.clone(),
            path,
            entries,
        })
    }

    fn root_entries(&self, entries: Vec<crate::vfs::DirEntry>) -> Result<Vec<ListEntry>, ContentError> {
        let dirs: Vec<&str> = entries
            .iter()
            .filter(|e| e.is_dir())
            .map(|e| e.name.as_str())
            .collect();

        let mut out: Vec<ListEntry> = ContentKind::SITE_FOLDERS
            .iter()
            .chain(std::iter::once(&ContentKind::Themes))
            .filter(|kind| dirs.contains(&kind.as_str()))
            .map(|kind| ListEntry::folder(kind.as_str()))
            .collect();

        if !self.site.is_default() {
            return Ok(out);
        }
        let authorized: Option<HashSet<SitePrefix>> = match self.user {
            None if self.ops.gate.is_authless() => None,
            None => Some(HashSet::new()),
            Some(user) => Some(
                self.ops
                    .gate
                    .authorized_site_prefixes(user)
                    .map_err(|e| storage_failure("authorized_site_prefixes", "", e))?
                    .into_iter()
                    .collect(),
            ),
        };
        out.extend(
            dirs.iter()
                .filter(|name| is_site_prefix(name))
                .filter(|name| match (&authorized, SitePrefix::parse(name)) {
                    (None, _) => true,
                    (Some(set), Some(prefix)) => set.contains(&prefix),
                    (Some(_), None) => false,
                })
                .map(|name| ListEntry::folder(*name)),
        );
        Ok(out)
    }

    async fn folder_entries(
        &self,
        path: &str,
        entries: Vec<crate::vfs::DirEntry>,
    ) -> Result<Vec<ListEntry>, ContentError> {
        let summarize = ContentKind::of(path).is_some_and(ContentKind::is_flat);
        let (dirs, files): (Vec<_>, Vec<_>) = entries.into_iter().partition(|e| e.is_dir());

        let mut out: Vec<ListEntry> = dirs.into_iter().map(|e| ListEntry::folder(e.name)).collect();
        for (i, entry) in files.into_iter().enumerate() {
            let mut item = ListEntry::file(entry.name);
            if i < MAX_FILE_DETAILS {
                item.size = Some(entry.attr.size);
                item.mtime = Some(entry.attr.mtime);
                if summarize {
                    let full = self.full(&join(path, &item.name));
                    let text = self
                        .vfs()
                        .read(&full)
                        .await
                        .map_err(|e| storage_failure("read", &full, e))?;
                    let (title, preview) = title_and_preview(&String::from_utf8_lossy(&text));
                    item.title = title;
                    item.preview = preview;
                }
            }
            out.push(item);
        }
        Ok(out)
    }

    /// Read a file inside one of the site's content folders.
    pub async fn read_file(&self, path: &str) -> Result<FileContent, ContentError> {
        let path = clean_path(path).map_err(|_| ContentError::NotFound(path.to_string()))?;
        if ContentKind::of(&path).is_none() {
            return Err(ContentError::NotFound(path));
        }
        let full = self.full(&path);
        let attr = match self.stat(&full).await? {
            Some(attr) if attr.is_file() => attr,
            _ => return Err(ContentError::NotFound(path)),
        };
        let content = self
            .vfs()
            .read(&full)
            .await
            .map_err(|e| storage_failure("read", &full, e))?;
        Ok(FileContent {
            path,
            size: content.len() as u64,
            content,
            mtime: attr.mtime,
        })
    }
}

async fn copy_file(vfs: &dyn VfsOps, from: &str, to: &str, perm: u32) -> VfsResult<()> {
    let mut reader = vfs.open(from).await?;
    let mut writer = vfs.open_writer(to, perm).await?;
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write(&buf[..n]).await?;
    }
    writer.close().await
}

async fn copy_entry(vfs: &dyn VfsOps, from: &str, to: &str, attr: &FileAttr) -> VfsResult<()> {
    if attr.is_file() {
        return copy_file(vfs, from, to, attr.perm).await;
    }
    let mut pending = vec![(from.to_string(), to.to_string(), attr.perm)];
    while let Some((src, dst, perm)) = pending.pop() {
        vfs.mkdir(&dst, perm).await?;
        for entry in vfs.read_dir(&src).await? {
            let (s, d) = (join(&src, &entry.name), join(&dst, &entry.name));
            if entry.is_dir() {
                pending.push((s, d, entry.attr.perm));
            } else {
                copy_file(vfs, &s, &d, entry.attr.perm).await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::DenyReason;
    use crate::db::AuthDb;
    use crate::vfs::MemoryBackend;

    async fn setup() -> (ContentOperations, Arc<MemoryBackend>) {
        let vfs = Arc::new(MemoryBackend::new());
        let ops = ContentOperations::new(vfs.clone(), AuthorizationGate::authless());
        ops.init_site(&SitePrefix::default_site()).await.unwrap();
        (ops, vfs)
    }

    fn field(err: &ContentError, name: &str) -> Vec<String> {
        err.field_errors()
            .map(|e| e.get(name).to_vec())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_create_file_with_content() {
        let (ops, vfs) = setup().await;
        let site = ops.site(SitePrefix::default_site(), None).unwrap();
        let out = site
            .create_file(&CreateFile {
                parent_folder: "posts".into(),
                name: "hello.md".into(),
                content: Some("# Hello\n".into()),
            })
            .await
            .unwrap();
        assert_eq!(out, Outcome::done("posts/hello.md".into()));
        assert_eq!(vfs.read("posts/hello.md").await.unwrap(), b"# Hello\n");
    }

    #[tokio::test]
    async fn test_create_file_auto_name() {
        let (ops, vfs) = setup().await;
        let site = ops.site(SitePrefix::default_site(), None).unwrap();
        let out = site
            .create_file(&CreateFile {
                parent_folder: "notes".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let (_, name) = split_parent(&out.path);
        assert!(name.ends_with(".md"));
        assert_eq!(name, name.to_lowercase());
        assert!(vfs.exists(&out.path).await);
    }

    #[tokio::test]
    async fn test_create_file_existing_links() {
        let (ops, _) = setup().await;
        let site = ops.site(SitePrefix::default_site(), None).unwrap();
        let req = CreateFile {
            parent_folder: "pages".into(),
            name: "index.html".into(),
            content: None,
        };
        site.create_file(&req).await.unwrap();
        let again = site.create_file(&req).await.unwrap();
        assert_eq!(again.already_exists.as_deref(), Some("/admin/pages/index.html"));
    }

    #[tokio::test]
    async fn test_create_file_validation_accumulates() {
        let (ops, vfs) = setup().await;
        let site = ops.site(SitePrefix::default_site(), None).unwrap();
        let err = site
            .create_file(&CreateFile {
                parent_folder: "posts".into(),
                name: "Bad Name.txt".into(),
                content: None,
            })
            .await
            .unwrap_err();
        assert_eq!(
            field(&err, "name"),
            [
                "no uppercase letters [A-Z] allowed",
                "forbidden characters:  ",
                "invalid extension (must end in .md)",
            ]
        );
        assert!(vfs.read_dir("posts").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_file_missing_parent() {
        let (ops, _) = setup().await;
        let site = ops.site(SitePrefix::default_site(), None).unwrap();
        let err = site
            .create_file(&CreateFile {
                parent_folder: "pages/nowhere".into(),
                name: "a.html".into(),
                content: None,
            })
            .await
            .unwrap_err();
        assert_eq!(field(&err, "parent_folder"), ["folder does not exist"]);
    }

    #[tokio::test]
    async fn test_create_folder() {
        let (ops, vfs) = setup().await;
        let site = ops.site(SitePrefix::default_site(), None).unwrap();
        let req = CreateFolder {
            parent_folder: "pages".into(),
            name: "docs".into(),
        };
        assert_eq!(site.create_folder(&req).await.unwrap().already_exists, None);
        assert!(vfs.stat("pages/docs").await.unwrap().is_dir());
        assert_eq!(
            site.create_folder(&req).await.unwrap().already_exists.as_deref(),
            Some("/admin/pages/docs/")
        );

        let err = site
            .create_folder(&CreateFolder {
                parent_folder: "posts".into(),
                name: "nested".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(field(&err, "parent_folder"), ["not allowed to use this parent folder"]);
    }

    #[tokio::test]
    async fn test_create_folder_over_file() {
        let (ops, vfs) = setup().await;
        vfs.write_file("pages/about", b"", 0o644).await.unwrap();
        let site = ops.site(SitePrefix::default_site(), None).unwrap();
        let err = site
            .create_folder(&CreateFolder {
                parent_folder: "pages".into(),
                name: "about".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(field(&err, "name"), ["file with the same name already exists"]);
    }

    #[tokio::test]
    async fn test_rename() {
        let (ops, vfs) = setup().await;
        vfs.write_file("posts/a.md", b"a", 0o644).await.unwrap();
        let site = ops.site(SitePrefix::default_site(), None).unwrap();

        let out = site
            .rename(&Rename {
                parent_folder: "posts".into(),
                old_name: "a.md".into(),
                new_name: "b.md".into(),
            })
            .await
            .unwrap();
        assert_eq!(out.path, "posts/b.md");
        assert!(!vfs.exists("posts/a.md").await);

        let err = site
            .rename(&Rename {
                parent_folder: "posts".into(),
                old_name: "b.md".into(),
                new_name: "b.txt".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(field(&err, "new_name"), ["invalid extension (must end in .md)"]);

        let err = site
            .rename(&Rename {
                parent_folder: "posts".into(),
                old_name: "zzz.md".into(),
                new_name: "c.md".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(field(&err, "old_name"), ["file/folder does not exist"]);
    }

    #[tokio::test]
    async fn test_move_and_copy() {
        let (ops, vfs) = setup().await;
        vfs.mkdir("pages/docs", 0o755).await.unwrap();
        vfs.mkdir("pages/docs/sub", 0o755).await.unwrap();
        vfs.write_file("pages/docs/sub/x.html", b"x", 0o600).await.unwrap();
        vfs.mkdir("pages/archive", 0o755).await.unwrap();
        let site = ops.site(SitePrefix::default_site(), None).unwrap();

        let copied = site
            .copy(&Transfer {
                path: "pages/docs".into(),
                destination_folder: "pages/archive".into(),
            })
            .await
            .unwrap();
        assert_eq!(copied.path, "pages/archive/docs");
        let attr = vfs.stat("pages/archive/docs/sub/x.html").await.unwrap();
        assert_eq!(attr.perm, 0o600);
        assert!(vfs.exists("pages/docs/sub/x.html").await);

        let err = site
            .move_to(&Transfer {
                path: "pages/docs".into(),
                destination_folder: "pages/docs/sub".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(field(&err, "destination_folder"), ["cannot move a folder into itself"]);

        let err = site
            .copy(&Transfer {
                path: "pages/docs".into(),
                destination_folder: "pages".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(field(&err, "path"), ["file already exists in destination folder"]);

        site.delete(&Delete {
            path: "pages/archive/docs/sub/x.html".into(),
        })
        .await
        .unwrap();
        site.move_to(&Transfer {
            path: "pages/archive/docs".into(),
            destination_folder: "templates".into(),
        })
        .await
        .unwrap();
        assert!(vfs.stat("templates/docs/sub").await.unwrap().is_dir());
    }

    #[tokio::test]
    async fn test_move_folder_into_posts_rejected() {
        let (ops, vfs) = setup().await;
        vfs.mkdir("pages/docs", 0o755).await.unwrap();
        let site = ops.site(SitePrefix::default_site(), None).unwrap();
        let err = site
            .move_to(&Transfer {
                path: "pages/docs".into(),
                destination_folder: "posts".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(field(&err, "destination_folder"), ["not allowed to use this parent folder"]);
    }

    #[tokio::test]
    async fn test_delete_non_empty_folder_fails() {
        let (ops, vfs) = setup().await;
        vfs.mkdir("pages/docs", 0o755).await.unwrap();
        vfs.write_file("pages/docs/a.html", b"", 0o644).await.unwrap();
        let site = ops.site(SitePrefix::default_site(), None).unwrap();

        let err = site
            .delete(&Delete {
                path: "pages/docs".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(field(&err, "path"), ["folder is not empty"]);

        let err = site.delete(&Delete { path: "posts".into() }).await.unwrap_err();
        assert_eq!(
            field(&err, "path"),
            ["must be inside posts, notes, pages, templates, themes or assets"]
        );
    }

    #[tokio::test]
    async fn test_list_root_and_folder() {
        let (ops, vfs) = setup().await;
        vfs.write_file("stray.txt", b"", 0o644).await.unwrap();
        vfs.mkdir("@alice", 0o755).await.unwrap();
        vfs.mkdir("junk", 0o755).await.unwrap();
        vfs.write_file("posts/b.md", b"# Second\n\nbody", 0o644)
            .await
            .unwrap();
        vfs.write_file("posts/a.md", b"First", 0o644).await.unwrap();
        let site = ops.site(SitePrefix::default_site(), None).unwrap();

        let root = site.list_folder("").await.unwrap();
        assert_eq!(
            root.names(),
            ["notes", "pages", "posts", "templates", "assets", "@alice"]
        );

        let posts = site.list_folder("/posts/").await.unwrap();
        assert_eq!(posts.names(), ["a.md", "b.md"]);
        assert_eq!(posts.entries[1].title.as_deref(), Some("Second"));
        assert_eq!(posts.entries[1].preview.as_deref(), Some("body"));
        assert_eq!(posts.entries[0].size, Some(5));

        assert!(matches!(
            site.list_folder("junk").await,
            Err(ContentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_root_lists_only_authorized_sites() {
        let vfs = Arc::new(MemoryBackend::new());
        let db = Arc::new(AuthDb::in_memory().unwrap());
        let alice = db.create_user("alice", None, "x").unwrap();
        let default_site = db.site_id("").unwrap().unwrap();
        db.add_site_user(default_site, alice).unwrap();
        let alice_site = db.create_site("alice").unwrap();
        db.add_site_user(alice_site, alice).unwrap();
        let (token, hash) = Token::generate();
        db.insert_authentication(&hash, alice).unwrap();

        let ops = ContentOperations::new(vfs.clone(), AuthorizationGate::new(db));
        for site in ["", "alice", "bob"] {
            ops.init_site(&SitePrefix::from_site_name(site)).await.unwrap();
        }

        let site = ops.site(SitePrefix::default_site(), Some(&token)).unwrap();
        let root = site.list_folder("").await.unwrap();
        assert!(root.names().contains(&"@alice"));
        assert!(!root.names().contains(&"@bob"));

        let denied = ops.site(SitePrefix::from_site_name("bob"), Some(&token));
        assert!(matches!(
            denied,
            Err(ContentError::Denied(DenyReason::NotAMember))
        ));
    }

    #[tokio::test]
    async fn test_read_file_stays_inside_site() {
        let vfs = Arc::new(MemoryBackend::new());
        let db = Arc::new(AuthDb::in_memory().unwrap());
        let alice = db.create_user("alice", None, "x").unwrap();
        let default_site = db.site_id("").unwrap().unwrap();
        db.add_site_user(default_site, alice).unwrap();
        db.create_site("bob").unwrap();
        let (token, hash) = Token::generate();
        db.insert_authentication(&hash, alice).unwrap();

        let ops = ContentOperations::new(vfs.clone(), AuthorizationGate::new(db));
        for site in ["", "bob"] {
            ops.init_site(&SitePrefix::from_site_name(site)).await.unwrap();
        }
        vfs.write_file("@bob/pages/secret.html", b"bob-only", 0o644)
            .await
            .unwrap();
        vfs.write_file("notes.txt", b"stray", 0o644).await.unwrap();

        let site = ops.site(SitePrefix::default_site(), Some(&token)).unwrap();
        for path in ["@bob/pages/secret.html", "notes.txt", "/@bob/pages/secret.html"] {
            assert!(
                matches!(site.read_file(path).await, Err(ContentError::NotFound(_))),
                "{path}"
            );
        }
        assert!(matches!(
            ops.site(SitePrefix::from_site_name("bob"), Some(&token)),
            Err(ContentError::Denied(_))
        ));
    }

    #[tokio::test]
    async fn test_route_rejects_dot_segments() {
        let (ops, _) = setup().await;
        for url in ["/admin/../posts/", "/admin/./posts/", "/admin/@alice/../posts"] {
            assert!(
                matches!(ops.route(url, None), Err(ContentError::NotFound(_))),
                "{url}"
            );
        }
    }

    #[tokio::test]
    async fn test_read_file() {
        let (ops, vfs) = setup().await;
        vfs.write_file("pages/index.html", b"<h1>hi</h1>", 0o644)
            .await
            .unwrap();
        let (site, path) = ops.route("/admin/pages/index.html", None).unwrap();
        let file = site.read_file(&path).await.unwrap();
        assert_eq!(file.text(), Some("<h1>hi</h1>"));
        assert_eq!(file.size, 11);
        assert!(matches!(
            site.read_file("pages").await,
            Err(ContentError::NotFound(_))
        ));
    }
}
