//! Content operations: create, rename, move, copy, delete, list and read
//! files under a site's content folders.
//!
//! Every mutation runs the same sequence: authorize the site, validate
//! names and folders (accumulating field errors), take the per-path lock,
//! check the parent and the target, then make a single VFS call. Field
//! problems come back as [`ContentError::ValidationFailed`]; anything that
//! goes wrong inside storage is logged and surfaces as the opaque
//! [`ContentError::Storage`].

mod listing;
mod locks;
mod ops;
pub mod validate;

pub use listing::{ListEntry, Listing, MAX_FILE_DETAILS, title_and_preview};
pub use locks::{PathGuard, PathLocks};
pub use ops::{
    ContentOperations, CreateFile, CreateFolder, Delete, FileContent, Outcome, Rename, SiteContent,
    Transfer,
};

use std::fmt::Display;

use thiserror::Error;
use tracing::error;

use quire_types::SitePrefix;

use crate::auth::DenyReason;
use crate::fields::FieldErrors;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("validation failed: {0}")]
    ValidationFailed(FieldErrors),

    #[error("access denied: {0}")]
    Denied(DenyReason),

    #[error("not found: {0}")]
    NotFound(String),

    /// Details are in the log, not here.
    #[error("storage failure")]
    Storage,
}

impl ContentError {
    /// Single-field validation failure.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.add(field, message);
        Self::ValidationFailed(errors)
    }

    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::ValidationFailed(errors) => Some(errors),
            _ => None,
        }
    }
}

/// Log a storage failure with its cause and return the opaque error.
pub(crate) fn storage_failure(op: &str, path: &str, err: impl Display) -> ContentError {
    error!(op, path, error = %err, "storage failure");
    ContentError::Storage
}

/// The admin URL of a site-relative path. Folder URLs end in `/`.
pub fn admin_url(site: &SitePrefix, path: &str, is_dir: bool) -> String {
    let full = site.join(path);
    match (full.is_empty(), is_dir) {
        (true, _) => "/admin/".to_string(),
        (false, true) => format!("/admin/{full}/"),
        (false, false) => format!("/admin/{full}"),
    }
}

/// Where to send the browser after an operation on `path`: the folder
/// that contains it.
pub fn redirect_to_parent(site: &SitePrefix, path: &str) -> String {
    let (parent, _) = quire_types::path::split_parent(path);
    admin_url(site, parent, true)
}
