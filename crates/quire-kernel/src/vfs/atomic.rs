//! Write-to-staging-then-rename file replacement.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::ops::VfsWriter;
use super::{VfsError, VfsResult};

/// All-or-nothing writer used by [`LocalBackend`](super::LocalBackend).
///
/// Bytes go to a uniquely named file in the staging directory, which must
/// sit on the same volume as the destination. `close` renames it over the
/// destination, so readers see either the old or the new content.
///
/// The staging file is unlinked whenever the writer goes away without
/// publishing: failed writes, a failed rename, or the writer being dropped
/// (task cancellation included).
pub struct AtomicWriter {
    name: String,
    dest: PathBuf,
    state: State,
}

enum State {
    Open {
        file: tokio::fs::File,
        temp: TempPath,
        failed: bool,
    },
    Closed,
}

impl AtomicWriter {
    /// Allocate the staging file and apply `perm` to it.
    ///
    /// `name` is the content-relative path, used for errors and logs.
    pub fn create(name: &str, staging: &Path, dest: PathBuf, perm: u32) -> VfsResult<Self> {
        let (file, temp) = tempfile::Builder::new()
            .prefix(".quire-")
            .tempfile_in(staging)?
            .into_parts();
        file.set_permissions(std::fs::Permissions::from_mode(perm))?;
        Ok(Self {
            name: name.to_string(),
            dest,
            state: State::Open {
                file: tokio::fs::File::from_std(file),
                temp,
                failed: false,
            },
        })
    }

    /// Path of the staging file, if the writer is still open.
    pub fn staging_path(&self) -> Option<&Path> {
        match &self.state {
            State::Open { temp, .. } => Some(&**temp),
            State::Closed => None,
        }
    }
}

#[async_trait]
impl VfsWriter for AtomicWriter {
    async fn write(&mut self, buf: &[u8]) -> VfsResult<()> {
        let State::Open { file, failed, .. } = &mut self.state else {
            return Err(VfsError::AlreadyClosed(self.name.clone()));
        };
        if let Err(e) = file.write_all(buf).await {
            *failed = true;
            warn!(path = %self.name, error = %e, "staged write failed");
            return Err(VfsError::Io(e));
        }
        Ok(())
    }

    async fn close(&mut self) -> VfsResult<()> {
        let State::Open {
            mut file,
            temp,
            failed,
        } = std::mem::replace(&mut self.state, State::Closed)
        else {
            return Err(VfsError::AlreadyClosed(self.name.clone()));
        };

        if failed {
            // Write error already surfaced; drop the staged bytes.
            drop(file);
            drop(temp);
            debug!(path = %self.name, "discarded staged file after failed write");
            return Ok(());
        }

        let synced = async {
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        drop(file);
        if let Err(e) = synced {
            return Err(VfsError::Io(e));
        }

        // On failure `PathPersistError` still owns the staging path and
        // unlinks it when dropped here.
        temp.persist(&self.dest).map_err(|e| VfsError::Io(e.error))?;
        debug!(path = %self.name, "published staged file");
        Ok(())
    }
}

impl Drop for AtomicWriter {
    fn drop(&mut self) {
        if matches!(self.state, State::Open { .. }) {
            debug!(path = %self.name, "writer dropped before close; discarding staged file");
        }
    }
}
