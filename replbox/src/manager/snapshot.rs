//! Snapshot artifact handling.
//!
//! The checkpoint launcher writes its artifacts inside the box tree
//! during the session; hibernating a box persists the whole tree under
//! the snapshot root, and restoring copies it back. Relaunching from
//! the checkpoint image itself is the checkpoint tool's side of the
//! contract - the runtime only tracks the artifacts by snapshot id.

use replbox_shared::errors::{ReplboxError, ReplboxResult};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Persist a box tree as snapshot artifacts.
pub(crate) async fn persist(box_root: PathBuf, snapshot_dir: PathBuf) -> ReplboxResult<()> {
    tokio::task::spawn_blocking(move || copy_tree(&box_root, &snapshot_dir))
        .await
        .map_err(|e| ReplboxError::Internal(format!("snapshot task failed: {}", e)))?
        .map_err(|e| ReplboxError::SnapshotFailed(e.to_string()))
}

/// Materialize snapshot artifacts into a (fresh) box tree.
pub(crate) async fn materialize(snapshot_dir: PathBuf, box_root: PathBuf) -> ReplboxResult<()> {
    if !snapshot_dir.is_dir() {
        return Err(ReplboxError::RestoreFailed(format!(
            "no snapshot at {}",
            snapshot_dir.display()
        )));
    }
    tokio::task::spawn_blocking(move || copy_tree(&snapshot_dir, &box_root))
        .await
        .map_err(|e| ReplboxError::Internal(format!("restore task failed: {}", e)))?
        .map_err(|e| ReplboxError::RestoreFailed(e.to_string()))
}

/// Recursive copy preserving permissions and symlinks.
fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::other(e.to_string()))?;
        let target = dst.join(rel);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
            let perms = entry.metadata()?.permissions();
            std::fs::set_permissions(&target, perms)?;
        } else if file_type.is_symlink() {
            let link = std::fs::read_link(entry.path())?;
            if target.exists() {
                std::fs::remove_file(&target)?;
            }
            std::os::unix::fs::symlink(link, &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
