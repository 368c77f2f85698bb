//! Box tree creation and teardown.
//!
//! All filesystem work runs off the scheduler on the blocking pool.

use crate::process::startup;
use crate::runtime::layout::BoxLayout;
use replbox_shared::constants::{dirs, tools};
use replbox_shared::errors::{ReplboxError, ReplboxResult};
use std::path::{Path, PathBuf};

/// Create the box root and its subdirectories, materialize the startup
/// hook, and hand ownership of the tree to the sandbox user.
pub(crate) async fn create_box_tree(
    layout: &BoxLayout,
    owner: Option<&str>,
) -> ReplboxResult<()> {
    let layout = layout.clone();
    let owner = owner.map(str::to_owned);
    tokio::task::spawn_blocking(move || create_box_tree_blocking(&layout, owner.as_deref()))
        .await
        .map_err(|e| ReplboxError::Internal(format!("directory task failed: {}", e)))?
}

fn create_box_tree_blocking(layout: &BoxLayout, owner: Option<&str>) -> ReplboxResult<()> {
    make_dir(layout.root())?;
    for sub in dirs::ALL {
        make_dir(&layout.root().join(sub))?;
    }

    // Written before the chown so the child owns (and can read) it.
    startup::materialize(layout)
        .map_err(|e| ReplboxError::Storage(format!("failed to write startup hook: {}", e)))?;

    if let Some(user) = owner {
        chown_tree(layout.root(), user)?;
    }
    Ok(())
}

/// Create one directory with the sandbox mode: setgid, rwx owner+group.
fn make_dir(path: &Path) -> ReplboxResult<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::create_dir_all(path)
        .map_err(|e| ReplboxError::Storage(format!("failed to create {}: {}", path.display(), e)))?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(dirs::BOX_DIR_MODE)).map_err(
        |e| ReplboxError::Storage(format!("failed to chmod {}: {}", path.display(), e)),
    )?;
    Ok(())
}

/// Hand an existing tree (and everything since written into it) to the
/// sandbox user. Restore materializes snapshot artifacts as the
/// runtime's own user, so ownership must be applied after the copy.
pub(crate) async fn chown_box_tree(layout: &BoxLayout, owner: Option<&str>) -> ReplboxResult<()> {
    let Some(user) = owner else {
        return Ok(());
    };
    let root = layout.root().to_path_buf();
    let user = user.to_owned();
    tokio::task::spawn_blocking(move || chown_tree(&root, &user))
        .await
        .map_err(|e| ReplboxError::Internal(format!("chown task failed: {}", e)))?
}

/// Recursively hand the tree to the sandbox user and group.
fn chown_tree(root: &Path, user: &str) -> ReplboxResult<()> {
    let status = std::process::Command::new(tools::CHOWN)
        .arg("-R")
        .arg(format!("{}:{}", user, user))
        .arg(root)
        .status()
        .map_err(|e| ReplboxError::Storage(format!("failed to run chown: {}", e)))?;

    if !status.success() {
        return Err(ReplboxError::Storage(format!(
            "chown -R {} failed with {}",
            root.display(),
            status
        )));
    }
    Ok(())
}

/// Best-effort recursive removal: not-found is fine, other errors are
/// logged and swallowed.
pub(crate) async fn remove_tree(path: PathBuf) {
    let result = tokio::task::spawn_blocking(move || match std::fs::remove_dir_all(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err((path, e)),
    })
    .await;

    match result {
        Ok(Ok(())) => {}
        Ok(Err((path, e))) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove tree");
        }
        Err(e) => tracing::warn!(error = %e, "tree removal task failed"),
    }
}
