//! Filesystem layout of the sandbox root and per-box trees.
//!
//! Other processes inspect this layout (the checkpoint tool, the
//! package installer, operators), so every path here is contract.

use crate::runtime::options::SandboxOptions;
use crate::runtime::types::{BoxID, SnapshotID};
use replbox_shared::constants::{dirs, filenames};
use std::path::{Path, PathBuf};

// ============================================================================
// SANDBOX LAYOUT (service root)
// ============================================================================

/// Layout of the whole sandbox root.
///
/// ```text
/// <SANDBOX_ROOT>/
/// ├── <PREFIX><box_id>/      # one tree per box, mode 2770
/// │   ├── work/              # cwd and HOME of the child
/// │   ├── tmp/               # TMPDIR; holds _l0ckfi1e and _startup.py
/// │   ├── lib/               # package install target
/// │   └── log/
/// ├── shared_libs/           # read-only, shared across boxes
/// └── snapshots/<snap_id>/   # checkpoint artifacts
/// ```
#[derive(Clone, Debug)]
pub struct SandboxLayout {
    root_dir: PathBuf,
    box_prefix: String,
    shared_libs_dir: PathBuf,
    snapshot_root: PathBuf,
}

impl SandboxLayout {
    pub fn new(options: &SandboxOptions) -> Self {
        Self {
            root_dir: options.root_dir.clone(),
            box_prefix: options.box_prefix.clone(),
            shared_libs_dir: options.shared_libs_dir.clone(),
            snapshot_root: options.snapshot_dir.clone(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Read-only shared library directory appended to each child's
    /// module search path.
    pub fn shared_libs_dir(&self) -> &Path {
        &self.shared_libs_dir
    }

    /// Snapshot artifact root: `<SANDBOX_ROOT>/snapshots`.
    pub fn snapshot_root(&self) -> &Path {
        &self.snapshot_root
    }

    /// Artifact directory for one snapshot.
    pub fn snapshot_dir(&self, snapshot_id: &SnapshotID) -> PathBuf {
        self.snapshot_root.join(snapshot_id.as_str())
    }

    /// Per-box snapshot scratch addressed by box id, removed by destroy.
    pub fn box_snapshot_dir(&self, box_id: &BoxID) -> PathBuf {
        self.snapshot_root.join(box_id.as_str())
    }

    /// Create the per-box layout for a specific box ID.
    pub fn box_layout(&self, box_id: &BoxID) -> BoxLayout {
        BoxLayout::new(
            self.root_dir
                .join(format!("{}{}", self.box_prefix, box_id.as_str())),
        )
    }
}

// ============================================================================
// BOX LAYOUT (per-box tree)
// ============================================================================

/// Filesystem layout for a single box tree.
///
/// Every directory is mode `2770` and owned by the sandbox user so the
/// child can write nowhere else.
#[derive(Clone, Debug)]
pub struct BoxLayout {
    box_dir: PathBuf,
}

impl BoxLayout {
    pub fn new(box_dir: PathBuf) -> Self {
        Self { box_dir }
    }

    /// Root of this box's tree: `<SANDBOX_ROOT>/<PREFIX><box_id>`.
    pub fn root(&self) -> &Path {
        &self.box_dir
    }

    /// Working directory of the child; also its HOME.
    pub fn work_dir(&self) -> PathBuf {
        self.box_dir.join(dirs::WORK)
    }

    /// Scratch directory; the child's TMPDIR.
    pub fn tmp_dir(&self) -> PathBuf {
        self.box_dir.join(dirs::TMP)
    }

    /// Package install target, first entry on the module search path.
    pub fn lib_dir(&self) -> PathBuf {
        self.box_dir.join(dirs::LIB)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.box_dir.join(dirs::LOG)
    }

    /// Advisory-locked liveness file, created by the startup hook:
    /// `<root>/tmp/_l0ckfi1e`.
    pub fn lock_file_path(&self) -> PathBuf {
        self.tmp_dir().join(filenames::LOCK_FILE)
    }

    /// Materialized startup hook read by the interpreter at spawn:
    /// `<root>/tmp/_startup.py`.
    pub fn startup_hook_path(&self) -> PathBuf {
        self.tmp_dir().join(filenames::STARTUP_HOOK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> SandboxLayout {
        let options = SandboxOptions {
            root_dir: PathBuf::from("/sandboxes"),
            box_prefix: "sandbox_".into(),
            shared_libs_dir: PathBuf::from("/sandboxes/shared_libs"),
            snapshot_dir: PathBuf::from("/sandboxes/snapshots"),
            ..Default::default()
        };
        SandboxLayout::new(&options)
    }

    #[test]
    fn box_root_combines_prefix_and_id() {
        let id = BoxID::parse("abcdefghijklmnopqrstu").unwrap();
        let boxl = layout().box_layout(&id);
        assert_eq!(
            boxl.root(),
            Path::new("/sandboxes/sandbox_abcdefghijklmnopqrstu")
        );
    }

    #[test]
    fn subdirectories_hang_off_the_box_root() {
        let id = BoxID::new();
        let boxl = layout().box_layout(&id);
        assert_eq!(boxl.work_dir(), boxl.root().join("work"));
        assert_eq!(boxl.tmp_dir(), boxl.root().join("tmp"));
        assert_eq!(boxl.lib_dir(), boxl.root().join("lib"));
        assert_eq!(boxl.log_dir(), boxl.root().join("log"));
    }

    #[test]
    fn lock_file_lives_in_tmp() {
        let id = BoxID::new();
        let boxl = layout().box_layout(&id);
        assert_eq!(boxl.lock_file_path(), boxl.tmp_dir().join("_l0ckfi1e"));
    }

    #[test]
    fn snapshot_dir_addressed_by_id() {
        let snap = SnapshotID::new();
        assert_eq!(
            layout().snapshot_dir(&snap),
            Path::new("/sandboxes/snapshots").join(snap.as_str())
        );
    }
}
