//! The startup hook executed inside each child interpreter.
//!
//! The hook is embedded in the binary and materialized into each box
//! tree at creation time, so a box directory is self-contained and the
//! child never reads host files outside its own tree.
//!
//! What the hook does inside the child:
//! 1. extends the module search path from the library path env var,
//! 2. disables history, prompts, and color so output is machine-readable,
//! 3. creates `<TMPDIR>/_l0ckfi1e`, takes an exclusive non-blocking
//!    advisory lock, writes its PID, fsyncs, and registers an exit
//!    cleanup. Exit code 100 on lock contention, 101 on other failures.
//!
//! The held lock is the liveness signal probed by the parent's health
//! monitor.

use crate::runtime::layout::BoxLayout;
use std::io;
use std::path::Path;

/// Embedded startup hook source.
pub const STARTUP_HOOK: &str = include_str!("python_startup.py");

/// Write the startup hook into the box tree.
///
/// Called during directory creation, before ownership is handed to the
/// sandbox user, so the file ends up owned by it like everything else.
pub(crate) fn materialize(layout: &BoxLayout) -> io::Result<()> {
    write_hook(&layout.startup_hook_path())
}

fn write_hook(path: &Path) -> io::Result<()> {
    std::fs::write(path, STARTUP_HOOK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn hook_contains_the_lock_protocol() {
        assert!(STARTUP_HOOK.contains("_l0ckfi1e"));
        assert!(STARTUP_HOOK.contains("LOCK_EX | fcntl.LOCK_NB"));
        assert!(STARTUP_HOOK.contains("sys.exit(100)"));
        assert!(STARTUP_HOOK.contains("sys.exit(101)"));
    }

    #[test]
    fn hook_suppresses_prompts_and_color() {
        assert!(STARTUP_HOOK.contains("sys.ps1 = \"\""));
        assert!(STARTUP_HOOK.contains("sys.ps2 = \"\""));
        assert!(STARTUP_HOOK.contains("\"dumb\""));
        assert!(STARTUP_HOOK.contains("NO_COLOR"));
    }

    #[test]
    fn materialize_writes_into_tmp() {
        let dir = TempDir::new().unwrap();
        let layout = BoxLayout::new(dir.path().to_path_buf());
        std::fs::create_dir_all(layout.tmp_dir()).unwrap();

        materialize(&layout).unwrap();

        let written = std::fs::read_to_string(layout.startup_hook_path()).unwrap();
        assert_eq!(written, STARTUP_HOOK);
    }
}
