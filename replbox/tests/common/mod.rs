#![allow(dead_code)]

use replbox::{SandboxOptions, SandboxService};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Locate the interpreter on the minimal PATH handed to children.
///
/// Integration tests drive real interpreter children; on hosts without
/// one they print a notice and pass vacuously.
pub fn python_available() -> bool {
    replbox_shared::constants::tools::CHILD_PATH
        .split(':')
        .any(|dir| std::path::Path::new(dir).join("python3").is_file())
}

/// Isolated service over a throwaway sandbox root.
///
/// Runs unprivileged: no privilege-drop wrapper, no checkpoint
/// launcher, no chown - the driver semantics under test are identical.
pub struct TestContext {
    pub service: SandboxService,
    _temp_dir: TempDir,
}

impl TestContext {
    pub fn new() -> Option<Self> {
        Self::with_prewarm(0)
    }

    pub fn with_prewarm(prewarm_count: usize) -> Option<Self> {
        Self::build(prewarm_count, Duration::from_secs(3600))
    }

    /// Context with a fast health monitor, for crash-detection tests.
    pub fn with_health_interval(interval: Duration) -> Option<Self> {
        Self::build(0, interval)
    }

    fn build(prewarm_count: usize, health_check_interval: Duration) -> Option<Self> {
        if !python_available() {
            eprintln!("python3 not found on PATH, skipping");
            return None;
        }

        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let options = SandboxOptions {
            root_dir: temp_dir.path().to_path_buf(),
            box_prefix: "sandbox_".into(),
            shared_libs_dir: temp_dir.path().join("shared_libs"),
            snapshot_dir: temp_dir.path().join("snapshots"),
            prewarm_count,
            health_check_interval,
            sandbox_user: None,
            checkpointing: false,
            ..Default::default()
        };

        Some(Self {
            service: SandboxService::new(options),
            _temp_dir: temp_dir,
        })
    }

    pub fn root(&self) -> PathBuf {
        self._temp_dir.path().to_path_buf()
    }
}

/// Poll `check` until it returns true or `limit` elapses.
pub async fn eventually<F>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = std::time::Instant::now() + limit;
    while std::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}
