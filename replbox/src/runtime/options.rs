//! Configuration for the sandbox runtime.

use replbox_shared::constants::{defaults, envs, timeouts};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration options for [`BoxManager`](crate::manager::BoxManager)
/// and [`SandboxService`](crate::service::SandboxService).
///
/// `Default` reads the recognized environment variables once; callers
/// can then modify fields as needed.
#[derive(Clone, Debug)]
pub struct SandboxOptions {
    /// Base directory for all sandbox trees (`SANDBOX_ROOT`).
    pub root_dir: PathBuf,

    /// Per-box directory prefix under the root (`SANDBOX_PREFIX`).
    pub box_prefix: String,

    /// Read-only shared library directory (`SHARED_LIBS_PATH`,
    /// resolved under the root).
    pub shared_libs_dir: PathBuf,

    /// Snapshot artifact root (`SNAPSHOT_DIR`, resolved under the root).
    pub snapshot_dir: PathBuf,

    /// Number of boxes kept started and idle ahead of demand.
    pub prewarm_count: usize,

    /// Outer deadline for user code execution.
    pub exec_timeout: Duration,

    /// Interval between health monitor probes of the lock file.
    pub health_check_interval: Duration,

    /// Unprivileged user the box trees are chowned to and children run
    /// as (via the privilege-drop wrapper). `None` skips both - the
    /// children run as the current user, for development and tests on
    /// hosts without the sandbox user.
    pub sandbox_user: Option<String>,

    /// Wrap the interpreter in the checkpoint launcher. `false` omits
    /// it, for hosts without the tool; snapshot then persists only the
    /// filesystem tree.
    pub checkpointing: bool,

    /// Resource limits applied in the child's pre-exec hook. All-`None`
    /// by default: a production deployment must set these or enforce
    /// equivalent cgroup/namespace restrictions outside the runtime.
    pub resource_limits: ResourceLimits,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        let root_dir = PathBuf::from(
            std::env::var(envs::SANDBOX_ROOT).unwrap_or_else(|_| defaults::SANDBOX_ROOT.into()),
        );
        let box_prefix =
            std::env::var(envs::SANDBOX_PREFIX).unwrap_or_else(|_| defaults::SANDBOX_PREFIX.into());
        let shared_libs_dir = root_dir.join(
            std::env::var(envs::SHARED_LIBS_PATH)
                .unwrap_or_else(|_| defaults::SHARED_LIBS_DIR.into()),
        );
        let snapshot_dir = root_dir.join(
            std::env::var(envs::SNAPSHOT_DIR).unwrap_or_else(|_| defaults::SNAPSHOT_DIR.into()),
        );

        Self {
            root_dir,
            box_prefix,
            shared_libs_dir,
            snapshot_dir,
            prewarm_count: 0,
            exec_timeout: timeouts::EXEC,
            health_check_interval: timeouts::HEALTH_INTERVAL,
            sandbox_user: Some(defaults::SANDBOX_USER.to_string()),
            checkpointing: true,
            resource_limits: ResourceLimits::default(),
        }
    }
}

/// Resource limits applied to the child in the pre-exec hook.
///
/// Each limit is optional; `None` means the limit is left to outer
/// cgroup/namespace policy.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Maximum virtual memory in bytes (RLIMIT_AS).
    #[serde(default)]
    pub max_memory: Option<u64>,

    /// Maximum number of open file descriptors (RLIMIT_NOFILE).
    #[serde(default)]
    pub max_open_files: Option<u64>,

    /// Maximum CPU time in seconds (RLIMIT_CPU).
    #[serde(default)]
    pub max_cpu_time: Option<u64>,

    /// Maximum core dump size in bytes (RLIMIT_CORE).
    #[serde(default)]
    pub max_core_size: Option<u64>,

    /// Maximum file size in bytes (RLIMIT_FSIZE).
    #[serde(default)]
    pub max_file_size: Option<u64>,
}
