//! Constants for the Replbox runtime.
//!
//! Centralized location for the on-disk layout, environment variable
//! names, external tool argv pieces, and timing defaults. The runtime
//! controls all paths - nothing here is negotiated with the child
//! beyond the environment it is spawned with.

/// Environment variables recognized by the runtime.
pub mod envs {
    /// Base directory for all sandbox trees.
    pub const SANDBOX_ROOT: &str = "SANDBOX_ROOT";

    /// Per-box directory prefix under the root.
    pub const SANDBOX_PREFIX: &str = "SANDBOX_PREFIX";

    /// Read-only shared library directory, relative to the root.
    pub const SHARED_LIBS_PATH: &str = "SHARED_LIBS_PATH";

    /// Snapshot artifact root, relative to the sandbox root.
    pub const SNAPSHOT_DIR: &str = "SNAPSHOT_DIR";

    /// Observability floor for the tracing subscriber.
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
}

/// Defaults applied when the corresponding environment variable is unset.
pub mod defaults {
    pub const SANDBOX_ROOT: &str = "/sandboxes/";
    pub const SANDBOX_PREFIX: &str = "sandbox_";
    pub const SHARED_LIBS_DIR: &str = "shared_libs";
    pub const SNAPSHOT_DIR: &str = "snapshots";
    pub const LOG_LEVEL: &str = "info";

    /// Unprivileged user (and group) that owns every box tree and runs
    /// every child process.
    pub const SANDBOX_USER: &str = "sandboxed";
}

/// Per-box directory structure.
pub mod dirs {
    /// Working directory of the child; HOME inside the box.
    pub const WORK: &str = "work";

    /// Scratch space; TMPDIR inside the box, holds the lock file.
    pub const TMP: &str = "tmp";

    /// Package install target; on the interpreter's module search path.
    pub const LIB: &str = "lib";

    /// Per-box log output.
    pub const LOG: &str = "log";

    /// All subdirectories of a box root, creation order.
    pub const ALL: [&str; 4] = [WORK, TMP, LIB, LOG];

    /// Mode for the box root and every subdirectory: setgid, rwx for
    /// owner and group, nothing for others.
    pub const BOX_DIR_MODE: u32 = 0o2770;
}

/// File naming patterns inside a box tree.
pub mod filenames {
    /// Advisory-locked liveness file, created by the startup hook in tmp/.
    pub const LOCK_FILE: &str = "_l0ckfi1e";

    /// Materialized startup hook, read by the interpreter at spawn.
    pub const STARTUP_HOOK: &str = "_startup.py";
}

/// External tools the runtime composes (argv only, versions are a
/// deployment concern).
pub mod tools {
    /// Privilege-drop wrapper: `gosu <user> <cmd...>`.
    pub const PRIVILEGE_WRAPPER: &str = "gosu";

    /// Checkpoint launcher and its fixed flags: job-id mode, checkpoint
    /// signal 10, allow file overwrite, no compression.
    pub const CHECKPOINT_LAUNCHER: &str = "dmtcp_launch";
    pub const CHECKPOINT_ARGS: [&str; 5] =
        ["-j", "--ckpt-signal", "10", "--allow-file-overwrite", "--no-gzip"];

    /// Interpreter and its fixed flags: interactive, quiet, no site
    /// customization, unbuffered.
    pub const INTERPRETER: &str = "python3";
    pub const INTERPRETER_ARGS: [&str; 4] = ["-i", "-q", "-s", "-u"];

    /// Package installer invocation prefix; the lib target and package
    /// names are appended per call.
    pub const INSTALLER: &str = "uv";
    pub const INSTALLER_ARGS: [&str; 3] = ["pip", "install", "--no-deps"];

    /// Recursive ownership setter for freshly created box trees.
    pub const CHOWN: &str = "chown";

    /// Minimal PATH handed to children; no user customization.
    pub const CHILD_PATH: &str = "/usr/local/bin:/usr/local/sbin:/usr/sbin:/usr/bin:/sbin:/bin";
}

/// Timing defaults for the box process driver.
pub mod timeouts {
    use std::time::Duration;

    /// Outer deadline for user code execution.
    pub const EXEC: Duration = Duration::from_secs(200);

    /// Deadline for the residual-output drain before each execution.
    pub const DRAIN: Duration = Duration::from_millis(1000);

    /// Per-read poll inside a drain; the drain stops at the first empty poll.
    pub const DRAIN_POLL: Duration = Duration::from_millis(50);

    /// Trailing stderr drain after the completion marker is seen.
    pub const STDERR_TAIL: Duration = Duration::from_millis(200);

    /// Deadline for internal helper executions (exit(), health nudges).
    pub const QUICK_EXEC: Duration = Duration::from_secs(3);

    /// Deadline for writes to the child's stdin.
    pub const STDIN_WRITE: Duration = Duration::from_secs(5);

    /// Grace period after the terminate signal before the kill signal.
    pub const TERMINATE_WAIT: Duration = Duration::from_secs(5);

    /// Grace period after the kill signal before giving up.
    pub const KILL_WAIT: Duration = Duration::from_secs(2);

    /// Interval between health monitor probes.
    pub const HEALTH_INTERVAL: Duration = Duration::from_secs(10);

    /// Warmup before the first probe, so the startup hook can take its lock.
    pub const MONITOR_WARMUP: Duration = Duration::from_secs(5);
}

/// Execution protocol between the driver and the child.
pub mod exec {
    /// Completion marker shape: `__COMPLETE_<random>__`.
    pub const MARKER_PREFIX: &str = "__COMPLETE_";
    pub const MARKER_SUFFIX: &str = "__";

    /// Chunk size for pipe reads.
    pub const READ_CHUNK: usize = 1024;

    /// Replacement for loopback address literals in submitted code.
    pub const BLOCKED_ADDRESS: &str = "blocked_address";

    /// Address literals rewritten before submission. String-level
    /// discouragement only - not a security boundary.
    pub const BLOCKED_PATTERNS: [&str; 3] = ["localhost", "127.0.0.1", "0.0.0.0"];
}

/// Exit codes of the child's startup hook.
pub mod exit_codes {
    /// The lock file was already held by another process.
    pub const LOCK_CONTENTION: i32 = 100;

    /// Lock file creation or locking failed for another reason.
    pub const LOCK_SETUP_FAILED: i32 = 101;
}
