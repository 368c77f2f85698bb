//! Child process construction for box interpreters.
//!
//! The child is launched as a chain: privilege-drop wrapper →
//! checkpoint launcher → interpreter. The environment is set
//! explicitly, never inherited; the only paths the child sees are
//! inside its own box tree plus the read-only shared library
//! directory.

use crate::runtime::layout::BoxLayout;
use crate::runtime::options::{ResourceLimits, SandboxOptions};
use replbox_shared::constants::tools;
use std::ffi::OsString;
use std::process::Stdio;
use tokio::process::Command;

/// Build the full argv for a box child.
pub(crate) fn build_argv(options: &SandboxOptions) -> Vec<OsString> {
    let mut argv: Vec<OsString> = Vec::new();

    if let Some(user) = &options.sandbox_user {
        argv.push(tools::PRIVILEGE_WRAPPER.into());
        argv.push(user.into());
    }

    if options.checkpointing {
        argv.push(tools::CHECKPOINT_LAUNCHER.into());
        argv.extend(tools::CHECKPOINT_ARGS.iter().map(OsString::from));
    }

    argv.push(tools::INTERPRETER.into());
    argv.extend(tools::INTERPRETER_ARGS.iter().map(OsString::from));

    argv
}

/// Build the spawn command for a box child with piped stdio.
pub(crate) fn build_command(options: &SandboxOptions, layout: &BoxLayout) -> Command {
    let argv = build_argv(options);
    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..]);

    let work_dir = layout.work_dir();
    let lib_dir = layout.lib_dir();

    cmd.env_clear();
    cmd.env(
        "PYTHONPATH",
        format!(
            "{}:{}",
            lib_dir.display(),
            options.shared_libs_dir.display()
        ),
    );
    cmd.env("PYTHONUSERBASE", &lib_dir);
    cmd.env("HOME", &work_dir);
    cmd.env("TMPDIR", layout.tmp_dir());
    cmd.env("PYTHONSTARTUP", layout.startup_hook_path());
    cmd.env("PATH", tools::CHILD_PATH);

    cmd.current_dir(&work_dir);

    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    add_pre_exec_hook(&mut cmd, options.resource_limits);

    cmd
}

/// Resource type alias for cross-platform compatibility.
/// On Linux glibc, RLIMIT_* are u32; on macOS they're i32.
#[cfg(target_os = "linux")]
type RlimitResource = libc::__rlimit_resource_t;
#[cfg(not(target_os = "linux"))]
type RlimitResource = libc::c_int;

/// Add the pre-execution hook applying resource limits.
///
/// Runs after `fork()` but before the new program starts in the child.
/// The hook must stay async-signal-safe: only raw syscalls, no
/// allocation, no locking, no logging.
fn add_pre_exec_hook(cmd: &mut Command, limits: ResourceLimits) {
    // SAFETY: the hook only calls setrlimit(), which is async-signal-safe.
    unsafe {
        cmd.pre_exec(move || {
            apply_limits_raw(&limits).map_err(std::io::Error::from_raw_os_error)
        });
    }
}

/// Apply resource limits - async-signal-safe, for use in pre_exec only.
fn apply_limits_raw(limits: &ResourceLimits) -> Result<(), i32> {
    if let Some(max_mem) = limits.max_memory {
        set_rlimit_raw(libc::RLIMIT_AS, max_mem)?;
    }

    if let Some(max_files) = limits.max_open_files {
        set_rlimit_raw(libc::RLIMIT_NOFILE, max_files)?;
    }

    if let Some(max_cpu) = limits.max_cpu_time {
        set_rlimit_raw(libc::RLIMIT_CPU, max_cpu)?;
    }

    if let Some(max_core) = limits.max_core_size {
        set_rlimit_raw(libc::RLIMIT_CORE, max_core)?;
    }

    if let Some(max_fsize) = limits.max_file_size {
        set_rlimit_raw(libc::RLIMIT_FSIZE, max_fsize)?;
    }

    Ok(())
}

/// Set a specific resource limit - async-signal-safe version.
#[inline]
fn set_rlimit_raw(resource: RlimitResource, limit: u64) -> Result<(), i32> {
    let rlim = libc::rlimit {
        rlim_cur: limit as libc::rlim_t,
        rlim_max: limit as libc::rlim_t,
    };

    let result = unsafe { libc::setrlimit(resource, &rlim) };

    if result != 0 {
        return Err(std::io::Error::last_os_error()
            .raw_os_error()
            .unwrap_or(libc::EINVAL));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn options() -> SandboxOptions {
        SandboxOptions {
            root_dir: PathBuf::from("/sandboxes"),
            shared_libs_dir: PathBuf::from("/sandboxes/shared_libs"),
            ..Default::default()
        }
    }

    #[test]
    fn full_chain_wraps_the_interpreter() {
        let argv = build_argv(&options());
        let argv: Vec<&str> = argv.iter().map(|s| s.to_str().unwrap()).collect();
        assert_eq!(
            argv,
            vec![
                "gosu",
                "sandboxed",
                "dmtcp_launch",
                "-j",
                "--ckpt-signal",
                "10",
                "--allow-file-overwrite",
                "--no-gzip",
                "python3",
                "-i",
                "-q",
                "-s",
                "-u",
            ]
        );
    }

    #[test]
    fn chain_shrinks_without_wrapper_and_launcher() {
        let opts = SandboxOptions {
            sandbox_user: None,
            checkpointing: false,
            ..options()
        };
        let argv = build_argv(&opts);
        let argv: Vec<&str> = argv.iter().map(|s| s.to_str().unwrap()).collect();
        assert_eq!(argv, vec!["python3", "-i", "-q", "-s", "-u"]);
    }

    #[test]
    fn empty_limits_apply_cleanly() {
        apply_limits_raw(&ResourceLimits::default()).expect("empty limits should succeed");
    }
}
