//! Process utilities for signalling and liveness checks.

/// Check if a process with the given PID exists.
///
/// Uses `libc::kill(pid, 0)` which sends a null signal to check
/// existence.
pub fn is_process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

/// Send the terminate signal to a process.
///
/// Returns `true` if the signal was delivered.
pub fn terminate_process(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, libc::SIGTERM) == 0 }
}

/// Kill a process with SIGKILL.
///
/// Returns `true` if the process was killed or no longer exists.
pub fn kill_process(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, libc::SIGKILL) == 0 || !is_process_alive(pid) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn nonexistent_pid_is_not_alive() {
        // Very high PIDs unlikely to exist. u32::MAX is avoided: it
        // becomes -1 when cast to i32, which has special meaning in kill().
        assert!(!is_process_alive(999_999_999));
    }

    #[test]
    fn killing_a_dead_pid_reports_success() {
        assert!(kill_process(999_999_999));
    }
}
