//! Per-box health monitor.
//!
//! The startup hook inside the child takes an exclusive advisory lock
//! on `<tmp>/_l0ckfi1e` for the child's whole lifetime. The monitor
//! probes that lock: if the file is gone, or the lock can be acquired
//! from here, the child is no longer holding it and is declared dead.
//!
//! On a dead verdict the monitor clears the liveness flag and cached
//! pid, then stops. It never restarts the child - that is a manager
//! decision.

use crate::runtime::types::{BoxID, BoxState};
use parking_lot::RwLock;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Verdict of one lock-file probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Liveness {
    /// The child still holds its exclusive lock.
    Alive,
    /// The lock file is missing or no longer locked.
    Dead,
}

/// Probe the advisory lock once.
///
/// - file missing → `Dead`
/// - exclusive non-blocking flock acquired here → `Dead` (the child
///   lost or never took its lock; ours is released immediately)
/// - flock denied with EWOULDBLOCK → `Alive`
/// - any other OS error is propagated
pub(crate) fn probe_lock_file(path: &Path) -> io::Result<Liveness> {
    let file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Liveness::Dead),
        Err(e) => return Err(e),
    };

    use std::os::unix::io::AsRawFd;
    let fd = file.as_raw_fd();
    let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };

    if result == 0 {
        unsafe {
            libc::flock(fd, libc::LOCK_UN);
        }
        return Ok(Liveness::Dead);
    }

    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::WouldBlock {
        Ok(Liveness::Alive)
    } else {
        Err(err)
    }
}

/// Handles to the process state the monitor may clear on death.
pub(crate) struct MonitorState {
    pub(crate) alive: Arc<AtomicBool>,
    pub(crate) pid: Arc<RwLock<Option<u32>>>,
    pub(crate) state: Arc<RwLock<BoxState>>,
}

/// Spawn the background monitor task for one box.
///
/// Probes first after `warmup` (letting the startup hook create the
/// lock file), then every `interval`. The task runs the blocking probe
/// off the scheduler.
pub(crate) fn spawn_monitor(
    box_id: BoxID,
    lock_path: PathBuf,
    warmup: Duration,
    interval: Duration,
    shared: MonitorState,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(warmup).await;

        loop {
            let path = lock_path.clone();
            let verdict = tokio::task::spawn_blocking(move || probe_lock_file(&path)).await;

            match verdict {
                Ok(Ok(Liveness::Alive)) => {}
                Ok(Ok(Liveness::Dead)) => {
                    tracing::warn!(box_id = %box_id, "lock probe failed, declaring box dead");
                    shared.alive.store(false, Ordering::SeqCst);
                    *shared.pid.write() = None;
                    let mut state = shared.state.write();
                    if state.can_transition_to(BoxState::Stopped) {
                        *state = BoxState::Stopped;
                    }
                    break;
                }
                Ok(Err(e)) => {
                    tracing::error!(box_id = %box_id, error = %e, "health probe error");
                    break;
                }
                Err(e) => {
                    tracing::error!(box_id = %box_id, error = %e, "health probe task failed");
                    break;
                }
            }

            tokio::time::sleep(interval).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::AsRawFd;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_dead() {
        let dir = TempDir::new().unwrap();
        let verdict = probe_lock_file(&dir.path().join("_l0ckfi1e")).unwrap();
        assert_eq!(verdict, Liveness::Dead);
    }

    #[test]
    fn unlocked_file_is_dead() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("_l0ckfi1e");
        std::fs::write(&path, b"12345").unwrap();

        let verdict = probe_lock_file(&path).unwrap();
        assert_eq!(verdict, Liveness::Dead);
    }

    #[test]
    fn held_lock_is_alive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("_l0ckfi1e");
        let holder = std::fs::File::create(&path).unwrap();

        // flock state attaches to the open file description, so a lock
        // taken on this descriptor conflicts with the probe's separate
        // open of the same file, exactly like the child's lock does.
        let rc = unsafe { libc::flock(holder.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        assert_eq!(rc, 0);

        let verdict = probe_lock_file(&path).unwrap();
        assert_eq!(verdict, Liveness::Alive);
    }

    #[test]
    fn probe_does_not_steal_the_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("_l0ckfi1e");
        std::fs::write(&path, b"").unwrap();

        // A dead verdict acquires and releases; a second probe must
        // still be able to take the lock.
        assert_eq!(probe_lock_file(&path).unwrap(), Liveness::Dead);
        assert_eq!(probe_lock_file(&path).unwrap(), Liveness::Dead);
    }
}
