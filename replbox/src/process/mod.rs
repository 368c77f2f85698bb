//! Box process driver.
//!
//! One [`BoxProcess`] drives one interactive interpreter child over
//! pipes: code goes in on stdin, output is framed by single-use
//! completion markers on stdout, error text arrives on stderr. A
//! background monitor probes the child's advisory lock file for
//! liveness.
//!
//! The per-box async mutex around the child's pipes serializes
//! `execute`, the internal quick-execute helper, and `stop`. The
//! monitor never takes that mutex; on a dead verdict it only performs
//! atomic clears of the liveness flag and cached pid.

pub(crate) mod monitor;
pub(crate) mod sanitize;
pub(crate) mod spawn;
pub mod startup;

use crate::runtime::layout::BoxLayout;
use crate::runtime::options::SandboxOptions;
use crate::runtime::types::{BoxID, BoxInfo, BoxState};
use chrono::{DateTime, Utc};
use replbox_shared::constants::timeouts;
use replbox_shared::constants::exec as exec_const;
use replbox_shared::errors::{ReplboxError, ReplboxResult};
use sanitize::Marker;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Pipes and handle of a live child.
struct ChildIo {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    stderr: ChildStderr,
}

/// Driver around one interpreter child process.
pub struct BoxProcess {
    id: BoxID,
    layout: BoxLayout,
    options: Arc<SandboxOptions>,
    created_at: DateTime<Utc>,

    /// The per-box mutex. `None` means no child is attached.
    io: tokio::sync::Mutex<Option<ChildIo>>,

    /// Liveness flag, cleared by the monitor or by stop/pipe failures.
    alive: Arc<AtomicBool>,

    /// Cached child pid for info/listing without taking the op mutex.
    pid: Arc<parking_lot::RwLock<Option<u32>>>,

    state: Arc<parking_lot::RwLock<BoxState>>,

    monitor: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for BoxProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxProcess").field("id", &self.id).finish()
    }
}

impl BoxProcess {
    pub fn new(id: BoxID, layout: BoxLayout, options: Arc<SandboxOptions>) -> Self {
        Self {
            id,
            layout,
            options,
            created_at: Utc::now(),
            io: tokio::sync::Mutex::new(None),
            alive: Arc::new(AtomicBool::new(false)),
            pid: Arc::new(parking_lot::RwLock::new(None)),
            state: Arc::new(parking_lot::RwLock::new(BoxState::Starting)),
            monitor: parking_lot::Mutex::new(None),
        }
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn id(&self) -> &BoxID {
        &self.id
    }

    pub fn layout(&self) -> &BoxLayout {
        &self.layout
    }

    pub fn state(&self) -> BoxState {
        *self.state.read()
    }

    pub fn pid(&self) -> Option<u32> {
        *self.pid.read()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn info(&self) -> BoxInfo {
        BoxInfo {
            id: self.id.clone(),
            state: self.state(),
            created_at: self.created_at,
            pid: self.pid(),
            root_path: self.layout.root().to_path_buf(),
        }
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Spawn the child and start its health monitor.
    ///
    /// Idempotent while a live child is attached.
    pub async fn start(&self) -> ReplboxResult<()> {
        let mut guard = self.io.lock().await;
        if guard.is_some() && self.is_alive() {
            return Ok(());
        }

        let mut child = spawn::build_command(&self.options, &self.layout)
            .spawn()
            .map_err(|e| {
                ReplboxError::Internal(format!("failed to spawn child for box {}: {}", self.id, e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReplboxError::Internal("child stdin not piped".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ReplboxError::Internal("child stdout not piped".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReplboxError::Internal("child stderr not piped".into()))?;

        let pid = child.id();
        *self.pid.write() = pid;
        self.alive.store(true, Ordering::SeqCst);
        self.transition_to(BoxState::Running);

        tracing::info!(box_id = %self.id, pid = ?pid, "box child started");

        let handle = monitor::spawn_monitor(
            self.id.clone(),
            self.layout.lock_file_path(),
            timeouts::MONITOR_WARMUP,
            self.options.health_check_interval,
            monitor::MonitorState {
                alive: Arc::clone(&self.alive),
                pid: Arc::clone(&self.pid),
                state: Arc::clone(&self.state),
            },
        );
        if let Some(old) = self.monitor.lock().replace(handle) {
            old.abort();
        }

        *guard = Some(ChildIo {
            child,
            stdin,
            stdout,
            stderr,
        });
        Ok(())
    }

    /// Execute code in the child and collect its output.
    ///
    /// Returns the `(stdout, stderr)` produced by this call: residual
    /// output from earlier calls is drained first, and the completion
    /// marker plus everything after it is stripped from stdout.
    pub async fn execute(
        &self,
        code: &str,
        timeout: Duration,
    ) -> ReplboxResult<(String, String)> {
        let mut guard = self.io.lock().await;

        if !self.is_alive() {
            // Drop the dead child handle, if any; the registry entry
            // stays - reaping the tree is the manager's job.
            guard.take();
            return Err(ReplboxError::NotRunning(self.id.to_string()));
        }
        let io = guard
            .as_mut()
            .ok_or_else(|| ReplboxError::NotRunning(self.id.to_string()))?;

        self.transition_to(BoxState::Executing);
        let result = self.exchange(io, code, timeout).await;

        match &result {
            Err(ReplboxError::PipeBroken(_)) => {
                // The child is gone; clear the handle so later calls
                // fail fast with NotRunning.
                self.note_dead();
                guard.take();
            }
            _ => {
                // A monitor-detected death mid-execution has already
                // forced Stopped; otherwise the box goes back to idle.
                if self.is_alive() {
                    self.transition_to(BoxState::Running);
                }
            }
        }

        result
    }

    /// One request/response exchange with the child.
    async fn exchange(
        &self,
        io: &mut ChildIo,
        code: &str,
        timeout: Duration,
    ) -> ReplboxResult<(String, String)> {
        let marker = Marker::fresh();
        let payload = sanitize::build_payload(code, &marker);

        drain_streams(io, timeouts::DRAIN).await;

        write_stdin(io, payload.as_bytes()).await?;

        let deadline = Instant::now() + timeout;
        let mut stdout_buf: Vec<u8> = Vec::new();
        let mut stderr_buf: Vec<u8> = Vec::new();
        let mut out_chunk = [0u8; exec_const::READ_CHUNK];
        let mut err_chunk = [0u8; exec_const::READ_CHUNK];
        let mut stderr_open = true;

        loop {
            if marker.find_in(&stdout_buf).is_some() {
                break;
            }

            tokio::select! {
                read = io.stdout.read(&mut out_chunk) => match read {
                    Ok(0) => {
                        // stdout EOF: the child is gone. Reap it for
                        // the exit status.
                        return Err(self.child_died(io, &stderr_buf).await);
                    }
                    Ok(n) => stdout_buf.extend_from_slice(&out_chunk[..n]),
                    Err(e) => {
                        return Err(ReplboxError::PipeBroken(format!(
                            "stdout read failed: {}",
                            e
                        )));
                    }
                },
                read = io.stderr.read(&mut err_chunk), if stderr_open => match read {
                    Ok(0) => stderr_open = false,
                    Ok(n) => stderr_buf.extend_from_slice(&err_chunk[..n]),
                    Err(e) => {
                        return Err(ReplboxError::PipeBroken(format!(
                            "stderr read failed: {}",
                            e
                        )));
                    }
                },
                status = io.child.wait() => {
                    let detail = match status {
                        Ok(status) => format!("exited with {}", status),
                        Err(e) => format!("wait failed: {}", e),
                    };
                    tracing::warn!(box_id = %self.id, detail = %detail, "child died mid-execution");
                    self.note_dead();
                    return Err(ReplboxError::PipeBroken(format!(
                        "child {} before completion{}",
                        detail,
                        stderr_snippet(&stderr_buf)
                    )));
                }
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(
                        box_id = %self.id,
                        timeout_secs = timeout.as_secs_f64(),
                        "execution timed out"
                    );
                    return Err(ReplboxError::Timeout(timeout));
                }
            }
        }

        // Pick up error text already in flight before returning.
        if stderr_open {
            drain_stderr_tail(io, &mut stderr_buf, timeouts::STDERR_TAIL).await;
        }

        let stdout = sanitize::strip_marker(&stdout_buf, &marker);
        Ok((
            String::from_utf8_lossy(&stdout).into_owned(),
            String::from_utf8_lossy(&stderr_buf).into_owned(),
        ))
    }

    /// Lightweight execution for internal commands (`exit()`, nudges).
    ///
    /// No marker framing: writes the line, drains whatever comes back,
    /// and reports whether the write went through.
    pub(crate) async fn quick_execute(&self, code: &str, timeout: Duration) -> bool {
        let mut guard = self.io.lock().await;
        let Some(io) = guard.as_mut() else {
            return false;
        };
        if !self.is_alive() {
            return false;
        }

        let line = format!("{}\n", code);
        if write_stdin(io, line.as_bytes()).await.is_err() {
            return false;
        }
        drain_streams(io, timeout.min(timeouts::DRAIN)).await;
        true
    }

    /// Stop the child: graceful `exit()`, then terminate, then kill.
    pub async fn stop(&self) -> ReplboxResult<()> {
        self.transition_to(BoxState::Stopping);

        // Cancel the monitor and observe its completion before tearing
        // the process down.
        let monitor = self.monitor.lock().take();
        if let Some(handle) = monitor {
            handle.abort();
            let _ = handle.await;
        }

        // Best-effort graceful close.
        self.quick_execute("exit()", timeouts::QUICK_EXEC).await;

        let mut guard = self.io.lock().await;
        let Some(mut io) = guard.take() else {
            self.note_dead();
            return Ok(());
        };

        let exited = tokio::time::timeout(timeouts::QUICK_EXEC, io.child.wait())
            .await
            .is_ok();

        if !exited {
            if let Some(pid) = io.child.id() {
                crate::util::terminate_process(pid);
            }
            let exited = tokio::time::timeout(timeouts::TERMINATE_WAIT, io.child.wait())
                .await
                .is_ok();

            if !exited {
                tracing::warn!(box_id = %self.id, "terminate timed out, killing");
                if let Some(pid) = io.child.id() {
                    crate::util::kill_process(pid);
                }
                if tokio::time::timeout(timeouts::KILL_WAIT, io.child.wait())
                    .await
                    .is_err()
                {
                    tracing::error!(box_id = %self.id, "child survived kill signal");
                }
            }
        }

        self.note_dead();
        tracing::info!(box_id = %self.id, "box stopped");
        Ok(())
    }

    /// Attempt a validated state transition.
    ///
    /// No-op when already in the target state; invalid transitions are
    /// rejected and logged. Terminal marks for crash and teardown go
    /// through [`Self::note_dead`] instead.
    fn transition_to(&self, next: BoxState) -> bool {
        let mut state = self.state.write();
        if *state == next {
            return true;
        }
        if !state.can_transition_to(next) {
            tracing::warn!(
                box_id = %self.id,
                from = ?*state,
                to = ?next,
                "invalid state transition rejected"
            );
            return false;
        }
        *state = next;
        true
    }

    /// Force the terminal state without validation, clearing liveness
    /// and pid. Used when the child is known dead (crash, pipe failure)
    /// and at the end of stop.
    fn note_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
        *self.pid.write() = None;
        *self.state.write() = BoxState::Stopped;
    }

    /// Reap a child whose stdout hit EOF and build the pipe error.
    async fn child_died(&self, io: &mut ChildIo, stderr_buf: &[u8]) -> ReplboxError {
        let detail = match tokio::time::timeout(timeouts::KILL_WAIT, io.child.wait()).await {
            Ok(Ok(status)) => format!("exited with {}", status),
            Ok(Err(e)) => format!("wait failed: {}", e),
            Err(_) => "closed its pipes".to_string(),
        };
        tracing::warn!(box_id = %self.id, detail = %detail, "child died mid-execution");
        self.note_dead();
        ReplboxError::PipeBroken(format!(
            "child {} before completion{}",
            detail,
            stderr_snippet(stderr_buf)
        ))
    }
}

// ============================================================================
// PIPE HELPERS
// ============================================================================

/// Write a payload to the child's stdin with a bounded deadline.
async fn write_stdin(io: &mut ChildIo, payload: &[u8]) -> ReplboxResult<()> {
    let write = async {
        io.stdin.write_all(payload).await?;
        io.stdin.flush().await
    };
    match tokio::time::timeout(timeouts::STDIN_WRITE, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ReplboxError::PipeBroken(format!(
            "stdin write failed: {}",
            e
        ))),
        Err(_) => Err(ReplboxError::PipeBroken("stdin write timed out".into())),
    }
}

/// Discard residual output on both streams.
///
/// Stops at the first empty poll, bounded overall by `limit`; transient
/// read errors are swallowed and logged.
async fn drain_streams(io: &mut ChildIo, limit: Duration) {
    let deadline = Instant::now() + limit;
    let mut chunk = [0u8; exec_const::READ_CHUNK];

    loop {
        let mut drained = false;

        match tokio::time::timeout(timeouts::DRAIN_POLL, io.stdout.read(&mut chunk)).await {
            Ok(Ok(n)) if n > 0 => drained = true,
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "stdout drain error"),
            Err(_) => {}
        }
        match tokio::time::timeout(timeouts::DRAIN_POLL, io.stderr.read(&mut chunk)).await {
            Ok(Ok(n)) if n > 0 => drained = true,
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "stderr drain error"),
            Err(_) => {}
        }

        if !drained || Instant::now() >= deadline {
            break;
        }
    }
}

/// Collect stderr still in flight after the completion marker was seen.
async fn drain_stderr_tail(io: &mut ChildIo, stderr_buf: &mut Vec<u8>, limit: Duration) {
    let deadline = Instant::now() + limit;
    let mut chunk = [0u8; exec_const::READ_CHUNK];

    while Instant::now() < deadline {
        match tokio::time::timeout(timeouts::DRAIN_POLL, io.stderr.read(&mut chunk)).await {
            Ok(Ok(n)) if n > 0 => stderr_buf.extend_from_slice(&chunk[..n]),
            _ => break,
        }
    }
}

/// Short stderr excerpt for error messages.
fn stderr_snippet(buf: &[u8]) -> String {
    let text = String::from_utf8_lossy(buf);
    let text = text.trim();
    if text.is_empty() {
        return String::new();
    }
    let excerpt: String = text.chars().take(256).collect();
    format!(": {}", excerpt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::layout::SandboxLayout;

    fn proc() -> BoxProcess {
        let options = Arc::new(SandboxOptions {
            root_dir: std::env::temp_dir(),
            ..Default::default()
        });
        let id = BoxID::new();
        let layout = SandboxLayout::new(&options).box_layout(&id);
        BoxProcess::new(id, layout, options)
    }

    #[tokio::test]
    async fn fresh_process_is_not_running() {
        let p = proc();
        assert!(!p.is_alive());
        assert_eq!(p.state(), BoxState::Starting);
        assert_eq!(p.pid(), None);

        let err = p.execute("pass", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ReplboxError::NotRunning(_)));
    }

    #[tokio::test]
    async fn quick_execute_without_child_is_false() {
        let p = proc();
        assert!(!p.quick_execute("None", Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn stop_without_child_is_idempotent() {
        let p = proc();
        p.stop().await.unwrap();
        p.stop().await.unwrap();
        assert_eq!(p.state(), BoxState::Stopped);
    }

    #[test]
    fn info_reflects_identity_and_tree() {
        let p = proc();
        let info = p.info();
        assert_eq!(info.id, *p.id());
        assert_eq!(info.root_path, p.layout().root());
        assert_eq!(info.state, BoxState::Starting);
    }

    #[test]
    fn stderr_snippet_truncates() {
        assert_eq!(stderr_snippet(b""), "");
        assert_eq!(stderr_snippet(b"  boom \n"), ": boom");
        let long = vec![b'x'; 1000];
        assert_eq!(stderr_snippet(&long).len(), 2 + 256);
    }
}
