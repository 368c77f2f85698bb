//! Session-oriented façade over the box manager.
//!
//! This is the API boundary of the runtime: the HTTP layer talks only
//! to [`SandboxService`]. In this model the session identifier *is*
//! the box identifier.

use crate::manager::BoxManager;
use crate::runtime::options::SandboxOptions;
use crate::runtime::types::{BoxID, SnapshotID};
use replbox_shared::errors::ReplboxResult;
use std::future::Future;
use std::time::Duration;

pub struct SandboxService {
    manager: BoxManager,
}

impl SandboxService {
    pub fn new(options: SandboxOptions) -> Self {
        Self {
            manager: BoxManager::new(options),
        }
    }

    /// Start prewarming; returns immediately.
    pub async fn init(&self) {
        self.manager.init().await;
    }

    /// Access to the underlying manager (listings, counters).
    pub fn manager(&self) -> &BoxManager {
        &self.manager
    }

    /// Create a session backed by a started box.
    pub async fn create_session(&self) -> ReplboxResult<BoxID> {
        self.manager.acquire_box().await
    }

    /// Execute code in the session's box with the default deadline.
    pub async fn exec_code(&self, box_id: &str, code: &str) -> ReplboxResult<(String, String)> {
        self.exec_code_with_timeout(box_id, code, self.manager.options().exec_timeout)
            .await
    }

    /// Execute code with an explicit deadline.
    pub async fn exec_code_with_timeout(
        &self,
        box_id: &str,
        code: &str,
        timeout: Duration,
    ) -> ReplboxResult<(String, String)> {
        let process = self.manager.get_process(box_id)?;
        process.execute(code, timeout).await
    }

    pub async fn install_packages(&self, box_id: &str, packages: &[String]) -> ReplboxResult<()> {
        self.manager.install_packages(box_id, packages).await
    }

    /// Hibernate the session's box; returns the snapshot id.
    pub async fn snapshot(&self, box_id: &str) -> ReplboxResult<SnapshotID> {
        self.manager.snapshot_box(box_id).await
    }

    /// Revive a box from a snapshot under the given id.
    pub async fn restore(&self, box_id: &BoxID, snapshot_id: &SnapshotID) -> ReplboxResult<()> {
        self.manager.restore_box(box_id, snapshot_id).await
    }

    pub async fn destroy(&self, box_id: &str) -> ReplboxResult<()> {
        self.manager.destroy_box(box_id).await
    }

    /// Stop every box; used at service shutdown.
    pub async fn shutdown(&self) -> ReplboxResult<()> {
        self.manager.shutdown().await
    }

    /// Run `f` against a fresh session and destroy it on every exit
    /// path, normal or error. The canonical one-shot usage pattern.
    pub async fn with_session<T, F, Fut>(&self, f: F) -> ReplboxResult<T>
    where
        F: FnOnce(BoxID) -> Fut,
        Fut: Future<Output = ReplboxResult<T>>,
    {
        let box_id = self.create_session().await?;
        let result = f(box_id.clone()).await;
        if let Err(e) = self.destroy(box_id.as_str()).await {
            tracing::warn!(box_id = %box_id, error = %e, "scoped session destroy failed");
        }
        result
    }
}
