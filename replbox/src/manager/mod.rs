//! Thread-safe box manager.
//!
//! Owns the set of live [`BoxProcess`]es keyed by box id, creates and
//! tears down their filesystem trees, maintains the prewarm pool, and
//! drives package installs, snapshots, and restores.

pub(crate) mod dirs;
pub(crate) mod install;
pub(crate) mod snapshot;

use crate::process::BoxProcess;
use crate::runtime::layout::SandboxLayout;
use crate::runtime::options::SandboxOptions;
use crate::runtime::types::{BoxID, BoxInfo, SnapshotID};
use replbox_shared::errors::{ReplboxError, ReplboxResult};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

/// Manager for the live boxes of one service instance.
///
/// Cloneable via `Arc`; the registry uses `RwLock` for concurrent
/// lookups (exec routing) with exclusive writes (register/remove).
/// Exec calls only hold the registry lock long enough to clone the
/// process handle - concurrency across boxes is unrestricted.
#[derive(Clone)]
pub struct BoxManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    options: Arc<SandboxOptions>,
    layout: SandboxLayout,
    registry: RwLock<HashMap<BoxID, Arc<BoxProcess>>>,
    /// FIFO of started, idle, unclaimed boxes.
    available: Mutex<VecDeque<BoxID>>,
}

impl BoxManager {
    pub fn new(options: SandboxOptions) -> Self {
        let layout = SandboxLayout::new(&options);
        Self {
            inner: Arc::new(ManagerInner {
                options: Arc::new(options),
                layout,
                registry: RwLock::new(HashMap::new()),
                available: Mutex::new(VecDeque::new()),
            }),
        }
    }

    pub fn options(&self) -> &SandboxOptions {
        &self.inner.options
    }

    pub fn layout(&self) -> &SandboxLayout {
        &self.inner.layout
    }

    // ========================================================================
    // PREWARM POOL
    // ========================================================================

    /// Kick off prewarming. Returns immediately; boxes fill the pool in
    /// the background.
    pub async fn init(&self) {
        for _ in 0..self.inner.options.prewarm_count {
            let manager = self.clone();
            tokio::spawn(async move { manager.do_prewarm().await });
        }
    }

    /// Top the pool up by one box. Opportunistic: failures are logged,
    /// never propagated.
    async fn do_prewarm(&self) {
        match self.prewarmed() {
            Ok(n) if n >= self.inner.options.prewarm_count => return,
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "prewarm queue unavailable");
                return;
            }
        }

        match self.start_box().await {
            Ok(box_id) => {
                if let Ok(mut queue) = self.inner.available.lock() {
                    tracing::debug!(box_id = %box_id, "box prewarmed");
                    queue.push_back(box_id);
                }
            }
            Err(e) => tracing::error!(error = %e, "prewarm failed"),
        }
    }

    /// Hand out a started box: a prewarmed one when available (topping
    /// the pool back up in the background), a fresh one otherwise.
    pub async fn acquire_box(&self) -> ReplboxResult<BoxID> {
        while let Some(box_id) = self.pop_available()? {
            // A box can be destroyed while parked in the queue; skip
            // ids that no longer resolve.
            if self.get_process(box_id.as_str()).is_ok() {
                if self.inner.options.prewarm_count > 0 {
                    let manager = self.clone();
                    tokio::spawn(async move { manager.do_prewarm().await });
                }
                return Ok(box_id);
            }
        }
        self.start_box().await
    }

    fn pop_available(&self) -> ReplboxResult<Option<BoxID>> {
        let mut queue = self
            .inner
            .available
            .lock()
            .map_err(|e| ReplboxError::Internal(format!("prewarm queue poisoned: {}", e)))?;
        Ok(queue.pop_front())
    }

    /// Number of idle boxes parked in the prewarm queue.
    pub fn prewarmed(&self) -> ReplboxResult<usize> {
        let queue = self
            .inner
            .available
            .lock()
            .map_err(|e| ReplboxError::Internal(format!("prewarm queue poisoned: {}", e)))?;
        Ok(queue.len())
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Allocate an id, create the box tree, spawn the child, and
    /// register the box.
    pub async fn start_box(&self) -> ReplboxResult<BoxID> {
        let box_id = BoxID::new();
        let layout = self.inner.layout.box_layout(&box_id);

        dirs::create_box_tree(&layout, self.inner.options.sandbox_user.as_deref()).await?;

        let process = Arc::new(BoxProcess::new(
            box_id.clone(),
            layout.clone(),
            Arc::clone(&self.inner.options),
        ));
        self.register(Arc::clone(&process))?;

        if let Err(e) = process.start().await {
            // Unwind the partial box: registry entry and tree.
            let _ = self.unregister(box_id.as_str());
            dirs::remove_tree(layout.root().to_path_buf()).await;
            return Err(e);
        }

        tracing::info!(box_id = %box_id, pid = ?process.pid(), "box started");
        Ok(box_id)
    }

    /// Install packages into the box's lib/ directory.
    pub async fn install_packages(&self, box_id: &str, packages: &[String]) -> ReplboxResult<()> {
        if packages.is_empty() {
            return Err(ReplboxError::InvalidRequest("no packages to install".into()));
        }
        let process = self.get_process(box_id)?;
        install::validate_packages(packages)?;
        install::run_installer(
            &self.inner.options,
            &process.layout().lib_dir(),
            packages,
        )
        .await
    }

    /// Hibernate a box: stop the child and persist its tree as
    /// snapshot artifacts. The box leaves the registry.
    pub async fn snapshot_box(&self, box_id: &str) -> ReplboxResult<SnapshotID> {
        let process = self.get_process(box_id)?;
        process.stop().await?;
        self.unregister(box_id)?;
        self.remove_from_queue(box_id)?;

        let snapshot_id = SnapshotID::new();
        snapshot::persist(
            process.layout().root().to_path_buf(),
            self.inner.layout.snapshot_dir(&snapshot_id),
        )
        .await?;

        tracing::info!(box_id = %box_id, snapshot_id = %snapshot_id, "box snapshotted");
        Ok(snapshot_id)
    }

    /// Materialize a snapshot into a fresh box tree and start a new
    /// child for it under the given id.
    pub async fn restore_box(&self, box_id: &BoxID, snapshot_id: &SnapshotID) -> ReplboxResult<()> {
        if self.get_process(box_id.as_str()).is_ok() {
            return Err(ReplboxError::InvalidRequest(format!(
                "box {} is still registered; destroy it before restore",
                box_id
            )));
        }

        let layout = self.inner.layout.box_layout(box_id);
        // Ownership is applied only after the artifacts land: the copy
        // writes files as the runtime's user, and every path in the
        // tree must end up owned by the sandbox user.
        dirs::create_box_tree(&layout, None).await?;
        snapshot::materialize(
            self.inner.layout.snapshot_dir(snapshot_id),
            layout.root().to_path_buf(),
        )
        .await?;
        dirs::chown_box_tree(&layout, self.inner.options.sandbox_user.as_deref()).await?;

        let process = Arc::new(BoxProcess::new(
            box_id.clone(),
            layout.clone(),
            Arc::clone(&self.inner.options),
        ));
        self.register(Arc::clone(&process))?;

        if let Err(e) = process.start().await {
            let _ = self.unregister(box_id.as_str());
            dirs::remove_tree(layout.root().to_path_buf()).await;
            return Err(e);
        }

        tracing::info!(box_id = %box_id, snapshot_id = %snapshot_id, "box restored");
        Ok(())
    }

    /// Tear a box down: stop the child, drop the registry entry, and
    /// remove its tree and snapshot scratch. Idempotent; filesystem
    /// cleanup is best-effort.
    pub async fn destroy_box(&self, box_id: &str) -> ReplboxResult<()> {
        let process = self.unregister(box_id)?;
        self.remove_from_queue(box_id)?;

        if let Some(process) = &process {
            if let Err(e) = process.stop().await {
                tracing::warn!(box_id = %box_id, error = %e, "stop during destroy failed");
            }
        }

        let root = match &process {
            Some(process) => Some(process.layout().root().to_path_buf()),
            None => BoxID::parse(box_id)
                .map(|id| self.inner.layout.box_layout(&id).root().to_path_buf()),
        };
        if let Some(root) = root {
            dirs::remove_tree(root).await;
        }
        if let Some(id) = BoxID::parse(box_id) {
            dirs::remove_tree(self.inner.layout.box_snapshot_dir(&id)).await;
        }

        tracing::info!(box_id = %box_id, "box destroyed");
        Ok(())
    }

    /// Graceful teardown of every box, with bounded per-box deadlines.
    ///
    /// Dropping the manager never kills children implicitly; callers
    /// own the shutdown.
    pub async fn shutdown(&self) -> ReplboxResult<()> {
        let processes: Vec<Arc<BoxProcess>> = {
            let mut registry = self
                .inner
                .registry
                .write()
                .map_err(|e| ReplboxError::Internal(format!("manager lock poisoned: {}", e)))?;
            registry.drain().map(|(_, process)| process).collect()
        };
        {
            let mut queue = self
                .inner
                .available
                .lock()
                .map_err(|e| ReplboxError::Internal(format!("prewarm queue poisoned: {}", e)))?;
            queue.clear();
        }

        for process in processes {
            if let Err(e) = process.stop().await {
                tracing::warn!(box_id = %process.id(), error = %e, "stop during shutdown failed");
            }
        }
        Ok(())
    }

    // ========================================================================
    // REGISTRY
    // ========================================================================

    /// Look up a live box, or `NotFound`.
    pub fn get_process(&self, box_id: &str) -> ReplboxResult<Arc<BoxProcess>> {
        let registry = self
            .inner
            .registry
            .read()
            .map_err(|e| ReplboxError::Internal(format!("manager lock poisoned: {}", e)))?;
        registry
            .get(box_id)
            .cloned()
            .ok_or_else(|| ReplboxError::NotFound(box_id.to_string()))
    }

    fn register(&self, process: Arc<BoxProcess>) -> ReplboxResult<()> {
        let mut registry = self
            .inner
            .registry
            .write()
            .map_err(|e| ReplboxError::Internal(format!("manager lock poisoned: {}", e)))?;
        if registry.contains_key(process.id()) {
            return Err(ReplboxError::Internal(format!(
                "box {} already registered",
                process.id()
            )));
        }
        registry.insert(process.id().clone(), process);
        Ok(())
    }

    fn unregister(&self, box_id: &str) -> ReplboxResult<Option<Arc<BoxProcess>>> {
        let mut registry = self
            .inner
            .registry
            .write()
            .map_err(|e| ReplboxError::Internal(format!("manager lock poisoned: {}", e)))?;
        Ok(registry.remove(box_id))
    }

    fn remove_from_queue(&self, box_id: &str) -> ReplboxResult<()> {
        let mut queue = self
            .inner
            .available
            .lock()
            .map_err(|e| ReplboxError::Internal(format!("prewarm queue poisoned: {}", e)))?;
        queue.retain(|id| id.as_str() != box_id);
        Ok(())
    }

    /// List all boxes, newest first.
    pub fn list(&self) -> ReplboxResult<Vec<BoxInfo>> {
        let registry = self
            .inner
            .registry
            .read()
            .map_err(|e| ReplboxError::Internal(format!("manager lock poisoned: {}", e)))?;

        let mut infos: Vec<BoxInfo> = registry.values().map(|p| p.info()).collect();
        infos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(infos)
    }

    /// Metadata for one box; `Ok(None)` if unknown.
    pub fn get_info(&self, box_id: &str) -> ReplboxResult<Option<BoxInfo>> {
        let registry = self
            .inner
            .registry
            .read()
            .map_err(|e| ReplboxError::Internal(format!("manager lock poisoned: {}", e)))?;
        Ok(registry.get(box_id).map(|p| p.info()))
    }

    /// Number of boxes being tracked.
    pub fn count(&self) -> ReplboxResult<usize> {
        let registry = self
            .inner
            .registry
            .read()
            .map_err(|e| ReplboxError::Internal(format!("manager lock poisoned: {}", e)))?;
        Ok(registry.len())
    }
}
