//! Replbox - a sandbox runtime for stateful REPL code execution.
//!
//! The runtime maintains a pool of isolated, long-lived interpreter
//! children ("boxes"), each running under a reduced-privilege user
//! inside a dedicated filesystem tree. Sessions are stateful: code
//! executed in a box sees the side effects of earlier executions in
//! the same box.
//!
//! # Architecture
//!
//! - [`process::BoxProcess`] drives one interpreter child: spawn,
//!   marker-framed execution over pipes, lock-file health monitoring,
//!   graceful stop.
//! - [`manager::BoxManager`] owns the registry of live boxes, the
//!   prewarm pool, filesystem setup/teardown, package installs, and
//!   snapshot/restore.
//! - [`service::SandboxService`] is the thin session façade consumed
//!   by the API layer.
//!
//! # Example
//!
//! ```no_run
//! use replbox::{SandboxOptions, SandboxService};
//!
//! # async fn run() -> replbox::ReplboxResult<()> {
//! let service = SandboxService::new(SandboxOptions::default());
//! service.init().await;
//!
//! let svc = &service;
//! let (stdout, _stderr) = svc
//!     .with_session(|box_id| async move {
//!         svc.exec_code(box_id.as_str(), "x = 41\nprint(x + 1)").await
//!     })
//!     .await?;
//! assert_eq!(stdout.trim(), "42");
//! # Ok(())
//! # }
//! ```

pub mod manager;
pub mod process;
pub mod runtime;
pub mod service;
pub mod telemetry;
pub mod util;

pub use manager::BoxManager;
pub use process::BoxProcess;
pub use runtime::options::{ResourceLimits, SandboxOptions};
pub use runtime::types::{BoxID, BoxInfo, BoxState, SnapshotID};
pub use service::SandboxService;

pub use replbox_shared::{ReplboxError, ReplboxResult};
