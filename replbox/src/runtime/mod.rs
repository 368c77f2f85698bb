//! Runtime configuration, layout, and core types.

pub mod layout;
pub mod options;
pub mod types;

pub use layout::{BoxLayout, SandboxLayout};
pub use options::{ResourceLimits, SandboxOptions};
pub use types::{BoxID, BoxInfo, BoxState, SnapshotID};
