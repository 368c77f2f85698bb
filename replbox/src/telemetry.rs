//! Tracing bootstrap.
//!
//! Optional: embedders that already install a subscriber skip this and
//! the runtime's spans flow into theirs. Nothing in the library
//! installs a subscriber on its own.

use replbox_shared::constants::{defaults, envs};
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber with the level floor from `LOG_LEVEL`.
///
/// No-op if a global subscriber is already set.
pub fn init() {
    let level =
        std::env::var(envs::LOG_LEVEL).unwrap_or_else(|_| defaults::LOG_LEVEL.to_string());
    let filter =
        EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new(defaults::LOG_LEVEL));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
