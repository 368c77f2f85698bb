//! Replbox shared - code common to the sandbox runtime and future
//! host-side components (HTTP layer, accounting).
//!
//! This crate contains the error type and the constants that define the
//! on-disk and wire-visible contracts of the sandbox service.

pub mod constants;
pub mod errors;

pub use errors::{ReplboxError, ReplboxResult};
