//! Core data types for box lifecycle management.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// BOX ID
// ============================================================================

/// Box identifier (21-character URL-safe nanoid).
///
/// Collision-resistant: 21 characters over a 64-symbol alphabet
/// (`A-Za-z0-9_-`), the same shape handed out as session ids by the
/// HTTP layer.
///
/// # Example
///
/// ```
/// use replbox::runtime::types::BoxID;
///
/// let id = BoxID::new();
/// assert_eq!(id.as_str().len(), 21);
/// assert_eq!(id.short().len(), 8);
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoxID(String);

impl BoxID {
    /// Length of a full box ID.
    pub const FULL_LENGTH: usize = 21;

    /// Length of the short form for display.
    pub const SHORT_LENGTH: usize = 8;

    /// Generate a new random box ID.
    pub fn new() -> Self {
        Self(nanoid::nanoid!())
    }

    /// Parse a BoxID from an existing string.
    ///
    /// Returns `None` if the string is not a valid 21-char nanoid string.
    pub fn parse(s: &str) -> Option<Self> {
        if Self::is_valid(s) {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    /// Check if a string is a valid box ID format.
    pub fn is_valid(s: &str) -> bool {
        s.len() == Self::FULL_LENGTH
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }

    /// Get the full box ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the short form (first 8 characters) for display.
    pub fn short(&self) -> &str {
        &self.0[..Self::SHORT_LENGTH]
    }
}

impl Default for BoxID {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BoxID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for BoxID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoxID({})", self.short())
    }
}

impl AsRef<str> for BoxID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for BoxID {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// SNAPSHOT ID
// ============================================================================

/// Snapshot identifier (same nanoid shape as [`BoxID`]).
///
/// Addresses a directory of checkpoint artifacts under the snapshot
/// root. Opaque to the runtime - only the checkpoint tool interprets
/// the artifact contents.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotID(String);

impl SnapshotID {
    /// Generate a new random snapshot ID.
    pub fn new() -> Self {
        Self(nanoid::nanoid!())
    }

    /// Parse a SnapshotID from an existing string.
    pub fn parse(s: &str) -> Option<Self> {
        if BoxID::is_valid(s) {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    /// Get the full snapshot ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SnapshotID {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SnapshotID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SnapshotID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotID({})", &self.0[..BoxID::SHORT_LENGTH])
    }
}

impl AsRef<str> for SnapshotID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// BOX STATE
// ============================================================================

/// Lifecycle state of a box.
///
/// State machine:
/// ```text
/// start()   → Starting → Running
/// execute() → Executing → Running
/// stop()    → Stopping → Stopped
/// start()   → Stopped → Running (restart)
/// ```
/// A monitor-detected crash takes any state directly to Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoxState {
    /// Directory tree created, child being spawned.
    Starting,

    /// Child alive and idle; accepting executions.
    Running,

    /// An execution is in flight.
    Executing,

    /// Graceful teardown in progress (transient).
    Stopping,

    /// Child terminated. The tree may still exist until destroy.
    Stopped,
}

impl BoxState {
    /// Check if this state represents a live child process.
    pub fn is_active(&self) -> bool {
        matches!(self, BoxState::Running | BoxState::Executing)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, BoxState::Stopped)
    }

    /// Check if this state is transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, BoxState::Starting | BoxState::Stopping)
    }

    /// Check if transition to the target state is valid.
    pub fn can_transition_to(&self, target: BoxState) -> bool {
        use BoxState::*;
        matches!(
            (self, target),
            // Starting → Running (spawn success), Stopping/Stopped (aborted start)
            (Starting, Running)
                | (Starting, Stopping)
                | (Starting, Stopped)
                // Running ⇄ Executing, plus graceful or crash teardown
                | (Running, Executing)
                | (Running, Stopping)
                | (Running, Stopped)
                | (Executing, Running)
                | (Executing, Stopping)
                | (Executing, Stopped)
                | (Stopping, Stopped)
                // Stopped → Running (restart directly, no intermediate state)
                | (Stopped, Running)
        )
    }
}

// ============================================================================
// BOX INFO
// ============================================================================

/// Public metadata about a box (returned by list operations).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxInfo {
    /// Unique box identifier.
    pub id: BoxID,

    /// Current lifecycle state.
    pub state: BoxState,

    /// Creation timestamp (UTC).
    pub created_at: DateTime<Utc>,

    /// Process ID of the child (None if not running).
    pub pid: Option<u32>,

    /// Root of the box's directory tree.
    pub root_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_ids_are_unique_and_well_formed() {
        let a = BoxID::new();
        let b = BoxID::new();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), BoxID::FULL_LENGTH);
        assert!(BoxID::is_valid(a.as_str()));
    }

    #[test]
    fn parse_rejects_bad_shapes() {
        assert!(BoxID::parse("short").is_none());
        assert!(BoxID::parse("has spaces in the idXX").is_none());
        assert!(BoxID::parse("slash/inside/the/idXX").is_none());

        let good = BoxID::new();
        assert_eq!(BoxID::parse(good.as_str()), Some(good));
    }

    #[test]
    fn snapshot_id_round_trips() {
        let id = SnapshotID::new();
        assert_eq!(SnapshotID::parse(id.as_str()).unwrap().as_str(), id.as_str());
    }

    #[test]
    fn state_machine_accepts_normal_lifecycle() {
        use BoxState::*;
        assert!(Starting.can_transition_to(Running));
        assert!(Running.can_transition_to(Executing));
        assert!(Executing.can_transition_to(Running));
        assert!(Running.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Stopped));
        assert!(Stopped.can_transition_to(Running));
    }

    #[test]
    fn state_machine_rejects_backwards_transitions() {
        use BoxState::*;
        assert!(!Stopped.can_transition_to(Executing));
        assert!(!Stopped.can_transition_to(Stopping));
        assert!(!Stopping.can_transition_to(Executing));
        assert!(!Stopping.can_transition_to(Running));
        assert!(!Executing.can_transition_to(Starting));
    }

    #[test]
    fn active_and_transient_classification() {
        assert!(BoxState::Running.is_active());
        assert!(BoxState::Executing.is_active());
        assert!(!BoxState::Stopped.is_active());
        assert!(BoxState::Starting.is_transient());
        assert!(BoxState::Stopping.is_transient());
    }
}
