//! Code payload preparation: address rewriting, completion markers.

use replbox_shared::constants::exec;

/// A single-use completion marker.
///
/// A fresh random token per execution; user code cannot forge it ahead
/// of time, so its appearance in stdout reliably signals that the
/// submitted statements have all been evaluated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Marker(String);

impl Marker {
    pub(crate) fn fresh() -> Self {
        Self(format!(
            "{}{}{}",
            exec::MARKER_PREFIX,
            nanoid::nanoid!(),
            exec::MARKER_SUFFIX
        ))
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Find the marker in an accumulated stdout buffer.
    pub(crate) fn find_in(&self, haystack: &[u8]) -> Option<usize> {
        find_subslice(haystack, self.as_bytes())
    }
}

/// Rewrite loopback address literals in submitted code.
///
/// Best-effort network-access discouragement at the string level; the
/// real boundary is the network namespace around the box.
pub(crate) fn sanitize_code(code: &str) -> String {
    let mut sanitized = code.to_string();
    for pattern in exec::BLOCKED_PATTERNS {
        sanitized = sanitized.replace(pattern, exec::BLOCKED_ADDRESS);
    }
    sanitized
}

/// Build the payload written to the child's stdin: sanitized code plus
/// a trailing print of the completion marker.
pub(crate) fn build_payload(code: &str, marker: &Marker) -> String {
    format!("{}\nprint(\"{}\")\n", sanitize_code(code), marker.as_str())
}

/// Strip the marker and everything after it from accumulated stdout.
pub(crate) fn strip_marker(stdout: &[u8], marker: &Marker) -> Vec<u8> {
    match marker.find_in(stdout) {
        Some(pos) => stdout[..pos].to_vec(),
        None => stdout.to_vec(),
    }
}

/// Byte-level subslice search. Markers are matched on raw bytes so a
/// chunk boundary inside a multi-byte character cannot hide them.
pub(crate) fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
