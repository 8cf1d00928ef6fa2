//! Dotted-numeric applet versions.
//!
//! Applet versions are compared component by component, left to right.
//! Missing trailing components count as zero, so `1.2` and `1.2.0` are equal.
//! Components that are not plain integers (e.g. `rc1`) compare as zero.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A dotted-numeric version string (e.g. `1.4.2`).
///
/// The original string is kept for display and serialization; ordering and
/// equality use the numeric components only.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct AppletVersion(String);

impl AppletVersion {
    /// Create a version from the given string (stored as-is, trimmed).
    pub fn new(v: &str) -> Self {
        Self(v.trim().to_string())
    }

    /// Return the version string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if no version was given.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Numeric components with trailing zeros stripped.
    fn components(&self) -> Vec<u64> {
        let mut parts: Vec<u64> = self
            .0
            .split('.')
            .map(|s| s.trim().parse::<u64>().unwrap_or(0))
            .collect();
        while parts.last() == Some(&0) {
            parts.pop();
        }
        parts
    }

    /// True if `self` satisfies a minimum-version constraint.
    ///
    /// An empty constraint is satisfied by any version.
    pub fn satisfies(&self, minimum: &AppletVersion) -> bool {
        minimum.is_empty() || *self >= *minimum
    }
}

impl Ord for AppletVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let a = self.components();
        let b = other.components();
        for i in 0..std::cmp::max(a.len(), b.len()) {
            let av = a.get(i).unwrap_or(&0);
            let bv = b.get(i).unwrap_or(&0);
            match av.cmp(bv) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for AppletVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for AppletVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for AppletVersion {}

impl std::hash::Hash for AppletVersion {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.components().hash(state);
    }
}

impl std::fmt::Display for AppletVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for AppletVersion {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AppletVersion {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AppletVersion {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

/// Returns true if `candidate` is strictly newer than `current`.
pub fn is_newer(current: &AppletVersion, candidate: &AppletVersion) -> bool {
    candidate > current
}
