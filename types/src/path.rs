//! Root-to-leaf addresses of controls.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// Ordered sequence of control ids from the root to a node.
///
/// Ids are only unique among the direct children of one container, so a
/// path is the only global address a control has.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlPath(Vec<String>);

impl ControlPath {
    /// Create a path from its segments.
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// The empty path (the root itself).
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Segments of the path, root first.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// A new path one level deeper.
    pub fn child(&self, id: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(id.into());
        Self(segments)
    }

    /// The path of the enclosing container, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        match self.0.split_last() {
            Some((_, rest)) => Some(Self(rest.to_vec())),
            None => None,
        }
    }

    /// Consume the path into its segments.
    pub fn into_segments(self) -> Vec<String> {
        self.0
    }
}

impl Deref for ControlPath {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for ControlPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl From<Vec<String>> for ControlPath {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

impl From<&[&str]> for ControlPath {
    fn from(segments: &[&str]) -> Self {
        Self(segments.iter().map(|s| (*s).to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ControlPath {
    fn from(segments: [&str; N]) -> Self {
        Self(segments.iter().map(|s| (*s).to_string()).collect())
    }
}

impl FromIterator<String> for ControlPath {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
