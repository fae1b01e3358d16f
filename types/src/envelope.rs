//! Nested `{controlId, inner}` envelopes that encode a tree path.

use crate::path::ControlPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A leaf payload, possibly wrapped once per container on its way to the root.
///
/// On the wire a wrapped envelope is `{"controlId": "...", "inner": ...}` and
/// a leaf is the raw payload object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    Wrapped {
        #[serde(rename = "controlId")]
        control_id: String,
        inner: Box<Envelope>,
    },
    Leaf(Value),
}

impl Envelope {
    pub fn leaf(payload: Value) -> Self {
        Envelope::Leaf(payload)
    }

    /// Wrap this envelope one level with a child id.
    pub fn wrap(self, control_id: impl Into<String>) -> Self {
        Envelope::Wrapped {
            control_id: control_id.into(),
            inner: Box::new(self),
        }
    }

    /// Wrap a payload along a whole path. The first segment ends up outermost.
    pub fn wrap_path(path: &ControlPath, payload: Value) -> Self {
        Envelope::Leaf(payload).wrap_in(path)
    }

    /// Wrap an already (partially) wrapped envelope in every segment of `path`.
    pub fn wrap_in(self, path: &ControlPath) -> Self {
        path.iter()
            .rev()
            .fold(self, |env, id| env.wrap(id.clone()))
    }

    /// Peel every wrapping level, returning the accumulated path and the leaf payload.
    pub fn unwrap_path(self) -> (ControlPath, Value) {
        let mut segments = Vec::new();
        let mut current = self;
        loop {
            match current {
                Envelope::Wrapped { control_id, inner } => {
                    segments.push(control_id);
                    current = *inner;
                }
                Envelope::Leaf(payload) => return (ControlPath::new(segments), payload),
            }
        }
    }

    /// Peel one level. Returns `None` on a leaf.
    pub fn unwrap_once(&self) -> Option<(&str, &Envelope)> {
        match self {
            Envelope::Wrapped { control_id, inner } => Some((control_id, inner)),
            Envelope::Leaf(_) => None,
        }
    }

    /// The leaf payload, if this envelope is not wrapped.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Envelope::Leaf(payload) => Some(payload),
            Envelope::Wrapped { .. } => None,
        }
    }
}
