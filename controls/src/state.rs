//! Snapshots of controller-side values, used by presets.

use av_controls_types::{Dot, Position};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Value of one sender, or of a whole container keyed by child id.
///
/// Tabs nest twice: page id, then control id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlState {
    Bool(bool),
    Number(f64),
    Text(String),
    Position(Position),
    Dots(Vec<Dot>),
    Group(IndexMap<String, ControlState>),
}

impl ControlState {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ControlState::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ControlState::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Child state of a container snapshot.
    pub fn get(&self, id: &str) -> Option<&ControlState> {
        match self {
            ControlState::Group(children) => children.get(id),
            _ => None,
        }
    }
}
