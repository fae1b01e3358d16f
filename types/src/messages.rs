//! Protocol messages exchanged between a panel and its controllers.

use crate::envelope::Envelope;
use crate::spec::Spec;
use crate::timeline::{TimelineEdit, TimelineState};
use serde::{Deserialize, Serialize};

/// Root of a control tree as announced by a panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootSpecification {
    pub name: String,
    pub version: u32,
    pub spec: Spec,
}

impl RootSpecification {
    pub fn new(name: impl Into<String>, spec: Spec) -> Self {
        Self {
            name: name.into(),
            version: crate::PROTOCOL_VERSION,
            spec,
        }
    }
}

/// Messages carried by every transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Message {
    /// The panel is up and about to announce its specification
    Ready,
    /// A controller asks the panel to re-announce itself
    Nudge,
    /// Full control tree of a panel
    ControllerSpecification(RootSpecification),
    /// Controller -> panel input, wrapped along the target path
    ControlSignal { signal: Envelope },
    /// Panel -> controller state change, wrapped along the source path
    ControlUpdate { update: Envelope },
    /// Ask the panel for a timeline snapshot
    TimelineRequestState,
    /// Full timeline snapshot
    TimelineState { state: TimelineState },
    /// One timeline edit, optionally tagged for echo suppression
    TimelineEdit {
        edit: TimelineEdit,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },
    /// The controller's window is going away
    TabClosing,
}

impl Message {
    /// Get a human-readable description of the message.
    pub fn description(&self) -> String {
        match self {
            Message::Ready => "Panel ready".to_string(),
            Message::Nudge => "Nudge".to_string(),
            Message::ControllerSpecification(root) => {
                format!("Specification of '{}' (v{})", root.name, root.version)
            }
            Message::ControlSignal { signal } => {
                format!("Signal for {}", signal.clone().unwrap_path().0)
            }
            Message::ControlUpdate { update } => {
                format!("Update from {}", update.clone().unwrap_path().0)
            }
            Message::TimelineRequestState => "Timeline state requested".to_string(),
            Message::TimelineState { state } => format!(
                "Timeline state at t={:.3} ({} controls)",
                state.time,
                state.controls.len()
            ),
            Message::TimelineEdit { edit, seq } => match seq {
                Some(seq) => format!("Timeline edit {} (seq {})", edit.kind(), seq),
                None => format!("Timeline edit {}", edit.kind()),
            },
            Message::TabClosing => "Tab closing".to_string(),
        }
    }
}
