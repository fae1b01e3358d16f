//! Framing used on the broker WebSocket.

use crate::messages::{Message, RootSpecification};
use serde::{Deserialize, Serialize};

/// Messages between broker clients and the broker relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum BrokerMessage {
    /// The connection hosts panels
    RegisterReceiver,
    /// The connection controls panels
    RegisterSender,
    /// A receiver announces one of its panels
    AddNetPanel {
        id: String,
        root_specification: RootSpecification,
    },
    /// A protocol message addressed to or coming from a panel
    WrappedMessage { panel_id: String, message: Message },
    /// Panels currently available to senders
    PanelList { panel_ids: Vec<String> },
    /// A sender attaches to one panel
    ChoosePanel { panel_id: String },
}

impl BrokerMessage {
    /// Get a human-readable description of the message.
    pub fn description(&self) -> String {
        match self {
            BrokerMessage::RegisterReceiver => "Register receiver".to_string(),
            BrokerMessage::RegisterSender => "Register sender".to_string(),
            BrokerMessage::AddNetPanel { id, .. } => format!("Add panel {}", id),
            BrokerMessage::WrappedMessage { panel_id, message } => {
                format!("[{}] {}", panel_id, message.description())
            }
            BrokerMessage::PanelList { panel_ids } => format!("{} panel(s)", panel_ids.len()),
            BrokerMessage::ChoosePanel { panel_id } => format!("Choose panel {}", panel_id),
        }
    }
}
