//! REST response types of the broker.

use crate::messages::RootSpecification;
use serde::{Deserialize, Serialize};

/// A panel known to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelSummary {
    pub id: String,
    /// Name from the panel's root specification
    pub name: String,
    pub version: u32,
    /// Senders currently attached to the panel
    pub senders: usize,
}

/// Response containing a list of panels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelListResponse {
    pub panels: Vec<PanelSummary>,
}

/// Response containing one panel with its full specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelResponse {
    pub panel: PanelSummary,
    pub root_specification: RootSpecification,
}

/// Response for the broker's connection counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub receivers: usize,
    pub senders: usize,
    pub unregistered: usize,
    pub panels: usize,
}

/// Standard error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}
