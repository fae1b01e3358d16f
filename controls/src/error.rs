//! Error types for the control library.

use av_controls_types::spec::SpecParseError;
use av_controls_types::{ControlPath, ControlType, UnknownControlType};
use serde_json::Value;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ControlError>;

#[derive(Debug, Error)]
pub enum ControlError {
    /// A signal payload did not match what the control accepts
    #[error("Invalid signal for {control_type}: {value}")]
    SignalParsing {
        control_type: ControlType,
        value: Value,
    },

    /// An update payload did not match what the control emits
    #[error("Invalid update for {control_type}: {value}")]
    UpdateParsing {
        control_type: ControlType,
        value: Value,
    },

    #[error("Control not found: [{0}]")]
    ControlNotFound(ControlPath),

    #[error(transparent)]
    UnknownControlType(#[from] UnknownControlType),

    /// Transport send or connect failure
    #[error("Communication error: {0}")]
    Communication(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ControlError {
    pub(crate) fn signal(control_type: ControlType, value: &Value) -> Self {
        ControlError::SignalParsing {
            control_type,
            value: value.clone(),
        }
    }

    pub(crate) fn update(control_type: ControlType, value: &Value) -> Self {
        ControlError::UpdateParsing {
            control_type,
            value: value.clone(),
        }
    }
}

impl From<SpecParseError> for ControlError {
    fn from(err: SpecParseError) -> Self {
        match err {
            SpecParseError::UnknownType(e) => ControlError::UnknownControlType(e),
            SpecParseError::Json(e) => ControlError::Json(e),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ControlError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ControlError::Communication(err.to_string())
    }
}
