//! Broker error types.

use av_controls_types::ErrorResponse;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Panel not found: {0}")]
    PanelNotFound(String),

    /// The connection's role does not allow the message
    #[error("{action} requires a {expected} connection")]
    WrongRole {
        expected: &'static str,
        action: &'static str,
    },

    /// A receiver tried to speak for a panel it does not own
    #[error("Panel {0} belongs to another connection")]
    NotOwner(String),

    #[error("Sender has not chosen panel {0}")]
    NotChosen(String),

    #[error("Unexpected message from client: {0}")]
    Unexpected(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(#[from] serde_json::Error),
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let status = match self {
            BrokerError::PanelNotFound(_) => StatusCode::NOT_FOUND,
            BrokerError::InvalidMessage(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::CONFLICT,
        };
        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}
