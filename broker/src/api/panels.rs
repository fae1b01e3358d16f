//! Read-only REST view of the broker.

use av_controls_types::{PanelListResponse, PanelResponse, StatsResponse};
use axum::extract::{Path, State};
use axum::Json;

use crate::error::BrokerError;
use crate::state::BrokerState;

/// List the panels currently announced by receivers.
pub async fn list_panels(State(state): State<BrokerState>) -> Json<PanelListResponse> {
    Json(PanelListResponse {
        panels: state.panels().await,
    })
}

/// Get one panel with its root specification.
pub async fn get_panel(
    State(state): State<BrokerState>,
    Path(id): Path<String>,
) -> Result<Json<PanelResponse>, BrokerError> {
    let (panel, root_specification) = state
        .panel(&id)
        .await
        .ok_or(BrokerError::PanelNotFound(id))?;
    Ok(Json(PanelResponse {
        panel,
        root_specification,
    }))
}

pub async fn stats(State(state): State<BrokerState>) -> Json<StatsResponse> {
    Json(state.stats().await)
}
