//! Purge trigger and status endpoints.
//!
//! `POST /purge` answers as soon as the eligible set is counted; the batches
//! run on the state's task tracker after the response is sent.

use axum::{Json, extract::State, response::IntoResponse};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ApiError;
use crate::{
    AppState,
    config::PurgeOverrides,
    purge::{PurgeReport, PurgeTicket},
};

/// Acknowledgment returned by `POST /purge`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PurgeAccepted {
    pub success: bool,
    pub message: String,
    pub run_id: Uuid,
    pub cutoff: DateTime<Utc>,
    /// Records eligible when the run started
    pub eligible: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PurgeStatus {
    pub running: bool,
    pub current_run: Option<PurgeTicket>,
    pub last_run: Option<PurgeReport>,
}

/// Parse the optional override body. An empty body means "use the defaults".
fn parse_overrides(body: &[u8]) -> Result<PurgeOverrides, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(PurgeOverrides::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {e}")))
}

/// Start a purge run in the background.
#[tracing::instrument(name = "purge.trigger", skip(state, body))]
pub async fn trigger_purge(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let runner = state.purge.as_ref().ok_or(ApiError::DatabaseRequired)?;
    let overrides = parse_overrides(&body)?;
    let config = state.config.purge.with_overrides(&overrides);

    let ticket = runner.trigger(config, &state.task_tracker).await?;

    tracing::info!(
        run_id = %ticket.run_id,
        cutoff = %ticket.cutoff,
        eligible = ticket.eligible,
        "Purge run accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(PurgeAccepted {
            success: true,
            message: "Physical deletion process started in the background".to_string(),
            run_id: ticket.run_id,
            cutoff: ticket.cutoff,
            eligible: ticket.eligible,
        }),
    ))
}

/// Report whether a run is in progress and how the last one ended.
#[tracing::instrument(name = "purge.status", skip(state))]
pub async fn purge_status(State(state): State<AppState>) -> Result<Json<PurgeStatus>, ApiError> {
    let runner = state.purge.as_ref().ok_or(ApiError::DatabaseRequired)?;

    Ok(Json(PurgeStatus {
        running: runner.is_running(),
        current_run: runner.current_run(),
        last_run: runner.last_report(),
    }))
}
