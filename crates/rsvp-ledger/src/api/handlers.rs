//! HTTP request handlers.

use super::types::{HealthResponse, RsvpBody, RsvpResponse, WorkshopResponse};
use super::AppState;
use crate::error::RsvpError;
use crate::ledger::WorkshopId;
use crate::service::{RsvpOutcome, RsvpRequest};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use tracing::debug;

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        roster_entries: state.service.roster().len().await,
    })
}

/// Register the caller for a workshop.
pub async fn rsvp(
    State(state): State<AppState>,
    Path(workshop_id): Path<String>,
    body: Result<Json<RsvpBody>, JsonRejection>,
) -> (StatusCode, Json<RsvpResponse>) {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            debug!(error = %rejection, "Unparsable RSVP body");
            return respond(workshop_id, RsvpOutcome::MalformedRequest, None);
        }
    };

    let request = RsvpRequest {
        workshop_id: Some(workshop_id.clone()),
        raw_secret: body.auth_key,
        display_name: body.name,
        email: body.email,
    };

    match state.service.submit_detailed(request).await {
        Ok(receipt) => respond(
            workshop_id,
            receipt.registration.into(),
            Some(receipt.attendee_count),
        ),
        Err(e) => respond(workshop_id, RsvpOutcome::from(&e), None),
    }
}

/// Attendance count for a workshop.
pub async fn get_workshop(
    State(state): State<AppState>,
    Path(workshop_id): Path<String>,
) -> Result<Json<WorkshopResponse>, RsvpError> {
    let workshop_id = WorkshopId::parse(&workshop_id)?;
    let attendee_count = state.service.attendance(&workshop_id).await?;

    Ok(Json(WorkshopResponse {
        workshop_id: workshop_id.to_string(),
        attendee_count,
    }))
}

fn respond(
    workshop_id: String,
    outcome: RsvpOutcome,
    attendee_count: Option<u64>,
) -> (StatusCode, Json<RsvpResponse>) {
    let status = match outcome {
        RsvpOutcome::Registered => StatusCode::CREATED,
        RsvpOutcome::AlreadyRegistered => StatusCode::OK,
        RsvpOutcome::InvalidCredential => StatusCode::FORBIDDEN,
        RsvpOutcome::MalformedRequest => StatusCode::BAD_REQUEST,
        RsvpOutcome::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (
        status,
        Json(RsvpResponse {
            workshop_id,
            outcome,
            attendee_count,
        }),
    )
}
