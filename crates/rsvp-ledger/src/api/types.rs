//! API request and response types.

use crate::service::RsvpOutcome;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// RSVP form body. Fields are optional so that missing input maps to
/// `MALFORMED_REQUEST` instead of an extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct RsvpBody {
    /// Attendee secret code (hashed, never stored or logged)
    pub auth_key: Option<SecretString>,

    /// Display name to record
    pub name: Option<String>,

    /// Contact email to record
    pub email: Option<String>,
}

/// Response to an RSVP.
#[derive(Debug, Serialize)]
pub struct RsvpResponse {
    pub workshop_id: String,
    pub outcome: RsvpOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendee_count: Option<u64>,
}

/// Attendance summary for a workshop.
#[derive(Debug, Serialize)]
pub struct WorkshopResponse {
    pub workshop_id: String,
    pub attendee_count: u64,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub roster_entries: usize,
}
