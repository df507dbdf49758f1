//! RSVP entry point: credential validation followed by idempotent
//! registration in the workshop's ledger.

use crate::error::RsvpError;
use crate::ledger::{AttendeeProfile, Registration, WorkshopId, WorkshopLedger, WorkshopLocks};
use crate::roster::{CredentialHash, RosterProfile, RosterSource};
use crate::store::LedgerStore;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// An RSVP as received from the web layer. Every field is optional here so
/// that missing input is reported as [`RsvpOutcome::MalformedRequest`].
#[derive(Debug, Clone, Default)]
pub struct RsvpRequest {
    pub workshop_id: Option<String>,
    pub raw_secret: Option<SecretString>,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

/// Closed set of results returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RsvpOutcome {
    Registered,
    AlreadyRegistered,
    InvalidCredential,
    MalformedRequest,
    InternalError,
}

impl RsvpOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RsvpOutcome::Registered => "registered",
            RsvpOutcome::AlreadyRegistered => "already_registered",
            RsvpOutcome::InvalidCredential => "invalid_credential",
            RsvpOutcome::MalformedRequest => "malformed_request",
            RsvpOutcome::InternalError => "internal_error",
        }
    }
}

impl From<Registration> for RsvpOutcome {
    fn from(registration: Registration) -> Self {
        match registration {
            Registration::Registered => RsvpOutcome::Registered,
            Registration::AlreadyRegistered => RsvpOutcome::AlreadyRegistered,
        }
    }
}

impl From<&RsvpError> for RsvpOutcome {
    fn from(e: &RsvpError) -> Self {
        match e {
            RsvpError::MalformedRequest(_) => RsvpOutcome::MalformedRequest,
            RsvpError::InvalidCredential => RsvpOutcome::InvalidCredential,
            _ => RsvpOutcome::InternalError,
        }
    }
}

/// What a successful registration call observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationReceipt {
    pub registration: Registration,
    /// Ledger count after the call.
    pub attendee_count: u64,
}

/// Bounded retry on [`RsvpError::StorageConflict`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before attempt `n + 1` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(25),
        }
    }
}

/// Validates credentials and registers attendees.
pub struct RsvpService {
    roster: Arc<RosterSource>,
    store: Arc<dyn LedgerStore>,
    locks: WorkshopLocks,
    retry: RetryPolicy,
}

impl RsvpService {
    pub fn new(roster: Arc<RosterSource>, store: Arc<dyn LedgerStore>) -> Self {
        Self {
            roster,
            store,
            locks: WorkshopLocks::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = RetryPolicy {
            max_attempts: retry.max_attempts.max(1),
            ..retry
        };
        self
    }

    pub fn roster(&self) -> &RosterSource {
        &self.roster
    }

    /// Handle one RSVP and reduce the result to an outcome code.
    pub async fn submit(&self, request: RsvpRequest) -> RsvpOutcome {
        match self.submit_detailed(request).await {
            Ok(receipt) => receipt.registration.into(),
            Err(e) => RsvpOutcome::from(&e),
        }
    }

    /// Handle one RSVP, keeping the ledger count and the error detail.
    pub async fn submit_detailed(
        &self,
        request: RsvpRequest,
    ) -> Result<RegistrationReceipt, RsvpError> {
        let result = self.try_submit(request).await;
        if let Err(e) = &result {
            if RsvpOutcome::from(e) == RsvpOutcome::InternalError {
                error!(error = %e, "RSVP failed");
            }
        }
        result
    }

    async fn try_submit(&self, request: RsvpRequest) -> Result<RegistrationReceipt, RsvpError> {
        let workshop_id = request
            .workshop_id
            .as_deref()
            .ok_or_else(|| RsvpError::MalformedRequest("missing workshop_id".into()))
            .and_then(WorkshopId::parse)?;
        let secret = request
            .raw_secret
            .ok_or_else(|| RsvpError::MalformedRequest("missing auth_key".into()))?;

        let (hash, roster_profile) = self.check_credential(&secret).await?;
        let profile = AttendeeProfile::new(request.display_name, request.email)
            .or_roster(roster_profile.as_ref());

        self.register(&workshop_id, profile, &hash).await
    }

    /// Prove a raw secret is on the roster, returning its digest.
    pub async fn validate(&self, raw_secret: &SecretString) -> Result<CredentialHash, RsvpError> {
        self.check_credential(raw_secret).await.map(|(hash, _)| hash)
    }

    async fn check_credential(
        &self,
        raw_secret: &SecretString,
    ) -> Result<(CredentialHash, Option<RosterProfile>), RsvpError> {
        let roster = self.roster.current().await?;
        let hash = roster.validate(raw_secret)?;
        let profile = roster.profile(&hash).cloned();
        Ok((hash, profile))
    }

    /// Register an already-validated credential for a workshop.
    ///
    /// Registering the same credential again is a no-op reported as
    /// [`Registration::AlreadyRegistered`].
    #[instrument(skip_all, fields(workshop_id = %workshop_id, fingerprint = %hash.fingerprint()))]
    pub async fn register(
        &self,
        workshop_id: &WorkshopId,
        profile: AttendeeProfile,
        hash: &CredentialHash,
    ) -> Result<RegistrationReceipt, RsvpError> {
        debug!("Registration started");

        let mut attempt = 1;
        let result = loop {
            let result = {
                let _guard = self.locks.acquire(workshop_id).await;
                self.register_once(workshop_id, profile.clone(), hash).await
            };

            match result {
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    warn!(attempt, "Storage conflict, retrying registration");
                    tokio::time::sleep(self.retry.backoff * attempt).await;
                    attempt += 1;
                }
                result => break result,
            }
        };

        match &result {
            Ok(receipt) => info!(
                outcome = RsvpOutcome::from(receipt.registration).as_str(),
                attendee_count = receipt.attendee_count,
                attempts = attempt,
                "Registration finished"
            ),
            Err(e) => warn!(
                outcome = RsvpOutcome::from(e).as_str(),
                error = %e,
                attempts = attempt,
                "Registration failed"
            ),
        }
        result
    }

    /// One dedup-check-and-append unit. Must run under the workshop guard.
    async fn register_once(
        &self,
        workshop_id: &WorkshopId,
        profile: AttendeeProfile,
        hash: &CredentialHash,
    ) -> Result<RegistrationReceipt, RsvpError> {
        let mut ledger = self.store.load_ledger(workshop_id).await?;
        ledger.reconcile();

        let registration = ledger.register(profile, hash);
        if registration == Registration::Registered {
            self.store.save_ledger(workshop_id, &ledger).await?;
        }

        Ok(RegistrationReceipt {
            registration,
            attendee_count: ledger.count(),
        })
    }

    /// Current ledger for a workshop.
    pub async fn ledger(&self, workshop_id: &WorkshopId) -> Result<WorkshopLedger, RsvpError> {
        let mut ledger = self.store.load_ledger(workshop_id).await?;
        ledger.reconcile();
        Ok(ledger)
    }

    /// Running attendance count for a workshop.
    pub async fn attendance(&self, workshop_id: &WorkshopId) -> Result<u64, RsvpError> {
        Ok(self.ledger(workshop_id).await?.count())
    }
}
