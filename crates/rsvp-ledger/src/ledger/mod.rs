//! Per-workshop attendee ledger.
//!
//! A ledger is an append-only sequence of attendee records plus a running
//! count. Both are only ever changed together through
//! [`WorkshopLedger::register`].

mod guard;

pub use guard::{WorkshopGuard, WorkshopLocks};

use crate::error::RsvpError;
use crate::roster::{hash_secret, CredentialHash, RosterProfile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use tracing::warn;

/// Maximum accepted length of a workshop identifier.
const MAX_WORKSHOP_ID_LEN: usize = 128;

/// Identifier of the workshop submission a ledger belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkshopId(String);

impl WorkshopId {
    /// Validate a workshop identifier taken from a request.
    pub fn parse(raw: &str) -> Result<Self, RsvpError> {
        let id = raw.trim();
        if id.is_empty() {
            return Err(RsvpError::MalformedRequest(
                "workshop_id must not be empty".into(),
            ));
        }
        if id.len() > MAX_WORKSHOP_ID_LEN {
            return Err(RsvpError::MalformedRequest(format!(
                "workshop_id longer than {} bytes",
                MAX_WORKSHOP_ID_LEN
            )));
        }
        if id.chars().any(char::is_control) {
            return Err(RsvpError::MalformedRequest(
                "workshop_id contains control characters".into(),
            ));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe key for this workshop.
    pub fn storage_key(&self) -> String {
        hash_secret(&self.0)
    }
}

impl fmt::Display for WorkshopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Display details submitted with an RSVP. Both fields are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendeeProfile {
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl AttendeeProfile {
    /// Build a profile, treating blank strings as absent.
    pub fn new(display_name: Option<String>, email: Option<String>) -> Self {
        Self {
            display_name: display_name.and_then(non_blank),
            email: email.and_then(non_blank),
        }
    }

    /// Fill missing fields from the matching roster row.
    pub fn or_roster(self, roster: Option<&RosterProfile>) -> Self {
        let Some(roster) = roster else {
            return self;
        };
        Self {
            display_name: self.display_name.or_else(|| roster.name.clone()),
            email: self.email.or_else(|| roster.email.clone()),
        }
    }
}

/// One registration in a workshop ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendeeRecord {
    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    /// Stored digest. Legacy or damaged records may carry no usable value.
    #[serde(default, deserialize_with = "lenient_string")]
    credential_hash: Option<String>,

    #[serde(default)]
    pub registered_at: Option<DateTime<Utc>>,
}

impl AttendeeRecord {
    fn new(profile: AttendeeProfile, hash: &CredentialHash) -> Self {
        Self {
            display_name: profile.display_name,
            email: profile.email,
            credential_hash: Some(hash.as_str().to_string()),
            registered_at: Some(Utc::now()),
        }
    }

    /// The record's credential, if it parses as a digest.
    pub fn credential(&self) -> Option<CredentialHash> {
        self.credential_hash
            .as_deref()
            .and_then(CredentialHash::parse)
    }
}

/// Result of a registration attempt against a single ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// A new record was appended.
    Registered,
    /// The credential already had a record; nothing changed.
    AlreadyRegistered,
}

/// Attendee records and count for one workshop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkshopLedger {
    #[serde(default)]
    attendees: Vec<AttendeeRecord>,

    #[serde(default)]
    count: u64,

    /// Bumped on every append; used by stores for optimistic concurrency.
    #[serde(default)]
    revision: u64,
}

impl WorkshopLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records in registration order.
    pub fn attendees(&self) -> &[AttendeeRecord] {
        &self.attendees
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether a record with this credential exists.
    ///
    /// Records without a parsable digest are skipped.
    pub fn is_registered(&self, hash: &CredentialHash) -> bool {
        self.attendees
            .iter()
            .filter_map(AttendeeRecord::credential)
            .any(|existing| &existing == hash)
    }

    /// Append the attendee unless the credential is already registered.
    pub fn register(&mut self, profile: AttendeeProfile, hash: &CredentialHash) -> Registration {
        if self.is_registered(hash) {
            return Registration::AlreadyRegistered;
        }

        self.attendees.push(AttendeeRecord::new(profile, hash));
        self.count += 1;
        self.revision += 1;
        Registration::Registered
    }

    /// Repair a stored count that disagrees with the record sequence.
    ///
    /// Returns true if the count was changed.
    pub fn reconcile(&mut self) -> bool {
        let actual = self.attendees.len() as u64;
        if self.count == actual {
            return false;
        }
        warn!(
            stored_count = self.count,
            records = actual,
            "Ledger count out of sync with records, repairing"
        );
        self.count = actual;
        true
    }
}

fn non_blank(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Accept any JSON value, keeping it only if it is a string.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> AttendeeProfile {
        AttendeeProfile::new(Some("Alice".into()), None)
    }

    #[test]
    fn test_workshop_id_parse() {
        assert_eq!(WorkshopId::parse(" ws-42 ").unwrap().as_str(), "ws-42");
        assert!(matches!(
            WorkshopId::parse("   "),
            Err(RsvpError::MalformedRequest(_))
        ));
        assert!(WorkshopId::parse(&"x".repeat(129)).is_err());
        assert!(WorkshopId::parse("ws\n1").is_err());
    }

    #[test]
    fn test_storage_key_is_hex() {
        let key = WorkshopId::parse("../../etc/passwd").unwrap().storage_key();
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_register_then_already_registered() {
        let mut ledger = WorkshopLedger::new();
        let hash = CredentialHash::from_secret("secretA");

        assert_eq!(ledger.register(alice(), &hash), Registration::Registered);
        let after_first = ledger.clone();

        assert_eq!(
            ledger.register(alice(), &hash),
            Registration::AlreadyRegistered
        );
        assert_eq!(ledger, after_first);
        assert_eq!(ledger.count(), 1);
        assert_eq!(ledger.revision(), 1);
    }

    #[test]
    fn test_count_tracks_records() {
        let mut ledger = WorkshopLedger::new();
        for secret in ["a", "b", "c", "a", "b"] {
            ledger.register(AttendeeProfile::default(), &CredentialHash::from_secret(secret));
        }

        assert_eq!(ledger.count(), 3);
        assert_eq!(ledger.attendees().len(), 3);
        assert!(ledger.attendees().iter().all(|r| r.registered_at.is_some()));
    }

    #[test]
    fn test_registration_order_preserved() {
        let mut ledger = WorkshopLedger::new();
        for name in ["first", "second", "third"] {
            ledger.register(
                AttendeeProfile::new(Some(name.into()), None),
                &CredentialHash::from_secret(name),
            );
        }

        let names: Vec<_> = ledger
            .attendees()
            .iter()
            .map(|r| r.display_name.as_deref().unwrap())
            .collect();
        assert_eq!(names, ["first", "second", "third"]);
    }

    #[test]
    fn test_dedup_skips_damaged_records() {
        let hash = CredentialHash::from_secret("secretA");
        let json = format!(
            r#"{{
                "attendees": [
                    {{"display_name": "legacy"}},
                    {{"display_name": "numeric", "credential_hash": 42}},
                    {{"display_name": "garbled", "credential_hash": "Alice, alice@example.com"}},
                    {{"display_name": "uppercase", "credential_hash": "{}"}}
                ],
                "count": 4,
                "revision": 7
            }}"#,
            hash.as_str().to_uppercase()
        );
        let mut ledger: WorkshopLedger = serde_json::from_str(&json).unwrap();

        assert!(ledger.is_registered(&hash));
        assert_eq!(
            ledger.register(AttendeeProfile::default(), &hash),
            Registration::AlreadyRegistered
        );

        let other = CredentialHash::from_secret("secretB");
        assert_eq!(
            ledger.register(AttendeeProfile::default(), &other),
            Registration::Registered
        );
        assert_eq!(ledger.count(), 5);
        assert_eq!(ledger.revision(), 8);
    }

    #[test]
    fn test_reconcile_repairs_count() {
        let json = r#"{"attendees": [{"display_name": "a"}, {"display_name": "b"}], "count": 7}"#;
        let mut ledger: WorkshopLedger = serde_json::from_str(json).unwrap();

        assert!(ledger.reconcile());
        assert_eq!(ledger.count(), 2);
        assert!(!ledger.reconcile());
    }

    #[test]
    fn test_profile_blank_fields_are_absent() {
        let profile = AttendeeProfile::new(Some("  ".into()), Some(" bob@example.com ".into()));
        assert_eq!(profile.display_name, None);
        assert_eq!(profile.email.as_deref(), Some("bob@example.com"));
    }

    #[test]
    fn test_profile_roster_fallback() {
        let roster = RosterProfile {
            name: Some("Roster Name".into()),
            email: Some("roster@example.com".into()),
        };

        let merged = AttendeeProfile::new(Some("Given".into()), None).or_roster(Some(&roster));
        assert_eq!(merged.display_name.as_deref(), Some("Given"));
        assert_eq!(merged.email.as_deref(), Some("roster@example.com"));

        let untouched = AttendeeProfile::default().or_roster(None);
        assert_eq!(untouched, AttendeeProfile::default());
    }
}
