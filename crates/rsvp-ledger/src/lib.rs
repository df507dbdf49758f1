//! Workshop RSVP ledger.
//!
//! Attendees RSVP for a workshop with a secret code. The code is checked
//! against an externally provisioned roster of SHA-256 digests, and a valid
//! credential is recorded in the workshop's ledger exactly once, even under
//! concurrent or repeated requests.

pub mod api;
pub mod config;
pub mod error;
pub mod ledger;
pub mod roster;
pub mod service;
pub mod store;

pub use config::Config;
pub use error::RsvpError;
pub use ledger::{AttendeeProfile, AttendeeRecord, Registration, WorkshopId, WorkshopLedger};
pub use roster::{CredentialHash, Roster, RosterPolicy, RosterSource};
pub use service::{RegistrationReceipt, RetryPolicy, RsvpOutcome, RsvpRequest, RsvpService};
pub use store::{EncryptedFileStore, LedgerStore, MemoryLedgerStore, Store};
