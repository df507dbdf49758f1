//! Credential validation against the attendee roster.
//!
//! The roster is a line-oriented list of SHA-256 digests, provisioned
//! out-of-band. A submitted secret is hashed and looked up by digest; secrets
//! are never compared or stored in clear text.

mod source;

pub use source::{load_roster_file, RosterPolicy, RosterSource};

use crate::error::RsvpError;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Length of a hex-encoded SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

/// Number of digest characters shown in logs.
const FINGERPRINT_LEN: usize = 12;

/// Normalized hex digest of an attendee secret.
///
/// Used both as proof of authorization and as the dedup key in a workshop
/// ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialHash(String);

impl CredentialHash {
    /// Parse a stored or provisioned digest, stripping cosmetic separators.
    ///
    /// Returns `None` unless the normalized form is exactly 64 hex characters.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = normalize_digest(raw);
        if normalized.len() == DIGEST_HEX_LEN && normalized.chars().all(|c| c.is_ascii_hexdigit())
        {
            Some(Self(normalized))
        } else {
            None
        }
    }

    /// Hash a raw secret into its normalized digest.
    pub fn from_secret(secret: &str) -> Self {
        Self(normalize_digest(&hash_secret(secret)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix of the digest, safe to put in logs.
    pub fn fingerprint(&self) -> &str {
        &self.0[..FINGERPRINT_LEN]
    }
}

impl fmt::Display for CredentialHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash a secret using SHA-256.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Strip dashes and whitespace and lowercase a digest string.
///
/// Applied to roster entries and computed digests alike.
pub fn normalize_digest(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Optional attendee details carried by a roster row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterProfile {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Parsed, read-only set of authorized credential digests.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: HashMap<CredentialHash, RosterProfile>,
}

impl Roster {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Parse roster text.
    ///
    /// Each line is either a bare digest or `name,email,digest`; the digest is
    /// always the last comma-separated field. Blank lines and `#` comments are
    /// ignored, unparsable digests are skipped.
    pub fn parse(text: &str) -> Self {
        let mut roster = Self::new();
        let mut skipped = 0usize;

        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let Some((digest, details)) = fields.split_last() else {
                continue;
            };

            let Some(hash) = CredentialHash::parse(digest) else {
                warn!(line = index + 1, "Skipping roster line with invalid digest");
                skipped += 1;
                continue;
            };

            let profile = RosterProfile {
                name: details.first().and_then(|s| non_empty(s)),
                email: details.get(1).and_then(|s| non_empty(s)),
            };

            if roster.entries.contains_key(&hash) {
                warn!(
                    line = index + 1,
                    fingerprint = %hash.fingerprint(),
                    "Duplicate roster digest ignored"
                );
                continue;
            }
            roster.entries.insert(hash, profile);
        }

        debug!(entries = roster.len(), skipped, "Parsed roster");
        roster
    }

    /// Add an entry.
    pub fn insert(&mut self, hash: CredentialHash, profile: RosterProfile) {
        self.entries.insert(hash, profile);
    }

    pub fn contains(&self, hash: &CredentialHash) -> bool {
        self.entries.contains_key(hash)
    }

    /// Attendee details recorded alongside a digest, if any.
    pub fn profile(&self, hash: &CredentialHash) -> Option<&RosterProfile> {
        self.entries.get(hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Prove that a raw secret belongs to the roster.
    ///
    /// A blank secret is a malformed request; a well-formed secret whose
    /// digest is absent is an invalid credential.
    pub fn validate(&self, raw_secret: &SecretString) -> Result<CredentialHash, RsvpError> {
        let secret = raw_secret.expose_secret().trim();
        if secret.is_empty() {
            debug!(outcome = "malformed_request", "Credential validation rejected");
            return Err(RsvpError::MalformedRequest(
                "auth_key must not be empty".into(),
            ));
        }

        let hash = CredentialHash::from_secret(secret);
        if self.contains(&hash) {
            debug!(fingerprint = %hash.fingerprint(), outcome = "valid", "Credential validated");
            Ok(hash)
        } else {
            info!(
                fingerprint = %hash.fingerprint(),
                outcome = "invalid_credential",
                "Credential not in roster"
            );
            Err(RsvpError::InvalidCredential)
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
