//! Roster loading and refresh policy.

use super::Roster;
use crate::error::RsvpError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// When the roster file is (re)read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RosterPolicy {
    /// Read once at startup, then only on an explicit `reload`.
    #[default]
    Startup,
    /// Re-read the file for every validation.
    PerRequest,
}

/// Read and parse a roster file.
pub async fn load_roster_file(path: &Path) -> Result<Roster, RsvpError> {
    let text = fs::read_to_string(path)
        .await
        .map_err(|e| RsvpError::RosterUnavailable(format!("{}: {}", path.display(), e)))?;
    Ok(Roster::parse(&text))
}

/// Shared handle to the current roster.
pub struct RosterSource {
    path: Option<PathBuf>,
    policy: RosterPolicy,
    cached: RwLock<Arc<Roster>>,
}

impl RosterSource {
    /// Load the roster file. Fails if the file cannot be read, regardless of
    /// policy, so a misconfigured path is caught at startup.
    pub async fn open(path: PathBuf, policy: RosterPolicy) -> Result<Self, RsvpError> {
        let roster = load_roster_file(&path).await?;
        info!(
            path = %path.display(),
            entries = roster.len(),
            ?policy,
            "Loaded attendee roster"
        );

        Ok(Self {
            path: Some(path),
            policy,
            cached: RwLock::new(Arc::new(roster)),
        })
    }

    /// Wrap an already-built roster with no backing file.
    pub fn fixed(roster: Roster) -> Self {
        Self {
            path: None,
            policy: RosterPolicy::Startup,
            cached: RwLock::new(Arc::new(roster)),
        }
    }

    pub fn policy(&self) -> RosterPolicy {
        self.policy
    }

    /// The roster to validate against, honoring the refresh policy.
    pub async fn current(&self) -> Result<Arc<Roster>, RsvpError> {
        match (self.policy, &self.path) {
            (RosterPolicy::PerRequest, Some(path)) => {
                let roster = Arc::new(load_roster_file(path).await?);
                *self.cached.write().await = roster.clone();
                Ok(roster)
            }
            _ => Ok(self.cached.read().await.clone()),
        }
    }

    /// Re-read the backing file. Returns the new entry count.
    ///
    /// On failure the previously loaded roster stays in place.
    pub async fn reload(&self) -> Result<usize, RsvpError> {
        let Some(path) = &self.path else {
            debug!("Roster has no backing file, reload is a no-op");
            return Ok(self.len().await);
        };

        let roster = load_roster_file(path).await?;
        let entries = roster.len();
        *self.cached.write().await = Arc::new(roster);

        info!(path = %path.display(), entries, "Reloaded attendee roster");
        Ok(entries)
    }

    /// Reload the roster each time the process receives SIGHUP.
    ///
    /// The signal handler is registered before this returns.
    #[cfg(unix)]
    pub fn reload_on_hangup(self: Arc<Self>) -> std::io::Result<tokio::task::JoinHandle<()>> {
        use tokio::signal::unix::{signal, SignalKind};
        use tracing::warn;

        let mut hangup = signal(SignalKind::hangup())?;
        Ok(tokio::spawn(async move {
            while hangup.recv().await.is_some() {
                if let Err(e) = self.reload().await {
                    warn!(error = %e, "Roster reload failed, keeping previous roster");
                }
            }
        }))
    }

    /// Entry count of the most recently loaded roster.
    pub async fn len(&self) -> usize {
        self.cached.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::{hash_secret, CredentialHash};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_missing_file_is_roster_unavailable() {
        let dir = TempDir::new().unwrap();
        let result =
            RosterSource::open(dir.path().join("missing.txt"), RosterPolicy::Startup).await;
        assert!(matches!(result, Err(RsvpError::RosterUnavailable(_))));
    }

    #[tokio::test]
    async fn test_startup_policy_ignores_file_changes_until_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("roster.txt");
        std::fs::write(&path, hash_secret("secretA")).unwrap();

        let source = RosterSource::open(path.clone(), RosterPolicy::Startup)
            .await
            .unwrap();
        let b = CredentialHash::from_secret("secretB");

        std::fs::write(&path, format!("{}\n{}", hash_secret("secretA"), hash_secret("secretB")))
            .unwrap();
        assert!(!source.current().await.unwrap().contains(&b));

        assert_eq!(source.reload().await.unwrap(), 2);
        assert!(source.current().await.unwrap().contains(&b));
    }

    #[tokio::test]
    async fn test_per_request_policy_sees_file_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("roster.txt");
        std::fs::write(&path, hash_secret("secretA")).unwrap();

        let source = RosterSource::open(path.clone(), RosterPolicy::PerRequest)
            .await
            .unwrap();

        std::fs::write(&path, hash_secret("secretB")).unwrap();
        let roster = source.current().await.unwrap();
        assert!(roster.contains(&CredentialHash::from_secret("secretB")));
        assert!(!roster.contains(&CredentialHash::from_secret("secretA")));
    }

    #[tokio::test]
    async fn test_per_request_policy_reports_removed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("roster.txt");
        std::fs::write(&path, hash_secret("secretA")).unwrap();

        let source = RosterSource::open(path.clone(), RosterPolicy::PerRequest)
            .await
            .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(
            source.current().await,
            Err(RsvpError::RosterUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_roster() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("roster.txt");
        std::fs::write(&path, hash_secret("secretA")).unwrap();

        let source = RosterSource::open(path.clone(), RosterPolicy::Startup)
            .await
            .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(source.reload().await.is_err());
        assert_eq!(source.len().await, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hangup_reloads_roster() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("roster.txt");
        std::fs::write(&path, hash_secret("secretA")).unwrap();

        let source = Arc::new(
            RosterSource::open(path.clone(), RosterPolicy::Startup)
                .await
                .unwrap(),
        );
        let task = source.clone().reload_on_hangup().unwrap();

        std::fs::write(&path, format!("{}\n{}", hash_secret("secretA"), hash_secret("secretB")))
            .unwrap();
        let status = std::process::Command::new("kill")
            .args(["-HUP", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let mut entries = 0;
        for _ in 0..200 {
            entries = source.len().await;
            if entries == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(entries, 2);
        task.abort();
    }

    #[test]
    fn test_fixed_source() {
        let mut roster = Roster::new();
        roster.insert(CredentialHash::from_secret("secretA"), Default::default());
        let source = RosterSource::fixed(roster);

        tokio_test::block_on(async {
            assert_eq!(source.len().await, 1);
            assert_eq!(source.reload().await.unwrap(), 1);
        });
    }

    #[test]
    fn test_policy_deserialization() {
        let policy: RosterPolicy = serde_json::from_str("\"per_request\"").unwrap();
        assert_eq!(policy, RosterPolicy::PerRequest);
        assert_eq!(RosterPolicy::default(), RosterPolicy::Startup);
    }
}
