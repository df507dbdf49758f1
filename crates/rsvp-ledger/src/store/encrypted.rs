//! Encrypted on-disk ledger store, one file per workshop.

use super::{check_revision, LedgerStore};
use crate::error::RsvpError;
use crate::ledger::{WorkshopId, WorkshopLedger};
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use async_trait::async_trait;
use fs2::FileExt;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Key derivation label for ledger encryption.
const KEY_DERIVATION_PATH: &str = "rsvp-ledger/ledgers";

/// Revision header size (big-endian u64).
const REVISION_SIZE: usize = 8;

/// Nonce size for AES-GCM (96 bits = 12 bytes).
const NONCE_SIZE: usize = 12;

/// File extension of ledger files.
const LEDGER_EXTENSION: &str = "ledger";

/// File extension of per-workshop commit lock files.
const LOCK_EXTENSION: &str = "lock";

/// AES-256-GCM encrypted ledger files.
///
/// File format: `[8 bytes revision][12 bytes nonce][ciphertext with auth tag]`.
/// The revision header is authenticated as associated data, and the
/// plaintext is the JSON-encoded ledger. File names are derived from the
/// workshop id hash, so ids never reach the filesystem.
///
/// Commits take an exclusive `flock` on the workshop's `.lock` file, so the
/// revision check and the rename are atomic for every process sharing the
/// directory.
pub struct EncryptedFileStore {
    dir: PathBuf,
    key: [u8; 32],
}

impl EncryptedFileStore {
    /// Create a store with a raw 32-byte key.
    pub fn new(dir: PathBuf, key: [u8; 32]) -> Self {
        Self { dir, key }
    }

    /// Create a store whose key is derived from a passphrase.
    pub fn from_passphrase(dir: PathBuf, passphrase: &SecretString) -> Self {
        Self::new(dir, derive_key(passphrase))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, workshop_id: &WorkshopId) -> PathBuf {
        self.dir
            .join(format!("{}.{}", workshop_id.storage_key(), LEDGER_EXTENSION))
    }

    fn lock_path_for(&self, workshop_id: &WorkshopId) -> PathBuf {
        self.dir
            .join(format!("{}.{}", workshop_id.storage_key(), LOCK_EXTENSION))
    }

    async fn read_ledger(&self, path: &Path) -> Result<Option<WorkshopLedger>, RsvpError> {
        let data = match fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let (revision, plaintext) = open(&self.key, &data)?;
        let ledger: WorkshopLedger = serde_json::from_slice(&plaintext)?;
        if ledger.revision() != revision {
            return Err(RsvpError::Storage(format!(
                "Ledger revision {} does not match file header {}",
                ledger.revision(),
                revision
            )));
        }
        Ok(Some(ledger))
    }

    /// Revision of the committed file, read from its header only.
    async fn stored_revision(&self, path: &Path) -> Result<u64, RsvpError> {
        let mut file = match fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut header = [0u8; REVISION_SIZE];
        match file.read_exact(&mut header).await {
            Ok(_) => Ok(u64::from_be_bytes(header)),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                Err(RsvpError::Encryption("Ledger file too short".into()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Block until this process holds the workshop's commit lock. The lock
    /// is released when the returned file is dropped.
    async fn lock_workshop(&self, workshop_id: &WorkshopId) -> Result<File, RsvpError> {
        let lock_path = self.lock_path_for(workshop_id);
        tokio::task::spawn_blocking(move || {
            let lock_file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&lock_path)?;
            FileExt::lock_exclusive(&lock_file)?;
            Ok::<_, std::io::Error>(lock_file)
        })
        .await
        .map_err(|e| RsvpError::Internal(format!("Ledger lock task failed: {}", e)))?
        .map_err(RsvpError::from)
    }
}

#[async_trait]
impl LedgerStore for EncryptedFileStore {
    async fn load_ledger(&self, workshop_id: &WorkshopId) -> Result<WorkshopLedger, RsvpError> {
        let path = self.path_for(workshop_id);
        match self.read_ledger(&path).await? {
            Some(ledger) => Ok(ledger),
            None => {
                debug!(workshop_id = %workshop_id, "No ledger file yet, starting empty");
                Ok(WorkshopLedger::new())
            }
        }
    }

    async fn save_ledger(
        &self,
        workshop_id: &WorkshopId,
        ledger: &WorkshopLedger,
    ) -> Result<(), RsvpError> {
        let path = self.path_for(workshop_id);
        let plaintext = serde_json::to_vec(ledger)?;
        let data = seal(&self.key, ledger.revision(), &plaintext)?;

        fs::create_dir_all(&self.dir).await?;

        let lock = self.lock_workshop(workshop_id).await?;
        check_revision(workshop_id, self.stored_revision(&path).await?, ledger)?;

        // Write atomically using a uniquely named temp file + rename
        let temp_path = path.with_extension(format!("{:016x}.tmp", rand::random::<u64>()));
        fs::write(&temp_path, &data).await?;
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        drop(lock);

        debug!(
            workshop_id = %workshop_id,
            revision = ledger.revision(),
            bytes = data.len(),
            "Saved encrypted ledger"
        );
        Ok(())
    }
}

/// Derive a 32-byte key: SHA256(passphrase || derivation label).
fn derive_key(passphrase: &SecretString) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(passphrase.expose_secret().as_bytes());
    hasher.update(KEY_DERIVATION_PATH.as_bytes());
    hasher.finalize().into()
}

/// Encrypt with a fresh random nonce, returning header + nonce + ciphertext.
fn seal(key: &[u8; 32], revision: u64, plaintext: &[u8]) -> Result<Vec<u8>, RsvpError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let header = revision.to_be_bytes();

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher.encrypt(
        nonce,
        Payload {
            msg: plaintext,
            aad: &header,
        },
    )?;

    let mut data = header.to_vec();
    data.extend_from_slice(&nonce_bytes);
    data.extend(ciphertext);
    Ok(data)
}

/// Decrypt a sealed file, returning its authenticated revision and plaintext.
fn open(key: &[u8; 32], data: &[u8]) -> Result<(u64, Vec<u8>), RsvpError> {
    if data.len() < REVISION_SIZE + NONCE_SIZE {
        return Err(RsvpError::Encryption("Ledger file too short".into()));
    }

    let (header, rest) = data.split_at(REVISION_SIZE);
    let (nonce, ciphertext) = rest.split_at(NONCE_SIZE);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: header,
            },
        )
        .map_err(|_| {
            RsvpError::Encryption(
                "Failed to decrypt ledger. The passphrase may have changed.".to_string(),
            )
        })?;

    let mut revision = [0u8; REVISION_SIZE];
    revision.copy_from_slice(header);
    Ok((u64::from_be_bytes(revision), plaintext))
}
