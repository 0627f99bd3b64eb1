//! Persistence collaborators.
//!
//! Two seams, both asynchronous:
//!
//! - [`SlotStore`]: named string slots (the encrypted payload record, the
//!   backup flags, the identity, the deprecated plaintext slot).
//! - [`SecretStore`]: a platform keychain holding the phrase itself, possibly
//!   behind a device authentication prompt.
//!
//! A missing slot or an empty keychain is `Ok(None)`. An unreachable backend
//! is `StorageUnavailable` and must never be read as "no wallet".

use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use zeroize::Zeroizing;

use crate::error::VaultError;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Key-value persistence for wallet slots.
#[async_trait]
pub trait SlotStore: Send + Sync {
    /// Read a slot. `Ok(None)` when the slot was never written or was removed.
    async fn read(&self, slot: &str) -> Result<Option<String>, VaultError>;

    /// Replace a slot's value in full.
    async fn write(&self, slot: &str, value: &str) -> Result<(), VaultError>;

    /// Remove a slot. Removing a missing slot succeeds.
    async fn remove(&self, slot: &str) -> Result<(), VaultError>;
}

/// Platform secret store (keychain, keystore, secure enclave).
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Store `secret`, replacing any previous entry.
    async fn put(&self, secret: &str) -> Result<(), VaultError>;

    /// Fetch the secret. May prompt for device authentication and fail with
    /// `AuthenticationCancelled`. `Ok(None)` means nothing is stored.
    async fn get(&self) -> Result<Option<Zeroizing<String>>, VaultError>;

    /// Delete the entry. Clearing an empty store succeeds.
    async fn clear(&self) -> Result<(), VaultError>;
}

fn poisoned<T>(_: T) -> VaultError {
    VaultError::StorageUnavailable("store lock poisoned".into())
}

// ---------------------------------------------------------------------------
// In-memory slots
// ---------------------------------------------------------------------------

/// Volatile slot store. Values are zeroised when removed or overwritten.
///
/// Can be switched offline, or have single slots frozen, to exercise
/// `StorageUnavailable` paths.
#[derive(Default)]
pub struct MemorySlotStore {
    slots: Mutex<HashMap<String, Zeroizing<String>>>,
    offline: AtomicBool,
    frozen: Mutex<HashSet<String>>,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the backend becoming unreachable (`true`) or recovering.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make writes and removes of one slot fail (`true`) while reads keep
    /// working, or lift that again.
    pub fn set_frozen(&self, slot: &str, frozen: bool) {
        if let Ok(mut set) = self.frozen.lock() {
            if frozen {
                set.insert(slot.to_string());
            } else {
                set.remove(slot);
            }
        }
    }

    /// Names of all slots currently holding a value.
    pub fn slot_names(&self) -> Vec<String> {
        self.slots
            .lock()
            .map(|slots| slots.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn check_online(&self) -> Result<(), VaultError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(VaultError::StorageUnavailable("memory store offline".into()))
        } else {
            Ok(())
        }
    }

    fn check_writable(&self, slot: &str) -> Result<(), VaultError> {
        self.check_online()?;
        let frozen = self.frozen.lock().map_err(poisoned)?;
        if frozen.contains(slot) {
            return Err(VaultError::StorageUnavailable(format!("slot {slot} is read-only")));
        }
        Ok(())
    }
}

#[async_trait]
impl SlotStore for MemorySlotStore {
    async fn read(&self, slot: &str) -> Result<Option<String>, VaultError> {
        self.check_online()?;
        let slots = self.slots.lock().map_err(poisoned)?;
        Ok(slots.get(slot).map(|value| value.to_string()))
    }

    async fn write(&self, slot: &str, value: &str) -> Result<(), VaultError> {
        self.check_writable(slot)?;
        let mut slots = self.slots.lock().map_err(poisoned)?;
        slots.insert(slot.to_string(), Zeroizing::new(value.to_string()));
        Ok(())
    }

    async fn remove(&self, slot: &str) -> Result<(), VaultError> {
        self.check_writable(slot)?;
        let mut slots = self.slots.lock().map_err(poisoned)?;
        slots.remove(slot);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File-backed slots
// ---------------------------------------------------------------------------

/// One file per slot under a base directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// slot is always either its old or its new value. On Unix the staging file
/// is created with mode 0600, so the value is never readable by others.
#[derive(Debug, Clone)]
pub struct FileSlotStore {
    base: PathBuf,
}

impl FileSlotStore {
    /// A store rooted at `base`. The directory is created on first write.
    pub fn new(base: impl AsRef<Path>) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    fn path_for(&self, slot: &str) -> Result<PathBuf, VaultError> {
        if slot.is_empty() || slot.contains(['/', '\\']) || slot.starts_with('.') {
            return Err(VaultError::StorageUnavailable(format!("invalid slot name: {slot:?}")));
        }
        Ok(self.base.join(slot))
    }
}

fn io_unavailable(err: std::io::Error) -> VaultError {
    VaultError::StorageUnavailable(err.to_string())
}

#[async_trait]
impl SlotStore for FileSlotStore {
    async fn read(&self, slot: &str) -> Result<Option<String>, VaultError> {
        let path = self.path_for(slot)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_unavailable(e)),
        }
    }

    async fn write(&self, slot: &str, value: &str) -> Result<(), VaultError> {
        let path = self.path_for(slot)?;
        tokio::fs::create_dir_all(&self.base).await.map_err(io_unavailable)?;

        let staging = self.base.join(format!(".{slot}.tmp"));
        match tokio::fs::remove_file(&staging).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_unavailable(e)),
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&staging).await.map_err(io_unavailable)?;
        file.write_all(value.as_bytes()).await.map_err(io_unavailable)?;
        file.sync_all().await.map_err(io_unavailable)?;
        drop(file);

        tokio::fs::rename(&staging, &path).await.map_err(io_unavailable)
    }

    async fn remove(&self, slot: &str) -> Result<(), VaultError> {
        let path = self.path_for(slot)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_unavailable(e)),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory secret store
// ---------------------------------------------------------------------------

/// Volatile stand-in for a platform keychain.
///
/// The device prompt can be made to fail as if the user dismissed it.
#[derive(Default)]
pub struct MemorySecretStore {
    secret: Mutex<Option<Zeroizing<String>>>,
    cancel_prompt: AtomicBool,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `get` calls fail with `AuthenticationCancelled`.
    pub fn set_prompt_cancelled(&self, cancelled: bool) {
        self.cancel_prompt.store(cancelled, Ordering::SeqCst);
    }

    /// Whether an entry is stored. Does not prompt.
    pub fn is_populated(&self) -> bool {
        self.secret.lock().map(|s| s.is_some()).unwrap_or(false)
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn put(&self, secret: &str) -> Result<(), VaultError> {
        let mut slot = self.secret.lock().map_err(poisoned)?;
        *slot = Some(Zeroizing::new(secret.to_string()));
        Ok(())
    }

    async fn get(&self) -> Result<Option<Zeroizing<String>>, VaultError> {
        if self.cancel_prompt.load(Ordering::SeqCst) {
            return Err(VaultError::AuthenticationCancelled);
        }
        let slot = self.secret.lock().map_err(poisoned)?;
        Ok(slot.as_ref().map(|s| Zeroizing::new(s.to_string())))
    }

    async fn clear(&self) -> Result<(), VaultError> {
        let mut slot = self.secret.lock().map_err(poisoned)?;
        *slot = None;
        Ok(())
    }
}
