//! Where the recovery phrase lives at rest.
//!
//! Three custodians, in fixed precedence:
//!
//! 1. the platform [`SecretStore`], when one was supplied at construction;
//! 2. the password-encrypted payload slot;
//! 3. the deprecated plaintext slot (weak mode).
//!
//! The identity record and the backup flags live in ordinary slots next to
//! whichever custodian holds the phrase.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::SlotNames;
use crate::error::VaultError;
use crate::identity::{SecurityLevel, WalletIdentity};
use crate::payload::EncryptedPayload;
use crate::storage::{SecretStore, SlotStore};

/// Which custodian holds the phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CustodyKind {
    SecretStore,
    EncryptedPayload,
    LegacyPlaintext,
}

impl CustodyKind {
    pub fn security_level(self) -> SecurityLevel {
        match self {
            Self::SecretStore | Self::EncryptedPayload => SecurityLevel::Strong,
            Self::LegacyPlaintext => SecurityLevel::Weak,
        }
    }
}

/// What [`Custody::locate`] found.
pub(crate) enum Located {
    Secret(Zeroizing<String>),
    Payload(EncryptedPayload),
    Legacy(Zeroizing<String>),
}

impl Located {
    pub(crate) fn kind(&self) -> CustodyKind {
        match self {
            Self::Secret(_) => CustodyKind::SecretStore,
            Self::Payload(_) => CustodyKind::EncryptedPayload,
            Self::Legacy(_) => CustodyKind::LegacyPlaintext,
        }
    }
}

/// Persistence flags that travel with the wallet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct BackupFlags {
    pub needs_backup: bool,
    pub has_backed_up: bool,
}

pub(crate) struct Custody {
    slots: Arc<dyn SlotStore>,
    secrets: Option<Arc<dyn SecretStore>>,
    names: SlotNames,
    allow_weak: bool,
}

impl Custody {
    pub(crate) fn new(slots: Arc<dyn SlotStore>, names: SlotNames, allow_weak: bool) -> Self {
        Self {
            slots,
            secrets: None,
            names,
            allow_weak,
        }
    }

    pub(crate) fn set_secret_store(&mut self, secrets: Arc<dyn SecretStore>) {
        self.secrets = Some(secrets);
    }

    pub(crate) fn has_secret_store(&self) -> bool {
        self.secrets.is_some()
    }

    /// Custodian for a new wallet. An empty password means "no password".
    pub(crate) fn select(&self, password: &str) -> Result<CustodyKind, VaultError> {
        if self.secrets.is_some() {
            Ok(CustodyKind::SecretStore)
        } else if !password.is_empty() {
            Ok(CustodyKind::EncryptedPayload)
        } else if self.allow_weak {
            Ok(CustodyKind::LegacyPlaintext)
        } else {
            Err(VaultError::PasswordRequired)
        }
    }

    /// Whether any wallet slot is populated. Never prompts.
    pub(crate) async fn has_wallet(&self) -> Result<bool, VaultError> {
        for slot in [&self.names.identity, &self.names.payload, &self.names.legacy_mnemonic] {
            if self.slots.read(slot).await?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Find the phrase, honouring precedence. Reading the secret store may
    /// prompt for device authentication.
    pub(crate) async fn locate(&self) -> Result<Located, VaultError> {
        if let Some(secrets) = &self.secrets {
            if let Some(phrase) = secrets.get().await? {
                return Ok(Located::Secret(phrase));
            }
        }
        if let Some(json) = self.slots.read(&self.names.payload).await? {
            return EncryptedPayload::from_json(&json).map(Located::Payload);
        }
        if let Some(phrase) = self.slots.read(&self.names.legacy_mnemonic).await? {
            return Ok(Located::Legacy(Zeroizing::new(phrase)));
        }
        Err(VaultError::NoWalletFound)
    }

    // -----------------------------------------------------------------------
    // Phrase custody
    // -----------------------------------------------------------------------

    pub(crate) async fn put_secret(&self, phrase: &str) -> Result<(), VaultError> {
        match &self.secrets {
            Some(secrets) => secrets.put(phrase).await,
            None => Err(VaultError::StorageUnavailable("no secret store configured".into())),
        }
    }

    /// Replace the payload slot with `payload` and read it back.
    ///
    /// This is the commit point of every re-encryption: on any failure the
    /// slot is put back to its previous value, so the stored wallet is either
    /// the old one or the new one.
    pub(crate) async fn replace_payload(&self, payload: &EncryptedPayload) -> Result<(), VaultError> {
        let slot = &self.names.payload;
        let previous = self.slots.read(slot).await?;
        let json = payload.to_json()?;

        let written = async {
            self.slots.write(slot, &json).await?;
            match self.slots.read(slot).await? {
                Some(stored) if stored == json => Ok(()),
                _ => Err(VaultError::PersistenceVerificationFailed),
            }
        }
        .await;

        match written {
            Ok(()) => {
                debug!(version = %payload.version(), "payload persisted");
                Ok(())
            }
            Err(e) => {
                self.put_back(slot, previous.as_deref()).await;
                Err(e)
            }
        }
    }

    pub(crate) async fn write_legacy(&self, phrase: &str) -> Result<(), VaultError> {
        warn!("storing recovery phrase without a password");
        self.slots.write(&self.names.legacy_mnemonic, phrase).await
    }

    // -----------------------------------------------------------------------
    // Identity and flags
    // -----------------------------------------------------------------------

    pub(crate) async fn read_identity(&self) -> Result<Option<WalletIdentity>, VaultError> {
        let Some(json) = self.slots.read(&self.names.identity).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(identity) => Ok(Some(identity)),
            Err(e) => {
                warn!(error = %e, "ignoring unreadable identity record");
                Ok(None)
            }
        }
    }

    pub(crate) async fn write_identity(&self, identity: &WalletIdentity) -> Result<(), VaultError> {
        let json = serde_json::to_string(identity)
            .map_err(|e| VaultError::StorageUnavailable(e.to_string()))?;
        self.slots.write(&self.names.identity, &json).await
    }

    pub(crate) async fn read_flags(&self) -> Result<BackupFlags, VaultError> {
        Ok(BackupFlags {
            needs_backup: self.read_flag(&self.names.needs_backup).await?,
            has_backed_up: self.read_flag(&self.names.has_backed_up).await?,
        })
    }

    /// `needs_backup` is written last and is what decides whether the
    /// backup step is still pending; if it fails, `has_backed_up` is put
    /// back.
    pub(crate) async fn write_flags(&self, flags: BackupFlags) -> Result<(), VaultError> {
        let previous = self.slots.read(&self.names.has_backed_up).await?;
        self.slots
            .write(&self.names.has_backed_up, bool_str(flags.has_backed_up))
            .await?;

        if let Err(e) = self
            .slots
            .write(&self.names.needs_backup, bool_str(flags.needs_backup))
            .await
        {
            self.put_back(&self.names.has_backed_up, previous.as_deref()).await;
            return Err(e);
        }
        Ok(())
    }

    async fn read_flag(&self, slot: &str) -> Result<bool, VaultError> {
        Ok(self.slots.read(slot).await?.as_deref() == Some("true"))
    }

    /// Remove every slot and clear the secret store.
    pub(crate) async fn erase_all(&self) -> Result<(), VaultError> {
        for slot in [
            &self.names.payload,
            &self.names.legacy_mnemonic,
            &self.names.identity,
            &self.names.needs_backup,
            &self.names.has_backed_up,
        ] {
            self.slots.remove(slot).await?;
        }
        if let Some(secrets) = &self.secrets {
            secrets.clear().await?;
        }
        Ok(())
    }

    /// Undo the writes of a wallet creation that did not complete. Only what
    /// `written` names is touched.
    pub(crate) async fn discard(&self, kind: CustodyKind, written: Written) {
        let mut slots: Vec<&str> = Vec::new();
        if written.phrase {
            match kind {
                CustodyKind::SecretStore => {
                    if let Some(secrets) = &self.secrets {
                        if let Err(e) = secrets.clear().await {
                            warn!(error = %e, "could not clear secret store after failed creation");
                        }
                    }
                }
                CustodyKind::EncryptedPayload => slots.push(&self.names.payload),
                CustodyKind::LegacyPlaintext => slots.push(&self.names.legacy_mnemonic),
            }
        }
        if written.identity {
            slots.push(&self.names.identity);
        }
        if written.flags {
            slots.push(&self.names.needs_backup);
            slots.push(&self.names.has_backed_up);
        }
        for slot in slots {
            self.put_back(slot, None).await;
        }
    }

    /// Remove a plaintext slot left behind next to an encrypted payload.
    pub(crate) async fn clear_stale_legacy(&self) {
        let slot = &self.names.legacy_mnemonic;
        match self.slots.read(slot).await {
            Ok(Some(_)) => {
                if let Err(e) = self.slots.remove(slot).await {
                    warn!(error = %e, "stale plaintext slot could not be removed");
                } else {
                    info!("removed stale plaintext slot");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "could not check for stale plaintext slot"),
        }
    }

    /// Best-effort restore of `slot` to `value` (`None` removes it).
    async fn put_back(&self, slot: &str, value: Option<&str>) {
        let restored = match value {
            Some(value) => self.slots.write(slot, value).await,
            None => self.slots.remove(slot).await,
        };
        if let Err(e) = restored {
            warn!(slot, error = %e, "could not roll back slot");
        }
    }
}

/// Which parts of a new wallet reached storage.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Written {
    pub phrase: bool,
    pub identity: bool,
    pub flags: bool,
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemorySecretStore, MemorySlotStore};

    fn custody(allow_weak: bool) -> (Arc<MemorySlotStore>, Custody) {
        let slots = Arc::new(MemorySlotStore::new());
        let custody = Custody::new(slots.clone(), SlotNames::default(), allow_weak);
        (slots, custody)
    }

    #[test]
    fn selection_follows_precedence() {
        let (_, mut c) = custody(true);
        assert_eq!(c.select("").unwrap(), CustodyKind::LegacyPlaintext);
        assert_eq!(c.select("pw").unwrap(), CustodyKind::EncryptedPayload);

        c.set_secret_store(Arc::new(MemorySecretStore::new()));
        assert_eq!(c.select("").unwrap(), CustodyKind::SecretStore);
        assert_eq!(c.select("pw").unwrap(), CustodyKind::SecretStore);
    }

    #[test]
    fn weak_mode_can_be_disallowed() {
        let (_, c) = custody(false);
        assert!(matches!(c.select(""), Err(VaultError::PasswordRequired)));
        assert_eq!(c.select("pw").unwrap(), CustodyKind::EncryptedPayload);
    }

    #[tokio::test]
    async fn empty_store_has_no_wallet() {
        let (_, c) = custody(true);
        assert!(!c.has_wallet().await.unwrap());
        assert!(matches!(c.locate().await, Err(VaultError::NoWalletFound)));
    }

    #[tokio::test]
    async fn flags_round_trip_and_default_false() {
        let (_, c) = custody(true);
        assert_eq!(c.read_flags().await.unwrap(), BackupFlags::default());
        let flags = BackupFlags {
            needs_backup: true,
            has_backed_up: false,
        };
        c.write_flags(flags).await.unwrap();
        assert_eq!(c.read_flags().await.unwrap(), flags);
    }

    #[tokio::test]
    async fn erase_all_leaves_nothing_behind() {
        let (slots, mut c) = custody(true);
        let secrets = Arc::new(MemorySecretStore::new());
        c.set_secret_store(secrets.clone());

        c.put_secret("phrase").await.unwrap();
        c.write_legacy("phrase").await.unwrap();
        c.write_flags(BackupFlags::default()).await.unwrap();
        c.erase_all().await.unwrap();

        assert!(slots.slot_names().is_empty());
        assert!(!secrets.is_populated());
    }

    fn sealed(password: &str) -> EncryptedPayload {
        let vault = crate::vault::Vault::new(crate::kdf::Argon2Params {
            m_cost: 256,
            t_cost: 1,
            p_cost: 1,
        });
        let phrase = crate::mnemonic::Mnemonic::generate().unwrap();
        vault.encrypt(&phrase, password).unwrap()
    }

    #[tokio::test]
    async fn failed_payload_replacement_keeps_previous_record() {
        let (slots, c) = custody(true);
        let original = sealed("old");
        c.replace_payload(&original).await.unwrap();

        slots.set_frozen("wallet.encryptedMnemonic", true);
        assert!(c.replace_payload(&sealed("new")).await.is_err());
        slots.set_frozen("wallet.encryptedMnemonic", false);

        let stored = slots.read("wallet.encryptedMnemonic").await.unwrap().unwrap();
        assert_eq!(stored, original.to_json().unwrap());
    }

    #[tokio::test]
    async fn half_written_flags_are_rolled_back() {
        let (slots, c) = custody(true);
        let pending = BackupFlags {
            needs_backup: true,
            has_backed_up: false,
        };
        c.write_flags(pending).await.unwrap();

        slots.set_frozen("wallet.needsBackup", true);
        let done = BackupFlags {
            needs_backup: false,
            has_backed_up: true,
        };
        assert!(c.write_flags(done).await.is_err());
        assert_eq!(c.read_flags().await.unwrap(), pending);
    }

    #[tokio::test]
    async fn discard_touches_only_what_was_written() {
        let (slots, c) = custody(true);
        c.write_legacy("phrase").await.unwrap();
        c.replace_payload(&sealed("pw")).await.unwrap();
        c.write_flags(BackupFlags::default()).await.unwrap();

        c.discard(
            CustodyKind::EncryptedPayload,
            Written {
                phrase: true,
                identity: true,
                flags: false,
            },
        )
        .await;

        let mut left = slots.slot_names();
        left.sort();
        assert_eq!(left, ["wallet.hasBackedUp", "wallet.legacyMnemonic", "wallet.needsBackup"]);
    }

    #[tokio::test]
    async fn stale_plaintext_is_cleared() {
        let (slots, c) = custody(true);
        c.write_legacy("phrase").await.unwrap();
        c.clear_stale_legacy().await;
        assert!(slots.read("wallet.legacyMnemonic").await.unwrap().is_none());
        c.clear_stale_legacy().await;
    }

    #[tokio::test]
    async fn unreadable_identity_is_ignored() {
        let (slots, c) = custody(true);
        slots.write("wallet.identity", "not json").await.unwrap();
        assert!(c.read_identity().await.unwrap().is_none());
        assert!(c.has_wallet().await.unwrap());
    }
}
