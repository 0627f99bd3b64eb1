//! Wallet lifecycle state machine.
//!
//! [`WalletController`] owns the only in-memory copy of the recovery phrase
//! and every transition of [`LifecycleState`]:
//!
//! ```text
//!   Uninitialized --create--> NeedsBackup --verify_backup--> Unlocked
//!   Uninitialized --import--> Unlocked
//!   Unlocked --lock--> Locked --unlock--> Unlocked | NeedsBackup
//!   any --wipe--> Uninitialized
//! ```
//!
//! The controller is not reentrant. Each operation takes the session for its
//! whole duration; an operation started while another is in flight fails
//! immediately with `ConcurrentOperationRejected`. Key derivation runs on the
//! blocking pool. Persistent and in-memory state change only once the whole
//! operation has succeeded, and observers see the new [`WalletStatus`] only
//! at that point.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::audit::{AuditLog, AuditRecord, AuditSink, LifecycleEvent};
use crate::backup::{BackupChallenge, ChallengePosition};
use crate::config::WalletConfig;
use crate::custody::{BackupFlags, Custody, CustodyKind, Located, Written};
use crate::error::VaultError;
use crate::identity::{AddressDeriver, SecurityLevel, SeedDigestDeriver, WalletIdentity};
use crate::mnemonic::Mnemonic;
use crate::payload::EncryptedPayload;
use crate::storage::{SecretStore, SlotStore};
use crate::vault::Vault;

/// Where the wallet is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleState {
    Uninitialized,
    /// Phrase held in memory; the user has not yet proven they wrote it down.
    NeedsBackup,
    Locked,
    /// Phrase held in memory and backup complete.
    Unlocked,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::NeedsBackup => "needs-backup",
            Self::Locked => "locked",
            Self::Unlocked => "unlocked",
        };
        f.write_str(name)
    }
}

/// Observable snapshot of the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletStatus {
    pub state: LifecycleState,
    pub needs_backup: bool,
    pub has_backed_up: bool,
    pub identity: Option<WalletIdentity>,
}

impl WalletStatus {
    fn uninitialized() -> Self {
        Self {
            state: LifecycleState::Uninitialized,
            needs_backup: false,
            has_backed_up: false,
            identity: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

struct Session {
    state: LifecycleState,
    flags: BackupFlags,
    identity: Option<WalletIdentity>,
    /// The single plaintext slot. Replacing or taking it drops, and thereby
    /// zeroises, the previous phrase.
    mnemonic: Option<Mnemonic>,
    challenge: Option<BackupChallenge>,
}

impl Session {
    fn new() -> Self {
        Self {
            state: LifecycleState::Uninitialized,
            flags: BackupFlags::default(),
            identity: None,
            mnemonic: None,
            challenge: None,
        }
    }

    fn status(&self) -> WalletStatus {
        WalletStatus {
            state: self.state,
            needs_backup: self.flags.needs_backup,
            has_backed_up: self.flags.has_backed_up,
            identity: self.identity.clone(),
        }
    }

    fn require(&self, operation: &'static str, allowed: &[LifecycleState]) -> Result<(), VaultError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(VaultError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn scrub(&mut self) {
        self.mnemonic = None;
        self.challenge = None;
    }
}

/// Run CPU-bound work (key derivation) off the async executor.
async fn blocking<T, F>(work: F) -> Result<T, VaultError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|_| VaultError::KeyDerivationFailure)
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Owns the wallet session and drives every lifecycle transition.
pub struct WalletController {
    vault: Vault,
    custody: Custody,
    deriver: Arc<dyn AddressDeriver>,
    session: Mutex<Session>,
    status: watch::Sender<WalletStatus>,
    audit: StdMutex<AuditLog>,
}

impl fmt::Debug for WalletController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletController")
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

impl WalletController {
    /// A controller over `slots`, starting `Uninitialized`. Call
    /// [`restore`](Self::restore) to pick up a persisted wallet.
    pub fn new(config: WalletConfig, slots: Arc<dyn SlotStore>) -> Result<Self, VaultError> {
        config.validate()?;
        let (status, _) = watch::channel(WalletStatus::uninitialized());
        Ok(Self {
            vault: Vault::new(config.argon2),
            custody: Custody::new(slots, config.slots, config.allow_weak_storage),
            deriver: Arc::new(SeedDigestDeriver),
            session: Mutex::new(Session::new()),
            status,
            audit: StdMutex::new(AuditLog::new()),
        })
    }

    /// Keep the phrase in a platform secret store. Takes precedence over
    /// password encryption and the plaintext slot.
    pub fn with_secret_store(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.custody.set_secret_store(secrets);
        self
    }

    /// Replace the default address derivation.
    pub fn with_deriver(mut self, deriver: Arc<dyn AddressDeriver>) -> Self {
        self.deriver = deriver;
        self
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    pub fn status(&self) -> WalletStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> LifecycleState {
        self.status.borrow().state
    }

    /// Receive a new [`WalletStatus`] after every committed transition.
    pub fn subscribe(&self) -> watch::Receiver<WalletStatus> {
        self.status.subscribe()
    }

    pub fn audit_records(&self) -> Vec<AuditRecord> {
        self.audit.lock().map(|log| log.records()).unwrap_or_default()
    }

    pub fn add_audit_sink(&self, sink: Box<dyn AuditSink>) {
        if let Ok(mut log) = self.audit.lock() {
            log.add_sink(sink);
        }
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Load the persisted wallet, if any. Nothing stored leaves the wallet
    /// `Uninitialized`; anything stored makes it `Locked`.
    pub async fn restore(&self) -> Result<WalletStatus, VaultError> {
        let mut session = self.enter()?;
        session.require("restore", &[LifecycleState::Uninitialized])?;

        if !self.custody.has_wallet().await? {
            debug!("no persisted wallet");
            return Ok(session.status());
        }
        let identity = self.custody.read_identity().await?;
        let flags = self.custody.read_flags().await?;

        session.identity = identity;
        session.flags = flags;
        self.commit(&mut session, LifecycleEvent::Restored, LifecycleState::Locked);
        Ok(session.status())
    }

    /// Generate a fresh 24-word wallet. An empty `password` stores the phrase
    /// without encryption when weak storage is allowed.
    ///
    /// The wallet enters `NeedsBackup` holding the phrase; show it with
    /// [`with_mnemonic`](Self::with_mnemonic). Fails with `WalletExists` if
    /// storage already holds a wallet.
    pub async fn create_wallet(&self, password: &str) -> Result<WalletIdentity, VaultError> {
        let mut session = self.enter()?;
        session.require("create_wallet", &[LifecycleState::Uninitialized])?;

        let kind = self.custody.select(password)?;
        let mnemonic = Mnemonic::generate()?;
        let challenge = BackupChallenge::generate(&mnemonic)?;
        let flags = BackupFlags {
            needs_backup: true,
            has_backed_up: false,
        };
        let (mnemonic, identity) = self.establish(mnemonic, password, kind, flags).await?;

        session.mnemonic = Some(mnemonic);
        session.challenge = Some(challenge);
        session.identity = Some(identity.clone());
        session.flags = flags;
        self.commit(&mut session, LifecycleEvent::Created, LifecycleState::NeedsBackup);
        Ok(identity)
    }

    /// Import an existing 12- or 24-word phrase. Imported wallets are taken
    /// as backed up and go straight to `Unlocked`.
    ///
    /// An invalid phrase fails before anything is written.
    pub async fn import_wallet(&self, phrase: &str, password: &str) -> Result<WalletIdentity, VaultError> {
        let mut session = self.enter()?;
        session.require("import_wallet", &[LifecycleState::Uninitialized])?;

        let mnemonic = Mnemonic::parse(phrase)?;
        let kind = self.custody.select(password)?;
        let flags = BackupFlags {
            needs_backup: false,
            has_backed_up: true,
        };
        let (mnemonic, identity) = self.establish(mnemonic, password, kind, flags).await?;

        session.mnemonic = Some(mnemonic);
        session.identity = Some(identity.clone());
        session.flags = flags;
        self.commit(&mut session, LifecycleEvent::Imported, LifecycleState::Unlocked);
        Ok(identity)
    }

    /// Start (or restart) the backup step with a freshly drawn challenge.
    pub async fn begin_backup(&self) -> Result<Vec<ChallengePosition>, VaultError> {
        let mut session = self.enter()?;
        session.require("begin_backup", &[LifecycleState::NeedsBackup])?;

        let mnemonic = session.mnemonic.as_ref().ok_or(VaultError::InvalidState {
            operation: "begin_backup",
            state: session.state,
        })?;
        let challenge = BackupChallenge::generate(mnemonic)?;
        let positions = challenge.positions();
        session.challenge = Some(challenge);

        self.record(LifecycleEvent::BackupStarted, session.state, session.state);
        Ok(positions)
    }

    /// Check the user's answers, keyed by zero-based word index.
    ///
    /// A missing or wrong answer leaves the wallet in `NeedsBackup` with the
    /// same challenge.
    pub async fn verify_backup(&self, answers: &HashMap<usize, String>) -> Result<(), VaultError> {
        let mut session = self.enter()?;
        session.require("verify_backup", &[LifecycleState::NeedsBackup])?;

        let challenge = session.challenge.as_ref().ok_or(VaultError::InvalidState {
            operation: "verify_backup",
            state: session.state,
        })?;
        if let Err(e) = challenge.verify(answers) {
            info!(error = %e, "backup verification rejected");
            self.record(LifecycleEvent::BackupRejected, session.state, session.state);
            return Err(e);
        }

        let flags = BackupFlags {
            needs_backup: false,
            has_backed_up: true,
        };
        self.custody.write_flags(flags).await?;

        session.challenge = None;
        session.flags = flags;
        self.commit(&mut session, LifecycleEvent::BackupVerified, LifecycleState::Unlocked);
        Ok(())
    }

    /// Drop the phrase from memory.
    pub fn lock(&self) -> Result<(), VaultError> {
        let mut session = self.enter()?;
        session.require("lock", &[LifecycleState::Unlocked])?;

        session.scrub();
        self.commit(&mut session, LifecycleEvent::Locked, LifecycleState::Locked);
        Ok(())
    }

    /// Recover the phrase from custody. Legacy payloads are re-encrypted
    /// under the current scheme, and a plaintext phrase is encrypted when a
    /// password is supplied.
    ///
    /// A wallet whose backup is still pending re-enters `NeedsBackup`.
    pub async fn unlock(&self, password: &str) -> Result<(), VaultError> {
        let mut session = self.enter()?;
        session.require("unlock", &[LifecycleState::Locked])?;

        let recovered = self.recover(&session, password).await;
        match recovered {
            Ok((mnemonic, identity, migrated)) => {
                let to = if session.flags.needs_backup {
                    session.challenge = Some(BackupChallenge::generate(&mnemonic)?);
                    LifecycleState::NeedsBackup
                } else {
                    LifecycleState::Unlocked
                };
                session.mnemonic = Some(mnemonic);
                session.identity = Some(identity);
                if migrated {
                    self.record(LifecycleEvent::Migrated, session.state, session.state);
                }
                self.commit(&mut session, LifecycleEvent::Unlocked, to);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "unlock rejected");
                self.record(LifecycleEvent::UnlockRejected, session.state, session.state);
                Err(e)
            }
        }
    }

    /// Re-encrypt the held phrase under `new_password`. Upgrades a weak
    /// wallet to strong and replaces the payload of a strong one.
    ///
    /// Done once the new payload is stored; if that write fails the old
    /// password (or the plaintext slot) still unlocks the wallet.
    pub async fn set_password(&self, new_password: &str) -> Result<(), VaultError> {
        let mut session = self.enter()?;
        session.require("set_password", &[LifecycleState::Unlocked])?;

        if new_password.is_empty() {
            return Err(VaultError::PasswordRequired);
        }
        if self.custody.has_secret_store() {
            return Err(VaultError::Config(
                "secret-store custody does not use a password".into(),
            ));
        }
        let mnemonic = session.mnemonic.take().ok_or(VaultError::InvalidState {
            operation: "set_password",
            state: session.state,
        })?;

        let (mnemonic, sealed) = match self.seal(mnemonic, new_password).await {
            Ok(sealed) => sealed,
            Err(e) => {
                // The phrase went down with the worker; nothing is held any more.
                self.commit(&mut session, LifecycleEvent::Locked, LifecycleState::Locked);
                return Err(e);
            }
        };
        session.mnemonic = Some(mnemonic);
        let payload = sealed?;

        let address = match &session.identity {
            Some(identity) => identity.address.clone(),
            None => self.derive(&session)?,
        };
        let identity = WalletIdentity {
            address,
            security_level: SecurityLevel::Strong,
        };
        self.custody.replace_payload(&payload).await?;
        self.settle(&identity).await;

        session.identity = Some(identity);
        self.commit(&mut session, LifecycleEvent::PasswordChanged, LifecycleState::Unlocked);
        Ok(())
    }

    /// Erase everything, persisted and in memory. Legal from any state. If
    /// storage cannot be cleared the state is left unchanged.
    pub async fn wipe(&self) -> Result<(), VaultError> {
        let mut session = self.enter()?;
        self.custody.erase_all().await?;

        session.scrub();
        session.identity = None;
        session.flags = BackupFlags::default();
        self.commit(&mut session, LifecycleEvent::Wiped, LifecycleState::Uninitialized);
        Ok(())
    }

    /// Lend the phrase to `f` while it is held (`NeedsBackup` or `Unlocked`).
    pub fn with_mnemonic<R>(&self, f: impl FnOnce(&Mnemonic) -> R) -> Result<R, VaultError> {
        let session = self.enter()?;
        session.require("with_mnemonic", &[LifecycleState::NeedsBackup, LifecycleState::Unlocked])?;

        session
            .mnemonic
            .as_ref()
            .map(f)
            .ok_or(VaultError::InvalidState {
                operation: "with_mnemonic",
                state: session.state,
            })
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn enter(&self) -> Result<MutexGuard<'_, Session>, VaultError> {
        self.session
            .try_lock()
            .map_err(|_| VaultError::ConcurrentOperationRejected)
    }

    fn commit(&self, session: &mut Session, event: LifecycleEvent, to: LifecycleState) {
        let from = session.state;
        session.state = to;
        if matches!(to, LifecycleState::Locked | LifecycleState::Uninitialized) {
            session.scrub();
        }
        info!(%from, %to, event = ?event, "wallet transition");
        self.record(event, from, to);
        self.status.send_replace(session.status());
    }

    fn record(&self, event: LifecycleEvent, from: LifecycleState, to: LifecycleState) {
        if let Ok(mut log) = self.audit.lock() {
            log.append(AuditRecord::now(event, from, to));
        }
    }

    fn derive(&self, session: &Session) -> Result<String, VaultError> {
        let mnemonic = session.mnemonic.as_ref().ok_or(VaultError::InvalidState {
            operation: "derive_address",
            state: session.state,
        })?;
        self.deriver.derive_address(mnemonic)
    }

    /// Encrypt on the blocking pool. The phrase comes back whatever the
    /// outcome so the caller decides whether to keep it.
    async fn seal(
        &self,
        mnemonic: Mnemonic,
        password: &str,
    ) -> Result<(Mnemonic, Result<EncryptedPayload, VaultError>), VaultError> {
        let vault = self.vault;
        let password = Zeroizing::new(password.to_owned());
        blocking(move || {
            let sealed = vault.encrypt(&mnemonic, &password);
            (mnemonic, sealed)
        })
        .await
    }

    /// Persist a new wallet into an empty store. On failure the slots this
    /// call wrote are removed again; anything else is left alone.
    async fn establish(
        &self,
        mnemonic: Mnemonic,
        password: &str,
        kind: CustodyKind,
        flags: BackupFlags,
    ) -> Result<(Mnemonic, WalletIdentity), VaultError> {
        if self.custody.has_wallet().await? {
            return Err(VaultError::WalletExists);
        }
        let identity = WalletIdentity {
            address: self.deriver.derive_address(&mnemonic)?,
            security_level: kind.security_level(),
        };
        let (mnemonic, payload) = if kind == CustodyKind::EncryptedPayload {
            let (mnemonic, sealed) = self.seal(mnemonic, password).await?;
            (mnemonic, Some(sealed?))
        } else {
            (mnemonic, None)
        };

        let mut written = Written::default();
        let outcome = async {
            written.phrase = true;
            match (&payload, kind) {
                (Some(payload), _) => self.custody.replace_payload(payload).await?,
                (None, CustodyKind::SecretStore) => self.custody.put_secret(mnemonic.as_str()).await?,
                (None, _) => self.custody.write_legacy(mnemonic.as_str()).await?,
            }
            written.identity = true;
            self.custody.write_identity(&identity).await?;
            written.flags = true;
            self.custody.write_flags(flags).await
        }
        .await;

        if let Err(e) = outcome {
            self.custody.discard(kind, written).await;
            return Err(e);
        }

        debug!(custody = ?kind, security_level = %identity.security_level, "wallet persisted");
        Ok((mnemonic, identity))
    }

    /// Follow-up writes once a new payload is committed. The payload alone
    /// decides how the wallet unlocks, so failures here are logged and
    /// repaired by the next unlock.
    async fn settle(&self, identity: &WalletIdentity) {
        self.custody.clear_stale_legacy().await;
        if let Err(e) = self.custody.write_identity(identity).await {
            warn!(error = %e, "identity record not updated");
        }
    }

    /// Read the phrase back from custody and perform any pending upgrade.
    /// Returns whether the stored payload was rewritten.
    async fn recover(
        &self,
        session: &Session,
        password: &str,
    ) -> Result<(Mnemonic, WalletIdentity, bool), VaultError> {
        let located = self.custody.locate().await?;
        let kind = located.kind();

        let (mnemonic, upgrade) = match located {
            Located::Secret(phrase) => {
                let mnemonic =
                    Mnemonic::parse(&phrase).map_err(|_| VaultError::WrongPasswordOrCorruptPayload)?;
                (mnemonic, None)
            }
            Located::Payload(payload) => self.open(payload, password).await?,
            Located::Legacy(phrase) => {
                let mnemonic =
                    Mnemonic::parse(&phrase).map_err(|_| VaultError::WrongPasswordOrCorruptPayload)?;
                if password.is_empty() {
                    (mnemonic, None)
                } else {
                    let (mnemonic, sealed) = self.seal(mnemonic, password).await?;
                    (mnemonic, Some(sealed?))
                }
            }
        };

        let address = self.deriver.derive_address(&mnemonic)?;
        if let Some(expected) = &session.identity {
            if expected.address != address {
                return Err(VaultError::WrongPasswordOrCorruptPayload);
            }
        }

        let migrated = upgrade.is_some();
        let identity = WalletIdentity {
            address,
            security_level: if migrated {
                SecurityLevel::Strong
            } else {
                kind.security_level()
            },
        };

        if let Some(payload) = upgrade {
            self.custody.replace_payload(&payload).await?;
            self.settle(&identity).await;
        } else {
            if kind == CustodyKind::EncryptedPayload {
                self.custody.clear_stale_legacy().await;
            }
            if session.identity.as_ref() != Some(&identity) {
                if let Err(e) = self.custody.write_identity(&identity).await {
                    warn!(error = %e, "identity record not updated");
                }
            }
        }
        Ok((mnemonic, identity, migrated))
    }

    /// Decrypt `payload` on the blocking pool, re-encrypting legacy payloads
    /// under the current scheme.
    async fn open(
        &self,
        payload: EncryptedPayload,
        password: &str,
    ) -> Result<(Mnemonic, Option<EncryptedPayload>), VaultError> {
        let vault = self.vault;
        let password = Zeroizing::new(password.to_owned());
        blocking(move || -> Result<(Mnemonic, Option<EncryptedPayload>), VaultError> {
            let mnemonic = vault.decrypt(&payload, &password)?;
            if Vault::is_migration_needed(&payload) {
                debug!(from = %payload.version(), "re-encrypting legacy payload");
                let upgraded = vault.encrypt(&mnemonic, &password)?;
                Ok((mnemonic, Some(upgraded)))
            } else {
                Ok((mnemonic, None))
            }
        })
        .await?
    }
}
