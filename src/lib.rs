//! # seedvault
//!
//! Password-encrypted custody of a BIP39 recovery phrase, and the lifecycle
//! of the wallet built on it.
//!
//! The phrase is sealed with AES-256-GCM under a key stretched from the
//! user's password (Argon2id for new payloads, PBKDF2 for legacy ones, which
//! are upgraded in place on the next unlock). A [`WalletController`] owns the
//! only in-memory copy of the phrase and moves the wallet through
//! `Uninitialized → NeedsBackup → Unlocked ⇄ Locked`, with a three-word
//! backup check guarding the way out of `NeedsBackup`.
//!
//! ## Public API
//!
//! The surface is deliberately small: the controller and its collaborators
//! (storage, secret store, address derivation), the [`Vault`] for callers
//! that only need sealing, and the value types they exchange. Primitive
//! cryptography stays crate-private.

pub(crate) mod crypto;
pub mod error;

pub mod audit;
pub mod backup;
pub mod config;
pub mod custody;
pub mod identity;
pub mod kdf;
pub mod lifecycle;
pub mod mnemonic;
pub mod payload;
pub mod storage;
pub mod vault;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use audit::{AuditLog, AuditRecord, AuditSink, FileAuditSink, LifecycleEvent};
pub use backup::{BackupChallenge, ChallengePosition, CHALLENGE_SIZE};
pub use config::{SlotNames, WalletConfig};
pub use custody::CustodyKind;
pub use error::{Result, VaultError};
pub use identity::{AddressDeriver, SecurityLevel, SeedDigestDeriver, WalletIdentity};
pub use kdf::{Argon2Params, KdfVersion};
pub use lifecycle::{LifecycleState, WalletController, WalletStatus};
pub use mnemonic::Mnemonic;
pub use payload::{EncryptedPayload, PayloadRecord};
pub use storage::{FileSlotStore, MemorySecretStore, MemorySlotStore, SecretStore, SlotStore};
pub use vault::Vault;
