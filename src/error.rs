//! Error types for seedvault.
//!
//! Every variant is a distinct failure mode of the vault or the wallet
//! lifecycle. Messages say *what* failed and never carry secret material:
//! no mnemonic words, no passwords, no key bytes.

use thiserror::Error;

use crate::lifecycle::LifecycleState;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VaultError>;

/// The single error type for all seedvault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Word count is not 12 or 24, or the phrase fails BIP39 checksum
    /// validation.
    #[error("invalid mnemonic")]
    InvalidMnemonic,

    /// AEAD authentication or the integrity digest failed. A wrong password
    /// and a tampered payload are deliberately indistinguishable.
    #[error("wrong password or corrupt payload")]
    WrongPasswordOrCorruptPayload,

    /// The payload was sealed under the legacy KDF. Internal signal that
    /// triggers re-encryption; never returned from a lifecycle operation.
    #[error("payload uses a legacy key derivation scheme")]
    MigrationRequired,

    /// A wallet is already persisted in the store; creating or importing
    /// would overwrite it. Restore or wipe it first.
    #[error("a wallet already exists in storage")]
    WalletExists,

    /// Nothing is persisted: no payload, no fallback, no secret-store entry.
    #[error("no wallet found")]
    NoWalletFound,

    /// The persistence backend could not be reached. Callers must not read
    /// this as "no wallet".
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The platform secret-store prompt was dismissed.
    #[error("authentication cancelled")]
    AuthenticationCancelled,

    /// A lifecycle operation was invoked while another was in flight.
    #[error("another wallet operation is in progress")]
    ConcurrentOperationRejected,

    /// Weak (plaintext) storage is disabled and no password was supplied.
    #[error("a password is required")]
    PasswordRequired,

    /// The operation is not a legal transition from the current state.
    #[error("{operation} is not allowed while {state}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },

    /// Not every challenged backup position received an answer.
    #[error("backup verification incomplete")]
    BackupIncomplete,

    /// At least one backup answer did not match.
    #[error("backup words do not match")]
    BackupMismatch,

    /// The persisted record names a payload version this build cannot read.
    #[error("unsupported payload version: {0}")]
    UnsupportedPayloadVersion(u32),

    /// A payload written to storage did not read back identically.
    #[error("persisted payload failed read-back verification")]
    PersistenceVerificationFailed,

    /// Configuration could not be loaded or contains invalid parameters.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The system's random number generator failed to produce bytes.
    #[error("randomness source failed")]
    RandomnessFailure,

    /// The KDF rejected its parameters or failed to run.
    #[error("key derivation failed")]
    KeyDerivationFailure,

    /// Encryption failed.
    #[error("encryption failed")]
    EncryptionFailure,
}

impl VaultError {
    /// Whether the caller may retry or carry on after this error.
    ///
    /// Only a failed read-back of a just-written payload is fatal: the
    /// operation was aborted and storage can no longer be trusted.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::PersistenceVerificationFailed)
    }
}
