//! Mnemonic encryption under a password-derived key.
//!
//! The vault is stateless apart from the Argon2 cost it seals new payloads
//! with. It never keeps plaintext: every decrypted phrase is handed straight
//! back to the caller as a zeroising [`Mnemonic`].
//!
//! ```text
//! encrypt: salt, nonce <- CSPRNG
//!          key  = KDF_v2(password, salt)
//!          ct   = AES-256-GCM(key, nonce, aad = "seedvault:v2", phrase)
//!          tag  = HMAC(HKDF(key), salt || phrase)
//! decrypt: key  = KDF_{payload.version}(password, salt)
//!          open, then (v2) verify tag
//! ```

use tracing::{debug, warn};

use crate::crypto;
use crate::error::VaultError;
use crate::kdf::{self, Argon2Params, KdfVersion, SALT_LEN};
use crate::mnemonic::Mnemonic;
use crate::payload::EncryptedPayload;

/// Associated data bound into every v2 ciphertext.
const V2_AAD: &[u8] = b"seedvault:v2";

/// v1 payloads were sealed without associated data.
const V1_AAD: &[u8] = b"";

fn aad_for(version: KdfVersion) -> &'static [u8] {
    match version {
        KdfVersion::Pbkdf2Sha256 => V1_AAD,
        KdfVersion::Argon2id => V2_AAD,
    }
}

/// Seals and opens mnemonic payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct Vault {
    argon2: Argon2Params,
}

impl Vault {
    /// A vault sealing new payloads with the given Argon2 cost.
    pub fn new(argon2: Argon2Params) -> Self {
        Self { argon2 }
    }

    /// The Argon2 cost applied to new payloads.
    pub fn argon2_params(&self) -> &Argon2Params {
        &self.argon2
    }

    /// Encrypt `mnemonic` under the current scheme with a fresh salt and nonce.
    pub fn encrypt(&self, mnemonic: &Mnemonic, password: &str) -> Result<EncryptedPayload, VaultError> {
        let salt = crypto::random_bytes::<SALT_LEN>()?;
        let nonce = crypto::random_bytes::<{ crypto::NONCE_LEN }>()?;
        let version = KdfVersion::CURRENT;

        let key = kdf::derive_key(version, password, &salt, &self.argon2)?;
        let plaintext = mnemonic.as_str().as_bytes();
        let ciphertext = crypto::seal(key.as_bytes(), &nonce, aad_for(version), plaintext)?;
        let integrity = crypto::integrity_digest(key.as_bytes(), &salt, plaintext)?;

        debug!(%version, "sealed mnemonic payload");
        Ok(EncryptedPayload {
            ciphertext,
            nonce,
            salt,
            version,
            integrity: Some(integrity),
            argon2: Some(self.argon2),
        })
    }

    /// Decrypt `payload` with `password`, deriving the key per the payload's
    /// own version.
    ///
    /// A wrong password, a tampered ciphertext and a digest mismatch all
    /// return `WrongPasswordOrCorruptPayload`, as does a stored Argon2 cost
    /// far above the configured one.
    pub fn decrypt(&self, payload: &EncryptedPayload, password: &str) -> Result<Mnemonic, VaultError> {
        let argon2 = payload.argon2.unwrap_or(self.argon2);
        if !argon2.within_budget(&self.argon2) {
            warn!(?argon2, "stored kdf cost exceeds budget");
            return Err(VaultError::WrongPasswordOrCorruptPayload);
        }
        let key = kdf::derive_key(payload.version, password, &payload.salt, &argon2)?;
        let plaintext = crypto::open(
            key.as_bytes(),
            &payload.nonce,
            aad_for(payload.version),
            &payload.ciphertext,
        )?;

        if payload.version == KdfVersion::Argon2id {
            let expected = payload
                .integrity
                .as_ref()
                .ok_or(VaultError::WrongPasswordOrCorruptPayload)?;
            crypto::verify_integrity(key.as_bytes(), &payload.salt, &plaintext, expected)?;
        }

        debug!(version = %payload.version, "opened mnemonic payload");
        Mnemonic::from_plaintext(plaintext)
    }

    /// Whether `payload` was sealed under the legacy scheme and must be
    /// re-encrypted after the next successful unlock.
    pub fn is_migration_needed(payload: &EncryptedPayload) -> bool {
        payload.version.is_legacy()
    }

    /// `Err(MigrationRequired)` for legacy payloads, `Ok(())` otherwise.
    pub fn ensure_current(payload: &EncryptedPayload) -> Result<(), VaultError> {
        if Self::is_migration_needed(payload) {
            Err(VaultError::MigrationRequired)
        } else {
            Ok(())
        }
    }

    /// Seal under the legacy v1 scheme, byte-compatible with payloads written
    /// by older installs (PBKDF2-SHA256, no AAD, no digest).
    ///
    /// Never used by the wallet lifecycle; it exists to produce fixtures and
    /// to re-create legacy exports for interop checks.
    pub fn seal_legacy(mnemonic: &Mnemonic, password: &str) -> Result<EncryptedPayload, VaultError> {
        let salt = crypto::random_bytes::<SALT_LEN>()?;
        let nonce = crypto::random_bytes::<{ crypto::NONCE_LEN }>()?;
        let version = KdfVersion::Pbkdf2Sha256;

        let key = kdf::derive_key(version, password, &salt, &Argon2Params::default())?;
        let ciphertext = crypto::seal(key.as_bytes(), &nonce, aad_for(version), mnemonic.as_str().as_bytes())?;

        Ok(EncryptedPayload {
            ciphertext,
            nonce,
            salt,
            version,
            integrity: None,
            argon2: None,
        })
    }
}
