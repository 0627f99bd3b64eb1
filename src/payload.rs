//! The encrypted payload and its persisted record.
//!
//! In memory a payload holds raw bytes; on disk it is a JSON record with
//! base64 fields:
//!
//! ```text
//! {
//!   "cipherBase64": "...",          // ciphertext || GCM tag
//!   "ivBase64": "...",              // 12-byte nonce
//!   "saltBase64": "...",            // 16-byte KDF salt
//!   "version": 1 | 2,
//!   "kdf": "argon2id",              // explicit in v2, implied in v1
//!   "integrity": "...",             // v2 only
//!   "kdfParams": { "m_cost": .. }   // v2 only
//! }
//! ```
//!
//! v1 records written by older installs carry only the first four fields and
//! are accepted as-is.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::crypto::{DIGEST_LEN, NONCE_LEN};
use crate::error::VaultError;
use crate::kdf::{Argon2Params, KdfVersion, SALT_LEN};

/// An encrypted mnemonic. Immutable once built; replaced wholesale on
/// re-encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    pub(crate) ciphertext: Vec<u8>,
    pub(crate) nonce: [u8; NONCE_LEN],
    pub(crate) salt: [u8; SALT_LEN],
    pub(crate) version: KdfVersion,
    pub(crate) integrity: Option<[u8; DIGEST_LEN]>,
    pub(crate) argon2: Option<Argon2Params>,
}

impl EncryptedPayload {
    /// The KDF scheme this payload was sealed under.
    pub fn version(&self) -> KdfVersion {
        self.version
    }

    /// Ciphertext followed by the AEAD tag.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    /// The integrity digest. Present for v2 only.
    pub fn integrity(&self) -> Option<&[u8; DIGEST_LEN]> {
        self.integrity.as_ref()
    }

    /// Argon2 parameters recorded at seal time. Present for v2 only.
    pub fn argon2_params(&self) -> Option<&Argon2Params> {
        self.argon2.as_ref()
    }

    /// Convert to the persisted record.
    pub fn to_record(&self) -> PayloadRecord {
        let v2 = self.version == KdfVersion::Argon2id;
        PayloadRecord {
            cipher_base64: STANDARD.encode(&self.ciphertext),
            iv_base64: STANDARD.encode(self.nonce),
            salt_base64: STANDARD.encode(self.salt),
            version: self.version.as_u32(),
            kdf: v2.then(|| self.version.label().to_string()),
            integrity: self.integrity.map(|digest| STANDARD.encode(digest)),
            kdf_params: self.argon2,
        }
    }

    /// Validate and decode a persisted record.
    ///
    /// Structural problems (bad base64, wrong field lengths, a `kdf` label
    /// that contradicts the version, a v2 record without its digest) are
    /// reported as `WrongPasswordOrCorruptPayload`, the same as a failed
    /// decryption.
    pub fn from_record(record: &PayloadRecord) -> Result<Self, VaultError> {
        let version = KdfVersion::from_u32(record.version)?;

        if let Some(label) = &record.kdf {
            if label != version.label() {
                return Err(VaultError::WrongPasswordOrCorruptPayload);
            }
        }

        let ciphertext = decode(&record.cipher_base64)?;
        let nonce = decode_fixed::<NONCE_LEN>(&record.iv_base64)?;
        let salt = decode_fixed::<SALT_LEN>(&record.salt_base64)?;

        let (integrity, argon2) = match version {
            KdfVersion::Pbkdf2Sha256 => (None, None),
            KdfVersion::Argon2id => {
                let digest = record
                    .integrity
                    .as_deref()
                    .ok_or(VaultError::WrongPasswordOrCorruptPayload)?;
                (
                    Some(decode_fixed::<DIGEST_LEN>(digest)?),
                    Some(record.kdf_params.unwrap_or_default()),
                )
            }
        };

        Ok(Self {
            ciphertext,
            nonce,
            salt,
            version,
            integrity,
            argon2,
        })
    }

    /// Serialise to the JSON form stored in the payload slot.
    pub fn to_json(&self) -> Result<String, VaultError> {
        serde_json::to_string(&self.to_record()).map_err(|_| VaultError::EncryptionFailure)
    }

    /// Parse the JSON form stored in the payload slot.
    pub fn from_json(json: &str) -> Result<Self, VaultError> {
        let record: PayloadRecord =
            serde_json::from_str(json).map_err(|_| VaultError::WrongPasswordOrCorruptPayload)?;
        Self::from_record(&record)
    }
}

/// The persisted JSON shape of an [`EncryptedPayload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadRecord {
    pub cipher_base64: String,
    pub iv_base64: String,
    pub salt_base64: String,
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kdf: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kdf_params: Option<Argon2Params>,
}

fn decode(field: &str) -> Result<Vec<u8>, VaultError> {
    STANDARD
        .decode(field)
        .map_err(|_| VaultError::WrongPasswordOrCorruptPayload)
}

fn decode_fixed<const N: usize>(field: &str) -> Result<[u8; N], VaultError> {
    decode(field)?
        .try_into()
        .map_err(|_| VaultError::WrongPasswordOrCorruptPayload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v2_payload() -> EncryptedPayload {
        EncryptedPayload {
            ciphertext: vec![1, 2, 3, 4],
            nonce: [5u8; NONCE_LEN],
            salt: [6u8; SALT_LEN],
            version: KdfVersion::Argon2id,
            integrity: Some([7u8; DIGEST_LEN]),
            argon2: Some(Argon2Params::default()),
        }
    }

    #[test]
    fn record_uses_documented_field_names() {
        let json = v2_payload().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        for field in ["cipherBase64", "ivBase64", "saltBase64", "version", "kdf", "integrity", "kdfParams"] {
            assert!(value.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(value["version"], 2);
        assert_eq!(value["kdf"], "argon2id");
    }

    #[test]
    fn json_roundtrip_preserves_payload() {
        let payload = v2_payload();
        assert_eq!(EncryptedPayload::from_json(&payload.to_json().unwrap()).unwrap(), payload);
    }

    #[test]
    fn legacy_record_without_optional_fields_is_accepted() {
        let json = format!(
            r#"{{"cipherBase64":"AQID","ivBase64":"{}","saltBase64":"{}","version":1}}"#,
            STANDARD.encode([0u8; NONCE_LEN]),
            STANDARD.encode([0u8; SALT_LEN]),
        );
        let payload = EncryptedPayload::from_json(&json).unwrap();
        assert_eq!(payload.version(), KdfVersion::Pbkdf2Sha256);
        assert!(payload.integrity().is_none());
        assert!(!payload.to_json().unwrap().contains("kdf"));
    }

    #[test]
    fn v2_record_without_digest_is_corrupt() {
        let mut record = v2_payload().to_record();
        record.integrity = None;
        assert!(matches!(
            EncryptedPayload::from_record(&record),
            Err(VaultError::WrongPasswordOrCorruptPayload)
        ));
    }

    #[test]
    fn contradictory_kdf_label_is_corrupt() {
        let mut record = v2_payload().to_record();
        record.kdf = Some("pbkdf2-sha256".into());
        assert!(EncryptedPayload::from_record(&record).is_err());
    }

    #[test]
    fn unknown_version_is_reported() {
        let mut record = v2_payload().to_record();
        record.version = 9;
        assert!(matches!(
            EncryptedPayload::from_record(&record),
            Err(VaultError::UnsupportedPayloadVersion(9))
        ));
    }

    #[test]
    fn wrong_nonce_length_is_corrupt() {
        let mut record = v2_payload().to_record();
        record.iv_base64 = STANDARD.encode([0u8; 8]);
        assert!(EncryptedPayload::from_record(&record).is_err());
    }
}
