//! Password-based key derivation and key ownership.
//!
//! This module owns two responsibilities:
//! 1. Mapping `(password, salt)` to a 256-bit payload key under one of two
//!    versioned schemes.
//! 2. Holding derived key material in a type that is opaque, non-cloneable
//!    and zeroised on drop.
//!
//! ## Schemes
//!
//! ```text
//! v1 (legacy)  PBKDF2-HMAC-SHA256, 100 000 iterations, 16-byte salt, 32-byte key
//! v2 (current) Argon2id v0x13, tunable m/t/p,          16-byte salt, 32-byte key
//! ```
//!
//! Both are pure functions of their inputs. v1 exists only so payloads
//! written by older installs can still be opened and migrated; nothing new
//! is ever sealed under it outside of `Vault::seal_legacy`.

use std::fmt;
use std::num::NonZeroU32;

use ring::pbkdf2;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::KEY_LEN;
use crate::error::VaultError;

/// Fixed iteration count of the legacy scheme.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Salt length for both schemes, in bytes.
pub const SALT_LEN: usize = 16;

// ---------------------------------------------------------------------------
// Versions
// ---------------------------------------------------------------------------

/// The key derivation scheme a payload was sealed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KdfVersion {
    /// PBKDF2-HMAC-SHA256. Weak against dedicated hardware; read-only.
    Pbkdf2Sha256 = 1,
    /// Argon2id. Memory-hard; used for every new payload.
    Argon2id = 2,
}

impl KdfVersion {
    /// The scheme every new payload is sealed under.
    pub const CURRENT: KdfVersion = KdfVersion::Argon2id;

    /// Numeric version as written to the persisted record.
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Parse the numeric version from a persisted record.
    pub fn from_u32(version: u32) -> Result<Self, VaultError> {
        match version {
            1 => Ok(Self::Pbkdf2Sha256),
            2 => Ok(Self::Argon2id),
            other => Err(VaultError::UnsupportedPayloadVersion(other)),
        }
    }

    /// The `kdf` label written alongside the version.
    pub fn label(self) -> &'static str {
        match self {
            Self::Pbkdf2Sha256 => "pbkdf2-sha256",
            Self::Argon2id => "argon2id",
        }
    }

    /// Whether payloads under this version must be re-encrypted.
    pub fn is_legacy(self) -> bool {
        self < Self::CURRENT
    }
}

impl fmt::Display for KdfVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{} ({})", self.as_u32(), self.label())
    }
}

// ---------------------------------------------------------------------------
// Argon2 parameters
// ---------------------------------------------------------------------------

/// Tunable cost parameters for the v2 scheme.
///
/// | Parameter | Default | Meaning |
/// |-----------|---------|---------|
/// | `m_cost`  | 65 536  | Memory in KiB (64 MiB) |
/// | `t_cost`  | 3       | Passes |
/// | `p_cost`  | 1       | Lanes |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argon2Params {
    /// Memory cost in KiB. Must be at least 8 × `p_cost`.
    pub m_cost: u32,
    /// Number of passes. Must be at least 1.
    pub t_cost: u32,
    /// Degree of parallelism. Must be at least 1.
    pub p_cost: u32,
}

/// How far a stored Argon2 cost may exceed the configured one before the
/// record is refused instead of derived.
pub const STORED_COST_HEADROOM: u32 = 4;

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            m_cost: 65_536,
            t_cost: 3,
            p_cost: 1,
        }
    }
}

impl Argon2Params {
    fn to_argon2(self) -> Result<argon2::Params, VaultError> {
        argon2::Params::new(self.m_cost, self.t_cost, self.p_cost, Some(KEY_LEN))
            .map_err(|_| VaultError::KeyDerivationFailure)
    }

    /// Whether a cost read from a stored record stays within
    /// [`STORED_COST_HEADROOM`] times `configured` (or the default cost, if
    /// larger) on every axis.
    pub fn within_budget(&self, configured: &Argon2Params) -> bool {
        let floor = Argon2Params::default();
        let ceiling = |ours: u32, default: u32| ours.max(default).saturating_mul(STORED_COST_HEADROOM);
        self.m_cost <= ceiling(configured.m_cost, floor.m_cost)
            && self.t_cost <= ceiling(configured.t_cost, floor.t_cost)
            && self.p_cost <= ceiling(configured.p_cost, floor.p_cost)
    }

    /// Reject parameter sets the Argon2 implementation would refuse.
    pub fn validate(&self) -> Result<(), VaultError> {
        self.to_argon2()
            .map(|_| ())
            .map_err(|_| VaultError::Config(format!("invalid argon2 parameters: {:?}", self)))
    }
}

// ---------------------------------------------------------------------------
// Derived key
// ---------------------------------------------------------------------------

/// A payload key derived from a password.
///
/// - Not `Clone`. Each derivation yields exactly one owner.
/// - Zeroised on drop.
/// - Raw bytes never leave the crate.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; KEY_LEN],
}

impl DerivedKey {
    /// Borrow the raw key bytes for use in seal/open operations.
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Derive the payload key for `version`.
///
/// `argon2` is ignored for v1. Re-deriving with the same inputs always
/// reproduces the same key, so decryption needs nothing beyond the password
/// and what the payload record already stores.
pub fn derive_key(
    version: KdfVersion,
    password: &str,
    salt: &[u8],
    argon2: &Argon2Params,
) -> Result<DerivedKey, VaultError> {
    if salt.len() < SALT_LEN {
        return Err(VaultError::KeyDerivationFailure);
    }
    match version {
        KdfVersion::Pbkdf2Sha256 => Ok(pbkdf2_sha256(password, salt)),
        KdfVersion::Argon2id => argon2id(password, salt, argon2),
    }
}

fn pbkdf2_sha256(password: &str, salt: &[u8]) -> DerivedKey {
    let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).unwrap_or(NonZeroU32::MIN);
    let mut bytes = [0u8; KEY_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        password.as_bytes(),
        &mut bytes,
    );
    DerivedKey { bytes }
}

fn argon2id(password: &str, salt: &[u8], params: &Argon2Params) -> Result<DerivedKey, VaultError> {
    let hasher = argon2::Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        params.to_argon2()?,
    );
    let mut bytes = [0u8; KEY_LEN];
    hasher
        .hash_password_into(password.as_bytes(), salt, &mut bytes)
        .map_err(|_| VaultError::KeyDerivationFailure)?;
    Ok(DerivedKey { bytes })
}
