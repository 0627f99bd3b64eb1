//! Wallet identity and the address-derivation collaborator.

use std::fmt;

use ring::digest;
use serde::{Deserialize, Serialize};

use crate::error::VaultError;
use crate::mnemonic::Mnemonic;

/// How the recovery phrase is protected at rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    /// No password: the phrase sits in the legacy plaintext slot.
    Weak,
    /// Password-encrypted payload or platform secret store.
    Strong,
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Weak => write!(f, "weak"),
            Self::Strong => write!(f, "strong"),
        }
    }
}

/// Public facts about a wallet. Safe to persist in the clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletIdentity {
    pub address: String,
    pub security_level: SecurityLevel,
}

/// Derives a public address from a recovery phrase.
///
/// Implementations must be pure and deterministic and must fail on a
/// malformed phrase rather than return a placeholder.
pub trait AddressDeriver: Send + Sync {
    fn derive_address(&self, mnemonic: &Mnemonic) -> Result<String, VaultError>;
}

/// Default deriver: `0x` followed by the first 20 bytes of
/// SHA-256(BIP39 seed), hex encoded.
///
/// Stable across runs and platforms, which is all the lifecycle needs to
/// recognise a wallet. Chain-specific derivation belongs to the signing
/// library and is plugged in through [`AddressDeriver`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SeedDigestDeriver;

impl AddressDeriver for SeedDigestDeriver {
    fn derive_address(&self, mnemonic: &Mnemonic) -> Result<String, VaultError> {
        let seed = mnemonic.to_seed()?;
        let hash = digest::digest(&digest::SHA256, seed.as_slice());
        Ok(format!("0x{}", hex::encode(&hash.as_ref()[..20])))
    }
}
