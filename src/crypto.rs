//! Low-level cryptographic operations.
//!
//! This module and `kdf` are the only places in the crate that import
//! `ring` for key material. Everything else encrypts, decrypts and
//! authenticates exclusively through the functions exposed here.
//!
//! Primitive choices:
//! - **Cipher**: AES-256-GCM (authenticated encryption)
//! - **Nonce**: 96-bit (12 bytes), generated fresh per payload via `SystemRandom`
//! - **Key size**: 256 bits (32 bytes)
//! - **Integrity digest**: HMAC-SHA256 under an HKDF subkey of the payload key

use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use ring::{hkdf, hmac};
use zeroize::Zeroizing;

use crate::error::VaultError;

/// The AEAD algorithm used for every payload version.
const ALGORITHM: &aead::Algorithm = &AES_256_GCM;

/// Size of the nonce in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Size of a derived key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Size of the integrity digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// HKDF info string separating the integrity subkey from the cipher key.
const INTEGRITY_INFO: &[u8] = b"seedvault:integrity:v2";

/// Fill a fixed-size buffer from the system CSPRNG.
///
/// `ring::rand::SystemRandom` is the only source of randomness in the crate:
/// salts, nonces, mnemonic entropy and backup challenges all come from here.
pub fn random_bytes<const N: usize>() -> Result<[u8; N], VaultError> {
    let rng = SystemRandom::new();
    let mut buf = [0u8; N];
    rng.fill(&mut buf).map_err(|_| VaultError::RandomnessFailure)?;
    Ok(buf)
}

/// Draw a uniformly distributed integer in `[0, bound)`.
///
/// Rejection sampling over `u32` keeps the distribution unbiased for any
/// bound; at most a handful of draws are ever needed for small bounds.
pub fn random_below(bound: u32) -> Result<u32, VaultError> {
    if bound == 0 {
        return Err(VaultError::RandomnessFailure);
    }
    let zone = u32::MAX - (u32::MAX % bound);
    loop {
        let candidate = u32::from_le_bytes(random_bytes::<4>()?);
        if candidate < zone {
            return Ok(candidate % bound);
        }
    }
}

/// Encrypt `plaintext` under `key` with an explicit nonce.
///
/// The nonce is not bundled into the output: payload records carry it in a
/// separate field.
///
/// # Layout of returned bytes
/// ```text
/// [ ciphertext ][ GCM tag (16 bytes) ]
/// ```
pub fn seal(
    key_bytes: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, VaultError> {
    let unbound = UnboundKey::new(ALGORITHM, key_bytes).map_err(|_| VaultError::EncryptionFailure)?;
    let key = LessSafeKey::new(unbound);

    let mut output = Vec::with_capacity(plaintext.len() + ALGORITHM.tag_len());
    output.extend_from_slice(plaintext);

    key.seal_in_place_append_tag(Nonce::assume_unique_for_key(*nonce), Aad::from(aad), &mut output)
        .map_err(|_| VaultError::EncryptionFailure)?;

    Ok(output)
}

/// Decrypt bytes produced by [`seal`].
///
/// Any authentication failure (wrong key, tampered ciphertext, wrong AAD,
/// truncated tag) surfaces as `WrongPasswordOrCorruptPayload` and the caller
/// receives no partial plaintext. The returned buffer is zeroised on drop.
pub fn open(
    key_bytes: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, VaultError> {
    if ciphertext.len() < ALGORITHM.tag_len() {
        return Err(VaultError::WrongPasswordOrCorruptPayload);
    }

    let unbound = UnboundKey::new(ALGORITHM, key_bytes)
        .map_err(|_| VaultError::WrongPasswordOrCorruptPayload)?;
    let key = LessSafeKey::new(unbound);

    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    let plaintext_len = key
        .open_in_place(Nonce::assume_unique_for_key(*nonce), Aad::from(aad), buffer.as_mut_slice())
        .map_err(|_| VaultError::WrongPasswordOrCorruptPayload)?
        .len();
    buffer.truncate(plaintext_len);

    Ok(buffer)
}

/// Derive the HMAC key used for the integrity digest.
///
/// HKDF-SHA256 with an empty salt, the payload key as input keying material
/// and a fixed info string. The cipher key itself is never used as a MAC key.
fn integrity_key(key_bytes: &[u8; KEY_LEN]) -> Result<hmac::Key, VaultError> {
    let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, &[]);
    let prk = salt.extract(key_bytes);
    let info = [INTEGRITY_INFO];
    let okm = prk
        .expand(&info, hmac::HMAC_SHA256)
        .map_err(|_| VaultError::KeyDerivationFailure)?;
    Ok(hmac::Key::from(okm))
}

/// Concatenate `salt || plaintext` into a buffer that is zeroised on drop.
fn digest_input(salt: &[u8], plaintext: &[u8]) -> Zeroizing<Vec<u8>> {
    let mut input = Zeroizing::new(Vec::with_capacity(salt.len() + plaintext.len()));
    input.extend_from_slice(salt);
    input.extend_from_slice(plaintext);
    input
}

/// Compute the integrity digest binding `plaintext` to `salt`.
pub fn integrity_digest(
    key_bytes: &[u8; KEY_LEN],
    salt: &[u8],
    plaintext: &[u8],
) -> Result<[u8; DIGEST_LEN], VaultError> {
    let key = integrity_key(key_bytes)?;
    let tag = hmac::sign(&key, &digest_input(salt, plaintext));
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(tag.as_ref());
    Ok(out)
}

/// Recompute and compare the integrity digest in constant time.
pub fn verify_integrity(
    key_bytes: &[u8; KEY_LEN],
    salt: &[u8],
    plaintext: &[u8],
    expected: &[u8],
) -> Result<(), VaultError> {
    let key = integrity_key(key_bytes)?;
    hmac::verify(&key, &digest_input(salt, plaintext), expected)
        .map_err(|_| VaultError::WrongPasswordOrCorruptPayload)
}
