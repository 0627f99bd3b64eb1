//! The recovery phrase as a secret value.
//!
//! A [`Mnemonic`] is always normalised (lower-case words separated by single
//! spaces), always 12 or 24 words, and always passes the BIP39 English
//! checksum. It is not `Clone` and its buffer is zeroised on drop, so the
//! number of live plaintext copies is exactly the number of `Mnemonic`
//! values in existence.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto;
use crate::error::VaultError;

/// Word counts accepted on import.
pub const VALID_WORD_COUNTS: [usize; 2] = [12, 24];

/// Word count of freshly generated phrases (256 bits of entropy).
pub const GENERATED_WORD_COUNT: usize = 24;

/// A validated BIP39 recovery phrase.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Mnemonic {
    phrase: String,
}

impl Mnemonic {
    /// Generate a new 24-word phrase from 256 bits of system randomness.
    pub fn generate() -> Result<Self, VaultError> {
        let entropy = Zeroizing::new(crypto::random_bytes::<32>()?);
        let mut generated =
            bip39::Mnemonic::from_entropy(&entropy[..]).map_err(|_| VaultError::InvalidMnemonic)?;
        let phrase = generated.to_string();
        generated.zeroize();
        Ok(Self { phrase })
    }

    /// Normalise and validate user input.
    ///
    /// Surrounding and repeated whitespace is collapsed and words are
    /// lower-cased before the word count and checksum are checked.
    pub fn parse(input: &str) -> Result<Self, VaultError> {
        let candidate = Self {
            phrase: normalise(input),
        };
        if !VALID_WORD_COUNTS.contains(&candidate.word_count()) {
            return Err(VaultError::InvalidMnemonic);
        }
        let mut checked = bip39::Mnemonic::parse_normalized(&candidate.phrase)
            .map_err(|_| VaultError::InvalidMnemonic)?;
        checked.zeroize();
        Ok(candidate)
    }

    /// Rebuild a phrase from decrypted bytes, consuming the buffer.
    pub(crate) fn from_plaintext(bytes: Zeroizing<Vec<u8>>) -> Result<Self, VaultError> {
        let text = std::str::from_utf8(&bytes).map_err(|_| VaultError::WrongPasswordOrCorruptPayload)?;
        Self::parse(text)
    }

    /// The normalised phrase.
    pub fn as_str(&self) -> &str {
        &self.phrase
    }

    /// Iterate over the words in order.
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.phrase.split(' ')
    }

    /// The word at zero-based `index`.
    pub fn word(&self, index: usize) -> Option<&str> {
        self.words().nth(index)
    }

    /// Number of words in the phrase.
    pub fn word_count(&self) -> usize {
        if self.phrase.is_empty() {
            0
        } else {
            self.words().count()
        }
    }

    /// The 64-byte BIP39 seed (empty BIP39 passphrase).
    pub fn to_seed(&self) -> Result<Zeroizing<[u8; 64]>, VaultError> {
        let mut parsed =
            bip39::Mnemonic::parse_normalized(&self.phrase).map_err(|_| VaultError::InvalidMnemonic)?;
        let seed = Zeroizing::new(parsed.to_seed_normalized(""));
        parsed.zeroize();
        Ok(seed)
    }
}

impl PartialEq for Mnemonic {
    fn eq(&self, other: &Self) -> bool {
        self.phrase == other.phrase
    }
}

impl Eq for Mnemonic {}

impl fmt::Debug for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mnemonic([REDACTED; {} words])", self.word_count())
    }
}

fn normalise(input: &str) -> String {
    let mut phrase = String::with_capacity(input.len());
    for word in input.split_whitespace() {
        if !phrase.is_empty() {
            phrase.push(' ');
        }
        phrase.extend(word.chars().flat_map(char::to_lowercase));
    }
    phrase
}
