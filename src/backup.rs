//! Backup verification challenge.
//!
//! Before a freshly created wallet counts as backed up, the user re-types
//! three words picked at random from the phrase:
//!
//! ```text
//! generate: 3 distinct indices, uniform over [0, word_count), sorted
//! verify:   every index answered  -> else BackupIncomplete
//!           trim + lower-case match on all three -> else BackupMismatch
//! ```
//!
//! A failed verification leaves the challenge untouched; the same three
//! positions stay pending until answered correctly. The expected words are
//! zeroised when the challenge is dropped.

use std::collections::HashMap;

use serde::Serialize;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto;
use crate::error::VaultError;
use crate::mnemonic::Mnemonic;

/// Number of words the user must re-type.
pub const CHALLENGE_SIZE: usize = 3;

/// A challenged position, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChallengePosition {
    /// Zero-based index into the phrase; the key answers are submitted under.
    pub index: usize,
    /// One-based position for display ("word #7").
    pub position: usize,
}

#[derive(Zeroize)]
struct ChallengedWord {
    index: usize,
    expected: String,
}

/// The active backup challenge.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct BackupChallenge {
    words: Vec<ChallengedWord>,
}

impl BackupChallenge {
    /// Pick [`CHALLENGE_SIZE`] distinct positions of `mnemonic` uniformly at
    /// random.
    pub fn generate(mnemonic: &Mnemonic) -> Result<Self, VaultError> {
        let word_count = mnemonic.word_count();
        if word_count < CHALLENGE_SIZE {
            return Err(VaultError::InvalidMnemonic);
        }

        // Partial Fisher-Yates: the first CHALLENGE_SIZE slots end up holding
        // a uniform sample without replacement.
        let mut pool: Vec<usize> = (0..word_count).collect();
        for slot in 0..CHALLENGE_SIZE {
            let remaining = u32::try_from(word_count - slot).map_err(|_| VaultError::InvalidMnemonic)?;
            let pick = slot + crypto::random_below(remaining)? as usize;
            pool.swap(slot, pick);
        }
        let mut indices = pool[..CHALLENGE_SIZE].to_vec();
        indices.sort_unstable();

        let mut words = Vec::with_capacity(CHALLENGE_SIZE);
        for index in indices {
            let expected = mnemonic.word(index).ok_or(VaultError::InvalidMnemonic)?;
            words.push(ChallengedWord {
                index,
                expected: expected.to_string(),
            });
        }
        Ok(Self { words })
    }

    /// The challenged indices, ascending.
    pub fn indices(&self) -> Vec<usize> {
        self.words.iter().map(|w| w.index).collect()
    }

    /// The challenged positions, ascending, with their display numbers.
    pub fn positions(&self) -> Vec<ChallengePosition> {
        self.words
            .iter()
            .map(|w| ChallengePosition {
                index: w.index,
                position: w.index + 1,
            })
            .collect()
    }

    /// Check `answers`, keyed by zero-based index.
    ///
    /// Answers for positions that were not challenged are ignored.
    pub fn verify(&self, answers: &HashMap<usize, String>) -> Result<(), VaultError> {
        let complete = self.words.iter().all(|w| {
            answers
                .get(&w.index)
                .is_some_and(|answer| !answer.trim().is_empty())
        });
        if !complete {
            return Err(VaultError::BackupIncomplete);
        }

        let mut all_match = true;
        for word in &self.words {
            let mut given = answers
                .get(&word.index)
                .map(|answer| answer.trim().to_lowercase())
                .unwrap_or_default();
            all_match &= given == word.expected;
            given.zeroize();
        }

        if all_match {
            Ok(())
        } else {
            Err(VaultError::BackupMismatch)
        }
    }
}

impl std::fmt::Debug for BackupChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupChallenge")
            .field("indices", &self.indices())
            .finish()
    }
}
