//! Per-agreement envelope nonce window.
//!
//! A sliding bitmap of the last [`REPLAY_WINDOW_SIZE`] nonces below the
//! highest one accepted:
//! - Above highest: accept, slide the window
//! - Inside window, unseen: accept
//! - Inside window, seen: reject
//! - Below window: reject

use crate::core::{DenyReason, REPLAY_WINDOW_SIZE};

const WORDS: usize = REPLAY_WINDOW_SIZE / 64;

/// Anti-replay window for one agreement's envelope nonces.
#[derive(Debug, Clone)]
pub struct NonceWindow {
    /// Bit `i` set means nonce `highest - i` was accepted.
    bitmap: [u64; WORDS],
    /// Highest nonce accepted so far.
    highest: u64,
    /// Whether any nonce has been accepted yet.
    initialized: bool,
}

impl NonceWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self {
            bitmap: [0; WORDS],
            highest: 0,
            initialized: false,
        }
    }

    /// Create a window that rejects every nonce up to and including `highest`.
    ///
    /// Used when restoring persisted agreements, where the exact bitmap is not
    /// kept.
    pub fn resume_after(highest: u64) -> Self {
        Self {
            bitmap: [u64::MAX; WORDS],
            highest,
            initialized: true,
        }
    }

    /// Highest accepted nonce, if any.
    pub fn highest(&self) -> Option<u64> {
        self.initialized.then_some(self.highest)
    }

    /// Check a nonce without recording it.
    pub fn is_replay(&self, nonce: u64) -> bool {
        if !self.initialized || nonce > self.highest {
            return false;
        }
        match Self::slot(self.highest - nonce) {
            Some((word, mask)) => self.bitmap[word] & mask != 0,
            None => true,
        }
    }

    /// Check a nonce and record it if fresh.
    pub fn check_and_update(&mut self, nonce: u64) -> Result<(), DenyReason> {
        if !self.initialized {
            self.initialized = true;
            self.highest = nonce;
            self.bitmap = [0; WORDS];
            self.bitmap[0] = 1;
            return Ok(());
        }

        if nonce > self.highest {
            self.shift(nonce - self.highest);
            self.highest = nonce;
            self.bitmap[0] |= 1;
            return Ok(());
        }

        let Some((word, mask)) = Self::slot(self.highest - nonce) else {
            return Err(DenyReason::Replayed);
        };
        if self.bitmap[word] & mask != 0 {
            return Err(DenyReason::Replayed);
        }
        self.bitmap[word] |= mask;
        Ok(())
    }

    /// Bitmap position for a nonce `diff` below highest, `None` if below window.
    fn slot(diff: u64) -> Option<(usize, u64)> {
        if diff >= REPLAY_WINDOW_SIZE as u64 {
            return None;
        }
        let bit = diff as usize;
        Some((bit / 64, 1u64 << (bit % 64)))
    }

    /// Age every entry by `shift` positions.
    fn shift(&mut self, shift: u64) {
        if shift >= REPLAY_WINDOW_SIZE as u64 {
            self.bitmap = [0; WORDS];
            return;
        }

        let words = (shift / 64) as usize;
        let bits = (shift % 64) as u32;

        if words > 0 {
            for i in (words..WORDS).rev() {
                self.bitmap[i] = self.bitmap[i - words];
            }
            for word in self.bitmap.iter_mut().take(words) {
                *word = 0;
            }
        }

        if bits > 0 {
            let mut carry = 0u64;
            for word in self.bitmap.iter_mut() {
                let next_carry = *word >> (64 - bits);
                *word = (*word << bits) | carry;
                carry = next_carry;
            }
        }
    }
}

impl Default for NonceWindow {
    fn default() -> Self {
        Self::new()
    }
}
