//! Deterministic Stream - seeded, checkpointable pseudo-random channel.
//!
//! Every random decision a node makes goes through one of these streams.
//! A stream is bound to a single logical channel (one port, one direction),
//! so the sender's stream and the receiver's mirrored stream advance in
//! lockstep draw for draw.
//!
//! # Capture vs. Seed
//!
//! The construction `seed` is kept for diagnostics only. What determines
//! future draws is the generator state (ChaCha key, stream id and word
//! position), which is what [`DeterministicStream::capture_state`] exports.
//! Restoring rebuilds the generator from that state and never re-applies
//! the seed: a stream re-seeded at restore would silently replay the start
//! of its sequence.

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Full, serializable state of a [`DeterministicStream`].
///
/// The 128-bit ChaCha word position is stored as two halves so that any
/// snapshot codec can carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamState {
    /// Construction seed (diagnostics only)
    pub seed: u64,

    /// ChaCha key derived from the seed at construction
    pub key: [u8; 32],

    /// ChaCha stream id
    pub stream: u64,

    /// High 64 bits of the word position
    pub word_pos_hi: u64,

    /// Low 64 bits of the word position
    pub word_pos_lo: u64,

    /// Number of draws taken so far (diagnostics only)
    pub draws: u64,
}

impl StreamState {
    /// Returns the generator word position.
    pub fn word_pos(&self) -> u128 {
        ((self.word_pos_hi as u128) << 64) | self.word_pos_lo as u128
    }
}

/// Derives the seed of one lane from a node-wide seed.
///
/// Distinct lanes get unrelated sequences, so a frame replayed on the wrong
/// lane fails payload verification as well as the header check.
pub fn lane_seed(seed: u64, lane: u64) -> u64 {
    seed ^ lane.wrapping_add(1).wrapping_mul(0x9e37_79b9_7f4a_7c15)
}

/// A seeded pseudo-random generator bound to one logical channel.
#[derive(Debug, Clone)]
pub struct DeterministicStream {
    seed: u64,
    rng: ChaCha8Rng,
    draws: u64,
}

impl DeterministicStream {
    /// Creates a stream from a seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            draws: 0,
        }
    }

    /// Rebuilds a stream from captured state.
    pub fn from_state(state: &StreamState) -> Self {
        let mut rng = ChaCha8Rng::from_seed(state.key);
        rng.set_stream(state.stream);
        rng.set_word_pos(state.word_pos());

        Self {
            seed: state.seed,
            rng,
            draws: state.draws,
        }
    }

    /// Draws the next 32-bit value.
    pub fn next_u32(&mut self) -> u32 {
        self.draws += 1;
        self.rng.next_u32()
    }

    /// Draws a uniform value in `[0, 1)`.
    pub fn next_uniform(&mut self) -> f64 {
        self.draws += 1;
        self.rng.gen::<f64>()
    }

    /// Draws a value in `[0, bound)` by reduction of one 32-bit draw.
    ///
    /// `bound` must be non-zero.
    pub fn next_below(&mut self, bound: u64) -> u64 {
        debug_assert!(bound > 0);
        u64::from(self.next_u32()) % bound
    }

    /// Captures the generator state without consuming a draw.
    pub fn capture_state(&self) -> StreamState {
        let word_pos = self.rng.get_word_pos();

        StreamState {
            seed: self.seed,
            key: self.rng.get_seed(),
            stream: self.rng.get_stream(),
            word_pos_hi: (word_pos >> 64) as u64,
            word_pos_lo: word_pos as u64,
            draws: self.draws,
        }
    }

    /// Replaces the generator state with a captured one.
    pub fn restore_state(&mut self, state: &StreamState) {
        *self = Self::from_state(state);
    }

    /// Returns the construction seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns the number of draws taken.
    pub fn draws(&self) -> u64 {
        self.draws
    }
}
