//! Traffic Codec - builds messages from a stream and verifies them against a
//! mirrored stream.
//!
//! # Wire Format
//!
//! ```text
//! topology variants:  [sender_port, L, data × (L - 2)]
//! point-to-point:     [L, data × (L - 1)]
//! ```
//!
//! `L` is the total frame length in words. The sender draws `L` and then the
//! data words from its `tx` stream; the receiver draws the same values from
//! its `rx` stream, so nothing but the frame itself crosses the wire.

use crate::error::ConfigError;
use crate::stream::DeterministicStream;
use crate::topology::Topology;
use lockstep_env::{PortId, WireFrame};
use thiserror::Error;
use tracing::trace;

/// Header word that failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderField {
    SenderPort,
    Length,
}

impl std::fmt::Display for HeaderField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeaderField::SenderPort => write!(f, "sender port"),
            HeaderField::Length => write!(f, "length"),
        }
    }
}

/// Why a received frame does not match its mirrored stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("frame of {len} words is shorter than the {header_words}-word header")]
    MissingHeader { len: usize, header_words: u32 },

    #[error("message length mismatch: expected {expected} words, got {actual}")]
    LengthMismatch { expected: u32, actual: usize },

    #[error("{field} header mismatch: expected {expected}, got {actual}")]
    HeaderMismatch {
        field: HeaderField,
        expected: u32,
        actual: u32,
    },

    #[error("payload mismatch at word {index}: expected {expected}, got {actual}")]
    PayloadMismatch {
        index: usize,
        expected: u32,
        actual: u32,
    },
}

/// A traffic message before it is flattened onto the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Port the message leaves from (absent for point-to-point)
    pub sender_port: Option<PortId>,

    /// Total frame length in words, header included
    pub length: u32,

    /// Generated data words
    pub payload: Vec<u32>,
}

impl Message {
    /// Flattens the message into its wire representation.
    pub fn to_frame(&self) -> WireFrame {
        let mut words = Vec::with_capacity(self.length as usize);
        if let Some(port) = self.sender_port {
            words.push(port.0);
        }
        words.push(self.length);
        words.extend_from_slice(&self.payload);
        WireFrame::new(words)
    }
}

/// Message generator and verifier for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficCodec {
    min_data: u32,
    max_data: u32,
    header_words: u32,
}

impl TrafficCodec {
    /// Creates a codec for lengths in `[min_data, max_data]`.
    ///
    /// # Arguments
    /// * `min_data` - Smallest frame length in words, header included
    /// * `max_data` - Largest frame length in words
    /// * `header_words` - 1 (length only) or 2 (sender port and length)
    pub fn new(min_data: u32, max_data: u32, header_words: u32) -> Result<Self, ConfigError> {
        if !(1..=2).contains(&header_words) {
            return Err(ConfigError::HeaderWords(header_words));
        }
        if max_data < min_data {
            return Err(ConfigError::DataRange { min_data, max_data });
        }
        if min_data < header_words {
            return Err(ConfigError::DataBelowHeader {
                min_data,
                header_words,
            });
        }
        Ok(Self {
            min_data,
            max_data,
            header_words,
        })
    }

    /// Creates a codec using the header layout of a topology.
    pub fn for_topology(
        min_data: u32,
        max_data: u32,
        topology: &Topology,
    ) -> Result<Self, ConfigError> {
        Self::new(min_data, max_data, topology.header_words())
    }

    pub fn header_words(&self) -> u32 {
        self.header_words
    }

    /// Draws a frame length from the stream.
    ///
    /// The range is computed in 64 bits so `[0, u32::MAX]` doesn't overflow.
    pub fn draw_length(&self, stream: &mut DeterministicStream) -> u32 {
        let range = u64::from(self.max_data) - u64::from(self.min_data) + 1;
        (stream.next_below(range) + u64::from(self.min_data)) as u32
    }

    /// Generates the next message for `sender_port`.
    pub fn encode(&self, sender_port: PortId, stream: &mut DeterministicStream) -> Message {
        let length = self.draw_length(stream);
        let payload: Vec<u32> = (0..length - self.header_words)
            .map(|_| stream.next_u32())
            .collect();

        Message {
            sender_port: (self.header_words == 2).then_some(sender_port),
            length,
            payload,
        }
    }

    /// Splits a frame into its header and payload without verifying it.
    pub fn parse(&self, frame: &WireFrame) -> Result<Message, VerifyError> {
        self.check_header(frame)?;

        let (header, payload) = frame.words.split_at(self.header_words as usize);
        let sender_port = (self.header_words == 2).then(|| PortId(header[0]));
        let length = header[header.len() - 1];

        Ok(Message {
            sender_port,
            length,
            payload: payload.to_vec(),
        })
    }

    /// Verifies a received frame against the mirrored stream.
    ///
    /// The stream must sit at the same draw index the sender's stream had
    /// when the frame was encoded. Checks run in order: header present,
    /// frame length, length header word, then each data word.
    pub fn verify(
        &self,
        frame: &WireFrame,
        stream: &mut DeterministicStream,
    ) -> Result<(), VerifyError> {
        self.check_header(frame)?;

        let expected = self.draw_length(stream);
        if frame.len() != expected as usize {
            return Err(VerifyError::LengthMismatch {
                expected,
                actual: frame.len(),
            });
        }

        let length_word = frame.words[self.header_words as usize - 1];
        if length_word != expected {
            return Err(VerifyError::HeaderMismatch {
                field: HeaderField::Length,
                expected,
                actual: length_word,
            });
        }

        for (index, actual) in frame.words[self.header_words as usize..].iter().enumerate() {
            let expected = stream.next_u32();
            if *actual != expected {
                return Err(VerifyError::PayloadMismatch {
                    index,
                    expected,
                    actual: *actual,
                });
            }
        }

        trace!(words = frame.len(), "frame verified");
        Ok(())
    }

    fn check_header(&self, frame: &WireFrame) -> Result<(), VerifyError> {
        if frame.len() < self.header_words as usize {
            return Err(VerifyError::MissingHeader {
                len: frame.len(),
                header_words: self.header_words,
            });
        }
        Ok(())
    }
}
