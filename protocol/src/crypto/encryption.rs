//! # Sequenced AES-128-GCM Framing
//!
//! Every message after HELLO_REQ / HELLO_RSP is sealed with the session key
//! and framed as:
//!
//! ```text
//! +----------------+------------------+---------------------------+
//! | seq (u32, BE)  | nonce (12 bytes) | ciphertext || tag (16)    |
//! +----------------+------------------+---------------------------+
//! ```
//!
//! The four sequence bytes are also the AEAD associated data, so they
//! cannot be rewritten without breaking the tag.
//!
//! ## Sequence numbers
//!
//! Each direction counts independently starting at 1. A receiver accepts a
//! frame only if it carries exactly `last_received + 1`. Replayed, dropped
//! or reordered frames therefore fail before decryption is attempted, and
//! the session must be torn down.
//!
//! ## Nonces
//!
//! Nonces are 96 random bits from `OsRng`. Sessions are short-lived and the
//! sequence counter caps a session at 2^32 - 1 frames per direction, far
//! below the random-nonce birthday bound.

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes128Gcm, Nonce,
};
use rand::RngCore;
use thiserror::Error;

use crate::config::{
    AES_KEY_LENGTH, AES_NONCE_LENGTH, MIN_ENCRYPTED_FRAME_LENGTH, SEQUENCE_NUMBER_LENGTH,
};

/// Errors from sealing or opening a frame.
///
/// Decryption failures intentionally carry no detail.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed -- wrong key or corrupted ciphertext")]
    DecryptFailed,

    #[error("session key derivation failed")]
    KeyDerivationFailed,

    #[error("frame too short: must be at least {MIN_ENCRYPTED_FRAME_LENGTH} bytes, got {0}")]
    FrameTooShort(usize),

    #[error("unexpected sequence number: expected {expected}, got {got}")]
    SequenceMismatch {
        /// The only sequence number we would have accepted.
        expected: u32,
        /// The sequence number found in the frame.
        got: u32,
    },

    #[error("sequence numbers exhausted for this session")]
    SequenceExhausted,
}

/// The symmetric state of a connected session.
///
/// Holds the cipher and both direction counters. Exists only while the
/// session is connected; it is never serialized and never shared between
/// sessions.
pub struct SharedSecret {
    cipher: Aes128Gcm,
    outbound_seq: u32,
    inbound_seq: u32,
}

impl SharedSecret {
    /// Build the session cipher from a derived key. Both counters start at
    /// zero, so the first frame in each direction carries sequence 1.
    pub fn from_key(key: &[u8; AES_KEY_LENGTH]) -> Result<Self, EncryptionError> {
        let cipher =
            Aes128Gcm::new_from_slice(key).map_err(|_| EncryptionError::KeyDerivationFailed)?;
        Ok(Self {
            cipher,
            outbound_seq: 0,
            inbound_seq: 0,
        })
    }

    /// Seal `plaintext` into a wire frame, consuming one outbound sequence
    /// number.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let seq = self
            .outbound_seq
            .checked_add(1)
            .ok_or(EncryptionError::SequenceExhausted)?;
        let seq_bytes = seq.to_be_bytes();

        let mut nonce_bytes = [0u8; AES_NONCE_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: &seq_bytes,
                },
            )
            .map_err(|_| EncryptionError::EncryptFailed)?;

        self.outbound_seq = seq;

        let mut out =
            Vec::with_capacity(SEQUENCE_NUMBER_LENGTH + AES_NONCE_LENGTH + ciphertext.len());
        out.extend_from_slice(&seq_bytes);
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Open a wire frame. The inbound counter only advances on success.
    pub fn decrypt(&mut self, frame: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        if frame.len() < MIN_ENCRYPTED_FRAME_LENGTH {
            return Err(EncryptionError::FrameTooShort(frame.len()));
        }

        let (seq_bytes, rest) = frame.split_at(SEQUENCE_NUMBER_LENGTH);
        let (nonce_bytes, ciphertext) = rest.split_at(AES_NONCE_LENGTH);

        let mut seq_buf = [0u8; SEQUENCE_NUMBER_LENGTH];
        seq_buf.copy_from_slice(seq_bytes);
        let got = u32::from_be_bytes(seq_buf);
        let expected = self
            .inbound_seq
            .checked_add(1)
            .ok_or(EncryptionError::SequenceExhausted)?;
        if got != expected {
            return Err(EncryptionError::SequenceMismatch { expected, got });
        }

        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: seq_bytes,
                },
            )
            .map_err(|_| EncryptionError::DecryptFailed)?;

        self.inbound_seq = got;
        Ok(plaintext)
    }

    /// Sequence number of the last frame we sent.
    pub fn outbound_sequence(&self) -> u32 {
        self.outbound_seq
    }

    /// Sequence number of the last frame we accepted.
    pub fn inbound_sequence(&self) -> u32 {
        self.inbound_seq
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSecret")
            .field("outbound_seq", &self.outbound_seq)
            .field("inbound_seq", &self.inbound_seq)
            .finish_non_exhaustive()
    }
}
