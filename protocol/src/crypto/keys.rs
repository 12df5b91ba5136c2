//! # Ephemeral Session Keys
//!
//! Both keypairs used by a local association are NIST P-256 and live for
//! exactly one session attempt:
//!
//! - [`AssociationKeypair`] (ECDSA): its public key travels out-of-band in
//!   the association URL; its private key signs HELLO_REQ once.
//! - [`EcdhKeypair`] (ECDH): generated when the transport opens; its
//!   private key is combined once with the wallet's public key.
//!
//! Both private halves are consumed by the one operation they exist for,
//! so the type system rules out reuse. Neither type can export its private
//! key, and neither implements `Serialize`.
//!
//! Public keys travel as 65-byte uncompressed SEC1 points (`0x04 || X || Y`).

use std::fmt;

use p256::ecdh::EphemeralSecret;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey;
use rand::rngs::OsRng;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::config::{P256_PUBLIC_KEY_LENGTH, P256_SIGNATURE_LENGTH};

/// Errors from key parsing and signature checks.
///
/// Deliberately terse: the handshake reports these to a peer that may be
/// hostile.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid public key: expected a {P256_PUBLIC_KEY_LENGTH}-byte uncompressed P-256 point")]
    InvalidPublicKey,

    #[error("invalid signature encoding: expected {P256_SIGNATURE_LENGTH} bytes")]
    InvalidSignature,

    #[error("signature verification failed")]
    VerificationFailed,
}

// ---------------------------------------------------------------------------
// Association (ECDSA)
// ---------------------------------------------------------------------------

/// Ephemeral ECDSA P-256 keypair seeding one association.
pub struct AssociationKeypair {
    signing_key: SigningKey,
    public_key: AssociationPublicKey,
}

/// Public half of the association keypair, as embedded in the URL.
#[derive(Clone, PartialEq, Eq)]
pub struct AssociationPublicKey {
    bytes: [u8; P256_PUBLIC_KEY_LENGTH],
}

impl AssociationKeypair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        let public_key = AssociationPublicKey::from_verifying_key(signing_key.verifying_key());
        Self {
            signing_key,
            public_key,
        }
    }

    pub fn public_key(&self) -> &AssociationPublicKey {
        &self.public_key
    }

    /// Sign `message` with ECDSA-SHA256 and destroy the private key.
    ///
    /// Returns the public key (still needed for key derivation) and the
    /// fixed-size `r || s` signature.
    pub fn sign_once(self, message: &[u8]) -> (AssociationPublicKey, [u8; P256_SIGNATURE_LENGTH]) {
        let signature: Signature = self.signing_key.sign(message);
        let mut out = [0u8; P256_SIGNATURE_LENGTH];
        out.copy_from_slice(&signature.to_bytes());
        (self.public_key, out)
    }
}

impl fmt::Debug for AssociationKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociationKeypair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl AssociationPublicKey {
    fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        let mut bytes = [0u8; P256_PUBLIC_KEY_LENGTH];
        bytes.copy_from_slice(point.as_bytes());
        Self { bytes }
    }

    /// Parse an uncompressed point, rejecting anything off the curve.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let key = parse_uncompressed(bytes)?;
        let verifying_key = VerifyingKey::from(&key);
        Ok(Self::from_verifying_key(&verifying_key))
    }

    pub fn as_bytes(&self) -> &[u8; P256_PUBLIC_KEY_LENGTH] {
        &self.bytes
    }

    /// Verify an ECDSA-SHA256 `r || s` signature over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), KeyError> {
        if signature.len() != P256_SIGNATURE_LENGTH {
            return Err(KeyError::InvalidSignature);
        }
        let signature = Signature::from_slice(signature).map_err(|_| KeyError::InvalidSignature)?;
        let verifying_key =
            VerifyingKey::from_sec1_bytes(&self.bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        verifying_key
            .verify(message, &signature)
            .map_err(|_| KeyError::VerificationFailed)
    }

    /// Short hex prefix for log lines.
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.bytes[1..9])
    }
}

impl fmt::Debug for AssociationPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssociationPublicKey({})", self.fingerprint())
    }
}

// ---------------------------------------------------------------------------
// Key agreement (ECDH)
// ---------------------------------------------------------------------------

/// Ephemeral ECDH P-256 keypair, one per session.
pub struct EcdhKeypair {
    secret: EphemeralSecret,
    public_key: EcdhPublicKey,
}

/// Public half of an ECDH keypair, as carried in HELLO_REQ / HELLO_RSP.
#[derive(Clone, PartialEq, Eq)]
pub struct EcdhPublicKey {
    bytes: [u8; P256_PUBLIC_KEY_LENGTH],
}

impl EcdhKeypair {
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random(&mut OsRng);
        let public_key = EcdhPublicKey::from_public_key(&secret.public_key());
        Self { secret, public_key }
    }

    pub fn public_key(&self) -> &EcdhPublicKey {
        &self.public_key
    }

    /// Run ECDH against the peer's key and destroy our secret.
    ///
    /// Returns the raw 32-byte x-coordinate. Feed it through
    /// [`crate::crypto::kdf`] before using it as a cipher key.
    pub fn diffie_hellman(self, peer: &EcdhPublicKey) -> Result<Zeroizing<[u8; 32]>, KeyError> {
        let peer_key = parse_uncompressed(&peer.bytes)?;
        let shared = self.secret.diffie_hellman(&peer_key);
        let mut out = Zeroizing::new([0u8; 32]);
        out.copy_from_slice(shared.raw_secret_bytes().as_slice());
        Ok(out)
    }
}

impl fmt::Debug for EcdhKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcdhKeypair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl EcdhPublicKey {
    fn from_public_key(key: &PublicKey) -> Self {
        let point = key.to_encoded_point(false);
        let mut bytes = [0u8; P256_PUBLIC_KEY_LENGTH];
        bytes.copy_from_slice(point.as_bytes());
        Self { bytes }
    }

    /// Parse an uncompressed point, rejecting anything off the curve.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let key = parse_uncompressed(bytes)?;
        Ok(Self::from_public_key(&key))
    }

    pub fn as_bytes(&self) -> &[u8; P256_PUBLIC_KEY_LENGTH] {
        &self.bytes
    }
}

impl fmt::Debug for EcdhPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EcdhPublicKey({})", hex::encode(&self.bytes[1..9]))
    }
}

/// Only uncompressed encodings are accepted on the wire; compressed points
/// would change the fixed message layouts.
fn parse_uncompressed(bytes: &[u8]) -> Result<PublicKey, KeyError> {
    if bytes.len() != P256_PUBLIC_KEY_LENGTH || bytes[0] != 0x04 {
        return Err(KeyError::InvalidPublicKey);
    }
    PublicKey::from_sec1_bytes(bytes).map_err(|_| KeyError::InvalidPublicKey)
}
