//! # HELLO_REQ / HELLO_RSP
//!
//! ## Wire Format
//!
//! ```text
//! HELLO_REQ (dapp → wallet, 129 bytes):
//!     Qd (65, uncompressed P-256)  ||  ECDSA-SHA256_assoc(Qd) (64, r || s)
//!
//! HELLO_RSP (wallet → dapp, 65 + n bytes):
//!     Qw (65, uncompressed P-256)  ||  E(session properties)  (seq 1)
//! ```
//!
//! `E(...)` is a regular encrypted frame (see [`crate::crypto::encryption`])
//! sealed with the freshly derived session key. It carries
//! `{"v": "v1"}` and doubles as the wallet's proof: it only opens if the
//! wallet ran ECDH against `Qd` and salted HKDF with the same association
//! public key the dapp advertised.
//!
//! Every deviation from this layout is a [`MwaError::HandshakeFailed`].

use serde::{Deserialize, Serialize};

use crate::config::{
    HELLO_REQ_LENGTH, MIN_ENCRYPTED_FRAME_LENGTH, P256_PUBLIC_KEY_LENGTH, PROTOCOL_VERSION,
};
use crate::crypto::encryption::SharedSecret;
use crate::crypto::kdf::derive_session_key;
use crate::crypto::keys::{AssociationKeypair, AssociationPublicKey, EcdhKeypair, EcdhPublicKey};
use crate::error::MwaError;
use crate::jsonrpc::codec::{decode_json, encode_json};

/// Session parameters the wallet announces inside HELLO_RSP.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProperties {
    /// Protocol version the wallet will speak for this session.
    #[serde(rename = "v")]
    pub protocol_version: String,
}

impl Default for SessionProperties {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Dapp side
// ---------------------------------------------------------------------------

/// Build HELLO_REQ, spending the association private key.
///
/// Returns the message and the association public key, which the caller
/// still needs to derive the session key.
pub fn build_hello_req(
    ecdh_public: &EcdhPublicKey,
    association: AssociationKeypair,
) -> (Vec<u8>, AssociationPublicKey) {
    let raw_public = ecdh_public.as_bytes();
    let (association_public_key, signature) = association.sign_once(raw_public);

    let mut message = Vec::with_capacity(HELLO_REQ_LENGTH);
    message.extend_from_slice(raw_public);
    message.extend_from_slice(&signature);
    (message, association_public_key)
}

/// Validate HELLO_RSP and derive the session secret.
///
/// Consumes the dapp's ECDH keypair. On success the returned secret has
/// already accepted inbound frame 1 (the session properties).
pub fn parse_hello_rsp(
    frame: &[u8],
    ecdh: EcdhKeypair,
    association_public_key: &AssociationPublicKey,
) -> Result<(SharedSecret, SessionProperties), MwaError> {
    if frame.len() < P256_PUBLIC_KEY_LENGTH + MIN_ENCRYPTED_FRAME_LENGTH {
        return Err(MwaError::HandshakeFailed(format!(
            "HELLO_RSP too short: {} bytes",
            frame.len()
        )));
    }
    let (wallet_key_bytes, properties_frame) = frame.split_at(P256_PUBLIC_KEY_LENGTH);

    let wallet_public = EcdhPublicKey::from_bytes(wallet_key_bytes)
        .map_err(|e| MwaError::HandshakeFailed(format!("wallet key: {}", e)))?;
    let mut secret = derive_shared_secret(ecdh, &wallet_public, association_public_key)?;

    let properties: SessionProperties = decode_json(properties_frame, &mut secret)
        .map_err(|e| MwaError::HandshakeFailed(format!("session properties: {}", e)))?;
    if properties.protocol_version != PROTOCOL_VERSION {
        return Err(MwaError::HandshakeFailed(format!(
            "unsupported protocol version: {}",
            properties.protocol_version
        )));
    }

    Ok((secret, properties))
}

// ---------------------------------------------------------------------------
// Wallet side
// ---------------------------------------------------------------------------

/// Check HELLO_REQ against the association key from the URL and return the
/// dapp's ECDH public key.
pub fn verify_hello_req(
    frame: &[u8],
    association_public_key: &AssociationPublicKey,
) -> Result<EcdhPublicKey, MwaError> {
    if frame.len() != HELLO_REQ_LENGTH {
        return Err(MwaError::HandshakeFailed(format!(
            "HELLO_REQ must be {} bytes, got {}",
            HELLO_REQ_LENGTH,
            frame.len()
        )));
    }
    let (raw_public, signature) = frame.split_at(P256_PUBLIC_KEY_LENGTH);
    association_public_key
        .verify(raw_public, signature)
        .map_err(|e| MwaError::HandshakeFailed(format!("association signature: {}", e)))?;
    EcdhPublicKey::from_bytes(raw_public)
        .map_err(|e| MwaError::HandshakeFailed(format!("dapp key: {}", e)))
}

/// Build HELLO_RSP for a verified dapp key.
///
/// Generates the wallet's ECDH keypair, derives the session secret and
/// seals the session properties as outbound frame 1.
pub fn build_hello_rsp(
    dapp_public: &EcdhPublicKey,
    association_public_key: &AssociationPublicKey,
    properties: &SessionProperties,
) -> Result<(Vec<u8>, SharedSecret), MwaError> {
    let ecdh = EcdhKeypair::generate();
    let wallet_public = ecdh.public_key().clone();
    let mut secret = derive_shared_secret(ecdh, dapp_public, association_public_key)?;

    let sealed = encode_json(properties, &mut secret)?;
    let mut message = Vec::with_capacity(P256_PUBLIC_KEY_LENGTH + sealed.len());
    message.extend_from_slice(wallet_public.as_bytes());
    message.extend_from_slice(&sealed);
    Ok((message, secret))
}

fn derive_shared_secret(
    ours: EcdhKeypair,
    theirs: &EcdhPublicKey,
    association_public_key: &AssociationPublicKey,
) -> Result<SharedSecret, MwaError> {
    let ecdh_output = ours.diffie_hellman(theirs)?;
    let key = derive_session_key(&ecdh_output, association_public_key)?;
    Ok(SharedSecret::from_key(&key)?)
}
