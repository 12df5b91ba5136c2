//! # Session Key Derivation
//!
//! The raw ECDH output is never used as a cipher key directly. It is run
//! through HKDF-SHA256 with the association public key as salt:
//!
//! ```text
//! session_key = HKDF-SHA256(
//!     ikm  = ECDH(our_secret, peer_public).x,
//!     salt = association_public_key (65 bytes),
//!     info = "",
//!     L    = 16,
//! )
//! ```
//!
//! Salting with the association key binds the session to the out-of-band
//! signal: a party that swapped in a different association key derives a
//! different cipher key, and the first encrypted frame fails to open.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::config::AES_KEY_LENGTH;
use crate::crypto::encryption::EncryptionError;
use crate::crypto::keys::AssociationPublicKey;

/// Derive the AES-128-GCM session key from raw ECDH output.
pub fn derive_session_key(
    ecdh_output: &[u8; 32],
    association_public_key: &AssociationPublicKey,
) -> Result<Zeroizing<[u8; AES_KEY_LENGTH]>, EncryptionError> {
    let hk = Hkdf::<Sha256>::new(Some(association_public_key.as_bytes()), ecdh_output);
    let mut key = Zeroizing::new([0u8; AES_KEY_LENGTH]);
    hk.expand(&[], &mut key[..])
        .map_err(|_| EncryptionError::KeyDerivationFailed)?;
    Ok(key)
}
