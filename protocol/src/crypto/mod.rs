//! # Cryptographic Primitives
//!
//! Everything the handshake and the message codec need:
//!
//! - **ECDSA P-256** for the association signature over HELLO_REQ.
//! - **ECDH P-256** for the per-session key agreement.
//! - **HKDF-SHA256** to turn the ECDH output into a cipher key.
//! - **AES-128-GCM** with sequence-number AAD for every framed message.
//!
//! These are thin wrappers over the RustCrypto implementations. Key bytes
//! are never logged; `Debug` impls print public fingerprints only.

pub mod encryption;
pub mod kdf;
pub mod keys;

pub use encryption::{EncryptionError, SharedSecret};
pub use kdf::derive_session_key;
pub use keys::{AssociationKeypair, AssociationPublicKey, EcdhKeypair, EcdhPublicKey, KeyError};
