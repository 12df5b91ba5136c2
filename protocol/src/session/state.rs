//! # Session State Machine
//!
//! ```text
//!   Disconnected ──begin──► Connecting ──transport open──► HelloReqSent ──HELLO_RSP──► Connected
//!        ▲                      │                               │                        │
//!        └──────────────────────┴───── close / error / retry expiry ─────────────────────┘
//! ```
//!
//! Each state owns exactly the secrets that are valid in it. A transition
//! consumes the previous state, so the association private key cannot
//! outlive the HELLO_REQ signature and a [`SharedSecret`] cannot exist
//! before the wallet has proven itself.

use crate::crypto::encryption::SharedSecret;
use crate::crypto::keys::{AssociationKeypair, AssociationPublicKey, EcdhKeypair};
use crate::error::MwaError;
use crate::handshake::{build_hello_req, parse_hello_rsp};

/// Observable tag of a [`SessionState`], published through a watch channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    HelloReqSent,
    Connected,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Connecting => "connecting",
            SessionStatus::HelloReqSent => "hello_req_sent",
            SessionStatus::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Dapp-side session state. Every variant carries the key material that is
/// live in that state and nothing else.
#[derive(Debug)]
pub enum SessionState {
    Disconnected,
    Connecting {
        association: AssociationKeypair,
    },
    HelloReqSent {
        association_public_key: AssociationPublicKey,
        ecdh: EcdhKeypair,
    },
    Connected {
        shared_secret: SharedSecret,
    },
}

impl SessionState {
    /// `Disconnected → Connecting`: the transport is being opened for this
    /// association key.
    pub fn begin(association: AssociationKeypair) -> Self {
        SessionState::Connecting { association }
    }

    pub fn status(&self) -> SessionStatus {
        match self {
            SessionState::Disconnected => SessionStatus::Disconnected,
            SessionState::Connecting { .. } => SessionStatus::Connecting,
            SessionState::HelloReqSent { .. } => SessionStatus::HelloReqSent,
            SessionState::Connected { .. } => SessionStatus::Connected,
        }
    }

    /// `Connecting → HelloReqSent`: generates the ECDH keypair and returns
    /// the HELLO_REQ to put on the wire.
    pub fn on_transport_open(self) -> Result<(Self, Vec<u8>), MwaError> {
        match self {
            SessionState::Connecting { association } => {
                let ecdh = EcdhKeypair::generate();
                let (hello_req, association_public_key) =
                    build_hello_req(ecdh.public_key(), association);
                Ok((
                    SessionState::HelloReqSent {
                        association_public_key,
                        ecdh,
                    },
                    hello_req,
                ))
            }
            other => Err(unexpected(&other, "transport open")),
        }
    }

    /// `HelloReqSent → Connected` on a valid HELLO_RSP.
    ///
    /// On failure the ECDH key is gone and the state is dropped; the caller
    /// is back at `Disconnected`.
    pub fn on_hello_rsp(self, frame: &[u8]) -> Result<Self, MwaError> {
        match self {
            SessionState::HelloReqSent {
                association_public_key,
                ecdh,
            } => {
                let (shared_secret, _properties) =
                    parse_hello_rsp(frame, ecdh, &association_public_key)?;
                Ok(SessionState::Connected { shared_secret })
            }
            other => Err(unexpected(&other, "HELLO_RSP")),
        }
    }

    /// Take the session secret out of a `Connected` state.
    pub fn into_shared_secret(self) -> Result<SharedSecret, MwaError> {
        match self {
            SessionState::Connected { shared_secret } => Ok(shared_secret),
            other => Err(unexpected(&other, "request dispatch")),
        }
    }
}

fn unexpected(state: &SessionState, event: &str) -> MwaError {
    MwaError::ProtocolViolation(format!("{} while {}", event, state.status()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HELLO_REQ_LENGTH;
    use crate::handshake::{build_hello_rsp, verify_hello_req, SessionProperties};

    #[test]
    fn happy_path_reaches_connected() {
        let association = AssociationKeypair::generate();
        let association_public_key = association.public_key().clone();

        let state = SessionState::begin(association);
        assert_eq!(state.status(), SessionStatus::Connecting);

        let (state, hello_req) = state.on_transport_open().unwrap();
        assert_eq!(state.status(), SessionStatus::HelloReqSent);
        assert_eq!(hello_req.len(), HELLO_REQ_LENGTH);

        let dapp_public = verify_hello_req(&hello_req, &association_public_key).unwrap();
        let (hello_rsp, _) = build_hello_rsp(
            &dapp_public,
            &association_public_key,
            &SessionProperties::default(),
        )
        .unwrap();

        let state = state.on_hello_rsp(&hello_rsp).unwrap();
        assert_eq!(state.status(), SessionStatus::Connected);
        assert!(state.into_shared_secret().is_ok());
    }

    #[test]
    fn out_of_order_events_rejected() {
        assert!(SessionState::Disconnected.on_transport_open().is_err());
        assert!(SessionState::Disconnected.on_hello_rsp(&[0u8; 200]).is_err());

        let connecting = SessionState::begin(AssociationKeypair::generate());
        assert!(matches!(
            connecting.on_hello_rsp(&[0u8; 200]),
            Err(MwaError::ProtocolViolation(_))
        ));

        let connecting = SessionState::begin(AssociationKeypair::generate());
        assert!(connecting.into_shared_secret().is_err());
    }

    #[test]
    fn garbage_hello_rsp_fails_handshake() {
        let state = SessionState::begin(AssociationKeypair::generate());
        let (state, _) = state.on_transport_open().unwrap();
        assert!(matches!(
            state.on_hello_rsp(&[0x04; 120]),
            Err(MwaError::HandshakeFailed(_))
        ));
    }

    #[test]
    fn status_names() {
        assert_eq!(SessionStatus::HelloReqSent.to_string(), "hello_req_sent");
        assert_eq!(SessionState::Disconnected.status().to_string(), "disconnected");
    }
}
