//! Error types for the local association protocol.
//!
//! Every fallible operation that crosses a module boundary returns an
//! [`MwaError`]. The variants follow the failure scopes of a session:
//! configuration problems surface before any I/O, transport and handshake
//! problems end the whole `transact` call, and [`MwaError::JsonRpc`] only
//! ever reaches the caller awaiting that one request.

use thiserror::Error;

use crate::config::{MAX_ASSOCIATION_PORT, MIN_ASSOCIATION_PORT};
use crate::crypto::encryption::EncryptionError;
use crate::crypto::keys::KeyError;
use crate::jsonrpc::JsonRpcError;
use crate::transport::TransportError;

/// Errors that can occur while establishing or running a session.
#[derive(Clone, Debug, Error)]
pub enum MwaError {
    /// The association port lies outside the dynamic range.
    #[error(
        "association port {0} out of range ({}..={})",
        MIN_ASSOCIATION_PORT,
        MAX_ASSOCIATION_PORT
    )]
    InvalidAssociationPort(u32),

    /// Any other configuration problem detected before I/O.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The association URL could not be parsed.
    #[error("invalid association URL: {0}")]
    InvalidAssociationUrl(String),

    /// The wallet never accepted the transport connection.
    #[error("failed to connect to wallet after {attempts} attempts: {last_error}")]
    WalletConnection {
        /// Number of connection attempts made.
        attempts: u32,
        /// The error reported by the final attempt.
        last_error: String,
    },

    /// The transport closed while the session was still in use.
    #[error("session closed (code {code}): {reason}")]
    SessionClosed {
        /// WebSocket close code.
        code: u16,
        /// Close reason supplied by the peer, possibly empty.
        reason: String,
    },

    /// HELLO_REQ or HELLO_RSP failed validation.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// No valid hello arrived within the configured window.
    #[error("handshake timed out after {timeout_ms}ms")]
    HandshakeTimeout {
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The wallet answered a request with a JSON-RPC error object.
    #[error(transparent)]
    JsonRpc(#[from] JsonRpcError),

    /// An encrypted frame failed to decrypt or parse. Fatal to the session.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("key error: {0}")]
    Key(#[from] KeyError),

    #[error("encryption error: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The session is no longer connected; the request was never sent or
    /// will never be answered.
    #[error("session disconnected")]
    Disconnected,
}

impl MwaError {
    /// Whether this error ends the session as a whole, as opposed to a
    /// single request.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, MwaError::JsonRpc(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_error_mentions_range() {
        let msg = MwaError::InvalidAssociationPort(65536).to_string();
        assert!(msg.contains("65536"));
        assert!(msg.contains("49152..=65535"));
    }

    #[test]
    fn only_rpc_errors_are_request_scoped() {
        let rpc = MwaError::JsonRpc(JsonRpcError {
            id: 3,
            code: -3,
            message: "declined".to_string(),
            data: None,
        });
        assert!(!rpc.is_fatal());
        assert!(MwaError::Disconnected.is_fatal());
        assert!(MwaError::HandshakeFailed("bad".to_string()).is_fatal());
    }
}
