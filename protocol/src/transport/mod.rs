//! # Frame Transport
//!
//! The session layer only ever moves whole binary frames. This module
//! defines that contract and two implementations:
//!
//! - [`websocket`]: the real loopback channel, `ws://localhost:<port>/solana-wallet`
//!   with the `com.solana.mobilewalletadapter.v1` subprotocol.
//! - [`memory`]: an in-process pair of channels for tests and embedding.
//!
//! A [`Connection`] is split into a [`FrameSink`] and a [`FrameSource`] so
//! that the session driver can read and write from the same task without
//! borrowing the transport twice.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::CLOSE_CODE_NORMAL;

pub mod memory;
pub mod websocket;

pub use memory::{MemoryAcceptor, MemoryConnector};
pub use websocket::{WebSocketAcceptor, WebSocketConnector};

/// Errors raised by a transport implementation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Nothing is listening on the port (yet).
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// Any other failure while opening the socket.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The peer answered but refused the WebSocket upgrade.
    #[error("upgrade rejected: {0}")]
    UpgradeRejected(String),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// A non-binary data frame arrived.
    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    /// The connection was already closed locally or by the peer.
    #[error("transport closed")]
    Closed,

    #[error("i/o error: {0}")]
    Io(String),
}

impl TransportError {
    /// Whether a fresh connection attempt might succeed.
    ///
    /// Only failures to reach a listener qualify: the wallet app may still
    /// be starting its server when the dapp begins dialing.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionRefused(_) | TransportError::ConnectionFailed(_)
        )
    }
}

/// Something that happened on the inbound half of a connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(Vec<u8>),
    /// The connection ended. Any code other than 1000 is an unclean close.
    Closed { code: u16, reason: String },
}

impl TransportEvent {
    pub fn is_clean_close(&self) -> bool {
        matches!(self, TransportEvent::Closed { code, .. } if *code == CLOSE_CODE_NORMAL)
    }
}

/// Outbound half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Close with the given code. Calling it again is a no-op.
    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError>;
}

/// Inbound half of a connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next frame or the end of the connection.
    ///
    /// After a [`TransportEvent::Closed`] has been returned, further calls
    /// keep returning `Closed`.
    async fn next_event(&mut self) -> Result<TransportEvent, TransportError>;
}

/// An open, bidirectional frame channel.
pub struct Connection {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

impl Connection {
    pub fn new(sink: Box<dyn FrameSink>, source: Box<dyn FrameSource>) -> Self {
        Self { sink, source }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Connection")
    }
}

/// Dapp side: dials the wallet's local endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, port: u16) -> Result<Connection, TransportError>;
}

/// Wallet side: waits for the dapp to dial in.
#[async_trait]
pub trait Acceptor: Send {
    async fn accept(&mut self) -> Result<Connection, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_reachability_errors_retry() {
        assert!(TransportError::ConnectionRefused("nobody home".into()).is_retryable());
        assert!(TransportError::ConnectionFailed("reset".into()).is_retryable());
        assert!(!TransportError::UpgradeRejected("400".into()).is_retryable());
        assert!(!TransportError::InvalidEndpoint("bad".into()).is_retryable());
        assert!(!TransportError::Closed.is_retryable());
    }

    #[test]
    fn clean_close_is_code_1000_only() {
        let clean = TransportEvent::Closed {
            code: 1000,
            reason: String::new(),
        };
        let abnormal = TransportEvent::Closed {
            code: 1006,
            reason: String::new(),
        };
        assert!(clean.is_clean_close());
        assert!(!abnormal.is_clean_close());
        assert!(!TransportEvent::Frame(vec![1]).is_clean_close());
    }
}
