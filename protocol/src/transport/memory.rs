//! In-process transport.
//!
//! [`pair`] returns two connected [`Connection`]s backed by unbounded tokio
//! channels. [`listener`] wraps that in a [`Connector`]/[`Acceptor`] pair so
//! the full `transact` flow, including connection retries, can run without
//! sockets.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::CLOSE_CODE_ABNORMAL;

use super::{Acceptor, Connection, Connector, FrameSink, FrameSource, TransportError, TransportEvent};

struct MemorySink {
    peer: mpsc::UnboundedSender<TransportEvent>,
    closed: bool,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.peer
            .send(TransportEvent::Frame(frame))
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // The peer may already be gone; closing is still successful.
        let _ = self.peer.send(TransportEvent::Closed {
            code,
            reason: reason.to_string(),
        });
        Ok(())
    }
}

struct MemorySource {
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    finished: Option<TransportEvent>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn next_event(&mut self) -> Result<TransportEvent, TransportError> {
        if let Some(done) = &self.finished {
            return Ok(done.clone());
        }
        let event = self.inbound.recv().await.unwrap_or(TransportEvent::Closed {
            code: CLOSE_CODE_ABNORMAL,
            reason: String::new(),
        });
        if matches!(event, TransportEvent::Closed { .. }) {
            self.finished = Some(event.clone());
        }
        Ok(event)
    }
}

/// Two connected endpoints. Frames sent on one arrive on the other.
///
/// Dropping an endpoint without closing it shows up on the other side as
/// an abnormal close (1006).
pub fn pair() -> (Connection, Connection) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    let a = Connection::new(
        Box::new(MemorySink {
            peer: b_tx,
            closed: false,
        }),
        Box::new(MemorySource {
            inbound: a_rx,
            finished: None,
        }),
    );
    let b = Connection::new(
        Box::new(MemorySink {
            peer: a_tx,
            closed: false,
        }),
        Box::new(MemorySource {
            inbound: b_rx,
            finished: None,
        }),
    );
    (a, b)
}

/// Dapp half of an in-memory listener.
pub struct MemoryConnector {
    incoming: mpsc::UnboundedSender<Connection>,
    refusals_left: AtomicU32,
    attempts: AtomicU32,
}

impl MemoryConnector {
    /// Refuse the next `count` connection attempts before accepting.
    pub fn refuse_first(self, count: u32) -> Self {
        self.refusals_left.store(count, Ordering::SeqCst);
        self
    }

    /// A connector whose wallet never starts listening.
    pub fn unreachable() -> Self {
        let (incoming, _) = mpsc::unbounded_channel();
        Self {
            incoming,
            refusals_left: AtomicU32::new(u32::MAX),
            attempts: AtomicU32::new(0),
        }
    }

    /// Number of times `connect` has been called.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, port: u16) -> Result<Connection, TransportError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let refused = self
            .refusals_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if refused {
            debug!(port, attempt, "memory connector refusing connection");
            return Err(TransportError::ConnectionRefused(format!(
                "nothing listening on memory port {}",
                port
            )));
        }

        let (dapp, wallet) = pair();
        self.incoming.send(wallet).map_err(|_| {
            TransportError::ConnectionRefused(format!("memory listener on {} is gone", port))
        })?;
        Ok(dapp)
    }
}

/// Wallet half of an in-memory listener.
pub struct MemoryAcceptor {
    incoming: mpsc::UnboundedReceiver<Connection>,
}

impl MemoryAcceptor {
    /// Take a connection that has already been dialed, without waiting.
    pub fn try_accept(&mut self) -> Option<Connection> {
        self.incoming.try_recv().ok()
    }
}

#[async_trait]
impl Acceptor for MemoryAcceptor {
    async fn accept(&mut self) -> Result<Connection, TransportError> {
        self.incoming.recv().await.ok_or(TransportError::Closed)
    }
}

/// A connected connector/acceptor pair.
pub fn listener() -> (MemoryConnector, MemoryAcceptor) {
    let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
    (
        MemoryConnector {
            incoming: incoming_tx,
            refusals_left: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
        },
        MemoryAcceptor {
            incoming: incoming_rx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (mut a, mut b) = pair();
        a.sink.send(vec![1, 2, 3]).await.unwrap();
        b.sink.send(vec![9]).await.unwrap();

        assert_eq!(
            b.source.next_event().await.unwrap(),
            TransportEvent::Frame(vec![1, 2, 3])
        );
        assert_eq!(a.source.next_event().await.unwrap(), TransportEvent::Frame(vec![9]));
    }

    #[tokio::test]
    async fn close_is_delivered_once_and_sticks() {
        let (mut a, mut b) = pair();
        a.sink.close(1000, "done").await.unwrap();
        a.sink.close(1000, "again").await.unwrap();
        assert_eq!(a.sink.send(vec![1]).await, Err(TransportError::Closed));

        let expected = TransportEvent::Closed {
            code: 1000,
            reason: "done".to_string(),
        };
        assert_eq!(b.source.next_event().await.unwrap(), expected);
        assert_eq!(b.source.next_event().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn dropped_peer_is_abnormal_close() {
        let (a, mut b) = pair();
        drop(a);
        let event = b.source.next_event().await.unwrap();
        assert_eq!(
            event,
            TransportEvent::Closed {
                code: CLOSE_CODE_ABNORMAL,
                reason: String::new()
            }
        );
        assert!(!event.is_clean_close());
    }

    #[tokio::test]
    async fn connector_refuses_then_connects() {
        let (connector, mut acceptor) = listener();
        let connector = connector.refuse_first(2);

        for _ in 0..2 {
            let err = connector.connect(50000).await.unwrap_err();
            assert!(err.is_retryable());
        }
        assert!(acceptor.try_accept().is_none());

        let mut dapp = connector.connect(50000).await.unwrap();
        let mut wallet = acceptor.accept().await.unwrap();
        dapp.sink.send(b"hello".to_vec()).await.unwrap();
        assert_eq!(
            wallet.source.next_event().await.unwrap(),
            TransportEvent::Frame(b"hello".to_vec())
        );
        assert_eq!(connector.attempts(), 3);
    }

    #[tokio::test]
    async fn unreachable_connector_always_refuses() {
        let connector = MemoryConnector::unreachable();
        for _ in 0..5 {
            assert!(matches!(
                connector.connect(50000).await,
                Err(TransportError::ConnectionRefused(_))
            ));
        }
        assert_eq!(connector.attempts(), 5);
    }
}
