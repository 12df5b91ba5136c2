//! # Local Wallet Session
//!
//! Wallet half of a local association. [`LocalWalletSession::accept`]
//! waits for the dapp to connect, answers the handshake and then spawns a
//! driver task that:
//!
//! - decrypts each inbound request and hands it to the application as a
//!   [`WalletRequest`];
//! - answers malformed, unknown, duplicate or oversized requests itself;
//! - encrypts every response the application completes, in completion
//!   order.
//!
//! The session ends when the dapp closes the transport or the application
//! calls [`LocalWalletSession::finish`].

use std::collections::HashSet;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{WalletConfig, CLOSE_CODE_NORMAL, CLOSE_CODE_PROTOCOL_ERROR};
use crate::crypto::encryption::SharedSecret;
use crate::crypto::keys::AssociationPublicKey;
use crate::error::MwaError;
use crate::handshake::{build_hello_rsp, verify_hello_req, SessionProperties};
use crate::jsonrpc::codec::{decode_request, encode_response};
use crate::jsonrpc::{JsonRpcErrorObject, JsonRpcResponse};
use crate::transport::{Acceptor, Connection, FrameSink, FrameSource, TransportEvent};

use super::request::{WalletFailure, WalletRequest};

/// An established wallet-side session.
pub struct LocalWalletSession {
    requests: mpsc::Receiver<WalletRequest>,
    shutdown: Option<oneshot::Sender<()>>,
    driver: Option<JoinHandle<Result<(), MwaError>>>,
}

impl LocalWalletSession {
    /// Accept one connection from `acceptor` and complete the handshake
    /// for the association key taken from the association URL.
    pub async fn accept<A>(
        acceptor: &mut A,
        association_public_key: &AssociationPublicKey,
        config: WalletConfig,
    ) -> Result<Self, MwaError>
    where
        A: Acceptor + ?Sized,
    {
        let connection = acceptor.accept().await?;
        Self::establish(connection, association_public_key, config).await
    }

    /// Complete the handshake on an already open connection.
    pub async fn establish(
        mut connection: Connection,
        association_public_key: &AssociationPublicKey,
        config: WalletConfig,
    ) -> Result<Self, MwaError> {
        let handshake = timeout(
            config.handshake_timeout,
            answer_hello(&mut connection, association_public_key),
        )
        .await
        .unwrap_or_else(|_| {
            Err(MwaError::HandshakeTimeout {
                timeout_ms: config.handshake_timeout.as_millis() as u64,
            })
        });
        let secret = match handshake {
            Ok(secret) => secret,
            Err(e) => {
                warn!(error = %e, "rejecting dapp");
                let _ = connection
                    .sink
                    .close(CLOSE_CODE_PROTOCOL_ERROR, "handshake failed")
                    .await;
                return Err(e);
            }
        };
        let span = info_span!("wallet_session", session = %Uuid::new_v4());
        span.in_scope(|| {
            info!(
                association = %association_public_key.fingerprint(),
                "wallet session established"
            )
        });

        let (requests_tx, requests_rx) = mpsc::channel(config.request_queue_depth.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();
        let driver = WalletDriver {
            sink: connection.sink,
            source: connection.source,
            secret,
            config,
            requests: requests_tx,
            replies_tx,
            replies_rx,
            outstanding: HashSet::new(),
        };

        Ok(Self {
            requests: requests_rx,
            shutdown: Some(shutdown_tx),
            driver: Some(tokio::spawn(driver.run(shutdown_rx).instrument(span))),
        })
    }

    /// Next request from the dapp, or `None` once the session has ended.
    pub async fn next_request(&mut self) -> Option<WalletRequest> {
        self.requests.recv().await
    }

    /// Flush completed responses, close the transport and wait for the
    /// driver. Returns the driver's error if the session ended abnormally.
    pub async fn finish(mut self) -> Result<(), MwaError> {
        // Unanswered requests still queued here are dropped, which answers
        // them with an internal error before the transport closes.
        self.requests.close();
        while let Ok(request) = self.requests.try_recv() {
            drop(request);
        }
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        match self.driver.take() {
            Some(driver) => driver.await.unwrap_or_else(|e| {
                warn!(error = %e, "wallet session driver aborted");
                Err(MwaError::Disconnected)
            }),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for LocalWalletSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWalletSession")
            .field("running", &self.driver.is_some())
            .finish()
    }
}

async fn answer_hello(
    connection: &mut Connection,
    association_public_key: &AssociationPublicKey,
) -> Result<SharedSecret, MwaError> {
    let hello_req = match connection.source.next_event().await? {
        TransportEvent::Frame(frame) => frame,
        TransportEvent::Closed { code, reason } => {
            return Err(MwaError::SessionClosed { code, reason })
        }
    };
    let dapp_public = verify_hello_req(&hello_req, association_public_key)?;
    let (hello_rsp, secret) = build_hello_rsp(
        &dapp_public,
        association_public_key,
        &SessionProperties::default(),
    )?;
    connection.sink.send(hello_rsp).await?;
    debug!("HELLO_RSP sent");
    Ok(secret)
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

struct WalletDriver {
    sink: Box<dyn FrameSink>,
    source: Box<dyn FrameSource>,
    secret: SharedSecret,
    config: WalletConfig,
    requests: mpsc::Sender<WalletRequest>,
    replies_tx: mpsc::UnboundedSender<JsonRpcResponse>,
    replies_rx: mpsc::UnboundedReceiver<JsonRpcResponse>,
    /// Ids handed to the application and not yet answered.
    outstanding: HashSet<u64>,
}

impl WalletDriver {
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) -> Result<(), MwaError> {
        let result = self.serve(&mut shutdown).await;
        let code = match &result {
            Ok(()) => CLOSE_CODE_NORMAL,
            Err(e) => {
                warn!(error = %e, "wallet session failed");
                CLOSE_CODE_PROTOCOL_ERROR
            }
        };
        if let Err(e) = self.sink.close(code, "").await {
            debug!(error = %e, "close failed");
        }
        info!(unanswered = self.outstanding.len(), "wallet session ended");
        result
    }

    async fn serve(&mut self, shutdown: &mut oneshot::Receiver<()>) -> Result<(), MwaError> {
        loop {
            tokio::select! {
                _ = &mut *shutdown => {
                    self.flush_replies().await?;
                    return Ok(());
                }
                event = self.source.next_event() => match event? {
                    TransportEvent::Frame(frame) => self.on_frame(&frame).await?,
                    TransportEvent::Closed { code, reason } => {
                        if code == CLOSE_CODE_NORMAL {
                            info!("dapp closed the session");
                            return Ok(());
                        }
                        return Err(MwaError::SessionClosed { code, reason });
                    }
                },
                Some(reply) = self.replies_rx.recv() => self.send_response(reply).await?,
            }
        }
    }

    async fn on_frame(&mut self, frame: &[u8]) -> Result<(), MwaError> {
        let request = decode_request(frame, &mut self.secret)?;
        let id = request.id;
        debug!(id, method = %request.method, "request received");

        if self.outstanding.contains(&id) {
            warn!(id, "duplicate request id");
            // The original request is still held by the application.
            return self
                .write_response(&JsonRpcResponse::failure(
                    id,
                    JsonRpcErrorObject::invalid_request(format!("request id {} already in use", id)),
                ))
                .await;
        }

        let request = match WalletRequest::from_rpc(request, &self.replies_tx) {
            Ok(request) => request,
            Err(error) => {
                debug!(id, code = error.code, "request rejected before dispatch");
                return self.send_response(JsonRpcResponse::failure(id, error)).await;
            }
        };
        self.outstanding.insert(id);

        if self.exceeds_limits(&request) {
            request.reject(WalletFailure::TooManyPayloads);
            return Ok(());
        }

        if let Err(mpsc::error::SendError(request)) = self.requests.send(request).await {
            // Application stopped listening; dropping answers the request.
            debug!(id = request.id(), "no application to handle request");
        }
        Ok(())
    }

    fn exceeds_limits(&self, request: &WalletRequest) -> bool {
        let limit = match request {
            WalletRequest::SignTransactions { .. } | WalletRequest::SignAndSendTransactions { .. } => {
                self.config.max_transactions_per_request
            }
            WalletRequest::SignMessages { .. } => self.config.max_messages_per_request,
            _ => None,
        };
        match (limit, request.payload_count()) {
            (Some(limit), Some(count)) => count > limit as usize,
            _ => false,
        }
    }

    /// Send the answer to a request and release its id.
    async fn send_response(&mut self, response: JsonRpcResponse) -> Result<(), MwaError> {
        self.outstanding.remove(&response.id);
        self.write_response(&response).await
    }

    async fn write_response(&mut self, response: &JsonRpcResponse) -> Result<(), MwaError> {
        let frame = encode_response(response, &mut self.secret)?;
        self.sink.send(frame).await?;
        debug!(id = response.id, ok = response.error.is_none(), "response sent");
        Ok(())
    }

    async fn flush_replies(&mut self) -> Result<(), MwaError> {
        while let Ok(reply) = self.replies_rx.try_recv() {
            self.send_response(reply).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::crypto::keys::{AssociationKeypair, EcdhKeypair};
    use crate::handshake::{build_hello_req, parse_hello_rsp};
    use crate::jsonrpc::codec::{decode_response, encode_request};
    use crate::jsonrpc::message::codes;
    use crate::jsonrpc::methods::EmptyResult;
    use crate::jsonrpc::{JsonRpcRequest, RpcMethod};
    use crate::transport::memory;

    /// Raw dapp end of a session whose wallet end runs `LocalWalletSession`.
    struct RawDapp {
        conn: Connection,
        secret: SharedSecret,
    }

    impl RawDapp {
        async fn request(&mut self, request: &JsonRpcRequest) {
            let frame = encode_request(request, &mut self.secret).unwrap();
            self.conn.sink.send(frame).await.unwrap();
        }

        async fn response(&mut self) -> JsonRpcResponse {
            match self.conn.source.next_event().await.unwrap() {
                TransportEvent::Frame(frame) => decode_response(&frame, &mut self.secret).unwrap(),
                other => panic!("expected response, got {:?}", other),
            }
        }
    }

    async fn connected(config: WalletConfig) -> (RawDapp, LocalWalletSession) {
        let (mut dapp, wallet) = memory::pair();
        let association = AssociationKeypair::generate();
        let association_public_key = association.public_key().clone();
        let ecdh = EcdhKeypair::generate();
        let (hello_req, _) = build_hello_req(ecdh.public_key(), association);
        dapp.sink.send(hello_req).await.unwrap();

        let session = LocalWalletSession::establish(wallet, &association_public_key, config)
            .await
            .unwrap();
        let hello_rsp = match dapp.source.next_event().await.unwrap() {
            TransportEvent::Frame(frame) => frame,
            other => panic!("expected HELLO_RSP, got {:?}", other),
        };
        let (secret, _) = parse_hello_rsp(&hello_rsp, ecdh, &association_public_key).unwrap();
        (RawDapp { conn: dapp, secret }, session)
    }

    #[tokio::test]
    async fn request_reaches_application_and_answer_returns() {
        let (mut dapp, mut session) = connected(WalletConfig::default()).await;
        dapp.request(&JsonRpcRequest::new(
            1,
            RpcMethod::Deauthorize,
            json!({ "auth_token": "abc" }),
        ))
        .await;

        match session.next_request().await.unwrap() {
            WalletRequest::Deauthorize { params, responder } => {
                assert_eq!(params.auth_token, "abc");
                responder.complete(Ok(EmptyResult {}));
            }
            other => panic!("unexpected request: {:?}", other),
        }
        assert_eq!(dapp.response().await, JsonRpcResponse::success(1, json!({})));
    }

    #[tokio::test]
    async fn unknown_method_and_duplicate_id_answered_by_driver() {
        let (mut dapp, mut session) = connected(WalletConfig::default()).await;

        dapp.request(&JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: 1,
            method: "teleport".to_string(),
            params: json!({}),
        })
        .await;
        let error = dapp.response().await.into_result().unwrap_err();
        assert_eq!(error.code, codes::METHOD_NOT_FOUND);

        let caps = JsonRpcRequest::new(2, RpcMethod::GetCapabilities, json!({}));
        dapp.request(&caps).await;
        let held = session.next_request().await.unwrap();
        for _ in 0..2 {
            dapp.request(&caps).await;
            let error = dapp.response().await.into_result().unwrap_err();
            assert_eq!((error.id, error.code), (2, codes::INVALID_REQUEST));
        }

        match held {
            WalletRequest::GetCapabilities { responder } => {
                responder.complete(Ok(WalletConfig::default().capabilities()))
            }
            other => panic!("unexpected request: {:?}", other),
        }
        let caps = dapp.response().await.into_result().unwrap();
        assert_eq!(caps["supports_sign_and_send_transactions"], true);

        dapp.conn.sink.close(1000, "").await.unwrap();
        assert!(session.next_request().await.is_none());
        session.finish().await.unwrap();
    }

    #[tokio::test]
    async fn oversized_request_never_reaches_application() {
        let config = WalletConfig {
            max_transactions_per_request: Some(1),
            ..WalletConfig::default()
        };
        let (mut dapp, mut session) = connected(config).await;
        dapp.request(&JsonRpcRequest::new(
            1,
            RpcMethod::SignTransactions,
            json!({ "payloads": ["AQID", "BAUG"] }),
        ))
        .await;

        let error = dapp.response().await.into_result().unwrap_err();
        assert_eq!(error.code, codes::ERROR_TOO_MANY_PAYLOADS);

        dapp.conn.sink.close(1000, "").await.unwrap();
        assert!(session.next_request().await.is_none());
        assert!(session.finish().await.is_ok());
    }

    #[tokio::test]
    async fn dropped_request_becomes_internal_error() {
        let (mut dapp, mut session) = connected(WalletConfig::default()).await;
        dapp.request(&JsonRpcRequest::new(
            1,
            RpcMethod::SignMessages,
            json!({ "addresses": ["AQID"], "payloads": ["BAUG"] }),
        ))
        .await;
        drop(session.next_request().await.unwrap());

        let error = dapp.response().await.into_result().unwrap_err();
        assert_eq!((error.id, error.code), (1, codes::INTERNAL_ERROR));
    }

    #[tokio::test]
    async fn finish_closes_transport_cleanly() {
        let (mut dapp, session) = connected(WalletConfig::default()).await;
        session.finish().await.unwrap();
        assert!(dapp.conn.source.next_event().await.unwrap().is_clean_close());
    }

    #[tokio::test]
    async fn corrupted_frame_ends_session_with_error() {
        let (mut dapp, mut session) = connected(WalletConfig::default()).await;
        dapp.conn.sink.send(vec![0xffu8; 40]).await.unwrap();

        assert!(session.next_request().await.is_none());
        assert!(matches!(
            session.finish().await,
            Err(MwaError::ProtocolViolation(_))
        ));
        match dapp.conn.source.next_event().await.unwrap() {
            TransportEvent::Closed { code, .. } => assert_eq!(code, CLOSE_CODE_PROTOCOL_ERROR),
            other => panic!("expected close, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn wrong_association_key_rejected() {
        let (mut dapp, wallet) = memory::pair();
        let association = AssociationKeypair::generate();
        let ecdh = EcdhKeypair::generate();
        let (hello_req, _) = build_hello_req(ecdh.public_key(), association);
        dapp.sink.send(hello_req).await.unwrap();

        let expected = AssociationKeypair::generate();
        let result =
            LocalWalletSession::establish(wallet, expected.public_key(), WalletConfig::default())
                .await;
        assert!(matches!(result, Err(MwaError::HandshakeFailed(_))));
        assert!(!dapp.source.next_event().await.unwrap().is_clean_close());
    }

    #[tokio::test]
    async fn accept_waits_for_connection() {
        use crate::transport::Connector;

        let (connector, mut acceptor) = memory::listener();
        let association = AssociationKeypair::generate();
        let association_public_key = association.public_key().clone();

        let dapp = tokio::spawn(async move {
            let mut conn = connector.connect(50000).await.unwrap();
            let ecdh = EcdhKeypair::generate();
            let (hello_req, key) = build_hello_req(ecdh.public_key(), association);
            conn.sink.send(hello_req).await.unwrap();
            match conn.source.next_event().await.unwrap() {
                TransportEvent::Frame(frame) => parse_hello_rsp(&frame, ecdh, &key).is_ok(),
                _ => false,
            }
        });

        let session =
            LocalWalletSession::accept(&mut acceptor, &association_public_key, WalletConfig::default())
                .await
                .unwrap();
        assert!(dapp.await.unwrap());
        session.finish().await.unwrap();
    }
}
