//! # Loopback WebSocket Transport
//!
//! The dapp dials `ws://localhost:<port>/solana-wallet` and offers the
//! `com.solana.mobilewalletadapter.v1` subprotocol; the wallet refuses any
//! upgrade that does not ask for it. Every protocol message is exactly one
//! binary WebSocket message. Text messages are a protocol error; ping/pong
//! are handled by tungstenite and never surface.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::server::{
    Callback, ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{accept_hdr_async, connect_async, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::{
    CLOSE_CODE_ABNORMAL, CLOSE_CODE_NO_STATUS, LOCAL_HOST, WEBSOCKET_PATH, WEBSOCKET_SUBPROTOCOL,
};

use super::{Acceptor, Connection, Connector, FrameSink, FrameSource, TransportError, TransportEvent};

/// `ws://<host>:<port>/solana-wallet`
pub fn endpoint_url(host: &str, port: u16) -> String {
    format!("ws://{}:{}{}", host, port, WEBSOCKET_PATH)
}

// ---------------------------------------------------------------------------
// Frame halves
// ---------------------------------------------------------------------------

struct WebSocketSink<S> {
    inner: SplitSink<WebSocketStream<S>, Message>,
    closed: bool,
}

#[async_trait]
impl<S> FrameSink for WebSocketSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.inner
            .send(Message::binary(frame))
            .await
            .map_err(map_stream_error)
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        match self.inner.send(Message::Close(Some(frame))).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(map_stream_error(e)),
        }
    }
}

struct WebSocketSource<S> {
    inner: SplitStream<WebSocketStream<S>>,
    finished: Option<TransportEvent>,
}

impl<S> WebSocketSource<S> {
    fn finish(&mut self, code: u16, reason: String) -> TransportEvent {
        let event = TransportEvent::Closed { code, reason };
        self.finished = Some(event.clone());
        event
    }
}

#[async_trait]
impl<S> FrameSource for WebSocketSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn next_event(&mut self) -> Result<TransportEvent, TransportError> {
        if let Some(done) = &self.finished {
            return Ok(done.clone());
        }
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(TransportEvent::Frame(data.to_vec())),
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(frame) => (u16::from(frame.code), frame.reason.as_str().to_owned()),
                        None => (CLOSE_CODE_NO_STATUS, String::new()),
                    };
                    return Ok(self.finish(code, reason));
                }
                Some(Ok(Message::Text(_))) => {
                    return Err(TransportError::UnexpectedMessage(
                        "text frame on binary-only channel".to_string(),
                    ));
                }
                Some(Ok(_)) => continue,
                Some(Err(WsError::ConnectionClosed)) | Some(Err(WsError::AlreadyClosed)) | None => {
                    return Ok(self.finish(CLOSE_CODE_ABNORMAL, String::new()));
                }
                Some(Err(e)) => {
                    warn!(error = %e, "websocket read failed");
                    return Ok(self.finish(CLOSE_CODE_ABNORMAL, e.to_string()));
                }
            }
        }
    }
}

fn into_connection<S>(stream: WebSocketStream<S>) -> Connection
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, source) = stream.split();
    Connection::new(
        Box::new(WebSocketSink {
            inner: sink,
            closed: false,
        }),
        Box::new(WebSocketSource {
            inner: source,
            finished: None,
        }),
    )
}

fn map_stream_error(e: WsError) -> TransportError {
    match e {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
        other => TransportError::Io(other.to_string()),
    }
}

/// Sorts connect failures into "try again later" and "give up".
fn map_connect_error(e: WsError) -> TransportError {
    match e {
        WsError::Io(io) if io.kind() == std::io::ErrorKind::ConnectionRefused => {
            TransportError::ConnectionRefused(io.to_string())
        }
        WsError::Io(io) => TransportError::ConnectionFailed(io.to_string()),
        WsError::Url(url) => TransportError::InvalidEndpoint(url.to_string()),
        WsError::Http(response) => {
            TransportError::UpgradeRejected(format!("HTTP {}", response.status()))
        }
        other => TransportError::UpgradeRejected(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Dapp side
// ---------------------------------------------------------------------------

/// Dials the wallet's loopback endpoint.
#[derive(Clone, Debug)]
pub struct WebSocketConnector {
    host: String,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self {
            host: LOCAL_HOST.to_string(),
        }
    }

    /// Dial a host other than `localhost`, e.g. `127.0.0.1` in tests.
    pub fn with_host(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, port: u16) -> Result<Connection, TransportError> {
        let url = endpoint_url(&self.host, port);
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;
        request.headers_mut().insert(
            SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(WEBSOCKET_SUBPROTOCOL),
        );

        let (stream, response) = connect_async(request).await.map_err(map_connect_error)?;

        let negotiated = response
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok());
        if negotiated != Some(WEBSOCKET_SUBPROTOCOL) {
            return Err(TransportError::UpgradeRejected(format!(
                "wallet negotiated subprotocol {:?}",
                negotiated
            )));
        }

        debug!(%url, "websocket connected");
        Ok(into_connection(stream))
    }
}

// ---------------------------------------------------------------------------
// Wallet side
// ---------------------------------------------------------------------------

/// Checks path and subprotocol during the upgrade.
struct SubprotocolCallback;

impl Callback for SubprotocolCallback {
    fn on_request(self, request: &Request, mut response: Response) -> Result<Response, ErrorResponse> {
        if request.uri().path() != WEBSOCKET_PATH {
            return Err(reject(
                StatusCode::NOT_FOUND,
                format!("unknown path {}", request.uri().path()),
            ));
        }

        let offered = request
            .headers()
            .get_all(SEC_WEBSOCKET_PROTOCOL)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|p| p.trim() == WEBSOCKET_SUBPROTOCOL);
        if !offered {
            return Err(reject(
                StatusCode::BAD_REQUEST,
                format!("client must request subprotocol '{}'", WEBSOCKET_SUBPROTOCOL),
            ));
        }

        response.headers_mut().insert(
            SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(WEBSOCKET_SUBPROTOCOL),
        );
        Ok(response)
    }
}

fn reject(status: StatusCode, body: String) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(body));
    *response.status_mut() = status;
    response
}

/// Listens on a loopback port for the dapp's connection.
pub struct WebSocketAcceptor {
    listener: TcpListener,
}

impl WebSocketAcceptor {
    /// Bind `127.0.0.1:<port>`. Port 0 picks a free port.
    pub async fn bind(port: u16) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| TransportError::Io(format!("bind {} failed: {}", port, e)))?;
        Ok(Self { listener })
    }

    pub fn local_port(&self) -> Result<u16, TransportError> {
        self.listener
            .local_addr()
            .map(|addr| addr.port())
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

#[async_trait]
impl Acceptor for WebSocketAcceptor {
    async fn accept(&mut self) -> Result<Connection, TransportError> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        let stream = accept_hdr_async(stream, SubprotocolCallback)
            .await
            .map_err(|e| TransportError::UpgradeRejected(e.to_string()))?;
        info!(%peer, "dapp connected");
        Ok(into_connection(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_url_shape() {
        assert_eq!(
            endpoint_url("localhost", 49152),
            "ws://localhost:49152/solana-wallet"
        );
    }

    #[tokio::test]
    async fn nothing_listening_is_retryable() {
        // Bind then drop to find a port that is very likely closed.
        let port = {
            let acceptor = WebSocketAcceptor::bind(0).await.unwrap();
            acceptor.local_port().unwrap()
        };
        let err = WebSocketConnector::with_host("127.0.0.1")
            .connect(port)
            .await
            .unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {:?}", err);
    }

    #[tokio::test]
    async fn binary_frames_and_close_over_loopback() {
        let mut acceptor = WebSocketAcceptor::bind(0).await.unwrap();
        let port = acceptor.local_port().unwrap();

        let wallet = tokio::spawn(async move {
            let mut conn = acceptor.accept().await.unwrap();
            let first = conn.source.next_event().await.unwrap();
            conn.sink.send(vec![0xaa, 0xbb]).await.unwrap();
            let last = conn.source.next_event().await.unwrap();
            (first, last)
        });

        let mut dapp = WebSocketConnector::with_host("127.0.0.1")
            .connect(port)
            .await
            .unwrap();
        dapp.sink.send(vec![1, 2, 3]).await.unwrap();
        assert_eq!(
            dapp.source.next_event().await.unwrap(),
            TransportEvent::Frame(vec![0xaa, 0xbb])
        );
        dapp.sink.close(1000, "bye").await.unwrap();
        dapp.sink.close(1000, "bye").await.unwrap();

        let (first, last) = wallet.await.unwrap();
        assert_eq!(first, TransportEvent::Frame(vec![1, 2, 3]));
        assert_eq!(
            last,
            TransportEvent::Closed {
                code: 1000,
                reason: "bye".to_string()
            }
        );
    }

    #[tokio::test]
    async fn upgrade_without_subprotocol_rejected() {
        let mut acceptor = WebSocketAcceptor::bind(0).await.unwrap();
        let port = acceptor.local_port().unwrap();
        let wallet = tokio::spawn(async move { acceptor.accept().await });

        let url = endpoint_url("127.0.0.1", port);
        let result = connect_async(url.as_str()).await;
        assert!(result.is_err());
        assert!(matches!(
            wallet.await.unwrap(),
            Err(TransportError::UpgradeRejected(_))
        ));
    }
}
