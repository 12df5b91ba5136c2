//! # Transact
//!
//! One call, one association, one transport connection:
//!
//! 1. validate the config and generate the association keypair;
//! 2. hand the association URL to an [`AssociationLauncher`];
//! 3. dial the wallet, retrying while nothing listens yet;
//! 4. exchange HELLO_REQ / HELLO_RSP within the handshake timeout;
//! 5. run the caller's callback with a [`MobileWallet`] while the session
//!    driver moves encrypted frames in the same task;
//! 6. tear down: reject anything still pending and close with 1000.
//!
//! Step 6 runs on every path out of step 3. Dropping the returned future
//! cancels whatever step is in progress.

use std::future::Future;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::association::AssociationUrl;
use crate::config::{validate_association_port, TransactConfig, CLOSE_CODE_NORMAL};
use crate::crypto::encryption::SharedSecret;
use crate::crypto::keys::AssociationKeypair;
use crate::error::MwaError;
use crate::jsonrpc::codec::{decode_response, encode_request};
use crate::jsonrpc::JsonRpcRequest;
use crate::transport::{Connection, Connector, FrameSink, FrameSource, TransportEvent, WebSocketConnector};

use super::client::{Command, MobileWallet};
use super::pending::PendingRequests;
use super::state::{SessionState, SessionStatus};

/// Delivers the association URL to the wallet out-of-band: an Android
/// intent, a QR code, a printed line.
#[async_trait]
pub trait AssociationLauncher: Send + Sync {
    async fn launch(&self, url: &AssociationUrl) -> Result<(), MwaError>;
}

#[async_trait]
impl<F> AssociationLauncher for F
where
    F: Fn(&AssociationUrl) -> Result<(), MwaError> + Send + Sync,
{
    async fn launch(&self, url: &AssociationUrl) -> Result<(), MwaError> {
        self(url)
    }
}

/// Run `callback` against a wallet reached over the loopback WebSocket.
pub async fn transact<L, F, Fut, T, E>(
    launcher: &L,
    config: &TransactConfig,
    callback: F,
) -> Result<T, E>
where
    L: AssociationLauncher + ?Sized,
    F: FnOnce(MobileWallet) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<MwaError>,
{
    transact_with(&WebSocketConnector::new(), launcher, config, callback).await
}

/// [`transact`] over an arbitrary [`Connector`].
pub async fn transact_with<C, L, F, Fut, T, E>(
    connector: &C,
    launcher: &L,
    config: &TransactConfig,
    callback: F,
) -> Result<T, E>
where
    C: Connector + ?Sized,
    L: AssociationLauncher + ?Sized,
    F: FnOnce(MobileWallet) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<MwaError>,
{
    let span = info_span!("transact", session = %Uuid::new_v4());
    run_transact(connector, launcher, config, callback)
        .instrument(span)
        .await
}

async fn run_transact<C, L, F, Fut, T, E>(
    connector: &C,
    launcher: &L,
    config: &TransactConfig,
    callback: F,
) -> Result<T, E>
where
    C: Connector + ?Sized,
    L: AssociationLauncher + ?Sized,
    F: FnOnce(MobileWallet) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<MwaError>,
{
    config.validate()?;
    let port = validate_association_port(config.port)?;

    let association = AssociationKeypair::generate();
    let url = AssociationUrl::new(config, association.public_key())?;
    info!(
        port,
        association = %association.public_key().fingerprint(),
        "starting local association"
    );

    let (status_tx, status_rx) = watch::channel(SessionStatus::Disconnected);
    launcher.launch(&url).await?;

    let state = SessionState::begin(association);
    status_tx.send_replace(state.status());
    let mut connection = match connect_with_retries(connector, port, config).await {
        Ok(connection) => connection,
        Err(e) => {
            status_tx.send_replace(SessionStatus::Disconnected);
            return Err(e.into());
        }
    };

    let handshake_result = timeout(
        config.handshake_timeout,
        handshake(state, &mut connection, &status_tx),
    )
    .await
    .unwrap_or_else(|_| {
        Err(MwaError::HandshakeTimeout {
            timeout_ms: config.handshake_timeout.as_millis() as u64,
        })
    });
    let shared_secret = match handshake_result {
        Ok(secret) => secret,
        Err(e) => {
            warn!(error = %e, "handshake failed");
            close_quietly(connection.sink.as_mut()).await;
            status_tx.send_replace(SessionStatus::Disconnected);
            return Err(e.into());
        }
    };
    status_tx.send_replace(SessionStatus::Connected);
    info!(port, "session established");

    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let wallet = MobileWallet::new(commands_tx, status_rx);
    let mut driver = SessionDriver::new(connection, shared_secret, commands_rx, status_tx);
    let outcome = driver.run_until(callback(wallet)).await;
    driver.teardown().await;
    outcome
}

async fn connect_with_retries<C>(
    connector: &C,
    port: u16,
    config: &TransactConfig,
) -> Result<Connection, MwaError>
where
    C: Connector + ?Sized,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match connector.connect(port).await {
            Ok(connection) => {
                debug!(port, attempt, "transport open");
                return Ok(connection);
            }
            Err(e) if e.is_retryable() && attempt < config.max_connection_attempts => {
                let delay = config.retry_delay(attempt);
                debug!(port, attempt, ?delay, error = %e, "wallet not listening yet");
                sleep(delay).await;
            }
            Err(e) if e.is_retryable() => {
                warn!(port, attempts = attempt, error = %e, "giving up on wallet connection");
                return Err(MwaError::WalletConnection {
                    attempts: attempt,
                    last_error: e.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn handshake(
    state: SessionState,
    connection: &mut Connection,
    status: &watch::Sender<SessionStatus>,
) -> Result<SharedSecret, MwaError> {
    let (state, hello_req) = state.on_transport_open()?;
    connection.sink.send(hello_req).await?;
    status.send_replace(state.status());
    debug!("HELLO_REQ sent");

    match connection.source.next_event().await? {
        TransportEvent::Frame(hello_rsp) => state.on_hello_rsp(&hello_rsp)?.into_shared_secret(),
        TransportEvent::Closed { code, reason } => Err(MwaError::SessionClosed { code, reason }),
    }
}

async fn close_quietly(sink: &mut dyn FrameSink) {
    if let Err(e) = sink.close(CLOSE_CODE_NORMAL, "").await {
        debug!(error = %e, "close failed");
    }
}

// ---------------------------------------------------------------------------
// Session driver
// ---------------------------------------------------------------------------

/// Owns the connected half of a session: transport, secret and pending
/// table. Polled together with the caller's callback in one task.
pub(crate) struct SessionDriver {
    sink: Box<dyn FrameSink>,
    source: Box<dyn FrameSource>,
    secret: SharedSecret,
    pending: PendingRequests,
    commands: mpsc::UnboundedReceiver<Command>,
    status: watch::Sender<SessionStatus>,
    /// Set once the transport has closed cleanly; later calls fail with it.
    closed: Option<MwaError>,
    commands_done: bool,
    torn_down: bool,
}

impl SessionDriver {
    pub(crate) fn new(
        connection: Connection,
        secret: SharedSecret,
        commands: mpsc::UnboundedReceiver<Command>,
        status: watch::Sender<SessionStatus>,
    ) -> Self {
        Self {
            sink: connection.sink,
            source: connection.source,
            secret,
            pending: PendingRequests::new(),
            commands,
            status,
            closed: None,
            commands_done: false,
            torn_down: false,
        }
    }

    /// Drive the session until `callback` settles and return its result.
    ///
    /// Fatal session errors end the call early with that error; a clean
    /// close only fails the requests that were outstanding.
    pub(crate) async fn run_until<Fut, T, E>(&mut self, callback: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: From<MwaError>,
    {
        tokio::pin!(callback);
        loop {
            tokio::select! {
                outcome = &mut callback => return outcome,
                event = self.source.next_event(), if self.closed.is_none() => {
                    if let Err(fatal) = self.on_event(event).await {
                        self.fail(&fatal);
                        return Err(fatal.into());
                    }
                }
                command = self.commands.recv(), if !self.commands_done => {
                    match command {
                        Some(command) => {
                            if let Err(fatal) = self.on_command(command).await {
                                self.fail(&fatal);
                                return Err(fatal.into());
                            }
                        }
                        None => self.commands_done = true,
                    }
                }
            }
        }
    }

    async fn on_event(
        &mut self,
        event: Result<TransportEvent, crate::transport::TransportError>,
    ) -> Result<(), MwaError> {
        match event? {
            TransportEvent::Frame(frame) => {
                let response = decode_response(&frame, &mut self.secret)?;
                let id = response.id;
                if self.pending.resolve(response) {
                    debug!(id, "response delivered");
                } else {
                    warn!(id, "response for unknown request id ignored");
                }
                Ok(())
            }
            TransportEvent::Closed { code, reason } => {
                let closed = MwaError::SessionClosed { code, reason };
                if code != CLOSE_CODE_NORMAL {
                    return Err(closed);
                }
                info!("wallet closed the session");
                let rejected = self.pending.reject_all(&closed);
                if rejected > 0 {
                    debug!(rejected, "outstanding requests failed by close");
                }
                self.status.send_replace(SessionStatus::Disconnected);
                self.closed = Some(closed);
                Ok(())
            }
        }
    }

    async fn on_command(&mut self, command: Command) -> Result<(), MwaError> {
        if let Some(closed) = &self.closed {
            let _ = command.reply.send(Err(closed.clone()));
            return Ok(());
        }

        let method = command.method;
        let id = self.pending.register(command.reply);
        let request = JsonRpcRequest::new(id, method, command.params);
        let frame = match encode_request(&request, &mut self.secret) {
            Ok(frame) => frame,
            Err(e) => {
                self.pending.reject(id, e.clone());
                return Err(e);
            }
        };
        self.sink.send(frame).await?;
        debug!(id, %method, "request sent");
        Ok(())
    }

    fn fail(&mut self, error: &MwaError) {
        let rejected = self.pending.reject_all(error);
        warn!(error = %error, rejected, "session failed");
    }

    /// Reject whatever is left and close the transport. Safe to call more
    /// than once.
    pub(crate) async fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        let rejected = self.pending.reject_all(&MwaError::Disconnected);
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            let _ = command.reply.send(Err(MwaError::Disconnected));
        }
        close_quietly(self.sink.as_mut()).await;
        self.status.send_replace(SessionStatus::Disconnected);
        info!(rejected, "session torn down");
    }
}
