//! # MobileWallet Handle
//!
//! The object handed to the `transact` callback. Each method turns into one
//! JSON-RPC request; the session driver assigns the id, encrypts the frame
//! and routes the matching response back.
//!
//! The handle is a pair of channel endpoints, so it is cheap to clone and
//! any number of calls may be in flight at once:
//!
//! ```ignore
//! let (caps, auth) = tokio::join!(
//!     wallet.get_capabilities(),
//!     wallet.authorize(params),
//! );
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::MwaError;
use crate::jsonrpc::methods::{
    AuthorizationResult, AuthorizeParams, CapabilitiesResult, DeauthorizeParams, EmptyResult,
    ReauthorizeParams, RpcMethod, SignAndSendTransactionsParams, SignMessagesParams,
    SignPayloadsParams, SignaturesResult, SignedPayloadsResult,
};

use super::pending::RpcOutcome;
use super::state::SessionStatus;

/// A request travelling from a [`MobileWallet`] handle to the driver.
#[derive(Debug)]
pub(crate) struct Command {
    pub method: RpcMethod,
    pub params: serde_json::Value,
    pub reply: oneshot::Sender<RpcOutcome>,
}

/// Connected wallet, as seen from inside a `transact` callback.
#[derive(Clone, Debug)]
pub struct MobileWallet {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SessionStatus>,
}

impl MobileWallet {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<Command>,
        status: watch::Receiver<SessionStatus>,
    ) -> Self {
        Self { commands, status }
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == SessionStatus::Connected
    }

    /// Send a raw request and wait for its result.
    ///
    /// Fails with [`MwaError::JsonRpc`] if the wallet answered with an error
    /// object, or with a session-level error if the session ended first.
    pub async fn call(
        &self,
        method: RpcMethod,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, MwaError> {
        let (reply, outcome) = oneshot::channel();
        self.commands
            .send(Command {
                method,
                params,
                reply,
            })
            .map_err(|_| MwaError::Disconnected)?;
        outcome.await.map_err(|_| MwaError::Disconnected)?
    }

    async fn invoke<P, R>(&self, method: RpcMethod, params: &P) -> Result<R, MwaError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params).map_err(|e| {
            MwaError::ProtocolViolation(format!("failed to encode {} params: {}", method, e))
        })?;
        let result = self.call(method, params).await?;
        serde_json::from_value(result).map_err(|e| {
            MwaError::ProtocolViolation(format!("malformed {} result: {}", method, e))
        })
    }

    pub async fn authorize(&self, params: AuthorizeParams) -> Result<AuthorizationResult, MwaError> {
        self.invoke(RpcMethod::Authorize, &params).await
    }

    pub async fn reauthorize(
        &self,
        params: ReauthorizeParams,
    ) -> Result<AuthorizationResult, MwaError> {
        self.invoke(RpcMethod::Reauthorize, &params).await
    }

    pub async fn deauthorize(&self, params: DeauthorizeParams) -> Result<EmptyResult, MwaError> {
        self.invoke(RpcMethod::Deauthorize, &params).await
    }

    pub async fn get_capabilities(&self) -> Result<CapabilitiesResult, MwaError> {
        self.invoke(RpcMethod::GetCapabilities, &EmptyResult {}).await
    }

    pub async fn sign_transactions(
        &self,
        params: SignPayloadsParams,
    ) -> Result<SignedPayloadsResult, MwaError> {
        self.invoke(RpcMethod::SignTransactions, &params).await
    }

    pub async fn sign_messages(
        &self,
        params: SignMessagesParams,
    ) -> Result<SignedPayloadsResult, MwaError> {
        self.invoke(RpcMethod::SignMessages, &params).await
    }

    pub async fn sign_and_send_transactions(
        &self,
        params: SignAndSendTransactionsParams,
    ) -> Result<SignaturesResult, MwaError> {
        self.invoke(RpcMethod::SignAndSendTransactions, &params).await
    }
}
