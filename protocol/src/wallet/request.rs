//! Typed wallet requests and their completion handles.
//!
//! Every JSON-RPC request the dapp sends becomes one [`WalletRequest`]
//! variant carrying its decoded params and a [`Responder`] typed to the
//! method's result. The application must answer through the responder;
//! dropping it unanswered sends an internal error to the dapp.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

use crate::jsonrpc::message::codes;
use crate::jsonrpc::methods::{
    AuthorizationResult, AuthorizeParams, Base64Bytes, CapabilitiesResult, DeauthorizeParams,
    EmptyResult, ReauthorizeParams, RpcMethod, SignAndSendTransactionsParams, SignMessagesParams,
    SignPayloadsParams, SignaturesResult, SignedPayloadsResult,
};
use crate::jsonrpc::{JsonRpcErrorObject, JsonRpcRequest, JsonRpcResponse};

/// Structured ways a wallet can refuse or fail a request.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum WalletFailure {
    #[error("user declined the request")]
    UserDeclined,

    #[error("too many payloads in one request")]
    TooManyPayloads,

    /// The auth token is unknown, expired or revoked.
    #[error("authorization not valid")]
    AuthorizationNotValid,

    /// One flag per payload, `false` where the payload is malformed.
    #[error("invalid payloads")]
    InvalidPayloads { valid: Vec<bool> },

    /// One flag per payload, `false` where a signature check failed.
    #[error("invalid signatures")]
    InvalidSignatures { valid: Vec<bool> },

    /// Per-transaction signature, `None` where submission failed.
    #[error("transactions not submitted")]
    NotSubmitted { signatures: Vec<Option<Base64Bytes>> },

    #[error("internal wallet error: {0}")]
    Internal(String),
}

impl WalletFailure {
    /// The error object this failure becomes on the wire for `method`.
    ///
    /// A decline is an authorization failure (-1) for the authorization
    /// methods and "not signed" (-3) for everything else.
    pub fn to_error_object(&self, method: RpcMethod) -> JsonRpcErrorObject {
        match self {
            WalletFailure::UserDeclined => match method {
                RpcMethod::Authorize | RpcMethod::Reauthorize | RpcMethod::Deauthorize => {
                    JsonRpcErrorObject::new(codes::ERROR_AUTHORIZATION_FAILED, "authorization declined")
                }
                _ => JsonRpcErrorObject::new(codes::ERROR_NOT_SIGNED, "request declined"),
            },
            WalletFailure::TooManyPayloads => {
                JsonRpcErrorObject::new(codes::ERROR_TOO_MANY_PAYLOADS, self.to_string())
            }
            WalletFailure::AuthorizationNotValid => {
                JsonRpcErrorObject::new(codes::ERROR_AUTHORIZATION_FAILED, self.to_string())
            }
            WalletFailure::InvalidPayloads { valid } | WalletFailure::InvalidSignatures { valid } => {
                JsonRpcErrorObject::new(codes::ERROR_INVALID_PAYLOADS, self.to_string())
                    .with_data(json!({ "valid": valid }))
            }
            WalletFailure::NotSubmitted { signatures } => {
                JsonRpcErrorObject::new(codes::ERROR_NOT_SUBMITTED, self.to_string())
                    .with_data(json!({ "signatures": signatures }))
            }
            WalletFailure::Internal(msg) => JsonRpcErrorObject::internal_error(msg.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Responder
// ---------------------------------------------------------------------------

/// One-shot completion handle for a single request.
#[derive(Debug)]
pub struct Responder<R> {
    id: u64,
    method: RpcMethod,
    replies: Option<mpsc::UnboundedSender<JsonRpcResponse>>,
    _result: PhantomData<fn(R)>,
}

impl<R> Responder<R> {
    pub(crate) fn new(
        id: u64,
        method: RpcMethod,
        replies: mpsc::UnboundedSender<JsonRpcResponse>,
    ) -> Self {
        Self {
            id,
            method,
            replies: Some(replies),
            _result: PhantomData,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn method(&self) -> RpcMethod {
        self.method
    }

    /// Answer with a structured failure.
    pub fn fail(mut self, failure: WalletFailure) {
        let response = JsonRpcResponse::failure(self.id, failure.to_error_object(self.method));
        self.send(response);
    }

    fn send(&mut self, response: JsonRpcResponse) {
        if let Some(replies) = self.replies.take() {
            // Fails only if the session already ended.
            let _ = replies.send(response);
        }
    }
}

impl<R: Serialize> Responder<R> {
    /// Answer the request. Consumes the responder, so each request is
    /// answered exactly once.
    pub fn complete(mut self, outcome: Result<R, WalletFailure>) {
        let response = match outcome {
            Ok(result) => match serde_json::to_value(&result) {
                Ok(value) => JsonRpcResponse::success(self.id, value),
                Err(e) => JsonRpcResponse::failure(
                    self.id,
                    JsonRpcErrorObject::internal_error(format!("unserializable result: {}", e)),
                ),
            },
            Err(failure) => {
                JsonRpcResponse::failure(self.id, failure.to_error_object(self.method))
            }
        };
        self.send(response);
    }
}

impl<R> Drop for Responder<R> {
    fn drop(&mut self) {
        if self.replies.is_some() {
            warn!(id = self.id, method = %self.method, "request dropped without a response");
            let response = JsonRpcResponse::failure(
                self.id,
                JsonRpcErrorObject::internal_error("wallet dropped the request"),
            );
            self.send(response);
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A decoded dapp request awaiting the application's answer.
#[derive(Debug)]
pub enum WalletRequest {
    Authorize {
        params: AuthorizeParams,
        responder: Responder<AuthorizationResult>,
    },
    Reauthorize {
        params: ReauthorizeParams,
        responder: Responder<AuthorizationResult>,
    },
    Deauthorize {
        params: DeauthorizeParams,
        responder: Responder<EmptyResult>,
    },
    GetCapabilities {
        responder: Responder<CapabilitiesResult>,
    },
    SignTransactions {
        params: SignPayloadsParams,
        responder: Responder<SignedPayloadsResult>,
    },
    SignMessages {
        params: SignMessagesParams,
        responder: Responder<SignedPayloadsResult>,
    },
    SignAndSendTransactions {
        params: SignAndSendTransactionsParams,
        responder: Responder<SignaturesResult>,
    },
}

impl WalletRequest {
    /// Decode a raw request. On failure the returned error object is what
    /// the dapp should receive; no responder has been created.
    pub(crate) fn from_rpc(
        request: JsonRpcRequest,
        replies: &mpsc::UnboundedSender<JsonRpcResponse>,
    ) -> Result<Self, JsonRpcErrorObject> {
        let method = RpcMethod::from_wire_name(&request.method)
            .ok_or_else(|| JsonRpcErrorObject::method_not_found(&request.method))?;
        let id = request.id;
        let params = request.params;
        let replies = replies.clone();

        let decoded = match method {
            RpcMethod::Authorize => {
                let params = parse_params(method, params)?;
                WalletRequest::Authorize {
                    params,
                    responder: Responder::new(id, method, replies),
                }
            }
            RpcMethod::Reauthorize => {
                let params = parse_params(method, params)?;
                WalletRequest::Reauthorize {
                    params,
                    responder: Responder::new(id, method, replies),
                }
            }
            RpcMethod::Deauthorize => {
                let params = parse_params(method, params)?;
                WalletRequest::Deauthorize {
                    params,
                    responder: Responder::new(id, method, replies),
                }
            }
            RpcMethod::GetCapabilities => WalletRequest::GetCapabilities {
                responder: Responder::new(id, method, replies),
            },
            RpcMethod::SignTransactions => {
                let params = parse_params(method, params)?;
                WalletRequest::SignTransactions {
                    params,
                    responder: Responder::new(id, method, replies),
                }
            }
            RpcMethod::SignMessages => {
                let params: SignMessagesParams = parse_params(method, params)?;
                if params.addresses.is_empty() {
                    return Err(JsonRpcErrorObject::invalid_params(
                        "sign_messages requires at least one address",
                    ));
                }
                WalletRequest::SignMessages {
                    params,
                    responder: Responder::new(id, method, replies),
                }
            }
            RpcMethod::SignAndSendTransactions => {
                let params = parse_params(method, params)?;
                WalletRequest::SignAndSendTransactions {
                    params,
                    responder: Responder::new(id, method, replies),
                }
            }
        };
        Ok(decoded)
    }

    pub fn method(&self) -> RpcMethod {
        match self {
            WalletRequest::Authorize { .. } => RpcMethod::Authorize,
            WalletRequest::Reauthorize { .. } => RpcMethod::Reauthorize,
            WalletRequest::Deauthorize { .. } => RpcMethod::Deauthorize,
            WalletRequest::GetCapabilities { .. } => RpcMethod::GetCapabilities,
            WalletRequest::SignTransactions { .. } => RpcMethod::SignTransactions,
            WalletRequest::SignMessages { .. } => RpcMethod::SignMessages,
            WalletRequest::SignAndSendTransactions { .. } => RpcMethod::SignAndSendTransactions,
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            WalletRequest::Authorize { responder, .. }
            | WalletRequest::Reauthorize { responder, .. } => responder.id(),
            WalletRequest::Deauthorize { responder, .. } => responder.id(),
            WalletRequest::GetCapabilities { responder } => responder.id(),
            WalletRequest::SignTransactions { responder, .. }
            | WalletRequest::SignMessages { responder, .. } => responder.id(),
            WalletRequest::SignAndSendTransactions { responder, .. } => responder.id(),
        }
    }

    /// Number of payloads carried by a signing request.
    pub fn payload_count(&self) -> Option<usize> {
        match self {
            WalletRequest::SignTransactions { params, .. } => Some(params.payloads.len()),
            WalletRequest::SignMessages { params, .. } => Some(params.payloads.len()),
            WalletRequest::SignAndSendTransactions { params, .. } => Some(params.payloads.len()),
            _ => None,
        }
    }

    /// Answer with `failure`, whatever the request type.
    pub fn reject(self, failure: WalletFailure) {
        match self {
            WalletRequest::Authorize { responder, .. }
            | WalletRequest::Reauthorize { responder, .. } => responder.fail(failure),
            WalletRequest::Deauthorize { responder, .. } => responder.fail(failure),
            WalletRequest::GetCapabilities { responder } => responder.fail(failure),
            WalletRequest::SignTransactions { responder, .. }
            | WalletRequest::SignMessages { responder, .. } => responder.fail(failure),
            WalletRequest::SignAndSendTransactions { responder, .. } => responder.fail(failure),
        }
    }
}

fn parse_params<P: DeserializeOwned>(method: RpcMethod, params: Value) -> Result<P, JsonRpcErrorObject> {
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params
    };
    serde_json::from_value(params).map_err(|e| {
        JsonRpcErrorObject::invalid_params(format!("invalid {} params: {}", method, e))
    })
}
