//! JSON-RPC 2.0 envelopes and error objects.
//!
//! Ids are plain `u64`s: the dapp numbers its requests from 1 within one
//! session, and the wallet echoes the id back.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::JSONRPC_VERSION;

use super::methods::RpcMethod;

/// Error codes defined by the wallet protocol and JSON-RPC 2.0.
pub mod codes {
    pub const ERROR_AUTHORIZATION_FAILED: i32 = -1;
    pub const ERROR_INVALID_PAYLOADS: i32 = -2;
    pub const ERROR_NOT_SIGNED: i32 = -3;
    pub const ERROR_NOT_SUBMITTED: i32 = -4;
    pub const ERROR_TOO_MANY_PAYLOADS: i32 = -5;
    pub const ERROR_ATTEST_ORIGIN_ANDROID: i32 = -100;

    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// An outbound JSON-RPC request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always "2.0".
    pub jsonrpc: String,
    pub id: u64,
    /// Wire method name, see [`RpcMethod::wire_name`].
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: RpcMethod, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.wire_name().to_string(),
            params,
        }
    }
}

/// A JSON-RPC response: exactly one of `result` / `error` is meaningful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorObject>,
}

impl JsonRpcResponse {
    pub fn success(id: u64, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: u64, error: JsonRpcErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Split into the value a caller awaits or the typed error for this id.
    ///
    /// A `null` result deserializes as `None`; with no error present that is
    /// still a success.
    pub fn into_result(self) -> Result<serde_json::Value, JsonRpcError> {
        match self.error {
            Some(error) => Err(JsonRpcError {
                id: self.id,
                code: error.code,
                message: error.message,
                data: error.data,
            }),
            None => Ok(self.result.unwrap_or(serde_json::Value::Null)),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The `error` member of a response, as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcErrorObject {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(codes::INVALID_REQUEST, msg)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            codes::METHOD_NOT_FOUND,
            format!("method not found: {}", method),
        )
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, msg)
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, msg)
    }
}

/// A wallet's error answer to one specific request.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("request {id} failed with code {code}: {message}")]
pub struct JsonRpcError {
    /// Id of the request this error answers.
    pub id: u64,
    pub code: i32,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

/// Coarse classification of [`JsonRpcError::code`] for callers that branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcErrorKind {
    AuthorizationFailed,
    InvalidPayloads,
    NotSigned,
    NotSubmitted,
    TooManyPayloads,
    AttestOriginAndroid,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    Internal,
    Other(i32),
}

impl JsonRpcError {
    pub fn kind(&self) -> RpcErrorKind {
        match self.code {
            codes::ERROR_AUTHORIZATION_FAILED => RpcErrorKind::AuthorizationFailed,
            codes::ERROR_INVALID_PAYLOADS => RpcErrorKind::InvalidPayloads,
            codes::ERROR_NOT_SIGNED => RpcErrorKind::NotSigned,
            codes::ERROR_NOT_SUBMITTED => RpcErrorKind::NotSubmitted,
            codes::ERROR_TOO_MANY_PAYLOADS => RpcErrorKind::TooManyPayloads,
            codes::ERROR_ATTEST_ORIGIN_ANDROID => RpcErrorKind::AttestOriginAndroid,
            codes::INVALID_REQUEST | codes::PARSE_ERROR => RpcErrorKind::InvalidRequest,
            codes::METHOD_NOT_FOUND => RpcErrorKind::MethodNotFound,
            codes::INVALID_PARAMS => RpcErrorKind::InvalidParams,
            codes::INTERNAL_ERROR => RpcErrorKind::Internal,
            other => RpcErrorKind::Other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_wire_method_name() {
        let req = JsonRpcRequest::new(7, RpcMethod::SignAndSendTransactions, serde_json::json!({}));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 7);
        assert_eq!(json["method"], "sign_and_send_transactions");
    }

    #[test]
    fn success_response_omits_error() {
        let resp = JsonRpcResponse::success(1, serde_json::json!({ "ok": true }));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("error"));
        assert_eq!(resp.into_result().unwrap()["ok"], true);
    }

    #[test]
    fn null_result_is_success() {
        let resp: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":4,"result":null}"#).unwrap();
        assert_eq!(resp.into_result().unwrap(), serde_json::Value::Null);
    }

    #[test]
    fn error_response_carries_request_id() {
        let resp: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":2,"error":{"code":-3,"message":"user declined"}}"#,
        )
        .unwrap();
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.id, 2);
        assert_eq!(err.kind(), RpcErrorKind::NotSigned);
        assert_eq!(err.message, "user declined");
    }

    #[test]
    fn error_kinds_cover_known_codes() {
        let kind = |code| {
            JsonRpcError {
                id: 0,
                code,
                message: String::new(),
                data: None,
            }
            .kind()
        };
        assert_eq!(kind(-1), RpcErrorKind::AuthorizationFailed);
        assert_eq!(kind(-2), RpcErrorKind::InvalidPayloads);
        assert_eq!(kind(-4), RpcErrorKind::NotSubmitted);
        assert_eq!(kind(-5), RpcErrorKind::TooManyPayloads);
        assert_eq!(kind(-100), RpcErrorKind::AttestOriginAndroid);
        assert_eq!(kind(-32601), RpcErrorKind::MethodNotFound);
        assert_eq!(kind(-32602), RpcErrorKind::InvalidParams);
        assert_eq!(kind(-32603), RpcErrorKind::Internal);
        assert_eq!(kind(42), RpcErrorKind::Other(42));
    }

    #[test]
    fn error_object_constructors_use_standard_codes() {
        assert_eq!(JsonRpcErrorObject::invalid_request("").code, -32600);
        assert_eq!(JsonRpcErrorObject::method_not_found("x").code, -32601);
        assert_eq!(JsonRpcErrorObject::invalid_params("").code, -32602);
        assert_eq!(JsonRpcErrorObject::internal_error("").code, -32603);
    }
}
