//! # Encrypted JSON-RPC
//!
//! After the handshake every frame in either direction is a JSON-RPC 2.0
//! message sealed with the session key:
//!
//! - [`message`]: request/response envelopes and error codes.
//! - [`methods`]: the typed wallet method surface and its wire names.
//! - [`codec`]: JSON serialization combined with sequenced AES-GCM.

pub mod codec;
pub mod message;
pub mod methods;

pub use codec::{decode_request, decode_response, encode_request, encode_response};
pub use message::{
    codes, JsonRpcError, JsonRpcErrorObject, JsonRpcRequest, JsonRpcResponse, RpcErrorKind,
};
pub use methods::RpcMethod;
