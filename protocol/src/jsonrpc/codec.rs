//! Encrypting JSON codec.
//!
//! Serializes a message to JSON, seals it with the session's
//! [`SharedSecret`] and back. Any failure to open or parse an inbound frame
//! is a [`MwaError::ProtocolViolation`]: once a frame fails, the channel is
//! no longer trustworthy and the caller must tear the session down.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::crypto::encryption::SharedSecret;
use crate::error::MwaError;

use super::message::{JsonRpcRequest, JsonRpcResponse};

/// Serialize and seal any JSON value.
pub fn encode_json<T: Serialize>(value: &T, secret: &mut SharedSecret) -> Result<Vec<u8>, MwaError> {
    let plaintext = serde_json::to_vec(value)
        .map_err(|e| MwaError::ProtocolViolation(format!("failed to serialize message: {}", e)))?;
    Ok(secret.encrypt(&plaintext)?)
}

/// Open and parse any JSON value.
pub fn decode_json<T: DeserializeOwned>(
    frame: &[u8],
    secret: &mut SharedSecret,
) -> Result<T, MwaError> {
    let plaintext = secret
        .decrypt(frame)
        .map_err(|e| MwaError::ProtocolViolation(e.to_string()))?;
    serde_json::from_slice(&plaintext)
        .map_err(|e| MwaError::ProtocolViolation(format!("malformed message: {}", e)))
}

pub fn encode_request(
    request: &JsonRpcRequest,
    secret: &mut SharedSecret,
) -> Result<Vec<u8>, MwaError> {
    encode_json(request, secret)
}

pub fn decode_request(frame: &[u8], secret: &mut SharedSecret) -> Result<JsonRpcRequest, MwaError> {
    decode_json(frame, secret)
}

pub fn encode_response(
    response: &JsonRpcResponse,
    secret: &mut SharedSecret,
) -> Result<Vec<u8>, MwaError> {
    encode_json(response, secret)
}

pub fn decode_response(
    frame: &[u8],
    secret: &mut SharedSecret,
) -> Result<JsonRpcResponse, MwaError> {
    decode_json(frame, secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonrpc::message::JsonRpcErrorObject;
    use crate::jsonrpc::methods::RpcMethod;

    fn pair() -> (SharedSecret, SharedSecret) {
        let key = [0x42u8; 16];
        (
            SharedSecret::from_key(&key).unwrap(),
            SharedSecret::from_key(&key).unwrap(),
        )
    }

    #[test]
    fn request_roundtrip() {
        let (mut dapp, mut wallet) = pair();
        let request = JsonRpcRequest::new(
            1,
            RpcMethod::GetCapabilities,
            serde_json::json!({}),
        );
        let frame = encode_request(&request, &mut dapp).unwrap();
        assert_eq!(decode_request(&frame, &mut wallet).unwrap(), request);
    }

    #[test]
    fn response_roundtrip_and_error_routing() {
        let (mut dapp, mut wallet) = pair();
        let ok = JsonRpcResponse::success(1, serde_json::json!({ "signatures": [] }));
        let declined = JsonRpcResponse::failure(2, JsonRpcErrorObject::new(-3, "declined"));

        let f1 = encode_response(&ok, &mut wallet).unwrap();
        let f2 = encode_response(&declined, &mut wallet).unwrap();

        assert_eq!(decode_response(&f1, &mut dapp).unwrap(), ok);
        let err = decode_response(&f2, &mut dapp)
            .unwrap()
            .into_result()
            .unwrap_err();
        assert_eq!((err.id, err.code), (2, -3));
    }

    #[test]
    fn different_secret_fails_as_protocol_violation() {
        let (mut dapp, _) = pair();
        let mut stranger = SharedSecret::from_key(&[0x24u8; 16]).unwrap();
        let frame = encode_request(
            &JsonRpcRequest::new(1, RpcMethod::Authorize, serde_json::json!({})),
            &mut dapp,
        )
        .unwrap();
        assert!(matches!(
            decode_request(&frame, &mut stranger),
            Err(MwaError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn non_json_plaintext_is_protocol_violation() {
        let (mut dapp, mut wallet) = pair();
        let frame = dapp.encrypt(b"definitely not json").unwrap();
        assert!(matches!(
            decode_response(&frame, &mut wallet),
            Err(MwaError::ProtocolViolation(_))
        ));
    }
}
