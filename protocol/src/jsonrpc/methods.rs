//! # Wallet RPC Method Surface
//!
//! One enum variant per method and one struct per request/response shape.
//! Wire names come from a fixed table ([`RpcMethod::wire_name`]); nothing is
//! derived from Rust identifiers at runtime.
//!
//! | Variant | Wire name | Params | Result |
//! |---|---|---|---|
//! | `Authorize` | `authorize` | [`AuthorizeParams`] | [`AuthorizationResult`] |
//! | `Reauthorize` | `reauthorize` | [`ReauthorizeParams`] | [`AuthorizationResult`] |
//! | `Deauthorize` | `deauthorize` | [`DeauthorizeParams`] | [`EmptyResult`] |
//! | `GetCapabilities` | `get_capabilities` | none | [`CapabilitiesResult`] |
//! | `SignTransactions` | `sign_transactions` | [`SignPayloadsParams`] | [`SignedPayloadsResult`] |
//! | `SignMessages` | `sign_messages` | [`SignMessagesParams`] | [`SignedPayloadsResult`] |
//! | `SignAndSendTransactions` | `sign_and_send_transactions` | [`SignAndSendTransactionsParams`] | [`SignaturesResult`] |
//!
//! Binary fields travel as standard base64 strings ([`Base64Bytes`]). The
//! protocol layer never looks inside them.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Methods a dapp may invoke on a wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    Authorize,
    Reauthorize,
    Deauthorize,
    GetCapabilities,
    SignTransactions,
    SignMessages,
    SignAndSendTransactions,
}

impl RpcMethod {
    /// Every supported method, in table order.
    pub const ALL: [RpcMethod; 7] = [
        RpcMethod::Authorize,
        RpcMethod::Reauthorize,
        RpcMethod::Deauthorize,
        RpcMethod::GetCapabilities,
        RpcMethod::SignTransactions,
        RpcMethod::SignMessages,
        RpcMethod::SignAndSendTransactions,
    ];

    pub fn wire_name(self) -> &'static str {
        match self {
            RpcMethod::Authorize => "authorize",
            RpcMethod::Reauthorize => "reauthorize",
            RpcMethod::Deauthorize => "deauthorize",
            RpcMethod::GetCapabilities => "get_capabilities",
            RpcMethod::SignTransactions => "sign_transactions",
            RpcMethod::SignMessages => "sign_messages",
            RpcMethod::SignAndSendTransactions => "sign_and_send_transactions",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.wire_name() == name)
    }
}

impl fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

// ---------------------------------------------------------------------------
// Base64 payloads
// ---------------------------------------------------------------------------

/// Opaque bytes carried as a base64 string on the wire.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Base64Bytes(pub Vec<u8>);

impl Base64Bytes {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Base64Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Base64Bytes {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Debug for Base64Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Base64Bytes({} bytes)", self.0.len())
    }
}

impl Serialize for Base64Bytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Base64Bytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Base64Bytes)
            .map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

/// How the dapp presents itself to the wallet's user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppIdentity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Relative to `uri`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizeParams {
    #[serde(default)]
    pub identity: AppIdentity,
    /// e.g. `mainnet-beta`, `testnet`, `devnet`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    /// Previously issued token; asks the wallet to reuse the authorization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReauthorizeParams {
    #[serde(default)]
    pub identity: AppIdentity,
    pub auth_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeauthorizeParams {
    pub auth_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizedAccount {
    pub address: Base64Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationResult {
    pub auth_token: String,
    pub accounts: Vec<AuthorizedAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_uri_base: Option<String>,
}

/// `{}` on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmptyResult {}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilitiesResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_transactions_per_request: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_messages_per_request: Option<u32>,
    /// Mixed list such as `["legacy", 0]`.
    #[serde(default)]
    pub supported_transaction_versions: Vec<serde_json::Value>,
    #[serde(default)]
    pub supports_clone_authorization: bool,
    #[serde(default)]
    pub supports_sign_and_send_transactions: bool,
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignPayloadsParams {
    pub payloads: Vec<Base64Bytes>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignMessagesParams {
    pub addresses: Vec<Base64Bytes>,
    pub payloads: Vec<Base64Bytes>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignAndSendOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_context_slot: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignAndSendTransactionsParams {
    pub payloads: Vec<Base64Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<SignAndSendOptions>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedPayloadsResult {
    pub signed_payloads: Vec<Base64Bytes>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignaturesResult {
    pub signatures: Vec<Base64Bytes>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_are_unique_and_reversible() {
        let mut seen = std::collections::HashSet::new();
        for method in RpcMethod::ALL {
            assert!(seen.insert(method.wire_name()));
            assert_eq!(RpcMethod::from_wire_name(method.wire_name()), Some(method));
        }
        assert_eq!(RpcMethod::from_wire_name("signTransactions"), None);
    }

    #[test]
    fn base64_bytes_serialize_as_string() {
        let params = SignPayloadsParams {
            payloads: vec![Base64Bytes(vec![0xde, 0xad, 0xbe, 0xef])],
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["payloads"][0], "3q2+7w==");
    }

    #[test]
    fn invalid_base64_rejected() {
        let parsed: Result<SignPayloadsParams, _> =
            serde_json::from_str(r#"{"payloads":["not base64!"]}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn authorize_params_skip_absent_fields() {
        let params = AuthorizeParams {
            identity: AppIdentity {
                name: Some("Example dapp".to_string()),
                ..AppIdentity::default()
            },
            cluster: Some("devnet".to_string()),
            auth_token: None,
        };
        let json = serde_json::to_string(&params).unwrap();
        assert!(!json.contains("auth_token"));
        assert!(!json.contains("uri"));
        assert!(json.contains("devnet"));
    }

    #[test]
    fn capabilities_tolerate_missing_fields() {
        let caps: CapabilitiesResult =
            serde_json::from_str(r#"{"supports_clone_authorization":true}"#).unwrap();
        assert!(caps.supports_clone_authorization);
        assert!(!caps.supports_sign_and_send_transactions);
        assert!(caps.max_transactions_per_request.is_none());
    }

    #[test]
    fn empty_result_is_empty_object() {
        assert_eq!(serde_json::to_string(&EmptyResult {}).unwrap(), "{}");
    }
}
