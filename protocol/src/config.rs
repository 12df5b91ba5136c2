//! # Protocol Configuration & Constants
//!
//! Every wire constant of the local association protocol lives here, along
//! with the runtime knobs for the dapp ([`TransactConfig`]) and wallet
//! ([`WalletConfig`]) sides.
//!
//! Nothing in this crate reads process-wide mutable state. If a component
//! needs a tunable, it takes it from one of these structs.

use std::time::Duration;

use rand::Rng;

use crate::error::MwaError;
use crate::jsonrpc::methods::CapabilitiesResult;

// ---------------------------------------------------------------------------
// Association
// ---------------------------------------------------------------------------

/// Default URL scheme for the out-of-band association signal.
pub const DEFAULT_WALLET_SCHEME: &str = "solana-wallet";

/// Path of the local association endpoint inside the association URL.
pub const ASSOCIATION_PATH: &str = "v1/associate/local";

/// Query parameter carrying the encoded association public key.
pub const ASSOCIATION_QUERY_KEY: &str = "association";

/// Query parameter carrying the local WebSocket port.
pub const PORT_QUERY_KEY: &str = "port";

/// Lowest port a local association may use (IANA dynamic range).
pub const MIN_ASSOCIATION_PORT: u32 = 49152;

/// Highest port a local association may use.
pub const MAX_ASSOCIATION_PORT: u32 = 65535;

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Host the dapp dials. Always loopback.
pub const LOCAL_HOST: &str = "localhost";

/// Path of the wallet's WebSocket endpoint.
pub const WEBSOCKET_PATH: &str = "/solana-wallet";

/// WebSocket subprotocol negotiated by both endpoints.
pub const WEBSOCKET_SUBPROTOCOL: &str = "com.solana.mobilewalletadapter.v1";

/// WebSocket close code for an orderly shutdown.
pub const CLOSE_CODE_NORMAL: u16 = 1000;

/// Close code for a peer that broke the protocol.
pub const CLOSE_CODE_PROTOCOL_ERROR: u16 = 1002;

/// Peer sent a close frame without a status code.
pub const CLOSE_CODE_NO_STATUS: u16 = 1005;

/// Connection dropped without a close frame.
pub const CLOSE_CODE_ABNORMAL: u16 = 1006;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Uncompressed SEC1 P-256 public key: `0x04 || X || Y`.
pub const P256_PUBLIC_KEY_LENGTH: usize = 65;

/// Fixed-size ECDSA P-256 signature: `r || s`.
pub const P256_SIGNATURE_LENGTH: usize = 64;

/// HELLO_REQ length: ECDH public key followed by its signature.
pub const HELLO_REQ_LENGTH: usize = P256_PUBLIC_KEY_LENGTH + P256_SIGNATURE_LENGTH;

/// AES-128-GCM key length in bytes, produced by HKDF.
pub const AES_KEY_LENGTH: usize = 16;

/// AES-GCM nonce length in bytes.
pub const AES_NONCE_LENGTH: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const AES_TAG_LENGTH: usize = 16;

/// Length of the big-endian sequence number prefixing every encrypted frame.
pub const SEQUENCE_NUMBER_LENGTH: usize = 4;

/// Smallest possible encrypted frame (empty plaintext).
pub const MIN_ENCRYPTED_FRAME_LENGTH: usize =
    SEQUENCE_NUMBER_LENGTH + AES_NONCE_LENGTH + AES_TAG_LENGTH;

/// Protocol version advertised in the wallet's session properties.
pub const PROTOCOL_VERSION: &str = "v1";

/// JSON-RPC version string.
pub const JSONRPC_VERSION: &str = "2.0";

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Connection attempts before giving up on a wallet that is not listening.
pub const DEFAULT_MAX_CONNECTION_ATTEMPTS: u32 = 100;

/// Delay schedule between connection attempts, in milliseconds. The last
/// entry repeats once the schedule runs out.
pub const DEFAULT_RETRY_DELAYS_MS: [u64; 8] = [150, 150, 200, 500, 500, 750, 750, 1000];

/// Time allowed between transport open and a valid HELLO_RSP.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Capacity of the channel between wallet session driver and application.
pub const DEFAULT_REQUEST_QUEUE_DEPTH: usize = 32;

// ---------------------------------------------------------------------------
// Runtime configuration
// ---------------------------------------------------------------------------

/// Dapp-side knobs for a single `transact` call.
#[derive(Clone, Debug)]
pub struct TransactConfig {
    /// Local port advertised in the association URL and dialed afterward.
    /// Must lie in `MIN_ASSOCIATION_PORT..=MAX_ASSOCIATION_PORT`. The
    /// default picks one at random from that range.
    pub port: u32,
    /// Custom-scheme prefix, e.g. `solana-wallet`.
    pub scheme: String,
    /// Optional `https://` base URL of a specific wallet. Replaces the
    /// scheme prefix when set.
    pub wallet_uri_base: Option<String>,
    pub max_connection_attempts: u32,
    pub retry_delays: Vec<Duration>,
    pub handshake_timeout: Duration,
}

impl Default for TransactConfig {
    fn default() -> Self {
        Self {
            port: random_association_port(),
            scheme: DEFAULT_WALLET_SCHEME.to_string(),
            wallet_uri_base: None,
            max_connection_attempts: DEFAULT_MAX_CONNECTION_ATTEMPTS,
            retry_delays: DEFAULT_RETRY_DELAYS_MS
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl TransactConfig {
    /// Default config pointed at a specific port.
    pub fn with_port(port: u32) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// Checks every field that would otherwise fail halfway through a
    /// session. Called before any key generation or I/O.
    pub fn validate(&self) -> Result<(), MwaError> {
        validate_association_port(self.port)?;
        if self.scheme.is_empty() || !self.scheme.chars().all(is_scheme_char) {
            return Err(MwaError::Config(format!(
                "invalid association scheme: {:?}",
                self.scheme
            )));
        }
        if let Some(base) = &self.wallet_uri_base {
            if !base.starts_with("https://") {
                return Err(MwaError::Config(format!(
                    "wallet base URI must use https: {}",
                    base
                )));
            }
        }
        if self.max_connection_attempts == 0 {
            return Err(MwaError::Config(
                "max_connection_attempts must be at least 1".to_string(),
            ));
        }
        if self.handshake_timeout.is_zero() {
            return Err(MwaError::Config(
                "handshake_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        if self.retry_delays.is_empty() {
            return Duration::ZERO;
        }
        let index = (attempt.saturating_sub(1) as usize).min(self.retry_delays.len() - 1);
        self.retry_delays[index]
    }
}

/// Wallet-side knobs for accepting one local association.
#[derive(Clone, Debug)]
pub struct WalletConfig {
    /// Time allowed between accepting the transport and receiving HELLO_REQ.
    pub handshake_timeout: Duration,
    /// Requests buffered between the session driver and the application.
    pub request_queue_depth: usize,
    /// Signing requests above these limits are answered with
    /// "too many payloads" before they reach the application.
    pub max_transactions_per_request: Option<u32>,
    pub max_messages_per_request: Option<u32>,
}

impl WalletConfig {
    /// Capabilities matching this configuration, for answering
    /// `get_capabilities`.
    pub fn capabilities(&self) -> CapabilitiesResult {
        CapabilitiesResult {
            max_transactions_per_request: self.max_transactions_per_request,
            max_messages_per_request: self.max_messages_per_request,
            supported_transaction_versions: vec![serde_json::json!("legacy"), serde_json::json!(0)],
            supports_clone_authorization: false,
            supports_sign_and_send_transactions: true,
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            request_queue_depth: DEFAULT_REQUEST_QUEUE_DEPTH,
            max_transactions_per_request: None,
            max_messages_per_request: None,
        }
    }
}

/// Rejects ports outside the dynamic range. Takes `u32` so that values
/// just past `u16::MAX` are reported rather than truncated.
pub fn validate_association_port(port: u32) -> Result<u16, MwaError> {
    if (MIN_ASSOCIATION_PORT..=MAX_ASSOCIATION_PORT).contains(&port) {
        Ok(port as u16)
    } else {
        Err(MwaError::InvalidAssociationPort(port))
    }
}

/// A port drawn uniformly from the dynamic range.
pub fn random_association_port() -> u32 {
    rand::thread_rng().gen_range(MIN_ASSOCIATION_PORT..=MAX_ASSOCIATION_PORT)
}

fn is_scheme_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_boundaries() {
        assert!(validate_association_port(49151).is_err());
        assert!(validate_association_port(65536).is_err());
        assert_eq!(validate_association_port(49152).unwrap(), 49152);
        assert_eq!(validate_association_port(65535).unwrap(), 65535);
    }

    #[test]
    fn out_of_range_port_is_typed() {
        let err = validate_association_port(8080).unwrap_err();
        assert!(matches!(err, MwaError::InvalidAssociationPort(8080)));
    }

    #[test]
    fn hello_req_length_is_key_plus_signature() {
        assert_eq!(HELLO_REQ_LENGTH, 129);
        assert_eq!(MIN_ENCRYPTED_FRAME_LENGTH, 32);
    }

    #[test]
    fn retry_delay_repeats_last_entry() {
        let config = TransactConfig::default();
        assert_eq!(config.retry_delay(1), Duration::from_millis(150));
        assert_eq!(config.retry_delay(4), Duration::from_millis(500));
        assert_eq!(config.retry_delay(8), Duration::from_millis(1000));
        assert_eq!(config.retry_delay(99), Duration::from_millis(1000));
    }

    #[test]
    fn empty_schedule_means_no_delay() {
        let config = TransactConfig {
            retry_delays: Vec::new(),
            ..TransactConfig::default()
        };
        assert_eq!(config.retry_delay(3), Duration::ZERO);
    }

    #[test]
    fn validate_rejects_bad_fields() {
        assert!(TransactConfig::with_port(50000).validate().is_ok());

        let bad_scheme = TransactConfig {
            scheme: "solana wallet".to_string(),
            ..TransactConfig::default()
        };
        assert!(matches!(bad_scheme.validate(), Err(MwaError::Config(_))));

        let http_base = TransactConfig {
            wallet_uri_base: Some("http://wallet.example".to_string()),
            ..TransactConfig::default()
        };
        assert!(matches!(http_base.validate(), Err(MwaError::Config(_))));

        let no_attempts = TransactConfig {
            max_connection_attempts: 0,
            ..TransactConfig::default()
        };
        assert!(no_attempts.validate().is_err());
    }

    #[test]
    fn default_port_is_random_within_range() {
        let ports: Vec<u32> = (0..32).map(|_| TransactConfig::default().port).collect();
        for port in &ports {
            assert!(validate_association_port(*port).is_ok(), "port {} out of range", port);
        }
        assert!(ports.iter().any(|p| *p != ports[0]));
    }

    #[test]
    fn capabilities_follow_wallet_limits() {
        let config = WalletConfig {
            max_messages_per_request: Some(4),
            ..WalletConfig::default()
        };
        let caps = config.capabilities();
        assert_eq!(caps.max_messages_per_request, Some(4));
        assert_eq!(caps.max_transactions_per_request, None);
        assert_eq!(
            caps.supported_transaction_versions,
            vec![serde_json::json!("legacy"), serde_json::json!(0)]
        );
    }
}
