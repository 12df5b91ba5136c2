//! # Out-of-Band Association URL
//!
//! The dapp tells the wallet where to connect and which key to expect with
//! a single URL, delivered as an Android intent or rendered as a QR code:
//!
//! ```text
//! solana-wallet:/v1/associate/local?association=<key>&port=<port>
//! https://wallet.example/v1/associate/local?association=<key>&port=<port>
//! ```
//!
//! `<key>` is the 65-byte association public key in standard base64 with
//! `/`, `+`, `=` mapped to `_`, `-`, `.`; the result needs no percent
//! encoding. `<port>` must be in the dynamic range 49152..=65535.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::config::{
    validate_association_port, TransactConfig, ASSOCIATION_PATH, ASSOCIATION_QUERY_KEY,
    PORT_QUERY_KEY,
};
use crate::crypto::keys::AssociationPublicKey;
use crate::error::MwaError;

/// A parsed or freshly built local association URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssociationUrl {
    /// Everything before `v1/associate/local`, e.g. `solana-wallet:/`.
    prefix: String,
    association_public_key: AssociationPublicKey,
    port: u16,
}

impl AssociationUrl {
    /// Build the URL for a new association. Validates the port first.
    pub fn new(
        config: &TransactConfig,
        association_public_key: &AssociationPublicKey,
    ) -> Result<Self, MwaError> {
        let port = validate_association_port(config.port)?;
        let prefix = match &config.wallet_uri_base {
            Some(base) => format!("{}/", base.trim_end_matches('/')),
            None => format!("{}:/", config.scheme),
        };
        Ok(Self {
            prefix,
            association_public_key: association_public_key.clone(),
            port,
        })
    }

    /// Parse an association URL as received by a wallet.
    pub fn parse(url: &str) -> Result<Self, MwaError> {
        let invalid = |reason: &str| MwaError::InvalidAssociationUrl(reason.to_string());

        let (location, query) = url.split_once('?').ok_or_else(|| invalid("missing query"))?;
        let prefix = location
            .strip_suffix(ASSOCIATION_PATH)
            .ok_or_else(|| invalid("not a local association path"))?;
        if !(prefix.ends_with(":/") || (prefix.starts_with("https://") && prefix.ends_with('/')))
        {
            return Err(invalid("unsupported URL prefix"));
        }

        let mut association = None;
        let mut port = None;
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let slot = match key {
                ASSOCIATION_QUERY_KEY => &mut association,
                PORT_QUERY_KEY => &mut port,
                _ => continue,
            };
            if slot.replace(value).is_some() {
                return Err(invalid("duplicate query parameter"));
            }
        }

        let association = association.ok_or_else(|| invalid("missing association key"))?;
        let port = port.ok_or_else(|| invalid("missing port"))?;

        let key_bytes = decode_association_key(association)?;
        let association_public_key = AssociationPublicKey::from_bytes(&key_bytes)?;
        let port: u32 = port.parse().map_err(|_| invalid("port is not a number"))?;
        let port = validate_association_port(port)?;

        Ok(Self {
            prefix: prefix.to_string(),
            association_public_key,
            port,
        })
    }

    pub fn association_public_key(&self) -> &AssociationPublicKey {
        &self.association_public_key
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for AssociationUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}?{}={}&{}={}",
            self.prefix,
            ASSOCIATION_PATH,
            ASSOCIATION_QUERY_KEY,
            encode_association_key(&self.association_public_key),
            PORT_QUERY_KEY,
            self.port
        )
    }
}

/// Base64 with `/+=` mapped to `_-.`.
pub fn encode_association_key(key: &AssociationPublicKey) -> String {
    STANDARD
        .encode(key.as_bytes())
        .chars()
        .map(|c| match c {
            '/' => '_',
            '+' => '-',
            '=' => '.',
            other => other,
        })
        .collect()
}

fn decode_association_key(encoded: &str) -> Result<Vec<u8>, MwaError> {
    let standard: String = encoded
        .chars()
        .map(|c| match c {
            '_' => '/',
            '-' => '+',
            '.' => '=',
            other => other,
        })
        .collect();
    STANDARD
        .decode(standard)
        .map_err(|_| MwaError::InvalidAssociationUrl("association key is not base64".to_string()))
}
