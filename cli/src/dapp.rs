//! # Reference Dapp
//!
//! Prints the association URL on stdout, waits for a wallet to start
//! listening, and runs a short session: capabilities, authorize, sign one
//! message. The results are printed as a JSON report.

use std::time::Duration;

use anyhow::{Context, Result};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::Serialize;
use tracing::info;

use mwa_protocol::jsonrpc::methods::{
    AppIdentity, AuthorizationResult, AuthorizeParams, Base64Bytes, CapabilitiesResult,
    SignMessagesParams,
};
use mwa_protocol::{transact, AssociationUrl, MwaError, TransactConfig};

use crate::cli::DappArgs;

#[derive(Debug, Serialize)]
struct DappReport {
    capabilities: CapabilitiesResult,
    authorization: AuthorizationResult,
    signed_message: Base64Bytes,
    signature_valid: bool,
}

pub async fn run(args: DappArgs) -> Result<()> {
    let mut config = TransactConfig {
        scheme: args.scheme,
        wallet_uri_base: args.wallet_uri_base,
        handshake_timeout: Duration::from_millis(args.handshake_timeout_ms),
        ..TransactConfig::default()
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    config.validate().context("invalid dapp configuration")?;

    let launcher = |url: &AssociationUrl| -> Result<(), MwaError> {
        println!("{}", url);
        info!("association URL printed; start a wallet with it");
        Ok(())
    };

    let identity = AppIdentity {
        name: Some(args.app_name),
        ..AppIdentity::default()
    };
    let cluster = args.cluster;
    let message = args.message.into_bytes();

    let report = transact(&launcher, &config, |wallet| async move {
        let capabilities = wallet.get_capabilities().await?;
        info!(?capabilities, "wallet capabilities");

        let authorization = wallet
            .authorize(AuthorizeParams {
                identity,
                cluster: Some(cluster),
                auth_token: None,
            })
            .await?;
        let account = authorization.accounts.first().cloned().ok_or_else(|| {
            MwaError::ProtocolViolation("wallet authorized no accounts".to_string())
        })?;
        info!(accounts = authorization.accounts.len(), "authorized");

        let signed = wallet
            .sign_messages(SignMessagesParams {
                addresses: vec![account.address.clone()],
                payloads: vec![Base64Bytes(message.clone())],
            })
            .await?;
        let signed_message = signed.signed_payloads.into_iter().next().ok_or_else(|| {
            MwaError::ProtocolViolation("wallet returned no signed payload".to_string())
        })?;

        let signature_valid =
            verify_signed_message(account.address.as_slice(), &message, signed_message.as_slice());
        Ok::<_, MwaError>(DappReport {
            capabilities,
            authorization,
            signed_message,
            signature_valid,
        })
    })
    .await
    .context("wallet session failed")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to encode report")?
    );
    Ok(())
}

/// Checks a `message || signature` payload against an Ed25519 address.
pub fn verify_signed_message(address: &[u8], message: &[u8], signed: &[u8]) -> bool {
    let Ok(address) = <[u8; 32]>::try_from(address) else {
        return false;
    };
    let Some(signature) = signed.strip_prefix(message) else {
        return false;
    };
    let Ok(signature) = <[u8; 64]>::try_from(signature) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&address) else {
        return false;
    };
    key.verify(message, &Signature::from_bytes(&signature)).is_ok()
}
