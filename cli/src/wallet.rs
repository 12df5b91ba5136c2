//! # Reference Wallet
//!
//! Listens on the port named in the association URL, completes the
//! handshake and answers requests with a throwaway Ed25519 account.
//!
//! Signed payloads use a simple demo layout: the original bytes followed by
//! the 64-byte Ed25519 signature. Nothing is ever submitted to a cluster.

use std::time::Duration;

use anyhow::{Context, Result};
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{info, warn};

use mwa_protocol::jsonrpc::methods::{
    AuthorizationResult, AuthorizedAccount, Base64Bytes, EmptyResult, SignaturesResult,
    SignedPayloadsResult,
};
use mwa_protocol::transport::WebSocketAcceptor;
use mwa_protocol::{AssociationUrl, LocalWalletSession, WalletConfig, WalletFailure, WalletRequest};

use crate::cli::WalletArgs;

/// Serve exactly one dapp session.
pub async fn run(args: WalletArgs) -> Result<()> {
    let url = AssociationUrl::parse(&args.association_url).context("invalid association URL")?;
    let config = WalletConfig {
        handshake_timeout: Duration::from_millis(args.handshake_timeout_ms),
        max_transactions_per_request: args.max_transactions,
        max_messages_per_request: args.max_messages,
        ..WalletConfig::default()
    };

    let mut acceptor = WebSocketAcceptor::bind(url.port())
        .await
        .with_context(|| format!("failed to listen on port {}", url.port()))?;
    info!(
        port = url.port(),
        association = %url.association_public_key().fingerprint(),
        "waiting for dapp"
    );

    let mut session =
        LocalWalletSession::accept(&mut acceptor, url.association_public_key(), config.clone())
            .await
            .context("handshake with dapp failed")?;

    let mut wallet = DemoWallet::new(config, args.decline);
    info!(account = %hex::encode(wallet.address()), decline = args.decline, "session ready");

    while let Some(request) = session.next_request().await {
        wallet.handle(request);
    }
    session.finish().await.context("session ended abnormally")?;

    info!(served = wallet.served(), "dapp disconnected");
    Ok(())
}

/// In-memory wallet state for one session.
pub struct DemoWallet {
    signing_key: SigningKey,
    config: WalletConfig,
    decline: bool,
    auth_token: Option<String>,
    served: usize,
}

impl DemoWallet {
    pub fn new(config: WalletConfig, decline: bool) -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
            config,
            decline,
            auth_token: None,
            served: 0,
        }
    }

    pub fn address(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn served(&self) -> usize {
        self.served
    }

    /// `payload || signature`.
    pub fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let signature = self.signing_key.sign(payload);
        let mut signed = Vec::with_capacity(payload.len() + 64);
        signed.extend_from_slice(payload);
        signed.extend_from_slice(&signature.to_bytes());
        signed
    }

    fn authorization(&self, auth_token: String) -> AuthorizationResult {
        AuthorizationResult {
            auth_token,
            accounts: vec![AuthorizedAccount {
                address: Base64Bytes(self.address().to_vec()),
                label: Some("demo".to_string()),
            }],
            wallet_uri_base: None,
        }
    }

    fn issue_token(&mut self) -> String {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        self.auth_token = Some(token.clone());
        token
    }

    fn holds_token(&self, token: &str) -> bool {
        self.auth_token.as_deref() == Some(token)
    }

    pub fn handle(&mut self, request: WalletRequest) {
        self.served += 1;
        info!(id = request.id(), method = %request.method(), "request");

        if self.decline {
            request.reject(WalletFailure::UserDeclined);
            return;
        }

        match request {
            WalletRequest::Authorize { params, responder } => {
                info!(
                    app = params.identity.name.as_deref().unwrap_or("unnamed"),
                    cluster = params.cluster.as_deref().unwrap_or("default"),
                    "approving authorization"
                );
                let token = match params.auth_token {
                    Some(token) if self.holds_token(&token) => token,
                    _ => self.issue_token(),
                };
                responder.complete(Ok(self.authorization(token)));
            }
            WalletRequest::Reauthorize { params, responder } => {
                if self.holds_token(&params.auth_token) {
                    responder.complete(Ok(self.authorization(params.auth_token)));
                } else {
                    responder.fail(WalletFailure::AuthorizationNotValid);
                }
            }
            WalletRequest::Deauthorize { params, responder } => {
                if self.holds_token(&params.auth_token) {
                    self.auth_token = None;
                }
                responder.complete(Ok(EmptyResult {}));
            }
            WalletRequest::GetCapabilities { responder } => {
                responder.complete(Ok(self.config.capabilities()));
            }
            WalletRequest::SignTransactions { params, responder } => {
                if self.auth_token.is_none() {
                    responder.fail(WalletFailure::AuthorizationNotValid);
                    return;
                }
                let signed_payloads = params
                    .payloads
                    .iter()
                    .map(|p| Base64Bytes(self.sign(p.as_slice())))
                    .collect();
                responder.complete(Ok(SignedPayloadsResult { signed_payloads }));
            }
            WalletRequest::SignMessages { params, responder } => {
                if self.auth_token.is_none() {
                    responder.fail(WalletFailure::AuthorizationNotValid);
                    return;
                }
                let ours = self.address();
                if params.addresses.iter().any(|a| a.as_slice() != &ours[..]) {
                    warn!("sign_messages for an account this wallet does not hold");
                    responder.fail(WalletFailure::InvalidPayloads {
                        valid: vec![false; params.payloads.len()],
                    });
                    return;
                }
                let signed_payloads = params
                    .payloads
                    .iter()
                    .map(|p| Base64Bytes(self.sign(p.as_slice())))
                    .collect();
                responder.complete(Ok(SignedPayloadsResult { signed_payloads }));
            }
            WalletRequest::SignAndSendTransactions { params, responder } => {
                if self.auth_token.is_none() {
                    responder.fail(WalletFailure::AuthorizationNotValid);
                    return;
                }
                warn!("demo wallet does not submit transactions; returning signatures only");
                let signatures = params
                    .payloads
                    .iter()
                    .map(|p| Base64Bytes(self.signing_key.sign(p.as_slice()).to_bytes().to_vec()))
                    .collect();
                responder.complete(Ok(SignaturesResult { signatures }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_appended_to_payload() {
        let wallet = DemoWallet::new(WalletConfig::default(), false);
        let signed = wallet.sign(b"abc");
        assert_eq!(signed.len(), 3 + 64);
        assert_eq!(&signed[..3], b"abc");
    }

    #[test]
    fn tokens_are_fresh_and_revocable() {
        let mut wallet = DemoWallet::new(WalletConfig::default(), false);
        let first = wallet.issue_token();
        assert_eq!(first.len(), 32);
        assert!(wallet.holds_token(&first));

        let second = wallet.issue_token();
        assert_ne!(first, second);
        assert!(!wallet.holds_token(&first));
    }
}
