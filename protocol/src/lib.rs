// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Mobile Wallet Adapter: Local Association
//!
//! A dapp and a wallet on the same device agree on a session over a
//! loopback WebSocket, authenticate it with a key that only ever travelled
//! out of band, and then speak encrypted JSON-RPC until one side closes.
//!
//! ## Architecture
//!
//! - **config**: Wire constants plus dapp and wallet runtime knobs.
//! - **crypto**: P-256 keys, HKDF session key, AES-128-GCM framing.
//! - **association**: The URL that carries the association key and port.
//! - **handshake**: HELLO_REQ / HELLO_RSP build and verify.
//! - **jsonrpc**: Message types, method params, and the encrypting codec.
//! - **transport**: Frame sink/source traits, WebSocket and in-memory.
//! - **session**: Dapp side: state machine, retries, `transact`.
//! - **wallet**: Wallet side: accept, verify, serve typed requests.
//!
//! ## Quick look
//!
//! ```no_run
//! use mwa_protocol::{transact, AssociationUrl, MwaError, TransactConfig};
//!
//! # async fn run() -> Result<(), MwaError> {
//! let launcher = |url: &AssociationUrl| -> Result<(), MwaError> {
//!     println!("open {}", url);
//!     Ok(())
//! };
//! let config = TransactConfig::with_port(50_000);
//! let caps = transact(&launcher, &config, |wallet| async move {
//!     wallet.get_capabilities().await
//! })
//! .await?;
//! println!("{:?}", caps);
//! # Ok(())
//! # }
//! ```

pub mod association;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handshake;
pub mod jsonrpc;
pub mod session;
pub mod transport;
pub mod wallet;

pub use association::AssociationUrl;
pub use config::{TransactConfig, WalletConfig};
pub use error::MwaError;
pub use jsonrpc::{JsonRpcError, RpcMethod};
pub use session::{transact, transact_with, AssociationLauncher, MobileWallet, SessionStatus};
pub use wallet::{LocalWalletSession, Responder, WalletFailure, WalletRequest};
