//! # Wallet Endpoint
//!
//! The wallet's side of a local association: accept the dapp's transport,
//! verify its HELLO_REQ against the association key from the URL, answer
//! with HELLO_RSP and then serve JSON-RPC requests.
//!
//! ```text
//!   dapp ──frame──► driver ──WalletRequest──► application
//!   dapp ◄──frame── driver ◄──Responder────── application
//! ```
//!
//! The driver answers protocol-level errors (unknown method, bad params,
//! duplicate id, too many payloads) itself; the application only sees
//! well-formed requests.

pub mod request;
pub mod session;

pub use request::{Responder, WalletFailure, WalletRequest};
pub use session::LocalWalletSession;
