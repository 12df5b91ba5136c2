//! # Dapp Session
//!
//! Everything between "the caller wants to talk to a wallet" and "the
//! transport is closed again":
//!
//! - [`state`]: the forward-only connection state machine.
//! - [`pending`]: id allocation and response routing.
//! - [`client`]: the [`MobileWallet`] handle given to callers.
//! - [`transact`]: connection retries, handshake, driver and teardown.

pub mod client;
pub mod pending;
pub mod state;
pub mod transact;

pub use client::MobileWallet;
pub use pending::{PendingRequests, RpcOutcome};
pub use state::{SessionState, SessionStatus};
pub use transact::{transact, transact_with, AssociationLauncher};
