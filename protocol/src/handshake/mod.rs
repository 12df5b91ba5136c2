//! # Local Association Handshake
//!
//! One round trip turns an unauthenticated loopback socket into an
//! encrypted session bound to the association key from the URL.
//!
//! ```text
//!   ┌──────────┐                                   ┌──────────┐
//!   │   Dapp   │                                   │  Wallet  │
//!   └────┬─────┘                                   └────┬─────┘
//!        │  association URL (intent / QR):              │
//!        │  Qa = association public key, port           │
//!        ├ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ►│
//!        │                                              │
//!        │  WebSocket connect (retried until listening) │
//!        ├─────────────────────────────────────────────►│
//!        │                                              │
//!        │  HELLO_REQ: Qd || Sig_a(Qd)                  │
//!        ├─────────────────────────────────────────────►│  verify with Qa
//!        │                                              │
//!        │  HELLO_RSP: Qw || E_k(session properties)    │
//!        │◄─────────────────────────────────────────────┤
//!        │                                              │
//!        │  k = HKDF(ECDH(d, Qw), salt = Qa)            │
//!        │                                              │
//!        │  E_k(JSON-RPC request) / E_k(response) ...   │
//!        │◄────────────────────────────────────────────►│
//! ```
//!
//! The wallet trusts the dapp because HELLO_REQ is signed by the key it
//! received out-of-band. The dapp trusts the wallet because the sealed
//! session properties in HELLO_RSP only open under a key salted with that
//! same association key.

pub mod hello;

pub use hello::{
    build_hello_req, build_hello_rsp, parse_hello_rsp, verify_hello_req, SessionProperties,
};
