//! # CLI Interface
//!
//! Command-line structure for `mwa` using `clap` derive. Three
//! subcommands: `dapp`, `wallet`, and `version`.

use clap::{Parser, Subcommand};

use mwa_protocol::config::DEFAULT_WALLET_SCHEME;

use crate::logging::LogFormat;

/// Mobile Wallet Adapter local association, both ends.
///
/// Run `mwa dapp` to print an association URL and wait for a wallet, then
/// pass that URL to `mwa wallet` on the same machine.
#[derive(Parser, Debug)]
#[command(
    name = "mwa",
    about = "Mobile Wallet Adapter local association",
    version,
    propagate_version = true
)]
pub struct MwaCli {
    /// Log output format.
    #[arg(long, global = true, env = "MWA_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a session as the dapp: print the association URL, then query
    /// capabilities, authorize and sign a message.
    Dapp(DappArgs),
    /// Serve one session as a wallet with a throwaway Ed25519 account.
    Wallet(WalletArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `dapp` subcommand.
#[derive(Parser, Debug)]
pub struct DappArgs {
    /// Local port the wallet should listen on (49152..=65535). Random
    /// when omitted.
    #[arg(long, short = 'p', env = "MWA_PORT")]
    pub port: Option<u32>,

    /// URL scheme for the association URL.
    #[arg(long, env = "MWA_SCHEME", default_value = DEFAULT_WALLET_SCHEME)]
    pub scheme: String,

    /// `https://` base of a specific wallet; replaces the scheme.
    #[arg(long, env = "MWA_WALLET_URI_BASE")]
    pub wallet_uri_base: Option<String>,

    /// Name presented to the wallet's user.
    #[arg(long, default_value = "mwa reference dapp")]
    pub app_name: String,

    /// Cluster to request authorization for.
    #[arg(long, default_value = "devnet")]
    pub cluster: String,

    /// Message to have the wallet sign.
    #[arg(long, default_value = "hello from mwa")]
    pub message: String,

    /// Milliseconds allowed for the wallet's HELLO_RSP.
    #[arg(long, env = "MWA_HANDSHAKE_TIMEOUT_MS", default_value_t = 2_000)]
    pub handshake_timeout_ms: u64,
}

/// Arguments for the `wallet` subcommand.
#[derive(Parser, Debug)]
pub struct WalletArgs {
    /// Association URL printed by the dapp.
    pub association_url: String,

    /// Decline every request instead of approving.
    #[arg(long)]
    pub decline: bool,

    /// Advertised and enforced limit on transactions per request.
    #[arg(long, env = "MWA_MAX_TRANSACTIONS")]
    pub max_transactions: Option<u32>,

    /// Advertised and enforced limit on messages per request.
    #[arg(long, env = "MWA_MAX_MESSAGES")]
    pub max_messages: Option<u32>,

    /// Milliseconds to wait for the dapp's HELLO_REQ after it connects.
    #[arg(long, env = "MWA_HANDSHAKE_TIMEOUT_MS", default_value_t = 2_000)]
    pub handshake_timeout_ms: u64,
}
