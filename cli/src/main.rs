// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # MWA Reference Binary
//!
//! Entry point for the `mwa` binary. Parses CLI arguments, initializes
//! logging, and runs one end of a local association.
//!
//! - `dapp`: print an association URL and run a short session
//! - `wallet`: accept that session with a demo Ed25519 account
//! - `version`: print build version information

mod cli;
mod dapp;
mod logging;
mod wallet;

use anyhow::Result;
use clap::Parser;

use cli::{Commands, MwaCli};

const DEFAULT_LOG_FILTER: &str = "mwa=info,mwa_protocol=info";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = MwaCli::parse();
    let format = cli.log_format;

    match cli.command {
        Commands::Dapp(args) => {
            logging::init_logging(DEFAULT_LOG_FILTER, format)?;
            tracing::info!(port = ?args.port, "starting dapp");
            dapp::run(args).await
        }
        Commands::Wallet(args) => {
            logging::init_logging(DEFAULT_LOG_FILTER, format)?;
            tracing::info!(decline = args.decline, "starting wallet");
            wallet::run(args).await
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Prints version information to stdout.
fn print_version() {
    println!("mwa       {}", env!("CARGO_PKG_VERSION"));
    println!("protocol  {}", mwa_protocol::config::PROTOCOL_VERSION);
    println!(
        "transport {}",
        mwa_protocol::config::WEBSOCKET_SUBPROTOCOL
    );
}
