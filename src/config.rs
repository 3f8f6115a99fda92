//! Configuration for Gavel
//!
//! CLI arguments and environment variable handling using clap. Addresses and
//! amounts are parsed up front so every command starts from typed values.

use clap::{Parser, Subcommand};
use primitive_types::{H160, U256};
use std::time::Duration;

use crate::governor::VoteSupport;

/// Gavel - governance proposal watcher and timelock action harness
#[derive(Parser, Debug, Clone)]
#[command(name = "gavel")]
#[command(about = "Watch, vote on, queue and execute on-chain governance proposals")]
pub struct Args {
    /// Ledger node JSON-RPC endpoint
    #[arg(long, env = "RPC_URL", default_value = "http://127.0.0.1:8545")]
    pub rpc_url: String,

    /// Governance contract address (the external authority)
    #[arg(long, env = "GOVERNOR_ADDRESS", value_parser = parse_address)]
    pub governor: H160,

    /// Vote token contract address; required for propose and delegate
    #[arg(long, env = "TOKEN_ADDRESS", value_parser = parse_address)]
    pub token: Option<H160>,

    /// Account submitting actions; defaults to the node's first account
    #[arg(long, env = "FROM_ADDRESS", value_parser = parse_address)]
    pub from: Option<H160>,

    /// First block of the log scan range. The default scans full history,
    /// which guarantees no proposal is missed across restarts.
    #[arg(long, env = "FROM_BLOCK", default_value = "0")]
    pub from_block: u64,

    /// Seconds between refresh cycles in watch mode
    #[arg(long, env = "REFRESH_INTERVAL_SECS", default_value = "15")]
    pub refresh_interval_secs: u64,

    /// Upper bound on concurrent state queries per refresh cycle
    #[arg(long, env = "MAX_CONCURRENT_RESOLUTIONS", default_value = "8")]
    pub max_concurrent_resolutions: usize,

    /// Request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Seconds to wait for a submitted transaction to be included
    #[arg(long, env = "INCLUSION_TIMEOUT_SECS", default_value = "120")]
    pub inclusion_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Refresh on a timer and print the view after every applied cycle
    Watch,

    /// Run one refresh cycle and print the current view
    List {
        /// Emit the snapshot as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Submit a proposal that mints vote tokens to an address
    Propose {
        /// Proposal description; its content hash identifies the action for
        /// queue/execute, so it must be passed back verbatim
        #[arg(long, default_value = "Mint 1 GOV to me")]
        description: String,

        /// Mint recipient; defaults to the submitting account
        #[arg(long, value_parser = parse_address)]
        to: Option<H160>,

        /// Mint amount in base token units
        #[arg(long, value_parser = parse_u256, default_value = "1000000000000000000")]
        amount: U256,
    },

    /// Cast a vote on a proposal
    Vote {
        /// against, for, or abstain (or a raw support code 0/1/2)
        #[arg(value_parser = VoteSupport::parse)]
        support: VoteSupport,

        /// Proposal id; defaults to the view's current selection
        #[arg(long, value_parser = parse_u256)]
        id: Option<U256>,
    },

    /// Queue a Succeeded proposal into the timelock
    Queue {
        /// Proposal id; defaults to the view's current selection
        #[arg(long, value_parser = parse_u256)]
        id: Option<U256>,
    },

    /// Execute a Queued proposal
    Execute {
        /// Proposal id; defaults to the view's current selection
        #[arg(long, value_parser = parse_u256)]
        id: Option<U256>,
    },

    /// Delegate the sender's voting power
    Delegate {
        /// Delegatee; defaults to self-delegation
        #[arg(long, value_parser = parse_address)]
        to: Option<H160>,
    },

    /// Print the authority's voting parameters
    Params,
}

impl Args {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn inclusion_timeout(&self) -> Duration {
        Duration::from_secs(self.inclusion_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if matches!(
            self.command,
            Command::Propose { .. } | Command::Delegate { .. }
        ) && self.token.is_none()
        {
            return Err("TOKEN_ADDRESS is required for propose and delegate".to_string());
        }

        if self.refresh_interval_secs == 0 {
            return Err("REFRESH_INTERVAL_SECS must be at least 1".to_string());
        }

        if self.max_concurrent_resolutions == 0 {
            return Err("MAX_CONCURRENT_RESOLUTIONS must be at least 1".to_string());
        }

        Ok(())
    }
}

/// Parse a 20-byte 0x-prefixed address
pub fn parse_address(value: &str) -> Result<H160, String> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(stripped).map_err(|e| format!("invalid address {value:?}: {e}"))?;
    if bytes.len() != 20 {
        return Err(format!(
            "invalid address {value:?}: expected 20 bytes, got {}",
            bytes.len()
        ));
    }
    Ok(H160::from_slice(&bytes))
}

/// Parse an unsigned 256-bit integer, decimal or 0x-hex
pub fn parse_u256(value: &str) -> Result<U256, String> {
    let parsed = if let Some(hexpart) = value.strip_prefix("0x") {
        U256::from_str_radix(hexpart, 16).map_err(|e| e.to_string())
    } else {
        U256::from_dec_str(value).map_err(|e| e.to_string())
    };
    parsed.map_err(|e| format!("invalid integer {value:?}: {e}"))
}
