//! Gavel - governance proposal watcher and timelock action harness
//!
//! Discovers proposals from the ledger's append-only event history,
//! reconciles duplicate observations into one canonical record per id,
//! re-resolves every proposal's lifecycle state from the external authority
//! each refresh cycle, and publishes an ordered, selectable view. Mutating
//! governance actions (propose, vote, queue, execute, delegate) are gated on
//! that view's states.
//!
//! ## Pipeline
//!
//! - **rpc**: JSON-RPC transport to the ledger node
//! - **abi**: minimal contract ABI codec for calls and event payloads
//! - **proposals**: decode -> reconcile -> resolve -> assemble
//! - **watch**: refresh-cycle driver with single-flight and supersession
//! - **governor**: authority reads and state-gated mutating actions

pub mod abi;
pub mod config;
pub mod governor;
pub mod proposals;
pub mod rpc;
pub mod types;
pub mod watch;

pub use config::Args;
pub use types::{GavelError, Result};
pub use watch::{RefreshOutcome, Watcher};
