//! Error taxonomy and shared result alias for Gavel
//!
//! Failures local to one proposal (decode, per-id state query) never abort a
//! refresh cycle; they are downgraded to dropped records or `Unknown` states.
//! Only cycle-level failures (the log query itself, transport, configuration)
//! travel through `GavelError`.

use primitive_types::{H256, U256};
use thiserror::Error;

use crate::proposals::ProposalState;

/// Top-level error type for Gavel operations
#[derive(Debug, Error)]
pub enum GavelError {
    /// Transport-level failure talking to the ledger node
    #[error("rpc transport: {0}")]
    Transport(#[from] reqwest::Error),

    /// The ledger node answered with a JSON-RPC error object
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The ledger node answered something we could not interpret
    #[error("malformed rpc response: {0}")]
    Response(String),

    /// A raw event record could not be decoded into a proposal fact
    #[error("event decode: {0}")]
    Decode(#[from] DecodeError),

    /// A mutating action was attempted against a proposal in the wrong state
    #[error(transparent)]
    Precondition(#[from] ActionPreconditionFailure),

    /// A submitted transaction was included but reverted
    #[error("transaction {0:?} reverted")]
    Reverted(H256),

    /// Waiting for transaction inclusion exceeded the configured timeout
    #[error("transaction {0:?} not included within timeout")]
    InclusionTimeout(H256),

    /// Invalid or incomplete configuration
    #[error("configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, GavelError>;

/// Failure to decode a raw event record into a typed proposal fact.
///
/// Decoding fails closed: a record that cannot be unpacked per the known
/// schema is dropped in its entirety, never partially trusted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// topic-0 does not match the expected event signature
    #[error("unexpected event topic")]
    TopicMismatch,

    /// Payload ended before a required field could be read
    #[error("payload truncated reading word at offset {0}")]
    Truncated(usize),

    /// A dynamic-field offset or length points outside the payload
    #[error("out-of-range {kind} {value} in payload of {len} bytes")]
    OutOfRange {
        kind: &'static str,
        value: u64,
        len: usize,
    },

    /// A string field was not valid UTF-8
    #[error("string field is not valid utf-8")]
    Utf8,

    /// The record's block height does not fit the local representation
    #[error("block number {0} exceeds representable range")]
    BlockNumberOverflow(U256),

    /// targets/values/calldatas arrays disagree on length
    #[error("action arrays disagree: {targets} targets, {values} values, {calldatas} calldatas")]
    ArityMismatch {
        targets: usize,
        values: usize,
        calldatas: usize,
    },
}

/// Two facts claimed the same proposal id with differing immutable fields.
///
/// Surfaced to the caller as a data-integrity warning; the canonical record
/// keeps the first-seen value. A conflicting re-reading signals a decoder bug
/// or a ledger reorganization, both of which must stay visible.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ReconciliationConflict {
    pub id: U256,
    pub field: &'static str,
    pub kept: String,
    pub rejected: String,
}

impl std::fmt::Display for ReconciliationConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "proposal {} has conflicting {}: kept {:?}, rejected {:?}",
            self.id, self.field, self.kept, self.rejected
        )
    }
}

/// A mutating action was attempted against a proposal not in the required
/// lifecycle state. Rejected before submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} proposal {id}: state is {current}, requires {required}")]
pub struct ActionPreconditionFailure {
    pub id: U256,
    pub action: &'static str,
    pub current: ProposalState,
    pub required: ProposalState,
}
