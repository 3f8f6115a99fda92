//! Proposal domain model
//!
//! The pipeline runs one way each refresh cycle:
//!
//! ```text
//! raw logs -> decoder -> ProposalFact
//!          -> reconciler -> CanonicalProposal (one per id)
//!          -> resolver -> ResolvedProposal (state re-queried, never cached)
//!          -> view -> ordered snapshot with a selected proposal
//! ```
//!
//! Facts are immutable once observed; the canonical set only grows as the
//! ledger grows. State is the one exception: it is time- and block-dependent
//! and is re-resolved from the external authority on every cycle.

pub mod decoder;
pub mod reconciler;
pub mod resolver;
pub mod view;

pub use decoder::{decode_proposal_created, proposal_created_topic};
pub use reconciler::{reconcile, Reconciliation};
pub use resolver::{resolve_all, StateSource};
pub use view::{assemble, ProposalView};

use primitive_types::{H160, H256, U256};
use serde::Serialize;

use crate::abi::keccak256;

/// One decoded ProposalCreated observation. Immutable; the ledger never
/// revises an emitted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalFact {
    pub id: U256,
    pub proposer: H160,
    pub targets: Vec<H160>,
    pub values: Vec<U256>,
    pub calldatas: Vec<Vec<u8>>,
    pub description: String,
    pub vote_start: U256,
    pub vote_end: U256,
    /// Block height the fact was observed at, for tie-break ordering
    pub origin_block: u64,
}

/// One record per distinct proposal id, merged from all facts seen for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalProposal {
    pub id: U256,
    pub proposer: H160,
    pub targets: Vec<H160>,
    pub values: Vec<U256>,
    #[serde(serialize_with = "serialize_hex_seq")]
    pub calldatas: Vec<Vec<u8>>,
    pub description: String,
    pub vote_start: U256,
    pub vote_end: U256,
    pub origin_block: u64,
}

impl CanonicalProposal {
    pub fn from_fact(fact: ProposalFact) -> Self {
        Self {
            id: fact.id,
            proposer: fact.proposer,
            targets: fact.targets,
            values: fact.values,
            calldatas: fact.calldatas,
            description: fact.description,
            vote_start: fact.vote_start,
            vote_end: fact.vote_end,
            origin_block: fact.origin_block,
        }
    }

    /// Content hash of the description string.
    ///
    /// This is the canonical action identifier the authority expects for
    /// queue/execute. It must be byte-identical to the hash computed at
    /// propose time, so it is always derived from the stored description
    /// verbatim, never re-normalized.
    pub fn description_hash(&self) -> H256 {
        H256(keccak256(self.description.as_bytes()))
    }
}

/// A canonical proposal with its lifecycle state as currently reported by
/// the external authority. Recreated every refresh; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedProposal {
    #[serde(flatten)]
    pub proposal: CanonicalProposal,
    pub state: ProposalState,
}

impl ResolvedProposal {
    /// Voting is only open while the authority reports Active.
    pub fn can_vote(&self) -> bool {
        self.state == ProposalState::Active
    }

    /// Queueing into the timelock requires a Succeeded vote.
    pub fn can_queue(&self) -> bool {
        self.state == ProposalState::Succeeded
    }

    /// Execution requires the proposal to already sit in the timelock queue.
    pub fn can_execute(&self) -> bool {
        self.state == ProposalState::Queued
    }
}

/// Lifecycle state of a proposal.
///
/// The eight on-chain states mirror the authority's `state(id)` enumeration
/// (`uint8` 0..=7). `Unknown` is a local sentinel for a proposal whose state
/// query failed this cycle; the failure reason is retained for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum ProposalState {
    Pending,
    Active,
    Canceled,
    Defeated,
    Succeeded,
    Queued,
    Expired,
    Executed,
    Unknown { reason: String },
}

impl ProposalState {
    /// Map the authority's raw state code; out-of-range codes are rejected.
    pub fn from_authority(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(ProposalState::Pending),
            1 => Some(ProposalState::Active),
            2 => Some(ProposalState::Canceled),
            3 => Some(ProposalState::Defeated),
            4 => Some(ProposalState::Succeeded),
            5 => Some(ProposalState::Queued),
            6 => Some(ProposalState::Expired),
            7 => Some(ProposalState::Executed),
            _ => None,
        }
    }

    /// Terminal states can never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalState::Canceled
                | ProposalState::Defeated
                | ProposalState::Expired
                | ProposalState::Executed
        )
    }
}

impl std::fmt::Display for ProposalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ProposalState::Pending => "Pending",
            ProposalState::Active => "Active",
            ProposalState::Canceled => "Canceled",
            ProposalState::Defeated => "Defeated",
            ProposalState::Succeeded => "Succeeded",
            ProposalState::Queued => "Queued",
            ProposalState::Expired => "Expired",
            ProposalState::Executed => "Executed",
            ProposalState::Unknown { reason } => return write!(f, "Unknown ({reason})"),
        };
        f.write_str(label)
    }
}

/// Abbreviated id for log lines and list output, e.g. `1138…0421`
pub fn short_id(id: &U256) -> String {
    let full = id.to_string();
    if full.len() <= 12 {
        full
    } else {
        format!("{}…{}", &full[..6], &full[full.len() - 4..])
    }
}

fn serialize_hex_seq<S>(calldatas: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::ser::SerializeSeq;
    let mut seq = serializer.serialize_seq(Some(calldatas.len()))?;
    for data in calldatas {
        seq.serialize_element(&format!("0x{}", hex::encode(data)))?;
    }
    seq.end()
}
