//! Proposal Reconciler - duplicate facts into one canonical record per id
//!
//! The same ProposalCreated event can be observed more than once when
//! overlapping log ranges are re-scanned, so facts arrive with legitimate
//! duplicates. Folding is arrival-ordered: the first occurrence of an id
//! seeds the canonical record, later occurrences overwrite mutable fields
//! that carry a non-empty value.
//!
//! `id` and `description` are immutable. A duplicate that disagrees on the
//! description is not merged at all; it produces a
//! [`ReconciliationConflict`] the caller must surface, because silently
//! accepting a different description would corrupt the descriptor-hash
//! contract used for queue/execute.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use primitive_types::{H160, U256};
use tracing::warn;

use crate::types::ReconciliationConflict;

use super::{CanonicalProposal, ProposalFact};

/// Outcome of one reconciliation pass
#[derive(Debug, Default)]
pub struct Reconciliation {
    /// One canonical record per distinct proposal id, ordered by id
    pub proposals: BTreeMap<U256, CanonicalProposal>,
    /// Data-integrity warnings; non-empty means a decoder bug or a ledger
    /// reorganization happened and must stay visible
    pub conflicts: Vec<ReconciliationConflict>,
}

/// Fold facts (any order, duplicates allowed) into canonical records
pub fn reconcile<I>(facts: I) -> Reconciliation
where
    I: IntoIterator<Item = ProposalFact>,
{
    let mut out = Reconciliation::default();

    for fact in facts {
        match out.proposals.entry(fact.id) {
            Entry::Vacant(slot) => {
                slot.insert(CanonicalProposal::from_fact(fact));
            }
            Entry::Occupied(mut slot) => {
                absorb(slot.get_mut(), fact, &mut out.conflicts);
            }
        }
    }

    for conflict in &out.conflicts {
        warn!(%conflict, "reconciliation conflict");
    }

    out
}

/// Merge a duplicate fact into an existing canonical record.
///
/// A fact disagreeing on an immutable field contributes nothing at all: a
/// reading that gets the description wrong cannot be trusted for the rest of
/// its fields either.
fn absorb(
    existing: &mut CanonicalProposal,
    fact: ProposalFact,
    conflicts: &mut Vec<ReconciliationConflict>,
) {
    // id equality holds by keying; description is checked bit for bit
    if existing.description != fact.description {
        conflicts.push(ReconciliationConflict {
            id: existing.id,
            field: "description",
            kept: existing.description.clone(),
            rejected: fact.description,
        });
        return;
    }

    // last-observed non-empty wins per mutable attribute
    if fact.proposer != H160::zero() {
        existing.proposer = fact.proposer;
    }
    // the action arrays move as a unit; the decoder guarantees their arity
    if !fact.targets.is_empty() {
        existing.targets = fact.targets;
        existing.values = fact.values;
        existing.calldatas = fact.calldatas;
    }
    if !fact.vote_start.is_zero() {
        existing.vote_start = fact.vote_start;
    }
    if !fact.vote_end.is_zero() {
        existing.vote_end = fact.vote_end;
    }
    if fact.origin_block != 0 {
        existing.origin_block = fact.origin_block;
    }
}
