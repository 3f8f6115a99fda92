//! View Assembler - ordered snapshot with a current selection
//!
//! Assembly is pure and idempotent: running it twice over the same resolved
//! set yields the same ordered sequence and the same selection, which is what
//! makes refresh cycles restartable.

use primitive_types::U256;
use serde::Serialize;

use crate::types::ReconciliationConflict;

use super::ResolvedProposal;

/// One immutable snapshot of the proposal set, as published at the end of a
/// successful refresh cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ProposalView {
    /// Refresh cycle that produced this snapshot
    pub cycle: u64,
    /// Most-recently-originated first; ties broken by higher id
    pub proposals: Vec<ResolvedProposal>,
    /// Current selection: the pinned id while it exists in the set,
    /// otherwise the most recent proposal
    pub selected: Option<U256>,
    /// Integrity warnings carried out of reconciliation
    pub conflicts: Vec<ReconciliationConflict>,
}

impl ProposalView {
    pub fn selected_proposal(&self) -> Option<&ResolvedProposal> {
        self.selected.and_then(|id| self.get(id))
    }

    pub fn get(&self, id: U256) -> Option<&ResolvedProposal> {
        self.proposals.iter().find(|p| p.proposal.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.proposals.len()
    }
}

/// Order resolved proposals and compute the current selection.
///
/// Ordering: higher `origin_block` first; for equal blocks, higher `id`
/// first, so the sequence is fully deterministic. The pin survives refreshes
/// untouched until its id disappears from the resolved set, at which point
/// selection falls back to the most recent proposal.
pub fn assemble(
    mut resolved: Vec<ResolvedProposal>,
    pinned: Option<U256>,
    conflicts: Vec<ReconciliationConflict>,
    cycle: u64,
) -> ProposalView {
    resolved.sort_by(|a, b| {
        b.proposal
            .origin_block
            .cmp(&a.proposal.origin_block)
            .then(b.proposal.id.cmp(&a.proposal.id))
    });

    let selected = pinned
        .filter(|id| resolved.iter().any(|p| p.proposal.id == *id))
        .or_else(|| resolved.first().map(|p| p.proposal.id));

    ProposalView {
        cycle,
        proposals: resolved,
        selected,
        conflicts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposals::{CanonicalProposal, ProposalState};
    use primitive_types::H160;

    fn resolved(id: u64, origin_block: u64) -> ResolvedProposal {
        ResolvedProposal {
            proposal: CanonicalProposal {
                id: U256::from(id),
                proposer: H160::zero(),
                targets: vec![],
                values: vec![],
                calldatas: vec![],
                description: format!("p{id}"),
                vote_start: U256::zero(),
                vote_end: U256::zero(),
                origin_block,
            },
            state: ProposalState::Pending,
        }
    }

    #[test]
    fn test_ordering_most_recent_first_id_tiebreak() {
        // origin blocks [10, 7, 10] with ids A > C: expect [A, C, B]
        let a = resolved(300, 10);
        let b = resolved(200, 7);
        let c = resolved(100, 10);

        let view = assemble(vec![a, b, c], None, vec![], 1);
        let ids: Vec<u64> = view.proposals.iter().map(|p| p.proposal.id.as_u64()).collect();
        assert_eq!(ids, vec![300, 100, 200]);
    }

    #[test]
    fn test_default_selection_is_most_recent() {
        let view = assemble(vec![resolved(1, 5), resolved(2, 9)], None, vec![], 1);
        assert_eq!(view.selected, Some(U256::from(2u64)));
        assert_eq!(view.selected_proposal().unwrap().proposal.description, "p2");
    }

    #[test]
    fn test_pin_overrides_default() {
        let view = assemble(
            vec![resolved(1, 5), resolved(2, 9)],
            Some(U256::one()),
            vec![],
            1,
        );
        assert_eq!(view.selected, Some(U256::one()));
    }

    #[test]
    fn test_missing_pin_falls_back_to_most_recent() {
        let view = assemble(
            vec![resolved(1, 5), resolved(2, 9)],
            Some(U256::from(77u64)),
            vec![],
            1,
        );
        assert_eq!(view.selected, Some(U256::from(2u64)));
    }

    #[test]
    fn test_assembly_is_idempotent() {
        let input = vec![resolved(3, 4), resolved(1, 9), resolved(2, 4)];
        let first = assemble(input.clone(), Some(U256::from(2u64)), vec![], 1);
        let second = assemble(input, Some(U256::from(2u64)), vec![], 1);

        let ids = |v: &ProposalView| -> Vec<U256> {
            v.proposals.iter().map(|p| p.proposal.id).collect()
        };
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.selected, second.selected);
    }

    #[test]
    fn test_empty_set_has_no_selection() {
        let view = assemble(vec![], Some(U256::one()), vec![], 1);
        assert!(view.is_empty());
        assert_eq!(view.selected, None);
    }
}
