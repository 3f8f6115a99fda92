//! State Resolver - per-proposal lifecycle state from the external authority
//!
//! Each resolution is an independent, network-bound call that can fail on its
//! own. Queries fan out with bounded parallelism so wall-clock latency does
//! not grow linearly with proposal count, and one proposal's failure never
//! aborts the batch: that proposal is marked [`ProposalState::Unknown`] with
//! the failure reason retained for diagnostics.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use primitive_types::U256;
use tracing::warn;

use crate::types::Result;

use super::{CanonicalProposal, ProposalState, ResolvedProposal};

/// Default fan-out bound for state queries
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Handle to the external authority's `state(id)` query.
///
/// The authority drives the lifecycle state machine; this side only reads
/// whatever it currently reports.
#[async_trait]
pub trait StateSource: Send + Sync {
    async fn state(&self, id: U256) -> Result<u8>;
}

/// Resolve every canonical proposal's current state concurrently.
///
/// Always returns one entry per input proposal; failures are folded into the
/// `Unknown` sentinel instead of propagating. Output order is unspecified
/// (the view assembler sorts).
pub async fn resolve_all<S: StateSource>(
    source: &S,
    proposals: &BTreeMap<U256, CanonicalProposal>,
    max_concurrency: usize,
) -> Vec<ResolvedProposal> {
    let limit = max_concurrency.max(1);

    stream::iter(proposals.values().cloned())
        .map(|proposal| async move {
            let state = match source.state(proposal.id).await {
                Ok(raw) => ProposalState::from_authority(raw).unwrap_or_else(|| {
                    warn!(id = %proposal.id, raw, "authority reported out-of-range state");
                    ProposalState::Unknown {
                        reason: format!("authority reported state code {raw}"),
                    }
                }),
                Err(e) => {
                    warn!(id = %proposal.id, error = %e, "state resolution failed");
                    ProposalState::Unknown {
                        reason: e.to_string(),
                    }
                }
            };
            ResolvedProposal { proposal, state }
        })
        .buffer_unordered(limit)
        .collect()
        .await
}
