//! Governor and token contract clients
//!
//! Read side: the log-range query and the authority's `state`/parameter
//! views, wired into the watcher through the [`LogSource`] and
//! [`StateSource`] seams. Write side: the mutating governance actions,
//! submitted through a node-managed account and gated on the proposal's
//! current lifecycle state before anything is sent.
//!
//! Queue and execute reconstruct their calldata from the canonical
//! proposal's stored action arrays plus the description hash, which must be
//! byte-identical to the hash computed at propose time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use primitive_types::{H160, H256, U256};
use tracing::{debug, info};

use crate::abi::{self, Token};
use crate::proposals::{
    decode_proposal_created, proposal_created_topic, CanonicalProposal, ProposalState,
    ResolvedProposal, StateSource,
};
use crate::rpc::{RawLog, RpcClient};
use crate::types::{ActionPreconditionFailure, GavelError, Result};
use crate::watch::LogSource;

/// Vote direction, using the authority's support codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteSupport {
    Against,
    For,
    Abstain,
}

impl VoteSupport {
    pub fn code(self) -> u8 {
        match self {
            VoteSupport::Against => 0,
            VoteSupport::For => 1,
            VoteSupport::Abstain => 2,
        }
    }

    /// Parser for CLI arguments; accepts names or raw support codes
    pub fn parse(value: &str) -> std::result::Result<Self, String> {
        match value.to_ascii_lowercase().as_str() {
            "against" | "0" => Ok(VoteSupport::Against),
            "for" | "1" => Ok(VoteSupport::For),
            "abstain" | "2" => Ok(VoteSupport::Abstain),
            other => Err(format!(
                "unknown support {other:?}, expected against, for, or abstain"
            )),
        }
    }
}

impl std::fmt::Display for VoteSupport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoteSupport::Against => f.write_str("against"),
            VoteSupport::For => f.write_str("for"),
            VoteSupport::Abstain => f.write_str("abstain"),
        }
    }
}

/// Display-only governor parameters
#[derive(Debug, Clone)]
pub struct GovernorParams {
    pub voting_delay: U256,
    pub voting_period: U256,
    pub proposal_threshold: U256,
    /// Quorum at the queried block height
    pub quorum: U256,
}

/// Client for the governance contract (the external authority)
pub struct GovernorClient {
    rpc: Arc<RpcClient>,
    address: H160,
    from_block: u64,
    sender: H160,
    inclusion_timeout: Duration,
}

impl GovernorClient {
    pub fn new(
        rpc: Arc<RpcClient>,
        address: H160,
        from_block: u64,
        sender: H160,
        inclusion_timeout: Duration,
    ) -> Self {
        Self {
            rpc,
            address,
            from_block,
            sender,
            inclusion_timeout,
        }
    }

    /// One eth_call returning a single word
    async fn read_uint(&self, calldata: Vec<u8>) -> Result<U256> {
        let output = self.rpc.call(self.address, &calldata).await?;
        if output.len() < 32 {
            return Err(GavelError::Response(format!(
                "authority returned {} bytes, expected a word",
                output.len()
            )));
        }
        Ok(U256::from_big_endian(&output[..32]))
    }

    pub async fn voting_delay(&self) -> Result<U256> {
        self.read_uint(abi::encode_call("votingDelay()", &[])).await
    }

    pub async fn voting_period(&self) -> Result<U256> {
        self.read_uint(abi::encode_call("votingPeriod()", &[])).await
    }

    pub async fn proposal_threshold(&self) -> Result<U256> {
        self.read_uint(abi::encode_call("proposalThreshold()", &[]))
            .await
    }

    pub async fn quorum(&self, block: u64) -> Result<U256> {
        self.read_uint(abi::encode_call(
            "quorum(uint256)",
            &[Token::Uint(U256::from(block))],
        ))
        .await
    }

    /// Fetch all display parameters concurrently
    pub async fn params(&self, at_block: u64) -> Result<GovernorParams> {
        let (voting_delay, voting_period, proposal_threshold, quorum) = tokio::try_join!(
            self.voting_delay(),
            self.voting_period(),
            self.proposal_threshold(),
            self.quorum(at_block),
        )?;
        Ok(GovernorParams {
            voting_delay,
            voting_period,
            proposal_threshold,
            quorum,
        })
    }

    /// Submit a new proposal and recover its id from the receipt's
    /// ProposalCreated record.
    pub async fn propose(
        &self,
        targets: Vec<H160>,
        values: Vec<U256>,
        calldatas: Vec<Vec<u8>>,
        description: &str,
    ) -> Result<U256> {
        let data = abi::encode_call(
            "propose(address[],uint256[],bytes[],string)",
            &[
                Token::Array(targets.into_iter().map(Token::Address).collect()),
                Token::Array(values.into_iter().map(Token::Uint).collect()),
                Token::Array(calldatas.into_iter().map(Token::Bytes).collect()),
                Token::String(description.to_string()),
            ],
        );

        let tx = self
            .rpc
            .send_transaction(self.sender, self.address, &data)
            .await?;
        info!(tx = ?tx, "proposal submitted, awaiting inclusion");
        let receipt = self.rpc.wait_for_receipt(tx, self.inclusion_timeout).await?;

        for record in &receipt.logs {
            if record.topics.first() == Some(&proposal_created_topic()) {
                if let Ok(fact) = decode_proposal_created(record) {
                    info!(id = %fact.id, block = %receipt.block_number, "proposal created");
                    return Ok(fact.id);
                }
            }
        }
        Err(GavelError::Response(
            "no ProposalCreated record in receipt".into(),
        ))
    }

    /// Cast a vote; only valid while the proposal is Active
    pub async fn cast_vote(
        &self,
        proposal: &ResolvedProposal,
        support: VoteSupport,
    ) -> Result<H256> {
        require_state(proposal, "vote on", ProposalState::Active)?;

        let data = abi::encode_call(
            "castVote(uint256,uint8)",
            &[
                Token::Uint(proposal.proposal.id),
                Token::Uint(U256::from(support.code())),
            ],
        );
        self.submit_action(data, "castVote").await
    }

    /// Queue a Succeeded proposal into the timelock
    pub async fn queue(&self, proposal: &ResolvedProposal) -> Result<H256> {
        require_state(proposal, "queue", ProposalState::Succeeded)?;
        let data = action_calldata(
            "queue(address[],uint256[],bytes[],bytes32)",
            &proposal.proposal,
        );
        self.submit_action(data, "queue").await
    }

    /// Execute a Queued proposal once its timelock delay has elapsed
    pub async fn execute(&self, proposal: &ResolvedProposal) -> Result<H256> {
        require_state(proposal, "execute", ProposalState::Queued)?;
        let data = action_calldata(
            "execute(address[],uint256[],bytes[],bytes32)",
            &proposal.proposal,
        );
        self.submit_action(data, "execute").await
    }

    async fn submit_action(&self, data: Vec<u8>, action: &'static str) -> Result<H256> {
        let tx = self
            .rpc
            .send_transaction(self.sender, self.address, &data)
            .await?;
        debug!(action, tx = ?tx, "action submitted, awaiting inclusion");
        self.rpc.wait_for_receipt(tx, self.inclusion_timeout).await?;
        info!(action, tx = ?tx, "action included");
        Ok(tx)
    }
}

#[async_trait]
impl LogSource for GovernorClient {
    async fn proposal_logs(&self) -> Result<Vec<RawLog>> {
        self.rpc
            .get_logs(self.address, proposal_created_topic(), self.from_block)
            .await
    }
}

#[async_trait]
impl StateSource for GovernorClient {
    async fn state(&self, id: U256) -> Result<u8> {
        let word = self
            .read_uint(abi::encode_call("state(uint256)", &[Token::Uint(id)]))
            .await?;
        if word > U256::from(u8::MAX) {
            return Err(GavelError::Response(format!(
                "state word out of range: {word}"
            )));
        }
        Ok(word.low_u64() as u8)
    }
}

/// Reject an action whose proposal is not in the required lifecycle state
fn require_state(
    proposal: &ResolvedProposal,
    action: &'static str,
    required: ProposalState,
) -> Result<()> {
    if proposal.state == required {
        Ok(())
    } else {
        Err(ActionPreconditionFailure {
            id: proposal.proposal.id,
            action,
            current: proposal.state.clone(),
            required,
        }
        .into())
    }
}

/// Calldata for queue/execute, rebuilt from the canonical proposal's action
/// arrays and its byte-exact description hash.
fn action_calldata(signature: &str, proposal: &CanonicalProposal) -> Vec<u8> {
    abi::encode_call(
        signature,
        &[
            Token::Array(
                proposal
                    .targets
                    .iter()
                    .copied()
                    .map(Token::Address)
                    .collect(),
            ),
            Token::Array(proposal.values.iter().copied().map(Token::Uint).collect()),
            Token::Array(
                proposal
                    .calldatas
                    .iter()
                    .cloned()
                    .map(Token::Bytes)
                    .collect(),
            ),
            Token::FixedBytes(proposal.description_hash()),
        ],
    )
}

/// Client for the vote token contract
pub struct TokenClient {
    rpc: Arc<RpcClient>,
    address: H160,
    sender: H160,
    inclusion_timeout: Duration,
}

impl TokenClient {
    pub fn new(
        rpc: Arc<RpcClient>,
        address: H160,
        sender: H160,
        inclusion_timeout: Duration,
    ) -> Self {
        Self {
            rpc,
            address,
            sender,
            inclusion_timeout,
        }
    }

    pub fn address(&self) -> H160 {
        self.address
    }

    /// Delegate the sender's voting power
    pub async fn delegate(&self, delegatee: H160) -> Result<H256> {
        let data = abi::encode_call("delegate(address)", &[Token::Address(delegatee)]);
        let tx = self
            .rpc
            .send_transaction(self.sender, self.address, &data)
            .await?;
        info!(delegatee = ?delegatee, tx = ?tx, "delegation submitted, awaiting inclusion");
        self.rpc.wait_for_receipt(tx, self.inclusion_timeout).await?;
        Ok(tx)
    }
}

/// Demo action payload: mint `amount` of the vote token to `to`.
///
/// This is the default proposal body for the harness's `propose` command.
pub fn mint_calldata(to: H160, amount: U256) -> Vec<u8> {
    abi::encode_call(
        "mint(address,uint256)",
        &[Token::Address(to), Token::Uint(amount)],
    )
}
