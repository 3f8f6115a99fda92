//! Event Decoder - raw log records into typed proposal facts
//!
//! Pure: no I/O, no side effects. A record either yields a complete
//! [`ProposalFact`] or is rejected with a [`DecodeError`] and dropped by the
//! caller; there is no partially-trusted middle ground, because downstream
//! queue/execute calldata reconstruction indexes the three action arrays in
//! lockstep.

use primitive_types::{H160, H256, U256};
use std::sync::OnceLock;

use crate::abi::{self, ParamType, Token};
use crate::rpc::RawLog;
use crate::types::DecodeError;

use super::ProposalFact;

/// The authority's proposal-creation event. All fields ride in the data
/// payload; only the signature hash is a topic.
const PROPOSAL_CREATED_SIGNATURE: &str =
    "ProposalCreated(uint256,address,address[],uint256[],string[],bytes[],uint256,uint256,string)";

/// topic-0 that every decodable record must carry
pub fn proposal_created_topic() -> H256 {
    static TOPIC: OnceLock<H256> = OnceLock::new();
    *TOPIC.get_or_init(|| abi::event_topic(PROPOSAL_CREATED_SIGNATURE))
}

fn schema() -> &'static [ParamType] {
    static SCHEMA: OnceLock<Vec<ParamType>> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        vec![
            ParamType::Uint,                              // proposalId
            ParamType::Address,                           // proposer
            ParamType::Array(Box::new(ParamType::Address)), // targets
            ParamType::Array(Box::new(ParamType::Uint)),  // values
            ParamType::Array(Box::new(ParamType::String)), // signatures (legacy, unused)
            ParamType::Array(Box::new(ParamType::Bytes)), // calldatas
            ParamType::Uint,                              // voteStart
            ParamType::Uint,                              // voteEnd
            ParamType::String,                            // description
        ]
    })
}

/// Decode one raw record into a proposal fact.
///
/// Trailing extra payload bytes are tolerated (forward-compatible with
/// appended fields); a missing or truncated required field, a foreign topic,
/// or action arrays of unequal length all fail closed.
pub fn decode_proposal_created(log: &RawLog) -> Result<ProposalFact, DecodeError> {
    if log.topics.first() != Some(&proposal_created_topic()) {
        return Err(DecodeError::TopicMismatch);
    }

    let tokens = abi::decode(schema(), &log.data)?;
    let fact = match <[Token; 9]>::try_from(tokens) {
        Ok(
            [Token::Uint(id), Token::Address(proposer), Token::Array(targets), Token::Array(values), Token::Array(_signatures), Token::Array(calldatas), Token::Uint(vote_start), Token::Uint(vote_end), Token::String(description)],
        ) => ProposalFact {
            id,
            proposer,
            targets: unwrap_addresses(targets),
            values: unwrap_uints(values),
            calldatas: unwrap_bytes(calldatas),
            description,
            vote_start,
            vote_end,
            origin_block: observed_block(log)?,
        },
        _ => unreachable!("token shape guaranteed by schema decode"),
    };

    if fact.targets.len() != fact.values.len() || fact.values.len() != fact.calldatas.len() {
        return Err(DecodeError::ArityMismatch {
            targets: fact.targets.len(),
            values: fact.values.len(),
            calldatas: fact.calldatas.len(),
        });
    }

    Ok(fact)
}

fn observed_block(log: &RawLog) -> Result<u64, DecodeError> {
    if log.block_number > U256::from(u64::MAX) {
        return Err(DecodeError::BlockNumberOverflow(log.block_number));
    }
    Ok(log.block_number.as_u64())
}

fn unwrap_addresses(tokens: Vec<Token>) -> Vec<H160> {
    tokens
        .into_iter()
        .map(|t| match t {
            Token::Address(a) => a,
            _ => unreachable!("element type guaranteed by schema decode"),
        })
        .collect()
}

fn unwrap_uints(tokens: Vec<Token>) -> Vec<U256> {
    tokens
        .into_iter()
        .map(|t| match t {
            Token::Uint(u) => u,
            _ => unreachable!("element type guaranteed by schema decode"),
        })
        .collect()
}

fn unwrap_bytes(tokens: Vec<Token>) -> Vec<Vec<u8>> {
    tokens
        .into_iter()
        .map(|t| match t {
            Token::Bytes(b) => b,
            _ => unreachable!("element type guaranteed by schema decode"),
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// Build an encoded ProposalCreated record the way the authority emits it
    pub(crate) fn proposal_created_log(
        id: U256,
        proposer: H160,
        targets: Vec<H160>,
        values: Vec<U256>,
        calldatas: Vec<Vec<u8>>,
        description: &str,
        origin_block: u64,
    ) -> RawLog {
        let data = abi::encode(&[
            Token::Uint(id),
            Token::Address(proposer),
            Token::Array(targets.into_iter().map(Token::Address).collect()),
            Token::Array(values.into_iter().map(Token::Uint).collect()),
            Token::Array(vec![]), // signatures, always empty in practice
            Token::Array(calldatas.into_iter().map(Token::Bytes).collect()),
            Token::Uint(U256::from(10u64)),
            Token::Uint(U256::from(110u64)),
            Token::String(description.to_string()),
        ]);
        RawLog {
            address: H160::repeat_byte(0xaa),
            topics: vec![proposal_created_topic()],
            data,
            block_number: U256::from(origin_block),
        }
    }

    /// Minimal single-action proposal record
    pub(crate) fn simple_log(id: u64, description: &str, origin_block: u64) -> RawLog {
        proposal_created_log(
            U256::from(id),
            H160::repeat_byte(0x01),
            vec![H160::repeat_byte(0x02)],
            vec![U256::zero()],
            vec![vec![0xab, 0xcd]],
            description,
            origin_block,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::{proposal_created_log, simple_log};
    use super::*;

    #[test]
    fn test_decode_complete_record() {
        let log = proposal_created_log(
            U256::from(99u64),
            H160::repeat_byte(0x07),
            vec![H160::repeat_byte(0x02), H160::repeat_byte(0x03)],
            vec![U256::zero(), U256::from(5u64)],
            vec![vec![0x01], vec![0x02, 0x03]],
            "Mint 1 GOV to me",
            42,
        );

        let fact = decode_proposal_created(&log).unwrap();
        assert_eq!(fact.id, U256::from(99u64));
        assert_eq!(fact.proposer, H160::repeat_byte(0x07));
        assert_eq!(fact.targets.len(), 2);
        assert_eq!(fact.values[1], U256::from(5u64));
        assert_eq!(fact.calldatas[1], vec![0x02, 0x03]);
        assert_eq!(fact.description, "Mint 1 GOV to me");
        assert_eq!(fact.vote_start, U256::from(10u64));
        assert_eq!(fact.vote_end, U256::from(110u64));
        assert_eq!(fact.origin_block, 42);
    }

    #[test]
    fn test_decode_is_deterministic() {
        let log = simple_log(7, "same record", 12);
        let first = decode_proposal_created(&log).unwrap();
        let second = decode_proposal_created(&log).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_foreign_topic_rejected() {
        let mut log = simple_log(1, "whatever", 1);
        log.topics = vec![abi::event_topic("Transfer(address,address,uint256)")];
        assert_eq!(
            decode_proposal_created(&log),
            Err(DecodeError::TopicMismatch)
        );

        log.topics.clear();
        assert_eq!(
            decode_proposal_created(&log),
            Err(DecodeError::TopicMismatch)
        );
    }

    #[test]
    fn test_mismatched_action_arrays_fail_closed() {
        // two targets but only one value and one calldata
        let log = proposal_created_log(
            U256::from(3u64),
            H160::repeat_byte(0x01),
            vec![H160::repeat_byte(0x02), H160::repeat_byte(0x03)],
            vec![U256::zero()],
            vec![vec![0x01]],
            "lopsided",
            5,
        );
        assert_eq!(
            decode_proposal_created(&log),
            Err(DecodeError::ArityMismatch {
                targets: 2,
                values: 1,
                calldatas: 1,
            })
        );
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let mut log = simple_log(4, "cut short", 9);
        log.data.truncate(64);
        assert!(matches!(
            decode_proposal_created(&log),
            Err(DecodeError::Truncated(_) | DecodeError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_overflowing_block_number_reports_the_value_seen() {
        let mut log = simple_log(6, "tall block", 1);
        log.block_number = U256::MAX;
        assert_eq!(
            decode_proposal_created(&log),
            Err(DecodeError::BlockNumberOverflow(U256::MAX))
        );
    }

    #[test]
    fn test_trailing_fields_tolerated() {
        let mut log = simple_log(5, "future schema", 9);
        log.data.extend_from_slice(&[0u8; 32]);
        assert!(decode_proposal_created(&log).is_ok());
    }
}
