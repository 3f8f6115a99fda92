//! Minimal contract ABI codec
//!
//! Encodes call payloads and decodes event payloads for the handful of
//! governor/token entry points Gavel talks to. Covers exactly the types those
//! interfaces use: address, uint256, fixed 32-byte words, dynamic bytes,
//! strings, and dynamic arrays thereof.
//!
//! Decoding fails closed: any offset or length that points outside the
//! payload is a [`DecodeError`], never a partial read. Trailing bytes after
//! the last described field are tolerated so that future event versions with
//! appended fields still decode.

use primitive_types::{H160, H256, U256};
use sha3::{Digest, Keccak256};

use crate::types::DecodeError;

/// Keccak-256 of arbitrary bytes
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// topic-0 for an event signature such as `"Transfer(address,address,uint256)"`
pub fn event_topic(signature: &str) -> H256 {
    H256(keccak256(signature.as_bytes()))
}

/// 4-byte function selector for a signature such as `"mint(address,uint256)"`
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// A single ABI value, for encoding calls and as the result of decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(H160),
    Uint(U256),
    FixedBytes(H256),
    Bytes(Vec<u8>),
    String(String),
    Array(Vec<Token>),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        matches!(self, Token::Bytes(_) | Token::String(_) | Token::Array(_))
    }

    pub fn into_address(self) -> Option<H160> {
        match self {
            Token::Address(a) => Some(a),
            _ => None,
        }
    }

    pub fn into_uint(self) -> Option<U256> {
        match self {
            Token::Uint(u) => Some(u),
            _ => None,
        }
    }

    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Token::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            Token::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<Token>> {
        match self {
            Token::Array(items) => Some(items),
            _ => None,
        }
    }
}

/// Schema for one decoded field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Address,
    Uint,
    FixedBytes,
    Bytes,
    String,
    Array(Box<ParamType>),
}

impl ParamType {
    /// Arrays are always dynamic here (runtime length), as are bytes/string.
    fn is_dynamic(&self) -> bool {
        matches!(
            self,
            ParamType::Bytes | ParamType::String | ParamType::Array(_)
        )
    }
}

/// Encode a token tuple per the contract ABI head/tail scheme
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * 32;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&uint_word(U256::from(head_len + tail.len())));
            tail.extend_from_slice(&encode_single(token));
        } else {
            head.extend_from_slice(&encode_single(token));
        }
    }

    head.extend_from_slice(&tail);
    head
}

/// Selector-prefixed calldata for a function invocation
pub fn encode_call(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut out = selector(signature).to_vec();
    out.extend_from_slice(&encode(tokens));
    out
}

fn uint_word(value: U256) -> [u8; 32] {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    word
}

fn encode_single(token: &Token) -> Vec<u8> {
    match token {
        Token::Address(addr) => {
            let mut word = [0u8; 32];
            word[12..].copy_from_slice(addr.as_bytes());
            word.to_vec()
        }
        Token::Uint(value) => uint_word(*value).to_vec(),
        Token::FixedBytes(word) => word.as_bytes().to_vec(),
        Token::Bytes(bytes) => encode_len_prefixed(bytes),
        Token::String(text) => encode_len_prefixed(text.as_bytes()),
        Token::Array(items) => {
            let mut out = uint_word(U256::from(items.len())).to_vec();
            out.extend_from_slice(&encode(items));
            out
        }
    }
}

fn encode_len_prefixed(bytes: &[u8]) -> Vec<u8> {
    let mut out = uint_word(U256::from(bytes.len())).to_vec();
    out.extend_from_slice(bytes);
    let rem = bytes.len() % 32;
    if rem != 0 {
        out.extend(std::iter::repeat(0u8).take(32 - rem));
    }
    out
}

/// Decode a payload against a field schema.
///
/// Extra trailing data beyond the described fields is ignored; missing or
/// truncated data is an error.
pub fn decode(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>, DecodeError> {
    let mut tokens = Vec::with_capacity(types.len());
    for (i, ty) in types.iter().enumerate() {
        let slot = i * 32;
        if ty.is_dynamic() {
            let offset = read_offset(data, slot, "offset")?;
            tokens.push(decode_dynamic(ty, data, offset)?);
        } else {
            tokens.push(decode_static(ty, data, slot)?);
        }
    }
    Ok(tokens)
}

fn read_word(data: &[u8], offset: usize) -> Result<[u8; 32], DecodeError> {
    let end = offset
        .checked_add(32)
        .ok_or(DecodeError::Truncated(offset))?;
    if end > data.len() {
        return Err(DecodeError::Truncated(offset));
    }
    let mut word = [0u8; 32];
    word.copy_from_slice(&data[offset..end]);
    Ok(word)
}

/// Read a word that must fit within the payload when used as an offset or
/// length. Values beyond the payload size fail closed.
fn read_offset(data: &[u8], slot: usize, kind: &'static str) -> Result<usize, DecodeError> {
    let word = read_word(data, slot)?;
    let value = U256::from_big_endian(&word);
    if value > U256::from(data.len()) {
        return Err(DecodeError::OutOfRange {
            kind,
            value: value.low_u64(),
            len: data.len(),
        });
    }
    Ok(value.as_usize())
}

fn decode_static(ty: &ParamType, data: &[u8], slot: usize) -> Result<Token, DecodeError> {
    let word = read_word(data, slot)?;
    match ty {
        ParamType::Address => Ok(Token::Address(H160::from_slice(&word[12..]))),
        ParamType::Uint => Ok(Token::Uint(U256::from_big_endian(&word))),
        ParamType::FixedBytes => Ok(Token::FixedBytes(H256(word))),
        _ => unreachable!("dynamic type decoded as static"),
    }
}

fn decode_dynamic(ty: &ParamType, data: &[u8], offset: usize) -> Result<Token, DecodeError> {
    match ty {
        ParamType::Bytes => Ok(Token::Bytes(read_len_prefixed(data, offset)?)),
        ParamType::String => {
            let bytes = read_len_prefixed(data, offset)?;
            String::from_utf8(bytes)
                .map(Token::String)
                .map_err(|_| DecodeError::Utf8)
        }
        ParamType::Array(inner) => {
            let len = read_offset(data, offset, "array length")?;
            let frame_start = offset
                .checked_add(32)
                .ok_or(DecodeError::Truncated(offset))?;
            let frame = data
                .get(frame_start..)
                .ok_or(DecodeError::Truncated(frame_start))?;
            // every element owns one head slot; reject lengths the frame
            // cannot possibly hold before iterating
            let head_bytes = len.checked_mul(32).ok_or(DecodeError::OutOfRange {
                kind: "array length",
                value: len as u64,
                len: frame.len(),
            })?;
            if head_bytes > frame.len() {
                return Err(DecodeError::OutOfRange {
                    kind: "array length",
                    value: len as u64,
                    len: frame.len(),
                });
            }
            let mut items = Vec::with_capacity(len);
            for i in 0..len {
                let slot = i * 32;
                if inner.is_dynamic() {
                    let rel = read_offset(frame, slot, "offset")?;
                    items.push(decode_dynamic(inner, frame, rel)?);
                } else {
                    items.push(decode_static(inner, frame, slot)?);
                }
            }
            Ok(Token::Array(items))
        }
        _ => unreachable!("static type decoded as dynamic"),
    }
}

fn read_len_prefixed(data: &[u8], offset: usize) -> Result<Vec<u8>, DecodeError> {
    let len = read_offset(data, offset, "length")?;
    let start = offset
        .checked_add(32)
        .ok_or(DecodeError::Truncated(offset))?;
    let end = start.checked_add(len).ok_or(DecodeError::Truncated(start))?;
    if end > data.len() {
        return Err(DecodeError::OutOfRange {
            kind: "length",
            value: len as u64,
            len: data.len(),
        });
    }
    Ok(data[start..end].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_selector() {
        // canonical ERC-20 transfer selector
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn test_known_event_topic() {
        let topic = event_topic("Transfer(address,address,uint256)");
        assert_eq!(
            hex::encode(topic.as_bytes()),
            "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn test_static_tuple_round_trip() {
        let addr = H160::repeat_byte(0x11);
        let tokens = vec![Token::Address(addr), Token::Uint(U256::from(42u64))];
        let encoded = encode(&tokens);
        assert_eq!(encoded.len(), 64);

        let decoded = decode(&[ParamType::Address, ParamType::Uint], &encoded).unwrap();
        assert_eq!(decoded, tokens);
    }

    #[test]
    fn test_dynamic_fields_round_trip() {
        let tokens = vec![
            Token::String("Mint 1 GOV to me".to_string()),
            Token::Array(vec![
                Token::Bytes(vec![0xde, 0xad]),
                Token::Bytes(vec![0xbe, 0xef, 0x01]),
            ]),
            Token::Uint(U256::from(7u64)),
        ];
        let encoded = encode(&tokens);
        let decoded = decode(
            &[
                ParamType::String,
                ParamType::Array(Box::new(ParamType::Bytes)),
                ParamType::Uint,
            ],
            &encoded,
        )
        .unwrap();
        assert_eq!(decoded, tokens);
    }

    #[test]
    fn test_trailing_data_tolerated() {
        let mut encoded = encode(&[Token::Uint(U256::from(5u64))]);
        encoded.extend_from_slice(&[0u8; 64]);
        let decoded = decode(&[ParamType::Uint], &encoded).unwrap();
        assert_eq!(decoded, vec![Token::Uint(U256::from(5u64))]);
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let encoded = encode(&[Token::Uint(U256::one()), Token::Uint(U256::one())]);
        let result = decode(&[ParamType::Uint, ParamType::Uint], &encoded[..48]);
        assert!(matches!(result, Err(DecodeError::Truncated(_))));
    }

    #[test]
    fn test_wild_offset_rejected() {
        // offset word claiming the string lives far outside the payload
        let mut payload = [0u8; 32];
        payload[24..].copy_from_slice(&u64::MAX.to_be_bytes());
        let result = decode(&[ParamType::String], &payload);
        assert!(matches!(result, Err(DecodeError::OutOfRange { .. })));
    }

    #[test]
    fn test_oversized_array_length_rejected() {
        // array with a claimed length no frame could hold
        let mut payload = Vec::new();
        payload.extend_from_slice(&{
            let mut w = [0u8; 32];
            w[31] = 32; // offset to the array body
            w
        });
        payload.extend_from_slice(&{
            let mut w = [0u8; 32];
            w[24..].copy_from_slice(&(1u64 << 40).to_be_bytes());
            w
        });
        let result = decode(&[ParamType::Array(Box::new(ParamType::Uint))], &payload);
        assert!(matches!(result, Err(DecodeError::OutOfRange { .. })));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&uint_word(U256::from(32u64))); // offset
        payload.extend_from_slice(&uint_word(U256::from(2u64))); // length
        let mut body = [0u8; 32];
        body[0] = 0xff;
        body[1] = 0xfe;
        payload.extend_from_slice(&body);
        let result = decode(&[ParamType::String], &payload);
        assert_eq!(result, Err(DecodeError::Utf8));
    }
}
