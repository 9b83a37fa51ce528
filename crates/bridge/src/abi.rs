//! Hand-rolled ABI helpers shared by the inbox contract adapters. Only the
//! handful of shapes the inbox events use, not a general codec.

use alloy_primitives::{keccak256, Address, B256, U256};
use anyhow::Result;
use std::str::FromStr;

pub fn selector(sig: &str) -> [u8; 4] {
    let h = keccak256(sig.as_bytes());
    [h[0], h[1], h[2], h[3]]
}

pub fn event_topic(sig: &str) -> B256 {
    keccak256(sig.as_bytes())
}

pub fn encode_u256(v: U256) -> [u8; 32] {
    v.to_be_bytes::<32>()
}

pub fn word_u256(word: &[u8]) -> Result<U256> {
    if word.len() < 32 {
        anyhow::bail!("short abi word: {} bytes", word.len());
    }
    Ok(U256::from_be_slice(&word[..32]))
}

pub fn word_b256(word: &[u8]) -> Result<B256> {
    if word.len() < 32 {
        anyhow::bail!("short abi word: {} bytes", word.len());
    }
    Ok(B256::from_slice(&word[..32]))
}

pub fn word_u64(word: &[u8]) -> Result<u64> {
    let v = word_u256(word)?;
    v.try_into()
        .map_err(|_| anyhow::anyhow!("abi word {v} out of u64 range"))
}

pub fn parse_hex_bytes(s: &str) -> Result<Vec<u8>> {
    Ok(hex::decode(s.trim_start_matches("0x"))?)
}

pub fn parse_hex_u64(s: &str) -> Result<u64> {
    Ok(u64::from_str_radix(s.trim_start_matches("0x"), 16)?)
}

pub fn parse_b256(s: &str) -> Result<B256> {
    Ok(B256::from_str(s)?)
}

/// Address packed into a 32-byte topic.
pub fn parse_address_topic(s: &str) -> Result<Address> {
    let bytes = parse_hex_bytes(s)?;
    if bytes.len() != 32 {
        anyhow::bail!("topic is {} bytes, expected 32", bytes.len());
    }
    Ok(Address::from_slice(&bytes[12..]))
}

/// Decodes a dynamic `bytes` value whose offset sits at head word
/// `word_index` of `data` (event data, or calldata with the selector
/// already stripped).
pub fn dynamic_bytes(data: &[u8], word_index: usize) -> Result<Vec<u8>> {
    let head = word_index * 32;
    let offset: usize = word_u256(data.get(head..).unwrap_or_default())?
        .try_into()
        .map_err(|_| anyhow::anyhow!("abi offset out of range"))?;
    let len: usize = word_u256(data.get(offset..).unwrap_or_default())?
        .try_into()
        .map_err(|_| anyhow::anyhow!("abi length out of range"))?;
    let start = offset + 32;
    let end = start
        .checked_add(len)
        .ok_or_else(|| anyhow::anyhow!("abi length overflow"))?;
    if data.len() < end {
        anyhow::bail!("abi bytes truncated: want {end}, have {}", data.len());
    }
    Ok(data[start..end].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_bytes_decodes_offset_and_length() {
        // one head word pointing at a 3-byte payload
        let mut data = Vec::new();
        data.extend_from_slice(&encode_u256(U256::from(32u64)));
        data.extend_from_slice(&encode_u256(U256::from(3u64)));
        let mut tail = [0u8; 32];
        tail[..3].copy_from_slice(&[1, 2, 3]);
        data.extend_from_slice(&tail);
        assert_eq!(dynamic_bytes(&data, 0).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn dynamic_bytes_rejects_truncation() {
        let mut data = Vec::new();
        data.extend_from_slice(&encode_u256(U256::from(32u64)));
        data.extend_from_slice(&encode_u256(U256::from(64u64)));
        assert!(dynamic_bytes(&data, 0).is_err());
    }
}
