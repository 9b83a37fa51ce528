use alloy_primitives::{Address, B256, U256};
use anyhow::{anyhow, bail};
use std::io::{Cursor, Read};

/// Parent-chain message kinds understood by the inbox.
pub mod kinds {
    pub const L2_MESSAGE: u8 = 3;
    pub const INIT: u8 = 11;
    pub const ETH_DEPOSIT: u8 = 12;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboxMessageHeader {
    pub kind: u8,
    pub poster: Address,
    pub block_number: u64,
    pub timestamp: u64,
    pub request_id: Option<B256>,
    pub base_fee: U256,
}

impl InboxMessageHeader {
    /// Sequence number of a delayed message, carried in its request id.
    pub fn seq_num(&self) -> anyhow::Result<u64> {
        let Some(req) = self.request_id else {
            return Err(anyhow!("message has no request id"));
        };
        let n = U256::from_be_bytes(req.0);
        if n > U256::from(u64::MAX) {
            return Err(anyhow!("request id {} out of sequence number range", n));
        }
        Ok(n.to::<u64>())
    }
}

/// A message posted to the child chain through the parent chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboxMessage {
    pub header: InboxMessageHeader,
    pub body: Vec<u8>,
}

fn read_exact<const N: usize>(r: &mut Cursor<&[u8]>) -> anyhow::Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

impl InboxMessage {
    /// Flat wire form, also the accumulator preimage:
    /// kind || poster(32) || block_number(8) || timestamp(8) || request_id(32)
    /// || base_fee(32) || body.
    pub fn serialize(&self) -> anyhow::Result<Vec<u8>> {
        let Some(req) = self.header.request_id else {
            bail!("cannot serialize message without request id");
        };
        let mut out = Vec::with_capacity(1 + 32 + 8 + 8 + 32 + 32 + self.body.len());
        out.push(self.header.kind);
        out.extend_from_slice(&[0u8; 12]);
        out.extend_from_slice(self.header.poster.as_slice());
        out.extend_from_slice(&self.header.block_number.to_be_bytes());
        out.extend_from_slice(&self.header.timestamp.to_be_bytes());
        out.extend_from_slice(req.as_slice());
        out.extend_from_slice(&self.header.base_fee.to_be_bytes::<32>());
        out.extend_from_slice(&self.body);
        Ok(out)
    }

    pub fn parse(bytes: &[u8]) -> anyhow::Result<Self> {
        let mut rdr = Cursor::new(bytes);
        let kind = read_exact::<1>(&mut rdr)?[0];
        let poster32 = read_exact::<32>(&mut rdr)?;
        let poster = Address::from_slice(&poster32[12..]);
        let block_number = u64::from_be_bytes(read_exact::<8>(&mut rdr)?);
        let timestamp = u64::from_be_bytes(read_exact::<8>(&mut rdr)?);
        let request_id = Some(B256::from(read_exact::<32>(&mut rdr)?));
        let base_fee = U256::from_be_bytes(read_exact::<32>(&mut rdr)?);
        let mut body = Vec::new();
        rdr.read_to_end(&mut body)?;
        Ok(Self {
            header: InboxMessageHeader {
                kind,
                poster,
                block_number,
                timestamp,
                request_id,
                base_fee,
            },
            body,
        })
    }

    /// Delayed message 0 initializes the chain; its body opens with the
    /// child chain id as a big-endian word.
    pub fn parse_init_message(&self) -> anyhow::Result<u64> {
        if self.header.kind != kinds::INIT {
            bail!(
                "message kind {} is not an init message (expected {})",
                self.header.kind,
                kinds::INIT
            );
        }
        if self.body.len() < 32 {
            bail!("init message body too short: {} bytes", self.body.len());
        }
        let chain_id = U256::from_be_slice(&self.body[..32]);
        if chain_id > U256::from(u64::MAX) {
            bail!("init message chain id {} out of range", chain_id);
        }
        Ok(chain_id.to::<u64>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(kind: u8, seq: u64, body: Vec<u8>) -> InboxMessage {
        InboxMessage {
            header: InboxMessageHeader {
                kind,
                poster: Address::repeat_byte(0xaa),
                block_number: 42,
                timestamp: 1_700_000_000,
                request_id: Some(B256::from(U256::from(seq))),
                base_fee: U256::from(7u64),
            },
            body,
        }
    }

    #[test]
    fn wire_form_round_trips() {
        let m = msg(kinds::L2_MESSAGE, 5, vec![1, 2, 3]);
        let bytes = m.serialize().unwrap();
        let back = InboxMessage::parse(&bytes).unwrap();
        assert_eq!(back, m);
        assert_eq!(back.header.seq_num().unwrap(), 5);
    }

    #[test]
    fn init_message_yields_chain_id() {
        let m = msg(kinds::INIT, 0, B256::from(U256::from(412346u64)).to_vec());
        assert_eq!(m.parse_init_message().unwrap(), 412346);
    }

    #[test]
    fn init_parse_rejects_wrong_kind() {
        let m = msg(kinds::L2_MESSAGE, 0, B256::from(U256::from(1u64)).to_vec());
        assert!(m.parse_init_message().is_err());
    }

    #[test]
    fn serialize_requires_request_id() {
        let mut m = msg(kinds::L2_MESSAGE, 0, vec![]);
        m.header.request_id = None;
        assert!(m.serialize().is_err());
    }
}
