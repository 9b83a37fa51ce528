use alloy_primitives::B256;
use inflow_primitives::accumulator;
use inflow_primitives::message::InboxMessage;

/// A message observed in the delayed inbox, paired with the accumulator
/// state it extends.
#[derive(Clone, Debug)]
pub struct DelayedInboxMessage {
    pub block_hash: B256,
    pub before_inbox_acc: B256,
    pub message: InboxMessage,
    pub parent_chain_block_number: u64,
}

impl DelayedInboxMessage {
    /// Accumulator after this message is appended.
    pub fn after_inbox_acc(&self) -> anyhow::Result<B256> {
        let serialized = self.message.serialize()?;
        Ok(accumulator::extend(self.before_inbox_acc, &serialized))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeBounds {
    pub min_timestamp: u64,
    pub max_timestamp: u64,
    pub min_block_number: u64,
    pub max_block_number: u64,
}

/// Where a batch's payload bytes live on the parent chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchDataLocation {
    TxInput,
    SeparateEvent,
    NoData,
    Blob,
}

impl BatchDataLocation {
    pub fn from_u8(raw: u8) -> anyhow::Result<Self> {
        match raw {
            0 => Ok(Self::TxInput),
            1 => Ok(Self::SeparateEvent),
            2 => Ok(Self::NoData),
            3 => Ok(Self::Blob),
            other => anyhow::bail!("unknown batch data location {other}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SequencerInboxBatch {
    pub sequence_number: u64,
    pub before_inbox_acc: B256,
    pub after_inbox_acc: B256,
    pub after_delayed_count: u64,
    pub after_delayed_acc: B256,
    pub time_bounds: TimeBounds,
    pub data_location: BatchDataLocation,
    pub parent_chain_block_number: u64,
    pub block_hash: B256,
    pub tx_hash: B256,
}

/// Length of the bounds header prefixed to every serialized batch.
pub const BATCH_HEADER_LEN: usize = 40;

impl SequencerInboxBatch {
    /// Full serialized batch message: the 40-byte bounds header followed
    /// by the payload read from the batch's data location.
    pub fn serialize_with_payload(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(BATCH_HEADER_LEN + payload.len());
        out.extend_from_slice(&self.time_bounds.min_timestamp.to_be_bytes());
        out.extend_from_slice(&self.time_bounds.max_timestamp.to_be_bytes());
        out.extend_from_slice(&self.time_bounds.min_block_number.to_be_bytes());
        out.extend_from_slice(&self.time_bounds.max_block_number.to_be_bytes());
        out.extend_from_slice(&self.after_delayed_count.to_be_bytes());
        out.extend_from_slice(payload);
        out
    }
}
