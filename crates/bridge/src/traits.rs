use crate::types::{DelayedInboxMessage, SequencerInboxBatch};
use alloy_primitives::B256;
use async_trait::async_trait;
use tokio::sync::mpsc::Receiver;

/// A parent-chain block header, reduced to what the reader paces against.
#[derive(Clone, Copy, Debug)]
pub struct L1Header {
    pub number: u64,
}

/// View of the delayed inbox contract at historical parent-chain heights.
#[async_trait]
pub trait DelayedBridge: Send + Sync {
    async fn get_message_count(&self, block_number: u64) -> anyhow::Result<u64>;
    async fn get_accumulator(&self, seq_num: u64, block_number: u64) -> anyhow::Result<B256>;
    async fn lookup_messages_in_range(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> anyhow::Result<Vec<DelayedInboxMessage>>;
}

/// View of the sequencer inbox contract at historical parent-chain heights.
#[async_trait]
pub trait SequencerInbox: Send + Sync {
    async fn get_batch_count(&self, block_number: u64) -> anyhow::Result<u64>;
    async fn get_accumulator(&self, seq_num: u64, block_number: u64) -> anyhow::Result<B256>;
    async fn lookup_batches_in_range(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> anyhow::Result<Vec<SequencerInboxBatch>>;
    /// Reads the batch's payload bytes from wherever its data location
    /// points. Separate from the range lookup so scans stay cheap.
    async fn batch_payload(&self, batch: &SequencerInboxBatch) -> anyhow::Result<Vec<u8>>;
}

pub type Unsubscribe = Box<dyn FnOnce() + Send>;

#[async_trait]
pub trait HeaderReader: Send + Sync {
    async fn last_header(&self) -> anyhow::Result<L1Header>;
    /// New-head notifications. Dropping the unsubscribe fn leaks the
    /// subscription; hold it in a [`SubscriptionGuard`].
    async fn subscribe(&self) -> (Receiver<L1Header>, Unsubscribe);
}

/// Releases a header subscription when dropped.
pub struct SubscriptionGuard(Option<Unsubscribe>);

impl SubscriptionGuard {
    pub fn new(unsubscribe: Unsubscribe) -> Self {
        Self(Some(unsubscribe))
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.0.take() {
            unsubscribe();
        }
    }
}
