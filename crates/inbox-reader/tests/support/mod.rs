#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_util::sync::CancellationToken;

use inflow_bridge::traits::{
    DelayedBridge, HeaderReader, L1Header, SequencerInbox, Unsubscribe,
};
use inflow_bridge::types::{
    BatchDataLocation, DelayedInboxMessage, SequencerInboxBatch, TimeBounds,
};
use inflow_db_sled::SledDb;
use inflow_inbox::tracker::InboxTracker;
use inflow_inbox_reader::reader::{InboxReader, InboxReaderConfig};
use inflow_primitives::accumulator;
use inflow_primitives::message::{kinds, InboxMessage, InboxMessageHeader};

#[derive(Default)]
pub struct ChainState {
    pub height: u64,
    pub delayed: Vec<DelayedInboxMessage>,
    pub batches: Vec<SequencerInboxBatch>,
}

pub struct HideDelayed {
    pub seq_num: u64,
    pub until_call: u64,
}

/// In-memory parent chain presenting historical views by block height.
pub struct MockChain {
    state: Mutex<ChainState>,
    head_txs: Mutex<Vec<Sender<L1Header>>>,
    pub max_lookup_to: AtomicU64,
    delayed_lookup_calls: AtomicU64,
    hide_delayed: Mutex<Option<HideDelayed>>,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ChainState::default()),
            head_txs: Mutex::new(Vec::new()),
            max_lookup_to: AtomicU64::new(0),
            delayed_lookup_calls: AtomicU64::new(0),
            hide_delayed: Mutex::new(None),
        })
    }

    pub fn with_state(&self, f: impl FnOnce(&mut ChainState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn set_height(&self, height: u64) {
        self.state.lock().unwrap().height = height;
        for tx in self.head_txs.lock().unwrap().iter() {
            let _ = tx.try_send(L1Header { number: height });
        }
    }

    /// Hides delayed message `seq_num` from range lookups until the
    /// `until_call`-th lookup, emulating a lagging log index.
    pub fn hide_delayed_until(&self, seq_num: u64, until_call: u64) {
        *self.hide_delayed.lock().unwrap() = Some(HideDelayed { seq_num, until_call });
    }

    fn note_lookup_to(&self, to_block: u64) {
        self.max_lookup_to.fetch_max(to_block, Ordering::SeqCst);
    }
}

#[async_trait]
impl DelayedBridge for MockChain {
    async fn get_message_count(&self, block_number: u64) -> anyhow::Result<u64> {
        let state = self.state.lock().unwrap();
        Ok(state
            .delayed
            .iter()
            .filter(|m| m.parent_chain_block_number <= block_number)
            .count() as u64)
    }

    async fn get_accumulator(&self, seq_num: u64, _block_number: u64) -> anyhow::Result<B256> {
        let state = self.state.lock().unwrap();
        let msg = state
            .delayed
            .get(seq_num as usize)
            .ok_or_else(|| anyhow::anyhow!("delayed message {seq_num} out of range"))?;
        msg.after_inbox_acc()
    }

    async fn lookup_messages_in_range(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> anyhow::Result<Vec<DelayedInboxMessage>> {
        self.note_lookup_to(to_block);
        let call = self.delayed_lookup_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let hide = self.hide_delayed.lock().unwrap();
        let state = self.state.lock().unwrap();
        Ok(state
            .delayed
            .iter()
            .filter(|m| {
                m.parent_chain_block_number >= from_block
                    && m.parent_chain_block_number <= to_block
            })
            .filter(|m| match hide.as_ref() {
                Some(h) => {
                    call >= h.until_call
                        || m.message.header.seq_num().ok() != Some(h.seq_num)
                }
                None => true,
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SequencerInbox for MockChain {
    async fn get_batch_count(&self, block_number: u64) -> anyhow::Result<u64> {
        let state = self.state.lock().unwrap();
        Ok(state
            .batches
            .iter()
            .filter(|b| b.parent_chain_block_number <= block_number)
            .count() as u64)
    }

    async fn get_accumulator(&self, seq_num: u64, _block_number: u64) -> anyhow::Result<B256> {
        let state = self.state.lock().unwrap();
        let batch = state
            .batches
            .get(seq_num as usize)
            .ok_or_else(|| anyhow::anyhow!("batch {seq_num} out of range"))?;
        Ok(batch.after_inbox_acc)
    }

    async fn lookup_batches_in_range(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> anyhow::Result<Vec<SequencerInboxBatch>> {
        self.note_lookup_to(to_block);
        let state = self.state.lock().unwrap();
        Ok(state
            .batches
            .iter()
            .filter(|b| {
                b.parent_chain_block_number >= from_block
                    && b.parent_chain_block_number <= to_block
            })
            .cloned()
            .collect())
    }

    async fn batch_payload(&self, _batch: &SequencerInboxBatch) -> anyhow::Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl HeaderReader for MockChain {
    async fn last_header(&self) -> anyhow::Result<L1Header> {
        Ok(L1Header {
            number: self.state.lock().unwrap().height,
        })
    }

    async fn subscribe(&self) -> (Receiver<L1Header>, Unsubscribe) {
        let (tx, rx) = mpsc::channel(64);
        self.head_txs.lock().unwrap().push(tx);
        (rx, Box::new(|| {}))
    }
}

pub fn make_delayed_raw(
    seq_num: u64,
    block: u64,
    before_inbox_acc: B256,
    kind: u8,
    body: Vec<u8>,
) -> DelayedInboxMessage {
    DelayedInboxMessage {
        block_hash: B256::repeat_byte(0x11),
        before_inbox_acc,
        message: InboxMessage {
            header: InboxMessageHeader {
                kind,
                poster: Address::ZERO,
                block_number: block,
                timestamp: 1000 + seq_num,
                request_id: Some(B256::from(U256::from(seq_num))),
                base_fee: U256::ZERO,
            },
            body,
        },
        parent_chain_block_number: block,
    }
}

pub fn make_init_message(chain_id: u64, block: u64) -> DelayedInboxMessage {
    let body = B256::from(U256::from(chain_id)).to_vec();
    make_delayed_raw(0, block, B256::ZERO, kinds::INIT, body)
}

pub fn make_delayed(seq_num: u64, block: u64, before: B256, body: &[u8]) -> DelayedInboxMessage {
    make_delayed_raw(seq_num, block, before, kinds::L2_MESSAGE, body.to_vec())
}

/// Batch with a deterministic after-accumulator derived from `salt`, so
/// tests can model two competing versions of the same batch.
pub fn make_batch(
    seq_num: u64,
    block: u64,
    before: B256,
    salt: u8,
    after_delayed_count: u64,
    after_delayed_acc: B256,
) -> SequencerInboxBatch {
    let mut marker = seq_num.to_be_bytes().to_vec();
    marker.push(salt);
    SequencerInboxBatch {
        sequence_number: seq_num,
        before_inbox_acc: before,
        after_inbox_acc: accumulator::extend(before, &marker),
        after_delayed_count,
        after_delayed_acc,
        time_bounds: TimeBounds::default(),
        data_location: BatchDataLocation::NoData,
        parent_chain_block_number: block,
        block_hash: B256::ZERO,
        tx_hash: B256::ZERO,
    }
}

pub struct TestSetup {
    pub chain: Arc<MockChain>,
    pub tracker: Arc<InboxTracker<SledDb>>,
    pub reader: Arc<InboxReader<SledDb>>,
    pub cancel: CancellationToken,
    _dir: tempfile::TempDir,
}

pub fn setup(
    chain: Arc<MockChain>,
    first_message_block: u64,
    chain_id: u64,
    config: InboxReaderConfig,
) -> TestSetup {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(SledDb::open(dir.path().to_str().unwrap()).unwrap());
    let tracker = Arc::new(InboxTracker::new(db));
    tracker.initialize().unwrap();
    let reader = Arc::new(InboxReader::new(
        tracker.clone(),
        chain.clone(),
        chain.clone(),
        chain.clone(),
        first_message_block,
        chain_id,
        config,
    ));
    TestSetup {
        chain,
        tracker,
        reader,
        cancel: CancellationToken::new(),
        _dir: dir,
    }
}

pub async fn wait_for(deadline: Duration, f: impl Fn() -> bool) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if f() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    f()
}
