use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use anyhow::bail;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use inflow_bridge::traits::{DelayedBridge, HeaderReader, SequencerInbox, SubscriptionGuard};
use inflow_bridge::types::{DelayedInboxMessage, SequencerInboxBatch};
use inflow_inbox::db::Database;
use inflow_inbox::error::{is_accumulator_not_found, is_delayed_messages_mismatch};
use inflow_inbox::tracker::InboxTracker;

/// Parent-chain blocks covered by one range query during a scan.
const BLOCKS_TO_FETCH: u64 = 100;
/// How far a scan retreats per attempt when hunting for a reorg point.
const REORG_STEP_BLOCKS: u64 = 10;
/// Pause before the next pass after a pass fails.
const RETRY_DELAY: Duration = Duration::from_secs(1);
/// Bootstrap gate: poll cadence and attempt limit for the init message.
const INIT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const INIT_POLL_ATTEMPTS: u32 = 300;

#[derive(Clone, Debug)]
pub struct InboxReaderConfig {
    /// Most-recent parent-chain blocks to ignore, reducing reorg exposure.
    pub delay_blocks: u64,
    /// Maximum time to wait between inbox checks when no new blocks arrive.
    pub check_delay: Duration,
    /// Erase future tracker entries when the parent chain shows fewer, in
    /// addition to overwriting on direct mismatch.
    pub hard_reorg: bool,
    /// Minimum new-block advance before reading, to batch work when caught
    /// up.
    pub min_blocks_to_read: u64,
}

impl Default for InboxReaderConfig {
    fn default() -> Self {
        Self {
            delay_blocks: 0,
            check_delay: Duration::from_secs(60),
            hard_reorg: false,
            min_blocks_to_read: 1,
        }
    }
}

impl InboxReaderConfig {
    pub fn test() -> Self {
        Self {
            check_delay: Duration::from_millis(10),
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Default)]
struct LastRead {
    block: u64,
    batch_count: u64,
}

/// Tracks the batch count observed on the parent chain this run. Mirrored
/// to the shared atomic before last-read state is published, so a reader
/// that loads last-read and then seen always observes seen >= last-read.
#[derive(Default)]
struct SeenBatchCount {
    value: u64,
    stored: Option<u64>,
}

impl SeenBatchCount {
    fn store(&mut self, slot: &AtomicU64) {
        if self.stored != Some(self.value) {
            slot.store(self.value, Ordering::SeqCst);
            self.stored = Some(self.value);
        }
    }
}

/// Drives the inbox tracker from parent-chain state: paces against the
/// head, fetches both inbox streams in block ranges, verifies accumulator
/// chaining, and walks back into the past when the chain reorgs out from
/// under the tracker.
pub struct InboxReader<D: Database> {
    tracker: Arc<InboxTracker<D>>,
    delayed_bridge: Arc<dyn DelayedBridge>,
    sequencer_inbox: Arc<dyn SequencerInbox>,
    header_reader: Arc<dyn HeaderReader>,
    first_message_block: u64,
    chain_id: u64,
    config: InboxReaderConfig,

    started: AtomicBool,
    caught_up: AtomicBool,
    caught_up_tx: Sender<bool>,
    caught_up_rx: Mutex<Option<Receiver<bool>>>,

    last_seen_batch_count: AtomicU64,
    last_read: RwLock<LastRead>,
}

impl<D: Database + 'static> InboxReader<D> {
    pub fn new(
        tracker: Arc<InboxTracker<D>>,
        delayed_bridge: Arc<dyn DelayedBridge>,
        sequencer_inbox: Arc<dyn SequencerInbox>,
        header_reader: Arc<dyn HeaderReader>,
        first_message_block: u64,
        chain_id: u64,
        config: InboxReaderConfig,
    ) -> Self {
        let (caught_up_tx, caught_up_rx) = mpsc::channel(1);
        Self {
            tracker,
            delayed_bridge,
            sequencer_inbox,
            header_reader,
            first_message_block,
            chain_id,
            config,
            started: AtomicBool::new(false),
            caught_up: AtomicBool::new(false),
            caught_up_tx,
            caught_up_rx: Mutex::new(Some(caught_up_rx)),
            last_seen_batch_count: AtomicU64::new(0),
            last_read: RwLock::new(LastRead::default()),
        }
    }

    /// Launches the reader loop, then holds the caller back until the
    /// tracker contains the init message and it names the configured chain.
    /// Downstream subsystems must not start against a chain that never
    /// initialized or belongs to someone else.
    pub async fn start(self: Arc<Self>, cancel: CancellationToken) -> anyhow::Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            bail!("inbox reader already started");
        }
        let reader = self.clone();
        let loop_cancel = cancel.clone();
        tokio::spawn(async move { reader.run_loop(loop_cancel).await });

        for attempt in 0..=INIT_POLL_ATTEMPTS {
            let batch_count = self.tracker.get_batch_count()?;
            if batch_count > 0 {
                let message = self.tracker.get_delayed_message(0)?;
                let init_chain_id = message.parse_init_message()?;
                if init_chain_id != self.chain_id {
                    bail!(
                        "expected chain id {} but read chain id {} from init message in parent chain inbox",
                        self.chain_id,
                        init_chain_id
                    );
                }
                return Ok(());
            }
            if attempt == INIT_POLL_ATTEMPTS {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(INIT_POLL_INTERVAL) => {}
            }
        }
        bail!("failed to read init message")
    }

    async fn run_loop(&self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            if let Err(err) = self.run(&cancel).await {
                if !err.to_string().contains("header not found") {
                    warn!("error reading inbox: {err:#}");
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(RETRY_DELAY) => {}
            }
        }
    }

    async fn run(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        let mut seen = SeenBatchCount::default();
        let res = self.run_passes(cancel, &mut seen).await;
        // Publish the final observation even on the error path.
        seen.store(&self.last_seen_batch_count);
        res
    }

    async fn run_passes(
        &self,
        cancel: &CancellationToken,
        seen: &mut SeenBatchCount,
    ) -> anyhow::Result<()> {
        let mut from = self.next_block_to_read()?;
        let (mut new_headers, unsubscribe) = self.header_reader.subscribe().await;
        let _subscription = SubscriptionGuard::new(unsubscribe);
        let needed_block_advance =
            self.config.delay_blocks + self.config.min_blocks_to_read.saturating_sub(1);

        loop {
            let latest_header = self.header_reader.last_header().await?;
            let mut current_height = latest_header.number;

            let needed_height = from.saturating_add(needed_block_advance);
            let check_delay = tokio::time::sleep(self.config.check_delay);
            tokio::pin!(check_delay);
            while current_height < needed_height {
                tokio::select! {
                    header = new_headers.recv() => {
                        match header {
                            Some(header) => current_height = header.number,
                            // Subscription closed: shutting down.
                            None => return Ok(()),
                        }
                    }
                    _ = cancel.cancelled() => return Ok(()),
                    _ = &mut check_delay => break,
                }
            }

            if self.config.delay_blocks > 0 {
                current_height = current_height
                    .saturating_sub(self.config.delay_blocks)
                    .max(self.first_message_block);
            }

            let mut missing_delayed = false;
            let mut reorging_delayed = false;
            let mut missing_sequencer = false;
            let mut reorging_sequencer = false;

            {
                let mut checking_delayed_count = self
                    .delayed_bridge
                    .get_message_count(current_height)
                    .await?;
                let our_delayed_count = self.tracker.get_delayed_count()?;
                if our_delayed_count < checking_delayed_count {
                    checking_delayed_count = our_delayed_count;
                    missing_delayed = true;
                } else if our_delayed_count > checking_delayed_count && self.config.hard_reorg {
                    info!(
                        "backwards reorg of delayed messages from {our_delayed_count} to {checking_delayed_count}"
                    );
                    self.tracker.reorg_delayed_to(checking_delayed_count)?;
                }
                if checking_delayed_count > 0 {
                    let seq_num = checking_delayed_count - 1;
                    let l1_acc = self
                        .delayed_bridge
                        .get_accumulator(seq_num, current_height)
                        .await?;
                    let db_acc = self.tracker.get_delayed_acc(seq_num)?;
                    if db_acc != l1_acc {
                        reorging_delayed = true;
                    }
                }
            }

            seen.value = match self.sequencer_inbox.get_batch_count(current_height).await {
                Ok(count) => count,
                Err(err) => {
                    seen.value = 0;
                    return Err(err);
                }
            };
            let mut checking_batch_count = seen.value;
            {
                let our_batch_count = self.tracker.get_batch_count()?;
                if our_batch_count < checking_batch_count {
                    checking_batch_count = our_batch_count;
                    missing_sequencer = true;
                } else if our_batch_count > checking_batch_count && self.config.hard_reorg {
                    info!(
                        "backwards reorg of sequencer batches from {our_batch_count} to {checking_batch_count}"
                    );
                    self.tracker.reorg_batches_to(checking_batch_count)?;
                }
                if checking_batch_count > 0 {
                    let seq_num = checking_batch_count - 1;
                    let l1_acc = self
                        .sequencer_inbox
                        .get_accumulator(seq_num, current_height)
                        .await?;
                    let db_acc = self.tracker.get_batch_acc(seq_num)?;
                    if db_acc != l1_acc {
                        reorging_sequencer = true;
                    }
                }
            }

            if !missing_delayed && !reorging_delayed && !missing_sequencer && !reorging_sequencer {
                // Nothing to do this pass.
                from = current_height + 1;
                seen.store(&self.last_seen_batch_count);
                self.publish_last_read(current_height, checking_batch_count);
                continue;
            }

            let mut read_any_batches = false;
            loop {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                if from > current_height {
                    // Anything still missing must be further in the past.
                    if missing_delayed {
                        reorging_delayed = true;
                    }
                    if missing_sequencer {
                        reorging_sequencer = true;
                    }
                    if !reorging_delayed && !reorging_sequencer {
                        break;
                    }
                    from = current_height;
                }
                let to = (from + BLOCKS_TO_FETCH).min(current_height);
                let delayed_messages = self
                    .delayed_bridge
                    .lookup_messages_in_range(from, to)
                    .await?;
                let mut sequencer_batches = self
                    .sequencer_inbox
                    .lookup_batches_in_range(from, to)
                    .await?;
                if to == current_height && !self.caught_up.load(Ordering::SeqCst) {
                    self.caught_up.store(true, Ordering::SeqCst);
                    let _ = self.caught_up_tx.try_send(true);
                }

                if !sequencer_batches.is_empty() {
                    missing_sequencer = false;
                    reorging_sequencer = false;
                    let first_batch = &sequencer_batches[0];
                    if first_batch.sequence_number > 0 {
                        match self.tracker.get_batch_acc(first_batch.sequence_number - 1) {
                            Ok(have_acc) => {
                                if have_acc != first_batch.before_inbox_acc {
                                    reorging_sequencer = true;
                                }
                            }
                            Err(err) if is_accumulator_not_found(&err) => {
                                reorging_sequencer = true;
                            }
                            Err(err) => return Err(err),
                        }
                    }
                    if !reorging_sequencer {
                        // Drop the prefix of batches the tracker already has.
                        let mut skip = 0;
                        while skip < sequencer_batches.len() {
                            let batch = &sequencer_batches[skip];
                            match self.tracker.get_batch_acc(batch.sequence_number) {
                                // This batch is new.
                                Err(err) if is_accumulator_not_found(&err) => break,
                                Err(err) => return Err(err),
                                Ok(have_acc) if have_acc == batch.before_inbox_acc => skip += 1,
                                // The chain check passed but this batch
                                // diverges; the apply below reorgs it.
                                Ok(_) => break,
                            }
                        }
                        sequencer_batches.drain(..skip);
                    }
                } else if missing_sequencer && to >= current_height {
                    // Missing batches that never showed up in the scan must
                    // be in the past.
                    reorging_sequencer = true;
                }

                if !delayed_messages.is_empty() {
                    missing_delayed = false;
                    reorging_delayed = false;
                    let first_msg = &delayed_messages[0];
                    let before_acc = first_msg.before_inbox_acc;
                    let before_count = first_msg.message.header.seq_num()?;
                    if before_count > 0 {
                        match self.tracker.get_delayed_acc(before_count - 1) {
                            Ok(have_acc) => {
                                if have_acc != before_acc {
                                    reorging_delayed = true;
                                }
                            }
                            Err(err) if is_accumulator_not_found(&err) => {
                                reorging_delayed = true;
                            }
                            Err(err) => return Err(err),
                        }
                    }
                } else if missing_delayed && to >= current_height {
                    reorging_delayed = true;
                }

                trace!(
                    "looking up messages from {from} to {to}, reorging_delayed={reorging_delayed} reorging_sequencer={reorging_sequencer}"
                );
                if !reorging_delayed
                    && !reorging_sequencer
                    && (!delayed_messages.is_empty() || !sequencer_batches.is_empty())
                {
                    let last_batch_seq_num =
                        sequencer_batches.last().map(|b| b.sequence_number);
                    let delayed_mismatch =
                        self.add_messages(&sequencer_batches, &delayed_messages)?;
                    if delayed_mismatch {
                        reorging_delayed = true;
                    } else if let Some(last_seq_num) = last_batch_seq_num {
                        read_any_batches = true;
                        seen.store(&self.last_seen_batch_count);
                        self.publish_last_read(to, last_seq_num + 1);
                    }
                }
                if reorging_delayed || reorging_sequencer {
                    from = prev_block_for_reorg(from, self.first_message_block)?;
                } else {
                    from = to + 1;
                }
            }

            if !read_any_batches {
                seen.store(&self.last_seen_batch_count);
                self.publish_last_read(current_height, checking_batch_count);
            }
        }
    }

    /// Applies a fetched bundle, delayed messages first since batch
    /// verification reads the delayed accumulators. A delayed shortfall is
    /// reported to the caller, not surfaced as an error.
    fn add_messages(
        &self,
        sequencer_batches: &[SequencerInboxBatch],
        delayed_messages: &[DelayedInboxMessage],
    ) -> anyhow::Result<bool> {
        self.tracker.add_delayed_messages(delayed_messages)?;
        match self.tracker.add_sequencer_batches(sequencer_batches) {
            Ok(()) => Ok(false),
            Err(err) if is_delayed_messages_mismatch(&err) => Ok(true),
            Err(err) => Err(err),
        }
    }

    fn next_block_to_read(&self) -> anyhow::Result<u64> {
        let delayed_count = self.tracker.get_delayed_count()?;
        if delayed_count == 0 {
            return Ok(self.first_message_block);
        }
        let msg = self.tracker.get_delayed_message(delayed_count - 1)?;
        Ok(msg.header.block_number.max(self.first_message_block))
    }

    fn publish_last_read(&self, block: u64, batch_count: u64) {
        let mut last_read = self.last_read.write().unwrap();
        last_read.block = block;
        last_read.batch_count = batch_count;
    }

    /// Re-reads a stored batch's serialized bytes from the parent chain.
    pub async fn get_sequencer_message_bytes(&self, seq_num: u64) -> anyhow::Result<Vec<u8>> {
        let metadata = self.tracker.get_batch_metadata(seq_num)?;
        let block = metadata.parent_chain_block;
        let batches = self
            .sequencer_inbox
            .lookup_batches_in_range(block, block)
            .await?;
        for batch in &batches {
            if batch.sequence_number == seq_num {
                let payload = self.sequencer_inbox.batch_payload(batch).await?;
                return Ok(batch.serialize_with_payload(&payload));
            }
        }
        bail!("sequencer batch {seq_num} not found at parent chain block {block}")
    }

    pub fn tracker(&self) -> Arc<InboxTracker<D>> {
        self.tracker.clone()
    }

    pub fn delayed_bridge(&self) -> Arc<dyn DelayedBridge> {
        self.delayed_bridge.clone()
    }

    pub fn get_last_read_block_and_batch_count(&self) -> (u64, u64) {
        let last_read = self.last_read.read().unwrap();
        (last_read.block, last_read.batch_count)
    }

    /// Last batch count seen on the parent chain; 0 until a pass has
    /// observed one, and reset to 0 when a pass fails to observe one.
    pub fn get_last_seen_batch_count(&self) -> u64 {
        self.last_seen_batch_count.load(Ordering::SeqCst)
    }

    pub fn get_delay_blocks(&self) -> u64 {
        self.config.delay_blocks
    }

    /// One-shot signal fired the first time a scan reaches the current
    /// height. The receiver can be taken once.
    pub fn caught_up_channel(&self) -> Option<Receiver<bool>> {
        self.caught_up_rx.lock().unwrap().take()
    }
}

/// Next earlier block to retry from once divergence was detected at `from`.
fn prev_block_for_reorg(from: u64, first_message_block: u64) -> anyhow::Result<u64> {
    if from <= first_message_block {
        bail!("can't get older messages");
    }
    Ok(from
        .saturating_sub(REORG_STEP_BLOCKS)
        .max(first_message_block))
}
