use crate::db::{Batch, Database};
use crate::error::{is_accumulator_not_found, TrackerError};
use crate::util::delete_starting_at;
use alloy_primitives::B256;
use alloy_rlp::Decodable;
use inflow_bridge::types::{DelayedInboxMessage, SequencerInboxBatch};
use inflow_primitives::dbkeys::*;
use inflow_primitives::message::InboxMessage;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

const BATCH_META_CACHE_SIZE: usize = 1000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchMetadata {
    pub accumulator: B256,
    pub delayed_message_count: u64,
    pub parent_chain_block: u64,
}

/// Persistent, reorg-aware store of both inbox streams. Appends verify the
/// accumulator chain; truncations cascade from the delayed stream into the
/// batches that consumed it.
pub struct InboxTracker<D: Database> {
    db: Arc<D>,
    batch_meta_cache: Mutex<lru::LruCache<u64, BatchMetadata>>,
}

impl<D: Database> InboxTracker<D> {
    pub fn new(db: Arc<D>) -> Self {
        Self {
            db,
            batch_meta_cache: Mutex::new(lru::LruCache::new(
                NonZeroUsize::new(BATCH_META_CACHE_SIZE).unwrap(),
            )),
        }
    }

    pub fn initialize(&self) -> anyhow::Result<()> {
        if self.db.has(SCHEMA_VERSION_KEY)? {
            let data = self.db.get(SCHEMA_VERSION_KEY)?;
            let version = u64::decode(&mut &data[..])?;
            if version != CURRENT_SCHEMA_VERSION {
                anyhow::bail!(
                    "unsupported inbox db schema version {version} (expected {CURRENT_SCHEMA_VERSION})"
                );
            }
            return Ok(());
        }
        let mut batch = self.db.new_batch();
        batch.put(SCHEMA_VERSION_KEY, &alloy_rlp::encode(CURRENT_SCHEMA_VERSION))?;
        if !self.db.has(DELAYED_COUNT_KEY)? {
            batch.put(DELAYED_COUNT_KEY, &alloy_rlp::encode(0u64))?;
        }
        if !self.db.has(BATCH_COUNT_KEY)? {
            batch.put(BATCH_COUNT_KEY, &alloy_rlp::encode(0u64))?;
        }
        batch.write()?;
        Ok(())
    }

    fn stored_count(&self, key: &[u8]) -> anyhow::Result<u64> {
        let data = self.db.get(key)?;
        Ok(u64::decode(&mut &data[..])?)
    }

    pub fn get_delayed_count(&self) -> anyhow::Result<u64> {
        self.stored_count(DELAYED_COUNT_KEY)
    }

    pub fn get_batch_count(&self) -> anyhow::Result<u64> {
        self.stored_count(BATCH_COUNT_KEY)
    }

    /// Accumulator after delayed message `seq_num` was appended.
    pub fn get_delayed_acc(&self, seq_num: u64) -> anyhow::Result<B256> {
        let key = db_key(DELAYED_MESSAGE_PREFIX, seq_num);
        if !self.db.has(&key)? {
            return Err(TrackerError::AccumulatorNotFound.into());
        }
        let data = self.db.get(&key)?;
        if data.len() < 32 {
            anyhow::bail!("delayed message {seq_num} entry missing accumulator");
        }
        Ok(B256::from_slice(&data[..32]))
    }

    pub fn get_delayed_message_and_acc(
        &self,
        seq_num: u64,
    ) -> anyhow::Result<(InboxMessage, B256)> {
        let key = db_key(DELAYED_MESSAGE_PREFIX, seq_num);
        if !self.db.has(&key)? {
            return Err(TrackerError::AccumulatorNotFound.into());
        }
        let data = self.db.get(&key)?;
        if data.len() < 32 {
            anyhow::bail!("delayed message {seq_num} entry missing accumulator");
        }
        let acc = B256::from_slice(&data[..32]);
        let message = InboxMessage::parse(&data[32..])?;
        Ok((message, acc))
    }

    pub fn get_delayed_message(&self, seq_num: u64) -> anyhow::Result<InboxMessage> {
        Ok(self.get_delayed_message_and_acc(seq_num)?.0)
    }

    pub fn get_batch_metadata(&self, seq_num: u64) -> anyhow::Result<BatchMetadata> {
        if let Some(meta) = self.batch_meta_cache.lock().unwrap().get(&seq_num).cloned() {
            return Ok(meta);
        }
        let key = db_key(BATCH_META_PREFIX, seq_num);
        if !self.db.has(&key)? {
            return Err(TrackerError::AccumulatorNotFound.into());
        }
        let data = self.db.get(&key)?;
        let mut bytes = &data[..];
        let meta = BatchMetadata {
            accumulator: B256::decode(&mut bytes)?,
            delayed_message_count: u64::decode(&mut bytes)?,
            parent_chain_block: u64::decode(&mut bytes)?,
        };
        self.batch_meta_cache
            .lock()
            .unwrap()
            .put(seq_num, meta.clone());
        Ok(meta)
    }

    pub fn get_batch_acc(&self, seq_num: u64) -> anyhow::Result<B256> {
        Ok(self.get_batch_metadata(seq_num)?.accumulator)
    }

    pub fn get_batch_parent_chain_block(&self, seq_num: u64) -> anyhow::Result<u64> {
        Ok(self.get_batch_metadata(seq_num)?.parent_chain_block)
    }

    /// Appends delayed messages, overwriting any diverging suffix. Messages
    /// the tracker already holds unchanged are skipped; the first actually
    /// changed position drives the cascade into sequenced batches.
    pub fn add_delayed_messages(&self, messages: &[DelayedInboxMessage]) -> anyhow::Result<()> {
        let mut msgs = messages;
        // Drop the prefix the tracker already holds unchanged.
        while let Some(first) = msgs.first() {
            let seq_num = first.message.header.seq_num()?;
            match self.get_delayed_acc(seq_num) {
                Ok(have_acc) if have_acc == first.after_inbox_acc()? => msgs = &msgs[1..],
                Ok(_) => break,
                Err(err) if is_accumulator_not_found(&err) => break,
                Err(err) => return Err(err),
            }
        }
        let Some(first) = msgs.first() else {
            return Ok(());
        };

        let mut pos = first.message.header.seq_num()?;
        let mut next_acc = B256::ZERO;
        if pos > 0 {
            next_acc = self.get_delayed_acc(pos - 1).map_err(|err| {
                if is_accumulator_not_found(&err) {
                    anyhow::anyhow!("missing previous delayed message {}", pos - 1)
                } else {
                    err
                }
            })?;
        }

        let first_new_pos = pos;
        let mut batch = self.db.new_batch();
        for msg in msgs {
            let seq_num = msg.message.header.seq_num()?;
            if seq_num != pos {
                anyhow::bail!("unexpected delayed sequence number {seq_num}, expected {pos}");
            }
            if next_acc != msg.before_inbox_acc {
                anyhow::bail!("previous delayed accumulator mismatch for message {seq_num}");
            }
            let serialized = msg.message.serialize()?;
            next_acc = inflow_primitives::accumulator::extend(next_acc, &serialized);
            let mut data = next_acc.to_vec();
            data.extend_from_slice(&serialized);
            batch.put(&db_key(DELAYED_MESSAGE_PREFIX, seq_num), &data)?;
            pos += 1;
        }
        self.set_delayed_count_and_truncate(batch.as_mut(), first_new_pos, pos)?;
        batch.write()?;
        Ok(())
    }

    pub fn reorg_delayed_to(&self, new_delayed_count: u64) -> anyhow::Result<()> {
        let mut batch = self.db.new_batch();
        self.set_delayed_count_and_truncate(batch.as_mut(), new_delayed_count, new_delayed_count)?;
        batch.write()?;
        Ok(())
    }

    /// Sets the delayed count, deleting entries past it, and reorgs out any
    /// sequencer batch that consumed a delayed message at or past
    /// `first_changed_pos`.
    fn set_delayed_count_and_truncate(
        &self,
        batch: &mut dyn Batch,
        first_changed_pos: u64,
        new_delayed_count: u64,
    ) -> anyhow::Result<()> {
        if first_changed_pos > new_delayed_count {
            anyhow::bail!(
                "first changed delayed position {first_changed_pos} is after new count {new_delayed_count}"
            );
        }
        delete_starting_at(
            self.db.as_ref(),
            batch,
            DELAYED_MESSAGE_PREFIX,
            &uint64_to_key(new_delayed_count),
        )?;
        batch.put(DELAYED_COUNT_KEY, &alloy_rlp::encode(new_delayed_count))?;

        // A batch with after_delayed_count k consumed messages 0..k, so
        // every linkage entry past first_changed_pos names a dead batch.
        let mut iter = self.db.new_iterator(
            DELAYED_SEQUENCED_PREFIX,
            &uint64_to_key(first_changed_pos + 1),
        );
        let mut reorg_batches_to_count: Option<u64> = None;
        while iter.next() {
            let batch_seq_num = u64::decode(&mut iter.value())?;
            let key = iter.key().to_vec();
            batch.delete(&key)?;
            if reorg_batches_to_count.is_none() {
                reorg_batches_to_count = Some(batch_seq_num);
            }
        }
        if let Some(err) = iter.error() {
            return Err(err);
        }
        iter.release();

        if let Some(count) = reorg_batches_to_count {
            batch.put(BATCH_COUNT_KEY, &alloy_rlp::encode(count))?;
            self.delete_batch_metadata_starting_at(count)?;
        }
        Ok(())
    }

    /// Appends sequencer batches, overwriting any diverging suffix. Fails
    /// with [`TrackerError::DelayedMessagesMismatch`] when a batch commits
    /// to delayed messages the tracker doesn't hold yet.
    pub fn add_sequencer_batches(&self, batches: &[SequencerInboxBatch]) -> anyhow::Result<()> {
        let Some(first) = batches.first() else {
            return Ok(());
        };
        let mut pos = first.sequence_number;
        let mut prev_meta = BatchMetadata {
            accumulator: B256::ZERO,
            delayed_message_count: 0,
            parent_chain_block: 0,
        };
        if pos > 0 {
            prev_meta = self.get_batch_metadata(pos - 1)?;
        }
        let mut next_acc = prev_meta.accumulator;

        for batch in batches {
            if batch.sequence_number != pos {
                anyhow::bail!(
                    "unexpected batch sequence number {}, expected {pos}",
                    batch.sequence_number
                );
            }
            if next_acc != batch.before_inbox_acc {
                anyhow::bail!("previous batch accumulator mismatch at {pos}");
            }
            if batch.after_delayed_count > 0 {
                match self.get_delayed_acc(batch.after_delayed_count - 1) {
                    Ok(have_acc) if have_acc == batch.after_delayed_acc => {}
                    Ok(_) => return Err(TrackerError::DelayedMessagesMismatch.into()),
                    Err(err) if is_accumulator_not_found(&err) => {
                        return Err(TrackerError::DelayedMessagesMismatch.into())
                    }
                    Err(err) => return Err(err),
                }
            }
            next_acc = batch.after_inbox_acc;
            pos += 1;
        }

        let mut db_batch = self.db.new_batch();
        delete_starting_at(
            self.db.as_ref(),
            db_batch.as_mut(),
            DELAYED_SEQUENCED_PREFIX,
            &uint64_to_key(prev_meta.delayed_message_count + 1),
        )?;

        let mut last_meta = prev_meta;
        let mut to_cache: Vec<(u64, BatchMetadata)> = Vec::with_capacity(batches.len());
        for batch in batches {
            let meta = BatchMetadata {
                accumulator: batch.after_inbox_acc,
                delayed_message_count: batch.after_delayed_count,
                parent_chain_block: batch.parent_chain_block_number,
            };
            let mut meta_bytes = Vec::new();
            meta_bytes.extend_from_slice(&alloy_rlp::encode(meta.accumulator));
            meta_bytes.extend_from_slice(&alloy_rlp::encode(meta.delayed_message_count));
            meta_bytes.extend_from_slice(&alloy_rlp::encode(meta.parent_chain_block));
            db_batch.put(&db_key(BATCH_META_PREFIX, batch.sequence_number), &meta_bytes)?;

            if batch.after_delayed_count > last_meta.delayed_message_count {
                db_batch.put(
                    &db_key(DELAYED_SEQUENCED_PREFIX, batch.after_delayed_count),
                    &alloy_rlp::encode(batch.sequence_number),
                )?;
            }
            to_cache.push((batch.sequence_number, meta.clone()));
            last_meta = meta;
        }

        self.delete_batch_metadata_starting_at(pos)?;
        db_batch.put(BATCH_COUNT_KEY, &alloy_rlp::encode(pos))?;
        db_batch.write()?;

        let mut cache = self.batch_meta_cache.lock().unwrap();
        for (seq, meta) in to_cache {
            cache.put(seq, meta);
        }
        Ok(())
    }

    pub fn reorg_batches_to(&self, new_batch_count: u64) -> anyhow::Result<()> {
        let mut batch = self.db.new_batch();
        // Drop linkage entries pointing at batches being reorged out.
        let mut iter = self
            .db
            .new_iterator(DELAYED_SEQUENCED_PREFIX, &uint64_to_key(0));
        while iter.next() {
            let batch_seq_num = u64::decode(&mut iter.value())?;
            if batch_seq_num >= new_batch_count {
                let key = iter.key().to_vec();
                batch.delete(&key)?;
            }
        }
        if let Some(err) = iter.error() {
            return Err(err);
        }
        iter.release();

        batch.put(BATCH_COUNT_KEY, &alloy_rlp::encode(new_batch_count))?;
        self.delete_batch_metadata_starting_at(new_batch_count)?;
        batch.write()?;
        Ok(())
    }

    fn delete_batch_metadata_starting_at(&self, start_index: u64) -> anyhow::Result<()> {
        let mut cache = self.batch_meta_cache.lock().unwrap();
        let mut iter = self
            .db
            .new_iterator(BATCH_META_PREFIX, &uint64_to_key(start_index));
        let mut batch = self.db.new_batch();
        while iter.next() {
            let key = iter.key();
            batch.delete(key)?;
            let prefix_len = BATCH_META_PREFIX.len();
            if key.len() >= prefix_len + 8 {
                let mut idx_bytes = [0u8; 8];
                idx_bytes.copy_from_slice(&key[prefix_len..prefix_len + 8]);
                cache.pop(&u64::from_be_bytes(idx_bytes));
            }
        }
        if let Some(err) = iter.error() {
            return Err(err);
        }
        iter.release();
        batch.write()?;
        Ok(())
    }
}
