use crate::abi;
use crate::rpc::{RpcClient, RpcLog, RpcReceipt, RpcTx};
use crate::selectors::{
    EVT_SEQUENCER_BATCH_DATA, EVT_SEQUENCER_BATCH_DELIVERED, SIG_BATCH_COUNT, SIG_INBOX_ACCS,
};
use crate::traits::SequencerInbox;
use crate::types::{BatchDataLocation, SequencerInboxBatch, TimeBounds};
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::trace;

pub struct EthSequencerInbox {
    rpc: Arc<RpcClient>,
    inbox_addr: Address,
}

impl EthSequencerInbox {
    pub fn new(rpc: Arc<RpcClient>, inbox_addr: Address) -> Self {
        Self { rpc, inbox_addr }
    }

    async fn call_word(&self, calldata: Vec<u8>, block_number: u64) -> anyhow::Result<B256> {
        let res_hex: String = self
            .rpc
            .call(
                "eth_call",
                json!([{
                    "to": format!("{:#x}", self.inbox_addr),
                    "data": format!("0x{}", hex::encode(calldata)),
                }, format!("0x{:x}", block_number)]),
            )
            .await?;
        let res = abi::parse_hex_bytes(&res_hex)?;
        abi::word_b256(&res)
    }

    /// Finds the SequencerBatchData log for `batch`, preferring a
    /// block-hash-pinned query and falling back to the posting tx receipt
    /// when the result is ambiguous.
    async fn batch_data_log(&self, batch: &SequencerInboxBatch) -> anyhow::Result<RpcLog> {
        let topic0 = format!("{:#x}", abi::event_topic(EVT_SEQUENCER_BATCH_DATA));
        let topic1 = format!("{:#x}", B256::from(U256::from(batch.sequence_number)));
        let filter = if batch.block_hash != B256::ZERO {
            json!({
                "blockHash": format!("{:#x}", batch.block_hash),
                "address": format!("{:#x}", self.inbox_addr),
                "topics": [[topic0], [topic1]],
            })
        } else {
            let block = format!("0x{:x}", batch.parent_chain_block_number);
            json!({
                "fromBlock": block,
                "toBlock": block,
                "address": format!("{:#x}", self.inbox_addr),
                "topics": [[topic0], [topic1]],
            })
        };
        let mut logs: Vec<RpcLog> = self.rpc.call("eth_getLogs", json!([filter])).await?;
        if logs.len() == 1 {
            return Ok(logs.remove(0));
        }
        if logs.len() > 1 && batch.tx_hash != B256::ZERO {
            let wanted = format!("{:#x}", batch.tx_hash);
            if let Some(pos) = logs
                .iter()
                .position(|l| l.transaction_hash.as_deref() == Some(wanted.as_str()))
            {
                return Ok(logs.remove(pos));
            }
        }
        if batch.tx_hash == B256::ZERO {
            anyhow::bail!(
                "no unambiguous batch data log for batch {} at block {}",
                batch.sequence_number,
                batch.parent_chain_block_number
            );
        }
        let receipt: RpcReceipt = self
            .rpc
            .call(
                "eth_getTransactionReceipt",
                json!([format!("{:#x}", batch.tx_hash)]),
            )
            .await?;
        let wanted_addr = format!("{:#x}", self.inbox_addr);
        let topic1 = format!("{:#x}", B256::from(U256::from(batch.sequence_number)));
        let topic0 = format!("{:#x}", abi::event_topic(EVT_SEQUENCER_BATCH_DATA));
        receipt
            .logs
            .into_iter()
            .find(|l| {
                l.address.eq_ignore_ascii_case(&wanted_addr)
                    && l.topics.len() >= 2
                    && l.topics[0].eq_ignore_ascii_case(&topic0)
                    && l.topics[1].eq_ignore_ascii_case(&topic1)
            })
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "no batch data log in receipt for batch {} (tx {:#x})",
                    batch.sequence_number,
                    batch.tx_hash
                )
            })
    }
}

#[async_trait]
impl SequencerInbox for EthSequencerInbox {
    async fn get_batch_count(&self, block_number: u64) -> anyhow::Result<u64> {
        let calldata = abi::selector(SIG_BATCH_COUNT).to_vec();
        let word = self.call_word(calldata, block_number).await?;
        abi::word_u64(word.as_slice())
    }

    async fn get_accumulator(&self, seq_num: u64, block_number: u64) -> anyhow::Result<B256> {
        let mut calldata = Vec::with_capacity(4 + 32);
        calldata.extend_from_slice(&abi::selector(SIG_INBOX_ACCS));
        calldata.extend_from_slice(&abi::encode_u256(U256::from(seq_num)));
        self.call_word(calldata, block_number).await
    }

    async fn lookup_batches_in_range(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> anyhow::Result<Vec<SequencerInboxBatch>> {
        let filter = json!({
            "fromBlock": format!("0x{:x}", from_block),
            "toBlock": format!("0x{:x}", to_block),
            "address": format!("{:#x}", self.inbox_addr),
            "topics": [[format!("{:#x}", abi::event_topic(EVT_SEQUENCER_BATCH_DELIVERED))]],
        });
        let logs: Vec<RpcLog> = self.rpc.call("eth_getLogs", json!([filter])).await?;
        trace!(
            "sequencer inbox range [{from_block}, {to_block}]: {} delivered logs",
            logs.len()
        );

        let mut out = Vec::with_capacity(logs.len());
        for lg in logs {
            let data = abi::parse_hex_bytes(&lg.data)?;
            if lg.topics.len() < 4 || data.len() < 32 * 7 {
                continue;
            }
            let sequence_number =
                abi::word_u64(abi::parse_b256(&lg.topics[1])?.as_slice())?;
            let before_inbox_acc = abi::parse_b256(&lg.topics[2])?;
            let after_inbox_acc = abi::parse_b256(&lg.topics[3])?;
            let after_delayed_acc = abi::word_b256(&data[0..32])?;
            let after_delayed_count = abi::word_u64(&data[32..64])?;
            let time_bounds = TimeBounds {
                min_timestamp: abi::word_u64(&data[64..96])?,
                max_timestamp: abi::word_u64(&data[96..128])?,
                min_block_number: abi::word_u64(&data[128..160])?,
                max_block_number: abi::word_u64(&data[160..192])?,
            };
            let data_location = BatchDataLocation::from_u8(u8::try_from(
                abi::word_u64(&data[192..224])?,
            )?)?;

            out.push(SequencerInboxBatch {
                sequence_number,
                before_inbox_acc,
                after_inbox_acc,
                after_delayed_count,
                after_delayed_acc,
                time_bounds,
                data_location,
                parent_chain_block_number: match lg.block_number.as_deref() {
                    Some(h) => abi::parse_hex_u64(h)?,
                    None => 0,
                },
                block_hash: lg
                    .block_hash
                    .as_deref()
                    .map(abi::parse_b256)
                    .transpose()?
                    .unwrap_or_default(),
                tx_hash: lg
                    .transaction_hash
                    .as_deref()
                    .map(abi::parse_b256)
                    .transpose()?
                    .unwrap_or_default(),
            });
        }
        Ok(out)
    }

    async fn batch_payload(&self, batch: &SequencerInboxBatch) -> anyhow::Result<Vec<u8>> {
        match batch.data_location {
            BatchDataLocation::TxInput => {
                if batch.tx_hash == B256::ZERO {
                    anyhow::bail!(
                        "batch {} has calldata location but no posting tx hash",
                        batch.sequence_number
                    );
                }
                let tx: RpcTx = self
                    .rpc
                    .call(
                        "eth_getTransactionByHash",
                        json!([format!("{:#x}", batch.tx_hash)]),
                    )
                    .await?;
                let input = abi::parse_hex_bytes(&tx.input)?;
                if input.len() < 4 {
                    anyhow::bail!("batch posting tx input shorter than a selector");
                }
                // addSequencerBatchFromOrigin(uint256,bytes,...): the data
                // argument sits at head word 1.
                abi::dynamic_bytes(&input[4..], 1)
            }
            BatchDataLocation::SeparateEvent => {
                let lg = self.batch_data_log(batch).await?;
                let data = abi::parse_hex_bytes(&lg.data)?;
                abi::dynamic_bytes(&data, 0)
            }
            BatchDataLocation::NoData => Ok(Vec::new()),
            BatchDataLocation::Blob => anyhow::bail!(
                "batch {} is blob-posted; fetching blob payloads requires a beacon client",
                batch.sequence_number
            ),
        }
    }
}
