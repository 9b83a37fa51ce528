use crate::abi;
use crate::rpc::{RpcClient, RpcLog, RpcTx};
use crate::selectors::{
    EVT_INBOX_MESSAGE_DELIVERED, EVT_INBOX_MESSAGE_FROM_ORIGIN, EVT_MESSAGE_DELIVERED,
    SIG_DELAYED_INBOX_ACCS, SIG_DELAYED_MESSAGE_COUNT, SIG_SEND_MESSAGE_FROM_ORIGIN,
};
use crate::traits::DelayedBridge;
use crate::types::DelayedInboxMessage;
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use inflow_primitives::message::{InboxMessage, InboxMessageHeader};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

pub struct EthDelayedBridge {
    rpc: Arc<RpcClient>,
    bridge_addr: Address,
}

impl EthDelayedBridge {
    pub fn new(rpc: Arc<RpcClient>, bridge_addr: Address) -> Self {
        Self { rpc, bridge_addr }
    }

    async fn call_word(&self, calldata: Vec<u8>, block_number: u64) -> anyhow::Result<B256> {
        let res_hex: String = self
            .rpc
            .call(
                "eth_call",
                json!([{
                    "to": format!("{:#x}", self.bridge_addr),
                    "data": format!("0x{}", hex::encode(calldata)),
                }, format!("0x{:x}", block_number)]),
            )
            .await?;
        let res = abi::parse_hex_bytes(&res_hex)?;
        abi::word_b256(&res)
    }
}

#[async_trait]
impl DelayedBridge for EthDelayedBridge {
    async fn get_message_count(&self, block_number: u64) -> anyhow::Result<u64> {
        let calldata = abi::selector(SIG_DELAYED_MESSAGE_COUNT).to_vec();
        let word = self.call_word(calldata, block_number).await?;
        abi::word_u64(word.as_slice())
    }

    async fn get_accumulator(&self, seq_num: u64, block_number: u64) -> anyhow::Result<B256> {
        let mut calldata = Vec::with_capacity(4 + 32);
        calldata.extend_from_slice(&abi::selector(SIG_DELAYED_INBOX_ACCS));
        calldata.extend_from_slice(&abi::encode_u256(U256::from(seq_num)));
        self.call_word(calldata, block_number).await
    }

    async fn lookup_messages_in_range(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> anyhow::Result<Vec<DelayedInboxMessage>> {
        let filter = json!({
            "fromBlock": format!("0x{:x}", from_block),
            "toBlock": format!("0x{:x}", to_block),
            "address": format!("{:#x}", self.bridge_addr),
            "topics": [[format!("{:#x}", abi::event_topic(EVT_MESSAGE_DELIVERED))]],
        });
        let logs: Vec<RpcLog> = self.rpc.call("eth_getLogs", json!([filter])).await?;

        let mut inbox_addresses: BTreeSet<Address> = BTreeSet::new();
        let mut message_ids: Vec<B256> = Vec::with_capacity(logs.len());
        let mut parsed: Vec<(DelayedInboxMessage, B256)> = Vec::with_capacity(logs.len());

        for lg in logs {
            if lg.topics.len() < 3 {
                continue;
            }
            let message_id = abi::parse_b256(&lg.topics[1])?;
            let inbox_addr = abi::parse_address_topic(&lg.topics[2])?;
            let data = abi::parse_hex_bytes(&lg.data)?;
            if data.len() < 32 * 5 {
                continue;
            }
            let before_acc = abi::word_b256(&data[0..32])?;
            let kind = u8::try_from(abi::word_u64(&data[32..64])?)
                .map_err(|_| anyhow::anyhow!("message kind out of range"))?;
            let poster = Address::from_slice(&data[64 + 12..96]);
            let timestamp = abi::word_u64(&data[96..128])?;
            let base_fee = abi::word_u256(&data[128..160])?;

            let block_number = match lg.block_number.as_deref() {
                Some(h) => abi::parse_hex_u64(h)?,
                None => 0,
            };
            let block_hash = lg
                .block_hash
                .as_deref()
                .map(abi::parse_b256)
                .transpose()?
                .unwrap_or_default();

            let message = InboxMessage {
                header: InboxMessageHeader {
                    kind,
                    poster,
                    block_number,
                    timestamp,
                    request_id: Some(message_id),
                    base_fee,
                },
                body: Vec::new(),
            };
            inbox_addresses.insert(inbox_addr);
            message_ids.push(message_id);
            parsed.push((
                DelayedInboxMessage {
                    block_hash,
                    before_inbox_acc: before_acc,
                    message,
                    parent_chain_block_number: block_number,
                },
                message_id,
            ));
        }

        if parsed.is_empty() {
            return Ok(Vec::new());
        }

        // Second query resolves the message bodies, delivered either as an
        // inbox event or as origin-tx calldata.
        let delivered_topic = abi::event_topic(EVT_INBOX_MESSAGE_DELIVERED);
        let from_origin_topic = abi::event_topic(EVT_INBOX_MESSAGE_FROM_ORIGIN);
        let mut body_by_id: HashMap<B256, Vec<u8>> = HashMap::with_capacity(message_ids.len());

        let addresses = inbox_addresses
            .into_iter()
            .map(|a| format!("{:#x}", a))
            .collect::<Vec<_>>();
        let filter = json!({
            "fromBlock": format!("0x{:x}", from_block),
            "toBlock": format!("0x{:x}", to_block),
            "address": addresses,
            "topics": [
                [format!("{:#x}", delivered_topic), format!("{:#x}", from_origin_topic)],
                message_ids.iter().map(|id| format!("{:#x}", id)).collect::<Vec<_>>(),
            ],
        });
        let body_logs: Vec<RpcLog> = self.rpc.call("eth_getLogs", json!([filter])).await?;
        for lg in body_logs {
            if lg.topics.len() < 2 {
                continue;
            }
            let topic0 = abi::parse_b256(&lg.topics[0])?;
            let message_id = abi::parse_b256(&lg.topics[1])?;
            if topic0 == delivered_topic {
                let data = abi::parse_hex_bytes(&lg.data)?;
                body_by_id.insert(message_id, abi::dynamic_bytes(&data, 0)?);
            } else if topic0 == from_origin_topic {
                let Some(tx_hash) = lg.transaction_hash else {
                    continue;
                };
                let tx: RpcTx = self
                    .rpc
                    .call("eth_getTransactionByHash", json!([tx_hash]))
                    .await?;
                let input = abi::parse_hex_bytes(&tx.input)?;
                if input.len() < 4 || input[0..4] != abi::selector(SIG_SEND_MESSAGE_FROM_ORIGIN) {
                    continue;
                }
                body_by_id.insert(message_id, abi::dynamic_bytes(&input[4..], 0)?);
            }
        }

        let mut out: Vec<DelayedInboxMessage> = Vec::with_capacity(parsed.len());
        for (mut msg, message_id) in parsed {
            if let Some(body) = body_by_id.get(&message_id) {
                msg.message.body = body.clone();
            }
            out.push(msg);
        }
        out.sort_by_key(|m| U256::from_be_bytes(m.message.header.request_id.unwrap_or_default().0));
        Ok(out)
    }
}
