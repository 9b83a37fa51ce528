use anyhow::Result;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use alloy_primitives::Address;

use crate::config::NodeArgs;
use inflow_bridge::eth_delayed::EthDelayedBridge;
use inflow_bridge::eth_sequencer::EthSequencerInbox;
use inflow_bridge::header_reader::HttpHeaderReader;
use inflow_bridge::rpc::RpcClient;
use inflow_inbox::tracker::InboxTracker;
use inflow_inbox_reader::reader::{InboxReader, InboxReaderConfig};

pub struct InflowNode {
    args: NodeArgs,
}

impl InflowNode {
    pub fn new(args: NodeArgs) -> Self {
        Self { args }
    }

    pub async fn run(self) -> Result<()> {
        let args = self.args;
        info!("starting inflow node; chain id {}", args.chain_id);

        let db = Arc::new(inflow_db_sled::SledDb::open(&args.db_path)?);
        let tracker = Arc::new(InboxTracker::new(db));
        tracker.initialize()?;

        let rpc = Arc::new(RpcClient::new(args.parent_chain_rpc_url.clone()));
        let delayed_bridge = Arc::new(EthDelayedBridge::new(
            rpc.clone(),
            Address::from_str(args.delayed_bridge.trim())?,
        ));
        let sequencer_inbox = Arc::new(EthSequencerInbox::new(
            rpc.clone(),
            Address::from_str(args.sequencer_inbox.trim())?,
        ));
        let header_reader = Arc::new(HttpHeaderReader::new(
            rpc,
            Duration::from_millis(args.head_poll_interval_ms),
        ));

        let reader_config = InboxReaderConfig {
            delay_blocks: args.delay_blocks,
            check_delay: Duration::from_millis(args.check_delay_ms),
            hard_reorg: args.hard_reorg,
            min_blocks_to_read: args.min_blocks_to_read,
        };
        let inbox_reader = Arc::new(InboxReader::new(
            tracker,
            delayed_bridge,
            sequencer_inbox,
            header_reader,
            args.first_message_block,
            args.chain_id,
            reader_config,
        ));

        let cancel = CancellationToken::new();
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                let _ = tokio::signal::ctrl_c().await;
                info!("shutdown requested");
                cancel.cancel();
            }
        });

        inbox_reader.clone().start(cancel.clone()).await?;
        let (block, batch_count) = inbox_reader.get_last_read_block_and_batch_count();
        info!("inbox reader started; last read block {block}, batch count {batch_count}");

        cancel.cancelled().await;
        info!("inflow node stopped");
        Ok(())
    }
}
