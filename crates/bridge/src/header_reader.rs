use crate::abi;
use crate::rpc::RpcClient;
use crate::traits::{HeaderReader, L1Header, Unsubscribe};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc::{self, Receiver};
use tokio::sync::Notify;
use tokio::time::{self, Duration};

/// Head tracker that polls `eth_blockNumber` and publishes strictly
/// increasing heights to subscribers.
pub struct HttpHeaderReader {
    rpc: Arc<RpcClient>,
    poll_interval: Duration,
    stop: Arc<Notify>,
}

impl HttpHeaderReader {
    pub fn new(rpc: Arc<RpcClient>, poll_interval: Duration) -> Self {
        Self {
            rpc,
            poll_interval,
            stop: Arc::new(Notify::new()),
        }
    }

    async fn block_number(rpc: &RpcClient) -> Result<u64> {
        let hex: String = rpc.call("eth_blockNumber", json!([])).await?;
        abi::parse_hex_u64(&hex)
    }
}

#[async_trait]
impl HeaderReader for HttpHeaderReader {
    async fn last_header(&self) -> Result<L1Header> {
        let number = Self::block_number(&self.rpc).await?;
        Ok(L1Header { number })
    }

    async fn subscribe(&self) -> (Receiver<L1Header>, Unsubscribe) {
        let (tx, rx) = mpsc::channel(64);
        let rpc = self.rpc.clone();
        let stop = self.stop.clone();
        let interval = self.poll_interval;
        let unsubscribe = {
            let stop = self.stop.clone();
            Box::new(move || stop.notify_waiters()) as Unsubscribe
        };
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            let mut last: u64 = 0;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop.notified() => break,
                }
                if let Ok(number) = Self::block_number(&rpc).await {
                    if number > last {
                        last = number;
                        if tx.send(L1Header { number }).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        (rx, unsubscribe)
    }
}
