use clap::Parser;

#[derive(Debug, Clone, Parser)]
pub struct NodeArgs {
    #[arg(long = "parent-chain-rpc-url", env = "INFLOW_PARENT_CHAIN_RPC")]
    pub parent_chain_rpc_url: String,

    #[arg(long = "delayed-bridge", env = "INFLOW_DELAYED_BRIDGE")]
    pub delayed_bridge: String,

    #[arg(long = "sequencer-inbox", env = "INFLOW_SEQUENCER_INBOX")]
    pub sequencer_inbox: String,

    #[arg(long = "chain-id", env = "INFLOW_CHAIN_ID")]
    pub chain_id: u64,

    #[arg(long = "first-message-block", env = "INFLOW_FIRST_MESSAGE_BLOCK", default_value_t = 0)]
    pub first_message_block: u64,

    #[arg(long = "db-path", env = "INFLOW_DB_PATH", default_value = "./inflow-db")]
    pub db_path: String,

    #[arg(long = "head-poll-interval-ms", env = "INFLOW_HEAD_POLL_INTERVAL_MS", default_value_t = 1000)]
    pub head_poll_interval_ms: u64,

    /// Number of latest parent-chain blocks to ignore to reduce reorgs.
    #[arg(long = "delay-blocks", env = "INFLOW_DELAY_BLOCKS", default_value_t = 0)]
    pub delay_blocks: u64,

    /// Maximum time to wait between inbox checks when not enough new
    /// blocks arrive.
    #[arg(long = "check-delay-ms", env = "INFLOW_CHECK_DELAY_MS", default_value_t = 60_000)]
    pub check_delay_ms: u64,

    /// Erase future tracker entries in addition to overwriting existing
    /// ones on reorg.
    #[arg(long = "hard-reorg", env = "INFLOW_HARD_REORG", default_value_t = false)]
    pub hard_reorg: bool,

    /// Minimum number of blocks to read at once (lowers parent-chain load
    /// when caught up).
    #[arg(long = "min-blocks-to-read", env = "INFLOW_MIN_BLOCKS_TO_READ", default_value_t = 1)]
    pub min_blocks_to_read: u64,
}
