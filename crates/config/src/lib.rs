//! Beaconscope configuration
use alloy_primitives::{Address, FixedBytes};
use clap::Parser;
use url::Url;

/// Clickhouse database configuration options
#[derive(Debug, Clone, Parser)]
pub struct ClickhouseOpts {
    /// Clickhouse URL
    #[clap(long = "clickhouse-url", env = "CLICKHOUSE_URL")]
    pub url: Url,
    /// Clickhouse database
    #[clap(long = "clickhouse-db", env = "CLICKHOUSE_DB")]
    pub db: String,
    /// Clickhouse username
    #[clap(long = "clickhouse-username", env = "CLICKHOUSE_USERNAME")]
    pub username: String,
    /// Clickhouse password
    #[clap(long = "clickhouse-password", env = "CLICKHOUSE_PASSWORD", default_value = "")]
    pub password: String,
}

/// RPC endpoint configuration options
#[derive(Debug, Clone, Parser)]
pub struct RpcOpts {
    /// Execution layer JSON-RPC URL
    #[clap(long, env = "EL_RPC_URL")]
    pub el_url: Url,
    /// Consensus layer API URL
    #[clap(long, env = "CL_API_URL")]
    pub cl_url: Url,
}

/// Deposit contract configuration options
#[derive(Debug, Clone, Parser)]
pub struct DepositOpts {
    /// Deposit contract address
    #[clap(long, env = "DEPOSIT_CONTRACT_ADDRESS")]
    pub contract_address: Address,
    /// Block the deposit contract was deployed in
    #[clap(long, env = "DEPOSIT_CONTRACT_FIRST_BLOCK", default_value = "0")]
    pub contract_first_block: u64,
}

/// Chain parameter configuration options
#[derive(Debug, Clone, Parser)]
pub struct ChainOpts {
    /// Network config name, e.g. mainnet or prater
    #[clap(long, env = "NETWORK_NAME", default_value = "mainnet")]
    pub network: String,
    /// Genesis fork version as 0x-prefixed hex
    #[clap(long, env = "GENESIS_FORK_VERSION", default_value = "0x00000000")]
    pub genesis_fork_version: FixedBytes<4>,
    /// Execution layer chain id
    #[clap(long, env = "CHAIN_ID", default_value = "1")]
    pub chain_id: u64,
    /// Slots per epoch
    #[clap(long, env = "SLOTS_PER_EPOCH", default_value = "32")]
    pub slots_per_epoch: u64,
    /// Seconds per slot
    #[clap(long, env = "SECONDS_PER_SLOT", default_value = "12")]
    pub seconds_per_slot: u64,
    /// Genesis timestamp; read from the beacon node when unset
    #[clap(long, env = "GENESIS_TIMESTAMP")]
    pub genesis_timestamp: Option<u64>,
}

/// Indexer behaviour configuration options
#[derive(Debug, Clone, Parser)]
pub struct IndexerOpts {
    /// Page size of paginated beacon node listings
    #[clap(long, env = "PAGE_SIZE", default_value = "250")]
    pub page_size: u32,
    /// Regexes matching provider errors for oversized log queries
    #[clap(
        long = "provider-error-pattern",
        env = "PROVIDER_ERROR_PATTERNS",
        value_delimiter = ',',
        default_values = ["query returned more than [0-9]+ results", "413 Request Entity Too Large"]
    )]
    pub provider_error_patterns: Vec<String>,
    /// Disable the deposit scanner
    #[clap(long, env = "DISABLE_DEPOSIT_SCANNER")]
    pub disable_deposit_scanner: bool,
    /// Disable the chain head stream
    #[clap(long, env = "DISABLE_HEAD_STREAM")]
    pub disable_head_stream: bool,
}

/// CLI options for beaconscope
#[derive(Debug, Clone, Parser)]
pub struct Opts {
    /// Clickhouse database configuration
    #[clap(flatten)]
    pub clickhouse: ClickhouseOpts,

    /// RPC endpoint configuration
    #[clap(flatten)]
    pub rpc: RpcOpts,

    /// Deposit contract configuration
    #[clap(flatten)]
    pub deposit: DepositOpts,

    /// Chain parameters
    #[clap(flatten)]
    pub chain: ChainOpts,

    /// Indexer configuration
    #[clap(flatten)]
    pub indexer: IndexerOpts,

    /// If set, drop & re-create all tables (local/dev only)
    #[clap(long)]
    pub reset_db: bool,

    /// Skip creating tables on startup
    #[clap(long, env = "SKIP_MIGRATIONS")]
    pub skip_migrations: bool,
}

#[cfg(test)]
mod tests {
    use super::Opts;

    use clap::Parser;

    const REQUIRED: [&str; 11] = [
        "beaconscope",
        "--clickhouse-url",
        "http://localhost:8123",
        "--clickhouse-db",
        "beaconscope",
        "--clickhouse-username",
        "default",
        "--el-url",
        "http://localhost:8545",
        "--cl-url",
        "http://localhost:3500",
    ];

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        Opts::command().debug_assert()
    }

    #[test]
    fn defaults() {
        let args = REQUIRED.iter().copied().chain([
            "--contract-address",
            "0x00000000219ab540356cBB839Cbe05303d7705Fa",
        ]);
        let opts = Opts::try_parse_from(args).unwrap();

        assert_eq!(opts.indexer.page_size, 250);
        assert_eq!(opts.chain.slots_per_epoch, 32);
        assert_eq!(opts.chain.seconds_per_slot, 12);
        assert_eq!(opts.chain.genesis_timestamp, None);
        assert_eq!(
            opts.indexer.provider_error_patterns,
            vec!["query returned more than [0-9]+ results", "413 Request Entity Too Large"]
        );
        assert!(!opts.indexer.disable_deposit_scanner);
    }

    #[test]
    fn parses_fork_version() {
        let args = REQUIRED.iter().copied().chain([
            "--contract-address",
            "0x00000000219ab540356cBB839Cbe05303d7705Fa",
            "--genesis-fork-version",
            "0x00001020",
        ]);
        let opts = Opts::try_parse_from(args).unwrap();
        assert_eq!(opts.chain.genesis_fork_version.0, [0x00, 0x00, 0x10, 0x20]);
    }
}
