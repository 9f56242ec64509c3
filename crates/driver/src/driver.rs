//! Beaconscope Driver - wires the deposit scanner and the head consumer

use std::sync::Arc;

use alloy_primitives::B256;
use beacon::{BeaconClient, BeaconNode, HttpBeaconNode, spawn_head_stream};
use chainio::{SigningScheme, deposit_domain};
use clickhouse::ClickhouseStore;
use config::Opts;
use extractor::ExecutionClient;
use eyre::{Context, Result, bail};
use primitives::{
    chain::ChainConfig,
    retries::{is_connection_refused, retry_with_backoff_if},
};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::{
    deposits::{DepositScanner, ProviderErrorPatterns},
    heads::HeadConsumer,
};

/// Driver owning the clients shared by both loops
#[derive(Debug)]
pub struct Driver {
    store: Arc<ClickhouseStore>,
    execution: Arc<ExecutionClient>,
    beacon: Arc<BeaconClient>,
    deposit_domain: B256,
    contract_first_block: u64,
    error_patterns: ProviderErrorPatterns,
    deposit_scanner_enabled: bool,
    head_stream_enabled: bool,
}

impl Driver {
    /// Create a new driver with the given configuration.
    ///
    /// Fails if the database or either node cannot be reached.
    pub async fn new(opts: Opts) -> Result<Self> {
        info!("Initializing driver");

        let error_patterns = ProviderErrorPatterns::new(&opts.indexer.provider_error_patterns)?;

        let store = ClickhouseStore::new(
            opts.clickhouse.url,
            opts.clickhouse.db,
            opts.clickhouse.username,
            opts.clickhouse.password,
        )?;
        if opts.skip_migrations {
            info!("Skipping database migrations");
        } else {
            info!("Running database migrations...");
            retry_with_backoff_if(
                || store.writer().init_db(opts.reset_db),
                |err| is_connection_refused(format!("{err:#}")),
            )
            .await?;
            info!("Database migrations completed");
        }
        let store = Arc::new(store);

        let execution = ExecutionClient::new(opts.rpc.el_url, opts.deposit.contract_address);
        let chain_id = execution
            .chain_id()
            .await
            .wrap_err("Failed to reach the execution node. Ensure EL_RPC_URL is an HTTP endpoint")?;
        if chain_id != opts.chain.chain_id {
            bail!("execution node is on chain {chain_id}, expected {}", opts.chain.chain_id);
        }

        let node: Arc<dyn BeaconNode> = Arc::new(HttpBeaconNode::new(opts.rpc.cl_url)?);
        let genesis_timestamp = match opts.chain.genesis_timestamp {
            Some(ts) => ts,
            None => {
                let genesis = node.genesis().await.wrap_err("Failed to reach the beacon node")?;
                u64::try_from(genesis.genesis_time.timestamp())
                    .wrap_err("beacon node reported a genesis before 1970")?
            }
        };
        let chain = ChainConfig {
            slots_per_epoch: opts.chain.slots_per_epoch,
            seconds_per_slot: opts.chain.seconds_per_slot,
            genesis_timestamp,
        };
        let beacon = BeaconClient::new(
            node,
            Arc::clone(&store) as _,
            chain,
            SigningScheme::new(chain_id),
            opts.indexer.page_size,
        );
        let head = beacon.chain_head().await.wrap_err("Failed to get beacon chain head")?;
        info!(
            head_slot = head.head_slot,
            finalized_epoch = head.finalized_epoch,
            genesis_timestamp,
            "Connected to beacon node"
        );

        Ok(Self {
            store,
            execution: Arc::new(execution),
            beacon: Arc::new(beacon),
            deposit_domain: deposit_domain(&opts.chain.network, opts.chain.genesis_fork_version),
            contract_first_block: opts.deposit.contract_first_block,
            error_patterns,
            deposit_scanner_enabled: !opts.indexer.disable_deposit_scanner,
            head_stream_enabled: !opts.indexer.disable_head_stream,
        })
    }

    /// Start the enabled loops and run until one of them stops.
    pub async fn start(self) -> Result<()> {
        let mut tasks = JoinSet::new();

        if self.deposit_scanner_enabled {
            let scanner = DepositScanner::new(
                Arc::clone(&self.execution) as _,
                Arc::clone(&self.store) as _,
                self.deposit_domain,
                self.contract_first_block,
                self.error_patterns,
            );
            tasks.spawn(scanner.run());
        } else {
            info!("Deposit scanner disabled via configuration");
        }

        if self.head_stream_enabled {
            let (blocks, stream) = spawn_head_stream(Arc::clone(&self.beacon)).await?;
            let consumer = HeadConsumer::new(Arc::clone(&self.beacon), Arc::clone(&self.store) as _);
            tasks.spawn(consumer.run(blocks));
            tasks.spawn(async move {
                if let Err(err) = stream.await {
                    error!(err = %err, "Head stream task failed");
                }
            });
        } else {
            info!("Head stream disabled via configuration");
        }

        if tasks.is_empty() {
            bail!("both the deposit scanner and the head stream are disabled");
        }

        info!("Driver started");
        if let Some(res) = tasks.join_next().await {
            res.wrap_err("driver task panicked")?;
            warn!("Driver task stopped, shutting down");
        }
        tasks.abort_all();
        Ok(())
    }
}
