//! Beaconscope Extractor
//!
//! Execution-layer access for the deposit pipeline.
pub mod deposits;

use std::collections::HashMap;

use alloy::{
    primitives::{Address, B256},
    providers::{Provider, ProviderBuilder},
    rpc::types::Log,
};
use alloy_consensus::{Header, TxEnvelope};
use alloy_rpc_client::{ClientBuilder, RpcClient};
use alloy_rpc_types_eth::{Block, BlockNumberOrTag, Transaction};
use async_trait::async_trait;
use chainio::{DefaultProvider, DepositContract};
use derive_more::Debug;
use eyre::{Result, WrapErr, eyre};
use primitives::retries::DEFAULT_RETRY_LAYER;
use tracing::debug;
use url::Url;

/// Headers and transactions resolved by one batched round trip.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentData {
    /// Execution headers by block number
    pub headers: HashMap<u64, Header>,
    /// Signed transactions by hash
    pub transactions: HashMap<B256, TxEnvelope>,
}

/// Execution-layer reads the deposit scanner depends on.
#[async_trait]
pub trait ExecutionSource: Send + Sync {
    /// Current chain height.
    async fn block_number(&self) -> Result<u64>;

    /// Every log emitted by the deposit contract in `[from_block, to_block]`.
    async fn deposit_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<Log>>;

    /// Resolves `blocks` and `txs` in a single batched request.
    ///
    /// Fails as a whole if the batch or any single call in it fails.
    async fn fetch_enrichment(&self, blocks: &[u64], txs: &[B256]) -> Result<EnrichmentData>;
}

/// Execution-layer client
#[derive(Debug)]
pub struct ExecutionClient {
    #[debug(skip)]
    rpc: RpcClient,
    #[debug(skip)]
    provider: DefaultProvider,
    deposit_contract: DepositContract,
}

impl ExecutionClient {
    /// Create a new client for the HTTP JSON-RPC endpoint at `rpc_url`.
    pub fn new(rpc_url: Url, deposit_contract: Address) -> Self {
        let rpc = ClientBuilder::default().layer(DEFAULT_RETRY_LAYER).http(rpc_url);
        let provider = ProviderBuilder::new().connect_client(rpc.clone());
        Self { rpc, provider, deposit_contract: DepositContract::new(deposit_contract) }
    }

    /// Chain id reported by the node.
    pub async fn chain_id(&self) -> Result<u64> {
        Ok(self.provider.get_chain_id().await?)
    }
}

#[async_trait]
impl ExecutionSource for ExecutionClient {
    async fn block_number(&self) -> Result<u64> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn deposit_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<Log>> {
        let filter = self.deposit_contract.logs_filter(from_block, to_block);
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .wrap_err("error getting logs from execution client")?;
        debug!(from_block, to_block, count = logs.len(), "Fetched deposit contract logs");
        Ok(logs)
    }

    async fn fetch_enrichment(&self, blocks: &[u64], txs: &[B256]) -> Result<EnrichmentData> {
        let mut data = EnrichmentData::default();
        if blocks.is_empty() && txs.is_empty() {
            return Ok(data);
        }

        let mut batch = self.rpc.new_batch();
        let mut block_calls = Vec::with_capacity(blocks.len());
        for &number in blocks {
            let params = (BlockNumberOrTag::Number(number), false);
            let call = batch.add_call::<_, Option<Block>>("eth_getBlockByNumber", &params)?;
            block_calls.push((number, call));
        }
        let mut tx_calls = Vec::with_capacity(txs.len());
        for &hash in txs {
            let call = batch.add_call::<_, Option<Transaction>>("eth_getTransactionByHash", &(hash,))?;
            tx_calls.push((hash, call));
        }

        batch.send().await.wrap_err("batched enrichment request failed")?;

        for (number, call) in block_calls {
            let block = call
                .await
                .wrap_err_with(|| format!("eth_getBlockByNumber({number}) failed"))?
                .ok_or_else(|| eyre!("block {number} not found"))?;
            data.headers.insert(number, block.header.inner);
        }
        for (hash, call) in tx_calls {
            let tx = call
                .await
                .wrap_err_with(|| format!("eth_getTransactionByHash({hash}) failed"))?
                .ok_or_else(|| eyre!("transaction {hash} not found"))?;
            data.transactions.insert(hash, tx.inner.into_inner());
        }

        debug!(
            blocks = data.headers.len(),
            txs = data.transactions.len(),
            "Resolved enrichment batch"
        );
        Ok(data)
    }
}
