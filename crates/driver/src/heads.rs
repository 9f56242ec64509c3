//! Persists snapshots for blocks delivered by the chain head stream.
use std::sync::Arc;

use beacon::BeaconClient;
use derive_more::Debug;
use eyre::{Result, WrapErr};
use primitives::{block::Block, store::SnapshotStore};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Consumer of the head stream's delivery queue.
///
/// Every block gets a slot snapshot. When a block opens a new epoch the
/// previous epoch is snapshotted as a whole, which settles its missed slots.
#[derive(Debug)]
pub struct HeadConsumer {
    client: Arc<BeaconClient>,
    #[debug(skip)]
    store: Arc<dyn SnapshotStore>,
    last_epoch: Option<u64>,
}

impl HeadConsumer {
    /// Create a consumer writing to `store`.
    pub fn new(client: Arc<BeaconClient>, store: Arc<dyn SnapshotStore>) -> Self {
        Self { client, store, last_epoch: None }
    }

    /// Handles blocks until the stream side is dropped.
    pub async fn run(mut self, mut blocks: mpsc::Receiver<Block>) {
        while let Some(block) = blocks.recv().await {
            let slot = block.slot;
            if let Err(err) = self.handle_block(block).await {
                error!(slot, err = format_args!("{err:#}"), "Error exporting head block");
            }
        }
        warn!("Head stream closed, stopping consumer");
    }

    /// Snapshots and saves one block, then its finished epoch if any.
    pub async fn handle_block(&mut self, block: Block) -> Result<()> {
        let slot = block.slot;
        let epoch = self.client.chain().epoch_of_slot(slot);

        let data = self.client.slot_data(block).await?;
        self.store
            .save_slot_data(&data)
            .await
            .wrap_err_with(|| format!("error saving data for slot {slot}"))?;
        info!(slot, epoch, "Exported slot");

        let finished = match self.last_epoch {
            Some(last) if epoch > last => Some(last),
            _ => None,
        };
        self.last_epoch = Some(self.last_epoch.map_or(epoch, |last| last.max(epoch)));

        if let Some(finished) = finished {
            let data = self.client.epoch_data(finished).await?;
            self.store
                .save_epoch_data(&data)
                .await
                .wrap_err_with(|| format!("error saving data for epoch {finished}"))?;
            info!(epoch = finished, blocks = data.blocks.len(), "Exported epoch");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{collections::HashMap, sync::Mutex};

    use alloy_primitives::B256;
    use async_trait::async_trait;
    use beacon::{
        BeaconNode, QueryFilter,
        node::HeadStream,
        wire::{
            AssignmentsPage, BalancesPage, BlocksPage, ChainHeadResponse, GenesisResponse,
            ParticipationResponse, StateBalance, StateSyncCommittee, StateValidator,
            ValidatorQueueResponse,
        },
    };
    use chainio::SigningScheme;
    use eyre::bail;
    use futures::{StreamExt, stream};
    use primitives::{
        chain::ChainConfig,
        epoch::{EpochData, SlotData},
        store::WithdrawalStore,
    };

    /// Node answering only what snapshots strictly need.
    struct QuietNode;

    #[async_trait]
    impl BeaconNode for QuietNode {
        async fn genesis(&self) -> Result<GenesisResponse> {
            bail!("unsupported")
        }

        async fn chain_head(&self) -> Result<ChainHeadResponse> {
            bail!("unsupported")
        }

        async fn stream_chain_head(&self) -> Result<HeadStream> {
            Ok(stream::pending().boxed())
        }

        async fn validator_queue(&self) -> Result<ValidatorQueueResponse> {
            bail!("unsupported")
        }

        async fn list_assignments(
            &self,
            _filter: QueryFilter,
            _page_size: u32,
            _page_token: &str,
        ) -> Result<AssignmentsPage> {
            Ok(AssignmentsPage::default())
        }

        async fn list_blocks(
            &self,
            _filter: QueryFilter,
            _page_size: u32,
            _page_token: &str,
        ) -> Result<BlocksPage> {
            Ok(BlocksPage::default())
        }

        async fn list_balances(
            &self,
            _filter: QueryFilter,
            _page_size: u32,
            _page_token: &str,
        ) -> Result<BalancesPage> {
            Ok(BalancesPage::default())
        }

        async fn participation(&self, _filter: QueryFilter) -> Result<ParticipationResponse> {
            bail!("unsupported")
        }

        async fn state_validators(&self, _state_id: &str) -> Result<Vec<StateValidator>> {
            Ok(vec![StateValidator { index: 1, balance: 32_000_000_000, ..Default::default() }])
        }

        async fn state_balances(&self, _state_id: &str) -> Result<Vec<StateBalance>> {
            Ok(Vec::new())
        }

        async fn sync_committee(&self, _state_id: &str, _epoch: u64) -> Result<StateSyncCommittee> {
            bail!("unsupported")
        }
    }

    struct NoWithdrawals;

    #[async_trait]
    impl WithdrawalStore for NoWithdrawals {
        async fn total_withdrawals_at(&self, _slot: u64) -> Result<HashMap<u64, u64>> {
            Ok(HashMap::new())
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        slots: Mutex<Vec<u64>>,
        epochs: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl SnapshotStore for RecordingStore {
        async fn save_slot_data(&self, data: &SlotData) -> Result<()> {
            self.slots.lock().unwrap().push(data.slot);
            Ok(())
        }

        async fn save_epoch_data(&self, data: &EpochData) -> Result<()> {
            self.epochs.lock().unwrap().push(data.epoch);
            Ok(())
        }
    }

    fn block(slot: u64) -> Block {
        Block { slot, block_root: B256::repeat_byte(slot as u8), ..Default::default() }
    }

    fn consumer(store: &Arc<RecordingStore>) -> HeadConsumer {
        let client = BeaconClient::new(
            Arc::new(QuietNode),
            Arc::new(NoWithdrawals),
            ChainConfig::default(),
            SigningScheme::new(1),
            250,
        );
        HeadConsumer::new(Arc::new(client), Arc::clone(store) as Arc<dyn SnapshotStore>)
    }

    #[tokio::test]
    async fn snapshots_previous_epoch_on_rollover() {
        let store = Arc::new(RecordingStore::default());
        let mut consumer = consumer(&store);

        for slot in [62, 63, 64, 65, 96] {
            consumer.handle_block(block(slot)).await.unwrap();
        }

        assert_eq!(*store.slots.lock().unwrap(), vec![62, 63, 64, 65, 96]);
        assert_eq!(*store.epochs.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn late_block_does_not_rewind_epoch() {
        let store = Arc::new(RecordingStore::default());
        let mut consumer = consumer(&store);

        for slot in [64, 63, 65] {
            consumer.handle_block(block(slot)).await.unwrap();
        }

        assert_eq!(store.slots.lock().unwrap().len(), 3);
        assert!(store.epochs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_stops_when_stream_closes() {
        let store = Arc::new(RecordingStore::default());
        let (tx, rx) = mpsc::channel(4);
        tx.send(block(10)).await.unwrap();
        drop(tx);

        consumer(&store).run(rx).await;

        assert_eq!(*store.slots.lock().unwrap(), vec![10]);
    }
}
