//! Transport seam to the consensus node.
use async_trait::async_trait;
use eyre::Result;
use futures::stream::BoxStream;

use crate::wire::{
    AssignmentsPage, BalancesPage, BlocksPage, ChainHeadResponse, GenesisResponse,
    ParticipationResponse, StateBalance, StateSyncCommittee, StateValidator,
    ValidatorQueueResponse,
};

/// Selects what a listing endpoint returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryFilter {
    /// Entries of an epoch
    Epoch(u64),
    /// Entries of a slot
    Slot(u64),
    /// Entries of the genesis epoch or slot
    Genesis,
}

impl QueryFilter {
    /// Epoch filter, using the genesis filter for epoch 0.
    pub const fn epoch(epoch: u64) -> Self {
        if epoch == 0 { Self::Genesis } else { Self::Epoch(epoch) }
    }

    /// Slot filter, using the genesis filter for slot 0.
    pub const fn slot(slot: u64) -> Self {
        if slot == 0 { Self::Genesis } else { Self::Slot(slot) }
    }

    /// The filter as a query parameter pair.
    pub fn query_param(&self) -> (&'static str, String) {
        match self {
            Self::Epoch(epoch) => ("epoch", epoch.to_string()),
            Self::Slot(slot) => ("slot", slot.to_string()),
            Self::Genesis => ("genesis", "true".to_owned()),
        }
    }
}

/// Stream of head updates. Ends or yields an error when the connection drops.
pub type HeadStream = BoxStream<'static, Result<ChainHeadResponse>>;

/// Requests the consensus client issues against a beacon node.
#[async_trait]
pub trait BeaconNode: Send + Sync {
    /// Genesis parameters.
    async fn genesis(&self) -> Result<GenesisResponse>;

    /// Current head and checkpoints.
    async fn chain_head(&self) -> Result<ChainHeadResponse>;

    /// Opens a long-lived head subscription.
    async fn stream_chain_head(&self) -> Result<HeadStream>;

    /// Activation and exit queues.
    async fn validator_queue(&self) -> Result<ValidatorQueueResponse>;

    /// One page of committee assignments.
    async fn list_assignments(
        &self,
        filter: QueryFilter,
        page_size: u32,
        page_token: &str,
    ) -> Result<AssignmentsPage>;

    /// One page of block containers.
    async fn list_blocks(
        &self,
        filter: QueryFilter,
        page_size: u32,
        page_token: &str,
    ) -> Result<BlocksPage>;

    /// One page of validator balances.
    async fn list_balances(
        &self,
        filter: QueryFilter,
        page_size: u32,
        page_token: &str,
    ) -> Result<BalancesPage>;

    /// Participation totals.
    async fn participation(&self, filter: QueryFilter) -> Result<ParticipationResponse>;

    /// Validators of the state at `state_id`.
    async fn state_validators(&self, state_id: &str) -> Result<Vec<StateValidator>>;

    /// Balances of the state at `state_id`.
    async fn state_balances(&self, state_id: &str) -> Result<Vec<StateBalance>>;

    /// Sync committee of `epoch` as seen from the state at `state_id`.
    async fn sync_committee(&self, state_id: &str, epoch: u64) -> Result<StateSyncCommittee>;
}
