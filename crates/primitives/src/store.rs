//! Storage seams shared by the ingestion paths.
//!
//! The indexer only talks to its database through these traits, so the loops
//! can be exercised against in-memory stores in tests.
use std::collections::HashMap;

use async_trait::async_trait;
use eyre::Result;

use crate::{
    deposit::Deposit,
    epoch::{EpochData, SlotData},
};

/// Persistence of execution-layer deposits.
#[async_trait]
pub trait DepositStore: Send + Sync {
    /// Highest block number of any stored deposit, 0 if there are none.
    async fn max_deposit_block(&self) -> Result<u64>;

    /// Upserts a batch keyed on `(tx_hash, merkletree_index)`.
    ///
    /// The batch is applied all-or-nothing and existing rows with the same key
    /// are fully overwritten.
    async fn upsert_deposits(&self, deposits: &[Deposit]) -> Result<()>;
}

/// Read access to historical withdrawal totals.
#[async_trait]
pub trait WithdrawalStore: Send + Sync {
    /// Per-validator sum of withdrawals included at or before `slot`.
    async fn total_withdrawals_at(&self, slot: u64) -> Result<HashMap<u64, u64>>;
}

/// Persistence of consensus snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Stores the blocks, withdrawals and validators of a slot snapshot.
    async fn save_slot_data(&self, data: &SlotData) -> Result<()>;

    /// Stores the blocks, withdrawals and validators of an epoch snapshot.
    async fn save_epoch_data(&self, data: &EpochData) -> Result<()>;
}
