//! Beaconscope `ClickHouse` storage
//!
//! Implements the deposit, withdrawal and snapshot stores on top of a single
//! database.

/// Row types
pub mod models;
/// Read-only queries
pub mod reader;
/// Table definitions
pub mod schema;
/// Initialization and inserts
pub mod writer;

use std::collections::HashMap;

use async_trait::async_trait;
use eyre::Result;
use primitives::{
    deposit::Deposit,
    epoch::{EpochData, SlotData},
    store::{DepositStore, SnapshotStore, WithdrawalStore},
};
pub use reader::ClickhouseReader;
pub use writer::ClickhouseWriter;
use url::Url;

/// Reader and writer pair sharing one database.
#[derive(Clone, Debug)]
pub struct ClickhouseStore {
    writer: ClickhouseWriter,
    reader: ClickhouseReader,
}

impl ClickhouseStore {
    /// Create clients for database `db_name` at `url`.
    pub fn new(url: Url, db_name: String, username: String, password: String) -> Result<Self> {
        Ok(Self {
            writer: ClickhouseWriter::new(
                url.clone(),
                db_name.clone(),
                username.clone(),
                password.clone(),
            )?,
            reader: ClickhouseReader::new(url, db_name, username, password)?,
        })
    }

    /// The writer, for schema management.
    pub const fn writer(&self) -> &ClickhouseWriter {
        &self.writer
    }
}

#[async_trait]
impl DepositStore for ClickhouseStore {
    async fn max_deposit_block(&self) -> Result<u64> {
        self.reader.max_deposit_block().await
    }

    async fn upsert_deposits(&self, deposits: &[Deposit]) -> Result<()> {
        self.writer.upsert_deposits(deposits).await
    }
}

#[async_trait]
impl WithdrawalStore for ClickhouseStore {
    async fn total_withdrawals_at(&self, slot: u64) -> Result<HashMap<u64, u64>> {
        self.reader.total_withdrawals_at(slot).await
    }
}

#[async_trait]
impl SnapshotStore for ClickhouseStore {
    async fn save_slot_data(&self, data: &SlotData) -> Result<()> {
        self.writer.save_slot_data(data).await
    }

    async fn save_epoch_data(&self, data: &EpochData) -> Result<()> {
        self.writer.save_epoch_data(data).await
    }
}
