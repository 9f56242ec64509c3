//! `ClickHouse` writer functionality for beaconscope
//! Handles database initialization and data insertion

use std::collections::BTreeSet;

use clickhouse::{Client, Row};
use derive_more::Debug;
use eyre::{Context, Result};
use primitives::{
    deposit::Deposit,
    epoch::{BlocksBySlot, EpochData, SlotData},
    validator::Validator,
};
use serde::Serialize;
use tracing::{debug, info};
use url::Url;

use crate::{
    models::{
        AttestationRow, BlockRow, DepositRow, EpochRow, ValidatorRow, WithdrawalRow, all_blocks,
    },
    schema::{TABLE_SCHEMAS, TABLES, TableSchema},
};

/// `ClickHouse` writer client for beaconscope (data insertion and migrations)
#[derive(Clone, Debug)]
pub struct ClickhouseWriter {
    /// Base client
    #[debug(skip)]
    base: Client,
    /// Database name
    db_name: String,
}

impl ClickhouseWriter {
    /// Create a new `ClickHouse` writer client
    pub fn new(url: Url, db_name: String, username: String, password: String) -> Result<Self> {
        let client = Client::default()
            .with_url(url)
            .with_database(db_name.clone())
            .with_user(username)
            .with_password(password);

        Ok(Self { base: client, db_name })
    }

    /// Create a table with the given schema
    async fn create_table(&self, schema: &TableSchema) -> Result<()> {
        let query = format!(
            "CREATE TABLE IF NOT EXISTS {}.{} (
                {}
            ) ENGINE = ReplacingMergeTree(inserted_at)
            ORDER BY ({})",
            self.db_name, schema.name, schema.columns, schema.order_by
        );

        self.base
            .query(&query)
            .execute()
            .await
            .wrap_err_with(|| format!("Failed to create {} table", schema.name))
    }

    /// Drop a table if it exists
    async fn drop_table(&self, table_name: &str) -> Result<()> {
        self.base
            .query(&format!("DROP TABLE IF EXISTS {}.{}", self.db_name, table_name))
            .execute()
            .await
            .wrap_err_with(|| format!("Failed to drop {} table", table_name))
    }

    /// Initialize database and optionally reset
    pub async fn init_db(&self, reset: bool) -> Result<()> {
        self.init_db_with_migrations(reset, true).await
    }

    /// Initialize database with option to skip table creation
    pub async fn init_db_with_migrations(&self, reset: bool, run_migrations: bool) -> Result<()> {
        self.base
            .query(&format!("CREATE DATABASE IF NOT EXISTS {}", self.db_name))
            .execute()
            .await?;

        if reset {
            for table in TABLES {
                self.drop_table(table).await?;
            }
            info!(db_name = %self.db_name, "Database reset complete");
        }

        if run_migrations {
            self.init_schema().await?;
        }
        Ok(())
    }

    /// Initialize schema
    pub async fn init_schema(&self) -> Result<()> {
        for schema in TABLE_SCHEMAS {
            self.create_table(schema).await?;
        }
        Ok(())
    }

    /// Writes `rows` to `table` in a single INSERT. Does nothing for an empty set.
    async fn insert_rows<R>(&self, table: &str, rows: &[R]) -> Result<()>
    where
        R: Row + Serialize,
    {
        if rows.is_empty() {
            return Ok(());
        }
        let client = self.base.clone().with_database(&self.db_name);
        let mut insert = client.insert(table)?;
        for row in rows {
            insert.write(row).await?;
        }
        insert.end().await.wrap_err_with(|| format!("Failed to insert into {table}"))?;
        debug!(table, rows = rows.len(), "Inserted rows");
        Ok(())
    }

    /// Upsert a batch of deposits.
    ///
    /// The batch is one INSERT, which `ClickHouse` applies atomically; rows
    /// sharing `(tx_hash, merkletree_index)` with stored ones replace them.
    pub async fn upsert_deposits(&self, deposits: &[Deposit]) -> Result<()> {
        let rows: Vec<DepositRow> = deposits.iter().map(DepositRow::from).collect();
        self.insert_rows("eth1_deposits", &rows).await
    }

    /// Remove placeholder rows of slots that now have an observed block.
    async fn delete_placeholders(&self, slots: &BTreeSet<u64>) -> Result<()> {
        if slots.is_empty() {
            return Ok(());
        }
        let list = slots.iter().map(u64::to_string).collect::<Vec<_>>().join(", ");
        let query = format!(
            "DELETE FROM {}.blocks WHERE slot IN ({list}) AND status != 1",
            self.db_name
        );
        self.base.query(&query).execute().await.wrap_err("Failed to delete placeholder blocks")
    }

    /// Insert blocks together with their attestations and withdrawals.
    pub async fn insert_blocks(&self, blocks: &BlocksBySlot) -> Result<()> {
        let observed: BTreeSet<u64> =
            all_blocks(blocks).filter(|b| !b.is_placeholder()).map(|b| b.slot).collect();
        self.delete_placeholders(&observed).await?;

        let block_rows: Vec<BlockRow> = all_blocks(blocks).map(BlockRow::from).collect();
        let attestation_rows: Vec<AttestationRow> =
            all_blocks(blocks).flat_map(AttestationRow::from_block).collect();
        let withdrawal_rows: Vec<WithdrawalRow> =
            all_blocks(blocks).flat_map(|b| b.withdrawals()).map(WithdrawalRow::from).collect();

        self.insert_rows("blocks", &block_rows).await?;
        self.insert_rows("blocks_attestations", &attestation_rows).await?;
        self.insert_rows("blocks_withdrawals", &withdrawal_rows).await
    }

    /// Insert the validator set of a snapshot taken in `epoch`.
    pub async fn insert_validators(&self, epoch: u64, validators: &[Validator]) -> Result<()> {
        let rows: Vec<ValidatorRow> = validators.iter().map(|v| ValidatorRow::new(epoch, v)).collect();
        self.insert_rows("validators", &rows).await
    }

    /// Save a slot snapshot
    pub async fn save_slot_data(&self, data: &SlotData) -> Result<()> {
        self.insert_blocks(&data.blocks).await?;
        self.insert_validators(data.epoch, &data.validators).await?;
        info!(slot = data.slot, validators = data.validators.len(), "Saved slot data");
        Ok(())
    }

    /// Save an epoch snapshot
    pub async fn save_epoch_data(&self, data: &EpochData) -> Result<()> {
        self.insert_blocks(&data.blocks).await?;
        self.insert_validators(data.epoch, &data.validators).await?;
        self.insert_rows("epochs", &[EpochRow::from(data)]).await?;
        info!(epoch = data.epoch, validators = data.validators.len(), "Saved epoch data");
        Ok(())
    }
}
