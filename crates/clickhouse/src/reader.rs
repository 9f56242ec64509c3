//! `ClickHouse` reader functionality
//! Handles the read-only queries the indexer resumes and aggregates from

use std::{collections::HashMap, time::Instant};

use clickhouse::{Client, Row};
use derive_more::Debug;
use eyre::{Context, Result};
use serde::Deserialize;
use tracing::{debug, error};
use url::Url;

#[derive(Row, Deserialize)]
struct MaxBlock {
    block_number: u64,
}

#[derive(Row, Deserialize)]
struct WithdrawalTotal {
    validator_index: u64,
    total: u64,
}

/// `ClickHouse` reader client
#[derive(Clone, Debug)]
pub struct ClickhouseReader {
    /// Base client
    #[debug(skip)]
    base: Client,
    /// Database name
    db_name: String,
}

impl ClickhouseReader {
    /// Create a new `ClickHouse` reader client
    pub fn new(url: Url, db_name: String, username: String, password: String) -> Result<Self> {
        let client = Client::default()
            .with_url(url)
            .with_database(db_name.clone())
            .with_user(username)
            .with_password(password);

        Ok(Self { base: client, db_name })
    }

    async fn execute<R>(&self, query: &str) -> Result<Vec<R>>
    where
        R: Row + for<'b> Deserialize<'b>,
    {
        let client = self.base.clone();
        let start = Instant::now();

        let result = client.query(query).fetch_all::<R>().await;

        let duration_ms = start.elapsed().as_millis();
        match &result {
            Ok(rows) => {
                debug!(query = %query, duration_ms, rows = rows.len(), "ClickHouse query executed")
            }
            Err(e) => error!(query = %query, duration_ms, error = %e, "ClickHouse query failed"),
        }
        result.map_err(Into::into)
    }

    /// Highest block number of any stored deposit, 0 for an empty table.
    pub async fn max_deposit_block(&self) -> Result<u64> {
        let query = format!(
            "SELECT max(block_number) AS block_number FROM {}.eth1_deposits FINAL",
            self.db_name
        );
        let rows = self.execute::<MaxBlock>(&query).await.wrap_err("Failed to read max deposit block")?;
        Ok(rows.first().map_or(0, |r| r.block_number))
    }

    /// Per-validator sum of withdrawals included at or before `slot`.
    pub async fn total_withdrawals_at(&self, slot: u64) -> Result<HashMap<u64, u64>> {
        let query = format!(
            "SELECT validator_index, sum(amount) AS total \
             FROM {}.blocks_withdrawals FINAL \
             WHERE slot <= {slot} \
             GROUP BY validator_index",
            self.db_name
        );
        let rows = self
            .execute::<WithdrawalTotal>(&query)
            .await
            .wrap_err_with(|| format!("Failed to read withdrawal totals at slot {slot}"))?;
        Ok(rows.into_iter().map(|r| (r.validator_index, r.total)).collect())
    }
}
