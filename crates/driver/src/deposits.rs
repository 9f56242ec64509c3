//! Deposit contract range scanner.
//!
//! Walks the execution chain from the deposit contract's first block to the
//! head in bounded windows. Once synced it keeps re-scanning a short look-back
//! window so logs retracted by shallow reorgs are re-observed with
//! `removed = true`.
use std::{
    ops::RangeInclusive,
    sync::Arc,
    time::{Duration, Instant},
};

use alloy_primitives::B256;
use derive_more::Debug;
use eyre::{Report, Result, WrapErr};
use extractor::{ExecutionSource, deposits::fetch_deposits};
use primitives::store::DepositStore;
use regex::Regex;
use tracing::{error, info};

/// Widest window scanned in one cycle while catching up.
pub const MAX_FETCH_BLOCKS: u64 = 1000;

/// Blocks re-scanned every cycle once synced.
pub const LOOKBACK_BLOCKS: u64 = 100;

/// Window used for the single retry after an oversized-result error.
pub const NARROWED_FETCH_BLOCKS: u64 = 100;

/// Pause after a failed cycle.
pub const ERROR_DELAY: Duration = Duration::from_secs(5);

/// Pause between cycles while behind the head.
pub const CATCH_UP_DELAY: Duration = Duration::from_secs(5);

/// Pause between cycles once synced.
pub const SYNCED_DELAY: Duration = Duration::from_secs(60);

/// Blocks to scan next.
///
/// Starts after both the highest persisted deposit and the last scanned block,
/// but never before the contract's first block. The window is capped at
/// [`MAX_FETCH_BLOCKS`] and the head. When fewer than [`LOOKBACK_BLOCKS`]
/// remain it is widened back to the last [`LOOKBACK_BLOCKS`] blocks.
pub fn select_scan_range(
    last_persisted: u64,
    last_fetched: u64,
    first_block: u64,
    head: u64,
) -> RangeInclusive<u64> {
    let mut from = (last_persisted + 1).max(last_fetched + 1).max(first_block);
    let to = head.min(from.saturating_add(MAX_FETCH_BLOCKS));
    if to.saturating_sub(from) < LOOKBACK_BLOCKS && to > LOOKBACK_BLOCKS {
        from = to - LOOKBACK_BLOCKS;
    }
    from..=to
}

/// How a failed log fetch should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorClass {
    /// The provider refused the window as too large; retry narrower.
    RangeTooLarge,
    /// Anything else; retry the same window next cycle.
    Transient,
}

/// Provider error phrasings that mean the queried window was too large.
///
/// These differ per provider, so they come from configuration.
#[derive(Debug, Clone)]
pub struct ProviderErrorPatterns(Vec<Regex>);

impl ProviderErrorPatterns {
    /// Compiles `patterns`.
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                Regex::new(p.as_ref())
                    .wrap_err_with(|| format!("invalid provider error pattern {:?}", p.as_ref()))
            })
            .collect::<Result<_>>()?;
        Ok(Self(patterns))
    }

    /// Classifies `err` by matching every message in its chain.
    pub fn classify(&self, err: &Report) -> FetchErrorClass {
        let oversized = err.chain().any(|cause| {
            let message = cause.to_string();
            self.0.iter().any(|re| re.is_match(&message))
        });
        if oversized { FetchErrorClass::RangeTooLarge } else { FetchErrorClass::Transient }
    }
}

/// Result of a successful scan cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The scanned window ended before the head.
    CatchingUp,
    /// The scanned window reached the head.
    Synced,
}

impl CycleOutcome {
    /// Pause before the next cycle.
    pub const fn delay(self) -> Duration {
        match self {
            Self::CatchingUp => CATCH_UP_DELAY,
            Self::Synced => SYNCED_DELAY,
        }
    }
}

/// Polling loop exporting deposit contract events into the store.
#[derive(Debug)]
pub struct DepositScanner {
    #[debug(skip)]
    source: Arc<dyn ExecutionSource>,
    #[debug(skip)]
    store: Arc<dyn DepositStore>,
    domain: B256,
    first_block: u64,
    patterns: ProviderErrorPatterns,
    /// Last block of the most recent successfully saved window.
    last_fetched: u64,
}

impl DepositScanner {
    /// Create a scanner verifying signatures against `domain`.
    pub fn new(
        source: Arc<dyn ExecutionSource>,
        store: Arc<dyn DepositStore>,
        domain: B256,
        first_block: u64,
        patterns: ProviderErrorPatterns,
    ) -> Self {
        Self { source, store, domain, first_block, patterns, last_fetched: 0 }
    }

    /// Runs cycles forever, pausing between them.
    pub async fn run(mut self) {
        info!(first_block = self.first_block, "Starting deposit scanner");
        loop {
            let delay = match self.run_cycle().await {
                Ok(outcome) => outcome.delay(),
                Err(err) => {
                    error!(err = format_args!("{err:#}"), "Error exporting deposits");
                    ERROR_DELAY
                }
            };
            tokio::time::sleep(delay).await;
        }
    }

    /// Scans and saves one window.
    ///
    /// Progress only advances once the window's deposits are saved, so a
    /// failed cycle is retried from the same state.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let start = Instant::now();
        let last_persisted = self
            .store
            .max_deposit_block()
            .await
            .wrap_err("error retrieving highest block number of deposits")?;
        let head = self.source.block_number().await.wrap_err("error getting execution head")?;

        let (from, mut to) =
            select_scan_range(last_persisted, self.last_fetched, self.first_block, head)
                .into_inner();

        let deposits = match fetch_deposits(self.source.as_ref(), self.domain, from, to).await {
            Ok(deposits) => deposits,
            Err(err) => match self.patterns.classify(&err) {
                FetchErrorClass::RangeTooLarge => {
                    to = head.min(from + NARROWED_FETCH_BLOCKS);
                    info!(from, to, "Limiting block range of deposit query after oversized result");
                    fetch_deposits(self.source.as_ref(), self.domain, from, to)
                        .await
                        .wrap_err_with(|| format!("error fetching deposits in {from}..={to}"))?
                }
                FetchErrorClass::Transient => {
                    return Err(err.wrap_err(format!("error fetching deposits in {from}..={to}")));
                }
            },
        };

        self.store.upsert_deposits(&deposits).await.wrap_err("error saving deposits")?;
        self.last_fetched = to;

        info!(
            elapsed_ms = start.elapsed().as_millis(),
            head,
            from,
            to,
            saved = deposits.len(),
            "Exported deposits"
        );

        Ok(if to == head { CycleOutcome::Synced } else { CycleOutcome::CatchingUp })
    }
}
