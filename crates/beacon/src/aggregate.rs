//! Pieces shared by the epoch and slot snapshots.
//!
//! Historical balances and withdrawals are enrichment data: a failed lookup
//! is logged and leaves the affected fields at zero.
use std::{collections::HashMap, ops::Bound, time::Instant};

use alloy_primitives::B256;
use chrono::{DateTime, TimeDelta, Utc};
use eyre::{Result, WrapErr};
use primitives::{
    block::{Block, BlockStatus},
    chain::{ChainConfig, HistoricalSlots},
    epoch::{BlocksBySlot, EpochAssignments},
    store::WithdrawalStore,
    validator::Validator,
};
use tracing::{debug, error};

use crate::{node::BeaconNode, wire::StateValidator};

/// Placeholders for slots starting later than this before now are scheduled,
/// older ones are missed.
pub const SCHEDULED_GRACE: TimeDelta = TimeDelta::seconds(60);

/// Balances and cumulative withdrawals at the historical reference slots.
///
/// Maps a lookup could not fill stay empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoricalData {
    /// Withdrawals up to the reference slot
    pub withdrawals: HashMap<u64, u64>,
    /// Balances one day earlier
    pub balances_1d: HashMap<u64, u64>,
    /// Withdrawals one day earlier
    pub withdrawals_1d: HashMap<u64, u64>,
    /// Balances seven days earlier
    pub balances_7d: HashMap<u64, u64>,
    /// Withdrawals seven days earlier
    pub withdrawals_7d: HashMap<u64, u64>,
    /// Balances thirty-one days earlier
    pub balances_31d: HashMap<u64, u64>,
    /// Withdrawals thirty-one days earlier
    pub withdrawals_31d: HashMap<u64, u64>,
}

/// Slot the validator set of `epoch` is read at.
///
/// Without an observed head this is the epoch's first slot, otherwise its last
/// slot capped at the head.
pub const fn reference_slot(chain: &ChainConfig, epoch: u64, head_slot: u64) -> u64 {
    if head_slot == 0 {
        return chain.first_slot(epoch);
    }
    let last = chain.last_slot(epoch);
    if head_slot < last { head_slot } else { last }
}

/// Validator balances of the state at `slot`.
pub async fn balances_for_slot(node: &dyn BeaconNode, slot: u64) -> Result<HashMap<u64, u64>> {
    let balances = node
        .state_balances(&slot.to_string())
        .await
        .wrap_err_with(|| format!("error retrieving validator balances for slot {slot}"))?;
    Ok(balances.into_iter().map(|b| (b.index, b.balance)).collect())
}

/// Runs the historical lookups concurrently and waits for all of them.
pub async fn fetch_historical(
    node: &dyn BeaconNode,
    store: &dyn WithdrawalStore,
    slots: HistoricalSlots,
) -> HistoricalData {
    let current = async {
        let start = Instant::now();
        match store.total_withdrawals_at(slots.current).await {
            Ok(totals) => {
                let elapsed_ms = start.elapsed().as_millis();
                debug!(slot = slots.current, elapsed_ms, "Fetched withdrawal totals");
                totals
            }
            Err(err) => {
                error!(slot = slots.current, err = %err, "Error retrieving validator total withdrawals");
                HashMap::new()
            }
        }
    };

    let (withdrawals, day_1, day_7, day_31) = tokio::join!(
        current,
        fetch_offset(node, store, slots.day_1, "1d"),
        fetch_offset(node, store, slots.day_7, "7d"),
        fetch_offset(node, store, slots.day_31, "31d"),
    );

    HistoricalData {
        withdrawals,
        balances_1d: day_1.0,
        withdrawals_1d: day_1.1,
        balances_7d: day_7.0,
        withdrawals_7d: day_7.1,
        balances_31d: day_31.0,
        withdrawals_31d: day_31.1,
    }
}

/// Balances, then withdrawal totals, at one offset. A failed balance lookup
/// skips the withdrawal lookup.
async fn fetch_offset(
    node: &dyn BeaconNode,
    store: &dyn WithdrawalStore,
    slot: u64,
    label: &'static str,
) -> (HashMap<u64, u64>, HashMap<u64, u64>) {
    let start = Instant::now();
    let balances = match balances_for_slot(node, slot).await {
        Ok(balances) => balances,
        Err(err) => {
            error!(slot, offset = label, err = %err, "Error retrieving historical balances");
            return (HashMap::new(), HashMap::new());
        }
    };
    let withdrawals = match store.total_withdrawals_at(slot).await {
        Ok(withdrawals) => withdrawals,
        Err(err) => {
            error!(slot, offset = label, err = %err, "Error retrieving historical withdrawal totals");
            return (balances, HashMap::new());
        }
    };
    let elapsed_ms = start.elapsed().as_millis();
    debug!(slot, offset = label, elapsed_ms, "Fetched historical balances");
    (balances, withdrawals)
}

/// Adds the withdrawals of blocks after `head_slot` to `totals`.
///
/// The store only knows about blocks up to the head it has seen, so withdrawals
/// of newer blocks are counted here.
pub fn fold_withdrawals(blocks: &BlocksBySlot, head_slot: u64, totals: &mut HashMap<u64, u64>) {
    for block in blocks
        .range((Bound::Excluded(head_slot), Bound::Unbounded))
        .flat_map(|(_, by_root)| by_root.values())
    {
        for w in block.withdrawals() {
            *totals.entry(w.validator_index).or_default() += w.amount;
        }
    }
}

/// Inserts a placeholder for every assigned proposer slot without a block.
pub fn fill_placeholders(
    blocks: &mut BlocksBySlot,
    assignments: &EpochAssignments,
    chain: &ChainConfig,
    now: DateTime<Utc>,
) {
    for (&slot, &proposer) in &assignments.proposers {
        if blocks.contains_key(&slot) {
            continue;
        }
        let status = if chain.slot_time(slot) > now - SCHEDULED_GRACE {
            BlockStatus::Scheduled
        } else {
            BlockStatus::Missed
        };
        blocks
            .entry(slot)
            .or_default()
            .insert(B256::ZERO, Block::placeholder(slot, proposer, status));
    }
}

/// Combines the node's validator entries with the historical lookups.
/// Validators missing from a map get zero.
pub fn merge_validators(validators: Vec<StateValidator>, hist: &HistoricalData) -> Vec<Validator> {
    let at = |map: &HashMap<u64, u64>, index: u64| map.get(&index).copied().unwrap_or_default();

    validators
        .into_iter()
        .map(|v| {
            let index = v.index;
            Validator {
                index,
                public_key: v.validator.pubkey,
                withdrawal_credentials: v.validator.withdrawal_credentials,
                balance: v.balance,
                effective_balance: v.validator.effective_balance,
                slashed: v.validator.slashed,
                activation_eligibility_epoch: v.validator.activation_eligibility_epoch,
                activation_epoch: v.validator.activation_epoch,
                exit_epoch: v.validator.exit_epoch,
                withdrawable_epoch: v.validator.withdrawable_epoch,
                status: v.status,
                balance_1d: at(&hist.balances_1d, index),
                balance_7d: at(&hist.balances_7d, index),
                balance_31d: at(&hist.balances_31d, index),
                withdrawal: at(&hist.withdrawals, index),
                withdrawal_1d: at(&hist.withdrawals_1d, index),
                withdrawal_7d: at(&hist.withdrawals_7d, index),
                withdrawal_31d: at(&hist.withdrawals_31d, index),
            }
        })
        .collect()
}

/// Groups blocks by slot and root.
pub fn group_blocks(blocks: impl IntoIterator<Item = Block>) -> BlocksBySlot {
    let mut grouped = BlocksBySlot::new();
    for block in blocks {
        grouped.entry(block.slot).or_default().insert(block.block_root, block);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    use primitives::block::{ExecutionPayload, Withdrawal};

    use crate::{
        testing::{FakeNode, FakeWithdrawals},
        wire::StateBalance,
    };

    fn block_with_withdrawal(slot: u64, validator_index: u64, amount: u64) -> Block {
        Block {
            status: BlockStatus::Proposed,
            slot,
            block_root: B256::repeat_byte(slot as u8),
            execution_payload: Some(ExecutionPayload {
                withdrawals: vec![Withdrawal { slot, validator_index, amount, ..Default::default() }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn reference_slot_follows_head() {
        let chain = ChainConfig::default();
        assert_eq!(reference_slot(&chain, 3, 0), 96);
        assert_eq!(reference_slot(&chain, 3, 100), 100);
        assert_eq!(reference_slot(&chain, 3, 500), 127);
    }

    #[test]
    fn only_blocks_past_head_are_folded() {
        let blocks = group_blocks([block_with_withdrawal(100, 1, 10), block_with_withdrawal(101, 1, 5)]);
        let mut totals = HashMap::from([(1, 1_000)]);

        fold_withdrawals(&blocks, 100, &mut totals);
        assert_eq!(totals[&1], 1_005);

        fold_withdrawals(&blocks, 99, &mut totals);
        assert_eq!(totals[&1], 1_020);
    }

    #[test]
    fn placeholders_scheduled_or_missed_by_slot_time() {
        let chain = ChainConfig { genesis_timestamp: 1_000_000, ..Default::default() };
        let mut assignments = EpochAssignments::default();
        assignments.proposers.insert(64, 7);
        assignments.proposers.insert(65, 8);
        assignments.proposers.insert(66, 9);
        let mut blocks = group_blocks([block_with_withdrawal(64, 1, 1)]);
        // Slot 65 started 70s ago, slot 66 58s ago.
        let now = chain.slot_time(65) + TimeDelta::seconds(70);

        fill_placeholders(&mut blocks, &assignments, &chain, now);

        assert_eq!(blocks[&64].len(), 1);
        assert!(!blocks[&64].values().any(Block::is_placeholder));
        assert_eq!(blocks[&65][&B256::ZERO].status, BlockStatus::Missed);
        assert_eq!(blocks[&65][&B256::ZERO].proposer, 8);
        assert_eq!(blocks[&66][&B256::ZERO].status, BlockStatus::Scheduled);
    }

    #[test]
    fn merge_defaults_missing_indices_to_zero() {
        let hist = HistoricalData {
            balances_1d: HashMap::from([(1, 31)]),
            withdrawals: HashMap::from([(2, 7)]),
            ..Default::default()
        };
        let entry = |index| StateValidator { index, balance: 32, ..Default::default() };

        let merged = merge_validators(vec![entry(1), entry(2)], &hist);
        assert_eq!(merged[0].balance_1d, 31);
        assert_eq!(merged[0].withdrawal, 0);
        assert_eq!(merged[1].balance_1d, 0);
        assert_eq!(merged[1].withdrawal, 7);
    }

    #[tokio::test]
    async fn failed_offsets_degrade_to_empty_maps() {
        let node = FakeNode::default();
        // 1d balances exist, 7d and 31d do not.
        node.set_balances("92800", vec![StateBalance { index: 1, balance: 33 }]);
        let store = FakeWithdrawals::default();
        store.set(100_000, HashMap::from([(1, 5)]));
        store.set(92_800, HashMap::from([(1, 4)]));

        let hist = fetch_historical(&node, &store, HistoricalSlots::from_reference(100_000)).await;

        assert_eq!(hist.withdrawals, HashMap::from([(1, 5)]));
        assert_eq!(hist.balances_1d, HashMap::from([(1, 33)]));
        assert_eq!(hist.withdrawals_1d, HashMap::from([(1, 4)]));
        assert!(hist.balances_7d.is_empty());
        assert!(hist.withdrawals_7d.is_empty());
        assert!(hist.balances_31d.is_empty());
    }

    #[tokio::test]
    async fn store_failure_keeps_balances() {
        let node = FakeNode::default();
        node.set_balances("0", vec![StateBalance { index: 3, balance: 32 }]);
        let store = FakeWithdrawals::failing();

        let hist = fetch_historical(&node, &store, HistoricalSlots::from_reference(10)).await;

        assert!(hist.withdrawals.is_empty());
        assert_eq!(hist.balances_1d, HashMap::from([(3, 32)]));
        assert!(hist.withdrawals_1d.is_empty());
        assert_eq!(hist.balances_31d, HashMap::from([(3, 32)]));
    }
}
