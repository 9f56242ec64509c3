//! Row types of the beaconscope tables.
use clickhouse::Row;
use primitives::{
    block::{Block, BlockStatus, Withdrawal},
    deposit::Deposit,
    epoch::{BlocksBySlot, EpochData},
    validator::Validator,
};
use serde::{Deserialize, Serialize};

/// Execution-layer deposit
#[derive(Debug, Row, Serialize, Deserialize, PartialEq, Eq)]
pub struct DepositRow {
    /// Transaction hash
    pub tx_hash: [u8; 32],
    /// Transaction input, 0x-prefixed hex
    pub tx_input: String,
    /// Index of the transaction in its block
    pub tx_index: u64,
    /// Block number
    pub block_number: u64,
    /// Block timestamp
    pub block_ts: u64,
    /// Sender of the transaction
    pub from_address: [u8; 20],
    /// Validator public key, 0x-prefixed hex
    pub publickey: String,
    /// Withdrawal credentials, 0x-prefixed hex
    pub withdrawal_credentials: String,
    /// Amount in gwei
    pub amount: u64,
    /// BLS signature, 0x-prefixed hex
    pub signature: String,
    /// Position in the deposit merkle tree
    pub merkletree_index: u64,
    /// Log was removed by a reorg
    pub removed: bool,
    /// Signature verified against the deposit domain
    pub valid_signature: bool,
}

impl From<&Deposit> for DepositRow {
    fn from(d: &Deposit) -> Self {
        Self {
            tx_hash: d.tx_hash.0,
            tx_input: d.tx_input.to_string(),
            tx_index: d.tx_index,
            block_number: d.block_number,
            block_ts: d.block_ts,
            from_address: d.from_address.into_array(),
            publickey: d.public_key.to_string(),
            withdrawal_credentials: d.withdrawal_credentials.to_string(),
            amount: d.amount,
            signature: d.signature.to_string(),
            merkletree_index: d.merkletree_index,
            removed: d.removed,
            valid_signature: d.valid_signature,
        }
    }
}

/// Beacon block or placeholder for an unfilled proposer duty
#[derive(Debug, Row, Serialize, Deserialize, PartialEq)]
pub struct BlockRow {
    /// Slot
    pub slot: u64,
    /// Block root, zero for placeholders
    pub block_root: [u8; 32],
    /// 0 scheduled, 1 proposed, 2 missed
    pub status: u8,
    /// Block is on the canonical chain
    pub canonical: bool,
    /// Proposer index
    pub proposer: u64,
    /// Parent root
    pub parent_root: [u8; 32],
    /// State root
    pub state_root: [u8; 32],
    /// Block signature
    pub signature: String,
    /// RANDAO reveal
    pub randao_reveal: String,
    /// Graffiti
    pub graffiti: String,
    /// Voted deposit root
    pub eth1_deposit_root: String,
    /// Voted deposit count
    pub eth1_deposit_count: u64,
    /// Voted execution block hash
    pub eth1_block_hash: String,
    /// Proposer slashings
    pub proposer_slashings_count: u32,
    /// Attester slashings
    pub attester_slashings_count: u32,
    /// Attestations
    pub attestations_count: u32,
    /// Deposits
    pub deposits_count: u32,
    /// Voluntary exits
    pub voluntary_exits_count: u32,
    /// Share of the sync committee that signed
    pub sync_participation: Option<f64>,
    /// Execution block number
    pub exec_block_number: Option<u64>,
    /// Execution block hash
    pub exec_block_hash: Option<[u8; 32]>,
    /// Execution fee recipient
    pub exec_fee_recipient: Option<[u8; 20]>,
    /// Execution base fee
    pub exec_base_fee_per_gas: Option<u64>,
    /// Execution transactions
    pub exec_transactions_count: u32,
    /// BLS to execution changes
    pub bls_changes_count: Option<u32>,
}

fn count<T>(items: &[T]) -> u32 {
    u32::try_from(items.len()).unwrap_or(u32::MAX)
}

impl From<&Block> for BlockRow {
    fn from(b: &Block) -> Self {
        let payload = b.execution_payload.as_ref();
        Self {
            slot: b.slot,
            block_root: b.block_root.0,
            status: b.status.code(),
            canonical: b.canonical,
            proposer: b.proposer,
            parent_root: b.parent_root.0,
            state_root: b.state_root.0,
            signature: b.signature.to_string(),
            randao_reveal: b.randao_reveal.to_string(),
            graffiti: b.graffiti.to_string(),
            eth1_deposit_root: b.eth1_data.deposit_root.to_string(),
            eth1_deposit_count: b.eth1_data.deposit_count,
            eth1_block_hash: b.eth1_data.block_hash.to_string(),
            proposer_slashings_count: count(&b.proposer_slashings),
            attester_slashings_count: count(&b.attester_slashings),
            attestations_count: count(&b.attestations),
            deposits_count: count(&b.deposits),
            voluntary_exits_count: count(&b.voluntary_exits),
            sync_participation: b.sync_aggregate.as_ref().map(|s| s.participation),
            exec_block_number: payload.map(|p| p.block_number),
            exec_block_hash: payload.map(|p| p.block_hash.0),
            exec_fee_recipient: payload.map(|p| p.fee_recipient.into_array()),
            exec_base_fee_per_gas: payload.map(|p| p.base_fee_per_gas),
            exec_transactions_count: payload.map_or(0, |p| count(&p.transactions)),
            bls_changes_count: b.bls_to_execution_changes.as_deref().map(count),
        }
    }
}

/// Attestation included in a block, with resolved attesters
#[derive(Debug, Row, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttestationRow {
    /// Slot of the including block
    pub slot: u64,
    /// Root of the including block
    pub block_root: [u8; 32],
    /// Position in the block body
    pub attestation_index: u32,
    /// Aggregation bitlist
    pub aggregation_bits: String,
    /// Validator indices of the set bits
    pub attesters: Vec<u64>,
    /// Slot attested to
    pub attestation_slot: u64,
    /// Committee index
    pub committee_index: u64,
    /// Head vote
    pub beacon_block_root: [u8; 32],
    /// Source checkpoint epoch
    pub source_epoch: u64,
    /// Target checkpoint epoch
    pub target_epoch: u64,
}

impl AttestationRow {
    /// Rows for every attestation of `block`.
    pub fn from_block(block: &Block) -> impl Iterator<Item = Self> + '_ {
        block.attestations.iter().enumerate().map(|(i, a)| Self {
            slot: block.slot,
            block_root: block.block_root.0,
            attestation_index: u32::try_from(i).unwrap_or(u32::MAX),
            aggregation_bits: a.aggregation_bits.to_string(),
            attesters: a.attesters.clone(),
            attestation_slot: a.data.slot,
            committee_index: a.data.committee_index,
            beacon_block_root: a.data.beacon_block_root.0,
            source_epoch: a.data.source.epoch,
            target_epoch: a.data.target.epoch,
        })
    }
}

/// Withdrawal processed by a block
#[derive(Debug, Row, Serialize, Deserialize, PartialEq, Eq)]
pub struct WithdrawalRow {
    /// Slot of the including block
    pub slot: u64,
    /// Root of the including block
    pub block_root: [u8; 32],
    /// Withdrawal index
    pub withdrawal_index: u64,
    /// Validator index
    pub validator_index: u64,
    /// Recipient
    pub address: [u8; 20],
    /// Amount in gwei
    pub amount: u64,
}

impl From<&Withdrawal> for WithdrawalRow {
    fn from(w: &Withdrawal) -> Self {
        Self {
            slot: w.slot,
            block_root: w.block_root.0,
            withdrawal_index: w.index,
            validator_index: w.validator_index,
            address: w.address.into_array(),
            amount: w.amount,
        }
    }
}

/// Latest known state of a validator
#[derive(Debug, Row, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidatorRow {
    /// Validator index
    pub validator_index: u64,
    /// Epoch of the snapshot this row was taken from
    pub snapshot_epoch: u64,
    /// Public key
    pub pubkey: String,
    /// Withdrawal credentials
    pub withdrawal_credentials: String,
    /// Balance in gwei
    pub balance: u64,
    /// Effective balance in gwei
    pub effective_balance: u64,
    /// Slashed
    pub slashed: bool,
    /// Activation eligibility epoch
    pub activation_eligibility_epoch: u64,
    /// Activation epoch
    pub activation_epoch: u64,
    /// Exit epoch
    pub exit_epoch: u64,
    /// Withdrawable epoch
    pub withdrawable_epoch: u64,
    /// Status
    pub status: String,
    /// Balance one day earlier
    pub balance_1d: u64,
    /// Balance seven days earlier
    pub balance_7d: u64,
    /// Balance 31 days earlier
    pub balance_31d: u64,
    /// Total withdrawn
    pub withdrawal: u64,
    /// Total withdrawn one day earlier
    pub withdrawal_1d: u64,
    /// Total withdrawn seven days earlier
    pub withdrawal_7d: u64,
    /// Total withdrawn 31 days earlier
    pub withdrawal_31d: u64,
}

impl ValidatorRow {
    /// Row for `v` as seen in `epoch`.
    pub fn new(epoch: u64, v: &Validator) -> Self {
        Self {
            validator_index: v.index,
            snapshot_epoch: epoch,
            pubkey: v.public_key.to_string(),
            withdrawal_credentials: v.withdrawal_credentials.to_string(),
            balance: v.balance,
            effective_balance: v.effective_balance,
            slashed: v.slashed,
            activation_eligibility_epoch: v.activation_eligibility_epoch,
            activation_epoch: v.activation_epoch,
            exit_epoch: v.exit_epoch,
            withdrawable_epoch: v.withdrawable_epoch,
            status: v.status.clone(),
            balance_1d: v.balance_1d,
            balance_7d: v.balance_7d,
            balance_31d: v.balance_31d,
            withdrawal: v.withdrawal,
            withdrawal_1d: v.withdrawal_1d,
            withdrawal_7d: v.withdrawal_7d,
            withdrawal_31d: v.withdrawal_31d,
        }
    }
}

/// Epoch summary
#[derive(Debug, Row, Serialize, Deserialize, PartialEq)]
pub struct EpochRow {
    /// Epoch
    pub epoch: u64,
    /// Blocks and placeholders
    pub blocks_count: u32,
    /// Proposed blocks
    pub proposed_count: u32,
    /// Missed proposer duties
    pub missed_count: u32,
    /// Proposer duties still ahead
    pub scheduled_count: u32,
    /// Validators in the snapshot
    pub validators_count: u32,
    /// Epoch is finalized
    pub finalized: bool,
    /// Share of eligible ether that voted
    pub global_participation_rate: f64,
    /// Voted ether in gwei
    pub voted_ether: u64,
    /// Eligible ether in gwei
    pub eligible_ether: u64,
}

impl From<&EpochData> for EpochRow {
    fn from(data: &EpochData) -> Self {
        let mut row = Self {
            epoch: data.epoch,
            blocks_count: 0,
            proposed_count: 0,
            missed_count: 0,
            scheduled_count: 0,
            validators_count: count(&data.validators),
            finalized: data.participation.finalized,
            global_participation_rate: data.participation.global_participation_rate,
            voted_ether: data.participation.voted_ether,
            eligible_ether: data.participation.eligible_ether,
        };
        for block in all_blocks(&data.blocks) {
            row.blocks_count += 1;
            match block.status {
                BlockStatus::Scheduled => row.scheduled_count += 1,
                BlockStatus::Proposed => row.proposed_count += 1,
                BlockStatus::Missed => row.missed_count += 1,
            }
        }
        row
    }
}

/// Every block of `blocks`, ordered by slot.
pub fn all_blocks(blocks: &BlocksBySlot) -> impl Iterator<Item = &Block> {
    blocks.values().flat_map(|by_root| by_root.values())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{collections::HashMap, sync::Arc};

    use alloy_primitives::{Address, B256, Bytes};
    use primitives::{
        block::{ExecutionPayload, SyncAggregate},
        validator::ValidatorParticipation,
    };

    #[test]
    fn block_row_flattens_payload() {
        let block = Block {
            status: BlockStatus::Proposed,
            slot: 9,
            block_root: B256::repeat_byte(7),
            graffiti: Bytes::from_static(b"hi"),
            sync_aggregate: Some(SyncAggregate { participation: 0.5, ..Default::default() }),
            execution_payload: Some(ExecutionPayload {
                block_number: 100,
                fee_recipient: Address::repeat_byte(2),
                base_fee_per_gas: 7,
                ..Default::default()
            }),
            ..Default::default()
        };

        let row = BlockRow::from(&block);
        assert_eq!(row.status, 1);
        assert_eq!(row.block_root, [7u8; 32]);
        assert_eq!(row.graffiti, "0x6869");
        assert_eq!(row.sync_participation, Some(0.5));
        assert_eq!(row.exec_block_number, Some(100));
        assert_eq!(row.exec_fee_recipient, Some([2u8; 20]));
        assert_eq!(row.exec_transactions_count, 0);
        assert_eq!(row.bls_changes_count, None);
    }

    #[test]
    fn epoch_row_counts_statuses() {
        let mut blocks = BlocksBySlot::new();
        for (slot, status) in
            [(32, BlockStatus::Proposed), (33, BlockStatus::Missed), (34, BlockStatus::Scheduled)]
        {
            let block = if status == BlockStatus::Proposed {
                Block { slot, status, block_root: B256::repeat_byte(1), ..Default::default() }
            } else {
                Block::placeholder(slot, 3, status)
            };
            blocks.entry(slot).or_insert_with(HashMap::new).insert(block.block_root, block);
        }
        let data = EpochData {
            epoch: 1,
            validators: vec![Validator::default(); 4],
            assignments: Arc::default(),
            blocks,
            participation: ValidatorParticipation::from_gwei(1, true, 30, 40),
        };

        let row = EpochRow::from(&data);
        assert_eq!(row.blocks_count, 3);
        assert_eq!((row.proposed_count, row.missed_count, row.scheduled_count), (1, 1, 1));
        assert_eq!(row.validators_count, 4);
        assert!(row.finalized);
        assert!((row.global_participation_rate - 0.75).abs() < f64::EPSILON);
    }
}
