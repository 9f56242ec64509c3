//! Validator and chain-state views.
use alloy_primitives::{B256, Bytes};
use serde::{Deserialize, Serialize};

/// A validator as of one snapshot slot, with derived historical fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    /// Registry index
    pub index: u64,
    /// BLS public key
    pub public_key: Bytes,
    /// Withdrawal credentials
    pub withdrawal_credentials: Bytes,
    /// Balance in gwei
    pub balance: u64,
    /// Effective balance in gwei
    pub effective_balance: u64,
    /// Slashed flag
    pub slashed: bool,
    /// Activation eligibility epoch
    pub activation_eligibility_epoch: u64,
    /// Activation epoch
    pub activation_epoch: u64,
    /// Exit epoch
    pub exit_epoch: u64,
    /// Withdrawable epoch
    pub withdrawable_epoch: u64,
    /// Lifecycle status as reported by the node
    pub status: String,
    /// Balance about one day earlier
    pub balance_1d: u64,
    /// Balance about seven days earlier
    pub balance_7d: u64,
    /// Balance about thirty-one days earlier
    pub balance_31d: u64,
    /// Cumulative withdrawals up to the snapshot slot
    pub withdrawal: u64,
    /// Cumulative withdrawals about one day earlier
    pub withdrawal_1d: u64,
    /// Cumulative withdrawals about seven days earlier
    pub withdrawal_7d: u64,
    /// Cumulative withdrawals about thirty-one days earlier
    pub withdrawal_31d: u64,
}

/// Head, finality and justification view of the chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    /// Head slot
    pub head_slot: u64,
    /// Head epoch
    pub head_epoch: u64,
    /// Head block root
    pub head_block_root: B256,
    /// Finalized slot
    pub finalized_slot: u64,
    /// Finalized epoch
    pub finalized_epoch: u64,
    /// Finalized block root
    pub finalized_block_root: B256,
    /// Justified slot
    pub justified_slot: u64,
    /// Justified epoch
    pub justified_epoch: u64,
    /// Justified block root
    pub justified_block_root: B256,
    /// Previous justified slot
    pub previous_justified_slot: u64,
    /// Previous justified epoch
    pub previous_justified_epoch: u64,
    /// Previous justified block root
    pub previous_justified_block_root: B256,
}

/// Target-vote participation of an epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidatorParticipation {
    /// Epoch
    pub epoch: u64,
    /// Whether the epoch is finalized
    pub finalized: bool,
    /// `voted_ether / eligible_ether`
    pub global_participation_rate: f64,
    /// Target-attesting gwei of the previous epoch
    pub voted_ether: u64,
    /// Active gwei of the previous epoch
    pub eligible_ether: u64,
}

impl ValidatorParticipation {
    /// The record reported when participation could not be fetched.
    pub fn unavailable(epoch: u64) -> Self {
        Self { epoch, ..Default::default() }
    }

    /// Builds a record from gwei totals.
    pub fn from_gwei(epoch: u64, finalized: bool, voted: u64, eligible: u64) -> Self {
        let rate = if eligible == 0 { 0.0 } else { voted as f64 / eligible as f64 };
        Self {
            epoch,
            finalized,
            global_participation_rate: rate,
            voted_ether: voted,
            eligible_ether: eligible,
        }
    }
}

/// Sizes of the activation and exit queues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorQueue {
    /// Validators waiting for activation
    pub activating: u64,
    /// Validators waiting to exit
    pub exiting: u64,
}

/// Canonical status of a block root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonBlock {
    /// Block root
    pub block_root: B256,
    /// Slot
    pub slot: u64,
    /// Whether the node considers it canonical
    pub canonical: bool,
}

/// Members of a sync committee.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCommittee {
    /// Validator indices, in committee order
    pub validators: Vec<u64>,
    /// Validator indices per subcommittee
    pub validator_aggregates: Vec<Vec<u64>>,
}
