//! Committee assignments and epoch/slot snapshots.
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use alloy_primitives::B256;

use crate::{
    block::Block,
    validator::{Validator, ValidatorParticipation},
};

/// Position of a validator inside an attesting committee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttesterKey {
    /// Slot the committee attests in
    pub slot: u64,
    /// Committee index within the slot
    pub committee_index: u64,
    /// Position within the committee
    pub member_index: u64,
}

/// Proposer and attester duties of one epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpochAssignments {
    /// Proposer slot to validator index
    pub proposers: HashMap<u64, u64>,
    /// Committee position to validator index
    pub attesters: HashMap<AttesterKey, u64>,
}

impl EpochAssignments {
    /// Validator at `member_index` of committee `committee_index` in `slot`.
    pub fn attester(&self, slot: u64, committee_index: u64, member_index: u64) -> Option<u64> {
        self.attesters.get(&AttesterKey { slot, committee_index, member_index }).copied()
    }

    /// Both maps are populated; only complete assignments are cached.
    pub fn is_complete(&self) -> bool {
        !self.proposers.is_empty() && !self.attesters.is_empty()
    }
}

/// Blocks grouped by slot and then by block root.
pub type BlocksBySlot = BTreeMap<u64, HashMap<B256, Block>>;

/// Snapshot of a full epoch.
#[derive(Debug, Clone)]
pub struct EpochData {
    /// Epoch
    pub epoch: u64,
    /// Validators at the reference slot
    pub validators: Vec<Validator>,
    /// Duties of the epoch
    pub assignments: Arc<EpochAssignments>,
    /// Observed blocks plus placeholders for unfilled proposer duties
    pub blocks: BlocksBySlot,
    /// Participation statistics
    pub participation: ValidatorParticipation,
}

/// Snapshot taken for a single observed block.
#[derive(Debug, Clone)]
pub struct SlotData {
    /// Epoch of the slot
    pub epoch: u64,
    /// Slot
    pub slot: u64,
    /// Validators at the slot
    pub validators: Vec<Validator>,
    /// The observed block
    pub blocks: BlocksBySlot,
}
