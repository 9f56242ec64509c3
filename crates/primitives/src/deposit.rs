//! Deposit contract records.
use alloy_primitives::{Address, B256, Bytes};
use serde::{Deserialize, Serialize};

/// A deposit observed on the execution layer deposit contract.
///
/// Rows are keyed by `(tx_hash, merkletree_index)`. Re-persisting the same key
/// overwrites every other field, which is how reorg-driven `removed` flips and
/// late block metadata land in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    /// Hash of the transaction that emitted the deposit event
    pub tx_hash: B256,
    /// Position of the transaction in its block
    pub tx_index: u64,
    /// Calldata of the source transaction
    pub tx_input: Bytes,
    /// Execution block number containing the log
    pub block_number: u64,
    /// Execution block timestamp in seconds
    pub block_ts: u64,
    /// Recovered sender of the source transaction
    pub from_address: Address,
    /// BLS public key of the validator
    pub public_key: Bytes,
    /// Withdrawal credentials committed to by the deposit
    pub withdrawal_credentials: Bytes,
    /// Amount in gwei
    pub amount: u64,
    /// BLS signature over the deposit message
    pub signature: Bytes,
    /// Index of the deposit in the contract merkle tree
    pub merkletree_index: u64,
    /// Set when the originating log was retracted by a reorg
    pub removed: bool,
    /// Whether the signature verified against the network deposit domain
    pub valid_signature: bool,
}

impl Deposit {
    /// Unique key of this deposit.
    pub const fn key(&self) -> (B256, u64) {
        (self.tx_hash, self.merkletree_index)
    }
}
