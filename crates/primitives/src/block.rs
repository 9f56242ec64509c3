//! Canonical, protocol-version independent beacon block model.
use alloy_primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};

/// Proposal state of a block record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockStatus {
    /// An assigned proposal that has not been observed yet
    #[default]
    Scheduled,
    /// A block returned by the node
    Proposed,
    /// An assigned proposal whose slot passed without a block
    Missed,
}

impl BlockStatus {
    /// Numeric code used by the store.
    pub const fn code(self) -> u8 {
        match self {
            Self::Scheduled => 0,
            Self::Proposed => 1,
            Self::Missed => 2,
        }
    }
}

/// Eth1 voting data carried by every block body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eth1Data {
    /// Deposit tree root
    pub deposit_root: Bytes,
    /// Number of deposits
    pub deposit_count: u64,
    /// Execution block hash
    pub block_hash: Bytes,
}

/// A signed block header, as embedded in a proposer slashing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBlockHeader {
    /// Slot
    pub slot: u64,
    /// Proposer index
    pub proposer_index: u64,
    /// Parent root
    pub parent_root: B256,
    /// State root
    pub state_root: B256,
    /// Body root
    pub body_root: B256,
    /// Header signature
    pub signature: Bytes,
}

/// Two conflicting headers signed by the same proposer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposerSlashing {
    /// Slashed proposer
    pub proposer_index: u64,
    /// First header
    pub header_1: SignedBlockHeader,
    /// Second header
    pub header_2: SignedBlockHeader,
}

/// Epoch checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Epoch
    pub epoch: u64,
    /// Block root
    pub root: B256,
}

/// The vote an attestation signs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationData {
    /// Slot of the attestation
    pub slot: u64,
    /// Committee index within the slot
    pub committee_index: u64,
    /// LMD-GHOST vote
    pub beacon_block_root: B256,
    /// FFG source
    pub source: Checkpoint,
    /// FFG target
    pub target: Checkpoint,
}

/// An attestation with its participants already listed by index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedAttestation {
    /// Vote
    pub data: AttestationData,
    /// Participating validators
    pub attesting_indices: Vec<u64>,
    /// Aggregate signature
    pub signature: Bytes,
}

/// Two conflicting attestations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttesterSlashing {
    /// First attestation
    pub attestation_1: IndexedAttestation,
    /// Second attestation
    pub attestation_2: IndexedAttestation,
}

/// An aggregate attestation included in a block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    /// Raw aggregation bitlist, including the length sentinel bit
    pub aggregation_bits: Bytes,
    /// Validator indices resolved from the set bits, in committee order
    pub attesters: Vec<u64>,
    /// Vote
    pub data: AttestationData,
    /// Aggregate signature
    pub signature: Bytes,
}

/// A deposit processed by the consensus layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDeposit {
    /// Merkle proof against the deposit root
    pub proof: Vec<B256>,
    /// Validator public key
    pub public_key: Bytes,
    /// Withdrawal credentials
    pub withdrawal_credentials: Bytes,
    /// Amount in gwei
    pub amount: u64,
    /// Deposit signature
    pub signature: Bytes,
}

/// A signed voluntary exit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoluntaryExit {
    /// Earliest exit epoch
    pub epoch: u64,
    /// Exiting validator
    pub validator_index: u64,
    /// Signature
    pub signature: Bytes,
}

/// Sync committee aggregate, present from the second protocol revision on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncAggregate {
    /// Participation bitvector
    pub bits: Bytes,
    /// Aggregate signature
    pub signature: Bytes,
    /// Fraction of set bits, in `[0, 1]`
    pub participation: f64,
}

/// A decoded execution transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// EIP-2718 encoded bytes
    pub raw: Bytes,
    /// Transaction hash
    pub hash: B256,
    /// Sender nonce
    pub nonce: u64,
    /// Gas price (fee cap for dynamic fee transactions)
    pub gas_price: u128,
    /// Gas limit
    pub gas_limit: u64,
    /// Recovered sender
    pub sender: Address,
    /// Recipient, `None` for contract creations
    pub recipient: Option<Address>,
    /// Transferred value in wei
    pub value: U256,
    /// Calldata
    pub input: Bytes,
    /// Priority fee cap (gas price for legacy transactions)
    pub max_priority_fee_per_gas: u128,
    /// Fee cap (gas price for legacy transactions)
    pub max_fee_per_gas: u128,
}

/// A withdrawal executed in a payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    /// Slot of the block carrying the withdrawal
    pub slot: u64,
    /// Root of the block carrying the withdrawal
    pub block_root: B256,
    /// Global withdrawal index
    pub index: u64,
    /// Validator being withdrawn from
    pub validator_index: u64,
    /// Execution address receiving the funds
    pub address: Address,
    /// Amount in gwei
    pub amount: u64,
}

/// A signed BLS to execution credential change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlsToExecutionChange {
    /// Validator changing its credentials
    pub validator_index: u64,
    /// Current BLS withdrawal key
    pub from_bls_pubkey: Bytes,
    /// New execution withdrawal address
    pub to_execution_address: Address,
    /// Signature
    pub signature: Bytes,
}

/// Execution payload, present from the third protocol revision on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPayload {
    /// Parent execution block hash
    pub parent_hash: B256,
    /// Fee recipient
    pub fee_recipient: Address,
    /// State root
    pub state_root: B256,
    /// Receipts root
    pub receipts_root: B256,
    /// Logs bloom
    pub logs_bloom: Bytes,
    /// RANDAO mix of the previous slot
    pub prev_randao: B256,
    /// Execution block number
    pub block_number: u64,
    /// Gas limit
    pub gas_limit: u64,
    /// Gas used
    pub gas_used: u64,
    /// Timestamp
    pub timestamp: u64,
    /// Extra data
    pub extra_data: Bytes,
    /// Base fee, read from the low 8 little-endian bytes
    pub base_fee_per_gas: u64,
    /// Execution block hash
    pub block_hash: B256,
    /// Decoded transactions
    pub transactions: Vec<Transaction>,
    /// Withdrawals; always empty before the fourth revision
    pub withdrawals: Vec<Withdrawal>,
}

/// One proposal attempt at a slot, keyed by `(slot, block_root)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Proposal state
    pub status: BlockStatus,
    /// Whether the node considers this block canonical
    pub canonical: bool,
    /// Block root; zero for placeholders
    pub block_root: B256,
    /// Slot
    pub slot: u64,
    /// Proposer index
    pub proposer: u64,
    /// Parent root
    pub parent_root: B256,
    /// State root
    pub state_root: B256,
    /// Block signature
    pub signature: Bytes,
    /// RANDAO reveal
    pub randao_reveal: Bytes,
    /// Graffiti
    pub graffiti: Bytes,
    /// Eth1 vote
    pub eth1_data: Eth1Data,
    /// Proposer slashings
    pub proposer_slashings: Vec<ProposerSlashing>,
    /// Attester slashings
    pub attester_slashings: Vec<AttesterSlashing>,
    /// Attestations with resolved attesters
    pub attestations: Vec<Attestation>,
    /// Deposits processed by this block
    pub deposits: Vec<BlockDeposit>,
    /// Voluntary exits
    pub voluntary_exits: Vec<VoluntaryExit>,
    /// Sync aggregate
    pub sync_aggregate: Option<SyncAggregate>,
    /// Execution payload
    pub execution_payload: Option<ExecutionPayload>,
    /// Credential changes; `None` before the fourth revision
    pub bls_to_execution_changes: Option<Vec<BlsToExecutionChange>>,
}

impl Block {
    /// A stand-in for an assigned proposal that has no block yet.
    ///
    /// Placeholders carry a zero root and are overwritten once a real block for
    /// the slot is observed.
    pub fn placeholder(slot: u64, proposer: u64, status: BlockStatus) -> Self {
        Self { status, slot, proposer, ..Default::default() }
    }

    /// Returns `true` if this record stands in for an unobserved proposal.
    pub fn is_placeholder(&self) -> bool {
        self.status != BlockStatus::Proposed
    }

    /// Withdrawals executed by this block, if it carries a payload.
    pub fn withdrawals(&self) -> &[Withdrawal] {
        self.execution_payload.as_ref().map(|p| p.withdrawals.as_slice()).unwrap_or_default()
    }
}
