//! JSON shapes returned by the consensus node.
//!
//! Listing endpoints use the camelCase gateway encoding, with 64-bit integers
//! as decimal strings and byte fields as `0x`-prefixed hex. The state endpoints
//! under `/eth/v1/beacon/states` use the snake_case standard API encoding.
use alloy_primitives::{Address, B256, Bytes};
use chrono::{DateTime, Utc};
use eyre::{Result, bail, eyre};
use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};

/// Checkpoint vote.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCheckpoint {
    /// Epoch
    #[serde_as(as = "DisplayFromStr")]
    pub epoch: u64,
    /// Block root
    pub root: B256,
}

/// Attestation vote.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAttestationData {
    /// Slot
    #[serde_as(as = "DisplayFromStr")]
    pub slot: u64,
    /// Committee index
    #[serde_as(as = "DisplayFromStr")]
    pub committee_index: u64,
    /// Head vote
    pub beacon_block_root: B256,
    /// Source vote
    pub source: WireCheckpoint,
    /// Target vote
    pub target: WireCheckpoint,
}

/// Aggregated attestation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAttestation {
    /// SSZ bitlist of participating committee members
    pub aggregation_bits: Bytes,
    /// Vote
    pub data: WireAttestationData,
    /// Aggregate signature
    pub signature: Bytes,
}

/// Attestation with explicit attester indices.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireIndexedAttestation {
    /// Attester indices
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub attesting_indices: Vec<u64>,
    /// Vote
    pub data: WireAttestationData,
    /// Aggregate signature
    pub signature: Bytes,
}

/// Two conflicting attestations.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAttesterSlashing {
    /// First attestation
    pub attestation_1: WireIndexedAttestation,
    /// Second attestation
    pub attestation_2: WireIndexedAttestation,
}

/// Block header without body.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireBlockHeader {
    /// Slot
    #[serde_as(as = "DisplayFromStr")]
    pub slot: u64,
    /// Proposer
    #[serde_as(as = "DisplayFromStr")]
    pub proposer_index: u64,
    /// Parent root
    pub parent_root: B256,
    /// State root
    pub state_root: B256,
    /// Body root
    pub body_root: B256,
}

/// Signed block header.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSignedHeader {
    /// Header
    pub header: WireBlockHeader,
    /// Proposer signature
    pub signature: Bytes,
}

/// Two conflicting proposals.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireProposerSlashing {
    /// First header
    pub header_1: WireSignedHeader,
    /// Second header
    pub header_2: WireSignedHeader,
}

/// Deposit payload.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireDepositData {
    /// Validator public key
    pub public_key: Bytes,
    /// Withdrawal credentials
    pub withdrawal_credentials: Bytes,
    /// Amount in gwei
    #[serde_as(as = "DisplayFromStr")]
    pub amount: u64,
    /// Deposit signature
    pub signature: Bytes,
}

/// Deposit processed by a block.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireDeposit {
    /// Merkle proof
    pub proof: Vec<B256>,
    /// Payload
    pub data: WireDepositData,
}

/// Exit request.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireExit {
    /// Earliest exit epoch
    #[serde_as(as = "DisplayFromStr")]
    pub epoch: u64,
    /// Exiting validator
    #[serde_as(as = "DisplayFromStr")]
    pub validator_index: u64,
}

/// Signed exit request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireVoluntaryExit {
    /// Exit
    pub exit: WireExit,
    /// Validator signature
    pub signature: Bytes,
}

/// Execution chain vote.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEth1Data {
    /// Deposit root
    pub deposit_root: Bytes,
    /// Deposit count
    #[serde_as(as = "DisplayFromStr")]
    pub deposit_count: u64,
    /// Execution block hash
    pub block_hash: Bytes,
}

/// Sync committee aggregate.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSyncAggregate {
    /// Participation bitvector
    pub sync_committee_bits: Bytes,
    /// Aggregate signature
    pub sync_committee_signature: Bytes,
}

/// Withdrawal in an execution payload.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireWithdrawal {
    /// Withdrawal index
    #[serde_as(as = "DisplayFromStr")]
    pub index: u64,
    /// Validator index
    #[serde_as(as = "DisplayFromStr")]
    pub validator_index: u64,
    /// Recipient
    pub address: Address,
    /// Amount in gwei
    #[serde_as(as = "DisplayFromStr")]
    pub amount: u64,
}

/// Execution payload as of the merge.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireExecutionPayload {
    /// Parent hash, zero before the merge
    pub parent_hash: B256,
    /// Fee recipient
    pub fee_recipient: Address,
    /// State root
    pub state_root: B256,
    /// Receipts root
    pub receipts_root: B256,
    /// Logs bloom
    pub logs_bloom: Bytes,
    /// RANDAO mix
    pub prev_randao: B256,
    /// Block number
    #[serde_as(as = "DisplayFromStr")]
    pub block_number: u64,
    /// Gas limit
    #[serde_as(as = "DisplayFromStr")]
    pub gas_limit: u64,
    /// Gas used
    #[serde_as(as = "DisplayFromStr")]
    pub gas_used: u64,
    /// Timestamp
    #[serde_as(as = "DisplayFromStr")]
    pub timestamp: u64,
    /// Extra data
    pub extra_data: Bytes,
    /// Base fee, little-endian 256-bit integer
    pub base_fee_per_gas: Bytes,
    /// Block hash
    pub block_hash: B256,
    /// EIP-2718 encoded transactions
    #[serde(default)]
    pub transactions: Vec<Bytes>,
}

/// Execution payload with withdrawals.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCapellaPayload {
    /// Merge-era fields
    #[serde(flatten)]
    pub payload: WireExecutionPayload,
    /// Withdrawals
    #[serde(default)]
    pub withdrawals: Vec<WireWithdrawal>,
}

/// Withdrawal credential rotation.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireBlsChange {
    /// Validator index
    #[serde_as(as = "DisplayFromStr")]
    pub validator_index: u64,
    /// Current BLS withdrawal key
    pub from_bls_pubkey: Bytes,
    /// New execution address
    pub to_execution_address: Address,
}

/// Signed withdrawal credential rotation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSignedBlsChange {
    /// Change
    pub message: WireBlsChange,
    /// Signature
    pub signature: Bytes,
}

/// Body fields present in every revision.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phase0Body {
    /// RANDAO reveal
    pub randao_reveal: Bytes,
    /// Execution chain vote, absent on some genesis blocks
    #[serde(default)]
    pub eth1_data: Option<WireEth1Data>,
    /// Graffiti
    pub graffiti: Bytes,
    /// Proposer slashings
    #[serde(default)]
    pub proposer_slashings: Vec<WireProposerSlashing>,
    /// Attester slashings
    #[serde(default)]
    pub attester_slashings: Vec<WireAttesterSlashing>,
    /// Attestations
    #[serde(default)]
    pub attestations: Vec<WireAttestation>,
    /// Deposits
    #[serde(default)]
    pub deposits: Vec<WireDeposit>,
    /// Voluntary exits
    #[serde(default)]
    pub voluntary_exits: Vec<WireVoluntaryExit>,
}

/// Body of the sync committee revision.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AltairBody {
    /// Shared fields
    #[serde(flatten)]
    pub base: Phase0Body,
    /// Sync aggregate
    #[serde(default)]
    pub sync_aggregate: Option<WireSyncAggregate>,
}

/// Body of the merge revision.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BellatrixBody {
    /// Shared fields
    #[serde(flatten)]
    pub base: Phase0Body,
    /// Sync aggregate
    #[serde(default)]
    pub sync_aggregate: Option<WireSyncAggregate>,
    /// Execution payload
    #[serde(default)]
    pub execution_payload: Option<WireExecutionPayload>,
}

/// Body of the withdrawals revision.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapellaBody {
    /// Shared fields
    #[serde(flatten)]
    pub base: Phase0Body,
    /// Sync aggregate
    #[serde(default)]
    pub sync_aggregate: Option<WireSyncAggregate>,
    /// Execution payload with withdrawals
    #[serde(default)]
    pub execution_payload: Option<WireCapellaPayload>,
    /// Withdrawal credential rotations
    #[serde(default)]
    pub bls_to_execution_changes: Vec<WireSignedBlsChange>,
}

/// Beacon block of any revision.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireBeaconBlock<B> {
    /// Slot
    #[serde_as(as = "DisplayFromStr")]
    pub slot: u64,
    /// Proposer
    #[serde_as(as = "DisplayFromStr")]
    pub proposer_index: u64,
    /// Parent root
    pub parent_root: B256,
    /// State root
    pub state_root: B256,
    /// Body
    pub body: B,
}

/// Signed beacon block of any revision.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedBeaconBlock<B> {
    /// Block
    pub block: WireBeaconBlock<B>,
    /// Proposer signature
    pub signature: Bytes,
}

/// Listing entry carrying exactly one populated revision.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeaconBlockContainer {
    /// Block root
    pub block_root: B256,
    /// On the canonical chain
    #[serde(default)]
    pub canonical: bool,
    /// Phase 0 block
    #[serde(default)]
    pub phase0_block: Option<SignedBeaconBlock<Phase0Body>>,
    /// Altair block
    #[serde(default)]
    pub altair_block: Option<SignedBeaconBlock<AltairBody>>,
    /// Bellatrix block
    #[serde(default)]
    pub bellatrix_block: Option<SignedBeaconBlock<BellatrixBody>>,
    /// Capella block
    #[serde(default)]
    pub capella_block: Option<SignedBeaconBlock<CapellaBody>>,
}

/// The protocol revision of a block.
#[derive(Debug, Clone)]
pub enum BlockVariant {
    /// Launch revision
    Phase0(SignedBeaconBlock<Phase0Body>),
    /// Sync committees
    Altair(SignedBeaconBlock<AltairBody>),
    /// Execution payloads
    Bellatrix(SignedBeaconBlock<BellatrixBody>),
    /// Withdrawals and credential rotations
    Capella(SignedBeaconBlock<CapellaBody>),
}

/// A block container resolved to its revision.
#[derive(Debug, Clone)]
pub struct VersionedBlock {
    /// Block root
    pub block_root: B256,
    /// On the canonical chain
    pub canonical: bool,
    /// Revision-specific block
    pub block: BlockVariant,
}

impl VersionedBlock {
    /// Slot of the block.
    pub const fn slot(&self) -> u64 {
        match &self.block {
            BlockVariant::Phase0(b) => b.block.slot,
            BlockVariant::Altair(b) => b.block.slot,
            BlockVariant::Bellatrix(b) => b.block.slot,
            BlockVariant::Capella(b) => b.block.slot,
        }
    }

    /// Shared body fields.
    pub const fn base_body(&self) -> &Phase0Body {
        match &self.block {
            BlockVariant::Phase0(b) => &b.block.body,
            BlockVariant::Altair(b) => &b.block.body.base,
            BlockVariant::Bellatrix(b) => &b.block.body.base,
            BlockVariant::Capella(b) => &b.block.body.base,
        }
    }
}

impl BeaconBlockContainer {
    /// Picks the populated revision, checked from oldest to newest.
    pub fn into_versioned(self) -> Result<VersionedBlock> {
        let Self { block_root, canonical, phase0_block, altair_block, bellatrix_block, capella_block } =
            self;
        let block = if let Some(b) = phase0_block {
            BlockVariant::Phase0(b)
        } else if let Some(b) = altair_block {
            BlockVariant::Altair(b)
        } else if let Some(b) = bellatrix_block {
            BlockVariant::Bellatrix(b)
        } else if let Some(b) = capella_block {
            BlockVariant::Capella(b)
        } else {
            bail!("block is neither phase0 nor altair nor bellatrix nor capella");
        };
        Ok(VersionedBlock { block_root, canonical, block })
    }

    /// Slot of whichever revision is populated.
    pub fn slot(&self) -> Option<u64> {
        self.phase0_block
            .as_ref()
            .map(|b| b.block.slot)
            .or_else(|| self.altair_block.as_ref().map(|b| b.block.slot))
            .or_else(|| self.bellatrix_block.as_ref().map(|b| b.block.slot))
            .or_else(|| self.capella_block.as_ref().map(|b| b.block.slot))
    }
}

/// Page of block containers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlocksPage {
    /// Containers
    #[serde(default)]
    pub block_containers: Vec<BeaconBlockContainer>,
    /// Token of the next page, empty on the last one
    #[serde(default)]
    pub next_page_token: String,
    /// Total number of entries across pages
    #[serde(default)]
    pub total_size: u64,
}

/// Duties of one validator.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAssignment {
    /// Members of the validator's committee, in committee order
    #[serde(default)]
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub beacon_committees: Vec<u64>,
    /// Committee index
    #[serde_as(as = "DisplayFromStr")]
    pub committee_index: u64,
    /// Slot the committee attests in
    #[serde_as(as = "DisplayFromStr")]
    pub attester_slot: u64,
    /// Slots the validator proposes in
    #[serde(default)]
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub proposer_slots: Vec<u64>,
    /// Validator index
    #[serde_as(as = "DisplayFromStr")]
    pub validator_index: u64,
}

/// Page of assignments.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentsPage {
    /// Assignments
    #[serde(default)]
    pub assignments: Vec<WireAssignment>,
    /// Token of the next page, empty on the last one
    #[serde(default)]
    pub next_page_token: String,
    /// Total number of entries across pages
    #[serde(default)]
    pub total_size: u64,
}

/// Balance of one validator.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireBalance {
    /// Validator index
    #[serde_as(as = "DisplayFromStr")]
    pub index: u64,
    /// Balance in gwei
    #[serde_as(as = "DisplayFromStr")]
    pub balance: u64,
}

/// Page of balances.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancesPage {
    /// Balances
    #[serde(default)]
    pub balances: Vec<WireBalance>,
    /// Token of the next page, empty on the last one
    #[serde(default)]
    pub next_page_token: String,
    /// Total number of entries across pages
    #[serde(default)]
    pub total_size: u64,
}

/// Participation totals of the previous epoch.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireParticipation {
    /// Active stake in gwei
    #[serde_as(as = "DisplayFromStr")]
    pub previous_epoch_active_gwei: u64,
    /// Stake that voted for the correct target, in gwei
    #[serde_as(as = "DisplayFromStr")]
    pub previous_epoch_target_attesting_gwei: u64,
}

/// Participation response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipationResponse {
    /// Epoch is finalized
    #[serde(default)]
    pub finalized: bool,
    /// Totals
    pub participation: WireParticipation,
}

/// Activation and exit queues.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorQueueResponse {
    /// Validators waiting for activation
    #[serde(default)]
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub activation_validator_indices: Vec<u64>,
    /// Validators waiting to exit
    #[serde(default)]
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub exit_validator_indices: Vec<u64>,
}

/// Head, finalized and justified checkpoints.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainHeadResponse {
    /// Head slot
    #[serde_as(as = "DisplayFromStr")]
    pub head_slot: u64,
    /// Head epoch
    #[serde_as(as = "DisplayFromStr")]
    pub head_epoch: u64,
    /// Head root
    pub head_block_root: B256,
    /// Finalized slot
    #[serde_as(as = "DisplayFromStr")]
    pub finalized_slot: u64,
    /// Finalized epoch
    #[serde_as(as = "DisplayFromStr")]
    pub finalized_epoch: u64,
    /// Finalized root
    pub finalized_block_root: B256,
    /// Justified slot
    #[serde_as(as = "DisplayFromStr")]
    pub justified_slot: u64,
    /// Justified epoch
    #[serde_as(as = "DisplayFromStr")]
    pub justified_epoch: u64,
    /// Justified root
    pub justified_block_root: B256,
    /// Previous justified slot
    #[serde_as(as = "DisplayFromStr")]
    pub previous_justified_slot: u64,
    /// Previous justified epoch
    #[serde_as(as = "DisplayFromStr")]
    pub previous_justified_epoch: u64,
    /// Previous justified root
    pub previous_justified_block_root: B256,
}

/// Error frame of a streaming response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamError {
    /// Message
    #[serde(default)]
    pub message: String,
}

/// One line of the chain head stream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainHeadFrame {
    /// Head update
    #[serde(default)]
    pub result: Option<ChainHeadResponse>,
    /// Stream failure
    #[serde(default)]
    pub error: Option<StreamError>,
}

impl ChainHeadFrame {
    /// The head update of this frame, or the error it carries.
    pub fn into_result(self) -> Result<Option<ChainHeadResponse>> {
        match self.error {
            Some(err) => Err(eyre!("chain head stream error: {}", err.message)),
            None => Ok(self.result),
        }
    }
}

/// Genesis parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisResponse {
    /// Genesis time
    pub genesis_time: DateTime<Utc>,
}

/// Validator record of the standard state API.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateValidatorRecord {
    /// Public key
    pub pubkey: Bytes,
    /// Withdrawal credentials
    pub withdrawal_credentials: Bytes,
    /// Effective balance in gwei
    #[serde_as(as = "DisplayFromStr")]
    pub effective_balance: u64,
    /// Slashed
    pub slashed: bool,
    /// Activation eligibility epoch
    #[serde_as(as = "DisplayFromStr")]
    pub activation_eligibility_epoch: u64,
    /// Activation epoch
    #[serde_as(as = "DisplayFromStr")]
    pub activation_epoch: u64,
    /// Exit epoch
    #[serde_as(as = "DisplayFromStr")]
    pub exit_epoch: u64,
    /// Withdrawable epoch
    #[serde_as(as = "DisplayFromStr")]
    pub withdrawable_epoch: u64,
}

/// Validator entry of the standard state API.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateValidator {
    /// Validator index
    #[serde_as(as = "DisplayFromStr")]
    pub index: u64,
    /// Balance in gwei
    #[serde_as(as = "DisplayFromStr")]
    pub balance: u64,
    /// Lifecycle status
    pub status: String,
    /// Record
    pub validator: StateValidatorRecord,
}

/// Balance entry of the standard state API.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateBalance {
    /// Validator index
    #[serde_as(as = "DisplayFromStr")]
    pub index: u64,
    /// Balance in gwei
    #[serde_as(as = "DisplayFromStr")]
    pub balance: u64,
}

/// Sync committee of the standard state API.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateSyncCommittee {
    /// Members
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub validators: Vec<u64>,
    /// Members per subcommittee
    #[serde_as(as = "Vec<Vec<DisplayFromStr>>")]
    pub validator_aggregates: Vec<Vec<u64>>,
}

/// `{"data": ...}` envelope of the standard API.
#[derive(Debug, Clone, Deserialize)]
pub struct DataResponse<T> {
    /// Payload
    pub data: T,
}
