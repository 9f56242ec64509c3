//! Consensus layer client for Beaconscope.
//!
//! [`BeaconClient`] owns the connection to the beacon node, the assignment
//! cache and the observed head slot. It resolves blocks into the canonical
//! model and assembles epoch and slot snapshots for storage.

/// Snapshot assembly helpers
pub mod aggregate;
/// Committee assignment cache
pub mod assignments;
/// HTTP transport
pub mod http;
/// Transport trait
pub mod node;
/// Wire to canonical block conversion
pub mod normalize;
/// Head subscription
pub mod stream;
/// JSON wire types
pub mod wire;

#[cfg(test)]
mod testing;

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use chainio::SigningScheme;
use chrono::Utc;
use derive_more::Debug;
use eyre::{Result, WrapErr};
use primitives::{
    block::Block,
    chain::{ChainConfig, HistoricalSlots},
    epoch::{BlocksBySlot, EpochAssignments, EpochData, SlotData},
    store::WithdrawalStore,
    validator::{CanonBlock, ChainHead, SyncCommittee, ValidatorParticipation, ValidatorQueue},
};
use tracing::{error, info};

pub use assignments::AssignmentCache;
pub use http::HttpBeaconNode;
pub use node::{BeaconNode, QueryFilter};
pub use stream::spawn_head_stream;

use crate::{
    aggregate::{
        fetch_historical, fill_placeholders, fold_withdrawals, group_blocks, merge_validators,
        reference_slot,
    },
    assignments::fetch_epoch_assignments,
    normalize::{NormalizeContext, attestation_epochs, normalize_block},
    wire::VersionedBlock,
};

/// Service object wrapping a beacon node.
#[derive(Debug)]
pub struct BeaconClient {
    #[debug(skip)]
    node: Arc<dyn BeaconNode>,
    #[debug(skip)]
    withdrawals: Arc<dyn WithdrawalStore>,
    assignments: AssignmentCache,
    /// Highest slot a snapshot was taken for. Only ever increases.
    head_slot: AtomicU64,
    chain: ChainConfig,
    scheme: SigningScheme,
    page_size: u32,
}

impl BeaconClient {
    /// Create a client over an existing transport.
    pub fn new(
        node: Arc<dyn BeaconNode>,
        withdrawals: Arc<dyn WithdrawalStore>,
        chain: ChainConfig,
        scheme: SigningScheme,
        page_size: u32,
    ) -> Self {
        Self {
            node,
            withdrawals,
            assignments: AssignmentCache::default(),
            head_slot: AtomicU64::new(0),
            chain,
            scheme,
            page_size,
        }
    }

    /// The underlying transport.
    pub fn node(&self) -> &Arc<dyn BeaconNode> {
        &self.node
    }

    /// Chain timing in use.
    pub const fn chain(&self) -> &ChainConfig {
        &self.chain
    }

    /// Highest slot observed so far, 0 before the first slot snapshot.
    pub fn head_slot(&self) -> u64 {
        self.head_slot.load(Ordering::Relaxed)
    }

    /// Unix timestamp of genesis.
    pub async fn genesis_timestamp(&self) -> Result<i64> {
        Ok(self.node.genesis().await?.genesis_time.timestamp())
    }

    /// Current head and checkpoints.
    pub async fn chain_head(&self) -> Result<ChainHead> {
        let h = self.node.chain_head().await?;
        Ok(ChainHead {
            head_slot: h.head_slot,
            head_epoch: h.head_epoch,
            head_block_root: h.head_block_root,
            finalized_slot: h.finalized_slot,
            finalized_epoch: h.finalized_epoch,
            finalized_block_root: h.finalized_block_root,
            justified_slot: h.justified_slot,
            justified_epoch: h.justified_epoch,
            justified_block_root: h.justified_block_root,
            previous_justified_slot: h.previous_justified_slot,
            previous_justified_epoch: h.previous_justified_epoch,
            previous_justified_block_root: h.previous_justified_block_root,
        })
    }

    /// Sizes of the activation and exit queues.
    pub async fn validator_queue(&self) -> Result<ValidatorQueue> {
        let queue =
            self.node.validator_queue().await.wrap_err("error retrieving validator queue data")?;
        Ok(ValidatorQueue {
            activating: queue.activation_validator_indices.len() as u64,
            exiting: queue.exit_validator_indices.len() as u64,
        })
    }

    /// Assignments of `epoch`, from the cache when possible.
    pub async fn epoch_assignments(&self, epoch: u64) -> Result<Arc<EpochAssignments>> {
        let node = self.node.as_ref();
        let page_size = self.page_size;
        self.assignments
            .get_or_compute(epoch, || fetch_epoch_assignments(node, epoch, page_size))
            .await
    }

    /// All blocks the node knows at `slot`, canonical or not.
    pub async fn blocks_by_slot(&self, slot: u64) -> Result<Vec<Block>> {
        info!(slot, "Retrieving blocks");
        // A slot holds at most a handful of forked blocks, far below one page,
        // so `next_page_token` is not followed.
        let page = self.node.list_blocks(QueryFilter::slot(slot), self.page_size, "").await?;
        if page.total_size == 0 {
            return Ok(Vec::new());
        }

        let mut blocks = Vec::with_capacity(page.block_containers.len());
        for container in page.block_containers {
            blocks.push(self.normalize(container.into_versioned()?).await?);
        }
        Ok(blocks)
    }

    async fn normalize(&self, block: VersionedBlock) -> Result<Block> {
        let mut assignments = HashMap::new();
        for epoch in attestation_epochs(&block, self.chain.slots_per_epoch) {
            let a = self
                .epoch_assignments(epoch)
                .await
                .wrap_err_with(|| format!("error receiving epoch assignment for epoch {epoch}"))?;
            assignments.insert(epoch, a);
        }
        let ctx = NormalizeContext {
            scheme: &self.scheme,
            slots_per_epoch: self.chain.slots_per_epoch,
            assignments: &assignments,
        };
        normalize_block(block, &ctx)
    }

    /// Canonical status of every block of `epoch`.
    pub async fn block_status_by_epoch(&self, epoch: u64) -> Result<Vec<CanonBlock>> {
        info!(epoch, "Retrieving block status");
        let page = self.node.list_blocks(QueryFilter::Epoch(epoch), self.page_size, "").await?;
        if page.total_size == 0 {
            return Ok(Vec::new());
        }
        Ok(page
            .block_containers
            .iter()
            .map(|c| CanonBlock {
                block_root: c.block_root,
                slot: c.slot().unwrap_or_default(),
                canonical: c.canonical,
            })
            .collect())
    }

    /// Validator balances at `epoch`, read through the paginated listing.
    pub async fn balances_for_epoch(&self, epoch: u64) -> Result<HashMap<u64, u64>> {
        let filter = QueryFilter::epoch(epoch);
        let mut balances = HashMap::new();
        let mut token = String::new();
        loop {
            let page = self
                .node
                .list_balances(filter, self.page_size, &token)
                .await
                .wrap_err_with(|| format!("error retrieving validator balances for epoch {epoch}"))?;
            if page.total_size == 0 {
                break;
            }
            balances.extend(page.balances.into_iter().map(|b| (b.index, b.balance)));
            if page.next_page_token.is_empty() {
                break;
            }
            token = page.next_page_token;
        }
        Ok(balances)
    }

    /// Validator balances of the state at `slot`.
    pub async fn balances_for_slot(&self, slot: u64) -> Result<HashMap<u64, u64>> {
        aggregate::balances_for_slot(self.node.as_ref(), slot).await
    }

    /// Target-vote participation of `epoch`; zeroed when the node cannot
    /// provide it.
    pub async fn validator_participation(&self, epoch: u64) -> ValidatorParticipation {
        match self.node.participation(QueryFilter::epoch(epoch)).await {
            Ok(resp) => ValidatorParticipation::from_gwei(
                epoch,
                resp.finalized,
                resp.participation.previous_epoch_target_attesting_gwei,
                resp.participation.previous_epoch_active_gwei,
            ),
            Err(err) => {
                error!(epoch, err = %err, "Error retrieving epoch participation statistics");
                ValidatorParticipation::unavailable(epoch)
            }
        }
    }

    /// Sync committee of `epoch` as seen from the state at `state_id`.
    pub async fn sync_committee(&self, state_id: &str, epoch: u64) -> Result<SyncCommittee> {
        let committee = self.node.sync_committee(state_id, epoch).await?;
        Ok(SyncCommittee {
            validators: committee.validators,
            validator_aggregates: committee.validator_aggregates,
        })
    }

    /// Snapshot of `epoch`: validators, assignments, blocks with placeholders,
    /// and participation.
    pub async fn epoch_data(&self, epoch: u64) -> Result<EpochData> {
        let head = self.head_slot();
        let slot = reference_slot(&self.chain, epoch, head);

        let validators = self
            .node
            .state_validators(&slot.to_string())
            .await
            .wrap_err_with(|| format!("error retrieving validators for slot {slot}"))?;
        let mut hist = fetch_historical(
            self.node.as_ref(),
            self.withdrawals.as_ref(),
            HistoricalSlots::from_reference(slot),
        )
        .await;

        let assignments = self
            .epoch_assignments(epoch)
            .await
            .wrap_err_with(|| format!("error retrieving assignments for epoch {epoch}"))?;

        let mut blocks = BlocksBySlot::new();
        for s in self.chain.first_slot(epoch)..=self.chain.last_slot(epoch) {
            for block in self.blocks_by_slot(s).await? {
                blocks.entry(block.slot).or_default().insert(block.block_root, block);
            }
        }
        info!(epoch, slots = blocks.len(), "Retrieved blocks for epoch");

        fold_withdrawals(&blocks, head, &mut hist.withdrawals);
        fill_placeholders(&mut blocks, &assignments, &self.chain, Utc::now());

        let validators = merge_validators(validators, &hist);
        info!(epoch, validators = validators.len(), "Retrieved validators for epoch");

        let participation = self.validator_participation(epoch).await;
        Ok(EpochData { epoch, validators, assignments, blocks, participation })
    }

    /// Snapshot for a newly observed block. Advances the head slot.
    pub async fn slot_data(&self, block: Block) -> Result<SlotData> {
        let slot = block.slot;
        let previous_head = self.head_slot.fetch_max(slot, Ordering::Relaxed);
        let epoch = self.chain.epoch_of_slot(slot);

        let validators = self
            .node
            .state_validators(&slot.to_string())
            .await
            .wrap_err_with(|| format!("error retrieving validators for slot {slot}"))?;
        let mut hist = fetch_historical(
            self.node.as_ref(),
            self.withdrawals.as_ref(),
            HistoricalSlots::from_reference(slot),
        )
        .await;

        let blocks = group_blocks([block]);
        fold_withdrawals(&blocks, previous_head, &mut hist.withdrawals);

        let validators = merge_validators(validators, &hist);
        info!(slot, validators = validators.len(), "Retrieved validators for slot");
        Ok(SlotData { epoch, slot, validators, blocks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use alloy_primitives::{B256, Bytes};
    use primitives::block::{BlockStatus, ExecutionPayload, Withdrawal};

    use crate::{
        testing::{FakeNode, FakeWithdrawals, container},
        wire::{
            ParticipationResponse, Phase0Body, StateValidator, WireAssignment, WireAttestation,
            WireAttestationData, WireParticipation,
        },
    };

    fn client(node: &Arc<FakeNode>, store: FakeWithdrawals) -> BeaconClient {
        BeaconClient::new(
            Arc::clone(node) as Arc<dyn BeaconNode>,
            Arc::new(store),
            ChainConfig::default(),
            SigningScheme::new(1),
            250,
        )
    }

    fn validator(index: u64) -> StateValidator {
        StateValidator {
            index,
            balance: 32_000_000_000,
            status: "active_ongoing".into(),
            ..Default::default()
        }
    }

    fn epoch_two_assignments(node: &FakeNode) {
        node.push_assignment_page(
            vec![
                WireAssignment {
                    beacon_committees: vec![1, 2],
                    committee_index: 0,
                    attester_slot: 64,
                    proposer_slots: vec![64],
                    validator_index: 1,
                },
                WireAssignment {
                    beacon_committees: vec![1, 2],
                    committee_index: 0,
                    attester_slot: 64,
                    proposer_slots: vec![65],
                    validator_index: 2,
                },
            ],
            "",
            2,
        );
    }

    #[tokio::test]
    async fn genesis_slot_without_blocks_is_empty() {
        let node = Arc::new(FakeNode::default());
        let client = client(&node, FakeWithdrawals::default());
        assert!(client.blocks_by_slot(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn forked_slot_returned_from_single_page() {
        let node = Arc::new(FakeNode::default());
        node.add_block(container(70, B256::repeat_byte(1), Phase0Body::default()));
        let mut orphan = container(70, B256::repeat_byte(2), Phase0Body::default());
        orphan.canonical = false;
        node.add_block(orphan);
        let client = client(&node, FakeWithdrawals::default());

        let blocks = client.blocks_by_slot(70).await.unwrap();
        let roots: Vec<_> = blocks.iter().map(|b| b.block_root).collect();
        assert_eq!(roots, vec![B256::repeat_byte(1), B256::repeat_byte(2)]);
    }

    #[tokio::test]
    async fn attesters_resolved_through_cached_assignments() {
        let node = Arc::new(FakeNode::default());
        epoch_two_assignments(&node);
        let body = Phase0Body {
            attestations: vec![WireAttestation {
                aggregation_bits: Bytes::from_static(&[0b110]),
                data: WireAttestationData { slot: 64, committee_index: 0, ..Default::default() },
                signature: Bytes::new(),
            }],
            ..Default::default()
        };
        node.add_block(container(65, B256::repeat_byte(1), body));
        let client = client(&node, FakeWithdrawals::default());

        let blocks = client.blocks_by_slot(65).await.unwrap();
        assert_eq!(blocks[0].attestations[0].attesters, vec![2]);

        // Second resolution is served from the cache.
        client.blocks_by_slot(65).await.unwrap();
        assert_eq!(node.assignment_requests().len(), 1);
    }

    #[tokio::test]
    async fn epoch_data_fills_missed_proposals() {
        let node = Arc::new(FakeNode::default());
        epoch_two_assignments(&node);
        node.add_block(container(64, B256::repeat_byte(1), Phase0Body::default()));
        node.set_validators("64", vec![validator(1), validator(2)]);
        node.set_participation(ParticipationResponse {
            finalized: true,
            participation: WireParticipation {
                previous_epoch_active_gwei: 100,
                previous_epoch_target_attesting_gwei: 75,
            },
        });
        let client = client(&node, FakeWithdrawals::default());

        let data = client.epoch_data(2).await.unwrap();

        assert_eq!(data.epoch, 2);
        assert_eq!(data.validators.len(), 2);
        assert_eq!(data.blocks.len(), 2);
        assert_eq!(data.blocks[&64][&B256::repeat_byte(1)].status, BlockStatus::Proposed);
        // Genesis at the epoch 0 timestamp puts slot 65 far in the past.
        let placeholder = &data.blocks[&65][&B256::ZERO];
        assert_eq!(placeholder.status, BlockStatus::Missed);
        assert_eq!(placeholder.proposer, 2);
        assert!((data.participation.global_participation_rate - 0.75).abs() < f64::EPSILON);
        assert!(data.participation.finalized);
    }

    #[tokio::test]
    async fn epoch_data_tolerates_missing_participation() {
        let node = Arc::new(FakeNode::default());
        epoch_two_assignments(&node);
        node.set_validators("64", vec![validator(1)]);
        let client = client(&node, FakeWithdrawals::default());

        let data = client.epoch_data(2).await.unwrap();
        assert_eq!(data.participation, ValidatorParticipation::unavailable(2));
    }

    #[tokio::test]
    async fn epoch_data_fails_without_validators() {
        let node = Arc::new(FakeNode::default());
        let client = client(&node, FakeWithdrawals::default());

        let err = client.epoch_data(2).await.unwrap_err();
        assert!(err.to_string().contains("error retrieving validators for slot 64"));
    }

    #[tokio::test]
    async fn slot_data_folds_withdrawals_past_previous_head() {
        let node = Arc::new(FakeNode::default());
        node.set_validators("200", vec![validator(1)]);
        node.set_validators("150", vec![validator(1)]);
        let store = FakeWithdrawals::default();
        store.set(200, HashMap::from([(1, 100)]));
        store.set(150, HashMap::from([(1, 100)]));
        let client = client(&node, store);

        let block_at = |slot: u64| Block {
            status: BlockStatus::Proposed,
            slot,
            block_root: B256::repeat_byte(slot as u8),
            execution_payload: Some(ExecutionPayload {
                withdrawals: vec![Withdrawal {
                    slot,
                    validator_index: 1,
                    amount: 5,
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        };

        let data = client.slot_data(block_at(200)).await.unwrap();
        assert_eq!(data.validators[0].withdrawal, 105);
        assert_eq!(client.head_slot(), 200);

        let data = client.slot_data(block_at(150)).await.unwrap();
        assert_eq!(data.validators[0].withdrawal, 100);
        assert_eq!(client.head_slot(), 200);
    }

    #[tokio::test]
    async fn balances_for_epoch_pages_until_empty_token() {
        let node = Arc::new(FakeNode::default());
        node.push_balance_page(vec![(1, 32), (2, 31)], "next", 3);
        node.push_balance_page(vec![(3, 30)], "", 3);
        let client = client(&node, FakeWithdrawals::default());

        let balances = client.balances_for_epoch(5).await.unwrap();
        assert_eq!(balances, HashMap::from([(1, 32), (2, 31), (3, 30)]));
    }

    #[tokio::test]
    async fn balances_for_epoch_propagates_errors() {
        let node = Arc::new(FakeNode::default());
        node.push_balance_error("node busy");
        let client = client(&node, FakeWithdrawals::default());

        assert!(client.balances_for_epoch(5).await.is_err());
    }

    #[tokio::test]
    async fn block_status_lists_only_the_epoch() {
        let node = Arc::new(FakeNode::default());
        node.add_block(container(64, B256::repeat_byte(1), Phase0Body::default()));
        node.add_block(container(96, B256::repeat_byte(2), Phase0Body::default()));
        let client = client(&node, FakeWithdrawals::default());

        let status = client.block_status_by_epoch(2).await.unwrap();
        assert_eq!(
            status,
            vec![CanonBlock { block_root: B256::repeat_byte(1), slot: 64, canonical: true }]
        );
    }

    #[tokio::test]
    async fn queue_and_committee_views() {
        let node = Arc::new(FakeNode::default());
        let client = client(&node, FakeWithdrawals::default());

        let queue = client.validator_queue().await.unwrap();
        assert_eq!(queue, ValidatorQueue { activating: 3, exiting: 1 });
        assert_eq!(client.sync_committee("head", 10).await.unwrap().validators, vec![5, 6]);
        assert_eq!(client.genesis_timestamp().await.unwrap(), 1_606_824_023);
    }
}
