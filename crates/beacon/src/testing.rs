//! In-memory beacon node and withdrawal store used by the unit tests.
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use alloy_primitives::{B256, Bytes};
use async_trait::async_trait;
use chrono::DateTime;
use eyre::{Result, bail, eyre};
use futures::{StreamExt, stream};
use primitives::store::WithdrawalStore;

use crate::{
    node::{BeaconNode, HeadStream, QueryFilter},
    wire::{
        AssignmentsPage, BalancesPage, BeaconBlockContainer, BlocksPage, ChainHeadResponse,
        GenesisResponse, ParticipationResponse, Phase0Body, SignedBeaconBlock, StateBalance,
        StateSyncCommittee, StateValidator, ValidatorQueueResponse, WireAssignment,
        WireBalance, WireBeaconBlock,
    },
};

/// What one call to `stream_chain_head` produces.
pub(crate) type StreamScript = Result<Vec<Result<ChainHeadResponse>>>;

/// Phase 0 container at `slot` with root `root`.
pub(crate) fn container(slot: u64, root: B256, body: Phase0Body) -> BeaconBlockContainer {
    BeaconBlockContainer {
        block_root: root,
        canonical: true,
        phase0_block: Some(SignedBeaconBlock {
            block: WireBeaconBlock { slot, proposer_index: 1, body, ..Default::default() },
            signature: Bytes::new(),
        }),
        ..Default::default()
    }
}

/// Head update at `slot`.
pub(crate) fn head(slot: u64) -> ChainHeadResponse {
    ChainHeadResponse { head_slot: slot, head_epoch: slot / 32, ..Default::default() }
}

#[derive(Debug, Default)]
pub(crate) struct FakeNode {
    assignment_pages: Mutex<VecDeque<AssignmentsPage>>,
    assignment_requests: Mutex<Vec<(QueryFilter, String)>>,
    blocks: Mutex<Vec<BeaconBlockContainer>>,
    balance_pages: Mutex<VecDeque<Result<BalancesPage>>>,
    validators: Mutex<HashMap<String, Vec<StateValidator>>>,
    balances: Mutex<HashMap<String, Vec<StateBalance>>>,
    participation: Mutex<Option<ParticipationResponse>>,
    streams: Mutex<VecDeque<StreamScript>>,
    stream_opens: AtomicUsize,
}

impl FakeNode {
    pub(crate) fn push_assignment_page(&self, assignments: Vec<WireAssignment>, token: &str, total: u64) {
        self.assignment_pages.lock().unwrap().push_back(AssignmentsPage {
            assignments,
            next_page_token: token.to_owned(),
            total_size: total,
        });
    }

    pub(crate) fn assignment_requests(&self) -> Vec<(QueryFilter, String)> {
        self.assignment_requests.lock().unwrap().clone()
    }

    pub(crate) fn add_block(&self, container: BeaconBlockContainer) {
        self.blocks.lock().unwrap().push(container);
    }

    pub(crate) fn push_balance_page(&self, balances: Vec<(u64, u64)>, token: &str, total: u64) {
        let balances = balances.into_iter().map(|(index, balance)| WireBalance { index, balance }).collect();
        self.balance_pages.lock().unwrap().push_back(Ok(BalancesPage {
            balances,
            next_page_token: token.to_owned(),
            total_size: total,
        }));
    }

    pub(crate) fn push_balance_error(&self, message: &str) {
        self.balance_pages.lock().unwrap().push_back(Err(eyre!(message.to_owned())));
    }

    pub(crate) fn set_validators(&self, state_id: &str, validators: Vec<StateValidator>) {
        self.validators.lock().unwrap().insert(state_id.to_owned(), validators);
    }

    pub(crate) fn set_balances(&self, state_id: &str, balances: Vec<StateBalance>) {
        self.balances.lock().unwrap().insert(state_id.to_owned(), balances);
    }

    pub(crate) fn set_participation(&self, participation: ParticipationResponse) {
        *self.participation.lock().unwrap() = Some(participation);
    }

    pub(crate) fn push_stream(&self, script: StreamScript) {
        self.streams.lock().unwrap().push_back(script);
    }

    pub(crate) fn stream_opens(&self) -> usize {
        self.stream_opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BeaconNode for FakeNode {
    async fn genesis(&self) -> Result<GenesisResponse> {
        Ok(GenesisResponse { genesis_time: DateTime::from_timestamp(1_606_824_023, 0).unwrap() })
    }

    async fn chain_head(&self) -> Result<ChainHeadResponse> {
        Ok(head(0))
    }

    async fn stream_chain_head(&self) -> Result<HeadStream> {
        self.stream_opens.fetch_add(1, Ordering::SeqCst);
        let next = self.streams.lock().unwrap().pop_front();
        match next {
            Some(script) => Ok(stream::iter(script?).boxed()),
            None => Ok(stream::pending().boxed()),
        }
    }

    async fn validator_queue(&self) -> Result<ValidatorQueueResponse> {
        Ok(ValidatorQueueResponse {
            activation_validator_indices: vec![1, 2, 3],
            exit_validator_indices: vec![4],
        })
    }

    async fn list_assignments(
        &self,
        filter: QueryFilter,
        _page_size: u32,
        page_token: &str,
    ) -> Result<AssignmentsPage> {
        self.assignment_requests.lock().unwrap().push((filter, page_token.to_owned()));
        Ok(self.assignment_pages.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn list_blocks(
        &self,
        filter: QueryFilter,
        _page_size: u32,
        _page_token: &str,
    ) -> Result<BlocksPage> {
        let block_containers: Vec<_> = self
            .blocks
            .lock()
            .unwrap()
            .iter()
            .filter(|c| match (filter, c.slot()) {
                (QueryFilter::Slot(s), Some(slot)) => slot == s,
                (QueryFilter::Genesis, Some(slot)) => slot == 0,
                (QueryFilter::Epoch(e), Some(slot)) => slot / 32 == e,
                (_, None) => true,
            })
            .cloned()
            .collect();
        let total_size = block_containers.len() as u64;
        Ok(BlocksPage { block_containers, next_page_token: String::new(), total_size })
    }

    async fn list_balances(
        &self,
        _filter: QueryFilter,
        _page_size: u32,
        _page_token: &str,
    ) -> Result<BalancesPage> {
        self.balance_pages.lock().unwrap().pop_front().unwrap_or_else(|| Ok(BalancesPage::default()))
    }

    async fn participation(&self, _filter: QueryFilter) -> Result<ParticipationResponse> {
        self.participation.lock().unwrap().clone().ok_or_else(|| eyre!("participation unavailable"))
    }

    async fn state_validators(&self, state_id: &str) -> Result<Vec<StateValidator>> {
        match self.validators.lock().unwrap().get(state_id) {
            Some(v) => Ok(v.clone()),
            None => bail!("not found 404"),
        }
    }

    async fn state_balances(&self, state_id: &str) -> Result<Vec<StateBalance>> {
        match self.balances.lock().unwrap().get(state_id) {
            Some(b) => Ok(b.clone()),
            None => bail!("not found 404"),
        }
    }

    async fn sync_committee(&self, _state_id: &str, _epoch: u64) -> Result<StateSyncCommittee> {
        Ok(StateSyncCommittee { validators: vec![5, 6], validator_aggregates: vec![vec![5], vec![6]] })
    }
}

/// Withdrawal totals keyed by slot; unknown slots yield empty totals.
#[derive(Debug, Default)]
pub(crate) struct FakeWithdrawals {
    totals: Mutex<HashMap<u64, HashMap<u64, u64>>>,
    failing: bool,
}

impl FakeWithdrawals {
    pub(crate) fn failing() -> Self {
        Self { failing: true, ..Default::default() }
    }

    pub(crate) fn set(&self, slot: u64, totals: HashMap<u64, u64>) {
        self.totals.lock().unwrap().insert(slot, totals);
    }
}

#[async_trait]
impl WithdrawalStore for FakeWithdrawals {
    async fn total_withdrawals_at(&self, slot: u64) -> Result<HashMap<u64, u64>> {
        if self.failing {
            bail!("store unavailable");
        }
        Ok(self.totals.lock().unwrap().get(&slot).cloned().unwrap_or_default())
    }
}
