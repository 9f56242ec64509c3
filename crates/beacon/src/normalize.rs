//! Conversion of revision-specific wire blocks into the canonical [`Block`].
//!
//! Every function here is pure. Assignments for the epochs a block attests to
//! are fetched beforehand and handed in through [`NormalizeContext`].
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use alloy_consensus::Transaction as _;
use alloy_primitives::{B256, Bytes};
use chainio::SigningScheme;
use eyre::{Result, WrapErr, eyre};
use primitives::{
    block::{
        Attestation, AttestationData, AttesterSlashing, Block, BlockDeposit, BlockStatus,
        BlsToExecutionChange, Checkpoint, Eth1Data, ExecutionPayload, IndexedAttestation,
        ProposerSlashing, SignedBlockHeader, SyncAggregate, Transaction, VoluntaryExit,
        Withdrawal,
    },
    epoch::EpochAssignments,
};
use tracing::error;

use crate::wire::{
    AltairBody, BellatrixBody, BlockVariant, CapellaBody, Phase0Body, SignedBeaconBlock,
    VersionedBlock, WireAttestation, WireAttestationData, WireAttesterSlashing, WireCheckpoint,
    WireExecutionPayload, WireIndexedAttestation, WireProposerSlashing, WireSignedBlsChange,
    WireSignedHeader, WireSyncAggregate, WireWithdrawal,
};

/// Inputs a block needs besides its own contents.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext<'a> {
    /// Scheme used to recover transaction senders
    pub scheme: &'a SigningScheme,
    /// Slots per epoch
    pub slots_per_epoch: u64,
    /// Assignments of every epoch the block attests to
    pub assignments: &'a HashMap<u64, Arc<EpochAssignments>>,
}

/// Epochs whose assignments are needed to resolve the attesters of `block`.
pub fn attestation_epochs(block: &VersionedBlock, slots_per_epoch: u64) -> BTreeSet<u64> {
    block.base_body().attestations.iter().map(|a| a.data.slot / slots_per_epoch).collect()
}

/// Converts a block of any revision.
pub fn normalize_block(block: VersionedBlock, ctx: &NormalizeContext<'_>) -> Result<Block> {
    let VersionedBlock { block_root, canonical, block } = block;
    match block {
        BlockVariant::Phase0(b) => normalize_phase0(block_root, canonical, b, ctx),
        BlockVariant::Altair(b) => normalize_altair(block_root, canonical, b, ctx),
        BlockVariant::Bellatrix(b) => normalize_bellatrix(block_root, canonical, b, ctx),
        BlockVariant::Capella(b) => normalize_capella(block_root, canonical, b, ctx),
    }
}

/// Launch revision: shared fields only.
pub fn normalize_phase0(
    block_root: B256,
    canonical: bool,
    signed: SignedBeaconBlock<Phase0Body>,
    ctx: &NormalizeContext<'_>,
) -> Result<Block> {
    let mut block = header_block(block_root, canonical, &signed);
    apply_base_body(&mut block, signed.block.body, ctx)?;
    Ok(block)
}

/// Adds the sync aggregate.
pub fn normalize_altair(
    block_root: B256,
    canonical: bool,
    signed: SignedBeaconBlock<AltairBody>,
    ctx: &NormalizeContext<'_>,
) -> Result<Block> {
    let mut block = header_block(block_root, canonical, &signed);
    let AltairBody { base, sync_aggregate } = signed.block.body;
    apply_base_body(&mut block, base, ctx)?;
    block.sync_aggregate = sync_aggregate.map(convert_sync_aggregate);
    Ok(block)
}

/// Adds the execution payload.
pub fn normalize_bellatrix(
    block_root: B256,
    canonical: bool,
    signed: SignedBeaconBlock<BellatrixBody>,
    ctx: &NormalizeContext<'_>,
) -> Result<Block> {
    let mut block = header_block(block_root, canonical, &signed);
    let BellatrixBody { base, sync_aggregate, execution_payload } = signed.block.body;
    apply_base_body(&mut block, base, ctx)?;
    block.sync_aggregate = sync_aggregate.map(convert_sync_aggregate);
    block.execution_payload = execution_payload
        .filter(|p| !p.parent_hash.is_zero())
        .map(|p| convert_payload(p, ctx.scheme))
        .transpose()?;
    Ok(block)
}

/// Adds withdrawals and credential changes.
pub fn normalize_capella(
    block_root: B256,
    canonical: bool,
    signed: SignedBeaconBlock<CapellaBody>,
    ctx: &NormalizeContext<'_>,
) -> Result<Block> {
    let mut block = header_block(block_root, canonical, &signed);
    let slot = block.slot;
    let CapellaBody { base, sync_aggregate, execution_payload, bls_to_execution_changes } =
        signed.block.body;
    apply_base_body(&mut block, base, ctx)?;
    block.sync_aggregate = sync_aggregate.map(convert_sync_aggregate);

    if let Some(capella) = execution_payload.filter(|p| !p.payload.parent_hash.is_zero()) {
        let mut payload = convert_payload(capella.payload, ctx.scheme)?;
        payload.withdrawals = capella
            .withdrawals
            .into_iter()
            .map(|w| convert_withdrawal(w, slot, block_root))
            .collect();
        block.execution_payload = Some(payload);
    }
    block.bls_to_execution_changes =
        Some(bls_to_execution_changes.into_iter().map(convert_bls_change).collect());
    Ok(block)
}

fn header_block<B>(block_root: B256, canonical: bool, signed: &SignedBeaconBlock<B>) -> Block {
    let b = &signed.block;
    Block {
        status: BlockStatus::Proposed,
        canonical,
        block_root,
        slot: b.slot,
        proposer: b.proposer_index,
        parent_root: b.parent_root,
        state_root: b.state_root,
        signature: signed.signature.clone(),
        ..Default::default()
    }
}

fn apply_base_body(block: &mut Block, body: Phase0Body, ctx: &NormalizeContext<'_>) -> Result<()> {
    let Phase0Body {
        randao_reveal,
        eth1_data,
        graffiti,
        proposer_slashings,
        attester_slashings,
        attestations,
        deposits,
        voluntary_exits,
    } = body;

    block.randao_reveal = randao_reveal;
    block.graffiti = graffiti;
    block.eth1_data = eth1_data
        .map(|e| Eth1Data {
            deposit_root: e.deposit_root,
            deposit_count: e.deposit_count,
            block_hash: e.block_hash,
        })
        .unwrap_or_default();
    block.proposer_slashings = proposer_slashings.into_iter().map(convert_proposer_slashing).collect();
    block.attester_slashings = attester_slashings.into_iter().map(convert_attester_slashing).collect();
    block.deposits = deposits
        .into_iter()
        .map(|d| BlockDeposit {
            proof: d.proof,
            public_key: d.data.public_key,
            withdrawal_credentials: d.data.withdrawal_credentials,
            amount: d.data.amount,
            signature: d.data.signature,
        })
        .collect();
    block.voluntary_exits = voluntary_exits
        .into_iter()
        .map(|e| VoluntaryExit {
            epoch: e.exit.epoch,
            validator_index: e.exit.validator_index,
            signature: e.signature,
        })
        .collect();

    let slot = block.slot;
    block.attestations = attestations
        .into_iter()
        .enumerate()
        .map(|(i, a)| convert_attestation(slot, i, a, ctx))
        .collect::<Result<_>>()?;
    Ok(())
}

fn convert_attestation(
    block_slot: u64,
    position: usize,
    attestation: WireAttestation,
    ctx: &NormalizeContext<'_>,
) -> Result<Attestation> {
    let WireAttestation { aggregation_bits, data, signature } = attestation;
    let epoch = data.slot / ctx.slots_per_epoch;
    let assignments = ctx
        .assignments
        .get(&epoch)
        .ok_or_else(|| eyre!("error receiving epoch assignment for epoch {epoch}"))?;

    let mut attesters = Vec::new();
    for member in 0..bitlist_len(&aggregation_bits) {
        if !bit_at(&aggregation_bits, member) {
            continue;
        }
        let validator = assignments.attester(data.slot, data.committee_index, member).unwrap_or_else(|| {
            error!(
                attestation = position,
                block_slot,
                slot = data.slot,
                committee_index = data.committee_index,
                member,
                "Error retrieving assigned validator for attestation"
            );
            0
        });
        attesters.push(validator);
    }

    Ok(Attestation { aggregation_bits, attesters, data: convert_data(data), signature })
}

fn convert_checkpoint(c: WireCheckpoint) -> Checkpoint {
    Checkpoint { epoch: c.epoch, root: c.root }
}

fn convert_data(d: WireAttestationData) -> AttestationData {
    AttestationData {
        slot: d.slot,
        committee_index: d.committee_index,
        beacon_block_root: d.beacon_block_root,
        source: convert_checkpoint(d.source),
        target: convert_checkpoint(d.target),
    }
}

fn convert_header(h: WireSignedHeader) -> SignedBlockHeader {
    SignedBlockHeader {
        slot: h.header.slot,
        proposer_index: h.header.proposer_index,
        parent_root: h.header.parent_root,
        state_root: h.header.state_root,
        body_root: h.header.body_root,
        signature: h.signature,
    }
}

fn convert_proposer_slashing(s: WireProposerSlashing) -> ProposerSlashing {
    ProposerSlashing {
        proposer_index: s.header_1.header.proposer_index,
        header_1: convert_header(s.header_1),
        header_2: convert_header(s.header_2),
    }
}

fn convert_indexed(a: WireIndexedAttestation) -> IndexedAttestation {
    IndexedAttestation {
        data: convert_data(a.data),
        attesting_indices: a.attesting_indices,
        signature: a.signature,
    }
}

fn convert_attester_slashing(s: WireAttesterSlashing) -> AttesterSlashing {
    AttesterSlashing {
        attestation_1: convert_indexed(s.attestation_1),
        attestation_2: convert_indexed(s.attestation_2),
    }
}

fn convert_sync_aggregate(s: WireSyncAggregate) -> SyncAggregate {
    SyncAggregate {
        participation: sync_participation(&s.sync_committee_bits),
        bits: s.sync_committee_bits,
        signature: s.sync_committee_signature,
    }
}

fn convert_withdrawal(w: WireWithdrawal, slot: u64, block_root: B256) -> Withdrawal {
    Withdrawal {
        slot,
        block_root,
        index: w.index,
        validator_index: w.validator_index,
        address: w.address,
        amount: w.amount,
    }
}

fn convert_bls_change(c: WireSignedBlsChange) -> BlsToExecutionChange {
    BlsToExecutionChange {
        validator_index: c.message.validator_index,
        from_bls_pubkey: c.message.from_bls_pubkey,
        to_execution_address: c.message.to_execution_address,
        signature: c.signature,
    }
}

fn convert_payload(p: WireExecutionPayload, scheme: &SigningScheme) -> Result<ExecutionPayload> {
    let transactions = p
        .transactions
        .into_iter()
        .map(|raw| decode_transaction(raw, scheme))
        .collect::<Result<_>>()
        .wrap_err_with(|| format!("error decoding transactions of block {}", p.block_number))?;

    Ok(ExecutionPayload {
        parent_hash: p.parent_hash,
        fee_recipient: p.fee_recipient,
        state_root: p.state_root,
        receipts_root: p.receipts_root,
        logs_bloom: p.logs_bloom,
        prev_randao: p.prev_randao,
        block_number: p.block_number,
        gas_limit: p.gas_limit,
        gas_used: p.gas_used,
        timestamp: p.timestamp,
        extra_data: p.extra_data,
        base_fee_per_gas: base_fee_le(&p.base_fee_per_gas),
        block_hash: p.block_hash,
        transactions,
        withdrawals: Vec::new(),
    })
}

/// Decodes a payload transaction and recovers its sender.
pub fn decode_transaction(raw: Bytes, scheme: &SigningScheme) -> Result<Transaction> {
    let tx = SigningScheme::decode(&raw)?;
    let sender = scheme.sender(&tx)?;
    let max_fee_per_gas = tx.max_fee_per_gas();

    Ok(Transaction {
        hash: *tx.tx_hash(),
        nonce: tx.nonce(),
        gas_price: tx.gas_price().unwrap_or(max_fee_per_gas),
        gas_limit: tx.gas_limit(),
        sender,
        recipient: tx.to(),
        value: tx.value(),
        input: tx.input().clone(),
        max_priority_fee_per_gas: tx.max_priority_fee_per_gas().unwrap_or(max_fee_per_gas),
        max_fee_per_gas,
        raw,
    })
}

/// Low 64 bits of a little-endian encoded integer.
pub fn base_fee_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(buf)
}

/// Fraction of set bits in a sync committee bitvector.
pub fn sync_participation(bits: &[u8]) -> f64 {
    if bits.is_empty() {
        return 0.0;
    }
    let set: u32 = bits.iter().map(|b| b.count_ones()).sum();
    f64::from(set) / (bits.len() * 8) as f64
}

/// Number of data bits in an SSZ bitlist, excluding the length sentinel.
pub fn bitlist_len(bits: &[u8]) -> u64 {
    let Some(last) = bits.last() else { return 0 };
    let msb = 8 - last.leading_zeros() as u64;
    if msb == 0 {
        return 0;
    }
    8 * (bits.len() as u64 - 1) + msb - 1
}

/// Bit `index` of a little-endian bitfield.
pub fn bit_at(bits: &[u8], index: u64) -> bool {
    let byte = (index / 8) as usize;
    bits.get(byte).is_some_and(|b| (b >> (index % 8)) & 1 == 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    use alloy_primitives::{Address, address};
    use primitives::epoch::AttesterKey;

    use crate::wire::{WireBeaconBlock, WireBlsChange, WireCapellaPayload, WireEth1Data};

    const EIP155_TX: &str = "f86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83";

    fn signed<B>(slot: u64, body: B) -> SignedBeaconBlock<B> {
        SignedBeaconBlock {
            block: WireBeaconBlock {
                slot,
                proposer_index: 11,
                parent_root: B256::repeat_byte(1),
                state_root: B256::repeat_byte(2),
                body,
            },
            signature: Bytes::from_static(&[0xaa]),
        }
    }

    fn payload(parent_hash: B256) -> WireExecutionPayload {
        WireExecutionPayload {
            parent_hash,
            block_number: 15_537_394,
            base_fee_per_gas: Bytes::from(vec![0x00, 0xe4, 0x0b, 0x54, 0x02, 0, 0, 0]),
            transactions: vec![Bytes::from(hex::decode(EIP155_TX).unwrap())],
            ..Default::default()
        }
    }

    fn assignments() -> HashMap<u64, Arc<EpochAssignments>> {
        let mut a = EpochAssignments::default();
        a.proposers.insert(64, 11);
        for (member, validator) in [(0, 100), (1, 101), (2, 102)] {
            a.attesters.insert(AttesterKey { slot: 63, committee_index: 4, member_index: member }, validator);
        }
        HashMap::from([(1, Arc::new(a))])
    }

    #[test]
    fn bellatrix_block_has_payload_and_no_bls_changes() {
        let scheme = SigningScheme::new(1);
        let assignments = assignments();
        let ctx = NormalizeContext { scheme: &scheme, slots_per_epoch: 32, assignments: &assignments };
        let body = BellatrixBody {
            execution_payload: Some(payload(B256::repeat_byte(3))),
            ..Default::default()
        };

        let block =
            normalize_bellatrix(B256::repeat_byte(9), true, signed(4_700_013, body), &ctx).unwrap();
        assert_eq!(block.status, BlockStatus::Proposed);
        assert!(block.canonical);
        assert!(block.bls_to_execution_changes.is_none());
        let payload = block.execution_payload.unwrap();
        assert_eq!(payload.base_fee_per_gas, 10_000_000_000);
        assert_eq!(payload.transactions.len(), 1);
        let tx = &payload.transactions[0];
        assert_eq!(tx.sender, address!("0x9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F"));
        assert_eq!(tx.nonce, 9);
        assert_eq!(tx.gas_price, 20_000_000_000);
        assert_eq!(tx.max_fee_per_gas, tx.gas_price);
        assert_eq!(tx.recipient, Some(Address::repeat_byte(0x35)));
    }

    #[test]
    fn pre_merge_payload_is_dropped() {
        let scheme = SigningScheme::new(1);
        let assignments = HashMap::new();
        let ctx = NormalizeContext { scheme: &scheme, slots_per_epoch: 32, assignments: &assignments };
        let body = BellatrixBody { execution_payload: Some(payload(B256::ZERO)), ..Default::default() };

        let block = normalize_bellatrix(B256::ZERO, true, signed(4_636_672, body), &ctx).unwrap();
        assert!(block.execution_payload.is_none());
    }

    #[test]
    fn capella_withdrawals_carry_slot_and_root() {
        let scheme = SigningScheme::new(1);
        let assignments = HashMap::new();
        let ctx = NormalizeContext { scheme: &scheme, slots_per_epoch: 32, assignments: &assignments };
        let mut inner = payload(B256::repeat_byte(3));
        inner.transactions.clear();
        let body = CapellaBody {
            execution_payload: Some(WireCapellaPayload {
                payload: inner,
                withdrawals: vec![WireWithdrawal {
                    index: 5,
                    validator_index: 77,
                    address: Address::repeat_byte(7),
                    amount: 1_000,
                }],
            }),
            bls_to_execution_changes: vec![WireSignedBlsChange {
                message: WireBlsChange { validator_index: 77, ..Default::default() },
                signature: Bytes::new(),
            }],
            ..Default::default()
        };
        let root = B256::repeat_byte(9);

        let block = normalize_capella(root, false, signed(6_209_536, body), &ctx).unwrap();
        let withdrawals = block.withdrawals();
        assert_eq!(withdrawals.len(), 1);
        assert_eq!(withdrawals[0].slot, 6_209_536);
        assert_eq!(withdrawals[0].block_root, root);
        assert_eq!(withdrawals[0].validator_index, 77);
        assert_eq!(block.bls_to_execution_changes.unwrap()[0].validator_index, 77);
    }

    #[test]
    fn capella_without_changes_still_has_empty_list() {
        let scheme = SigningScheme::new(1);
        let assignments = HashMap::new();
        let ctx = NormalizeContext { scheme: &scheme, slots_per_epoch: 32, assignments: &assignments };

        let block =
            normalize_capella(B256::ZERO, true, signed(6_209_537, CapellaBody::default()), &ctx)
                .unwrap();
        assert_eq!(block.bls_to_execution_changes, Some(Vec::new()));
    }

    #[test]
    fn attesters_resolve_through_committee_order() {
        let scheme = SigningScheme::new(1);
        let assignments = assignments();
        let ctx = NormalizeContext { scheme: &scheme, slots_per_epoch: 32, assignments: &assignments };
        // Bits 0, 2 and 3 set, sentinel at bit 4. Member 3 has no assignment.
        let attestation = WireAttestation {
            aggregation_bits: Bytes::from_static(&[0b0001_1101]),
            data: WireAttestationData { slot: 63, committee_index: 4, ..Default::default() },
            signature: Bytes::new(),
        };
        let body = Phase0Body {
            eth1_data: Some(WireEth1Data { deposit_count: 3, ..Default::default() }),
            attestations: vec![attestation],
            ..Default::default()
        };

        let block = normalize_phase0(B256::ZERO, true, signed(64, body), &ctx).unwrap();
        assert_eq!(block.attestations[0].attesters, vec![100, 102, 0]);
        assert_eq!(block.eth1_data.deposit_count, 3);
        assert!(block.sync_aggregate.is_none());
    }

    #[test]
    fn missing_epoch_assignments_fail_the_block() {
        let scheme = SigningScheme::new(1);
        let assignments = HashMap::new();
        let ctx = NormalizeContext { scheme: &scheme, slots_per_epoch: 32, assignments: &assignments };
        let body = Phase0Body {
            attestations: vec![WireAttestation {
                aggregation_bits: Bytes::from_static(&[0b11]),
                data: WireAttestationData { slot: 95, ..Default::default() },
                signature: Bytes::new(),
            }],
            ..Default::default()
        };

        let err = normalize_phase0(B256::ZERO, true, signed(96, body), &ctx).unwrap_err();
        assert!(err.to_string().contains("epoch 2"));
    }

    #[test]
    fn sync_participation_bounds() {
        assert_eq!(sync_participation(&[0xff; 64]), 1.0);
        assert_eq!(sync_participation(&[0x00; 64]), 0.0);
        assert_eq!(sync_participation(&[0x0f]), 0.5);
        assert_eq!(sync_participation(&[]), 0.0);
    }

    #[test]
    fn bitlist_length_excludes_sentinel() {
        assert_eq!(bitlist_len(&[]), 0);
        assert_eq!(bitlist_len(&[0x00]), 0);
        assert_eq!(bitlist_len(&[0x01]), 0);
        assert_eq!(bitlist_len(&[0xff, 0x01]), 8);
        assert_eq!(bitlist_len(&[0b0001_0000]), 4);
        assert!(bit_at(&[0x00, 0x02], 9));
        assert!(!bit_at(&[0x02], 20));
    }

    #[test]
    fn base_fee_pads_short_input() {
        assert_eq!(base_fee_le(&[0x07]), 7);
        assert_eq!(base_fee_le(&[]), 0);
        assert_eq!(base_fee_le(&[1, 0, 0, 0, 0, 0, 0, 0, 0xff]), 1);
    }
}
