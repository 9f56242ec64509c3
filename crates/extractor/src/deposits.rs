//! Deposit log decoding, verification and enrichment.
use std::collections::BTreeSet;

use alloy::{primitives::B256, rpc::types::Log};
use alloy_consensus::Transaction as _;
use chainio::{SigningScheme, decode_deposit_log, verify_deposit_signature};
use eyre::{Result, WrapErr, eyre};
use primitives::deposit::Deposit;
use tracing::{info, warn};

use crate::{EnrichmentData, ExecutionSource};

/// Decodes every deposit event in `logs` and verifies its signature against
/// `domain`.
///
/// Logs with another topic 0 are skipped. Deposits with an invalid signature
/// are kept with `valid_signature = false`.
pub fn decode_deposit_logs(logs: &[Log], domain: B256) -> Result<Vec<Deposit>> {
    let mut deposits = Vec::new();
    for log in logs {
        let Some(event) = decode_deposit_log(log)? else {
            continue;
        };
        let tx_hash =
            log.transaction_hash.ok_or_else(|| eyre!("deposit log without transaction hash"))?;
        let block_number =
            log.block_number.ok_or_else(|| eyre!("deposit log {tx_hash} without block number"))?;

        let valid_signature = verify_deposit_signature(
            &event.pubkey,
            &event.withdrawal_credentials,
            event.amount,
            &event.signature,
            domain,
        );
        if !valid_signature {
            warn!(%tx_hash, index = event.index, "Deposit carries an invalid signature");
        }

        deposits.push(Deposit {
            tx_hash,
            tx_index: log.transaction_index.unwrap_or_default(),
            block_number,
            public_key: event.pubkey,
            withdrawal_credentials: event.withdrawal_credentials,
            amount: event.amount,
            signature: event.signature,
            merkletree_index: event.index,
            removed: log.removed,
            valid_signature,
            ..Default::default()
        });
    }
    Ok(deposits)
}

/// Distinct block numbers and transaction hashes referenced by `deposits`.
pub fn enrichment_targets(deposits: &[Deposit]) -> (Vec<u64>, Vec<B256>) {
    let blocks: BTreeSet<u64> = deposits.iter().map(|d| d.block_number).collect();
    let txs: BTreeSet<B256> = deposits.iter().map(|d| d.tx_hash).collect();
    (blocks.into_iter().collect(), txs.into_iter().collect())
}

/// Fills in block timestamps, transaction input and sender.
///
/// Any deposit whose block or transaction is missing, or whose sender cannot be
/// recovered, fails the whole batch.
pub fn enrich_deposits(deposits: &mut [Deposit], data: &EnrichmentData) -> Result<()> {
    for deposit in deposits.iter_mut() {
        let header = data.headers.get(&deposit.block_number).ok_or_else(|| {
            eyre!("block {} of deposit {} was not fetched", deposit.block_number, deposit.tx_hash)
        })?;
        deposit.block_ts = header.timestamp;

        let tx = data
            .transactions
            .get(&deposit.tx_hash)
            .ok_or_else(|| eyre!("transaction of deposit {} was not fetched", deposit.tx_hash))?;
        deposit.tx_input = tx.input().clone();

        let scheme = SigningScheme::for_transaction(tx)
            .wrap_err_with(|| format!("error getting chain id of deposit {}", deposit.tx_hash))?;
        deposit.from_address = scheme.sender(tx).wrap_err_with(|| {
            format!(
                "error getting sender of deposit {} (chain id {})",
                deposit.tx_hash,
                scheme.chain_id()
            )
        })?;
    }
    Ok(())
}

/// Fetches, verifies and enriches the deposits emitted in `[from_block, to_block]`.
pub async fn fetch_deposits<S>(
    source: &S,
    domain: B256,
    from_block: u64,
    to_block: u64,
) -> Result<Vec<Deposit>>
where
    S: ExecutionSource + ?Sized,
{
    let logs = source.deposit_logs(from_block, to_block).await?;
    let mut deposits = decode_deposit_logs(&logs, domain)?;
    if deposits.is_empty() {
        return Ok(deposits);
    }

    let (blocks, txs) = enrichment_targets(&deposits);
    let data = source
        .fetch_enrichment(&blocks, &txs)
        .await
        .wrap_err("error getting execution blocks and transactions")?;
    enrich_deposits(&mut deposits, &data)?;

    info!(from_block, to_block, count = deposits.len(), "Fetched deposits");
    Ok(deposits)
}
