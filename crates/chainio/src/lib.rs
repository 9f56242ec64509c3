//! `ChainIO` is a library for interacting with on-chain contracts and the
//! cryptography around them.
pub mod deposit;
pub mod signer;

use alloy::{
    primitives::{Address, B256},
    providers::{RootProvider, fillers::FillProvider, utils::JoinedRecommendedFillers},
    rpc::types::{Filter, Log},
    sol,
};
use alloy_sol_types::SolEvent;
use derive_more::derive::Deref;
use eyre::{Result, WrapErr};

pub use deposit::{deposit_domain, deposit_fork_version, verify_deposit_signature};
pub use signer::SigningScheme;

/// Alias to the default provider with all recommended fillers (read-only).
pub type DefaultProvider = FillProvider<JoinedRecommendedFillers, RootProvider>;

sol! {
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IDepositContract {
        event DepositEvent(
            bytes pubkey,
            bytes withdrawal_credentials,
            bytes amount,
            bytes signature,
            bytes index
        );
    }
}

pub use IDepositContract::DepositEvent;

/// Address of the deposit contract, with helpers for its logs.
#[derive(Debug, Clone, Copy, Deref)]
pub struct DepositContract(Address);

impl DepositContract {
    /// Wrap the contract deployed at `address`.
    pub const fn new(address: Address) -> Self {
        Self(address)
    }

    /// Topic 0 of `DepositEvent`.
    pub const fn deposit_topic() -> B256 {
        DepositEvent::SIGNATURE_HASH
    }

    /// Returns a log [`Filter`] for every log the contract emitted in
    /// `[from_block, to_block]`.
    ///
    /// No topic filter is applied; callers match topic 0 themselves.
    pub fn logs_filter(&self, from_block: u64, to_block: u64) -> Filter {
        Filter::new().address(self.0).from_block(from_block).to_block(to_block)
    }
}

/// The fields of a `DepositEvent` log in their native widths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositLogData {
    /// BLS public key
    pub pubkey: alloy::primitives::Bytes,
    /// Withdrawal credentials
    pub withdrawal_credentials: alloy::primitives::Bytes,
    /// Amount in gwei
    pub amount: u64,
    /// BLS signature
    pub signature: alloy::primitives::Bytes,
    /// Merkle tree index
    pub index: u64,
}

/// Decodes a `DepositEvent` log. Returns `Ok(None)` for logs with another topic 0.
pub fn decode_deposit_log(log: &Log) -> Result<Option<DepositLogData>> {
    if log.topic0() != Some(&DepositEvent::SIGNATURE_HASH) {
        return Ok(None);
    }
    let event = DepositEvent::decode_log_data(log.data())
        .wrap_err_with(|| format!("malformed deposit log in tx {:?}", log.transaction_hash))?;
    Ok(Some(DepositLogData {
        amount: le_u64(&event.amount).wrap_err("deposit amount")?,
        index: le_u64(&event.index).wrap_err("deposit index")?,
        pubkey: event.pubkey,
        withdrawal_credentials: event.withdrawal_credentials,
        signature: event.signature,
    }))
}

/// Reads an 8 byte little-endian integer.
fn le_u64(bytes: &[u8]) -> Result<u64> {
    let arr: [u8; 8] =
        bytes.try_into().map_err(|_| eyre::eyre!("expected 8 bytes, got {}", bytes.len()))?;
    Ok(u64::from_le_bytes(arr))
}
