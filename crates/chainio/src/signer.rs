//! Execution transaction decoding and sender recovery.
use alloy_consensus::{Transaction as _, TxEnvelope, transaction::SignerRecoverable as _};
use alloy_eips::eip2718::Decodable2718 as _;
use alloy_primitives::Address;
use eyre::{Result, WrapErr, bail, eyre};

/// Signature rules of an execution chain, bound to its chain id.
///
/// Accepts every transaction type the chain supports. Replay-protected
/// transactions must carry the scheme's chain id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningScheme {
    chain_id: u64,
}

impl SigningScheme {
    /// Scheme for the chain with id `chain_id`.
    pub const fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }

    /// Scheme matching the chain id embedded in `tx`.
    ///
    /// Fails for transactions without replay protection.
    pub fn for_transaction(tx: &TxEnvelope) -> Result<Self> {
        tx.chain_id()
            .map(Self::new)
            .ok_or_else(|| eyre!("transaction {} carries no chain id", tx.tx_hash()))
    }

    /// Chain id of this scheme.
    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Decodes an EIP-2718 encoded transaction.
    pub fn decode(mut raw: &[u8]) -> Result<TxEnvelope> {
        TxEnvelope::decode_2718(&mut raw).wrap_err("undecodable transaction")
    }

    /// Recovers the address that signed `tx`.
    pub fn sender(&self, tx: &TxEnvelope) -> Result<Address> {
        if let Some(chain_id) = tx.chain_id().filter(|id| *id != self.chain_id) {
            bail!(
                "transaction {} is for chain {chain_id}, expected {}",
                tx.tx_hash(),
                self.chain_id
            );
        }
        tx.recover_signer()
            .map_err(|e| eyre!("invalid sender for transaction {}: {e}", tx.tx_hash()))
    }
}
