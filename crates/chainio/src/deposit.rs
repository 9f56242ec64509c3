//! Deposit signing domains and BLS signature verification.
use alloy_primitives::{B256, FixedBytes};
use blst::{
    BLST_ERROR,
    min_pk::{PublicKey, Signature},
};
use tracing::debug;
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

/// Domain type of deposit signatures.
pub const DOMAIN_DEPOSIT: [u8; 4] = [0x03, 0x00, 0x00, 0x00];

/// Ciphersuite tag for proof-of-possession BLS signatures.
pub const BLS_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

/// Fork versions that deposits of legacy test networks were signed with.
///
/// These networks launched with a genesis fork version that differs from the
/// one deposit tooling signed against.
const LEGACY_DEPOSIT_FORK_VERSIONS: &[(&str, [u8; 4])] = &[
    ("zinken", [0x00, 0x00, 0x00, 0x03]),
    ("toledo", [0x00, 0x70, 0x1E, 0xD0]),
    ("pyrmont", [0x00, 0x00, 0x20, 0x09]),
    ("prater", [0x00, 0x00, 0x10, 0x20]),
];

#[derive(TreeHash)]
struct ForkData {
    current_version: FixedBytes<4>,
    genesis_validators_root: B256,
}

#[derive(TreeHash)]
struct DepositMessage {
    pubkey: FixedBytes<48>,
    withdrawal_credentials: B256,
    amount: u64,
}

#[derive(TreeHash)]
struct SigningData {
    object_root: B256,
    domain: B256,
}

/// Fork version deposits of `network` are signed with.
pub fn deposit_fork_version(network: &str, genesis_fork_version: FixedBytes<4>) -> FixedBytes<4> {
    LEGACY_DEPOSIT_FORK_VERSIONS
        .iter()
        .find(|(name, _)| *name == network)
        .map(|(_, version)| FixedBytes(*version))
        .unwrap_or(genesis_fork_version)
}

/// Computes a signing domain: the domain type followed by the first 28 bytes
/// of the fork data root.
pub fn compute_domain(
    domain_type: [u8; 4],
    fork_version: FixedBytes<4>,
    genesis_validators_root: B256,
) -> B256 {
    let fork_data_root =
        ForkData { current_version: fork_version, genesis_validators_root }.tree_hash_root();
    let mut domain = [0u8; 32];
    domain[..4].copy_from_slice(&domain_type);
    domain[4..].copy_from_slice(&fork_data_root[..28]);
    B256::from(domain)
}

/// The deposit signing domain of `network`.
///
/// Deposits are always signed against a zero genesis validators root.
pub fn deposit_domain(network: &str, genesis_fork_version: FixedBytes<4>) -> B256 {
    let version = deposit_fork_version(network, genesis_fork_version);
    let domain = compute_domain(DOMAIN_DEPOSIT, version, B256::ZERO);
    debug!(network, %version, %domain, "Computed deposit domain");
    domain
}

/// Root that deposit signatures sign over.
///
/// Returns `None` if the public key or withdrawal credentials have the wrong
/// length.
pub fn deposit_signing_root(
    pubkey: &[u8],
    withdrawal_credentials: &[u8],
    amount: u64,
    domain: B256,
) -> Option<B256> {
    if pubkey.len() != 48 || withdrawal_credentials.len() != 32 {
        return None;
    }
    let message = DepositMessage {
        pubkey: FixedBytes::from_slice(pubkey),
        withdrawal_credentials: B256::from_slice(withdrawal_credentials),
        amount,
    };
    Some(SigningData { object_root: message.tree_hash_root(), domain }.tree_hash_root())
}

/// Verifies a deposit signature.
///
/// Malformed keys or signatures verify as `false`; an invalid deposit is still
/// a deposit and the caller records it.
pub fn verify_deposit_signature(
    pubkey: &[u8],
    withdrawal_credentials: &[u8],
    amount: u64,
    signature: &[u8],
    domain: B256,
) -> bool {
    let Some(root) = deposit_signing_root(pubkey, withdrawal_credentials, amount, domain) else {
        return false;
    };
    let Ok(pubkey) = PublicKey::from_bytes(pubkey) else {
        return false;
    };
    let Ok(signature) = Signature::from_bytes(signature) else {
        return false;
    };
    signature.verify(true, root.as_slice(), BLS_DST, &[], &pubkey, true) == BLST_ERROR::BLST_SUCCESS
}
