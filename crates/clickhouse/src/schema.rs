//! Schema definitions for ClickHouse tables

/// Table schema definition
#[derive(Debug)]
pub struct TableSchema {
    /// Table name
    pub name: &'static str,
    /// Column definitions
    pub columns: &'static str,
    /// Sorting key, which is also the deduplication key
    pub order_by: &'static str,
}

/// Names of all tables
pub const TABLES: &[&str] =
    &["eth1_deposits", "blocks", "blocks_attestations", "blocks_withdrawals", "validators", "epochs"];

/// Schema definitions for tables.
///
/// Every table is a `ReplacingMergeTree` versioned by `inserted_at`, so
/// writing a row with an existing sorting key replaces it.
pub const TABLE_SCHEMAS: &[TableSchema] = &[
    TableSchema {
        name: "eth1_deposits",
        columns: "tx_hash FixedString(32),
                 tx_input String,
                 tx_index UInt64,
                 block_number UInt64,
                 block_ts UInt64,
                 from_address FixedString(20),
                 publickey String,
                 withdrawal_credentials String,
                 amount UInt64,
                 signature String,
                 merkletree_index UInt64,
                 removed Bool,
                 valid_signature Bool,
                 inserted_at DateTime64(3) DEFAULT now64()",
        order_by: "tx_hash, merkletree_index",
    },
    TableSchema {
        name: "blocks",
        columns: "slot UInt64,
                 block_root FixedString(32),
                 status UInt8,
                 canonical Bool,
                 proposer UInt64,
                 parent_root FixedString(32),
                 state_root FixedString(32),
                 signature String,
                 randao_reveal String,
                 graffiti String,
                 eth1_deposit_root String,
                 eth1_deposit_count UInt64,
                 eth1_block_hash String,
                 proposer_slashings_count UInt32,
                 attester_slashings_count UInt32,
                 attestations_count UInt32,
                 deposits_count UInt32,
                 voluntary_exits_count UInt32,
                 sync_participation Nullable(Float64),
                 exec_block_number Nullable(UInt64),
                 exec_block_hash Nullable(FixedString(32)),
                 exec_fee_recipient Nullable(FixedString(20)),
                 exec_base_fee_per_gas Nullable(UInt64),
                 exec_transactions_count UInt32,
                 bls_changes_count Nullable(UInt32),
                 inserted_at DateTime64(3) DEFAULT now64()",
        order_by: "slot, block_root",
    },
    TableSchema {
        name: "blocks_attestations",
        columns: "slot UInt64,
                 block_root FixedString(32),
                 attestation_index UInt32,
                 aggregation_bits String,
                 attesters Array(UInt64),
                 attestation_slot UInt64,
                 committee_index UInt64,
                 beacon_block_root FixedString(32),
                 source_epoch UInt64,
                 target_epoch UInt64,
                 inserted_at DateTime64(3) DEFAULT now64()",
        order_by: "slot, block_root, attestation_index",
    },
    TableSchema {
        name: "blocks_withdrawals",
        columns: "slot UInt64,
                 block_root FixedString(32),
                 withdrawal_index UInt64,
                 validator_index UInt64,
                 address FixedString(20),
                 amount UInt64,
                 inserted_at DateTime64(3) DEFAULT now64()",
        order_by: "slot, block_root, withdrawal_index",
    },
    TableSchema {
        name: "validators",
        columns: "validator_index UInt64,
                 snapshot_epoch UInt64,
                 pubkey String,
                 withdrawal_credentials String,
                 balance UInt64,
                 effective_balance UInt64,
                 slashed Bool,
                 activation_eligibility_epoch UInt64,
                 activation_epoch UInt64,
                 exit_epoch UInt64,
                 withdrawable_epoch UInt64,
                 status String,
                 balance_1d UInt64,
                 balance_7d UInt64,
                 balance_31d UInt64,
                 withdrawal UInt64,
                 withdrawal_1d UInt64,
                 withdrawal_7d UInt64,
                 withdrawal_31d UInt64,
                 inserted_at DateTime64(3) DEFAULT now64()",
        order_by: "validator_index",
    },
    TableSchema {
        name: "epochs",
        columns: "epoch UInt64,
                 blocks_count UInt32,
                 proposed_count UInt32,
                 missed_count UInt32,
                 scheduled_count UInt32,
                 validators_count UInt32,
                 finalized Bool,
                 global_participation_rate Float64,
                 voted_ether UInt64,
                 eligible_ether UInt64,
                 inserted_at DateTime64(3) DEFAULT now64()",
        order_by: "epoch",
    },
];
