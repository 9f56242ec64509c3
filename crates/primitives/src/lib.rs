//! Core primitives for the Beaconscope project.
//!
//! Everything both ingestion paths agree on lives here: the canonical record
//! set, chain timing helpers, the storage traits and RPC retry helpers.

/// Consensus block model
pub mod block;
/// Chain timing helpers
pub mod chain;
/// Execution-layer deposit records
pub mod deposit;
/// Epoch assignments and snapshots
pub mod epoch;
/// RPC retry helpers
pub mod retries;
/// Storage seams
pub mod store;
/// Validator and chain-state views
pub mod validator;
