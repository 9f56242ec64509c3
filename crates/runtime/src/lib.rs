//! Process runtime helpers for Beaconscope.

pub mod shutdown;
