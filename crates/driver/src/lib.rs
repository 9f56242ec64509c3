//! Beaconscope Driver crate root

pub mod deposits;
pub mod driver;
pub mod heads;

pub use driver::Driver;
