//! Slot and epoch arithmetic.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Slots in one day at 12 second slots.
pub const SLOTS_PER_DAY: u64 = 7200;

/// Timing parameters of the beacon chain being indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Slots per epoch
    pub slots_per_epoch: u64,
    /// Seconds per slot
    pub seconds_per_slot: u64,
    /// Unix timestamp of slot 0
    pub genesis_timestamp: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self { slots_per_epoch: 32, seconds_per_slot: 12, genesis_timestamp: 0 }
    }
}

impl ChainConfig {
    /// Epoch containing `slot`.
    pub const fn epoch_of_slot(&self, slot: u64) -> u64 {
        slot / self.slots_per_epoch
    }

    /// First slot of `epoch`.
    pub const fn first_slot(&self, epoch: u64) -> u64 {
        epoch * self.slots_per_epoch
    }

    /// Last slot of `epoch`.
    pub const fn last_slot(&self, epoch: u64) -> u64 {
        (epoch + 1) * self.slots_per_epoch - 1
    }

    /// Wall-clock start of `slot`, saturating at [`DateTime::MAX_UTC`].
    pub fn slot_time(&self, slot: u64) -> DateTime<Utc> {
        slot.checked_mul(self.seconds_per_slot)
            .and_then(|offset| offset.checked_add(self.genesis_timestamp))
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Reference slots used for historical balance and withdrawal deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoricalSlots {
    /// The snapshot slot itself
    pub current: u64,
    /// About one day earlier
    pub day_1: u64,
    /// About seven days earlier
    pub day_7: u64,
    /// About thirty-one days earlier
    pub day_31: u64,
}

impl HistoricalSlots {
    /// Offsets from `slot`, floored at genesis.
    pub const fn from_reference(slot: u64) -> Self {
        Self {
            current: slot,
            day_1: slot.saturating_sub(SLOTS_PER_DAY),
            day_7: slot.saturating_sub(SLOTS_PER_DAY * 7),
            day_31: slot.saturating_sub(SLOTS_PER_DAY * 31),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_bounds() {
        let cfg = ChainConfig::default();
        assert_eq!(cfg.epoch_of_slot(63), 1);
        assert_eq!(cfg.first_slot(2), 64);
        assert_eq!(cfg.last_slot(2), 95);
    }

    #[test]
    fn slot_time_counts_from_genesis() {
        let cfg = ChainConfig { genesis_timestamp: 1_606_824_023, ..Default::default() };
        assert_eq!(cfg.slot_time(10).timestamp(), 1_606_824_143);
    }

    #[test]
    fn slot_time_saturates_on_overflow() {
        let cfg = ChainConfig { genesis_timestamp: u64::MAX - 5, ..Default::default() };
        assert_eq!(cfg.slot_time(1), DateTime::<Utc>::MAX_UTC);
        assert_eq!(ChainConfig::default().slot_time(u64::MAX), DateTime::<Utc>::MAX_UTC);

        let cfg = ChainConfig { genesis_timestamp: i64::MAX as u64, ..Default::default() };
        assert_eq!(cfg.slot_time(0), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn historical_slots_floor_at_zero() {
        let s = HistoricalSlots::from_reference(60_000);
        assert_eq!(s.day_1, 52_800);
        assert_eq!(s.day_7, 9_600);
        assert_eq!(s.day_31, 0);
    }

    #[test]
    fn historical_slots_far_from_genesis() {
        let s = HistoricalSlots::from_reference(300_000);
        assert_eq!(s.day_31, 300_000 - 223_200);
    }
}
