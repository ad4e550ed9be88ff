//! OFDM frame-duration arithmetic for 802.11a-style PPDUs, and the fixed DCF
//! inter-frame spacings derived from the 9 us slot.
//!
//! `embassy_time::Duration` is used here purely as a typed value — a way to
//! hand callers an unambiguous duration instead of a bare `u64` — and is
//! never driven by a registered clock.

use embassy_time::Duration;

/// Data rate and control (ACK) rate, in bits per microsecond, per MCS index.
const MCS_RATES: [(u64, u64); 8] = [
    (6, 6),
    (9, 6),
    (12, 12),
    (18, 12),
    (24, 24),
    (36, 24),
    (48, 24),
    (54, 24),
];

pub const SLOT_US: u64 = 9;
pub const SIFS_US: u64 = 16;
pub const DIFS_US: u64 = 3 * SLOT_US + SIFS_US;
pub const ACK_TIMEOUT_US: u64 = 45;

const MAC_OVERHEAD_BITS: u64 = 40 * 8;
const ACK_SIZE_BITS: u64 = 14 * 8;
const OVERHEAD_BITS: u64 = 22;
const OFDM_PREAMBLE_US: u64 = 16;

/// Derives PPDU/ACK air time for a given payload size and MCS index.
#[derive(Debug, Clone, Copy)]
pub struct RadioTimings {
    payload_bytes: u64,
    data_rate: u64,
    ctr_rate: u64,
}

impl RadioTimings {
    /// `mcs` must be `0..=7`; panics otherwise, mirroring an out-of-table
    /// lookup in the reference model (a configuration bug, not a runtime
    /// condition a simulation run should silently tolerate).
    pub fn new(payload_bytes: u64, mcs: u8) -> Self {
        let (data_rate, ctr_rate) = MCS_RATES[mcs as usize];
        RadioTimings {
            payload_bytes,
            data_rate,
            ctr_rate,
        }
    }

    /// Full data-PPDU air time: preamble + SIGNAL + padded payload symbols.
    pub fn ppdu_time_us(&self) -> u64 {
        let msdu_bits = self.payload_bytes * 8;
        let mac_frame_bits = MAC_OVERHEAD_BITS + msdu_bits;
        let n_data = 4 * self.data_rate;
        let raw_bits = OVERHEAD_BITS + mac_frame_bits;
        let padding = raw_bits.div_ceil(n_data) * n_data - raw_bits;
        let cpsdu_bits = raw_bits + padding;

        let ofdm_signal_us = 24.0 / self.ctr_rate as f64;
        let ppdu_us = OFDM_PREAMBLE_US as f64 + ofdm_signal_us + cpsdu_bits as f64 / self.data_rate as f64;
        ppdu_us.ceil() as u64
    }

    pub fn ppdu_time(&self) -> Duration {
        Duration::from_micros(self.ppdu_time_us())
    }

    /// ACK air time including the preceding SIFS. Fixed at 44 us, matching
    /// the reference model's hardcoded constant rather than the (commented
    /// out) formula it derives from — the two agree for the MCS range used
    /// in practice, and 44 is what downstream statistics are calibrated to.
    pub fn ack_time_us(&self) -> u64 {
        44
    }

    pub fn ack_time(&self) -> Duration {
        Duration::from_micros(self.ack_time_us())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ppdu_time_matches_reference_constant_for_mcs7_default_payload() {
        let t = RadioTimings::new(1472, 7);
        assert_eq!(t.ppdu_time_us(), 245);
    }

    #[test]
    fn ack_time_is_fixed_44us() {
        let t = RadioTimings::new(1472, 7);
        assert_eq!(t.ack_time_us(), 44);
    }

    #[test]
    fn difs_is_three_slots_plus_sifs() {
        assert_eq!(DIFS_US, 43);
    }

    #[test]
    fn slower_mcs_yields_longer_ppdu() {
        let fast = RadioTimings::new(1472, 7);
        let slow = RadioTimings::new(1472, 0);
        assert!(slow.ppdu_time_us() > fast.ppdu_time_us());
    }
}
