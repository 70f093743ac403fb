/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Decode-cycle arithmetic over the receive sample buffer.
//!
//! These are free functions rather than methods so they can be used and tested
//! independently of the descriptor table.

use super::{Submode, RX_SAMPLE_SIZE};

/// Index of the period that absolute sample `k` falls into, wrapping once the
/// receive buffer wraps.
///
/// `(k / samples_per_period) mod (RX_SAMPLE_SIZE / samples_per_period)`
pub fn compute_cycle_for_decode(submode: Submode, k: i32) -> i32 {
    let max_frames = RX_SAMPLE_SIZE as i32;
    let cycle_frames = submode.descriptor().samples_per_period as i32;

    (k / cycle_frames) % (max_frames / cycle_frames)
}

/// Like [`compute_cycle_for_decode`], with cycle 0 starting `offset_frames`
/// into the buffer.  A negative shifted position wraps around the buffer.
pub fn compute_alt_cycle_for_decode(submode: Submode, k: i32, offset_frames: i32) -> i32 {
    let alt_k = k - offset_frames;
    let alt_k = if alt_k < 0 {
        alt_k.rem_euclid(RX_SAMPLE_SIZE as i32)
    } else {
        alt_k
    };
    compute_cycle_for_decode(submode, alt_k)
}

/// Fraction of `period` seconds left over after the data portion of a
/// transmission.
pub fn compute_ratio(submode: Submode, period: f64) -> f64 {
    (period - submode.descriptor().data_duration()) / period
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submode::RX_SAMPLE_RATE;

    #[test]
    fn first_period_is_cycle_zero() {
        for s in Submode::ALL {
            assert_eq!(compute_cycle_for_decode(s, 0), 0);
            let last = s.descriptor().samples_per_period as i32 - 1;
            assert_eq!(compute_cycle_for_decode(s, last), 0);
        }
    }

    #[test]
    fn cycles_count_periods() {
        // NORMAL: 15 s periods, 4 per minute-long buffer
        let k = 2 * 180_000 + 17;
        assert_eq!(compute_cycle_for_decode(Submode::Normal, k), 2);
        // ULTRA: 4 s periods, 15 per buffer
        assert_eq!(compute_cycle_for_decode(Submode::Ultra, 14 * 48_000), 14);
    }

    #[test]
    fn cycle_is_periodic_in_buffer_size() {
        let max = RX_SAMPLE_SIZE as i32;
        for s in Submode::ALL {
            for k in [0, 1, 11_999, 47_999, 180_000, 359_999, 500_000, max - 1] {
                assert_eq!(
                    compute_cycle_for_decode(s, k),
                    compute_cycle_for_decode(s, k + max),
                    "{s} k={k}"
                );
            }
        }
    }

    #[test]
    fn alt_cycle_shifts_cycle_start() {
        // Cycle 0 starting at second 5 of a TURBO (6 s) buffer
        let offset = 5 * RX_SAMPLE_RATE as i32;
        assert_eq!(compute_alt_cycle_for_decode(Submode::Turbo, offset, offset), 0);
        assert_eq!(
            compute_alt_cycle_for_decode(Submode::Turbo, offset + 72_000, offset),
            1
        );
    }

    #[test]
    fn alt_cycle_wraps_negative_positions() {
        // k before the offset lands at the end of the buffer: last TURBO cycle.
        let cycles = (RX_SAMPLE_SIZE / 72_000) as i32;
        assert_eq!(
            compute_alt_cycle_for_decode(Submode::Turbo, 0, 1),
            cycles - 1
        );
    }

    #[test]
    fn ratio_of_normal_mode() {
        let r = compute_ratio(Submode::Normal, 15.0);
        assert!((r - (15.0 - 12.64) / 15.0).abs() < 1e-12);
    }
}
