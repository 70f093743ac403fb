/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Drift presets an operator can apply with one action.
//!
//! All presets look at the *undrifted* system clock's second-of-minute and
//! return an absolute drift (not an increment) in milliseconds.

use std::str::FromStr;

use serde::Deserialize;

/// How to pick a new drift value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftSync {
    /// Shift so that "now" lands on the nearest period boundary.  Ties go
    /// forward.
    Period,
    /// Like [`DriftSync::Period`], but two seconds short of the boundary.
    PeriodEnd,
    /// Shift to the nearest full minute.
    Minute,
    /// Back to the system clock.
    Reset,
}

impl DriftSync {
    /// Drift in milliseconds for a wall clock at `second_of_minute` and a
    /// submode period of `period_secs`.
    pub fn drift_ms(self, second_of_minute: i64, period_secs: i64) -> i64 {
        let secs = match self {
            DriftSync::Period => {
                let (pos, neg) = distances(second_of_minute, period_secs);
                if neg.abs() < pos {
                    neg
                } else {
                    pos
                }
            }
            DriftSync::PeriodEnd => {
                let (pos, neg) = distances(second_of_minute, period_secs);
                if neg.abs() < pos {
                    neg + 2
                } else {
                    pos - 2
                }
            }
            DriftSync::Minute => {
                if second_of_minute < 30 {
                    -second_of_minute
                } else {
                    60 - second_of_minute
                }
            }
            DriftSync::Reset => 0,
        };
        secs * 1000
    }
}

/// Forward and backward distance, in seconds, to the period boundaries around
/// `second_of_minute`.  The backward distance is the real one, so the nearest
/// boundary can lie behind; mirroring the forward distance would always pick
/// the forward boundary.
fn distances(second_of_minute: i64, period_secs: i64) -> (i64, i64) {
    let into = second_of_minute % period_secs;
    (period_secs - into, -into)
}

impl FromStr for DriftSync {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "period" => Ok(DriftSync::Period),
            "period_end" | "period-end" => Ok(DriftSync::PeriodEnd),
            "minute" => Ok(DriftSync::Minute),
            "reset" => Ok(DriftSync::Reset),
            other => Err(format!(
                "unknown drift sync '{other}' (valid: period, period_end, minute, reset)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_sync_moves_forward_when_closer() {
        // 15 s period, at second 12 → 3 s to the next boundary.
        assert_eq!(DriftSync::Period.drift_ms(12, 15), 3_000);
    }

    #[test]
    fn period_sync_moves_backward_when_closer() {
        // At second 32 in a 15 s period → 2 s past the boundary at 30.
        assert_eq!(DriftSync::Period.drift_ms(32, 15), -2_000);
        assert_eq!(DriftSync::Period.drift_ms(17, 15), -2_000);
    }

    #[test]
    fn period_sync_on_a_boundary_needs_no_drift() {
        assert_eq!(DriftSync::Period.drift_ms(30, 15), 0);
    }

    #[test]
    fn period_end_sync_pulls_two_seconds_inward() {
        assert_eq!(DriftSync::PeriodEnd.drift_ms(12, 15), 1_000);
        assert_eq!(DriftSync::PeriodEnd.drift_ms(17, 15), 0);
    }

    #[test]
    fn minute_sync_picks_nearest_minute() {
        assert_eq!(DriftSync::Minute.drift_ms(10, 15), -10_000);
        assert_eq!(DriftSync::Minute.drift_ms(30, 15), 30_000);
        assert_eq!(DriftSync::Minute.drift_ms(45, 15), 15_000);
    }

    #[test]
    fn reset_is_zero() {
        assert_eq!(DriftSync::Reset.drift_ms(59, 30), 0);
    }

    #[test]
    fn parses_names() {
        assert_eq!("Period".parse::<DriftSync>().unwrap(), DriftSync::Period);
        assert_eq!(
            "period-end".parse::<DriftSync>().unwrap(),
            DriftSync::PeriodEnd
        );
        assert!("hour".parse::<DriftSync>().is_err());
    }
}
