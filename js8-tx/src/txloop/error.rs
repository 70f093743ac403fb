/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the TX loop.
//!
//! Two enums model the two layers:
//!
//! * [`ConfigurationReason`] – which value was rejected and why, with the
//!   exact numbers involved.
//! * [`TxLoopError`] – what a caller of [`TxLoop`](super::TxLoop) or
//!   [`TxLoopHandle`](super::driver::TxLoopHandle) gets back.
//!
//! A rejected change never touches the loop's state: the caller must not
//! assume the value was applied.

use thiserror::Error;

use crate::submode::SubmodeError;

/// Why a configuration change was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationReason {
    /// TX delay below zero.
    NegativeTxDelay { tx_delay_ms: i64 },

    /// TX delay above [`MAX_TX_DELAY_MS`](super::MAX_TX_DELAY_MS).
    TxDelayTooLong { tx_delay_ms: i64, max_ms: i64 },

    /// The submode's own period does not fit into the loop period.
    SubmodePeriodExceedsLoop {
        submode_period_ms: i64,
        loop_period_ms: i64,
    },

    /// Loop period of zero or less.
    NonPositiveLoopPeriod { loop_period_ms: i64 },
}

impl std::fmt::Display for ConfigurationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigurationReason::NegativeTxDelay { tx_delay_ms } => {
                write!(f, "negative tx delay of {}ms not acceptable", tx_delay_ms)
            }

            ConfigurationReason::TxDelayTooLong {
                tx_delay_ms,
                max_ms,
            } => write!(
                f,
                "unreasonably long tx delay of {}ms not acceptable, max is {}ms",
                tx_delay_ms, max_ms
            ),

            ConfigurationReason::SubmodePeriodExceedsLoop {
                submode_period_ms,
                loop_period_ms,
            } => write!(
                f,
                "submode period of {}ms does not fit tx schedule period of {}ms",
                submode_period_ms, loop_period_ms
            ),

            ConfigurationReason::NonPositiveLoopPeriod { loop_period_ms } => {
                write!(f, "loop period of {}ms must be positive", loop_period_ms)
            }
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TxLoopError {
    #[error(transparent)]
    InvalidSubmode(#[from] SubmodeError),

    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: ConfigurationReason },

    /// The driver task owning the loop has stopped.
    #[error("tx loop '{name}' is no longer running")]
    LoopGone { name: String },
}

impl From<ConfigurationReason> for TxLoopError {
    fn from(reason: ConfigurationReason) -> Self {
        TxLoopError::InvalidConfiguration { reason }
    }
}
