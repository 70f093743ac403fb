/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! JS8 submode table.
//!
//! Every submode is a fixed timing variant of the same 79-symbol, 8-tone
//! protocol.  The handful of base constants per submode (symbol length, start
//! delay, period, Costas variant, decoder thresholds) fully determine the
//! derived values (total samples, bandwidth, tone spacing, durations) so
//! the whole table is built at compile time by [`SubmodeDescriptor::new`].
//!
//! Raw numeric identifiers come from outside (mode configuration, wire
//! formats).  [`descriptor`] and `Submode::try_from(i32)` are the only
//! entry points for them and reject anything outside the closed set with
//! [`SubmodeError::InvalidSubmode`]; there is no silent fallback, because a
//! zeroed descriptor only moves the failure to a division by zero further
//! downstream.
//!
//! | Submode | id | samples/symbol | period | start delay |
//! |---|---|---|---|---|
//! | Normal | 0 | 1920 | 15 s | 500 ms |
//! | Fast   | 1 | 1200 | 10 s | 200 ms |
//! | Turbo  | 2 |  600 |  6 s | 100 ms |
//! | Slow   | 4 | 3840 | 30 s | 500 ms |
//! | Ultra  | 8 |  384 |  4 s | 100 ms |

pub mod cycle;

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub use cycle::{compute_alt_cycle_for_decode, compute_cycle_for_decode, compute_ratio};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Symbols in one transmission.
pub const NUM_SYMBOLS: usize = 79;

/// Sample rate all table values are expressed in.
pub const RX_SAMPLE_RATE: u32 = 12_000;

/// Seconds of audio kept in the receive buffer.
pub const RX_BUFFER_SECONDS: u32 = 60;

/// Size of the receive sample buffer (`maxFrames` in the cycle arithmetic).
pub const RX_SAMPLE_SIZE: u32 = RX_BUFFER_SECONDS * RX_SAMPLE_RATE;

/// Length of one Costas sync block, in symbols.
pub const COSTAS_LEN: usize = 7;

/// Symbol positions where the three Costas blocks start.
pub const COSTAS_POSITIONS: [usize; 3] = [0, 36, 72];

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmodeError {
    #[error("invalid JS8 submode {0}")]
    InvalidSubmode(i32),

    #[error("unknown JS8 submode name '{0}' (valid: normal, fast, turbo, slow, ultra)")]
    UnknownName(String),
}

// ── Submode ───────────────────────────────────────────────────────────────────

/// The closed set of known submodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Submode {
    Normal,
    Fast,
    Turbo,
    Slow,
    Ultra,
}

impl Submode {
    pub const ALL: [Submode; 5] = [
        Submode::Normal,
        Submode::Fast,
        Submode::Turbo,
        Submode::Slow,
        Submode::Ultra,
    ];

    /// Numeric identifier used outside this crate.  Not dense.
    pub const fn id(self) -> i32 {
        match self {
            Submode::Normal => 0,
            Submode::Fast => 1,
            Submode::Turbo => 2,
            Submode::Slow => 4,
            Submode::Ultra => 8,
        }
    }

    pub const fn descriptor(self) -> &'static SubmodeDescriptor {
        match self {
            Submode::Normal => &NORMAL,
            Submode::Fast => &FAST,
            Submode::Turbo => &TURBO,
            Submode::Slow => &SLOW,
            Submode::Ultra => &ULTRA,
        }
    }
}

impl TryFrom<i32> for Submode {
    type Error = SubmodeError;

    fn try_from(id: i32) -> Result<Self, Self::Error> {
        Submode::ALL
            .into_iter()
            .find(|s| s.id() == id)
            .ok_or(SubmodeError::InvalidSubmode(id))
    }
}

impl FromStr for Submode {
    type Err = SubmodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Submode::ALL
            .into_iter()
            .find(|m| m.descriptor().name.eq_ignore_ascii_case(s))
            .ok_or_else(|| SubmodeError::UnknownName(s.to_string()))
    }
}

impl fmt::Display for Submode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.descriptor().name)
    }
}

/// Look up the descriptor for a raw submode identifier.
pub fn descriptor(id: i32) -> Result<&'static SubmodeDescriptor, SubmodeError> {
    Submode::try_from(id).map(Submode::descriptor)
}

// ── Costas ────────────────────────────────────────────────────────────────────

/// Which set of Costas sync arrays a submode transmits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostasVariant {
    /// Used by Normal only: the same array in all three blocks.
    Original,
    /// Three different arrays, one per block.
    Modified,
}

impl CostasVariant {
    /// The three sync arrays, in transmission order.
    pub const fn arrays(self) -> &'static [[u8; COSTAS_LEN]; 3] {
        match self {
            CostasVariant::Original => &[
                [4, 2, 5, 6, 1, 3, 0],
                [4, 2, 5, 6, 1, 3, 0],
                [4, 2, 5, 6, 1, 3, 0],
            ],
            CostasVariant::Modified => &[
                [0, 6, 2, 3, 5, 4, 1],
                [1, 5, 0, 2, 3, 6, 4],
                [2, 5, 0, 6, 4, 1, 3],
            ],
        }
    }
}

// ── SubmodeDescriptor ─────────────────────────────────────────────────────────

/// Constant timing and bandwidth data for one submode.
///
/// Sample counts are at [`RX_SAMPLE_RATE`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubmodeDescriptor {
    pub name: &'static str,
    pub samples_per_symbol: u32,
    pub start_delay_ms: u32,
    pub period_seconds: u32,
    pub costas: CostasVariant,
    pub rx_snr_threshold: i32,
    pub rx_threshold: i32,

    /// `79 × samples_per_symbol`.
    pub samples_for_symbols: u32,
    /// `8 × 12000 / samples_per_symbol`, in Hz.
    pub bandwidth: u32,
    /// `12000 × period_seconds`.
    pub samples_per_period: u32,
    /// Samples covering start delay, all symbols and another 500 ms.
    pub samples_needed: u32,
}

impl SubmodeDescriptor {
    const fn new(
        name: &'static str,
        samples_per_symbol: u32,
        start_delay_ms: u32,
        period_seconds: u32,
        costas: CostasVariant,
        rx_snr_threshold: i32,
        rx_threshold: i32,
    ) -> Self {
        let samples_for_symbols = NUM_SYMBOLS as u32 * samples_per_symbol;
        Self {
            name,
            samples_per_symbol,
            start_delay_ms,
            period_seconds,
            costas,
            rx_snr_threshold,
            rx_threshold,
            samples_for_symbols,
            bandwidth: 8 * RX_SAMPLE_RATE / samples_per_symbol,
            samples_per_period: RX_SAMPLE_RATE * period_seconds,
            // floor(symbols + (0.5 + delay / 1000) × rate), exact in integers
            // because the rate is a multiple of 1000.
            samples_needed: samples_for_symbols
                + RX_SAMPLE_RATE / 2
                + start_delay_ms * (RX_SAMPLE_RATE / 1000),
        }
    }

    /// Spacing between adjacent tones, in Hz.
    pub fn tone_spacing(&self) -> f64 {
        RX_SAMPLE_RATE as f64 / self.samples_per_symbol as f64
    }

    /// Seconds it takes to send the symbols.
    pub fn data_duration(&self) -> f64 {
        self.samples_for_symbols as f64 / RX_SAMPLE_RATE as f64
    }

    /// Seconds from TX start to the end of the last symbol, start delay
    /// included.
    pub fn tx_duration(&self) -> f64 {
        self.data_duration() + self.start_delay_ms as f64 / 1000.0
    }

    pub fn period_ms(&self) -> i64 {
        i64::from(self.period_seconds) * 1000
    }
}

const NORMAL: SubmodeDescriptor =
    SubmodeDescriptor::new("NORMAL", 1920, 500, 15, CostasVariant::Original, -24, 10);
const FAST: SubmodeDescriptor =
    SubmodeDescriptor::new("FAST", 1200, 200, 10, CostasVariant::Modified, -22, 16);
const TURBO: SubmodeDescriptor =
    SubmodeDescriptor::new("TURBO", 600, 100, 6, CostasVariant::Modified, -20, 32);
const SLOW: SubmodeDescriptor =
    SubmodeDescriptor::new("SLOW", 3840, 500, 30, CostasVariant::Modified, -28, 10);
const ULTRA: SubmodeDescriptor =
    SubmodeDescriptor::new("ULTRA", 384, 100, 4, CostasVariant::Modified, -18, 50);

/// A 79-symbol tone frame that carries the three Costas blocks of `submode`
/// and tone 0 everywhere else.
pub fn sync_only_tones(submode: Submode) -> [u8; NUM_SYMBOLS] {
    let mut tones = [0u8; NUM_SYMBOLS];
    let arrays = submode.descriptor().costas.arrays();
    for (block, &start) in arrays.iter().zip(COSTAS_POSITIONS.iter()) {
        tones[start..start + COSTAS_LEN].copy_from_slice(block);
    }
    tones
}

/// Dump the table at debug level.
pub fn log_table() {
    for submode in [Submode::Slow, Submode::Normal, Submode::Fast, Submode::Turbo] {
        let d = submode.descriptor();
        debug!(
            name = d.name,
            samples_per_symbol = d.samples_per_symbol,
            start_delay_ms = d.start_delay_ms,
            period_s = d.period_seconds,
            costas = ?d.costas,
            rx_snr_threshold = d.rx_snr_threshold,
            rx_threshold = d.rx_threshold,
            samples_for_symbols = d.samples_for_symbols,
            bandwidth_hz = d.bandwidth,
            samples_per_period = d.samples_per_period,
            samples_needed = d.samples_needed,
            data_duration_s = d.data_duration(),
            tone_spacing_hz = d.tone_spacing(),
            tx_duration_s = d.tx_duration(),
            "submode"
        );
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
