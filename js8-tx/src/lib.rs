/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! js8-tx – JS8 transmit timing and tone synthesis
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── clock/          – drifting clock, drift owner / requester, sync presets
//! ├── submode/        – per-submode timing table, Costas arrays, decode cycles
//! ├── txloop/         – periodic transmit scheduler and its tokio driver
//! ├── modulator/      – pull-driven 8-FSK synthesizer, PCM frame layout, WAV sink
//! ├── config/         – YAML station configuration
//! └── logging         – tracing subscriber with drifted timestamps
//! ```
//!
//! Data flow: the scheduler asks the clock for "now" and the submode table
//! for period lengths and emits `TriggerTransmitNow`; whoever listens starts
//! the modulator, which an audio sink then pulls until it reports idle.

pub mod clock;
pub mod config;
pub mod logging;
pub mod modulator;
pub mod submode;
pub mod txloop;
