/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! `tracing` subscriber set-up.
//!
//! Log lines are stamped with the drifted clock so they line up with what
//! the scheduler believes the time is.

use std::fmt;
use std::sync::Arc;

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::EnvFilter;

use crate::clock::DriftingClock;

/// RFC 3339 UTC, millisecond precision.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Timestamps log events from a [`DriftingClock`].
#[derive(Debug, Clone)]
pub struct DriftingTimer {
    clock: Arc<DriftingClock>,
}

impl DriftingTimer {
    pub fn new(clock: Arc<DriftingClock>) -> Self {
        Self { clock }
    }
}

impl FormatTime for DriftingTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(
            w,
            "{}",
            self.clock.current_time_utc().format(TIMESTAMP_FORMAT)
        )
    }
}

/// Install the global subscriber.
///
/// Level is controlled by the `RUST_LOG` env-var (e.g. `RUST_LOG=debug`),
/// falling back to `default_filter`.
pub fn init(clock: Arc<DriftingClock>, default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_timer(DriftingTimer::new(clock))
        .init();
}
