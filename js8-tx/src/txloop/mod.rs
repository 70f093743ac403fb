/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Periodic transmit scheduler ("TX loop").
//!
//! A [`TxLoop`] organises one series of repeated transmissions, e.g. a CQ or
//! heartbeat loop.  While active it keeps `next_activity` (the instant the
//! payload is supposed to start) on a boundary of the current submode's
//! period, and arms a one-shot timer that fires `tx_delay_ms` earlier so PTT
//! can be keyed in time.
//!
//! The loop knows no other time than what its [`DriftingClock`] tells it.
//!
//! ```text
//!            start(loop_period_ms)
//!   Inactive ─────────────────────────▶ Active ──┐ timer fire:
//!      ▲                                  │  ▲   │ next += loop, realign,
//!      └──────────── cancel() ────────────┘  └───┘ emit ScheduleChanged,
//!                                                   TriggerTransmitNow
//! ```
//!
//! `TxLoop` itself is a plain state machine: it records when its timer should
//! fire ([`TxLoop::timer_deadline`]) and expects its owner to call
//! [`TxLoop::on_timer`] at that instant.  [`driver`] provides the tokio task
//! that does exactly that and serialises every other request through a
//! command channel.

pub mod driver;
pub mod error;

pub use error::{ConfigurationReason, TxLoopError};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::clock::DriftingClock;
use crate::submode::Submode;

// ── Constants ─────────────────────────────────────────────────────────────────

/// The TX delay cannot be set to any value larger than this.
pub const MAX_TX_DELAY_MS: i64 = 1000;

const DEFAULT_TX_DELAY_MS: i64 = 100;
const DEFAULT_LOOP_PERIOD_MS: i64 = 600_000;
const DEFAULT_SUBMODE: Submode = Submode::Slow;

// ── Events ────────────────────────────────────────────────────────────────────

/// Notifications emitted by a [`TxLoop`].
///
/// When a timer fire produces both, `ScheduleChanged` is delivered before
/// `TriggerTransmitNow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxLoopEvent {
    /// The next transmission now starts at this drifted instant (ms since
    /// epoch).  Always a period boundary of the loop's submode.
    ScheduleChanged(i64),
    /// Key PTT now; the payload is due `tx_delay_ms` from now.
    TriggerTransmitNow,
    /// The loop went inactive.
    Canceled,
}

/// Receives [`TxLoopEvent`]s.  Called synchronously on the loop's owner.
pub trait TxLoopObserver: Send {
    fn on_event(&self, event: &TxLoopEvent);
}

impl TxLoopObserver for mpsc::UnboundedSender<TxLoopEvent> {
    fn on_event(&self, event: &TxLoopEvent) {
        // A dropped receiver just stops listening.
        let _ = self.send(*event);
    }
}

// ── Timer ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct ArmedTimer {
    wait_ms: i64,
    deadline: Instant,
}

// ── TxLoop ────────────────────────────────────────────────────────────────────

pub struct TxLoop {
    /// Only used for logging.
    name: String,
    clock: Arc<DriftingClock>,
    next_activity_ms: i64,
    tx_delay_ms: i64,
    submode: Submode,
    active: bool,
    loop_period_ms: i64,
    timer: Option<ArmedTimer>,
    observers: Vec<Box<dyn TxLoopObserver>>,
}

impl std::fmt::Debug for TxLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxLoop")
            .field("name", &self.name)
            .field("active", &self.active)
            .field("next_activity_ms", &self.next_activity_ms)
            .field("tx_delay_ms", &self.tx_delay_ms)
            .field("loop_period_ms", &self.loop_period_ms)
            .field("submode", &self.submode)
            .field("timer", &self.timer)
            .finish_non_exhaustive()
    }
}

impl TxLoop {
    pub fn new(name: impl Into<String>, clock: Arc<DriftingClock>) -> Self {
        let next_activity_ms = clock.current_ms_since_epoch();
        Self {
            name: name.into(),
            clock,
            next_activity_ms,
            tx_delay_ms: DEFAULT_TX_DELAY_MS,
            submode: DEFAULT_SUBMODE,
            active: false,
            loop_period_ms: DEFAULT_LOOP_PERIOD_MS,
            timer: None,
            observers: Vec::new(),
        }
    }

    // ── Wiring ────────────────────────────────────────────────────────────────

    /// Register an observer.  Attach everything first, then call
    /// [`publish_initial_state`](Self::publish_initial_state).
    pub fn attach_observer(&mut self, observer: Box<dyn TxLoopObserver>) {
        self.observers.push(observer);
    }

    /// Tell every observer where we stand: `ScheduleChanged` when active,
    /// `Canceled` otherwise.
    pub fn publish_initial_state(&self) {
        if self.active {
            debug!(
                name = %self.name,
                next_activity = %self.next_activity(),
                "publishing initial state: transmission scheduled"
            );
            self.emit(TxLoopEvent::ScheduleChanged(self.next_activity_ms));
        } else {
            debug!(name = %self.name, "publishing initial state: idle");
            self.emit(TxLoopEvent::Canceled);
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn clock(&self) -> &Arc<DriftingClock> {
        &self.clock
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// When the payload of the next transmission starts, in drifted ms since
    /// the epoch.  Meaningless while inactive.
    pub fn next_activity_ms(&self) -> i64 {
        self.next_activity_ms
    }

    pub fn next_activity(&self) -> DateTime<Utc> {
        match Utc.timestamp_millis_opt(self.next_activity_ms).single() {
            Some(t) => t,
            None => {
                warn!(
                    name = %self.name,
                    next_activity_ms = self.next_activity_ms,
                    "next activity out of range, falling back to the epoch"
                );
                DateTime::default()
            }
        }
    }

    /// Current loop period; the previous one (or the default) while inactive.
    pub fn loop_period_ms(&self) -> i64 {
        self.loop_period_ms
    }

    pub fn tx_delay_ms(&self) -> i64 {
        self.tx_delay_ms
    }

    pub fn submode(&self) -> Submode {
        self.submode
    }

    /// Milliseconds the armed timer was set to wait, if armed.
    pub fn timer_wait_ms(&self) -> Option<i64> {
        self.timer.map(|t| t.wait_ms)
    }

    /// Instant at which [`on_timer`](Self::on_timer) is due, if armed.
    pub fn timer_deadline(&self) -> Option<Instant> {
        self.timer.map(|t| t.deadline)
    }

    // ── Requests ──────────────────────────────────────────────────────────────

    /// Start, or restart, the loop with the given period.
    ///
    /// The first transmission is scheduled on the first submode period
    /// boundary at least `loop_period_ms` from now.
    ///
    /// # Errors
    /// [`TxLoopError::InvalidConfiguration`] for a non-positive period or one
    /// shorter than the submode's own period.  Nothing changes in that case.
    pub fn start(&mut self, loop_period_ms: i64) -> Result<(), TxLoopError> {
        if loop_period_ms <= 0 {
            return Err(ConfigurationReason::NonPositiveLoopPeriod { loop_period_ms }.into());
        }
        let submode_period_ms = self.submode.descriptor().period_ms();
        if loop_period_ms < submode_period_ms {
            return Err(ConfigurationReason::SubmodePeriodExceedsLoop {
                submode_period_ms,
                loop_period_ms,
            }
            .into());
        }
        self.schedule_from_now(loop_period_ms);
        Ok(())
    }

    /// Stop the loop.  Idempotent.
    pub fn cancel(&mut self) {
        if self.active {
            self.active = false;
            self.timer = None;
            info!(name = %self.name, "canceling scheduled tx activity");
            self.emit(TxLoopEvent::Canceled);
        } else {
            debug!(name = %self.name, "asked to cancel, but idle anyway");
        }
    }

    /// React to a changed clock drift.
    ///
    /// If the PTT instant is still ahead of us and within one loop period,
    /// only the timer is moved.  Otherwise the drift carried us across a
    /// boundary and the schedule is rebuilt.
    pub fn on_drift_change(&mut self, new_drift_ms: i64) {
        if !self.active {
            return;
        }
        self.timer = None;
        let now_ms = self.clock.current_ms_since_epoch();
        let ptt_ms = self.next_activity_ms - self.tx_delay_ms;

        if now_ms < ptt_ms && ptt_ms < now_ms + self.loop_period_ms {
            let fire_in_ms = ptt_ms - now_ms;
            debug!(
                name = %self.name,
                drift_ms = new_drift_ms,
                fire_in_ms,
                "small drift change, only moving the ptt timer"
            );
            self.arm(fire_in_ms);
        } else {
            debug!(
                name = %self.name,
                drift_ms = new_drift_ms,
                "big drift change, rebuilding schedule"
            );
            self.schedule_from_now(self.loop_period_ms);
        }
    }

    /// Switch the submode used for the next transmissions.  Idempotent.
    ///
    /// # Errors
    /// [`TxLoopError::InvalidConfiguration`] when the submode's period is
    /// longer than the loop period.  The submode is left unchanged.
    pub fn on_submode_change(&mut self, new_submode: Submode) -> Result<(), TxLoopError> {
        if self.submode == new_submode {
            return Ok(());
        }
        let submode_period_ms = new_submode.descriptor().period_ms();
        if self.loop_period_ms < submode_period_ms {
            return Err(ConfigurationReason::SubmodePeriodExceedsLoop {
                submode_period_ms,
                loop_period_ms: self.loop_period_ms,
            }
            .into());
        }
        debug!(
            name = %self.name,
            from = %self.submode,
            to = %new_submode,
            "submode change"
        );
        self.submode = new_submode;
        if self.active {
            self.schedule_from_now(self.loop_period_ms);
        }
        Ok(())
    }

    /// Same as [`on_submode_change`](Self::on_submode_change), for a raw
    /// submode identifier.
    pub fn on_submode_id_change(&mut self, submode_id: i32) -> Result<(), TxLoopError> {
        let submode = Submode::try_from(submode_id)?;
        self.on_submode_change(submode)
    }

    /// Change how early PTT is keyed before the payload starts.  Idempotent.
    ///
    /// # Errors
    /// [`TxLoopError::InvalidConfiguration`] for a negative delay or one above
    /// [`MAX_TX_DELAY_MS`].
    pub fn on_tx_delay_change(&mut self, tx_delay_ms: i64) -> Result<(), TxLoopError> {
        if tx_delay_ms < 0 {
            return Err(ConfigurationReason::NegativeTxDelay { tx_delay_ms }.into());
        }
        if tx_delay_ms > MAX_TX_DELAY_MS {
            return Err(ConfigurationReason::TxDelayTooLong {
                tx_delay_ms,
                max_ms: MAX_TX_DELAY_MS,
            }
            .into());
        }
        debug!(
            name = %self.name,
            from_ms = self.tx_delay_ms,
            to_ms = tx_delay_ms,
            "tx delay change"
        );
        if self.tx_delay_ms != tx_delay_ms {
            self.tx_delay_ms = tx_delay_ms;
            if self.active {
                self.schedule_from_now(self.loop_period_ms);
            }
        }
        Ok(())
    }

    /// The armed timer has expired.
    pub fn on_timer(&mut self) {
        self.timer = None;
        if !self.active {
            debug!(name = %self.name, "timer fired, but loop is inactive");
            return;
        }

        let raw_ms = self.next_activity_ms + self.loop_period_ms;
        let mode_period_ms = self.submode.descriptor().period_ms();

        // Start on a submode slot boundary.
        let into_slot = raw_ms.rem_euclid(mode_period_ms);
        if into_slot != 0 {
            warn!(
                name = %self.name,
                planned_ms = raw_ms,
                mode_period_ms,
                moved_back_ms = into_slot,
                "next activity did not fit the submode period, moving it towards the past"
            );
        }
        let mut next_ms = raw_ms - into_slot;

        // Never wait for the past.
        let now_ms = self.clock.current_ms_since_epoch();
        if next_ms - self.tx_delay_ms < now_ms {
            let missing = (now_ms - (next_ms - self.tx_delay_ms)) / self.loop_period_ms + 1;
            let increase = missing * self.loop_period_ms;
            warn!(
                name = %self.name,
                planned_ms = next_ms,
                tx_delay_ms = self.tx_delay_ms,
                loop_periods_skipped = missing,
                increase_ms = increase,
                "next activity already in the past, rescheduling into the future"
            );
            next_ms += increase;
        }

        let wait_ms = next_ms - now_ms - self.tx_delay_ms;
        self.next_activity_ms = next_ms;
        debug!(
            name = %self.name,
            next_activity = %self.next_activity(),
            tx_delay_ms = self.tx_delay_ms,
            wait_ms,
            "triggering tx and planning the next one"
        );
        self.arm(wait_ms);
        self.emit(TxLoopEvent::ScheduleChanged(self.next_activity_ms));
        self.emit(TxLoopEvent::TriggerTransmitNow);
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn schedule_from_now(&mut self, loop_period_ms: i64) {
        self.timer = None;
        self.loop_period_ms = loop_period_ms;

        let now_ms = self.clock.current_ms_since_epoch();
        let earliest = now_ms + loop_period_ms;
        let mode_period_ms = self.submode.descriptor().period_ms();
        let remainder = earliest.rem_euclid(mode_period_ms);
        let next_start = if remainder == 0 {
            earliest
        } else {
            earliest + mode_period_ms - remainder
        };

        let changed = !self.active || next_start != self.next_activity_ms;
        let wait_ms = next_start - now_ms - self.tx_delay_ms;

        self.active = true;
        self.next_activity_ms = next_start;
        self.arm(wait_ms);

        info!(
            name = %self.name,
            next_activity = %self.next_activity(),
            newly_scheduled = changed,
            wait_ms,
            tx_delay_ms = self.tx_delay_ms,
            loop_period_ms,
            mode_period_ms,
            "tx loop active"
        );

        if changed {
            self.emit(TxLoopEvent::ScheduleChanged(self.next_activity_ms));
        }
    }

    fn arm(&mut self, wait_ms: i64) {
        let wait = Duration::from_millis(wait_ms.max(0) as u64);
        self.timer = Some(ArmedTimer {
            wait_ms,
            deadline: Instant::now() + wait,
        });
    }

    fn emit(&self, event: TxLoopEvent) {
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }
}

impl Drop for TxLoop {
    fn drop(&mut self) {
        self.cancel();
        debug!(name = %self.name, "tx loop dropped");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
