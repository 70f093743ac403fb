/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Application-wide drifting clock.
//!
//! Every notion of "now" in the transmit path comes from a [`DriftingClock`]:
//! system time plus a signed millisecond drift.  Operators move the drift to
//! line up with a QSO partner whose clock is off, or to correct a computer
//! clock that cannot be set precisely enough.
//!
//! # Ownership
//!
//! The clock is constructed once at startup and shared as
//! `Arc<DriftingClock>`.  Reads are lock-protected and may happen on any
//! thread.  Writes are reserved for the single [`DriftController`] returned by
//! [`DriftingClock::new`]; everybody else holds a [`DriftRequester`] and
//! enqueues requests that the controller applies in arrival order.
//!
//! | Operation | Who | How |
//! |---|---|---|
//! | `drift()`, `current_*()` | anyone | `Mutex` read |
//! | `set_drift()`, `increment_drift()` | controller owner | `&mut DriftController` |
//! | drift change request | any other thread/task | [`DriftRequester`] → mpsc |
//! | drift-changed notification | subscribers | `tokio::sync::broadcast` |

pub mod sync;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Local, TimeZone, Utc};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Capacity of the drift-changed broadcast channel.
///
/// A subscriber that falls further behind receives `Lagged` and should
/// re-read [`DriftingClock::drift`].
const DRIFT_EVENT_CAPACITY: usize = 16;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClockError {
    /// The [`DriftController`] has been dropped; nobody applies requests any
    /// longer.
    #[error("drift controller is gone, drift request for {0}ms dropped")]
    ControllerGone(i64),
}

// ── Time sources ──────────────────────────────────────────────────────────────

/// Undrifted wall clock, in milliseconds since the Unix epoch.
pub trait TimeSource: Send + Sync {
    fn system_ms_since_epoch(&self) -> i64;
}

/// The operating-system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn system_ms_since_epoch(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.  Used by tests and simulations.
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    now_ms: AtomicI64,
}

impl ManualTimeSource {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn system_ms_since_epoch(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

// ── DriftingClock ─────────────────────────────────────────────────────────────

/// Shared, driftable time source.  See the [module docs](self).
pub struct DriftingClock {
    source: Arc<dyn TimeSource>,
    drift_ms: Mutex<i64>,
    events: broadcast::Sender<i64>,
}

impl std::fmt::Debug for DriftingClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriftingClock")
            .field("drift_ms", &self.drift())
            .finish_non_exhaustive()
    }
}

impl DriftingClock {
    /// Build the clock and its one write capability.
    ///
    /// Drift starts at 0.  Keep the controller on the thread or task that
    /// owns drift changes; hand out [`DriftController::requester`]s to
    /// everybody else.
    pub fn new(source: Arc<dyn TimeSource>) -> (Arc<Self>, DriftController) {
        let (events, _) = broadcast::channel(DRIFT_EVENT_CAPACITY);
        let clock = Arc::new(Self {
            source,
            drift_ms: Mutex::new(0),
            events,
        });
        let controller = DriftController::new(Arc::clone(&clock));
        (clock, controller)
    }

    /// Convenience constructor over the operating-system clock.
    pub fn system() -> (Arc<Self>, DriftController) {
        Self::new(Arc::new(SystemTimeSource))
    }

    /// Current drift in milliseconds.  Positive means our clock runs later
    /// than the system clock.
    pub fn drift(&self) -> i64 {
        *self.drift_ms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to drift-changed notifications.  Each message carries the
    /// new drift in milliseconds.
    pub fn subscribe(&self) -> broadcast::Receiver<i64> {
        self.events.subscribe()
    }

    /// Undrifted system time in milliseconds since the epoch.
    pub fn system_ms_since_epoch(&self) -> i64 {
        self.source.system_ms_since_epoch()
    }

    /// Drifted milliseconds since the epoch.
    pub fn current_ms_since_epoch(&self) -> i64 {
        self.source.system_ms_since_epoch() + self.drift()
    }

    /// Drifted whole seconds since the epoch.
    ///
    /// Truncates toward zero; not meant for timestamps before the epoch.
    pub fn current_secs_since_epoch(&self) -> i64 {
        self.current_ms_since_epoch() / 1000
    }

    /// Falls back to the epoch when the drifted time is out of chrono's range.
    pub fn current_time_utc(&self) -> DateTime<Utc> {
        let ms = self.current_ms_since_epoch();
        match Utc.timestamp_millis_opt(ms).single() {
            Some(t) => t,
            None => {
                warn!(ms, "drifted time out of range, falling back to the epoch");
                DateTime::default()
            }
        }
    }

    pub fn current_time_local(&self) -> DateTime<Local> {
        self.current_time_utc().with_timezone(&Local)
    }

    /// Store `ms` and notify subscribers if it differs from the current
    /// drift.  Returns whether the value changed.
    fn store_drift(&self, ms: i64) -> bool {
        let old = {
            let mut guard = self.drift_ms.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, ms)
        };

        if old == ms {
            debug!(drift_ms = old, "drift request without change");
            return false;
        }

        debug!(old_ms = old, new_ms = ms, "changed drift");
        // No subscribers is fine; nobody is listening yet.
        let _ = self.events.send(ms);
        true
    }

    fn publish(&self) {
        let _ = self.events.send(self.drift());
    }
}

// ── Requests ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriftRequest {
    Set(i64),
    Increment(i64),
}

/// Cloneable handle used by non-owner threads to ask for a drift change.
#[derive(Debug, Clone)]
pub struct DriftRequester {
    tx: mpsc::UnboundedSender<DriftRequest>,
}

impl DriftRequester {
    pub fn set_drift(&self, ms: i64) -> Result<(), ClockError> {
        self.tx
            .send(DriftRequest::Set(ms))
            .map_err(|_| ClockError::ControllerGone(ms))
    }

    pub fn increment_drift(&self, delta_ms: i64) -> Result<(), ClockError> {
        self.tx
            .send(DriftRequest::Increment(delta_ms))
            .map_err(|_| ClockError::ControllerGone(delta_ms))
    }
}

// ── DriftController ───────────────────────────────────────────────────────────

/// The only writer of a [`DriftingClock`]'s drift.
#[derive(Debug)]
pub struct DriftController {
    clock: Arc<DriftingClock>,
    tx: mpsc::UnboundedSender<DriftRequest>,
    rx: mpsc::UnboundedReceiver<DriftRequest>,
}

impl DriftController {
    fn new(clock: Arc<DriftingClock>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { clock, tx, rx }
    }

    pub fn clock(&self) -> &Arc<DriftingClock> {
        &self.clock
    }

    pub fn requester(&self) -> DriftRequester {
        DriftRequester {
            tx: self.tx.clone(),
        }
    }

    /// Set the drift.  Emits drift-changed only when the value differs.
    pub fn set_drift(&mut self, ms: i64) {
        self.clock.store_drift(ms);
    }

    /// Add `delta_ms` to the drift and return the new value.
    pub fn increment_drift(&mut self, delta_ms: i64) -> i64 {
        let new = self.clock.drift() + delta_ms;
        self.clock.store_drift(new);
        new
    }

    /// Re-send the current drift to every subscriber.  Call once after all
    /// observers have subscribed.
    pub fn publish_initial_state(&self) {
        debug!(drift_ms = self.clock.drift(), "publishing initial drift");
        self.clock.publish();
    }

    /// Apply every request queued so far without waiting.  Returns how many
    /// were applied.
    pub fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(request) = self.rx.try_recv() {
            self.apply(request);
            applied += 1;
        }
        applied
    }

    /// Serve requests until every [`DriftRequester`] has been dropped.
    pub async fn run(self) {
        let Self { clock, tx, mut rx } = self;
        drop(tx);
        while let Some(request) = rx.recv().await {
            apply(&clock, request);
        }
        info!("all drift requesters gone, drift controller stopping");
    }

    fn apply(&mut self, request: DriftRequest) {
        apply(&self.clock, request);
    }
}

fn apply(clock: &DriftingClock, request: DriftRequest) {
    match request {
        DriftRequest::Set(ms) => {
            clock.store_drift(ms);
        }
        DriftRequest::Increment(delta) => {
            clock.store_drift(clock.drift() + delta);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
