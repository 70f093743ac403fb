/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Tokio task that owns a [`TxLoop`] and drives it.
//!
//! Everything that touches the loop happens on this one task:
//!
//! | Source                      | Action                                   |
//! |-----------------------------|------------------------------------------|
//! | [`TxLoopHandle`] command    | `start` / `cancel` / submode / tx delay  |
//! | drift broadcast             | [`TxLoop::on_drift_change`]              |
//! | armed timer deadline        | [`TxLoop::on_timer`]                     |
//!
//! Observer callbacks therefore run on the driver task too.  The task ends
//! when every [`TxLoopHandle`] has been dropped; dropping the loop then
//! cancels it.

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::{TxLoop, TxLoopError};
use crate::submode::Submode;

// ── Commands ──────────────────────────────────────────────────────────────────

type Reply<T> = oneshot::Sender<T>;

#[derive(Debug)]
enum TxLoopCommand {
    Start {
        loop_period_ms: i64,
        reply: Reply<Result<(), TxLoopError>>,
    },
    Cancel {
        reply: Reply<()>,
    },
    SetSubmode {
        submode: Submode,
        reply: Reply<Result<(), TxLoopError>>,
    },
    SetTxDelay {
        tx_delay_ms: i64,
        reply: Reply<Result<(), TxLoopError>>,
    },
    PublishInitialState {
        reply: Reply<()>,
    },
    Status {
        reply: Reply<TxLoopStatus>,
    },
}

/// Snapshot of a driven loop's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxLoopStatus {
    pub active: bool,
    pub next_activity_ms: i64,
    pub loop_period_ms: i64,
    pub tx_delay_ms: i64,
    pub submode: Submode,
}

impl TxLoopStatus {
    fn of(tx_loop: &TxLoop) -> Self {
        Self {
            active: tx_loop.is_active(),
            next_activity_ms: tx_loop.next_activity_ms(),
            loop_period_ms: tx_loop.loop_period_ms(),
            tx_delay_ms: tx_loop.tx_delay_ms(),
            submode: tx_loop.submode(),
        }
    }
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// Cloneable, thread-safe way to talk to a driven [`TxLoop`].
///
/// Every method waits until the driver has applied the request.
#[derive(Debug, Clone)]
pub struct TxLoopHandle {
    name: String,
    tx: mpsc::UnboundedSender<TxLoopCommand>,
}

impl TxLoopHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn start(&self, loop_period_ms: i64) -> Result<(), TxLoopError> {
        self.request(|reply| TxLoopCommand::Start {
            loop_period_ms,
            reply,
        })
        .await?
    }

    pub async fn cancel(&self) -> Result<(), TxLoopError> {
        self.request(|reply| TxLoopCommand::Cancel { reply }).await
    }

    pub async fn set_submode(&self, submode: Submode) -> Result<(), TxLoopError> {
        self.request(|reply| TxLoopCommand::SetSubmode { submode, reply })
            .await?
    }

    pub async fn set_tx_delay(&self, tx_delay_ms: i64) -> Result<(), TxLoopError> {
        self.request(|reply| TxLoopCommand::SetTxDelay { tx_delay_ms, reply })
            .await?
    }

    pub async fn publish_initial_state(&self) -> Result<(), TxLoopError> {
        self.request(|reply| TxLoopCommand::PublishInitialState { reply })
            .await
    }

    pub async fn status(&self) -> Result<TxLoopStatus, TxLoopError> {
        self.request(|reply| TxLoopCommand::Status { reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> TxLoopCommand,
    ) -> Result<T, TxLoopError> {
        let (reply, response) = oneshot::channel();
        self.tx.send(build(reply)).map_err(|_| self.gone())?;
        response.await.map_err(|_| self.gone())
    }

    fn gone(&self) -> TxLoopError {
        TxLoopError::LoopGone {
            name: self.name.clone(),
        }
    }
}

// ── Driver ────────────────────────────────────────────────────────────────────

/// Move `tx_loop` onto its own task.
///
/// `drift` should come from [`DriftingClock::subscribe`] on the loop's own
/// clock, taken before the drift controller publishes its initial state.
///
/// [`DriftingClock::subscribe`]: crate::clock::DriftingClock::subscribe
pub fn spawn(tx_loop: TxLoop, drift: broadcast::Receiver<i64>) -> (TxLoopHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = TxLoopHandle {
        name: tx_loop.name().to_string(),
        tx,
    };
    let join = tokio::spawn(run(tx_loop, rx, drift));
    (handle, join)
}

async fn run(
    mut tx_loop: TxLoop,
    mut commands: mpsc::UnboundedReceiver<TxLoopCommand>,
    mut drift: broadcast::Receiver<i64>,
) {
    info!(name = %tx_loop.name(), "tx loop driver started");
    let mut drift_open = true;

    loop {
        let deadline = tx_loop.timer_deadline();

        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => handle_command(&mut tx_loop, command),
                None => break,
            },

            event = drift.recv(), if drift_open => match event {
                Ok(drift_ms) => tx_loop.on_drift_change(drift_ms),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Only the latest value matters.
                    let drift_ms = tx_loop.clock().drift();
                    warn!(
                        name = %tx_loop.name(),
                        skipped,
                        drift_ms,
                        "missed drift changes, catching up"
                    );
                    tx_loop.on_drift_change(drift_ms);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(name = %tx_loop.name(), "drift events closed");
                    drift_open = false;
                }
            },

            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                tx_loop.on_timer();
            }
        }
    }

    info!(name = %tx_loop.name(), "all handles dropped, tx loop driver stopping");
}

fn handle_command(tx_loop: &mut TxLoop, command: TxLoopCommand) {
    // A requester that gave up waiting is not an error.
    match command {
        TxLoopCommand::Start {
            loop_period_ms,
            reply,
        } => {
            let _ = reply.send(tx_loop.start(loop_period_ms));
        }
        TxLoopCommand::Cancel { reply } => {
            tx_loop.cancel();
            let _ = reply.send(());
        }
        TxLoopCommand::SetSubmode { submode, reply } => {
            let _ = reply.send(tx_loop.on_submode_change(submode));
        }
        TxLoopCommand::SetTxDelay { tx_delay_ms, reply } => {
            let _ = reply.send(tx_loop.on_tx_delay_change(tx_delay_ms));
        }
        TxLoopCommand::PublishInitialState { reply } => {
            tx_loop.publish_initial_state();
            let _ = reply.send(());
        }
        TxLoopCommand::Status { reply } => {
            let _ = reply.send(TxLoopStatus::of(tx_loop));
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
