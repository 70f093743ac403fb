/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use js8_tx::clock::sync::DriftSync;
use js8_tx::clock::DriftingClock;
use js8_tx::config::StationConfig;
use js8_tx::logging;
use js8_tx::modulator::{Channel, Modulator, SoundOutput, WavSink, FRAME_RATE};
use js8_tx::submode::{self, Submode};
use js8_tx::txloop::{driver, TxLoop, TxLoopEvent};

/// Frames handed to the audio sink per pull.
const PULL_FRAMES: usize = 1024;

// ── CLI argument definition ───────────────────────────────────────────────────

/// Scheduled JS8 carrier-test transmitter.
///
/// Example:
///   js8-tx -c station.yaml --submode normal --loop-period-ms 30000 \
///          --count 2 --wav tx.wav
#[derive(Debug, Parser)]
#[command(
    name = "js8-tx",
    about = "JS8 transmit loop – schedules and synthesizes sync-only test frames",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML station configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Submode: normal, fast, turbo, slow or ultra.
    #[arg(short = 'm', long = "submode")]
    submode: Option<Submode>,

    /// Time between two transmissions.
    #[arg(short = 'l', long = "loop-period-ms")]
    loop_period_ms: Option<i64>,

    /// How long before the payload PTT is keyed (0..=1000).
    #[arg(short = 'd', long = "tx-delay-ms")]
    tx_delay_ms: Option<i64>,

    /// Audio frequency of tone 0, in Hz.
    #[arg(short = 'f', long = "frequency")]
    frequency: Option<f64>,

    /// Initial clock drift.
    #[arg(long = "drift-ms", allow_hyphen_values = true)]
    drift_ms: Option<i64>,

    /// Replace the drift with a preset: period, period_end, minute or reset.
    #[arg(long = "drift-sync")]
    drift_sync: Option<DriftSync>,

    /// Output channel layout: mono, left, right or both.
    #[arg(long = "channel")]
    channel: Option<Channel>,

    /// Stop after this many transmissions.
    #[arg(short = 'n', long = "count", default_value_t = 1)]
    count: u32,

    /// Record the synthesized audio to this WAV file.
    #[arg(short = 'w', long = "wav")]
    wav: Option<PathBuf>,
}

impl Cli {
    /// File values (or defaults) overridden by whatever was given on the
    /// command line.
    fn station_config(&self) -> Result<StationConfig> {
        let mut config = match &self.config {
            Some(path) => StationConfig::load_from_file(path)?,
            None => {
                warn!("No station configuration file provided, using default settings");
                StationConfig::default()
            }
        };

        if let Some(v) = self.submode {
            config.submode = v;
        }
        if let Some(v) = self.loop_period_ms {
            config.loop_period_ms = v;
        }
        if let Some(v) = self.tx_delay_ms {
            config.tx_delay_ms = v;
        }
        if let Some(v) = self.frequency {
            config.audio_frequency_hz = v;
        }
        if let Some(v) = self.drift_ms {
            config.drift_ms = v;
        }
        if let Some(v) = self.channel {
            config.channel = v;
        }

        config
            .validate()
            .context("Invalid station settings after command line overrides")?;
        Ok(config)
    }
}

// ── Audio thread ──────────────────────────────────────────────────────────────

#[derive(Debug)]
enum AudioCommand {
    Transmit,
    Stop,
}

/// Stand-in for a sound card: only reports what it is asked to do.
struct LoggingOutput;

impl SoundOutput for LoggingOutput {
    fn restart(&mut self) {
        debug!("audio output restarted");
    }

    fn stop(&mut self) {
        debug!("audio output draining");
    }

    fn reset(&mut self) {
        debug!("audio output reset");
    }
}

/// Owns the modulator and pulls it at the real-time frame rate.
fn audio_thread(
    clock: Arc<DriftingClock>,
    config: StationConfig,
    wav: Option<PathBuf>,
    mut commands: mpsc::UnboundedReceiver<AudioCommand>,
    finished: mpsc::UnboundedSender<u64>,
) -> Result<()> {
    let mut sink = wav
        .as_deref()
        .map(|path| WavSink::create(path, config.channel, FRAME_RATE))
        .transpose()?;

    let mut modulator = Modulator::new(clock);
    modulator.set_tones(submode::sync_only_tones(config.submode));
    let tx_delay_s = config.tx_delay_ms as f64 / 1000.0;

    let mut buf = vec![0u8; PULL_FRAMES * config.channel.bytes_per_frame()];
    let pull_period = Duration::from_secs_f64(PULL_FRAMES as f64 / f64::from(FRAME_RATE));

    'commands: while let Some(command) = commands.blocking_recv() {
        match command {
            AudioCommand::Stop => break,
            AudioCommand::Transmit => {}
        }

        modulator.start(
            config.audio_frequency_hz,
            config.submode,
            tx_delay_s,
            Some(Box::new(LoggingOutput)),
            config.channel,
        );
        info!(silent_frames = modulator.silent_frames(), "transmitting");

        let mut frames = 0u64;
        loop {
            match commands.try_recv() {
                Ok(AudioCommand::Stop) | Err(mpsc::error::TryRecvError::Disconnected) => {
                    modulator.stop(true);
                    break 'commands;
                }
                Ok(AudioCommand::Transmit) => {
                    warn!("transmit requested while still transmitting, ignored");
                }
                Err(mpsc::error::TryRecvError::Empty) => {}
            }

            let n = modulator.read_data(&mut buf);
            if n == 0 {
                break;
            }
            if let Some(sink) = sink.as_mut() {
                sink.write_bytes(&buf[..n])?;
            }
            frames += (n / config.channel.bytes_per_frame()) as u64;
            thread::sleep(pull_period);
        }

        info!(frames, "transmission finished");
        if finished.send(frames).is_err() {
            break;
        }
    }

    if let Some(sink) = sink {
        let frames = sink.finalize()?;
        info!(frames, "WAV recording written");
    }
    Ok(())
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let (clock, mut drift_controller) = DriftingClock::system();
    logging::init(clock.clone(), "info");

    info!("js8-tx starting up...");

    // ── Parse CLI arguments ───────────────────────────────────────────────────
    let cli = Cli::parse();
    let config = cli.station_config()?;

    info!(
        submode        = %config.submode,
        loop_period_ms = config.loop_period_ms,
        tx_delay_ms    = config.tx_delay_ms,
        frequency_hz   = config.audio_frequency_hz,
        drift_ms       = config.drift_ms,
        channel        = %config.channel,
        count          = cli.count,
        wav            = ?cli.wav,
        "Configuration"
    );
    submode::log_table();

    // ── Clock ─────────────────────────────────────────────────────────────────
    let mut drift_events = clock.subscribe();
    let loop_drift = clock.subscribe();

    drift_controller.set_drift(config.drift_ms);
    if let Some(sync) = cli.drift_sync {
        let second_of_minute = clock.system_ms_since_epoch().div_euclid(1000) % 60;
        let period_secs = i64::from(config.submode.descriptor().period_seconds);
        let drift = sync.drift_ms(second_of_minute, period_secs);
        info!(?sync, second_of_minute, drift_ms = drift, "applying drift sync");
        drift_controller.set_drift(drift);
    }

    tokio::spawn(async move {
        while let Ok(drift_ms) = drift_events.recv().await {
            info!(drift_ms, "clock drift");
        }
    });
    drift_controller.publish_initial_state();
    let drift_requester = drift_controller.requester();
    tokio::spawn(drift_controller.run());

    // ── TX loop ───────────────────────────────────────────────────────────────
    let mut tx_loop = TxLoop::new("carrier-test", clock.clone());
    tx_loop.on_submode_change(config.submode)?;
    tx_loop.on_tx_delay_change(config.tx_delay_ms)?;
    let (loop_events_tx, mut loop_events) = mpsc::unbounded_channel();
    tx_loop.attach_observer(Box::new(loop_events_tx));

    let (tx_loop_handle, tx_loop_task) = driver::spawn(tx_loop, loop_drift);
    tx_loop_handle.publish_initial_state().await?;

    // ── Audio ─────────────────────────────────────────────────────────────────
    let (audio_tx, audio_rx) = mpsc::unbounded_channel();
    let (finished_tx, mut finished_rx) = mpsc::unbounded_channel();
    let audio = {
        let clock = clock.clone();
        let config = config.clone();
        let wav = cli.wav.clone();
        thread::Builder::new()
            .name("audio".into())
            .spawn(move || audio_thread(clock, config, wav, audio_rx, finished_tx))
            .context("Failed to spawn audio thread")?
    };

    tx_loop_handle.start(config.loop_period_ms).await?;

    // ── Run ───────────────────────────────────────────────────────────────────
    let mut remaining = cli.count;
    while remaining > 0 {
        tokio::select! {
            event = loop_events.recv() => match event {
                Some(TxLoopEvent::ScheduleChanged(ms)) => {
                    let at = chrono::DateTime::from_timestamp_millis(ms).unwrap_or_default();
                    info!(next_activity = %at, "transmission scheduled");
                }
                Some(TxLoopEvent::TriggerTransmitNow) => {
                    info!(remaining, "PTT");
                    audio_tx
                        .send(AudioCommand::Transmit)
                        .map_err(|_| anyhow!("audio thread is gone"))?;
                }
                Some(TxLoopEvent::Canceled) => info!("transmit loop idle"),
                None => break,
            },

            done = finished_rx.recv() => match done {
                Some(frames) => {
                    remaining -= 1;
                    debug!(frames, remaining, "transmission done");
                }
                None => {
                    error!("audio thread stopped unexpectedly");
                    break;
                }
            },

            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted, shutting down");
                break;
            }
        }
    }

    // ── Shutdown ──────────────────────────────────────────────────────────────
    tx_loop_handle.cancel().await?;
    drop(tx_loop_handle);
    let _ = audio_tx.send(AudioCommand::Stop);
    drop(drift_requester);

    tokio::task::spawn_blocking(move || audio.join())
        .await
        .context("Failed to join audio thread")?
        .map_err(|_| anyhow!("audio thread panicked"))??;
    tx_loop_task.await.context("TX loop driver failed")?;

    info!("js8-tx finished");
    Ok(())
}
