/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Pull-driven tone synthesizer.
//!
//! A [`Modulator`] renders one 79-symbol transmission as continuous-phase
//! 8-FSK audio at [`FRAME_RATE`].  An audio sink pulls it through
//! [`Modulator::read_data`] until it returns zero.
//!
//! ```text
//!  start() ──▶ Synchronizing ──(lead-in silence used up)──▶ Active ──(amplitude 0)──▶ Idle
//!         └──────────────(no lead-in needed)───────────────▶
//! ```
//!
//! The state tag lives in an atomic cell so other threads can watch it
//! through a [`ModulatorStatus`] without locking.  Only the thread that owns
//! the modulator writes it.

pub mod output;

pub use output::{Channel, SoundOutput, WavSink};

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::clock::DriftingClock;
use crate::submode::{Submode, NUM_SYMBOLS, RX_SAMPLE_RATE};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Output sample rate in frames per second.
pub const FRAME_RATE: u32 = 48_000;

/// Output frames per receive-rate sample.
const OVERSAMPLING: u64 = (FRAME_RATE / RX_SAMPLE_RATE) as u64;

const MS_PER_SEC: i64 = 1000;

/// The fade-out starts this many symbols into the transmission.
const FADE_START_SYMBOLS: f64 = NUM_SYMBOLS as f64 - 0.017;

/// Per-sample amplitude factor during the fade-out.
const FADE_DECAY: f64 = 0.98;

/// A tuning carrier ends after this many times samples-per-symbol frames.
const TUNE_LIMIT: u64 = 9999;

const FULL_SCALE: f64 = i16::MAX as f64;

// ── State ─────────────────────────────────────────────────────────────────────

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle = 0,
    Synchronizing = 1,
    Active = 2,
}

impl State {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => State::Synchronizing,
            2 => State::Active,
            _ => State::Idle,
        }
    }

    fn load(cell: &AtomicU8) -> Self {
        Self::from_u8(cell.load(Ordering::Acquire))
    }
}

/// Lock-free, cloneable view of a modulator's state.
#[derive(Debug, Clone)]
pub struct ModulatorStatus {
    state: Arc<AtomicU8>,
}

impl ModulatorStatus {
    pub fn state(&self) -> State {
        State::load(&self.state)
    }

    pub fn is_idle(&self) -> bool {
        self.state() == State::Idle
    }
}

// ── Start alignment ───────────────────────────────────────────────────────────

/// How a transmission starting now lines up with its period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartAlignment {
    /// Emit this many silent frames before the first symbol.
    Silence { frames: u64 },
    /// Already late: drop this many frames of symbol time.
    Skip { frames: u64 },
}

/// Work out the lead-in for a transmission started at drifted `now_ms`.
///
/// When the TX delay reaches into the next period, the whole rest of this
/// period plus the start delay is silence.
pub fn align_start(
    now_ms: i64,
    period_ms: i64,
    start_delay_ms: i64,
    tx_delay_s: f64,
) -> StartAlignment {
    let offset_ms = now_ms.rem_euclid(period_ms);
    let to_frames = |ms: i64| (ms * FRAME_RATE as i64 / MS_PER_SEC) as u64;

    if period_ms as f64 <= offset_ms as f64 + tx_delay_s * MS_PER_SEC as f64 {
        let until_period_ms = period_ms - offset_ms;
        debug!(silence_ms = until_period_ms, "sending silence for tx delay");
        StartAlignment::Silence {
            frames: to_frames(start_delay_ms + until_period_ms),
        }
    } else if start_delay_ms > offset_ms {
        debug!(
            late_ms = offset_ms,
            start_delay_ms, "starting into the start delay, shortening the lead-in"
        );
        StartAlignment::Silence {
            frames: to_frames(start_delay_ms - offset_ms),
        }
    } else {
        if offset_ms > start_delay_ms {
            warn!(
                late_ms = offset_ms,
                start_delay_ms, "starting late into transmission, cutting away initial symbol(s)"
            );
        }
        StartAlignment::Skip {
            frames: to_frames(offset_ms - start_delay_ms),
        }
    }
}

// ── Modulator ─────────────────────────────────────────────────────────────────

pub struct Modulator {
    clock: Arc<DriftingClock>,
    state: Arc<AtomicU8>,
    stream: Option<Box<dyn SoundOutput>>,
    channel: Channel,
    quick_close: bool,
    tuning: bool,
    tones: [u8; NUM_SYMBOLS],

    audio_frequency: f64,
    /// Frequency the current phase increment was computed for.
    audio_frequency0: f64,
    tone_spacing: f64,
    /// Output frames per symbol.
    frames_per_symbol: u64,
    fade_start: u64,
    fade_end: u64,

    phi: f64,
    dphi: f64,
    amp: f64,
    silent_frames: u64,
    /// Output frames of symbol time consumed so far.
    ic: u64,
    isym0: Option<usize>,
}

impl std::fmt::Debug for Modulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Modulator")
            .field("state", &self.state())
            .field("channel", &self.channel)
            .field("tuning", &self.tuning)
            .field("audio_frequency", &self.audio_frequency)
            .field("silent_frames", &self.silent_frames)
            .field("ic", &self.ic)
            .finish_non_exhaustive()
    }
}

impl Modulator {
    pub fn new(clock: Arc<DriftingClock>) -> Self {
        Self {
            clock,
            state: Arc::new(AtomicU8::new(State::Idle as u8)),
            stream: None,
            channel: Channel::Mono,
            quick_close: false,
            tuning: false,
            tones: [0; NUM_SYMBOLS],
            audio_frequency: 0.0,
            audio_frequency0: 0.0,
            tone_spacing: 0.0,
            frames_per_symbol: 0,
            fade_start: 0,
            fade_end: 0,
            phi: 0.0,
            dphi: 0.0,
            amp: 0.0,
            silent_frames: 0,
            ic: 0,
            isym0: None,
        }
    }

    pub fn status(&self) -> ModulatorStatus {
        ModulatorStatus {
            state: self.state.clone(),
        }
    }

    pub fn state(&self) -> State {
        State::load(&self.state)
    }

    pub fn is_idle(&self) -> bool {
        self.state() == State::Idle
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn is_tuning(&self) -> bool {
        self.tuning
    }

    /// Silent frames still to be emitted before the first symbol.
    pub fn silent_frames(&self) -> u64 {
        self.silent_frames
    }

    /// Tone index (0..8) per symbol for the next transmissions.
    pub fn set_tones(&mut self, tones: [u8; NUM_SYMBOLS]) {
        self.tones = tones;
    }

    /// Takes effect on the next synthesized frame.
    pub fn set_audio_frequency(&mut self, audio_frequency: f64) {
        self.audio_frequency = audio_frequency;
    }

    /// Begin a transmission of the current tone table.
    ///
    /// `stream`, if given, is restarted to begin pulling frames.
    pub fn start(
        &mut self,
        frequency: f64,
        submode: Submode,
        tx_delay_s: f64,
        stream: Option<Box<dyn SoundOutput>>,
        channel: Channel,
    ) {
        if !self.is_idle() {
            debug!(state = ?self.state(), "modulator not idle, stopping first");
            self.stop(false);
        }

        let descriptor = submode.descriptor();
        let nsps = descriptor.samples_per_symbol as u64;

        self.quick_close = false;
        self.channel = channel;
        self.audio_frequency = frequency;
        self.audio_frequency0 = 0.0;
        self.tone_spacing = descriptor.tone_spacing();
        self.frames_per_symbol = OVERSAMPLING * nsps;
        (self.fade_start, self.fade_end) = if self.tuning {
            (TUNE_LIMIT * nsps, TUNE_LIMIT * nsps)
        } else {
            (
                (FADE_START_SYMBOLS * self.frames_per_symbol as f64) as u64,
                NUM_SYMBOLS as u64 * self.frames_per_symbol,
            )
        };
        self.isym0 = None;
        self.amp = FULL_SCALE;
        self.phi = 0.0;
        self.dphi = 0.0;
        self.silent_frames = 0;
        self.ic = 0;

        if self.tuning {
            debug!("modulator is tuning");
        } else {
            let alignment = align_start(
                self.clock.current_ms_since_epoch(),
                descriptor.period_ms(),
                descriptor.start_delay_ms as i64,
                tx_delay_s,
            );
            match alignment {
                StartAlignment::Silence { frames } => self.silent_frames = frames,
                StartAlignment::Skip { frames } => self.ic = frames,
            }
        }

        let state = if self.silent_frames > 0 {
            State::Synchronizing
        } else {
            State::Active
        };
        self.state.store(state as u8, Ordering::Release);
        debug!(
            submode = %submode,
            frequency_hz = frequency,
            tx_delay_s,
            channel = %channel,
            silent_frames = self.silent_frames,
            skipped_frames = self.ic,
            ?state,
            "modulator started"
        );

        self.stream = stream;
        match self.stream.as_mut() {
            Some(stream) => stream.restart(),
            None => debug!("no audio output stream assigned"),
        }
    }

    /// Switch tuning mode.  Leaving tuning mode stops immediately.
    pub fn tune(&mut self, tuning: bool) {
        self.tuning = tuning;
        if !tuning {
            self.stop(true);
        }
    }

    /// A quick stop resets the output stream; otherwise it is left to drain.
    pub fn stop(&mut self, quick: bool) {
        self.quick_close = quick;
        if let Some(stream) = self.stream.as_mut() {
            if self.quick_close {
                stream.reset();
            } else {
                stream.stop();
            }
        }
        self.state.store(State::Idle as u8, Ordering::Release);
    }

    /// Fill `data` with whole frames.  Returns the number of bytes produced.
    ///
    /// Always fills `data` completely except on the last call of a
    /// transmission, which may come up short.  Returns zero once idle.
    pub fn read_data(&mut self, data: &mut [u8]) -> usize {
        let bytes_per_frame = self.channel.bytes_per_frame();
        let max_frames = data.len() / bytes_per_frame;
        debug_assert_eq!(data.len() % bytes_per_frame, 0, "no torn frames");
        if max_frames == 0 {
            return 0;
        }

        let mut frames = 0;
        let mut state = self.state();

        if state == State::Synchronizing {
            let silent = self.silent_frames.min(max_frames as u64) as usize;
            for frame in data.chunks_exact_mut(bytes_per_frame).take(silent) {
                self.channel.write_frame(0, frame);
            }
            frames = silent;
            self.silent_frames -= silent as u64;
            if self.silent_frames > 0 {
                return frames * bytes_per_frame;
            }
            state = State::Active;
            self.state.store(state as u8, Ordering::Release);
        }

        if state != State::Active {
            return 0;
        }

        while frames < max_frames {
            if self.ic >= self.fade_end {
                self.amp = 0.0;
                break;
            }

            let isym = if self.tuning {
                0
            } else {
                ((self.ic / self.frames_per_symbol) as usize).min(NUM_SYMBOLS - 1)
            };
            if self.isym0 != Some(isym) || self.audio_frequency != self.audio_frequency0 {
                let tone_frequency =
                    self.audio_frequency + f64::from(self.tones[isym]) * self.tone_spacing;
                self.dphi = TAU * tone_frequency / FRAME_RATE as f64;
                self.isym0 = Some(isym);
                self.audio_frequency0 = self.audio_frequency;
            }

            self.phi += self.dphi;
            if self.phi > TAU {
                self.phi -= TAU;
            }
            if self.ic > self.fade_start {
                self.amp *= FADE_DECAY;
            }

            let sample = (self.amp * self.phi.sin()).round() as i16;
            let offset = frames * bytes_per_frame;
            self.channel
                .write_frame(sample, &mut data[offset..offset + bytes_per_frame]);

            frames += 1;
            self.ic += 1;
        }

        if self.amp == 0.0 {
            debug!(frames, "transmission complete, modulator idle");
            self.state.store(State::Idle as u8, Ordering::Release);
            self.phi = 0.0;
        }

        frames * bytes_per_frame
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{DriftController, ManualTimeSource};
    use crate::submode::sync_only_tones;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct StreamLog(Arc<Mutex<Vec<&'static str>>>);

    impl StreamLog {
        fn calls(&self) -> Vec<&'static str> {
            self.0.lock().unwrap().clone()
        }
    }

    impl SoundOutput for StreamLog {
        fn restart(&mut self) {
            self.0.lock().unwrap().push("restart");
        }
        fn stop(&mut self) {
            self.0.lock().unwrap().push("stop");
        }
        fn reset(&mut self) {
            self.0.lock().unwrap().push("reset");
        }
    }

    fn modulator_at(now_ms: i64) -> (Modulator, DriftController) {
        let (clock, controller) = DriftingClock::new(Arc::new(ManualTimeSource::new(now_ms)));
        (Modulator::new(clock), controller)
    }

    /// Pull until idle; returns the byte count of every call.
    fn pull_all(m: &mut Modulator, chunk_bytes: usize) -> Vec<usize> {
        let mut buf = vec![0u8; chunk_bytes];
        let mut sizes = Vec::new();
        loop {
            let n = m.read_data(&mut buf);
            sizes.push(n);
            if n == 0 {
                return sizes;
            }
        }
    }

    fn decode(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    // ── alignment ─────────────────────────────────────────────────────────────

    #[test]
    fn lead_in_covers_rest_of_start_delay() {
        let a = align_start(15_000 * 7 + 200, 15_000, 300, 0.0);
        assert_eq!(a, StartAlignment::Silence { frames: 4_800 });
    }

    #[test]
    fn tx_delay_reaching_next_period_waits_for_it() {
        // 100 ms before the boundary with 200 ms TX delay.
        let a = align_start(15_000 * 3 - 100, 15_000, 500, 0.2);
        assert_eq!(a, StartAlignment::Silence { frames: 600 * 48 });
    }

    #[test]
    fn late_start_skips_symbol_time() {
        let a = align_start(6_000 * 10 + 1_100, 6_000, 100, 0.1);
        assert_eq!(a, StartAlignment::Skip { frames: 48_000 });
    }

    #[test]
    fn start_exactly_on_delay_needs_nothing() {
        let a = align_start(30_000 + 500, 30_000, 500, 0.0);
        assert_eq!(a, StartAlignment::Skip { frames: 0 });
    }

    // ── synthesis ─────────────────────────────────────────────────────────────

    #[test]
    fn full_transmission_pull_sequence() {
        // On a TURBO boundary: 100 ms lead-in.
        let (mut m, _drift) = modulator_at(600_000);
        m.set_tones(sync_only_tones(Submode::Turbo));
        let status = m.status();
        m.start(1500.0, Submode::Turbo, 0.0, None, Channel::Mono);

        assert_eq!(status.state(), State::Synchronizing);
        assert_eq!(m.silent_frames(), 4_800);

        let sizes = pull_all(&mut m, 4096);
        let total: usize = sizes.iter().sum();
        let expected_frames = 4_800 + 79 * 4 * 600;
        assert_eq!(total, expected_frames * 2);

        // all calls but the last two are full, the last is 0
        let (last, rest) = sizes.split_last().unwrap();
        assert_eq!(*last, 0);
        let (short, full) = rest.split_last().unwrap();
        assert!(full.iter().all(|&n| n == 4096));
        assert!(*short < 4096);
        assert!(status.is_idle());
    }

    #[test]
    fn lead_in_then_active_within_one_call() {
        let (mut m, _drift) = modulator_at(600_000);
        m.set_audio_frequency(1000.0);
        m.start(1000.0, Submode::Turbo, 0.0, None, Channel::Mono);

        let mut buf = vec![0u8; 2 * 5_000];
        assert_eq!(m.read_data(&mut buf), buf.len());
        assert_eq!(m.state(), State::Active);

        let samples = decode(&buf);
        assert!(samples[..4_800].iter().all(|&s| s == 0));
        assert!(samples[4_800..].iter().any(|&s| s != 0));
    }

    #[test]
    fn exactly_divisible_transmission_ends_with_empty_read() {
        // On the start delay: no lead-in, 189 600 frames = 400 × 474.
        let (mut m, _drift) = modulator_at(600_100);
        m.set_tones(sync_only_tones(Submode::Turbo));
        m.start(1500.0, Submode::Turbo, 0.0, None, Channel::Mono);
        assert_eq!(m.state(), State::Active);

        let sizes = pull_all(&mut m, 474 * 2);
        assert_eq!(sizes.len(), 401);
        assert!(sizes[..400].iter().all(|&n| n == 474 * 2));
        assert_eq!(sizes[400], 0);
        assert_eq!(sizes.iter().sum::<usize>(), 189_600 * 2);
        assert!(m.is_idle());
    }

    #[test]
    fn lead_in_exactly_fills_buffer() {
        let (mut m, _drift) = modulator_at(600_000);
        m.set_tones(sync_only_tones(Submode::Turbo));
        m.start(1500.0, Submode::Turbo, 0.0, None, Channel::Mono);
        assert_eq!(m.silent_frames(), 4_800);

        let mut buf = vec![0xAAu8; 4_800 * 2];
        assert_eq!(m.read_data(&mut buf), buf.len());
        assert!(decode(&buf).iter().all(|&s| s == 0));
        assert_eq!(m.silent_frames(), 0);
        assert_eq!(m.state(), State::Active);

        // 189 600 frames = 39 full buffers of 4 800 and one of 2 400.
        let sizes = pull_all(&mut m, 4_800 * 2);
        assert_eq!(sizes.len(), 41);
        assert!(sizes[..39].iter().all(|&n| n == 4_800 * 2));
        assert_eq!(&sizes[39..], &[2_400 * 2, 0]);
        assert_eq!(4_800 * 2 + sizes.iter().sum::<usize>(), 194_400 * 2);
    }

    #[test]
    fn late_start_goes_straight_to_active() {
        let (mut m, _drift) = modulator_at(6_000 * 10 + 1_100);
        m.start(1500.0, Submode::Turbo, 0.0, None, Channel::Mono);
        assert_eq!(m.state(), State::Active);

        let total: usize = pull_all(&mut m, 8192).iter().sum();
        assert_eq!(total, (79 * 4 * 600 - 48_000) * 2);
    }

    #[test]
    fn fade_out_reaches_zero_and_stays_bounded() {
        let (mut m, _drift) = modulator_at(600_000 + 100);
        m.set_tones(sync_only_tones(Submode::Turbo));
        m.start(1500.0, Submode::Turbo, 0.0, None, Channel::Mono);

        let mut all = Vec::new();
        let mut buf = vec![0u8; 4096];
        loop {
            let n = m.read_data(&mut buf);
            if n == 0 {
                break;
            }
            all.extend(decode(&buf[..n]));
        }

        let fade_end = 79 * 4 * 600;
        assert_eq!(all.len(), fade_end);
        // 40 decayed samples before the end: 32767 * 0.98^40 ≈ 14604
        let tail_limit = (FULL_SCALE * FADE_DECAY.powi(40)).ceil() as i16;
        assert!(all.last().unwrap().abs() <= tail_limit);
        assert!(all.iter().all(|&s| s > i16::MIN));
    }

    #[test]
    fn first_sample_matches_tone_frequency() {
        let (mut m, _drift) = modulator_at(0);
        m.tune(true);
        m.start(1500.0, Submode::Normal, 0.0, None, Channel::Mono);
        assert_eq!(m.state(), State::Active);

        let mut buf = [0u8; 4];
        m.read_data(&mut buf);
        let samples = decode(&buf);
        let dphi = TAU * 1500.0 / 48_000.0;
        assert_eq!(samples[0], (FULL_SCALE * dphi.sin()).round() as i16);
        assert_eq!(samples[1], (FULL_SCALE * (2.0 * dphi).sin()).round() as i16);
    }

    #[test]
    fn audio_frequency_change_applies_to_next_frame() {
        let (mut m, _drift) = modulator_at(0);
        m.tune(true);
        m.start(1000.0, Submode::Normal, 0.0, None, Channel::Mono);

        let mut buf = [0u8; 2];
        m.read_data(&mut buf);
        m.set_audio_frequency(2000.0);
        m.read_data(&mut buf);

        let phi = TAU * 1000.0 / 48_000.0 + TAU * 2000.0 / 48_000.0;
        assert_eq!(decode(&buf)[0], (FULL_SCALE * phi.sin()).round() as i16);
    }

    #[test]
    fn stereo_layouts_keep_other_side_silent() {
        for channel in [Channel::Left, Channel::Right, Channel::Both] {
            let (mut m, _drift) = modulator_at(0);
            m.tune(true);
            m.start(1500.0, Submode::Normal, 0.0, None, channel);

            let mut buf = [0u8; 16];
            assert_eq!(m.read_data(&mut buf), 16);
            let samples = decode(&buf);
            for frame in samples.chunks_exact(2) {
                match channel {
                    Channel::Left => assert_eq!(frame[1], 0),
                    Channel::Right => assert_eq!(frame[0], 0),
                    _ => assert_eq!(frame[0], frame[1]),
                }
            }
            assert!(samples.iter().any(|&s| s != 0));
        }
    }

    // ── control ───────────────────────────────────────────────────────────────

    #[test]
    fn stream_is_restarted_and_stopped() {
        let (mut m, _drift) = modulator_at(0);
        let log = StreamLog::default();
        m.start(1500.0, Submode::Normal, 0.0, Some(Box::new(log.clone())), Channel::Mono);
        assert_eq!(log.calls(), vec!["restart"]);

        m.stop(false);
        assert!(m.is_idle());
        assert_eq!(log.calls(), vec!["restart", "stop"]);

        m.stop(true);
        assert_eq!(log.calls(), vec!["restart", "stop", "reset"]);
    }

    #[test]
    fn start_while_running_stops_previous_stream() {
        let (mut m, _drift) = modulator_at(0);
        let first = StreamLog::default();
        let second = StreamLog::default();
        m.start(1500.0, Submode::Normal, 0.0, Some(Box::new(first.clone())), Channel::Mono);
        m.start(1500.0, Submode::Normal, 0.0, Some(Box::new(second.clone())), Channel::Mono);

        assert_eq!(first.calls(), vec!["restart", "stop"]);
        assert_eq!(second.calls(), vec!["restart"]);
    }

    #[test]
    fn leaving_tune_mode_quick_stops() {
        let (mut m, _drift) = modulator_at(0);
        let log = StreamLog::default();
        m.tune(true);
        m.start(1500.0, Submode::Fast, 0.0, Some(Box::new(log.clone())), Channel::Mono);
        assert!(!m.is_idle());

        m.tune(false);
        assert!(m.is_idle());
        assert_eq!(log.calls(), vec!["restart", "reset"]);
        assert_eq!(m.read_data(&mut [0u8; 64]), 0);
    }

    #[test]
    fn idle_or_empty_reads_return_zero() {
        let (mut m, _drift) = modulator_at(0);
        assert_eq!(m.read_data(&mut [0u8; 64]), 0);
        m.start(1500.0, Submode::Normal, 0.0, None, Channel::Mono);
        assert_eq!(m.read_data(&mut [0u8; 0]), 0);
    }

    #[test]
    fn drift_moves_alignment() {
        // System clock on a boundary, drift puts us 200 ms in.
        let (mut m, mut drift) = modulator_at(15_000 * 4);
        drift.set_drift(200);
        m.start(1500.0, Submode::Normal, 0.0, None, Channel::Mono);
        assert_eq!(m.silent_frames(), 300 * 48);
    }
}
