/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Where synthesized samples go.
//!
//! * [`Channel`] – how one 16-bit sample is laid out as a PCM frame.
//! * [`SoundOutput`] – control surface of the audio sink that pulls frames.
//! * [`WavSink`] – writes pulled frames to a WAV file.

use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use serde::Deserialize;

// ── Channel layout ────────────────────────────────────────────────────────────

/// PCM frame layout.  Stereo layouts leave the unused side silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Mono,
    Left,
    Right,
    Both,
}

impl Channel {
    pub const fn channels(self) -> u16 {
        match self {
            Channel::Mono => 1,
            Channel::Left | Channel::Right | Channel::Both => 2,
        }
    }

    pub const fn bytes_per_frame(self) -> usize {
        self.channels() as usize * std::mem::size_of::<i16>()
    }

    /// Write `sample` as one little-endian frame at the start of `out`.
    ///
    /// `out` must hold at least [`bytes_per_frame`](Self::bytes_per_frame)
    /// bytes.
    pub fn write_frame(self, sample: i16, out: &mut [u8]) {
        let bytes = sample.to_le_bytes();
        match self {
            Channel::Mono => out[..2].copy_from_slice(&bytes),
            Channel::Left => {
                out[..2].copy_from_slice(&bytes);
                out[2..4].fill(0);
            }
            Channel::Right => {
                out[..2].fill(0);
                out[2..4].copy_from_slice(&bytes);
            }
            Channel::Both => {
                out[..2].copy_from_slice(&bytes);
                out[2..4].copy_from_slice(&bytes);
            }
        }
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mono" => Ok(Channel::Mono),
            "left" => Ok(Channel::Left),
            "right" => Ok(Channel::Right),
            "both" => Ok(Channel::Both),
            other => Err(format!(
                "unknown channel '{other}' (valid: mono, left, right, both)"
            )),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Channel::Mono => "mono",
            Channel::Left => "left",
            Channel::Right => "right",
            Channel::Both => "both",
        })
    }
}

// ── Sound output ──────────────────────────────────────────────────────────────

/// The audio sink that pulls frames from a modulator.
pub trait SoundOutput: Send {
    /// Begin (or begin again) pulling frames.
    fn restart(&mut self);

    /// Stop after draining what is buffered.
    fn stop(&mut self);

    /// Stop immediately, dropping anything buffered.
    fn reset(&mut self);
}

// ── WAV recording ─────────────────────────────────────────────────────────────

/// Records pulled PCM bytes into a 16-bit WAV file.
pub struct WavSink {
    channel: Channel,
    writer: WavWriter<BufWriter<File>>,
    frames: u64,
}

impl WavSink {
    pub fn create(path: &Path, channel: Channel, sample_rate: u32) -> Result<Self> {
        let spec = WavSpec {
            channels: channel.channels(),
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(path, spec)
            .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;
        Ok(Self {
            channel,
            writer,
            frames: 0,
        })
    }

    /// Append whole frames taken from `bytes` as produced by
    /// [`Modulator::read_data`](super::Modulator::read_data).
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        for sample in bytes.chunks_exact(2) {
            self.writer
                .write_sample(i16::from_le_bytes([sample[0], sample[1]]))
                .context("Failed to write WAV sample")?;
        }
        self.frames += (bytes.len() / self.channel.bytes_per_frame()) as u64;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    pub fn finalize(self) -> Result<u64> {
        let frames = self.frames;
        self.writer
            .finalize()
            .context("Failed to finalize WAV file")?;
        Ok(frames)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_sizes() {
        assert_eq!(Channel::Mono.bytes_per_frame(), 2);
        for c in [Channel::Left, Channel::Right, Channel::Both] {
            assert_eq!(c.bytes_per_frame(), 4);
        }
    }

    #[test]
    fn frames_are_little_endian_with_silent_side() {
        let s: i16 = -2; // 0xFFFE
        let mut buf = [0xAAu8; 4];

        Channel::Mono.write_frame(s, &mut buf);
        assert_eq!(&buf[..2], &[0xFE, 0xFF]);

        Channel::Left.write_frame(s, &mut buf);
        assert_eq!(buf, [0xFE, 0xFF, 0, 0]);

        Channel::Right.write_frame(s, &mut buf);
        assert_eq!(buf, [0, 0, 0xFE, 0xFF]);

        Channel::Both.write_frame(s, &mut buf);
        assert_eq!(buf, [0xFE, 0xFF, 0xFE, 0xFF]);
    }

    #[test]
    fn parses_channel_names() {
        assert_eq!("Both".parse::<Channel>().unwrap(), Channel::Both);
        assert!("center".parse::<Channel>().is_err());
    }

    #[test]
    fn wav_sink_records_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tx.wav");

        let mut sink = WavSink::create(&path, Channel::Left, 48_000).unwrap();
        let mut bytes = vec![0u8; 3 * 4];
        for (i, frame) in bytes.chunks_exact_mut(4).enumerate() {
            Channel::Left.write_frame(100 * (i as i16 + 1), frame);
        }
        sink.write_bytes(&bytes).unwrap();
        assert_eq!(sink.finalize().unwrap(), 3);

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 48_000);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![100, 0, 200, 0, 300, 0]);
    }
}
