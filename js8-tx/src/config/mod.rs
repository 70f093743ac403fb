/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Station configuration loading.
//!
//! The file is read once at startup and never written back.  The expected
//! YAML structure is:
//! ```yaml
//! station:
//!   submode: normal          # normal | fast | turbo | slow | ultra
//!   loop_period_ms: 60000
//!   tx_delay_ms: 200
//!   audio_frequency_hz: 1500.0
//!   drift_ms: 0
//!   channel: mono            # mono | left | right | both
//! ```
//!
//! Every field is optional; absent fields keep the value of
//! [`StationConfig::default`].

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::modulator::{Channel, FRAME_RATE};
use crate::submode::Submode;
use crate::txloop::{ConfigurationReason, TxLoopError, MAX_TX_DELAY_MS};

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
#[derive(Debug, Deserialize)]
struct StationConfigFile {
    station: Option<StationEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StationEntry {
    submode: Option<Submode>,
    loop_period_ms: Option<i64>,
    tx_delay_ms: Option<i64>,
    audio_frequency_hz: Option<f64>,
    drift_ms: Option<i64>,
    channel: Option<Channel>,
}

// ── StationConfig ─────────────────────────────────────────────────────────────

/// Everything needed to run a transmit loop.
#[derive(Debug, Clone, PartialEq)]
pub struct StationConfig {
    pub submode: Submode,
    pub loop_period_ms: i64,
    /// How long before the payload PTT is keyed.
    pub tx_delay_ms: i64,
    /// Audio frequency of tone 0, in Hz.
    pub audio_frequency_hz: f64,
    /// Initial clock drift.
    pub drift_ms: i64,
    pub channel: Channel,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            submode: Submode::Slow,
            loop_period_ms: 600_000,
            tx_delay_ms: 100,
            audio_frequency_hz: 1500.0,
            drift_ms: 0,
            channel: Channel::Mono,
        }
    }
}

impl StationConfig {
    /// Parse `path` on top of the defaults and validate the result.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, if the YAML is
    /// structurally invalid, or if a value is out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading station configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let file: StationConfigFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        let mut config = Self::default();
        match file.station {
            Some(entry) => config.apply(entry),
            None => warn!("No station section in configuration file, using defaults"),
        }

        config
            .validate()
            .with_context(|| format!("Invalid station configuration in {}", path.display()))?;

        debug!(?config, "station configuration loaded");
        Ok(config)
    }

    fn apply(&mut self, entry: StationEntry) {
        if let Some(v) = entry.submode {
            self.submode = v;
        }
        if let Some(v) = entry.loop_period_ms {
            self.loop_period_ms = v;
        }
        if let Some(v) = entry.tx_delay_ms {
            self.tx_delay_ms = v;
        }
        if let Some(v) = entry.audio_frequency_hz {
            self.audio_frequency_hz = v;
        }
        if let Some(v) = entry.drift_ms {
            self.drift_ms = v;
        }
        if let Some(v) = entry.channel {
            self.channel = v;
        }
    }

    /// Check the same limits the TX loop enforces, plus a sane audio
    /// frequency.
    pub fn validate(&self) -> Result<()> {
        if self.tx_delay_ms < 0 {
            return Err(TxLoopError::from(ConfigurationReason::NegativeTxDelay {
                tx_delay_ms: self.tx_delay_ms,
            })
            .into());
        }
        if self.tx_delay_ms > MAX_TX_DELAY_MS {
            return Err(TxLoopError::from(ConfigurationReason::TxDelayTooLong {
                tx_delay_ms: self.tx_delay_ms,
                max_ms: MAX_TX_DELAY_MS,
            })
            .into());
        }
        if self.loop_period_ms <= 0 {
            return Err(TxLoopError::from(ConfigurationReason::NonPositiveLoopPeriod {
                loop_period_ms: self.loop_period_ms,
            })
            .into());
        }
        let submode_period_ms = self.submode.descriptor().period_ms();
        if self.loop_period_ms < submode_period_ms {
            return Err(TxLoopError::from(ConfigurationReason::SubmodePeriodExceedsLoop {
                submode_period_ms,
                loop_period_ms: self.loop_period_ms,
            })
            .into());
        }

        let nyquist = f64::from(FRAME_RATE) / 2.0;
        if !(self.audio_frequency_hz > 0.0 && self.audio_frequency_hz < nyquist) {
            bail!(
                "audio frequency of {} Hz out of range (0, {} Hz)",
                self.audio_frequency_hz,
                nyquist
            );
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper: write a YAML string to a temp file and return it.
    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    fn reason_of(err: &anyhow::Error) -> Option<&ConfigurationReason> {
        match err.downcast_ref::<TxLoopError>() {
            Some(TxLoopError::InvalidConfiguration { reason }) => Some(reason),
            _ => None,
        }
    }

    #[test]
    fn load_full_station() {
        let yaml = r#"
station:
  submode: normal
  loop_period_ms: 60000
  tx_delay_ms: 200
  audio_frequency_hz: 1200.5
  drift_ms: -1500
  channel: both
"#;
        let f = yaml_tempfile(yaml);
        let cfg = StationConfig::load_from_file(f.path()).unwrap();

        assert_eq!(
            cfg,
            StationConfig {
                submode: Submode::Normal,
                loop_period_ms: 60_000,
                tx_delay_ms: 200,
                audio_frequency_hz: 1200.5,
                drift_ms: -1500,
                channel: Channel::Both,
            }
        );
    }

    #[test]
    fn absent_fields_keep_defaults() {
        let f = yaml_tempfile("station:\n  submode: turbo\n");
        let cfg = StationConfig::load_from_file(f.path()).unwrap();

        assert_eq!(cfg.submode, Submode::Turbo);
        assert_eq!(cfg.loop_period_ms, StationConfig::default().loop_period_ms);
        assert_eq!(cfg.channel, Channel::Mono);
    }

    #[test]
    fn missing_station_section_uses_defaults() {
        let f = yaml_tempfile("station:\n");
        let cfg = StationConfig::load_from_file(f.path()).unwrap();
        assert_eq!(cfg, StationConfig::default());
    }

    #[test]
    fn unknown_submode_is_rejected() {
        let f = yaml_tempfile("station:\n  submode: warp\n");
        assert!(StationConfig::load_from_file(f.path()).is_err());
    }

    #[test]
    fn unknown_field_is_rejected() {
        let f = yaml_tempfile("station:\n  tx_dleay_ms: 100\n");
        assert!(StationConfig::load_from_file(f.path()).is_err());
    }

    #[test]
    fn tx_delay_out_of_range_is_rejected() {
        let f = yaml_tempfile("station:\n  tx_delay_ms: 1500\n");
        let err = StationConfig::load_from_file(f.path()).unwrap_err();
        assert!(matches!(
            reason_of(&err),
            Some(ConfigurationReason::TxDelayTooLong {
                tx_delay_ms: 1500,
                ..
            })
        ));
    }

    #[test]
    fn loop_shorter_than_submode_period_is_rejected() {
        let f = yaml_tempfile("station:\n  submode: slow\n  loop_period_ms: 15000\n");
        let err = StationConfig::load_from_file(f.path()).unwrap_err();
        assert_eq!(
            reason_of(&err),
            Some(&ConfigurationReason::SubmodePeriodExceedsLoop {
                submode_period_ms: 30_000,
                loop_period_ms: 15_000,
            })
        );
    }

    #[test]
    fn audio_frequency_must_be_audible() {
        let cfg = StationConfig {
            audio_frequency_hz: 30_000.0,
            ..StationConfig::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = StationConfig {
            audio_frequency_hz: f64::NAN,
            ..StationConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_file_returns_error() {
        assert!(StationConfig::load_from_file(Path::new("/nonexistent/station.yaml")).is_err());
    }

    #[test]
    fn malformed_yaml_returns_error() {
        let f = yaml_tempfile("this is: not: valid: yaml: content:::");
        assert!(StationConfig::load_from_file(f.path()).is_err());
    }
}
