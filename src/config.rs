//! TOML configuration for capture sessions.
//!
//! Every field is optional; command-line flags take precedence over the file.
//!
//! ```toml
//! # wavelog.toml
//! [session]
//! runs = 10            # 0 captures until interrupted
//! channels = [1, 2]
//! chunk_size = 250000
//! trigger_timeout_ms = 10000
//! trigger_cooldown_ms = 5
//!
//! [acquisition]
//! memory_depth = 24000000
//! time_scale = 0.001
//! acquisition_type = "NORM"
//! set_channel_display = true
//!
//! [instrument]
//! address = "192.168.1.50:5555"
//! timeout_ms = 60000
//!
//! [output]
//! layout = "packed"
//! ```

use crate::capture::{AcquisitionSetup, SessionConfig, TriggerConfig};
use crate::error::{WaveLogError, Result};
use crate::segment::HeaderLayout;
use crate::types::Channel;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Root of a `wavelog.toml` file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaptureConfig {
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub acquisition: AcquisitionSection,
    #[serde(default)]
    pub instrument: InstrumentSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionSection {
    /// Number of runs; 0 means unbounded.
    pub runs: Option<u64>,
    /// Channel numbers 1-4.
    pub channels: Option<Vec<u8>>,
    /// Points per waveform block request.
    pub chunk_size: Option<u32>,
    pub trigger_timeout_ms: Option<u64>,
    pub trigger_cooldown_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AcquisitionSection {
    pub memory_depth: Option<u64>,
    pub time_scale: Option<f64>,
    pub acquisition_type: Option<String>,
    pub set_channel_display: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstrumentSection {
    /// `host:port` of a LAN SCPI socket.
    pub address: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSection {
    pub layout: Option<LayoutName>,
}

/// Header layout as spelled in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutName {
    Packed,
    Padded,
}

impl From<LayoutName> for HeaderLayout {
    fn from(name: LayoutName) -> Self {
        match name {
            LayoutName::Packed => HeaderLayout::Packed,
            LayoutName::Padded => HeaderLayout::Padded,
        }
    }
}

impl CaptureConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            WaveLogError::Config(format!("failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| WaveLogError::Config(format!("failed to parse TOML configuration: {}", e)))
    }

    /// Build a validated session configuration, starting from the defaults.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let defaults = SessionConfig::default();
        let s = &self.session;

        let channels = match &s.channels {
            Some(numbers) => numbers.iter().map(|&n| Channel::new(n)).collect::<Result<Vec<_>>>()?,
            None => defaults.channels,
        };
        let trigger = TriggerConfig {
            threshold: s.trigger_timeout_ms.map(Duration::from_millis).unwrap_or(defaults.trigger.threshold),
            cooldown: s.trigger_cooldown_ms.map(Duration::from_millis).unwrap_or(defaults.trigger.cooldown),
        };
        let a = &self.acquisition;
        let setup = AcquisitionSetup {
            memory_depth: a.memory_depth,
            time_scale: a.time_scale,
            acquire_type: a.acquisition_type.clone(),
            set_channel_display: a.set_channel_display.unwrap_or(false),
        };

        SessionConfig {
            runs: match s.runs {
                Some(0) => None,
                Some(n) => Some(n),
                None => defaults.runs,
            },
            channels,
            chunk_size: s.chunk_size.unwrap_or(defaults.chunk_size),
            trigger,
            setup,
        }
        .validate()
    }

    pub fn layout(&self) -> HeaderLayout {
        self.output.layout.map(HeaderLayout::from).unwrap_or_default()
    }

    pub fn instrument_timeout(&self) -> Option<Duration> {
        self.instrument.timeout_ms.map(Duration::from_millis)
    }
}
