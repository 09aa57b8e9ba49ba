// src/types.rs
use crate::error::{WaveLogError, Result};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Oscilloscope analog channel number (1 through 4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Channel(u8);

impl Channel {
    pub const CH1: Channel = Channel(1);
    pub const CH2: Channel = Channel(2);
    pub const CH3: Channel = Channel(3);
    pub const CH4: Channel = Channel(4);

    /// Number of analog channels on the instrument
    pub const COUNT: usize = 4;

    pub fn new(number: u8) -> Result<Self> {
        if (1..=Self::COUNT as u8).contains(&number) {
            Ok(Channel(number))
        } else {
            Err(WaveLogError::InvalidChannel(number))
        }
    }

    /// All channels in ascending order
    pub fn all() -> [Channel; 4] {
        [Self::CH1, Self::CH2, Self::CH3, Self::CH4]
    }

    pub fn number(&self) -> u8 {
        self.0
    }

    /// Zero-based column index for tabular output
    pub fn index(&self) -> usize {
        (self.0 - 1) as usize
    }

    /// SCPI source name, e.g. `CHAN1`
    pub fn scpi_source(&self) -> String {
        format!("CHAN{}", self.0)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CH{}", self.0)
    }
}

impl TryFrom<u8> for Channel {
    type Error = WaveLogError;

    fn try_from(value: u8) -> Result<Self> {
        Channel::new(value)
    }
}

/// Trigger system state as reported by `:TRIG:STAT?`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerStatus {
    /// Armed, acquisition in progress or waiting for the pre-trigger buffer
    Running,
    /// Trigger condition set up but not yet met
    Waiting,
    /// Acquisition complete, waveform memory is stable
    Stopped,
}

impl TriggerStatus {
    /// Map an instrument reply onto a status.
    ///
    /// `STOP` and `WAIT` are the terminal replies; `RUN`, `AUTO`, `TD` and
    /// anything unrecognised count as still running.
    pub fn from_reply(reply: &str) -> Self {
        match reply.trim().to_ascii_uppercase().as_str() {
            "STOP" => TriggerStatus::Stopped,
            "WAIT" => TriggerStatus::Waiting,
            _ => TriggerStatus::Running,
        }
    }

    pub fn as_reply(&self) -> &'static str {
        match self {
            TriggerStatus::Running => "RUN",
            TriggerStatus::Waiting => "WAIT",
            TriggerStatus::Stopped => "STOP",
        }
    }
}

/// Waveform preamble returned by `:WAV:PRE?`
///
/// The reply is ten comma-separated fields:
/// `format,type,points,count,xincrement,xorigin,xreference,yincrement,yorigin,yreference`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preamble {
    pub format: u8,
    pub acquire_type: u8,
    pub points: u32,
    pub count: u32,
    pub x_increment: f32,
    pub x_origin: f32,
    pub x_reference: f32,
    pub y_increment: f32,
    pub y_origin: f32,
    pub y_reference: f32,
}

impl Preamble {
    pub const FIELD_COUNT: usize = 10;

    pub fn parse(reply: &str) -> Result<Self> {
        let fields: Vec<&str> = reply.trim().split(',').map(str::trim).collect();
        if fields.len() < Self::FIELD_COUNT {
            return Err(WaveLogError::Preamble(format!(
                "expected {} fields, found {}: {:?}",
                Self::FIELD_COUNT,
                fields.len(),
                reply.trim()
            )));
        }

        // Integer fields are sometimes reported in float notation ("1.200000e+04").
        let int_field = |idx: usize| -> Result<u32> {
            let raw = fields[idx];
            raw.parse::<u32>()
                .or_else(|_| raw.parse::<f64>().map(|v| v.round() as u32))
                .map_err(|_| WaveLogError::Preamble(format!("field {} is not a number: {:?}", idx, raw)))
        };
        let float_field = |idx: usize| -> Result<f32> {
            let raw = fields[idx];
            raw.parse::<f32>()
                .map_err(|_| WaveLogError::Preamble(format!("field {} is not a number: {:?}", idx, raw)))
        };

        Ok(Preamble {
            format: int_field(0)? as u8,
            acquire_type: int_field(1)? as u8,
            points: int_field(2)?,
            count: int_field(3)?,
            x_increment: float_field(4)?,
            x_origin: float_field(5)?,
            x_reference: float_field(6)?,
            y_increment: float_field(7)?,
            y_origin: float_field(8)?,
            y_reference: float_field(9)?,
        })
    }

    /// Sample interval in picoseconds, rounded to the nearest integer
    pub fn dt_ps(&self) -> u32 {
        (self.x_increment as f64 * 1e12).round() as u32
    }

    pub fn to_reply(&self) -> String {
        format!(
            "{},{},{},{},{:e},{:e},{:e},{:e},{:e},{:e}",
            self.format,
            self.acquire_type,
            self.points,
            self.count,
            self.x_increment,
            self.x_origin,
            self.x_reference,
            self.y_increment,
            self.y_origin,
            self.y_reference,
        )
    }
}

/// Current wall-clock time in nanoseconds since the Unix epoch
pub fn unix_time_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
