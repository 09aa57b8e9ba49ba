// src/error.rs
use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WaveLogError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Waiting for trigger STOP timed out after {threshold:?}")]
    TriggerTimeout { threshold: Duration },

    #[error("Instrument error: {0}")]
    Instrument(String),

    #[error("Waveform block size mismatch: expected {expected} bytes, got {actual}")]
    BlockSize { expected: usize, actual: usize },

    #[error("Malformed preamble: {0}")]
    Preamble(String),

    #[error("Corrupt segment at offset {offset}: {reason}")]
    CorruptSegment { offset: u64, reason: String },

    #[error("Invalid channel: {0} (expected 1-4)")]
    InvalidChannel(u8),

    #[error("Run index {index} out of range ({available} complete runs)")]
    RunOutOfRange { index: i64, available: usize },

    #[error("No complete runs found")]
    NoRuns,

    #[error("Run t0={start_time_ns} has no sample interval; absolute timestamps need dt > 0")]
    MissingTimebase { start_time_ns: u64 },

    #[error("Log follower thread panicked")]
    FollowerPanicked,

    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, WaveLogError>;
