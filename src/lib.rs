// src/lib.rs
//! # wavelog
//!
//! Capture of high-resolution oscilloscope waveforms into an append-only binary
//! run log, and an offline decoder that turns that log back into time/voltage
//! samples.
//!
//! ## Features
//!
//! - 📡 **Chunked Transfer**: Full-memory waveform reads in bounded SCPI blocks
//! - ⏱️ **Bounded Trigger Wait**: Polls STOP/WAIT with forced triggering and a hard timeout
//! - 💾 **Crash Tolerant**: A log cut off mid-record still decodes every complete run
//! - 👀 **Live Tail**: Follow a log while a capture session is still writing it
//! - 📄 **CSV Export**: Single-run or concatenated export with a monotonic time axis
//!
//! ## Quick Start
//!
//! ### Capturing Runs
//!
//! ```rust,no_run
//! use wavelog::*;
//!
//! fn main() -> Result<()> {
//!     let scope = TcpInstrument::connect("192.168.1.50:5555")?;
//!     let writer = WaveLogWriter::create("capture.bin")?;
//!
//!     let config = SessionConfig {
//!         runs: Some(5),
//!         channels: vec![Channel::CH1, Channel::CH2],
//!         ..SessionConfig::default()
//!     };
//!     let mut session = CaptureSession::new(scope, writer, config)?;
//!     let summary = session.run()?;
//!     println!("Captured {} runs", summary.runs.len());
//!     Ok(())
//! }
//! ```
//!
//! ### Reading a Log
//!
//! ```rust,no_run
//! use wavelog::*;
//!
//! fn main() -> Result<()> {
//!     let mut reader = WaveLogReader::open("capture.bin")?;
//!     println!("{} complete runs", reader.runs().len());
//!
//!     let run = reader.decode(RunSelector::Last)?;
//!     if let Some(ch1) = run.channel(Channel::CH1) {
//!         println!("CH1: {} samples, first {:.3} V", ch1.len(), ch1.volts[0]);
//!     }
//!
//!     export_run(&mut reader, RunSelector::Last, "capture.csv", TimeColumn::Relative)?;
//!     Ok(())
//! }
//! ```

// Modules
pub mod capture;
pub mod config;
pub mod error;
pub mod export;
pub mod instrument;
pub mod reader;
pub mod segment;
pub mod types;
pub mod writer;

// Re-export commonly used types at the crate root for convenience
pub use error::{WaveLogError, Result};

pub use types::{Channel, Preamble, TriggerStatus};

pub use segment::{HeaderLayout, InvalidHeader, SegmentHeader, SegmentInfo};

pub use instrument::{Instrument, SimulatedScope, SimulatedWaveform, TcpInstrument};

pub use capture::{
    CaptureSession,
    SessionConfig,
    SessionSummary,
    RunReport,
    TriggerConfig,
    TriggerOutcome,
};

pub use writer::WaveLogWriter;

pub use reader::{
    DecodedChannel,
    DecodedRun,
    IndexStop,
    LogFollower,
    Run,
    RunSelector,
    WaveLogReader,
};

pub use export::{export_all, export_run, convert_dir, CsvExporter, TimeColumn};

pub use config::CaptureConfig;

/// Prelude module for convenient imports
///
/// ```rust
/// use wavelog::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{WaveLogError, Result};
    pub use crate::types::Channel;
    pub use crate::segment::SegmentHeader;
    pub use crate::instrument::Instrument;
    pub use crate::capture::{CaptureSession, SessionConfig};
    pub use crate::writer::WaveLogWriter;
    pub use crate::reader::{RunSelector, WaveLogReader};
    pub use crate::export::{CsvExporter, TimeColumn};
}

/// Version of the on-disk record format written by this library
pub const FORMAT_VERSION: u16 = SegmentHeader::VERSION;

/// Library version
pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");
