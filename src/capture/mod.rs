// src/capture/mod.rs
//! Acquisition path: trigger synchronisation, chunked waveform transfer and
//! the run loop that ties them to a log writer.

mod session;
pub mod transfer;
pub mod trigger;

pub use session::{AcquisitionSetup, CaptureSession, RunReport, SessionConfig, SessionSummary};
pub use transfer::{transfer_channel, windows, TransferStats, Window, DEFAULT_CHUNK_SIZE};
pub use trigger::{
    wait_for_trigger, Clock, ManualClock, SystemClock, TriggerConfig, TriggerOutcome, TriggerReport,
};
