// src/writer/mod.rs
mod log_writer;

pub use log_writer::{SegmentWriter, WaveLogWriter};
