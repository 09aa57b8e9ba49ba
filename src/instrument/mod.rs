// src/instrument/mod.rs
//! Instrument capability consumed by the capture path.
//!
//! A capture session never opens connections itself; it is handed something
//! that implements [`Instrument`]. [`TcpInstrument`] talks to a real scope over
//! a raw SCPI socket and [`SimulatedScope`] answers the same command subset
//! from memory.

pub mod scpi;
mod sim;
mod tcp;

pub use sim::{SimulatedScope, SimulatedWaveform};
pub use tcp::TcpInstrument;

use crate::error::Result;
use crate::types::TriggerStatus;

/// Command/response access to an oscilloscope
pub trait Instrument {
    /// Send a command without reading a reply
    fn write(&mut self, command: &str) -> Result<()>;

    /// Send a command and read a text reply
    fn query(&mut self, command: &str) -> Result<String>;

    /// Send a command and read an IEEE-488.2 binary block, returning only
    /// the payload bytes
    fn query_binary_values(&mut self, command: &str) -> Result<Vec<u8>>;

    /// Query the trigger system state
    fn trigger_status(&mut self) -> Result<TriggerStatus> {
        let reply = self.query(scpi::TRIGGER_STATUS)?;
        Ok(TriggerStatus::from_reply(&reply))
    }
}

impl<T: Instrument + ?Sized> Instrument for &mut T {
    fn write(&mut self, command: &str) -> Result<()> {
        (**self).write(command)
    }

    fn query(&mut self, command: &str) -> Result<String> {
        (**self).query(command)
    }

    fn query_binary_values(&mut self, command: &str) -> Result<Vec<u8>> {
        (**self).query_binary_values(command)
    }

    fn trigger_status(&mut self) -> Result<TriggerStatus> {
        (**self).trigger_status()
    }
}

impl<T: Instrument + ?Sized> Instrument for Box<T> {
    fn write(&mut self, command: &str) -> Result<()> {
        (**self).write(command)
    }

    fn query(&mut self, command: &str) -> Result<String> {
        (**self).query(command)
    }

    fn query_binary_values(&mut self, command: &str) -> Result<Vec<u8>> {
        (**self).query_binary_values(command)
    }

    fn trigger_status(&mut self) -> Result<TriggerStatus> {
        (**self).trigger_status()
    }
}
