// src/instrument/sim.rs
use crate::error::{WaveLogError, Result};
use crate::instrument::{scpi, Instrument};
use crate::types::{Channel, Preamble, TriggerStatus};
use std::collections::VecDeque;

/// Waveform memory for one simulated channel
#[derive(Debug, Clone)]
pub struct SimulatedWaveform {
    pub samples: Vec<u8>,
    pub x_increment: f32,
    pub x_origin: f32,
    pub y_increment: f32,
    pub y_origin: f32,
    pub y_reference: f32,
}

impl SimulatedWaveform {
    /// Waveform with DS1000Z-like default scaling (1 ns/sample, 40 mV/count, centre 127)
    pub fn new(samples: Vec<u8>) -> Self {
        SimulatedWaveform {
            samples,
            x_increment: 1.0e-9,
            x_origin: 0.0,
            y_increment: 0.04,
            y_origin: 0.0,
            y_reference: 127.0,
        }
    }

    /// Triangle wave spanning the full byte range
    pub fn triangle(len: usize, period: usize) -> Self {
        let period = period.max(2);
        let samples = (0..len)
            .map(|i| {
                let phase = i % period;
                let half = period / 2;
                let level = if phase < half { phase } else { period - phase };
                ((level * 255) / half.max(1)).min(255) as u8
            })
            .collect();
        Self::new(samples)
    }

    pub fn preamble(&self) -> Preamble {
        Preamble {
            format: 0,
            acquire_type: 0,
            points: self.samples.len() as u32,
            count: 1,
            x_increment: self.x_increment,
            x_origin: self.x_origin,
            x_reference: 0.0,
            y_increment: self.y_increment,
            y_origin: self.y_origin,
            y_reference: self.y_reference,
        }
    }
}

#[derive(Debug, Clone)]
struct Fault {
    command_prefix: String,
    remaining_ok: usize,
}

/// In-memory oscilloscope answering the capture command subset
///
/// Trigger status replies come from a script; once the script is exhausted
/// every poll reports `idle_status`. Every command is recorded in order.
#[derive(Debug, Clone)]
pub struct SimulatedScope {
    waveforms: [Option<SimulatedWaveform>; 4],
    trigger_script: VecDeque<TriggerStatus>,
    idle_status: TriggerStatus,
    source: Channel,
    window: (u32, u32),
    max_block: usize,
    fault: Option<Fault>,
    commands: Vec<String>,
}

impl Default for SimulatedScope {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedScope {
    /// Instrument-imposed ceiling on a single `:WAV:DATA?` block
    pub const DEFAULT_MAX_BLOCK: usize = 250_000;

    pub fn new() -> Self {
        SimulatedScope {
            waveforms: [None, None, None, None],
            trigger_script: VecDeque::new(),
            idle_status: TriggerStatus::Stopped,
            source: Channel::CH1,
            window: (1, 1),
            max_block: Self::DEFAULT_MAX_BLOCK,
            fault: None,
            commands: Vec::new(),
        }
    }

    pub fn with_waveform(mut self, channel: Channel, waveform: SimulatedWaveform) -> Self {
        self.set_waveform(channel, waveform);
        self
    }

    pub fn set_waveform(&mut self, channel: Channel, waveform: SimulatedWaveform) {
        self.waveforms[channel.index()] = Some(waveform);
    }

    pub fn clear_waveform(&mut self, channel: Channel) {
        self.waveforms[channel.index()] = None;
    }

    /// Queue replies for successive `:TRIG:STAT?` polls
    pub fn script_trigger(&mut self, statuses: impl IntoIterator<Item = TriggerStatus>) {
        self.trigger_script.extend(statuses);
    }

    /// Status reported once the trigger script is exhausted
    pub fn set_idle_status(&mut self, status: TriggerStatus) {
        self.idle_status = status;
    }

    pub fn set_max_block(&mut self, max_block: usize) {
        self.max_block = max_block;
    }

    /// Fail the first command starting with `command_prefix` after
    /// `remaining_ok` successful ones
    pub fn fail_after(&mut self, command_prefix: impl Into<String>, remaining_ok: usize) {
        self.fault = Some(Fault { command_prefix: command_prefix.into(), remaining_ok });
    }

    /// Every command received, in order
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn count_commands(&self, command: &str) -> usize {
        self.commands.iter().filter(|c| c.as_str() == command).count()
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    fn record(&mut self, command: &str) -> Result<()> {
        self.commands.push(command.to_string());
        if let Some(fault) = self.fault.as_mut() {
            if command.starts_with(&fault.command_prefix) {
                if fault.remaining_ok == 0 {
                    self.fault = None;
                    return Err(WaveLogError::Instrument(format!(
                        "simulated transport failure on {:?}",
                        command
                    )));
                }
                fault.remaining_ok -= 1;
            }
        }
        Ok(())
    }

    fn current_waveform(&self) -> Result<&SimulatedWaveform> {
        self.waveforms[self.source.index()].as_ref().ok_or_else(|| {
            WaveLogError::Instrument(format!("{} has no waveform data", self.source))
        })
    }

    fn parse_index(command: &str, arg: &str) -> Result<u32> {
        arg.trim()
            .parse::<u32>()
            .map_err(|_| WaveLogError::Instrument(format!("bad argument in {:?}", command)))
    }
}

impl Instrument for SimulatedScope {
    fn write(&mut self, command: &str) -> Result<()> {
        self.record(command)?;

        if let Some(arg) = command.strip_prefix(":WAV:SOUR CHAN") {
            let number = Self::parse_index(command, arg)? as u8;
            self.source = Channel::new(number)?;
        } else if let Some(arg) = command.strip_prefix(":WAV:STAR ") {
            self.window.0 = Self::parse_index(command, arg)?;
        } else if let Some(arg) = command.strip_prefix(":WAV:STOP ") {
            self.window.1 = Self::parse_index(command, arg)?;
        } else if command == scpi::FORCE_TRIGGER {
            self.trigger_script.clear();
        }
        Ok(())
    }

    fn query(&mut self, command: &str) -> Result<String> {
        self.record(command)?;

        match command {
            scpi::TRIGGER_STATUS => {
                let status = self.trigger_script.pop_front().unwrap_or(self.idle_status);
                Ok(status.as_reply().to_string())
            }
            scpi::WAVEFORM_PREAMBLE => Ok(self.current_waveform()?.preamble().to_reply()),
            "*IDN?" => Ok("RIGOL TECHNOLOGIES,DS1054Z,SIM000000,00.04.04".to_string()),
            _ => Err(WaveLogError::Instrument(format!("unsupported query {:?}", command))),
        }
    }

    fn query_binary_values(&mut self, command: &str) -> Result<Vec<u8>> {
        self.record(command)?;
        if command != scpi::WAVEFORM_DATA {
            return Err(WaveLogError::Instrument(format!("unsupported block query {:?}", command)));
        }

        let (start, stop) = self.window;
        let max_block = self.max_block;
        let samples = &self.current_waveform()?.samples;
        if start == 0 || stop < start || stop as usize > samples.len() {
            return Err(WaveLogError::Instrument(format!(
                "window {}..={} outside waveform memory of {} points",
                start,
                stop,
                samples.len()
            )));
        }
        let len = (stop - start + 1) as usize;
        if len > max_block {
            return Err(WaveLogError::Instrument(format!(
                "window of {} points exceeds the {} point block limit",
                len, max_block
            )));
        }
        Ok(samples[start as usize - 1..stop as usize].to_vec())
    }
}
