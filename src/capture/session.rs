// src/capture/session.rs
use crate::capture::transfer::{transfer_channel, TransferStats, DEFAULT_CHUNK_SIZE};
use crate::capture::trigger::{wait_for_trigger, Clock, SystemClock, TriggerConfig, TriggerReport};
use crate::error::{WaveLogError, Result};
use crate::instrument::{scpi, Instrument};
use crate::segment::{SegmentHeader, SegmentInfo};
use crate::types::{unix_time_ns, Channel, Preamble};
use crate::writer::WaveLogWriter;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One-time instrument setup sent before the first run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquisitionSetup {
    /// `:ACQ:MDEP` points
    pub memory_depth: Option<u64>,
    /// `:TIM:SCAL` seconds per division
    pub time_scale: Option<f64>,
    /// `:ACQ:TYPE`, e.g. `NORM`
    pub acquire_type: Option<String>,
    /// Turn captured channels on and every other channel off
    pub set_channel_display: bool,
}

impl AcquisitionSetup {
    pub fn is_empty(&self) -> bool {
        self.memory_depth.is_none()
            && self.time_scale.is_none()
            && self.acquire_type.is_none()
            && !self.set_channel_display
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Stop after this many runs; `None` runs until stopped or an error occurs
    pub runs: Option<u64>,
    /// Channels to read each run, ascending and unique
    pub channels: Vec<Channel>,
    /// Maximum points per `:WAV:DATA?` request
    pub chunk_size: u32,
    pub trigger: TriggerConfig,
    pub setup: AcquisitionSetup,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            runs: Some(1),
            channels: vec![Channel::CH1],
            chunk_size: DEFAULT_CHUNK_SIZE,
            trigger: TriggerConfig::default(),
            setup: AcquisitionSetup::default(),
        }
    }
}

impl SessionConfig {
    /// Sort and deduplicate channels, reject an empty channel list or zero chunk size
    pub fn validate(mut self) -> Result<Self> {
        self.channels.sort();
        self.channels.dedup();
        if self.channels.is_empty() {
            return Err(WaveLogError::Config("at least one channel is required".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(WaveLogError::Config("chunk_size must be greater than zero".to_string()));
        }
        Ok(self)
    }
}

/// Outcome of one triggered acquisition
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Zero-based run number within this session
    pub index: u64,
    pub start_time_ns: u64,
    pub trigger: TriggerReport,
    pub segments: Vec<SegmentInfo>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn total_samples(&self) -> u64 {
        self.segments.iter().map(|s| s.header.payload_len()).sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionSummary {
    pub runs: Vec<RunReport>,
    /// Set when the stop flag ended the session before the run limit
    pub stopped_early: bool,
}

/// Repeated trigger → wait → read cycles appended to one log
pub struct CaptureSession<I: Instrument, C: Clock = SystemClock> {
    instrument: I,
    writer: WaveLogWriter,
    config: SessionConfig,
    clock: C,
    stop: Option<Arc<AtomicBool>>,
    prepared: bool,
    runs_done: u64,
    last_start_ns: u64,
}

impl<I: Instrument> CaptureSession<I, SystemClock> {
    pub fn new(instrument: I, writer: WaveLogWriter, config: SessionConfig) -> Result<Self> {
        Self::with_clock(instrument, writer, config, SystemClock)
    }
}

impl<I: Instrument, C: Clock> CaptureSession<I, C> {
    pub fn with_clock(instrument: I, writer: WaveLogWriter, config: SessionConfig, clock: C) -> Result<Self> {
        Ok(CaptureSession {
            instrument,
            writer,
            config: config.validate()?,
            clock,
            stop: None,
            prepared: false,
            runs_done: 0,
            last_start_ns: 0,
        })
    }

    /// Flag checked between runs; setting it ends the session after the
    /// current run completes
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn instrument(&self) -> &I {
        &self.instrument
    }

    pub fn instrument_mut(&mut self) -> &mut I {
        &mut self.instrument
    }

    pub fn runs_done(&self) -> u64 {
        self.runs_done
    }

    pub fn into_parts(self) -> (I, WaveLogWriter) {
        (self.instrument, self.writer)
    }

    fn stop_requested(&self) -> bool {
        self.stop.as_ref().is_some_and(|s| s.load(Ordering::SeqCst))
    }

    /// Send the one-time acquisition setup
    pub fn prepare(&mut self) -> Result<()> {
        if self.prepared {
            return Ok(());
        }
        let setup = self.config.setup.clone();
        if !setup.is_empty() {
            // Memory depth only takes effect in run mode
            self.instrument.write(scpi::RUN)?;
            if setup.set_channel_display {
                for channel in Channel::all() {
                    let on = self.config.channels.contains(&channel);
                    self.instrument.write(&scpi::channel_display(channel, on))?;
                }
            }
            if let Some(kind) = &setup.acquire_type {
                self.instrument.write(&scpi::acquire_type(kind))?;
            }
            if let Some(depth) = setup.memory_depth {
                self.instrument.write(&scpi::memory_depth(depth))?;
            }
            if let Some(scale) = setup.time_scale {
                self.instrument.write(&scpi::time_scale(scale))?;
            }
            debug!("Sent acquisition setup {:?}", setup);
        }
        self.prepared = true;
        Ok(())
    }

    /// Run until the run limit, the stop flag, or the first error
    pub fn run(&mut self) -> Result<SessionSummary> {
        self.prepare()?;
        let mut summary = SessionSummary::default();

        loop {
            if let Some(limit) = self.config.runs {
                if self.runs_done >= limit {
                    break;
                }
            }
            if self.stop_requested() {
                info!("Stop requested after {} runs", self.runs_done);
                summary.stopped_early = true;
                break;
            }
            summary.runs.push(self.run_once()?);
        }

        Ok(summary)
    }

    /// Acquire and append one run
    pub fn run_once(&mut self) -> Result<RunReport> {
        self.prepare()?;
        let started = self.clock.now();

        self.instrument.write(scpi::SINGLE)?;
        let trigger = wait_for_trigger(&mut self.instrument, &self.clock, &self.config.trigger)?;
        self.instrument.write(scpi::STOP)?;
        for command in scpi::RAW_READ_MODE {
            self.instrument.write(command)?;
        }

        // One timestamp per run keeps every channel of the run grouped together
        let mut start_time_ns = unix_time_ns();
        if start_time_ns <= self.last_start_ns {
            start_time_ns = self.last_start_ns + 1;
        }
        self.last_start_ns = start_time_ns;

        let channels = self.config.channels.clone();
        let mut segments = Vec::with_capacity(channels.len());
        for channel in channels {
            segments.push(self.capture_channel(channel, start_time_ns)?);
        }

        let elapsed = self.clock.now().duration_since(started);
        let report = RunReport {
            index: self.runs_done,
            start_time_ns,
            trigger,
            segments,
            elapsed,
        };
        self.runs_done += 1;

        info!(
            "Run {}: {} channel(s), {} samples in {:.3} s ({:?})",
            report.index,
            report.segments.len(),
            report.total_samples(),
            elapsed.as_secs_f64(),
            report.trigger.outcome
        );
        Ok(report)
    }

    fn capture_channel(&mut self, channel: Channel, start_time_ns: u64) -> Result<SegmentInfo> {
        self.instrument.write(&scpi::waveform_source(channel))?;
        let preamble = Preamble::parse(&self.instrument.query(scpi::WAVEFORM_PREAMBLE)?)?;

        let header = SegmentHeader::new(
            preamble.points,
            start_time_ns,
            preamble.dt_ps(),
            preamble.x_increment,
            preamble.x_origin,
            preamble.x_reference,
            preamble.y_increment,
            preamble.y_origin,
            preamble.y_reference,
            channel,
        );

        let mut segment = self.writer.begin_segment(&header)?;
        let stats: TransferStats = transfer_channel(
            &mut self.instrument,
            &mut segment,
            preamble.points,
            self.config.chunk_size,
        )?;
        let info = segment.finish()?;
        self.writer.flush()?;

        debug!(
            "{}: {} points in {} window(s) at offset {}",
            channel, stats.bytes, stats.windows, info.offset
        );
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::trigger::ManualClock;
    use crate::instrument::{SimulatedScope, SimulatedWaveform};
    use crate::types::TriggerStatus;

    fn two_channel_scope() -> SimulatedScope {
        SimulatedScope::new()
            .with_waveform(Channel::CH1, SimulatedWaveform::triangle(300, 50))
            .with_waveform(Channel::CH2, SimulatedWaveform::new(vec![200; 300]))
    }

    #[test]
    fn test_run_sequence_commands() {
        let dir = tempfile::tempdir().unwrap();
        let writer = WaveLogWriter::create(dir.path().join("log.bin")).unwrap();
        let config = SessionConfig {
            channels: vec![Channel::CH1],
            chunk_size: 200,
            ..SessionConfig::default()
        };
        let mut session = CaptureSession::with_clock(two_channel_scope(), writer, config, ManualClock::new()).unwrap();
        let report = session.run_once().unwrap();
        assert_eq!(report.segments.len(), 1);

        let commands = session.instrument().commands();
        let expected = [
            ":SING", ":TRIG:STAT?", ":STOP", ":WAV:MODE RAW", ":WAV:POIN:MODE RAW",
            ":WAV:FORM BYTE", ":WAV:BYTE LSBF", ":WAV:SOUR CHAN1", ":WAV:PRE?",
            ":WAV:STAR 1", ":WAV:STOP 200", ":WAV:DATA?",
            ":WAV:STAR 201", ":WAV:STOP 300", ":WAV:DATA?",
        ];
        assert_eq!(commands, expected);
    }

    #[test]
    fn test_channels_share_start_time() {
        let dir = tempfile::tempdir().unwrap();
        let writer = WaveLogWriter::create(dir.path().join("log.bin")).unwrap();
        let config = SessionConfig {
            runs: Some(2),
            channels: vec![Channel::CH2, Channel::CH1, Channel::CH2],
            ..SessionConfig::default()
        };
        let mut session = CaptureSession::with_clock(two_channel_scope(), writer, config, ManualClock::new()).unwrap();
        let summary = session.run().unwrap();

        assert_eq!(summary.runs.len(), 2);
        for run in &summary.runs {
            let channels: Vec<Channel> = run.segments.iter().map(|s| s.header.channel).collect();
            assert_eq!(channels, vec![Channel::CH1, Channel::CH2]);
            assert!(run.segments.iter().all(|s| s.header.start_time_ns == run.start_time_ns));
        }
        assert!(summary.runs[1].start_time_ns > summary.runs[0].start_time_ns);
    }

    #[test]
    fn test_trigger_timeout_aborts_session() {
        let dir = tempfile::tempdir().unwrap();
        let writer = WaveLogWriter::create(dir.path().join("log.bin")).unwrap();
        let mut scope = two_channel_scope();
        scope.set_idle_status(TriggerStatus::Running);

        let config = SessionConfig { runs: Some(3), ..SessionConfig::default() };
        let mut session = CaptureSession::with_clock(scope, writer, config, ManualClock::new()).unwrap();
        let err = session.run().unwrap_err();
        assert!(matches!(err, WaveLogError::TriggerTimeout { .. }));
        assert_eq!(session.runs_done(), 0);
        assert_eq!(session.instrument().count_commands(":WAV:DATA?"), 0);
    }

    #[test]
    fn test_stop_flag_checked_between_runs() {
        let dir = tempfile::tempdir().unwrap();
        let writer = WaveLogWriter::create(dir.path().join("log.bin")).unwrap();
        let stop = Arc::new(AtomicBool::new(true));
        let config = SessionConfig { runs: None, ..SessionConfig::default() };
        let mut session = CaptureSession::with_clock(two_channel_scope(), writer, config, ManualClock::new())
            .unwrap()
            .with_stop_flag(stop);
        let summary = session.run().unwrap();
        assert!(summary.stopped_early);
        assert!(summary.runs.is_empty());
    }

    #[test]
    fn test_setup_sent_once() {
        let dir = tempfile::tempdir().unwrap();
        let writer = WaveLogWriter::create(dir.path().join("log.bin")).unwrap();
        let config = SessionConfig {
            runs: Some(2),
            setup: AcquisitionSetup {
                memory_depth: Some(12_000),
                acquire_type: Some("NORM".to_string()),
                set_channel_display: true,
                ..AcquisitionSetup::default()
            },
            ..SessionConfig::default()
        };
        let mut session = CaptureSession::with_clock(two_channel_scope(), writer, config, ManualClock::new()).unwrap();
        session.run().unwrap();

        let scope = session.instrument();
        assert_eq!(scope.count_commands(":ACQ:MDEP 12000"), 1);
        assert_eq!(scope.count_commands(":ACQ:TYPE NORM"), 1);
        assert_eq!(scope.count_commands(":CHAN1:DISP ON"), 1);
        assert_eq!(scope.count_commands(":CHAN2:DISP OFF"), 1);
        assert_eq!(scope.count_commands(":SING"), 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let writer = WaveLogWriter::create(dir.path().join("log.bin")).unwrap();
        let config = SessionConfig { channels: vec![], ..SessionConfig::default() };
        assert!(matches!(
            CaptureSession::new(SimulatedScope::new(), writer, config),
            Err(WaveLogError::Config(_))
        ));
    }
}
