// src/export/csv_export.rs
use crate::error::{WaveLogError, Result};
use crate::reader::{DecodedRun, ReadSeek, RunSelector, WaveLogReader};
use crate::types::Channel;
use chrono::{DateTime, Utc};
use log::info;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Synthetic sample interval used when a run has no usable CH1 timebase
pub const FALLBACK_DT_SECONDS: f64 = 1e-9;

/// How the first CSV column is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeColumn {
    /// `Time_s`: seconds from the start of the run (or of the first run when
    /// concatenating), 12-digit scientific notation
    #[default]
    Relative,
    /// `DateTime_UTC`: absolute sample time, microsecond resolution
    Utc,
}

impl TimeColumn {
    pub fn header(&self) -> &'static str {
        match self {
            TimeColumn::Relative => "Time_s",
            TimeColumn::Utc => "DateTime_UTC",
        }
    }
}

/// Rows and runs written by one export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExportSummary {
    pub runs: usize,
    pub rows: u64,
}

/// Format seconds like C's `%.12e` (signed, at least two exponent digits)
pub fn format_time(seconds: f64) -> String {
    let s = format!("{:.12e}", seconds);
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exp),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => s,
    }
}

pub fn format_volts(volts: f32) -> String {
    format!("{:.6}", volts as f64)
}

fn format_utc(ns: u64) -> String {
    let secs = (ns / 1_000_000_000) as i64;
    let nanos = (ns % 1_000_000_000) as u32;
    match DateTime::<Utc>::from_timestamp(secs, nanos) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        None => String::new(),
    }
}

/// Writes decoded runs as `time,CH1_V,CH2_V,CH3_V,CH4_V` rows
///
/// Successive runs are placed after each other on the relative time axis:
/// after each run the offset grows by `max_samples * dt`, with dt taken from
/// CH1 when it has at least two samples.
pub struct CsvExporter<W: Write> {
    writer: csv::Writer<W>,
    time_column: TimeColumn,
    offset_seconds: f64,
    summary: ExportSummary,
}

impl<W: Write> CsvExporter<W> {
    pub fn new(sink: W) -> Result<Self> {
        Self::with_time_column(sink, TimeColumn::Relative)
    }

    pub fn with_time_column(sink: W, time_column: TimeColumn) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(sink);
        writer.write_record([time_column.header(), "CH1_V", "CH2_V", "CH3_V", "CH4_V"])?;
        Ok(CsvExporter { writer, time_column, offset_seconds: 0.0, summary: ExportSummary::default() })
    }

    /// Relative time assigned to the next run's first sample
    pub fn offset_seconds(&self) -> f64 {
        self.offset_seconds
    }

    pub fn summary(&self) -> ExportSummary {
        self.summary
    }

    /// Append one run, returning the number of rows written.
    ///
    /// With [`TimeColumn::Utc`] a run without a sample interval is rejected
    /// before any row is written.
    pub fn write_run(&mut self, run: &DecodedRun) -> Result<u64> {
        let rows = run.max_samples();
        let ch1 = run.channel(Channel::CH1);

        let utc_dt_ps = match (self.time_column, run.dt_ps) {
            (TimeColumn::Utc, Some(dt_ps)) if dt_ps > 0 => Some(dt_ps as u64),
            (TimeColumn::Utc, _) => {
                return Err(WaveLogError::MissingTimebase { start_time_ns: run.start_time_ns });
            }
            (TimeColumn::Relative, _) => None,
        };

        let mut record: [String; 5] = Default::default();
        for i in 0..rows {
            record[0] = match utc_dt_ps {
                Some(dt_ps) => format_utc(run.start_time_ns + (i as u64 * dt_ps) / 1000),
                None => {
                    let t = match ch1 {
                        Some(ch) if i < ch.len() => ch.time(i),
                        _ => i as f64 * FALLBACK_DT_SECONDS,
                    };
                    format_time(self.offset_seconds + t)
                }
            };
            for channel in Channel::all() {
                let cell = &mut record[channel.number() as usize];
                cell.clear();
                if let Some(v) = run.channel(channel).and_then(|ch| ch.volts.get(i)) {
                    cell.push_str(&format_volts(*v));
                }
            }
            self.writer.write_record(&record)?;
        }

        let dt = match ch1 {
            Some(ch) if ch.len() > 1 => ch.time(1),
            _ => FALLBACK_DT_SECONDS,
        };
        self.offset_seconds += rows as f64 * dt;
        self.summary.runs += 1;
        self.summary.rows += rows as u64;
        Ok(rows as u64)
    }

    /// Flush and return the underlying sink
    pub fn finish(self) -> Result<W> {
        self.writer.into_inner().map_err(|e| e.into_error().into())
    }
}

fn write_atomically<F>(path: &Path, time_column: TimeColumn, body: F) -> Result<ExportSummary>
where
    F: FnOnce(&mut CsvExporter<&mut NamedTempFile>) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    let summary = {
        let mut exporter = CsvExporter::with_time_column(&mut tmp, time_column)?;
        body(&mut exporter)?;
        let summary = exporter.summary();
        exporter.finish()?;
        summary
    };
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(summary)
}

/// Export one selected run to `path`.
///
/// The run is selected and decoded before anything is created on disk, and
/// the CSV only appears at `path` once completely written.
pub fn export_run<R: ReadSeek>(
    reader: &mut WaveLogReader<R>,
    selector: RunSelector,
    path: impl AsRef<Path>,
    time_column: TimeColumn,
) -> Result<ExportSummary> {
    let run = reader.decode(selector)?;
    info!(
        "Exporting run t0={} ({} channels, {} samples) to {}",
        run.start_time_ns,
        run.channels().count(),
        run.max_samples(),
        path.as_ref().display()
    );
    write_atomically(path.as_ref(), time_column, |exporter| exporter.write_run(&run).map(|_| ()))
}

/// Export every complete run, concatenated on one time axis
pub fn export_all<R: ReadSeek>(
    reader: &mut WaveLogReader<R>,
    path: impl AsRef<Path>,
    time_column: TimeColumn,
) -> Result<ExportSummary> {
    let runs = reader.runs().to_vec();
    if runs.is_empty() {
        return Err(WaveLogError::NoRuns);
    }
    info!("Exporting {} runs to {}", runs.len(), path.as_ref().display());
    write_atomically(path.as_ref(), time_column, |exporter| {
        for run in &runs {
            let decoded = reader.decode_run(run)?;
            exporter.write_run(&decoded)?;
        }
        Ok(())
    })
}
