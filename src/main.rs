//! # wavelog
//!
//! Command-line front end for capturing oscilloscope runs and converting the
//! resulting binary log.
//!
//! ## Usage
//!
//! ```bash
//! # Capture 10 runs of CH1 and CH2 from a LAN scope
//! wavelog capture --output capture.bin --address 192.168.1.50 --runs 10 --channels 1,2
//!
//! # Inspect and export
//! wavelog list capture.bin
//! wavelog export capture.bin capture.csv --run -1
//! wavelog export-all capture.bin all_runs.csv
//!
//! # Follow a log that is still being written
//! wavelog tail capture.bin
//! ```

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::{Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;

use wavelog::capture::{CaptureSession, SessionConfig};
use wavelog::config::CaptureConfig;
use wavelog::export::{convert_dir, export_all, export_run, TimeColumn};
use wavelog::instrument::{Instrument, SimulatedScope, SimulatedWaveform, TcpInstrument};
use wavelog::reader::{spawn_follower, IndexStop, LogFollower, RunSelector, TailEvent, WaveLogReader};
use wavelog::types::Channel;
use wavelog::writer::WaveLogWriter;

/// wavelog - oscilloscope waveform capture and binary log conversion
#[derive(Parser)]
#[command(name = "wavelog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture triggered runs into a binary log
    Capture {
        /// Output log path
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// TOML configuration file
        #[arg(short, long, value_name = "TOML")]
        config: Option<PathBuf>,

        /// Number of runs (0 captures until interrupted)
        #[arg(short, long)]
        runs: Option<u64>,

        /// Channels to capture, e.g. 1,2
        #[arg(long, value_delimiter = ',')]
        channels: Option<Vec<u8>>,

        /// Maximum points per waveform block request
        #[arg(long)]
        chunk_size: Option<u32>,

        /// Instrument address as host or host:port
        #[arg(short, long, conflicts_with = "simulate")]
        address: Option<String>,

        /// Use a built-in simulated scope instead of real hardware
        #[arg(long)]
        simulate: bool,

        /// Append to an existing log instead of truncating it
        #[arg(long)]
        append: bool,
    },

    /// List the complete runs in a log
    List {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Export one run to CSV
    Export {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output CSV path (defaults to the input with a .csv extension)
        #[arg(value_name = "OUTPUT")]
        output: Option<PathBuf>,

        /// Run index; negative values count from the last run
        #[arg(long, default_value = "-1", allow_negative_numbers = true)]
        run: i64,

        /// Write absolute UTC timestamps instead of relative seconds
        #[arg(long)]
        utc: bool,
    },

    /// Export every run to one CSV with a continuous time axis
    ExportAll {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(value_name = "OUTPUT")]
        output: Option<PathBuf>,

        #[arg(long)]
        utc: bool,
    },

    /// Convert every .bin log in a directory
    ConvertDir {
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Output directory for CSV files
        #[arg(long, default_value = "CSV")]
        out: PathBuf,

        #[arg(long, default_value = "-1", allow_negative_numbers = true)]
        run: i64,
    },

    /// Follow a log while it is being written
    Tail {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Poll interval in milliseconds
        #[arg(long, default_value = "200")]
        interval_ms: u64,

        /// Print a min/max envelope of the newest samples instead of run events
        #[arg(long)]
        envelope: bool,

        /// Samples covered by the envelope
        #[arg(long, default_value = "2000000")]
        window: usize,

        /// Envelope bins
        #[arg(long, default_value = "2048")]
        bins: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Capture { output, config, runs, channels, chunk_size, address, simulate, append } => {
            run_capture(CaptureArgs { output, config, runs, channels, chunk_size, address, simulate, append })
        }
        Commands::List { file } => run_list(&file),
        Commands::Export { file, output, run, utc } => {
            let output = output.unwrap_or_else(|| default_csv_path(&file));
            let mut reader = open_log(&file)?;
            let summary = export_run(&mut reader, RunSelector::Index(run), &output, time_column(utc))
                .with_context(|| format!("Failed to export run {} of {}", run, file.display()))?;
            println!("Wrote {} rows to {}", summary.rows, output.display());
            Ok(())
        }
        Commands::ExportAll { file, output, utc } => {
            let output = output.unwrap_or_else(|| default_csv_path(&file));
            let mut reader = open_log(&file)?;
            let summary = export_all(&mut reader, &output, time_column(utc))
                .with_context(|| format!("Failed to export {}", file.display()))?;
            println!("Wrote {} runs, {} rows to {}", summary.runs, summary.rows, output.display());
            Ok(())
        }
        Commands::ConvertDir { dir, out, run } => {
            let report = convert_dir(&dir, &out, RunSelector::Index(run), TimeColumn::Relative)
                .with_context(|| format!("Failed to convert {}", dir.display()))?;
            for converted in &report.converted {
                println!("{} -> {}", converted.input.display(), converted.output.display());
            }
            for (input, err) in &report.failed {
                eprintln!("FAILED {}: {}", input.display(), err);
            }
            if !report.is_success() {
                bail!("{} of {} logs failed", report.failed.len(), report.failed.len() + report.converted.len());
            }
            Ok(())
        }
        Commands::Tail { file, interval_ms, envelope, window, bins } => {
            let interval = Duration::from_millis(interval_ms);
            if envelope {
                run_tail_envelope(&file, interval, window, bins)
            } else {
                run_tail(&file, interval)
            }
        }
    }
}

struct CaptureArgs {
    output: PathBuf,
    config: Option<PathBuf>,
    runs: Option<u64>,
    channels: Option<Vec<u8>>,
    chunk_size: Option<u32>,
    address: Option<String>,
    simulate: bool,
    append: bool,
}

fn run_capture(args: CaptureArgs) -> Result<()> {
    let file_config = match &args.config {
        Some(path) => CaptureConfig::from_file(path)?,
        None => CaptureConfig::default(),
    };

    let mut session_config: SessionConfig = file_config.session_config()?;
    if let Some(runs) = args.runs {
        session_config.runs = if runs == 0 { None } else { Some(runs) };
    }
    if let Some(numbers) = &args.channels {
        session_config.channels =
            numbers.iter().map(|&n| Channel::new(n)).collect::<wavelog::Result<Vec<_>>>()?;
    }
    if let Some(chunk) = args.chunk_size {
        session_config.chunk_size = chunk;
    }

    let instrument: Box<dyn Instrument> = if args.simulate {
        Box::new(simulated_scope(&session_config.channels))
    } else {
        let address = args
            .address
            .clone()
            .or_else(|| file_config.instrument.address.clone())
            .context("No instrument address given (use --address, [instrument] address, or --simulate)")?;
        let address = with_default_port(&address);
        let timeout = file_config.instrument_timeout().unwrap_or(TcpInstrument::DEFAULT_TIMEOUT);
        info!("Connecting to {}", address);
        Box::new(
            TcpInstrument::connect_with_timeout(address.as_str(), timeout)
                .with_context(|| format!("Failed to connect to {}", address))?,
        )
    };

    let writer = match (args.append, file_config.output.layout) {
        (true, Some(name)) => WaveLogWriter::append_with_layout(&args.output, name.into()),
        (true, None) => WaveLogWriter::append(&args.output),
        (false, _) => WaveLogWriter::create(&args.output).map(|w| w.with_layout(file_config.layout())),
    }
    .with_context(|| format!("Failed to open {}", args.output.display()))?;

    let mut session = CaptureSession::new(instrument, writer, session_config)?;
    let summary = session
        .run()
        .with_context(|| format!("Capture aborted after {} complete runs", session.runs_done()))?;

    for run in &summary.runs {
        println!(
            "run {:>4}  t0 {}  {} ch  {} samples  {:.3} s",
            run.index,
            format_t0(run.start_time_ns),
            run.segments.len(),
            run.total_samples(),
            run.elapsed.as_secs_f64()
        );
    }
    println!("Captured {} runs to {}", summary.runs.len(), args.output.display());
    Ok(())
}

fn run_list(file: &Path) -> Result<()> {
    let reader = open_log(file)?;
    match reader.layout() {
        Some(layout) => println!("{}: {} complete runs ({:?} headers)", file.display(), reader.runs().len(), layout),
        None => println!("{}: no complete record yet", file.display()),
    }

    for (index, run) in reader.runs().iter().enumerate() {
        let channels: Vec<String> = run.channels().map(|(ch, _)| ch.to_string()).collect();
        let samples: u64 = run
            .channels()
            .filter_map(|(_, offset)| reader.segment_at(offset))
            .map(|s| s.header.payload_len())
            .sum();
        println!("{:>4}  {}  {:<15}  {} samples", index, format_t0(run.start_time_ns), channels.join(","), samples);
    }

    match reader.stop_reason() {
        IndexStop::EndOfFile => {}
        stop if stop.is_clean() => {
            println!("Trailing incomplete record at offset {} ({:?})", reader.end_offset(), stop)
        }
        stop => warn!("Indexing stopped at offset {}: {:?}", reader.end_offset(), stop),
    }
    Ok(())
}

fn run_tail(file: &Path, interval: Duration) -> Result<()> {
    let (handle, events) =
        spawn_follower(file, interval).with_context(|| format!("Failed to follow {}", file.display()))?;

    loop {
        match events.recv_timeout(Duration::from_secs(1)) {
            Ok(TailEvent::NewRun { index, start_time_ns }) => {
                println!("run {:>4}  t0 {}", index, format_t0(start_time_ns))
            }
            Ok(TailEvent::Segment { run_index, info }) => println!(
                "run {:>4}  {}  {} samples  dt {} ps",
                run_index, info.header.channel, info.header.sample_count, info.header.dt_ps
            ),
            Ok(TailEvent::Corrupt { offset, stop }) => warn!("Unreadable data at offset {}: {:?}", offset, stop),
            Err(RecvTimeoutError::Timeout) => {
                if !handle.is_running() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    handle.stop().context("Follower failed")?;
    Ok(())
}

fn run_tail_envelope(file: &Path, interval: Duration, window: usize, bins: usize) -> Result<()> {
    let mut follower = LogFollower::open(file).with_context(|| format!("Failed to follow {}", file.display()))?;
    loop {
        follower.poll()?;
        if let Some((header, env)) = follower.live_envelope(window, bins)? {
            let lo = env.min.iter().copied().fold(f32::INFINITY, f32::min);
            let hi = env.max.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let newest = env.start_index + (env.len() * env.step) as u64;
            println!(
                "{} t0 {}  samples {}/{}  min {:.4} V  max {:.4} V",
                header.channel,
                format_t0(header.start_time_ns),
                newest,
                header.sample_count,
                lo,
                hi
            );
        }
        std::thread::sleep(interval);
    }
}

fn open_log(file: &Path) -> Result<WaveLogReader<std::io::BufReader<std::fs::File>>> {
    WaveLogReader::open(file).with_context(|| format!("Failed to open {}", file.display()))
}

fn time_column(utc: bool) -> TimeColumn {
    if utc {
        TimeColumn::Utc
    } else {
        TimeColumn::Relative
    }
}

fn default_csv_path(file: &Path) -> PathBuf {
    file.with_extension("csv")
}

fn with_default_port(address: &str) -> String {
    if address.contains(':') {
        address.to_string()
    } else {
        format!("{}:{}", address, TcpInstrument::DEFAULT_PORT)
    }
}

fn format_t0(ns: u64) -> String {
    let secs = (ns / 1_000_000_000) as i64;
    let nanos = (ns % 1_000_000_000) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Micros, true))
        .unwrap_or_else(|| ns.to_string())
}

fn simulated_scope(channels: &[Channel]) -> SimulatedScope {
    let mut scope = SimulatedScope::new();
    for (i, &channel) in channels.iter().enumerate() {
        scope.set_waveform(channel, SimulatedWaveform::triangle(1_200_000, 1000 * (i + 1)));
    }
    scope
}
