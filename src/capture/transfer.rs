// src/capture/transfer.rs
use crate::error::{WaveLogError, Result};
use crate::instrument::{scpi, Instrument};
use log::trace;
use std::io::Write;

/// Default per-request ceiling for DS1000Z byte-format reads
pub const DEFAULT_CHUNK_SIZE: u32 = 250_000;

/// Inclusive, 1-based range of waveform memory points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: u32,
    pub stop: u32,
}

impl Window {
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u32 {
        self.stop - self.start + 1
    }
}

/// Iterator over consecutive windows covering `[1, total]`
#[derive(Debug, Clone)]
pub struct Windows {
    next_start: u64,
    total: u64,
    chunk: u64,
}

impl Iterator for Windows {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        if self.chunk == 0 || self.next_start > self.total {
            return None;
        }
        let start = self.next_start;
        let stop = (start + self.chunk - 1).min(self.total);
        self.next_start = stop + 1;
        Some(Window { start: start as u32, stop: stop as u32 })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.chunk == 0 || self.next_start > self.total {
            return (0, Some(0));
        }
        let remaining = self.total - self.next_start + 1;
        let n = remaining.div_ceil(self.chunk) as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Windows {}

/// Partition `[1, total]` into windows of at most `chunk` points.
///
/// Yields `ceil(total / chunk)` windows; none when `total` or `chunk` is 0.
pub fn windows(total: u32, chunk: u32) -> Windows {
    Windows { next_start: 1, total: total as u64, chunk: chunk as u64 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferStats {
    pub windows: usize,
    pub bytes: u64,
}

/// Read `total` points of the selected waveform source in bounded blocks and
/// append them to `sink`.
///
/// Each window sets `:WAV:STAR`/`:WAV:STOP` and reads one `:WAV:DATA?`
/// block, which must be exactly the window length. The first failure aborts
/// the transfer.
pub fn transfer_channel<I, W>(instrument: &mut I, sink: &mut W, total: u32, chunk: u32) -> Result<TransferStats>
where
    I: Instrument + ?Sized,
    W: Write + ?Sized,
{
    if chunk == 0 {
        return Err(WaveLogError::Config("chunk size must be greater than zero".to_string()));
    }

    let mut stats = TransferStats::default();
    for window in windows(total, chunk) {
        instrument.write(&scpi::waveform_start(window.start))?;
        instrument.write(&scpi::waveform_stop(window.stop))?;

        let block = instrument.query_binary_values(scpi::WAVEFORM_DATA)?;
        if block.len() != window.len() as usize {
            return Err(WaveLogError::BlockSize {
                expected: window.len() as usize,
                actual: block.len(),
            });
        }
        sink.write_all(&block)?;

        stats.windows += 1;
        stats.bytes += block.len() as u64;
        trace!(
            "Window {}..={} ({:.0}% of {} points)",
            window.start,
            window.stop,
            100.0 * window.stop as f64 / total as f64,
            total
        );
    }

    Ok(stats)
}
