// src/reader/decode.rs
use crate::error::{WaveLogError, Result};
use crate::reader::index::Run;
use crate::segment::{HeaderLayout, SegmentHeader};
use crate::types::Channel;
use log::warn;
use std::io::{Read, Seek, SeekFrom};

/// Physical samples of one channel segment
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedChannel {
    pub header: SegmentHeader,
    pub raw: Vec<u8>,
    pub volts: Vec<f32>,
}

impl DecodedChannel {
    /// Convert a raw payload using the header's vertical scaling
    pub fn from_raw(header: SegmentHeader, raw: Vec<u8>) -> Self {
        let volts = raw.iter().map(|&b| header.to_volts(b)).collect();
        DecodedChannel { header, raw, volts }
    }

    pub fn channel(&self) -> Channel {
        self.header.channel
    }

    pub fn len(&self) -> usize {
        self.volts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volts.is_empty()
    }

    pub fn dt_seconds(&self) -> f64 {
        self.header.dt_seconds()
    }

    /// Seconds since the start of the run for sample `i`
    pub fn time(&self, i: usize) -> f64 {
        i as f64 * self.dt_seconds()
    }

    /// Absolute sample time in nanoseconds since the Unix epoch
    pub fn absolute_time_ns(&self, i: usize) -> u64 {
        self.header.start_time_ns + (i as u64 * self.header.dt_ps as u64) / 1000
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len()).map(move |i| self.time(i))
    }
}

/// Non-fatal data quality findings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeWarning {
    /// A channel's sample interval differs from the reference channel's
    DtMismatch {
        reference: Channel,
        reference_dt_ps: u32,
        channel: Channel,
        dt_ps: u32,
    },
}

/// All decoded channels of one run
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRun {
    pub start_time_ns: u64,
    channels: [Option<DecodedChannel>; Channel::COUNT],
    /// Shared sample interval, taken from the lowest present channel
    pub dt_ps: Option<u32>,
    pub warnings: Vec<DecodeWarning>,
}

impl DecodedRun {
    pub fn channel(&self, channel: Channel) -> Option<&DecodedChannel> {
        self.channels[channel.index()].as_ref()
    }

    /// Present channels in ascending order
    pub fn channels(&self) -> impl Iterator<Item = &DecodedChannel> {
        self.channels.iter().flatten()
    }

    /// Longest channel length in the run
    pub fn max_samples(&self) -> usize {
        self.channels().map(DecodedChannel::len).max().unwrap_or(0)
    }

    pub fn dt_seconds(&self) -> Option<f64> {
        self.dt_ps.map(|ps| ps as f64 * 1e-12)
    }
}

/// Read and convert the segment whose header starts at `offset`.
///
/// The header is re-validated; a segment that no longer decodes is reported
/// as [`WaveLogError::CorruptSegment`].
pub fn decode_channel<R: Read + Seek>(reader: &mut R, offset: u64, layout: HeaderLayout) -> Result<DecodedChannel> {
    let mut buf = [0u8; SegmentHeader::SIZE];
    reader.seek(SeekFrom::Start(offset))?;
    reader.read_exact(&mut buf)?;
    let header = SegmentHeader::decode(&buf).map_err(|e| WaveLogError::CorruptSegment {
        offset,
        reason: e.to_string(),
    })?;

    let mut raw = vec![0u8; header.sample_count as usize];
    reader.seek(SeekFrom::Start(offset + layout.size() as u64))?;
    reader.read_exact(&mut raw)?;
    Ok(DecodedChannel::from_raw(header, raw))
}

/// Decode every channel referenced by `run`.
///
/// Channels whose dt differs from the lowest channel's produce a
/// [`DecodeWarning::DtMismatch`]; decoding continues with the reference dt.
pub fn decode_run<R: Read + Seek>(reader: &mut R, run: &Run, layout: HeaderLayout) -> Result<DecodedRun> {
    let mut decoded = DecodedRun {
        start_time_ns: run.start_time_ns,
        channels: Default::default(),
        dt_ps: None,
        warnings: Vec::new(),
    };
    let mut reference: Option<(Channel, u32)> = None;

    for (channel, offset) in run.channels() {
        let ch = decode_channel(reader, offset, layout)?;
        let dt_ps = ch.header.dt_ps;
        match reference {
            None => reference = Some((channel, dt_ps)),
            Some((ref_channel, ref_dt)) if ref_dt != dt_ps => {
                warn!(
                    "Run t0={}: {} dt {} ps differs from {} dt {} ps; using {}",
                    run.start_time_ns, channel, dt_ps, ref_channel, ref_dt, ref_channel
                );
                decoded.warnings.push(DecodeWarning::DtMismatch {
                    reference: ref_channel,
                    reference_dt_ps: ref_dt,
                    channel,
                    dt_ps,
                });
            }
            Some(_) => {}
        }
        decoded.channels[channel.index()] = Some(ch);
    }

    decoded.dt_ps = reference.map(|(_, dt)| dt);
    Ok(decoded)
}

/// Min/max decimation of a trace for plotting
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Index of the first sample covered by bin 0
    pub start_index: u64,
    /// Samples per bin
    pub step: usize,
    pub min: Vec<f32>,
    pub max: Vec<f32>,
}

impl Envelope {
    pub fn len(&self) -> usize {
        self.min.len()
    }

    pub fn is_empty(&self) -> bool {
        self.min.is_empty()
    }

    /// Sample index at the centre of bin `i`
    pub fn center(&self, i: usize) -> f64 {
        self.start_index as f64 + (i as f64 + 0.5) * self.step as f64
    }
}

/// Reduce the last `window` samples of `volts` to at most `bins` min/max
/// pairs.
///
/// Each bin covers `max(1, n / bins)` samples where `n = min(window, len)`;
/// leading samples that do not fill a bin are dropped so the envelope ends at
/// the newest sample.
pub fn envelope(volts: &[f32], window: usize, bins: usize) -> Envelope {
    let n = window.min(volts.len());
    let step = (n / bins.max(1)).max(1);
    let used = (n / step) * step;
    let start = volts.len() - used;

    let (min, max) = volts[start..]
        .chunks_exact(step)
        .map(|bin| {
            bin.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
        })
        .unzip();

    Envelope { start_index: start as u64, step, min, max }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::index::index_runs;
    use std::io::Cursor;

    fn header(n: u32, t0: u64, dt_ps: u32, channel: Channel) -> SegmentHeader {
        SegmentHeader::new(n, t0, dt_ps, dt_ps as f32 * 1e-12, 0.0, 0.0, 0.04, 0.0, 127.0, channel)
    }

    fn log(segments: &[(SegmentHeader, Vec<u8>)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (h, payload) in segments {
            out.extend_from_slice(&h.encode());
            out.extend_from_slice(payload);
        }
        out
    }

    #[test]
    fn test_voltage_conversion() {
        let ch = DecodedChannel::from_raw(header(3, 0, 1000, Channel::CH1), vec![127, 152, 102]);
        assert_eq!(ch.volts[0], 0.0);
        assert_eq!(ch.volts[1], (152.0f32 - 127.0 - 0.0) * 0.04);
        assert_eq!(ch.volts[2], (102.0f32 - 127.0 - 0.0) * 0.04);
        assert!((ch.time(2) - 2e-9).abs() < 1e-21);
        assert_eq!(ch.absolute_time_ns(5), 5);
    }

    #[test]
    fn test_decode_run_with_gap() {
        let bytes = log(&[
            (header(4, 9, 1000, Channel::CH1), vec![127; 4]),
            (header(6, 9, 1000, Channel::CH3), vec![130; 6]),
        ]);
        let mut cursor = Cursor::new(&bytes);
        let idx = index_runs(&mut cursor, bytes.len() as u64, HeaderLayout::Packed).unwrap();
        let run = decode_run(&mut cursor, &idx.runs[0], HeaderLayout::Packed).unwrap();

        assert_eq!(run.start_time_ns, 9);
        assert!(run.channel(Channel::CH2).is_none());
        assert_eq!(run.channel(Channel::CH3).map(|c| c.len()), Some(6));
        assert_eq!(run.max_samples(), 6);
        assert_eq!(run.dt_ps, Some(1000));
        assert!(run.warnings.is_empty());
        assert_eq!(run.channels().count(), 2);
    }

    #[test]
    fn test_dt_mismatch_is_warning() {
        let bytes = log(&[
            (header(4, 1, 1000, Channel::CH2), vec![127; 4]),
            (header(4, 1, 2000, Channel::CH4), vec![127; 4]),
        ]);
        let mut cursor = Cursor::new(&bytes);
        let idx = index_runs(&mut cursor, bytes.len() as u64, HeaderLayout::Packed).unwrap();
        let run = decode_run(&mut cursor, &idx.runs[0], HeaderLayout::Packed).unwrap();

        assert_eq!(run.dt_ps, Some(1000));
        assert_eq!(
            run.warnings,
            vec![DecodeWarning::DtMismatch {
                reference: Channel::CH2,
                reference_dt_ps: 1000,
                channel: Channel::CH4,
                dt_ps: 2000,
            }]
        );
    }

    #[test]
    fn test_corrupt_segment_reported() {
        let bytes = vec![0u8; 64];
        let err = decode_channel(&mut Cursor::new(&bytes), 0, HeaderLayout::Packed).unwrap_err();
        assert!(matches!(err, WaveLogError::CorruptSegment { offset: 0, .. }));
    }

    #[test]
    fn test_envelope_bins() {
        let volts: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let env = envelope(&volts, 10, 3);
        assert_eq!(env.step, 3);
        assert_eq!(env.start_index, 1);
        assert_eq!(env.min, vec![1.0, 4.0, 7.0]);
        assert_eq!(env.max, vec![3.0, 6.0, 9.0]);
        assert_eq!(env.center(0), 2.5);
    }

    #[test]
    fn test_envelope_window_and_small_inputs() {
        let volts: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let env = envelope(&volts, 20, 2048);
        assert_eq!(env.step, 1);
        assert_eq!(env.len(), 20);
        assert_eq!(env.start_index, 80);
        assert_eq!(env.min[0], 80.0);

        let empty = envelope(&[], 100, 10);
        assert!(empty.is_empty());
        assert_eq!(empty.step, 1);
    }
}
