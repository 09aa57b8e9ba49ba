// src/reader/streaming.rs
use crate::error::Result;
use crate::segment::SegmentInfo;
use std::io::{Read, Seek, SeekFrom};

/// Streaming reader for one channel segment
///
/// Reads the payload in bounded chunks instead of materializing a whole
/// 24 Mpt channel. The stream can be limited to the bytes actually present,
/// which lets a live tail plot a segment that is still being written.
///
/// # Example
///
/// ```no_run
/// use wavelog::reader::{SampleStream, WaveLogReader};
///
/// let mut reader = WaveLogReader::open("capture.bin").unwrap();
/// let segment = reader.segments()[0];
/// let mut stream = SampleStream::new(segment, 65536);
///
/// let mut peak = f32::MIN;
/// while let Some(chunk) = stream.next_volts(reader.inner_mut()).unwrap() {
///     peak = chunk.iter().copied().fold(peak, f32::max);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SampleStream {
    segment: SegmentInfo,
    chunk_size: usize,
    current_position: u64,
    available: u64,
}

impl SampleStream {
    /// Create a stream over the full payload
    ///
    /// # Arguments
    ///
    /// * `segment` - The segment to read from
    /// * `chunk_size` - Number of samples per chunk
    pub fn new(segment: SegmentInfo, chunk_size: usize) -> Self {
        SampleStream {
            available: segment.header.payload_len(),
            segment,
            chunk_size: chunk_size.max(1),
            current_position: 0,
        }
    }

    /// Limit the stream to the payload bytes present in a file of `file_len`
    pub fn limit_to_file_len(mut self, file_len: u64) -> Self {
        let present = file_len.saturating_sub(self.segment.data_offset());
        self.available = present.min(self.segment.header.payload_len());
        self
    }

    /// Read the next chunk of raw samples
    ///
    /// Returns `None` once all available samples were read
    pub fn next_raw<R: Read + Seek>(&mut self, reader: &mut R) -> Result<Option<Vec<u8>>> {
        if self.current_position >= self.available {
            return Ok(None);
        }

        let remaining = self.available - self.current_position;
        let read_count = remaining.min(self.chunk_size as u64) as usize;

        let mut chunk = vec![0u8; read_count];
        reader.seek(SeekFrom::Start(self.segment.data_offset() + self.current_position))?;
        reader.read_exact(&mut chunk)?;

        self.current_position += read_count as u64;
        Ok(Some(chunk))
    }

    /// Read the next chunk converted to volts
    pub fn next_volts<R: Read + Seek>(&mut self, reader: &mut R) -> Result<Option<Vec<f32>>> {
        let header = self.segment.header;
        Ok(self
            .next_raw(reader)?
            .map(|raw| raw.iter().map(|&b| header.to_volts(b)).collect()))
    }

    /// Reset the stream to the beginning
    pub fn reset(&mut self) {
        self.current_position = 0;
    }

    /// Get the current sample position
    pub fn position(&self) -> u64 {
        self.current_position
    }

    /// Seek to a specific sample position (clamped to the available samples)
    pub fn seek(&mut self, position: u64) {
        self.current_position = position.min(self.available);
    }

    /// Samples readable by this stream
    pub fn available(&self) -> u64 {
        self.available
    }

    /// Get progress as a fraction of the declared sample count (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        let total = self.segment.header.payload_len();
        if total == 0 {
            1.0
        } else {
            self.current_position as f64 / total as f64
        }
    }

    pub fn segment(&self) -> &SegmentInfo {
        &self.segment
    }
}
