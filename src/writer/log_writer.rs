// src/writer/log_writer.rs
use crate::error::{WaveLogError, Result};
use crate::reader::{index_runs, probe_layout, IndexStop};
use crate::segment::{HeaderLayout, SegmentHeader, SegmentInfo};
use log::{debug, warn};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Append-only writer for the binary run log
///
/// Records are only ever appended. [`WaveLogWriter::flush`] pushes buffered
/// bytes to the OS and syncs file data so a crash loses at most the record in
/// flight.
pub struct WaveLogWriter {
    file: BufWriter<File>,
    layout: HeaderLayout,
    /// Set when appending to a log whose records already fix the layout
    layout_fixed: bool,
    position: u64,
    segments_written: u64,
}

impl WaveLogWriter {
    const BUFFER_SIZE: usize = 1024 * 1024;

    /// Create (or truncate) a log file
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        debug!("Created log {}", path.as_ref().display());
        Ok(Self::from_file(file, 0))
    }

    /// Open a log for appending, creating it if missing.
    ///
    /// Existing content is indexed first and its header layout is kept for
    /// the new records. A log that does not end on a complete record, such
    /// as one left by a crashed session, is refused with
    /// [`WaveLogError::CorruptSegment`] at the first incomplete offset and is
    /// not modified.
    pub fn append(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let position = file.metadata()?.len();
        let existing = if position > 0 { Some(Self::check_tail(path, position)?) } else { None };

        let mut writer = Self::from_file(file, position);
        if let Some(layout) = existing {
            writer.layout = layout;
            writer.layout_fixed = true;
        }
        debug!("Appending to log {} at offset {} ({:?} headers)", path.display(), position, writer.layout);
        Ok(writer)
    }

    /// Like [`WaveLogWriter::append`], but a non-empty log must already use
    /// `layout`
    pub fn append_with_layout(path: impl AsRef<Path>, layout: HeaderLayout) -> Result<Self> {
        let writer = Self::append(path.as_ref())?;
        if writer.layout_fixed && writer.layout != layout {
            return Err(WaveLogError::Config(format!(
                "{} uses {:?} headers, cannot append {:?} records",
                path.as_ref().display(),
                writer.layout,
                layout
            )));
        }
        Ok(writer.with_layout(layout))
    }

    /// Layout of an existing log that ends on a complete record
    fn check_tail(path: &Path, len: u64) -> Result<HeaderLayout> {
        let mut reader = BufReader::with_capacity(65536, File::open(path)?);
        let layout = probe_layout(&mut reader, len)?.ok_or_else(|| WaveLogError::CorruptSegment {
            offset: 0,
            reason: format!("first record of {} is incomplete; refusing to append", path.display()),
        })?;

        let index = index_runs(&mut reader, len, layout)?;
        if index.stop != IndexStop::EndOfFile {
            return Err(WaveLogError::CorruptSegment {
                offset: index.end_offset,
                reason: format!(
                    "{} does not end on a complete record ({:?}, {} of {} bytes indexed); \
                     truncate it to {} bytes before appending",
                    path.display(),
                    index.stop,
                    index.end_offset,
                    len,
                    index.end_offset
                ),
            });
        }
        Ok(layout)
    }

    fn from_file(file: File, position: u64) -> Self {
        WaveLogWriter {
            file: BufWriter::with_capacity(Self::BUFFER_SIZE, file),
            layout: HeaderLayout::Packed,
            layout_fixed: false,
            position,
            segments_written: 0,
        }
    }

    /// Write headers in the given layout (default [`HeaderLayout::Packed`]).
    ///
    /// A writer appending to a non-empty log keeps that log's layout.
    pub fn with_layout(mut self, layout: HeaderLayout) -> Self {
        if self.layout_fixed && layout != self.layout {
            warn!("Log already uses {:?} headers; ignoring {:?}", self.layout, layout);
            return self;
        }
        self.layout = layout;
        self
    }

    pub fn layout(&self) -> HeaderLayout {
        self.layout
    }

    /// Write a header and return a sink that accepts exactly
    /// `header.sample_count` payload bytes
    pub fn begin_segment(&mut self, header: &SegmentHeader) -> Result<SegmentWriter<'_>> {
        let offset = self.position;
        let encoded = header.encode_with(self.layout);
        self.file.write_all(&encoded)?;
        self.position += encoded.len() as u64;

        let layout = self.layout;
        Ok(SegmentWriter {
            writer: self,
            info: SegmentInfo { offset, header: *header, layout },
            written: 0,
        })
    }

    /// Write a complete header + payload record
    pub fn write_segment(&mut self, header: &SegmentHeader, payload: &[u8]) -> Result<SegmentInfo> {
        let mut segment = self.begin_segment(header)?;
        segment.write_all(payload)?;
        segment.finish()
    }

    /// Flush buffered bytes and sync file data to storage
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_data()?;
        Ok(())
    }

    /// Logical end-of-log offset including buffered bytes
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn segments_written(&self) -> u64 {
        self.segments_written
    }

    /// Returns the current size of the file on disk
    pub fn file_size(&mut self) -> Result<u64> {
        self.file.flush()?;
        Ok(self.file.get_ref().metadata()?.len())
    }
}

/// Payload sink for one channel segment
pub struct SegmentWriter<'a> {
    writer: &'a mut WaveLogWriter,
    info: SegmentInfo,
    written: u64,
}

impl SegmentWriter<'_> {
    pub fn remaining(&self) -> u64 {
        self.info.header.payload_len() - self.written
    }

    /// Finish the record, checking the payload length matches the header
    pub fn finish(self) -> Result<SegmentInfo> {
        let expected = self.info.header.payload_len();
        if self.written != expected {
            return Err(WaveLogError::BlockSize {
                expected: expected as usize,
                actual: self.written as usize,
            });
        }
        self.writer.segments_written += 1;
        Ok(self.info)
    }
}

impl Write for SegmentWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if buf.len() as u64 > self.remaining() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "payload overrun: {} bytes offered, {} remaining",
                    buf.len(),
                    self.remaining()
                ),
            ));
        }
        let n = self.writer.file.write(buf)?;
        self.written += n as u64;
        self.writer.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.file.flush()
    }
}
