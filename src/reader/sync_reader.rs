// src/reader/sync_reader.rs
use crate::error::{WaveLogError, Result};
use crate::reader::decode::{decode_run, DecodedRun};
use crate::reader::index::{probe_layout, IndexStop, Run, RunIndexer};
use crate::segment::{HeaderLayout, SegmentInfo};
use log::debug;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

#[cfg(feature = "mmap")]
use memmap2::Mmap;
#[cfg(feature = "mmap")]
use std::io::Cursor;

/// Trait alias for Read + Seek
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Picks one run out of an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunSelector {
    /// Non-negative counts from the first run, negative from the end
    Index(i64),
    /// The most recently completed run
    #[default]
    Last,
}

impl RunSelector {
    /// Resolve to a position in a list of `available` runs
    pub fn resolve(self, available: usize) -> Result<usize> {
        if available == 0 {
            return Err(WaveLogError::NoRuns);
        }
        let index = match self {
            RunSelector::Last => -1,
            RunSelector::Index(i) => i,
        };
        let resolved = if index < 0 { available as i64 + index } else { index };
        if resolved < 0 || resolved >= available as i64 {
            return Err(WaveLogError::RunOutOfRange { index, available });
        }
        Ok(resolved as usize)
    }
}

impl From<i64> for RunSelector {
    fn from(index: i64) -> Self {
        RunSelector::Index(index)
    }
}

/// Reader for a binary run log, possibly still being appended to
///
/// Without an explicit layout nothing is indexed until the first record
/// settles whether headers are packed or padded; every
/// [`WaveLogReader::refresh`] retries layout detection until it does.
pub struct WaveLogReader<R: ReadSeek> {
    file: R,
    layout: Option<HeaderLayout>,
    indexer: Option<RunIndexer>,
    file_len: u64,
}

/// Constructor for standard file I/O
impl WaveLogReader<BufReader<File>> {
    /// Open a log, detecting the header layout from its first record
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        debug!("Opened log {}", path.as_ref().display());
        Self::from_reader(BufReader::with_capacity(65536, file))
    }

    pub fn open_with_layout(path: impl AsRef<Path>, layout: HeaderLayout) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader_with_layout(BufReader::with_capacity(65536, file), layout)
    }
}

/// Constructor for memory-mapped file I/O (requires "mmap" feature)
///
/// The map is a snapshot: [`WaveLogReader::refresh`] will not see bytes
/// appended after opening.
#[cfg(feature = "mmap")]
impl WaveLogReader<Cursor<Mmap>> {
    pub fn open_mmap(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        Self::from_reader(Cursor::new(mmap))
    }
}

impl<R: ReadSeek> WaveLogReader<R> {
    pub fn from_reader(file: R) -> Result<Self> {
        Self::build(file, None)
    }

    pub fn from_reader_with_layout(file: R, layout: HeaderLayout) -> Result<Self> {
        Self::build(file, Some(layout))
    }

    fn build(file: R, layout: Option<HeaderLayout>) -> Result<Self> {
        let mut reader = WaveLogReader { file, layout, indexer: None, file_len: 0 };
        reader.refresh()?;
        Ok(reader)
    }

    /// Re-read the current length and index any newly completed segments.
    ///
    /// Returns the number of segments added. A file that shrank is indexed
    /// again from the start, re-detecting its layout.
    pub fn refresh(&mut self) -> Result<usize> {
        let len = self.file.seek(SeekFrom::End(0))?;
        self.file_len = len;

        if self.indexer.as_ref().is_some_and(|indexer| len < indexer.offset()) {
            debug!("Log shrank to {} bytes; re-indexing", len);
            self.indexer = None;
        }
        if self.indexer.is_none() {
            let layout = match self.layout {
                Some(layout) => Some(layout),
                None => probe_layout(&mut self.file, len)?,
            };
            match layout {
                Some(layout) => {
                    debug!("Indexing with {:?} headers", layout);
                    self.indexer = Some(RunIndexer::new(layout));
                }
                None => return Ok(0),
            }
        }

        match self.indexer.as_mut() {
            Some(indexer) => indexer.scan(&mut self.file, len),
            None => Ok(0),
        }
    }

    /// Header layout in use, once the first record has settled it
    pub fn layout(&self) -> Option<HeaderLayout> {
        self.indexer.as_ref().map(RunIndexer::layout).or(self.layout)
    }

    pub fn runs(&self) -> &[Run] {
        self.indexer.as_ref().map(RunIndexer::runs).unwrap_or_default()
    }

    pub fn segments(&self) -> &[SegmentInfo] {
        self.indexer.as_ref().map(RunIndexer::segments).unwrap_or_default()
    }

    /// Segment whose header starts at `offset`
    pub fn segment_at(&self, offset: u64) -> Option<&SegmentInfo> {
        self.indexer.as_ref().and_then(|indexer| indexer.segment_at(offset))
    }

    /// Why indexing stopped at the last refresh
    pub fn stop_reason(&self) -> IndexStop {
        match &self.indexer {
            Some(indexer) => indexer.stop(),
            None if self.file_len == 0 => IndexStop::EndOfFile,
            None => IndexStop::LayoutPending { file_len: self.file_len },
        }
    }

    /// First byte not covered by a complete segment
    pub fn end_offset(&self) -> u64 {
        self.indexer.as_ref().map_or(0, RunIndexer::offset)
    }

    /// Length observed at the last refresh
    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    pub fn select(&self, selector: RunSelector) -> Result<&Run> {
        let runs = self.runs();
        let index = selector.resolve(runs.len())?;
        Ok(&runs[index])
    }

    /// Decode the selected run
    pub fn decode(&mut self, selector: RunSelector) -> Result<DecodedRun> {
        let run = self.select(selector)?.clone();
        self.decode_run(&run)
    }

    pub fn decode_run(&mut self, run: &Run) -> Result<DecodedRun> {
        let layout = self.layout().unwrap_or_default();
        decode_run(&mut self.file, run, layout)
    }

    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.file
    }
}
