// src/reader/index.rs
use crate::error::Result;
use crate::segment::{HeaderLayout, InvalidHeader, SegmentHeader, SegmentInfo};
use crate::types::Channel;
use log::{debug, warn};
use smallvec::SmallVec;
use std::io::{Read, Seek, SeekFrom};

/// One triggered acquisition: channel segments sharing a start time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub start_time_ns: u64,
    /// Channel → header offset, ascending by channel
    channels: SmallVec<[(Channel, u64); 4]>,
}

impl Run {
    pub fn new(start_time_ns: u64) -> Self {
        Run { start_time_ns, channels: SmallVec::new() }
    }

    /// Record a channel's header offset, returning the offset it replaced
    pub fn insert(&mut self, channel: Channel, offset: u64) -> Option<u64> {
        match self.channels.binary_search_by_key(&channel, |(c, _)| *c) {
            Ok(pos) => Some(std::mem::replace(&mut self.channels[pos].1, offset)),
            Err(pos) => {
                self.channels.insert(pos, (channel, offset));
                None
            }
        }
    }

    pub fn offset(&self, channel: Channel) -> Option<u64> {
        self.channels
            .binary_search_by_key(&channel, |(c, _)| *c)
            .ok()
            .map(|pos| self.channels[pos].1)
    }

    pub fn contains(&self, channel: Channel) -> bool {
        self.offset(channel).is_some()
    }

    /// `(channel, header offset)` pairs in ascending channel order
    pub fn channels(&self) -> impl Iterator<Item = (Channel, u64)> + '_ {
        self.channels.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Why indexing stopped at [`RunIndexer::offset`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStop {
    /// Every byte was consumed by complete records
    EndOfFile,
    /// Fewer bytes than a header remain
    TruncatedHeader { available: usize },
    /// Bytes at the offset are not a record header
    BadMagic { found: [u8; 4] },
    BadChannel { found: u8 },
    /// Header present but its payload extends past the end of the file
    PartialPayload { expected_end: u64, file_len: u64 },
    /// The first record is not yet complete enough to tell its header layout
    LayoutPending { file_len: u64 },
}

impl IndexStop {
    /// Whether the stop is consistent with a writer still appending
    pub fn is_clean(&self) -> bool {
        matches!(
            self,
            IndexStop::EndOfFile
                | IndexStop::TruncatedHeader { .. }
                | IndexStop::PartialPayload { .. }
                | IndexStop::LayoutPending { .. }
        )
    }
}

/// Incremental scanner that groups complete segments into runs
///
/// Scanning resumes where the previous call stopped, so a file that is still
/// growing can be re-scanned cheaply. Every header is validated against the
/// file length passed to that scan.
#[derive(Debug, Clone)]
pub struct RunIndexer {
    layout: HeaderLayout,
    offset: u64,
    runs: Vec<Run>,
    segments: Vec<SegmentInfo>,
    stop: IndexStop,
}

impl RunIndexer {
    pub fn new(layout: HeaderLayout) -> Self {
        RunIndexer {
            layout,
            offset: 0,
            runs: Vec::new(),
            segments: Vec::new(),
            stop: IndexStop::EndOfFile,
        }
    }

    pub fn layout(&self) -> HeaderLayout {
        self.layout
    }

    /// First byte not covered by a complete segment
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn segments(&self) -> &[SegmentInfo] {
        &self.segments
    }

    pub fn stop(&self) -> IndexStop {
        self.stop
    }

    /// Segment whose header starts at `offset`
    pub fn segment_at(&self, offset: u64) -> Option<&SegmentInfo> {
        self.segments
            .binary_search_by_key(&offset, |s| s.offset)
            .ok()
            .map(|pos| &self.segments[pos])
    }

    /// Index complete segments between the current offset and `file_len`.
    ///
    /// Returns the number of segments added. Invalid or partial records end
    /// the scan and are reported through [`RunIndexer::stop`], never as an
    /// error; only read failures are errors.
    pub fn scan<R: Read + Seek>(&mut self, reader: &mut R, file_len: u64) -> Result<usize> {
        let header_size = self.layout.size() as u64;
        let mut added = 0;
        let mut buf = [0u8; SegmentHeader::SIZE];

        loop {
            if self.offset >= file_len {
                self.stop = IndexStop::EndOfFile;
                break;
            }
            let available = file_len - self.offset;
            if available < header_size {
                self.stop = IndexStop::TruncatedHeader { available: available as usize };
                break;
            }

            reader.seek(SeekFrom::Start(self.offset))?;
            reader.read_exact(&mut buf)?;
            let header = match SegmentHeader::decode(&buf) {
                Ok(header) => header,
                Err(invalid) => {
                    self.stop = match invalid {
                        InvalidHeader::Truncated { available } => IndexStop::TruncatedHeader { available },
                        InvalidHeader::BadMagic { found } => IndexStop::BadMagic { found },
                        InvalidHeader::BadChannel { found } => IndexStop::BadChannel { found },
                    };
                    warn!("Indexing stopped at offset {}: {}", self.offset, invalid);
                    break;
                }
            };

            let data_end = self.offset + header_size + header.payload_len();
            if data_end > file_len {
                self.stop = IndexStop::PartialPayload { expected_end: data_end, file_len };
                debug!(
                    "Segment at offset {} incomplete ({} of {} payload bytes)",
                    self.offset,
                    file_len - self.offset - header_size,
                    header.payload_len()
                );
                break;
            }

            let info = SegmentInfo { offset: self.offset, header, layout: self.layout };
            self.push(info);
            self.offset = data_end;
            added += 1;
        }

        Ok(added)
    }

    fn push(&mut self, info: SegmentInfo) {
        let t0 = info.header.start_time_ns;
        let new_run = self.runs.last().map_or(true, |run| run.start_time_ns != t0);
        if new_run {
            self.runs.push(Run::new(t0));
        }
        if let Some(run) = self.runs.last_mut() {
            if let Some(previous) = run.insert(info.header.channel, info.offset) {
                warn!(
                    "Run t0={} has {} twice (offsets {} and {}); keeping the later one",
                    t0, info.header.channel, previous, info.offset
                );
            }
        }
        self.segments.push(info);
    }
}

/// Complete runs found in a log snapshot
#[derive(Debug, Clone)]
pub struct RunIndex {
    pub runs: Vec<Run>,
    pub segments: Vec<SegmentInfo>,
    /// First byte not covered by a complete segment
    pub end_offset: u64,
    pub stop: IndexStop,
}

/// Index a log of `file_len` bytes from the start
pub fn index_runs<R: Read + Seek>(reader: &mut R, file_len: u64, layout: HeaderLayout) -> Result<RunIndex> {
    let mut indexer = RunIndexer::new(layout);
    indexer.scan(reader, file_len)?;
    Ok(RunIndex {
        end_offset: indexer.offset,
        stop: indexer.stop,
        runs: indexer.runs,
        segments: indexer.segments,
    })
}

/// Guess the header layout from the first record.
///
/// Falls back to [`HeaderLayout::Packed`] when the file is too short to tell.
pub fn detect_layout<R: Read + Seek>(reader: &mut R, file_len: u64) -> Result<HeaderLayout> {
    Ok(probe_layout(reader, file_len)?.unwrap_or_default())
}

/// Decide the header layout if the first record settles it.
///
/// A layout matches when the first record ends exactly at end of file or is
/// followed by another record tag. Returns `None` when neither layout can be
/// confirmed yet, e.g. while the first payload is still being written. Once
/// both candidate record ends are followed by non-record bytes the answer is
/// [`HeaderLayout::Packed`].
pub fn probe_layout<R: Read + Seek>(reader: &mut R, file_len: u64) -> Result<Option<HeaderLayout>> {
    if file_len < SegmentHeader::SIZE as u64 {
        return Ok(None);
    }
    let mut buf = [0u8; SegmentHeader::SIZE];
    reader.seek(SeekFrom::Start(0))?;
    reader.read_exact(&mut buf)?;
    let header = match SegmentHeader::decode(&buf) {
        Ok(header) => header,
        Err(_) => return Ok(Some(HeaderLayout::Packed)),
    };

    let mut pending = false;
    for layout in [HeaderLayout::Packed, HeaderLayout::Padded] {
        let next = layout.size() as u64 + header.payload_len();
        if next == file_len {
            return Ok(Some(layout));
        }
        if next + 4 <= file_len {
            let mut tag = [0u8; 4];
            reader.seek(SeekFrom::Start(next))?;
            reader.read_exact(&mut tag)?;
            if &tag == SegmentHeader::MAGIC {
                return Ok(Some(layout));
            }
        } else {
            pending = true;
        }
    }
    // Neither layout is followed by a record: the data after the first
    // record is corrupt, and the indexer reports it as such
    Ok(if pending { None } else { Some(HeaderLayout::Packed) })
}
