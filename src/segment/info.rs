// src/segment/info.rs
use crate::segment::{HeaderLayout, SegmentHeader};

/// A complete channel segment located in a log file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentInfo {
    /// Byte offset of the header
    pub offset: u64,
    pub header: SegmentHeader,
    pub layout: HeaderLayout,
}

impl SegmentInfo {
    /// Byte offset of the first payload sample
    pub fn data_offset(&self) -> u64 {
        self.offset + self.layout.size() as u64
    }

    /// Byte offset one past the last payload sample
    pub fn end_offset(&self) -> u64 {
        self.data_offset() + self.header.payload_len()
    }
}
