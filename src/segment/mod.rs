// src/segment/mod.rs
mod header;
mod info;

pub use header::{HeaderLayout, InvalidHeader, SegmentHeader};
pub use info::SegmentInfo;
