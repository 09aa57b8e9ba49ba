// src/reader/mod.rs
pub mod decode;
pub mod index;
mod streaming;
mod sync_reader;
pub mod tail;

pub use decode::{decode_channel, decode_run, envelope, DecodeWarning, DecodedChannel, DecodedRun, Envelope};
pub use index::{detect_layout, index_runs, probe_layout, IndexStop, Run, RunIndex, RunIndexer};
pub use streaming::SampleStream;
pub use sync_reader::{ReadSeek, RunSelector, WaveLogReader};
pub use tail::{spawn_follower, LogFollower, TailEvent, TailHandle};
