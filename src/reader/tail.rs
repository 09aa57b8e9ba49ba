// src/reader/tail.rs
use crate::error::{WaveLogError, Result};
use crate::reader::decode::{envelope, Envelope};
use crate::reader::index::{probe_layout, IndexStop, RunIndexer};
use crate::reader::streaming::SampleStream;
use crate::segment::{HeaderLayout, SegmentHeader, SegmentInfo};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, warn};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Progress observed on a growing log
#[derive(Debug, Clone, PartialEq)]
pub enum TailEvent {
    /// First segment with a new start time appeared
    NewRun { index: usize, start_time_ns: u64 },
    /// A channel segment became complete
    Segment { run_index: usize, info: SegmentInfo },
    /// Indexing hit bytes that are not a record; reported once per offset
    Corrupt { offset: u64, stop: IndexStop },
}

/// Incremental reader for a log another process is appending to
///
/// Each [`LogFollower::poll`] re-reads the file length and resumes indexing
/// from the last complete segment, so a record is only reported once its
/// payload is fully on disk.
pub struct LogFollower {
    path: PathBuf,
    file: BufReader<File>,
    layout: Option<HeaderLayout>,
    indexer: Option<RunIndexer>,
    reported_corrupt: Option<u64>,
}

impl LogFollower {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(LogFollower {
            path: path.as_ref().to_path_buf(),
            file: BufReader::with_capacity(65536, file),
            layout: None,
            indexer: None,
            reported_corrupt: None,
        })
    }

    /// Skip layout detection
    pub fn with_layout(mut self, layout: HeaderLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Layout in use, once known
    pub fn layout(&self) -> Option<HeaderLayout> {
        self.indexer.as_ref().map(RunIndexer::layout).or(self.layout)
    }

    pub fn indexer(&self) -> Option<&RunIndexer> {
        self.indexer.as_ref()
    }

    /// Index whatever became complete since the previous poll
    pub fn poll(&mut self) -> Result<Vec<TailEvent>> {
        let file_len = self.file.seek(SeekFrom::End(0))?;

        if self.indexer.is_none() {
            let layout = match self.layout {
                Some(layout) => Some(layout),
                None => probe_layout(&mut self.file, file_len)?,
            };
            match layout {
                Some(layout) => {
                    debug!("Following {} with {:?} headers", self.path.display(), layout);
                    self.indexer = Some(RunIndexer::new(layout));
                }
                None => return Ok(Vec::new()),
            }
        }

        let Some(indexer) = self.indexer.as_mut() else {
            return Ok(Vec::new());
        };
        if file_len < indexer.offset() {
            warn!("{} shrank to {} bytes; restarting", self.path.display(), file_len);
            *indexer = RunIndexer::new(indexer.layout());
            self.reported_corrupt = None;
        }

        let runs_before = indexer.runs().len();
        let segments_before = indexer.segments().len();
        indexer.scan(&mut self.file, file_len)?;

        let mut events = Vec::new();
        let mut announced = runs_before;
        for info in &indexer.segments()[segments_before..] {
            let run_index = indexer
                .runs()
                .iter()
                .rposition(|run| run.start_time_ns == info.header.start_time_ns)
                .unwrap_or(0);
            // Runs are contiguous, so a new run index is always the next one
            if run_index >= announced {
                events.push(TailEvent::NewRun { index: run_index, start_time_ns: info.header.start_time_ns });
                announced = run_index + 1;
            }
            events.push(TailEvent::Segment { run_index, info: *info });
        }

        let stop = indexer.stop();
        if !stop.is_clean() && self.reported_corrupt != Some(indexer.offset()) {
            self.reported_corrupt = Some(indexer.offset());
            events.push(TailEvent::Corrupt { offset: indexer.offset(), stop });
        }
        Ok(events)
    }

    /// Min/max envelope of the newest `window` samples of the segment being
    /// written (or the last complete one), for live plotting.
    ///
    /// Returns `None` until a header is present.
    pub fn live_envelope(&mut self, window: usize, bins: usize) -> Result<Option<(SegmentHeader, Envelope)>> {
        let file_len = self.file.seek(SeekFrom::End(0))?;
        let Some(indexer) = self.indexer.as_ref() else {
            return Ok(None);
        };
        let layout = indexer.layout();

        // Prefer the in-flight segment right after the last complete one
        let mut target = None;
        if file_len >= indexer.offset() + layout.size() as u64 {
            let mut buf = [0u8; SegmentHeader::SIZE];
            self.file.seek(SeekFrom::Start(indexer.offset()))?;
            self.file.read_exact(&mut buf)?;
            if let Ok(header) = SegmentHeader::decode(&buf) {
                target = Some(SegmentInfo { offset: indexer.offset(), header, layout });
            }
        }
        let Some(segment) = target.or_else(|| indexer.segments().last().copied()) else {
            return Ok(None);
        };

        let mut stream = SampleStream::new(segment, window.max(1)).limit_to_file_len(file_len);
        let available = stream.available();
        stream.seek(available.saturating_sub(window as u64));
        let volts = stream.next_volts(&mut self.file)?.unwrap_or_default();

        let mut env = envelope(&volts, window, bins);
        env.start_index += stream.position() - volts.len() as u64;
        Ok(Some((segment.header, env)))
    }
}

/// Handle to a background follower thread
pub struct TailHandle {
    stop_tx: Sender<()>,
    handle: Arc<Mutex<Option<JoinHandle<Result<()>>>>>,
}

impl TailHandle {
    /// Stop the follower and wait for it to exit
    pub fn stop(&self) -> Result<()> {
        let _ = self.stop_tx.try_send(());
        let handle = self.handle.lock().take();
        match handle {
            Some(handle) => join_follower(handle),
            None => Ok(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.lock().as_ref().map_or(false, |h| !h.is_finished())
    }
}

fn join_follower(handle: JoinHandle<Result<()>>) -> Result<()> {
    handle.join().map_err(|_| WaveLogError::FollowerPanicked)?
}

impl Drop for TailHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Follow `path` on a background thread, polling every `interval`.
///
/// Events arrive on the returned receiver. The thread exits when stopped,
/// when the receiver is dropped, or on a read error (returned by
/// [`TailHandle::stop`]).
pub fn spawn_follower(path: impl AsRef<Path>, interval: Duration) -> Result<(TailHandle, Receiver<TailEvent>)> {
    let mut follower = LogFollower::open(path)?;
    let (event_tx, event_rx) = unbounded();
    let (stop_tx, stop_rx) = bounded::<()>(1);

    let handle = thread::Builder::new()
        .name("wavelog-tail".to_string())
        .spawn(move || -> Result<()> {
            loop {
                for event in follower.poll()? {
                    if event_tx.send(event).is_err() {
                        return Ok(());
                    }
                }
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return Ok(()),
                }
            }
        })?;

    Ok((TailHandle { stop_tx, handle: Arc::new(Mutex::new(Some(handle))) }, event_rx))
}
