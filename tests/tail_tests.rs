// tests/tail_tests.rs
use wavelog::reader::tail::{spawn_follower, TailEvent};
use wavelog::*;
use std::collections::HashSet;
use std::time::Duration;

fn header(n: u32, t0: u64, channel: Channel) -> SegmentHeader {
    SegmentHeader::new(n, t0, 1000, 1.0e-9, 0.0, 0.0, 0.04, 0.0, 127.0, channel)
}

#[test]
fn test_follower_sees_every_segment_of_live_capture() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("live.bin");
    let mut writer = WaveLogWriter::create(&path).unwrap();

    let (handle, events) = spawn_follower(&path, Duration::from_millis(5)).unwrap();

    let producer = std::thread::spawn(move || {
        for run in 0..5u64 {
            for ch in [Channel::CH1, Channel::CH3] {
                writer.write_segment(&header(4_096, 100 + run, ch), &vec![run as u8; 4_096]).unwrap();
                writer.flush().unwrap();
                std::thread::sleep(Duration::from_millis(2));
            }
        }
    });
    producer.join().unwrap();

    let mut runs = Vec::new();
    let mut offsets = HashSet::new();
    while offsets.len() < 10 {
        match events.recv_timeout(Duration::from_secs(5)).unwrap() {
            TailEvent::NewRun { index, start_time_ns } => runs.push((index, start_time_ns)),
            TailEvent::Segment { run_index, info } => {
                assert_eq!(info.header.start_time_ns, 100 + run_index as u64);
                assert!(offsets.insert(info.offset), "segment at {} reported twice", info.offset);
            }
            TailEvent::Corrupt { offset, stop } => panic!("unexpected corruption at {offset}: {stop:?}"),
        }
    }
    handle.stop().unwrap();

    assert_eq!(runs, (0..5).map(|i| (i, 100 + i as u64)).collect::<Vec<_>>());
    assert!(events.try_recv().is_err());
}

#[test]
fn test_follower_waits_for_payload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("live.bin");
    let record = {
        let mut bytes = header(64, 7, Channel::CH2).encode().to_vec();
        bytes.extend(std::iter::repeat(9u8).take(64));
        bytes
    };

    std::fs::write(&path, &record[..30]).unwrap();
    let mut follower = LogFollower::open(&path).unwrap();
    assert!(follower.poll().unwrap().is_empty());
    assert_eq!(follower.layout(), None);

    std::fs::write(&path, &record[..100]).unwrap();
    assert!(follower.poll().unwrap().is_empty());

    std::fs::write(&path, &record).unwrap();
    let events = follower.poll().unwrap();
    assert_eq!(follower.layout(), Some(HeaderLayout::Packed));
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], TailEvent::NewRun { index: 0, start_time_ns: 7 });

    // What the follower indexed must match a fresh reader
    let reader = WaveLogReader::open(&path).unwrap();
    assert_eq!(follower.indexer().unwrap().runs(), reader.runs());
}
