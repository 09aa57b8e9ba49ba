// tests/integration_tests.rs
use wavelog::*;
use std::path::Path;

fn header(n: u32, t0: u64, channel: Channel) -> SegmentHeader {
    SegmentHeader::new(n, t0, 1000, 1.0e-9, 0.0, 0.0, 0.04, 0.0, 127.0, channel)
}

fn payload(n: u32, seed: u8) -> Vec<u8> {
    (0..n).map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed)).collect()
}

/// Run A: CH1 + CH2, 100 samples each. Run B: CH1 only, 50 samples.
fn write_two_runs(path: &Path) {
    let mut writer = WaveLogWriter::create(path).unwrap();
    writer.write_segment(&header(100, 1_000, Channel::CH1), &payload(100, 1)).unwrap();
    writer.write_segment(&header(100, 1_000, Channel::CH2), &payload(100, 2)).unwrap();
    writer.write_segment(&header(50, 2_000, Channel::CH1), &payload(50, 3)).unwrap();
    writer.flush().unwrap();
}

#[test]
fn test_two_runs_are_indexed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.bin");
    write_two_runs(&path);

    let reader = WaveLogReader::open(&path).unwrap();
    assert_eq!(reader.runs().len(), 2);
    assert_eq!(reader.runs()[0].len(), 2);
    assert_eq!(reader.runs()[1].len(), 1);
    assert_eq!(reader.runs()[0].start_time_ns, 1_000);
    assert_eq!(reader.runs()[1].start_time_ns, 2_000);
    assert_eq!(reader.stop_reason(), IndexStop::EndOfFile);
}

#[test]
fn test_export_single_channel_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.bin");
    let csv_path = dir.path().join("run_b.csv");
    write_two_runs(&path);

    let mut reader = WaveLogReader::open(&path).unwrap();
    let summary = export_run(&mut reader, RunSelector::Last, &csv_path, TimeColumn::Relative).unwrap();
    assert_eq!(summary.rows, 50);

    let mut csv = csv::Reader::from_path(&csv_path).unwrap();
    let headers = csv.headers().unwrap().clone();
    assert_eq!(headers.iter().collect::<Vec<_>>(), vec!["Time_s", "CH1_V", "CH2_V", "CH3_V", "CH4_V"]);

    let raw = payload(50, 3);
    let h = header(50, 2_000, Channel::CH1);
    let mut rows = 0;
    for (i, record) in csv.records().enumerate() {
        let record = record.unwrap();
        let expected = h.to_volts(raw[i]);
        let v: f32 = record[1].parse().unwrap();
        assert!((v - expected).abs() <= 1e-6, "row {i}: {v} vs {expected}");
        assert_eq!(&record[2], "");
        assert_eq!(&record[3], "");
        assert_eq!(&record[4], "");
        rows += 1;
    }
    assert_eq!(rows, 50);
}

#[test]
fn test_export_all_accumulates_time() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.bin");
    let csv_path = dir.path().join("all.csv");
    write_two_runs(&path);

    let mut reader = WaveLogReader::open(&path).unwrap();
    let summary = export_all(&mut reader, &csv_path, TimeColumn::Relative).unwrap();
    assert_eq!(summary.runs, 2);
    assert_eq!(summary.rows, 150);

    let mut csv = csv::Reader::from_path(&csv_path).unwrap();
    let times: Vec<f64> = csv.records().map(|r| r.unwrap()[0].parse().unwrap()).collect();
    assert_eq!(times.len(), 150);
    assert_eq!(times[0], 0.0);
    assert!((times[100] - 100.0 * 1e-9).abs() < 1e-15);
    assert!(times.windows(2).all(|w| w[0] <= w[1]));

    let text = std::fs::read_to_string(&csv_path).unwrap();
    let first_b = text.lines().nth(101).unwrap();
    assert!(first_b.starts_with("1.000000000000e-07,"));
}

#[test]
fn test_truncated_tail_is_excluded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.bin");
    write_two_runs(&path);
    let full = std::fs::read(&path).unwrap();

    // Cut inside run B's payload, then inside its header
    for cut in [full.len() - 1, 148 * 2 + 47, 148 * 2 + 10] {
        let truncated = dir.path().join(format!("cut_{cut}.bin"));
        std::fs::write(&truncated, &full[..cut]).unwrap();

        let mut reader = WaveLogReader::open(&truncated).unwrap();
        assert_eq!(reader.segments().len(), 2, "cut at {cut}");
        assert_eq!(reader.runs().len(), 1);
        assert_eq!(reader.runs()[0].len(), 2);
        assert_eq!(reader.end_offset(), 296);
        assert!(reader.stop_reason().is_clean());

        let run = reader.decode(RunSelector::Last).unwrap();
        assert_eq!(run.max_samples(), 100);
    }
}

#[test]
fn test_garbage_after_complete_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.bin");
    write_two_runs(&path);

    let mut bytes = std::fs::read(&path).unwrap();
    bytes.extend_from_slice(b"not a record header at all, just noise........");
    bytes.extend_from_slice(&header(10, 3_000, Channel::CH1).encode());
    bytes.extend_from_slice(&[0; 10]);
    std::fs::write(&path, &bytes).unwrap();

    let reader = WaveLogReader::open(&path).unwrap();
    assert_eq!(reader.runs().len(), 2);
    assert!(matches!(reader.stop_reason(), IndexStop::BadMagic { .. }));
}

#[test]
fn test_run_grouping_invariant() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.bin");
    {
        let mut writer = WaveLogWriter::create(&path).unwrap();
        for (t0, channels) in [(10u64, vec![1u8, 2, 3, 4]), (20, vec![2, 4]), (30, vec![1]), (40, vec![3, 4])] {
            for ch in channels {
                let ch = Channel::new(ch).unwrap();
                writer.write_segment(&header(16, t0, ch), &payload(16, ch.number())).unwrap();
            }
        }
        writer.flush().unwrap();
    }

    let mut reader = WaveLogReader::open(&path).unwrap();
    assert_eq!(reader.runs().len(), 4);
    let runs = reader.runs().to_vec();
    for run in &runs {
        let decoded = reader.decode_run(run).unwrap();
        for ch in decoded.channels() {
            assert_eq!(ch.header.start_time_ns, run.start_time_ns);
        }
        let mut seen: Vec<Channel> = run.channels().map(|(c, _)| c).collect();
        let before = seen.len();
        seen.dedup();
        assert_eq!(seen.len(), before);
    }
    assert_eq!(runs[1].channels().map(|(c, _)| c).collect::<Vec<_>>(), vec![Channel::CH2, Channel::CH4]);
}

#[test]
fn test_padded_headers_are_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.bin");
    {
        let mut writer = WaveLogWriter::create(&path).unwrap().with_layout(HeaderLayout::Padded);
        writer.write_segment(&header(20, 5, Channel::CH1), &payload(20, 0)).unwrap();
        writer.write_segment(&header(20, 5, Channel::CH2), &payload(20, 9)).unwrap();
        writer.flush().unwrap();
    }

    let mut reader = WaveLogReader::open(&path).unwrap();
    assert_eq!(reader.layout(), Some(HeaderLayout::Padded));
    assert_eq!(reader.runs().len(), 1);
    let run = reader.decode(RunSelector::Index(0)).unwrap();
    let ch2 = run.channel(Channel::CH2).unwrap();
    assert_eq!(ch2.raw, payload(20, 9));
}

#[cfg(feature = "mmap")]
#[test]
fn test_mmap_reader_matches_buffered() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.bin");
    write_two_runs(&path);

    let mut buffered = WaveLogReader::open(&path).unwrap();
    let mut mapped = WaveLogReader::open_mmap(&path).unwrap();
    assert_eq!(buffered.runs(), mapped.runs());
    assert_eq!(
        buffered.decode(RunSelector::Index(0)).unwrap(),
        mapped.decode(RunSelector::Index(0)).unwrap()
    );
}
