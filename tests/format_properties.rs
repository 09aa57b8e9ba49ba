// tests/format_properties.rs
use proptest::prelude::*;
use std::io::Cursor;
use wavelog::reader::{decode_run, index_runs};
use wavelog::*;

fn channel_strategy() -> impl Strategy<Value = Channel> {
    (1u8..=4).prop_map(|n| Channel::new(n).unwrap())
}

prop_compose! {
    fn header_strategy()(
        sample_count in 0u32..=16_384,
        start_time_ns in any::<u64>(),
        dt_ps in any::<u32>(),
        floats in prop::array::uniform6(any::<f32>()),
        channel in channel_strategy(),
        version in any::<u16>(),
        flags in any::<u8>(),
    ) -> SegmentHeader {
        let mut h = SegmentHeader::new(
            sample_count, start_time_ns, dt_ps,
            floats[0], floats[1], floats[2], floats[3], floats[4], floats[5],
            channel,
        );
        h.version = version;
        h.flags = flags;
        h
    }
}

fn float_bits(h: &SegmentHeader) -> [u32; 6] {
    [
        h.x_increment.to_bits(),
        h.x_origin.to_bits(),
        h.x_reference.to_bits(),
        h.y_increment.to_bits(),
        h.y_origin.to_bits(),
        h.y_reference.to_bits(),
    ]
}

proptest! {
    #[test]
    fn header_fields_survive_encoding(h in header_strategy(), padded in any::<bool>()) {
        let layout = if padded { HeaderLayout::Padded } else { HeaderLayout::Packed };
        let bytes = h.encode_with(layout);
        prop_assert_eq!(bytes.len(), layout.size());

        let back = SegmentHeader::decode(&bytes).unwrap();
        prop_assert_eq!(back.sample_count, h.sample_count);
        prop_assert_eq!(back.start_time_ns, h.start_time_ns);
        prop_assert_eq!(back.dt_ps, h.dt_ps);
        prop_assert_eq!(back.version, h.version);
        prop_assert_eq!(back.flags, h.flags);
        prop_assert_eq!(back.channel, h.channel);
        prop_assert_eq!(float_bits(&back), float_bits(&h));
    }

    #[test]
    fn decoded_volts_follow_scaling(
        raw in prop::collection::vec(any::<u8>(), 1..512),
        y_increment in -1.0f32..1.0,
        y_origin in -10.0f32..10.0,
        y_reference in 0.0f32..255.0,
    ) {
        let header = SegmentHeader::new(
            raw.len() as u32, 42, 1000, 1e-9, 0.0, 0.0, y_increment, y_origin, y_reference, Channel::CH1,
        );
        let mut log = header.encode().to_vec();
        log.extend_from_slice(&raw);
        let len = log.len() as u64;
        let mut cursor = Cursor::new(log);

        let index = index_runs(&mut cursor, len, HeaderLayout::Packed).unwrap();
        prop_assert_eq!(index.runs.len(), 1);
        let run = decode_run(&mut cursor, &index.runs[0], HeaderLayout::Packed).unwrap();
        let ch1 = run.channel(Channel::CH1).unwrap();

        prop_assert_eq!(&ch1.raw, &raw);
        for (i, &r) in raw.iter().enumerate() {
            let expected = (r as f32 - y_reference - y_origin) * y_increment;
            prop_assert_eq!(ch1.volts[i].to_bits(), expected.to_bits());
        }
    }

    #[test]
    fn truncation_keeps_every_complete_record(
        lens in prop::collection::vec(0u32..300, 1..8),
        cut_fraction in 0.0f64..=1.0,
    ) {
        let mut log = Vec::new();
        let mut ends = Vec::new();
        for (i, &n) in lens.iter().enumerate() {
            let h = SegmentHeader::new(n, 1_000 + i as u64, 1000, 1e-9, 0.0, 0.0, 0.04, 0.0, 127.0, Channel::CH1);
            log.extend_from_slice(&h.encode());
            log.extend(std::iter::repeat(i as u8).take(n as usize));
            ends.push(log.len() as u64);
        }
        let cut = (log.len() as f64 * cut_fraction) as usize;
        log.truncate(cut);
        let cut = cut as u64;

        let index = index_runs(&mut Cursor::new(&log), cut, HeaderLayout::Packed).unwrap();
        let complete = ends.iter().filter(|&&end| end <= cut).count();
        prop_assert_eq!(index.segments.len(), complete);
        prop_assert_eq!(index.runs.len(), complete);
        prop_assert_eq!(index.end_offset, if complete == 0 { 0 } else { ends[complete - 1] });
        prop_assert!(index.stop.is_clean());
    }
}
