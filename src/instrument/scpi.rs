// src/instrument/scpi.rs
//! Rigol DS1000Z command strings used by the capture protocol.

use crate::error::{WaveLogError, Result};
use crate::types::Channel;

pub const RUN: &str = ":RUN";
pub const SINGLE: &str = ":SING";
pub const STOP: &str = ":STOP";
pub const TRIGGER_STATUS: &str = ":TRIG:STAT?";
pub const FORCE_TRIGGER: &str = ":TFOR";

pub const WAVEFORM_MODE_RAW: &str = ":WAV:MODE RAW";
pub const WAVEFORM_POINTS_MODE_RAW: &str = ":WAV:POIN:MODE RAW";
pub const WAVEFORM_FORMAT_BYTE: &str = ":WAV:FORM BYTE";
pub const WAVEFORM_BYTE_ORDER_LSBF: &str = ":WAV:BYTE LSBF";
pub const WAVEFORM_PREAMBLE: &str = ":WAV:PRE?";
pub const WAVEFORM_DATA: &str = ":WAV:DATA?";

/// Commands that put the scope into full-memory byte readout
pub const RAW_READ_MODE: [&str; 4] = [
    WAVEFORM_MODE_RAW,
    WAVEFORM_POINTS_MODE_RAW,
    WAVEFORM_FORMAT_BYTE,
    WAVEFORM_BYTE_ORDER_LSBF,
];

pub fn waveform_source(channel: Channel) -> String {
    format!(":WAV:SOUR {}", channel.scpi_source())
}

pub fn waveform_start(index: u32) -> String {
    format!(":WAV:STAR {}", index)
}

pub fn waveform_stop(index: u32) -> String {
    format!(":WAV:STOP {}", index)
}

pub fn memory_depth(points: u64) -> String {
    format!(":ACQ:MDEP {}", points)
}

pub fn time_scale(seconds_per_div: f64) -> String {
    format!(":TIM:SCAL {:e}", seconds_per_div)
}

pub fn acquire_type(kind: &str) -> String {
    format!(":ACQ:TYPE {}", kind)
}

pub fn channel_display(channel: Channel, on: bool) -> String {
    format!(":{}:DISP {}", channel.scpi_source(), if on { "ON" } else { "OFF" })
}

/// Parse the `#<d><len>` prefix of an IEEE-488.2 definite-length block.
///
/// Returns `Ok(None)` while more prefix bytes are needed, otherwise the
/// prefix length and the declared payload length.
pub fn parse_block_prefix(buf: &[u8]) -> Result<Option<(usize, usize)>> {
    if buf.is_empty() {
        return Ok(None);
    }
    if buf[0] != b'#' {
        return Err(WaveLogError::Instrument(format!(
            "bad IEEE block header: expected '#', found {:#04x}",
            buf[0]
        )));
    }
    if buf.len() < 2 {
        return Ok(None);
    }

    let digits = (buf[1] as char)
        .to_digit(10)
        .ok_or_else(|| WaveLogError::Instrument("bad IEEE block length digit".to_string()))?
        as usize;
    if digits == 0 {
        return Err(WaveLogError::Unsupported("indefinite-length IEEE blocks".to_string()));
    }
    if buf.len() < 2 + digits {
        return Ok(None);
    }

    let len_str = std::str::from_utf8(&buf[2..2 + digits])
        .map_err(|_| WaveLogError::Instrument("non-ASCII IEEE block length".to_string()))?;
    let len = len_str
        .parse::<usize>()
        .map_err(|_| WaveLogError::Instrument(format!("bad IEEE block length {:?}", len_str)))?;

    Ok(Some((2 + digits, len)))
}

/// Wrap a payload as an IEEE-488.2 definite-length block
pub fn encode_block(payload: &[u8]) -> Vec<u8> {
    let len = payload.len().to_string();
    let mut out = Vec::with_capacity(2 + len.len() + payload.len());
    out.push(b'#');
    out.push(b'0' + len.len() as u8);
    out.extend_from_slice(len.as_bytes());
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_formatting() {
        assert_eq!(waveform_source(Channel::CH3), ":WAV:SOUR CHAN3");
        assert_eq!(waveform_start(250_001), ":WAV:STAR 250001");
        assert_eq!(waveform_stop(500_000), ":WAV:STOP 500000");
        assert_eq!(memory_depth(12_000_000), ":ACQ:MDEP 12000000");
        assert_eq!(channel_display(Channel::CH2, false), ":CHAN2:DISP OFF");
    }

    #[test]
    fn test_block_prefix() {
        assert_eq!(parse_block_prefix(b"").unwrap(), None);
        assert_eq!(parse_block_prefix(b"#9").unwrap(), None);
        assert_eq!(parse_block_prefix(b"#9000250000").unwrap(), Some((11, 250_000)));
        assert_eq!(parse_block_prefix(b"#3100abc").unwrap(), Some((5, 100)));
        assert!(parse_block_prefix(b"X").is_err());
        assert!(parse_block_prefix(b"#0").is_err());
    }

    #[test]
    fn test_encode_block() {
        let block = encode_block(&[1, 2, 3]);
        assert_eq!(block, b"#13\x01\x02\x03");
        let (prefix, len) = parse_block_prefix(&block).unwrap().unwrap();
        assert_eq!(&block[prefix..prefix + len], &[1, 2, 3]);
    }
}
