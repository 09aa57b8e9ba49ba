// src/segment/header.rs
use crate::types::Channel;
use byteorder::{ByteOrder, LittleEndian};
use bytes::{BufMut, BytesMut};
use std::fmt;

/// Header preceding every channel payload
///
/// Field layout (little-endian): magic `RGOL`, version `u16`, sample count
/// `u32`, start time ns `u64`, dt ps `u32`, XINC/XOR/XREF/YINC/YOR/YREF as
/// `f32`, channel `u8`, flags `u8`. The fields occupy exactly 48 bytes; see
/// [`HeaderLayout`] for the padded variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentHeader {
    pub version: u16,
    pub sample_count: u32,
    pub start_time_ns: u64,
    pub dt_ps: u32,
    pub x_increment: f32,
    pub x_origin: f32,
    pub x_reference: f32,
    pub y_increment: f32,
    pub y_origin: f32,
    pub y_reference: f32,
    pub channel: Channel,
    pub flags: u8,
}

/// On-disk header size variant
///
/// `Packed` is the native 48-byte header. `Padded` appends six zero bytes
/// (54 bytes total), which is what the `<4sH I Q I 6f B B 6x` struct layout of
/// the older capture scripts produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderLayout {
    #[default]
    Packed,
    Padded,
}

impl HeaderLayout {
    pub const fn size(&self) -> usize {
        match self {
            HeaderLayout::Packed => SegmentHeader::SIZE,
            HeaderLayout::Padded => SegmentHeader::SIZE + SegmentHeader::LEGACY_PADDING,
        }
    }
}

/// Why a header could not be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidHeader {
    /// Not enough bytes were available for a full header
    Truncated { available: usize },
    /// Leading four bytes are not the format tag
    BadMagic { found: [u8; 4] },
    /// Channel byte outside 1-4
    BadChannel { found: u8 },
}

impl fmt::Display for InvalidHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidHeader::Truncated { available } => {
                write!(f, "truncated header ({} bytes available)", available)
            }
            InvalidHeader::BadMagic { found } => {
                write!(f, "bad magic {:?}", String::from_utf8_lossy(found))
            }
            InvalidHeader::BadChannel { found } => write!(f, "bad channel byte {}", found),
        }
    }
}

impl std::error::Error for InvalidHeader {}

impl SegmentHeader {
    pub const SIZE: usize = 48;
    pub const MAGIC: &'static [u8; 4] = b"RGOL";
    pub const VERSION: u16 = 1;
    pub const LEGACY_PADDING: usize = 6;

    /// Build a version-1 header with zero flags.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sample_count: u32,
        start_time_ns: u64,
        dt_ps: u32,
        x_increment: f32,
        x_origin: f32,
        x_reference: f32,
        y_increment: f32,
        y_origin: f32,
        y_reference: f32,
        channel: Channel,
    ) -> Self {
        SegmentHeader {
            version: Self::VERSION,
            sample_count,
            start_time_ns,
            dt_ps,
            x_increment,
            x_origin,
            x_reference,
            y_increment,
            y_origin,
            y_reference,
            channel,
            flags: 0,
        }
    }

    /// Serialize to the native 48-byte layout
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        self.put(&mut buf);
        debug_assert_eq!(buf.len(), Self::SIZE);

        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(&buf);
        out
    }

    /// Serialize using the given layout
    pub fn encode_with(&self, layout: HeaderLayout) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(layout.size());
        self.put(&mut buf);
        if layout == HeaderLayout::Padded {
            buf.put_bytes(0, Self::LEGACY_PADDING);
        }
        buf.to_vec()
    }

    fn put(&self, buf: &mut BytesMut) {
        buf.put_slice(Self::MAGIC);
        buf.put_u16_le(self.version);
        buf.put_u32_le(self.sample_count);
        buf.put_u64_le(self.start_time_ns);
        buf.put_u32_le(self.dt_ps);
        buf.put_f32_le(self.x_increment);
        buf.put_f32_le(self.x_origin);
        buf.put_f32_le(self.x_reference);
        buf.put_f32_le(self.y_increment);
        buf.put_f32_le(self.y_origin);
        buf.put_f32_le(self.y_reference);
        buf.put_u8(self.channel.number());
        buf.put_u8(self.flags);
    }

    /// Parse a header from the first 48 bytes of `bytes`.
    ///
    /// Trailing bytes (padding or payload) are ignored.
    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, InvalidHeader> {
        if bytes.len() < Self::SIZE {
            return Err(InvalidHeader::Truncated { available: bytes.len() });
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        if &magic != Self::MAGIC {
            return Err(InvalidHeader::BadMagic { found: magic });
        }

        let channel = Channel::new(bytes[46])
            .map_err(|_| InvalidHeader::BadChannel { found: bytes[46] })?;

        Ok(SegmentHeader {
            version: LittleEndian::read_u16(&bytes[4..6]),
            sample_count: LittleEndian::read_u32(&bytes[6..10]),
            start_time_ns: LittleEndian::read_u64(&bytes[10..18]),
            dt_ps: LittleEndian::read_u32(&bytes[18..22]),
            x_increment: LittleEndian::read_f32(&bytes[22..26]),
            x_origin: LittleEndian::read_f32(&bytes[26..30]),
            x_reference: LittleEndian::read_f32(&bytes[30..34]),
            y_increment: LittleEndian::read_f32(&bytes[34..38]),
            y_origin: LittleEndian::read_f32(&bytes[38..42]),
            y_reference: LittleEndian::read_f32(&bytes[42..46]),
            channel,
            flags: bytes[47],
        })
    }

    /// Payload length in bytes (one byte per sample)
    pub fn payload_len(&self) -> u64 {
        self.sample_count as u64
    }

    pub fn dt_seconds(&self) -> f64 {
        self.dt_ps as f64 * 1e-12
    }

    /// Convert one raw sample to volts
    pub fn to_volts(&self, raw: u8) -> f32 {
        (raw as f32 - self.y_reference - self.y_origin) * self.y_increment
    }
}
