//! Packet header model
//!
//! ```text
//! offset  size  field
//!  0      4     magic "VBAN"
//!  4      1     [sub-protocol:3 | sample-rate index:5]
//!  5      1     samples per frame - 1
//!  6      1     channels - 1
//!  7      1     [codec:4 | reserved:1 | data type:3]
//!  8      16    stream name (NUL padded, not NUL terminated at full length)
//!  24     4     frame counter (little-endian)
//! ```

use std::fmt;

use super::format::{AudioFormat, Codec, DataType, SampleRateIndex, SubProtocol};
use crate::error::CodecError;

/// Magic as read little-endian from the first four bytes ("VBAN")
pub const MAGIC: u32 = 0x4E41_4256;
pub const MAGIC_BYTES: [u8; 4] = *b"VBAN";

pub const HEADER_SIZE: usize = 28;
pub const MAX_PAYLOAD_SIZE: usize = 1436;
pub const MAX_PACKET_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE;
pub const STREAM_NAME_LEN: usize = 16;

/// Maximum samples per frame and channels (stored minus one in a byte)
pub const MAX_SAMPLES_PER_FRAME: usize = 256;
pub const MAX_CHANNELS: usize = 256;

pub(crate) const SR_INDEX_MASK: u8 = 0x1F;
pub(crate) const SUB_PROTOCOL_MASK: u8 = 0xE0;
pub(crate) const SUB_PROTOCOL_SHIFT: u8 = 5;
pub(crate) const DATA_TYPE_MASK: u8 = 0x07;
pub(crate) const RESERVED_BIT_MASK: u8 = 0x08;
pub(crate) const CODEC_MASK: u8 = 0xF0;
pub(crate) const CODEC_SHIFT: u8 = 4;

/// Pack sample-rate index and sub-protocol into one byte
pub fn pack_sr_sub_protocol(sample_rate: SampleRateIndex, sub_protocol: SubProtocol) -> u8 {
    (sample_rate.index() & SR_INDEX_MASK)
        | ((sub_protocol.bits() << SUB_PROTOCOL_SHIFT) & SUB_PROTOCOL_MASK)
}

pub fn unpack_sr_sub_protocol(byte: u8) -> (SampleRateIndex, SubProtocol) {
    (
        SampleRateIndex::new(byte & SR_INDEX_MASK),
        SubProtocol::from_bits((byte & SUB_PROTOCOL_MASK) >> SUB_PROTOCOL_SHIFT),
    )
}

/// Pack data type, reserved bit and codec into one byte
pub fn pack_format_codec(data_type: DataType, reserved: bool, codec: Codec) -> u8 {
    let reserved = if reserved { RESERVED_BIT_MASK } else { 0 };
    (data_type.bits() & DATA_TYPE_MASK) | reserved | ((codec.bits() << CODEC_SHIFT) & CODEC_MASK)
}

pub fn unpack_format_codec(byte: u8) -> (DataType, bool, Codec) {
    (
        DataType::from_bits(byte & DATA_TYPE_MASK),
        byte & RESERVED_BIT_MASK != 0,
        Codec::from_bits((byte & CODEC_MASK) >> CODEC_SHIFT),
    )
}

/// Fixed 16-byte stream name field
///
/// Equality compares all 16 bytes, so `"a"` and `"a\0junk"` differ.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StreamName([u8; STREAM_NAME_LEN]);

impl StreamName {
    /// Truncate or zero-pad `name` into exactly 16 bytes
    pub fn new(name: &str) -> Self {
        let mut raw = [0u8; STREAM_NAME_LEN];
        let bytes = name.as_bytes();
        let len = bytes.len().min(STREAM_NAME_LEN);
        raw[..len].copy_from_slice(&bytes[..len]);
        Self(raw)
    }

    /// Like [`StreamName::new`] but refuses names longer than the field
    pub fn try_new(name: &str) -> Option<Self> {
        (name.len() <= STREAM_NAME_LEN).then(|| Self::new(name))
    }

    pub const fn from_wire(raw: [u8; STREAM_NAME_LEN]) -> Self {
        Self(raw)
    }

    pub const fn as_wire(&self) -> &[u8; STREAM_NAME_LEN] {
        &self.0
    }

    /// Bytes up to the first NUL, or all 16 when there is none
    pub fn as_bytes(&self) -> &[u8] {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(STREAM_NAME_LEN);
        &self.0[..end]
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }
}

impl fmt::Debug for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamName({:?})", self.to_string_lossy())
    }
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

/// Decoded packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub sample_rate: SampleRateIndex,
    pub sub_protocol: SubProtocol,
    /// 1-256
    pub samples_per_frame: u16,
    /// 1-256
    pub channels: u16,
    pub data_type: DataType,
    /// Must be clear for PCM
    pub reserved: bool,
    pub codec: Codec,
    pub stream_name: StreamName,
    /// Observational only, wraps
    pub frame_counter: u32,
}

impl PacketHeader {
    /// Header for a PCM audio packet
    pub fn audio(
        format: AudioFormat,
        samples_per_frame: usize,
        stream_name: StreamName,
        frame_counter: u32,
    ) -> Result<Self, CodecError> {
        if !(1..=MAX_SAMPLES_PER_FRAME).contains(&samples_per_frame) {
            return Err(CodecError::InvalidSampleCount(samples_per_frame));
        }
        if !(1..=MAX_CHANNELS).contains(&(format.channels as usize)) {
            return Err(CodecError::InvalidChannelCount(format.channels as usize));
        }
        if !format.sample_rate.is_defined() {
            return Err(CodecError::UnsupportedSampleRate(format.sample_rate.to_string()));
        }

        Ok(Self {
            sample_rate: format.sample_rate,
            sub_protocol: SubProtocol::Audio,
            samples_per_frame: samples_per_frame as u16,
            channels: format.channels,
            data_type: format.data_type,
            reserved: false,
            codec: Codec::Pcm,
            stream_name,
            frame_counter,
        })
    }

    pub fn format(&self) -> AudioFormat {
        AudioFormat::new(self.sample_rate, self.channels, self.data_type)
    }

    /// Audio sub-protocol carrying PCM
    pub fn is_pcm_audio(&self) -> bool {
        self.sub_protocol == SubProtocol::Audio && self.codec == Codec::Pcm
    }

    /// Payload length implied by the header (0 for packed data types)
    pub fn expected_payload_len(&self) -> usize {
        self.format().payload_len(self.samples_per_frame as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_matches_ascii() {
        assert_eq!(u32::from_le_bytes(MAGIC_BYTES), MAGIC);
        assert_eq!(MAX_PACKET_SIZE, 1464);
    }

    #[test]
    fn test_sr_sub_protocol_packing() {
        let byte = pack_sr_sub_protocol(SampleRateIndex::new(3), SubProtocol::Text);
        assert_eq!(byte, 0x43);
        assert_eq!(
            unpack_sr_sub_protocol(byte),
            (SampleRateIndex::new(3), SubProtocol::Text)
        );

        // High bit set must not sign-extend into the index
        let (idx, sub) = unpack_sr_sub_protocol(0xFF);
        assert_eq!(idx.index(), 31);
        assert_eq!(sub, SubProtocol::Reserved(7));
    }

    #[test]
    fn test_format_codec_packing() {
        let byte = pack_format_codec(DataType::F32, true, Codec::Other(0xF));
        assert_eq!(byte, 0xFC);
        assert_eq!(
            unpack_format_codec(byte),
            (DataType::F32, true, Codec::Other(0xF))
        );
        assert_eq!(pack_format_codec(DataType::I16, false, Codec::Pcm), 0x01);
    }

    #[test]
    fn test_stream_name_padding() {
        let name = StreamName::new("TestStream1");
        assert_eq!(&name.as_wire()[..11], b"TestStream1");
        assert!(name.as_wire()[11..].iter().all(|&b| b == 0));
        assert_eq!(name.len(), 11);
        assert_eq!(name.to_string(), "TestStream1");
    }

    #[test]
    fn test_stream_name_full_length_has_no_terminator() {
        let name = StreamName::new("ABCDEFGHIJKLMNOPQRS");
        assert_eq!(name.as_wire(), b"ABCDEFGHIJKLMNOP");
        assert_eq!(name.len(), 16);
        assert!(StreamName::try_new("ABCDEFGHIJKLMNOPQ").is_none());
        assert!(StreamName::try_new("ABCDEFGHIJKLMNOP").is_some());
    }

    #[test]
    fn test_stream_name_exact_comparison() {
        let mut raw = [0u8; 16];
        raw[..1].copy_from_slice(b"a");
        raw[2] = b'x';
        assert_ne!(StreamName::from_wire(raw), StreamName::new("a"));
        assert_eq!(StreamName::new("a"), StreamName::new("a"));
        assert_ne!(StreamName::new("A"), StreamName::new("a"));
    }

    #[test]
    fn test_audio_header_validation() {
        let format = AudioFormat::from_hz(48000, 2, DataType::I16);
        let header = PacketHeader::audio(format, 64, StreamName::new("s"), 7).unwrap();
        assert!(header.is_pcm_audio());
        assert_eq!(header.expected_payload_len(), 256);

        assert!(matches!(
            PacketHeader::audio(format, 0, StreamName::new("s"), 0),
            Err(CodecError::InvalidSampleCount(0))
        ));
        assert!(matches!(
            PacketHeader::audio(format, 257, StreamName::new("s"), 0),
            Err(CodecError::InvalidSampleCount(257))
        ));

        let undefined = AudioFormat::new(SampleRateIndex::UNDEFINED, 2, DataType::I16);
        assert!(PacketHeader::audio(undefined, 1, StreamName::new("s"), 0).is_err());
        let reserved = AudioFormat::new(SampleRateIndex::new(30), 2, DataType::I16);
        assert!(PacketHeader::audio(reserved, 1, StreamName::new("s"), 0).is_err());
    }
}
