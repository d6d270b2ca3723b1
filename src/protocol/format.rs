//! Audio format lookup tables
//!
//! Sample-rate index table, PCM data types and the sub-protocol / codec
//! identifiers carried in the packed header bytes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sample rates addressed by the 5-bit index, in wire order.
pub const SAMPLE_RATES: [u32; 21] = [
    6000, 12000, 24000, 48000, 96000, 192000, 384000, // 0-6
    8000, 16000, 32000, 64000, 128000, 256000, 512000, // 7-13
    11025, 22050, 44100, 88200, 176400, 352800, 705600, // 14-20
];

/// Index of a sample rate in [`SAMPLE_RATES`]
///
/// Values 21-31 fit the 5-bit wire field but name no rate. The
/// [`SampleRateIndex::UNDEFINED`] sentinel is the first of those, one past
/// the last defined rate, and is what [`SampleRateIndex::from_hz`] returns
/// for rates not in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleRateIndex(u8);

impl SampleRateIndex {
    /// Highest index with a defined rate
    pub const MAX_DEFINED: u8 = 20;

    /// Sentinel for "no such rate"
    pub const UNDEFINED: SampleRateIndex = SampleRateIndex(Self::MAX_DEFINED + 1);

    /// Wrap a raw index. Anything above 31 collapses to [`Self::UNDEFINED`].
    pub const fn new(index: u8) -> Self {
        if index > 31 {
            Self::UNDEFINED
        } else {
            Self(index)
        }
    }

    /// Look up the index for an exact rate; no nearest-rate fallback
    pub fn from_hz(hz: u32) -> Self {
        SAMPLE_RATES
            .iter()
            .position(|&rate| rate == hz)
            .map(|i| Self(i as u8))
            .unwrap_or(Self::UNDEFINED)
    }

    /// Rate in Hz, or 0 for reserved/undefined indices
    pub fn hz(self) -> u32 {
        SAMPLE_RATES.get(self.0 as usize).copied().unwrap_or(0)
    }

    /// Raw index value
    pub const fn index(self) -> u8 {
        self.0
    }

    /// Whether the index names one of the 21 defined rates
    pub const fn is_defined(self) -> bool {
        self.0 <= Self::MAX_DEFINED
    }

    /// Whether the index can be packed into the 5-bit wire field
    pub const fn fits_wire(self) -> bool {
        self.0 <= 31
    }
}

impl fmt::Display for SampleRateIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hz() {
            0 => write!(f, "undefined(#{})", self.0),
            hz => write!(f, "{} Hz", hz),
        }
    }
}

/// PCM sample encodings (3-bit field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Unsigned 8-bit, 128 = silence
    U8,
    I16,
    /// Signed 24-bit stored in 3 bytes
    I24,
    I32,
    F32,
    F64,
    /// Packed 12-bit, not supported by the size table
    I12,
    /// Packed 10-bit, not supported by the size table
    I10,
}

impl DataType {
    /// Decode from the low three bits of the format byte
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => DataType::U8,
            1 => DataType::I16,
            2 => DataType::I24,
            3 => DataType::I32,
            4 => DataType::F32,
            5 => DataType::F64,
            6 => DataType::I12,
            _ => DataType::I10,
        }
    }

    /// Wire value (0-7)
    pub fn bits(self) -> u8 {
        match self {
            DataType::U8 => 0,
            DataType::I16 => 1,
            DataType::I24 => 2,
            DataType::I32 => 3,
            DataType::F32 => 4,
            DataType::F64 => 5,
            DataType::I12 => 6,
            DataType::I10 => 7,
        }
    }

    /// Bytes per sample component. Packed types report 0 and cannot be processed.
    pub fn sample_size(self) -> usize {
        match self {
            DataType::U8 => 1,
            DataType::I16 => 2,
            DataType::I24 => 3,
            DataType::I32 | DataType::F32 => 4,
            DataType::F64 => 8,
            DataType::I12 | DataType::I10 => 0,
        }
    }

    /// Bit depth of one sample component
    pub fn bit_depth(self) -> u8 {
        match self {
            DataType::U8 => 8,
            DataType::I16 => 16,
            DataType::I24 => 24,
            DataType::I32 | DataType::F32 => 32,
            DataType::F64 => 64,
            DataType::I12 => 12,
            DataType::I10 => 10,
        }
    }

    pub fn is_supported(self) -> bool {
        self.sample_size() != 0
    }
}

/// Payload interpretation (3-bit field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubProtocol {
    Audio,
    Serial,
    Text,
    Service,
    Reserved(u8),
}

impl SubProtocol {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => SubProtocol::Audio,
            1 => SubProtocol::Serial,
            2 => SubProtocol::Text,
            3 => SubProtocol::Service,
            other => SubProtocol::Reserved(other),
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            SubProtocol::Audio => 0,
            SubProtocol::Serial => 1,
            SubProtocol::Text => 2,
            SubProtocol::Service => 3,
            SubProtocol::Reserved(bits) => bits & 0x07,
        }
    }
}

/// Payload encoding within the audio sub-protocol (4-bit field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    Pcm,
    Other(u8),
}

impl Codec {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x0F {
            0 => Codec::Pcm,
            other => Codec::Other(other),
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            Codec::Pcm => 0,
            Codec::Other(bits) => bits & 0x0F,
        }
    }
}

/// Format of an audio stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub sample_rate: SampleRateIndex,
    /// 1-256
    pub channels: u16,
    pub data_type: DataType,
}

impl AudioFormat {
    pub fn new(sample_rate: SampleRateIndex, channels: u16, data_type: DataType) -> Self {
        Self {
            sample_rate,
            channels,
            data_type,
        }
    }

    /// Build from a rate in Hz. The index is [`SampleRateIndex::UNDEFINED`]
    /// when the rate is not in the table.
    pub fn from_hz(hz: u32, channels: u16, data_type: DataType) -> Self {
        Self::new(SampleRateIndex::from_hz(hz), channels, data_type)
    }

    /// Sample rate in Hz (0 if undefined)
    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate.hz()
    }

    /// Bytes of one interleaved frame (all channels), 0 for packed types
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * self.data_type.sample_size()
    }

    /// Expected payload length for `samples` frames
    pub fn payload_len(&self, samples: usize) -> usize {
        samples * self.frame_bytes()
    }

    /// Whether the format can be carried end to end
    pub fn is_supported(&self) -> bool {
        self.sample_rate.is_defined()
            && (1..=256).contains(&self.channels)
            && self.data_type.is_supported()
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {} ch, {:?}",
            self.sample_rate, self.channels, self.data_type
        )
    }
}
