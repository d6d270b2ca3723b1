//! VBAN wire protocol data model
//!
//! Header layout, bit-packed sub-fields and the sample-rate / data-type
//! lookup tables. Byte-level parsing lives in [`crate::codec`].

pub mod format;
pub mod header;

pub use format::{AudioFormat, Codec, DataType, SampleRateIndex, SubProtocol, SAMPLE_RATES};
pub use header::{
    PacketHeader, StreamName, HEADER_SIZE, MAGIC, MAX_PACKET_SIZE, MAX_PAYLOAD_SIZE,
    STREAM_NAME_LEN,
};
