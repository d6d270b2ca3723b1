//! Packet encoder
//!
//! Mirror of the decoder: packs a header and appends the payload. The
//! stream name is written as exactly 16 bytes, with no terminator when the
//! name fills the field.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::CodecError;
use crate::protocol::header::{
    pack_format_codec, pack_sr_sub_protocol, HEADER_SIZE, MAGIC, MAX_PACKET_SIZE, MAX_PAYLOAD_SIZE,
};
use crate::protocol::{AudioFormat, PacketHeader, StreamName};

/// Append `header` and `payload` to `out`
pub fn encode_packet_into(
    header: &PacketHeader,
    payload: &[u8],
    out: &mut BytesMut,
) -> Result<(), CodecError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(CodecError::PayloadTooLarge(payload.len()));
    }
    if !(1..=256).contains(&header.samples_per_frame) {
        return Err(CodecError::InvalidSampleCount(header.samples_per_frame as usize));
    }
    if !(1..=256).contains(&header.channels) {
        return Err(CodecError::InvalidChannelCount(header.channels as usize));
    }
    if !header.sample_rate.fits_wire() {
        return Err(CodecError::UnsupportedSampleRate(header.sample_rate.to_string()));
    }

    out.reserve(HEADER_SIZE + payload.len());
    out.put_u32_le(MAGIC);
    out.put_u8(pack_sr_sub_protocol(header.sample_rate, header.sub_protocol));
    out.put_u8((header.samples_per_frame - 1) as u8);
    out.put_u8((header.channels - 1) as u8);
    out.put_u8(pack_format_codec(header.data_type, header.reserved, header.codec));
    out.put_slice(header.stream_name.as_wire());
    out.put_u32_le(header.frame_counter);
    out.put_slice(payload);
    Ok(())
}

/// Encode a complete packet
pub fn encode_packet(header: &PacketHeader, payload: &[u8]) -> Result<Bytes, CodecError> {
    let mut out = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    encode_packet_into(header, payload, &mut out)?;
    Ok(out.freeze())
}

/// Encode a PCM audio packet, deriving samples per frame from the payload length
pub fn encode_audio(
    format: &AudioFormat,
    payload: &[u8],
    stream_name: &str,
    frame_counter: u32,
) -> Result<Bytes, CodecError> {
    let samples = samples_in_payload(format, payload.len())?;
    let header = PacketHeader::audio(*format, samples, StreamName::new(stream_name), frame_counter)?;
    encode_packet(&header, payload)
}

/// Number of whole frames in `len` bytes of `format` audio
fn samples_in_payload(format: &AudioFormat, len: usize) -> Result<usize, CodecError> {
    let frame_bytes = format.frame_bytes();
    if frame_bytes == 0 {
        return Err(CodecError::UnsupportedDataType(format.data_type));
    }
    if len % frame_bytes != 0 {
        return Err(CodecError::PayloadNotFrameAligned { len, frame_bytes });
    }
    Ok(len / frame_bytes)
}

/// Stateful encoder for one outgoing stream
pub struct PacketEncoder {
    format: AudioFormat,
    stream_name: StreamName,
    /// Next frame counter to stamp
    frame_counter: u32,
    /// Encoding buffer (reused to avoid allocations)
    buffer: BytesMut,
    frames_encoded: u64,
    bytes_produced: u64,
}

impl PacketEncoder {
    /// Create an encoder for a fixed format and stream name
    pub fn new(format: AudioFormat, stream_name: &str) -> Result<Self, CodecError> {
        if !format.sample_rate.is_defined() {
            return Err(CodecError::UnsupportedSampleRate(format.sample_rate.to_string()));
        }
        if !format.data_type.is_supported() {
            return Err(CodecError::UnsupportedDataType(format.data_type));
        }
        if !(1..=256).contains(&format.channels) {
            return Err(CodecError::InvalidChannelCount(format.channels as usize));
        }

        Ok(Self {
            format,
            stream_name: StreamName::new(stream_name),
            frame_counter: 0,
            buffer: BytesMut::with_capacity(MAX_PACKET_SIZE),
            frames_encoded: 0,
            bytes_produced: 0,
        })
    }

    /// Encode `num_samples` frames of interleaved audio
    ///
    /// The payload must be exactly `num_samples * channels * sample size`
    /// bytes. The frame counter advances only on success.
    pub fn encode(&mut self, payload: &[u8], num_samples: usize) -> Result<Bytes, CodecError> {
        let expected = self.format.payload_len(num_samples);
        if payload.len() > MAX_PAYLOAD_SIZE || expected > MAX_PAYLOAD_SIZE {
            return Err(CodecError::PayloadTooLarge(payload.len().max(expected)));
        }
        if payload.len() != expected {
            return Err(CodecError::PayloadNotFrameAligned {
                len: payload.len(),
                frame_bytes: self.format.frame_bytes(),
            });
        }

        let header = PacketHeader::audio(
            self.format,
            num_samples,
            self.stream_name,
            self.frame_counter,
        )?;

        self.buffer.clear();
        encode_packet_into(&header, payload, &mut self.buffer)?;
        let packet = self.buffer.split().freeze();

        self.frame_counter = self.frame_counter.wrapping_add(1);
        self.frames_encoded += 1;
        self.bytes_produced += packet.len() as u64;
        Ok(packet)
    }

    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    pub fn stream_name(&self) -> &StreamName {
        &self.stream_name
    }

    /// Counter the next packet will carry
    pub fn frame_counter(&self) -> u32 {
        self.frame_counter
    }

    /// Largest sample count that fits one packet
    pub fn max_samples_per_packet(&self) -> usize {
        (MAX_PAYLOAD_SIZE / self.format.frame_bytes()).min(256)
    }

    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            frames_encoded: self.frames_encoded,
            bytes_produced: self.bytes_produced,
        }
    }
}

/// Encoder statistics
#[derive(Debug, Clone)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub bytes_produced: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode;
    use crate::protocol::{DataType, SampleRateIndex, SubProtocol};
    use proptest::prelude::*;

    #[test]
    fn test_encode_layout() {
        let format = AudioFormat::from_hz(44100, 2, DataType::I16);
        let packet = encode_audio(&format, &[1, 2, 3, 4], "Mic", 0x0102_0304).unwrap();

        assert_eq!(packet.len(), HEADER_SIZE + 4);
        assert_eq!(&packet[0..4], b"VBAN");
        assert_eq!(packet[4], 16); // audio, index 16
        assert_eq!(packet[5], 0); // one sample
        assert_eq!(packet[6], 1); // two channels
        assert_eq!(packet[7], 0x01);
        assert_eq!(&packet[8..11], b"Mic");
        assert!(packet[11..24].iter().all(|&b| b == 0));
        assert_eq!(&packet[24..28], &[4, 3, 2, 1]);
        assert_eq!(&packet[28..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_full_length_name_not_terminated() {
        let format = AudioFormat::from_hz(48000, 1, DataType::U8);
        let packet = encode_audio(&format, &[0x80], "0123456789ABCDEFXYZ", 0).unwrap();
        assert_eq!(&packet[8..24], b"0123456789ABCDEF");
        assert_eq!(packet[24..28], [0, 0, 0, 0]);
    }

    #[test]
    fn test_encode_rejects_bad_payloads() {
        let format = AudioFormat::from_hz(48000, 2, DataType::I16);
        assert!(matches!(
            encode_audio(&format, &[0; 3], "s", 0),
            Err(CodecError::PayloadNotFrameAligned { len: 3, frame_bytes: 4 })
        ));
        assert!(matches!(
            encode_audio(&format, &[], "s", 0),
            Err(CodecError::InvalidSampleCount(0))
        ));
        // 257 frames
        assert!(matches!(
            encode_audio(&AudioFormat::from_hz(48000, 1, DataType::U8), &[0; 257], "s", 0),
            Err(CodecError::InvalidSampleCount(257))
        ));
        let packed = AudioFormat::from_hz(48000, 2, DataType::I10);
        assert!(matches!(
            encode_audio(&packed, &[0; 4], "s", 0),
            Err(CodecError::UnsupportedDataType(DataType::I10))
        ));
    }

    #[test]
    fn test_encoder_counter_increments() {
        let format = AudioFormat::from_hz(48000, 1, DataType::I16);
        let mut encoder = PacketEncoder::new(format, "Out").unwrap();

        let first = encoder.encode(&[0; 8], 4).unwrap();
        let second = encoder.encode(&[0; 8], 4).unwrap();
        assert_eq!(decode(&first).unwrap().header.frame_counter, 0);
        assert_eq!(decode(&second).unwrap().header.frame_counter, 1);

        // A failed encode does not consume a counter value
        assert!(encoder.encode(&[0; 7], 4).is_err());
        assert_eq!(encoder.frame_counter(), 2);

        let stats = encoder.stats();
        assert_eq!(stats.frames_encoded, 2);
        assert_eq!(stats.bytes_produced, 2 * (HEADER_SIZE as u64 + 8));
    }

    #[test]
    fn test_encoder_rejects_unusable_formats() {
        let undefined = AudioFormat::new(SampleRateIndex::new(25), 1, DataType::I16);
        assert!(PacketEncoder::new(undefined, "s").is_err());
        let packed = AudioFormat::from_hz(48000, 1, DataType::I12);
        assert!(PacketEncoder::new(packed, "s").is_err());
        let no_channels = AudioFormat::from_hz(48000, 0, DataType::I16);
        assert!(PacketEncoder::new(no_channels, "s").is_err());
    }

    #[test]
    fn test_max_samples_per_packet() {
        let stereo_f32 = AudioFormat::from_hz(48000, 2, DataType::F32);
        let encoder = PacketEncoder::new(stereo_f32, "s").unwrap();
        assert_eq!(encoder.max_samples_per_packet(), 179);

        let mono_u8 = AudioFormat::from_hz(48000, 1, DataType::U8);
        let encoder = PacketEncoder::new(mono_u8, "s").unwrap();
        assert_eq!(encoder.max_samples_per_packet(), 256);
    }

    fn arb_header() -> impl Strategy<Value = PacketHeader> {
        (
            0u8..32,
            0u8..8,
            1u16..=256,
            1u16..=256,
            0u8..8,
            any::<bool>(),
            0u8..16,
            "[ -~]{0,16}",
            any::<u32>(),
        )
            .prop_map(
                |(sr, sub, samples, channels, dt, reserved, codec, name, counter)| PacketHeader {
                    sample_rate: SampleRateIndex::new(sr),
                    sub_protocol: SubProtocol::from_bits(sub),
                    samples_per_frame: samples,
                    channels,
                    data_type: DataType::from_bits(dt),
                    reserved,
                    codec: crate::protocol::Codec::from_bits(codec),
                    stream_name: StreamName::new(&name),
                    frame_counter: counter,
                },
            )
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(
            header in arb_header(),
            payload in proptest::collection::vec(any::<u8>(), 0..=MAX_PAYLOAD_SIZE),
        ) {
            let packet = encode_packet(&header, &payload).unwrap();
            let decoded = decode(&packet).unwrap();
            prop_assert_eq!(decoded.header, header);
            prop_assert_eq!(decoded.payload, &payload[..]);
        }
    }
}
