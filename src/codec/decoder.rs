//! Packet decoder
//!
//! Validates raw datagrams and splits them into header and payload. Every
//! field access is preceded by a length check, so malformed input is
//! rejected rather than read out of bounds.

use std::collections::HashMap;

use crate::error::CodecError;
use crate::protocol::header::{
    unpack_format_codec, unpack_sr_sub_protocol, HEADER_SIZE, MAGIC, MAX_PAYLOAD_SIZE,
    STREAM_NAME_LEN,
};
use crate::protocol::{PacketHeader, StreamName};

/// A decoded packet borrowing its payload from the datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet<'a> {
    pub header: PacketHeader,
    pub payload: &'a [u8],
}

impl<'a> Packet<'a> {
    /// Whether the payload length matches what the header advertises
    pub fn payload_matches_format(&self) -> bool {
        self.payload.len() == self.header.expected_payload_len()
    }
}

/// Decode one datagram
pub fn decode(datagram: &[u8]) -> Result<Packet<'_>, CodecError> {
    if datagram.len() < HEADER_SIZE {
        return Err(CodecError::TooShort {
            len: datagram.len(),
        });
    }
    let (head, payload) = datagram.split_at(HEADER_SIZE);

    let magic = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);
    if magic != MAGIC {
        return Err(CodecError::BadMagic(magic));
    }
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(CodecError::PayloadTooLarge(payload.len()));
    }

    let (sample_rate, sub_protocol) = unpack_sr_sub_protocol(head[4]);
    let (data_type, reserved, codec) = unpack_format_codec(head[7]);

    let mut name = [0u8; STREAM_NAME_LEN];
    name.copy_from_slice(&head[8..8 + STREAM_NAME_LEN]);

    let frame_counter = u32::from_le_bytes([head[24], head[25], head[26], head[27]]);

    Ok(Packet {
        header: PacketHeader {
            sample_rate,
            sub_protocol,
            samples_per_frame: head[5] as u16 + 1,
            channels: head[6] as u16 + 1,
            data_type,
            reserved,
            codec,
            stream_name: StreamName::from_wire(name),
            frame_counter,
        },
        payload,
    })
}

/// Frame counter continuity relative to the previous packet of the same stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameContinuity {
    First,
    InOrder,
    /// Frames skipped since the previous packet
    Gap(u32),
    Duplicate,
    /// Counter went backwards
    Late,
}

/// Decoder statistics
#[derive(Debug, Clone, Default)]
pub struct DecoderStats {
    pub packets_decoded: u64,
    pub packets_rejected: u64,
    pub frames_missed: u64,
    pub duplicates: u64,
    pub late: u64,
}

impl DecoderStats {
    pub fn loss_rate(&self) -> f32 {
        let expected = self.packets_decoded + self.frames_missed;
        if expected == 0 {
            0.0
        } else {
            self.frames_missed as f32 / expected as f32
        }
    }
}

/// Decoder that also watches frame counters per stream
///
/// Counter tracking is diagnostic only; packets are never held back or
/// reordered because of it.
#[derive(Debug, Default)]
pub struct PacketDecoder {
    last_counters: HashMap<StreamName, u32>,
    stats: DecoderStats,
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a datagram and update statistics
    pub fn decode<'a>(&mut self, datagram: &'a [u8]) -> Result<Packet<'a>, CodecError> {
        match decode(datagram) {
            Ok(packet) => {
                self.stats.packets_decoded += 1;
                Ok(packet)
            }
            Err(e) => {
                self.stats.packets_rejected += 1;
                Err(e)
            }
        }
    }

    /// Record the frame counter of an accepted packet
    pub fn observe(&mut self, header: &PacketHeader) -> FrameContinuity {
        let counter = header.frame_counter;
        let continuity = match self.last_counters.get(&header.stream_name) {
            None => FrameContinuity::First,
            Some(&last) => {
                let skipped = counter.wrapping_sub(last.wrapping_add(1));
                if counter == last {
                    FrameContinuity::Duplicate
                } else if skipped == 0 {
                    FrameContinuity::InOrder
                } else if skipped < u32::MAX / 2 {
                    FrameContinuity::Gap(skipped)
                } else {
                    FrameContinuity::Late
                }
            }
        };

        match continuity {
            FrameContinuity::Gap(n) => self.stats.frames_missed += n as u64,
            FrameContinuity::Duplicate => self.stats.duplicates += 1,
            FrameContinuity::Late => self.stats.late += 1,
            _ => {}
        }
        // A late packet leaves the newest counter as the reference
        if continuity != FrameContinuity::Late {
            self.last_counters.insert(header.stream_name, counter);
        }

        continuity
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats.clone()
    }

    pub fn reset_stats(&mut self) {
        self.stats = DecoderStats::default();
        self.last_counters.clear();
    }
}
