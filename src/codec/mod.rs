//! VBAN packet codec
//!
//! Converts between raw datagrams and structured packets.

pub mod decoder;
pub mod encoder;

pub use decoder::{decode, DecoderStats, FrameContinuity, Packet, PacketDecoder};
pub use encoder::{encode_audio, encode_packet, encode_packet_into, EncoderStats, PacketEncoder};
