//! Opus codec adapters
//!
//! One shared encoder for the outbound voice stream and one decoder per
//! inbound stream, both working on interleaved f32 PCM.

pub mod decoder;
pub mod encoder;

pub use decoder::StreamDecoder;
pub use encoder::VoiceEncoder;
