//! Error types for the voice engine
//!
//! Only construction-time failures are terminal for the subsystem; everything
//! on the steady-state audio path (corrupt packets, unknown streams, buffer
//! underruns) is logged and absorbed where it occurs.

use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio subsystem errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamFailed(String),

    #[error("Voice buffer allocation failed: {0}")]
    BufferAllocation(String),
}

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Encoder initialization failed: {0}")]
    EncoderInit(String),

    #[error("Decoder initialization failed: {0}")]
    DecoderInit(String),

    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Invalid frame size: {0}")]
    InvalidFrameSize(usize),

    #[error("Packet buffer too small: {0} bytes")]
    PacketBufferTooSmall(usize),
}

/// Result type alias for the engine
pub type Result<T> = std::result::Result<T, Error>;
