//! # Voice Engine
//!
//! Real-time voice chat audio pipeline.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                           CAPTURE PATH                               │
//! │  ┌──────────┐    ┌────────────┐    ┌─────────┐    ┌──────────────┐   │
//! │  │  Device  │───▶│ VAD / gate │───▶│  Gain   │───▶│ Opus Encoder │   │
//! │  │ callback │    │  denoise   │    └─────────┘    └──────┬───────┘   │
//! │  └──────────┘    └────────────┘                          │           │
//! │                                            outbound packets (Bytes)  │
//! └──────────────────────────────────────────────────────────────────────┘
//!
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                           PLAYBACK PATH                              │
//! │  inbound packets tagged with an SSRC                                 │
//! │        │                                                             │
//! │        ▼                                                             │
//! │  ┌────────────┐   ┌──────────────┐   ┌─────────────┐   ┌─────────┐   │
//! │  │ DecodePool │──▶│ per-SSRC     │──▶│ VoiceBuffer │──▶│  Mixer  │   │
//! │  │  workers   │   │ StreamDecoder│   │ (SPSC ring) │   │ + meter │   │
//! │  └────────────┘   └──────────────┘   └─────────────┘   └────┬────┘   │
//! │                                                             ▼        │
//! │                                                    Device callback   │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The two device callbacks run on real-time threads and never block on
//! decode work or on a lock the control thread can hold for unbounded time.
//! All tunable parameters (gate, gain, mute, volume, bitrate, ...) are
//! adjusted through atomics and narrowly-scoped mutexes.

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod voice;

pub use error::{Error, Result};
pub use voice::manager::AudioManager;

/// Engine-wide constants
pub mod constants {
    /// Sample rate used on both the capture and playback paths
    pub const SAMPLE_RATE: u32 = 48_000;

    /// Channel count for capture and playback (interleaved stereo)
    pub const CHANNELS: usize = 2;

    /// Voice frame duration in milliseconds
    pub const FRAME_SIZE_MS: f32 = 10.0;

    /// Samples per channel in one voice frame
    pub const FRAME_SIZE: usize = 480;

    /// Default Opus bitrate for voice in bits per second
    pub const DEFAULT_BITRATE: u32 = 64_000;

    /// Upper bound for an encoded Opus packet (the codec itself caps at 1275 bytes)
    pub const MAX_PACKET_SIZE: usize = 1500;

    /// Per-stream ring buffer capacity in frames (200 ms at 48 kHz)
    pub const VOICE_BUFFER_FRAMES: usize = 9600;

    /// Frames that must be buffered before a stream is mixed (20 ms)
    pub const VOICE_LOW_WATER_FRAMES: usize = 960;

    /// Decode pool worker count
    pub const DECODE_WORKERS: usize = 2;

    /// Bounded depth of each decode worker queue, in packets
    pub const DECODE_QUEUE_DEPTH: usize = 64;

    /// Bounded depth of the outbound packet queue
    pub const PACKET_QUEUE_DEPTH: usize = 64;
}
