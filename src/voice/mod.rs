//! Voice session subsystem
//!
//! The capture pipeline turns microphone PCM into outbound Opus packets; the
//! playback side fans inbound per-stream packets through the decode pool into
//! per-stream ring buffers and mixes them on the device callback. The
//! [`manager::AudioManager`] owns both and exposes the control surface.

pub mod capture;
pub mod controls;
pub mod decode_pool;
pub mod manager;
pub mod playback;
pub mod vad;

pub use capture::CapturePipeline;
pub use controls::Controls;
pub use decode_pool::DecodePool;
pub use manager::AudioManager;
pub use playback::{PlaybackClient, StreamMixer};
pub use vad::VadMethod;
