//! Engine configuration
//!
//! Plain config structs with voice-tuned defaults. Everything here is read at
//! construction time; runtime-tunable parameters live in
//! [`crate::voice::controls::Controls`].

use crate::constants;

/// Opus application hint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecApplication {
    /// Speech-optimized (default for voice chat)
    Voip,
    /// General audio
    Audio,
    /// Lowest algorithmic delay
    LowDelay,
}

/// Opus signal hint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalHint {
    Auto,
    Voice,
    Music,
}

/// Opus codec configuration
#[derive(Debug, Clone)]
pub struct OpusConfig {
    /// Sample rate in Hz (must be an Opus rate: 8/12/16/24/48 kHz)
    pub sample_rate: u32,
    /// Interleaved channel count (1 or 2)
    pub channels: usize,
    /// Frame size in samples per channel
    pub frame_size: usize,
    /// Target bitrate in bits per second
    pub bitrate: u32,
    /// Application hint
    pub application: CodecApplication,
    /// Signal hint
    pub signal: SignalHint,
    /// Variable bitrate
    pub vbr: bool,
    /// In-band forward error correction
    pub fec: bool,
    /// Expected packet loss percentage, used when FEC is enabled
    pub packet_loss_perc: u8,
}

impl OpusConfig {
    /// Voice chat preset: 10 ms stereo frames at 48 kHz
    pub fn voice() -> Self {
        Self {
            sample_rate: constants::SAMPLE_RATE,
            channels: constants::CHANNELS,
            frame_size: constants::FRAME_SIZE,
            bitrate: constants::DEFAULT_BITRATE,
            application: CodecApplication::Voip,
            signal: SignalHint::Voice,
            vbr: true,
            fec: true,
            packet_loss_perc: 10,
        }
    }

    /// Compute frame size in samples per channel from a duration
    pub fn frame_size_from_ms(sample_rate: u32, ms: f32) -> usize {
        (sample_rate as f32 * ms / 1000.0) as usize
    }

    /// Total samples in one interleaved frame
    pub fn samples_per_frame(&self) -> usize {
        self.frame_size * self.channels
    }

    /// Frame duration in milliseconds
    pub fn frame_duration_ms(&self) -> f32 {
        self.frame_size as f32 * 1000.0 / self.sample_rate as f32
    }
}

impl Default for OpusConfig {
    fn default() -> Self {
        Self::voice()
    }
}

/// Full voice session configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Codec settings shared by the encoder and all per-stream decoders
    pub opus: OpusConfig,
    /// Per-stream ring buffer capacity in frames
    pub buffer_frames: usize,
    /// Frames that must be buffered before a stream's ring is read
    pub low_water_frames: usize,
    /// Decode pool worker count
    pub decode_workers: usize,
    /// Bounded depth of each decode worker queue
    pub decode_queue_depth: usize,
    /// Bounded depth of the outbound packet queue
    pub packet_queue_depth: usize,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            opus: OpusConfig::voice(),
            buffer_frames: constants::VOICE_BUFFER_FRAMES,
            low_water_frames: constants::VOICE_LOW_WATER_FRAMES,
            decode_workers: constants::DECODE_WORKERS,
            decode_queue_depth: constants::DECODE_QUEUE_DEPTH,
            packet_queue_depth: constants::PACKET_QUEUE_DEPTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_preset() {
        let config = OpusConfig::voice();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.frame_size, 480);
        assert_eq!(config.samples_per_frame(), 960);
        assert!((config.frame_duration_ms() - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_frame_size_from_ms() {
        assert_eq!(OpusConfig::frame_size_from_ms(48000, 10.0), 480);
        assert_eq!(OpusConfig::frame_size_from_ms(48000, 20.0), 960);
        assert_eq!(OpusConfig::frame_size_from_ms(16000, 10.0), 160);
    }
}
