//! Opus encoder wrapper
//!
//! Wraps the single outbound voice encoder. Bitrate and signal hint can be
//! changed on a live encoder; the application hint cannot, so changing it
//! rebuilds the encoder with the same settings. Callers serialize access:
//! the orchestrator keeps the encoder behind a mutex whose critical section
//! covers both reconfiguration and the encode call.

use opus::{Application, Channels, Encoder};

use crate::config::{CodecApplication, OpusConfig, SignalHint};
use crate::error::CodecError;

pub struct VoiceEncoder {
    encoder: Encoder,
    config: OpusConfig,
    frames_encoded: u64,
    bytes_produced: u64,
}

impl VoiceEncoder {
    /// Create an encoder from the given configuration.
    pub fn new(config: OpusConfig) -> Result<Self, CodecError> {
        let encoder = Self::build(&config)?;
        Ok(Self {
            encoder,
            config,
            frames_encoded: 0,
            bytes_produced: 0,
        })
    }

    fn build(config: &OpusConfig) -> Result<Encoder, CodecError> {
        let channels = opus_channels(config.channels)
            .ok_or_else(|| CodecError::EncoderInit(format!(
                "Unsupported channel count: {}",
                config.channels
            )))?;

        let mut encoder = Encoder::new(config.sample_rate, channels, application(config.application))
            .map_err(|e| CodecError::EncoderInit(e.to_string()))?;

        encoder
            .set_bitrate(opus::Bitrate::Bits(config.bitrate as i32))
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set bitrate: {}", e)))?;

        encoder
            .set_vbr(config.vbr)
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set VBR: {}", e)))?;

        encoder
            .set_inband_fec(config.fec)
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set FEC: {}", e)))?;

        if config.fec {
            encoder
                .set_packet_loss_perc(config.packet_loss_perc as i32)
                .map_err(|e| CodecError::EncoderInit(format!("Failed to set packet loss: {}", e)))?;
        }

        encoder
            .set_signal(signal(config.signal))
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set signal hint: {}", e)))?;

        Ok(encoder)
    }

    /// Encode one frame of interleaved f32 samples into `out`.
    ///
    /// Input length must equal `frame_size * channels`. Returns the payload
    /// size written into the caller-provided buffer.
    pub fn encode_into(&mut self, samples: &[f32], out: &mut [u8]) -> Result<usize, CodecError> {
        if samples.len() != self.config.samples_per_frame() {
            return Err(CodecError::InvalidFrameSize(samples.len()));
        }
        if out.len() < 128 {
            return Err(CodecError::PacketBufferTooSmall(out.len()));
        }

        let size = self
            .encoder
            .encode_float(samples, out)
            .map_err(|e| CodecError::EncodingFailed(e.to_string()))?;

        self.frames_encoded += 1;
        self.bytes_produced += size as u64;

        Ok(size)
    }

    /// Update the target bitrate on the live encoder.
    pub fn set_bitrate(&mut self, bitrate: u32) -> Result<(), CodecError> {
        self.encoder
            .set_bitrate(opus::Bitrate::Bits(bitrate as i32))
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set bitrate: {}", e)))?;
        self.config.bitrate = bitrate;
        Ok(())
    }

    /// Update the signal hint on the live encoder.
    pub fn set_signal(&mut self, hint: SignalHint) -> Result<(), CodecError> {
        self.encoder
            .set_signal(signal(hint))
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set signal hint: {}", e)))?;
        self.config.signal = hint;
        Ok(())
    }

    /// Switch the application hint. Opus fixes the application at encoder
    /// creation, so this rebuilds the encoder with the current settings.
    pub fn set_application(&mut self, app: CodecApplication) -> Result<(), CodecError> {
        let mut config = self.config.clone();
        config.application = app;
        self.encoder = Self::build(&config)?;
        self.config = config;
        Ok(())
    }

    pub fn config(&self) -> &OpusConfig {
        &self.config
    }

    /// Frame size in samples per channel.
    pub fn frame_size(&self) -> usize {
        self.config.frame_size
    }

    /// Total samples in one interleaved frame.
    pub fn samples_per_frame(&self) -> usize {
        self.config.samples_per_frame()
    }

    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            frames_encoded: self.frames_encoded,
            bytes_produced: self.bytes_produced,
        }
    }
}

fn opus_channels(channels: usize) -> Option<Channels> {
    match channels {
        1 => Some(Channels::Mono),
        2 => Some(Channels::Stereo),
        _ => None,
    }
}

fn application(app: CodecApplication) -> Application {
    match app {
        CodecApplication::Voip => Application::Voip,
        CodecApplication::Audio => Application::Audio,
        CodecApplication::LowDelay => Application::LowDelay,
    }
}

fn signal(hint: SignalHint) -> opus::Signal {
    match hint {
        SignalHint::Auto => opus::Signal::Auto,
        SignalHint::Voice => opus::Signal::Voice,
        SignalHint::Music => opus::Signal::Music,
    }
}

/// Encoder statistics
#[derive(Debug, Clone)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub bytes_produced: u64,
}
