//! Per-stream Opus decoder
//!
//! Each remote stream owns one decoder so codec state (prediction, packet
//! loss history) never bleeds between participants. Decode runs on the
//! decode pool, never on the playback callback.

use opus::{Channels, Decoder};

use crate::config::OpusConfig;
use crate::error::CodecError;

pub struct StreamDecoder {
    decoder: Decoder,
    channels: usize,
    frames_decoded: u64,
    frames_concealed: u64,
}

impl StreamDecoder {
    pub fn new(config: &OpusConfig) -> Result<Self, CodecError> {
        let channels = match config.channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            _ => {
                return Err(CodecError::DecoderInit(format!(
                    "Unsupported channel count: {}",
                    config.channels
                )))
            }
        };

        let decoder = Decoder::new(config.sample_rate, channels)
            .map_err(|e| CodecError::DecoderInit(e.to_string()))?;

        Ok(Self {
            decoder,
            channels: config.channels,
            frames_decoded: 0,
            frames_concealed: 0,
        })
    }

    /// Decode one packet into `out`, returning the frame count produced.
    ///
    /// `out` must hold at least one maximum-duration packet
    /// (120 ms, i.e. `sample_rate / 1000 * 120 * channels` samples).
    pub fn decode_into(&mut self, packet: &[u8], out: &mut [f32]) -> Result<usize, CodecError> {
        let frames = self
            .decoder
            .decode_float(packet, out, false)
            .map_err(|e| CodecError::DecodingFailed(e.to_string()))?;

        self.frames_decoded += frames as u64;
        Ok(frames)
    }

    /// Produce concealment audio for one lost packet.
    pub fn conceal(&mut self, out: &mut [f32]) -> Result<usize, CodecError> {
        let frames = self
            .decoder
            .decode_float(&[], out, false)
            .map_err(|e| CodecError::DecodingFailed(e.to_string()))?;

        self.frames_concealed += frames as u64;
        Ok(frames)
    }

    /// Reset codec state, e.g. after a long squelch.
    pub fn reset(&mut self) -> Result<(), CodecError> {
        self.decoder
            .reset_state()
            .map_err(|e| CodecError::DecoderInit(e.to_string()))
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn stats(&self) -> DecoderStats {
        DecoderStats {
            frames_decoded: self.frames_decoded,
            frames_concealed: self.frames_concealed,
        }
    }
}

/// Decoder statistics
#[derive(Debug, Clone)]
pub struct DecoderStats {
    pub frames_decoded: u64,
    pub frames_concealed: u64,
}

/// Samples needed to hold the longest possible decoded packet (120 ms).
pub fn max_decoded_samples(config: &OpusConfig) -> usize {
    (config.sample_rate as usize / 1000) * 120 * config.channels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::VoiceEncoder;
    use crate::constants::MAX_PACKET_SIZE;

    #[test]
    fn test_decoder_creation() {
        assert!(StreamDecoder::new(&OpusConfig::voice()).is_ok());
    }

    #[test]
    fn test_decode_produces_frame() {
        let config = OpusConfig::voice();
        let mut encoder = VoiceEncoder::new(config.clone()).unwrap();
        let mut decoder = StreamDecoder::new(&config).unwrap();

        let mut samples = vec![0.0f32; config.samples_per_frame()];
        for (i, s) in samples.iter_mut().enumerate() {
            let t = (i / config.channels) as f32 / config.sample_rate as f32;
            *s = (t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 0.5;
        }

        let mut packet = [0u8; MAX_PACKET_SIZE];
        let size = encoder.encode_into(&samples, &mut packet).unwrap();

        let mut out = vec![0.0f32; max_decoded_samples(&config)];
        let frames = decoder.decode_into(&packet[..size], &mut out).unwrap();
        assert_eq!(frames, config.frame_size);
    }

    #[test]
    fn test_malformed_packet_is_an_error() {
        let mut decoder = StreamDecoder::new(&OpusConfig::voice()).unwrap();
        let mut out = vec![0.0f32; max_decoded_samples(&OpusConfig::voice())];

        // Code-3 packet with a zero frame count is invalid per RFC 6716
        let result = decoder.decode_into(&[0x03, 0x00], &mut out);
        assert!(result.is_err());
    }

    #[test]
    fn test_concealment() {
        let mut decoder = StreamDecoder::new(&OpusConfig::voice()).unwrap();
        let mut out = vec![0.0f32; max_decoded_samples(&OpusConfig::voice())];

        let frames = decoder.conceal(&mut out).unwrap();
        assert!(frames > 0);
        assert_eq!(decoder.stats().frames_concealed, frames as u64);
    }
}
