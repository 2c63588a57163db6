//! Capture pipeline
//!
//! Runs once per 10 ms capture frame on the capture callback thread:
//! meter -> denoise -> VAD -> gain -> encode -> emit. Parameters are read
//! through atomics each frame; the encoder mutex serializes the encode call
//! against configuration changes from the control thread, and the denoise
//! model has its own mutex. Neither lock is ever held across the other.

use bytes::Bytes;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::warn;

use crate::audio::meter::PeakMeter;
use crate::codec::VoiceEncoder;
use crate::config::{CodecApplication, OpusConfig, SignalHint};
use crate::constants::MAX_PACKET_SIZE;
use crate::error::CodecError;
use crate::voice::controls::Controls;
use crate::voice::vad::{gate_is_voice, Denoiser, VadMethod};
use std::sync::Arc;

/// Reusable buffers owned by the capture callback, so the hot path never
/// allocates beyond the emitted packet itself.
pub struct CaptureScratch {
    frame: Vec<f32>,
    packet: Vec<u8>,
}

impl CaptureScratch {
    pub fn new(config: &OpusConfig) -> Self {
        Self {
            frame: Vec::with_capacity(config.samples_per_frame()),
            packet: vec![0u8; MAX_PACKET_SIZE],
        }
    }
}

pub struct CapturePipeline {
    encoder: Mutex<VoiceEncoder>,
    denoiser: Mutex<Denoiser>,
    controls: Arc<Controls>,
    meter: PeakMeter,
    packet_tx: Sender<Bytes>,
    frame_size: usize,
    channels: usize,
}

impl CapturePipeline {
    pub fn new(
        config: &OpusConfig,
        controls: Arc<Controls>,
        packet_tx: Sender<Bytes>,
    ) -> Result<Self, CodecError> {
        Ok(Self {
            encoder: Mutex::new(VoiceEncoder::new(config.clone())?),
            denoiser: Mutex::new(Denoiser::new(config.channels)),
            controls,
            meter: PeakMeter::new(),
            packet_tx,
            frame_size: config.frame_size,
            channels: config.channels,
        })
    }

    /// Process one interleaved capture frame.
    pub fn process_block(&self, pcm: &[f32], scratch: &mut CaptureScratch) {
        if !self.controls.capture_enabled() {
            return;
        }
        if pcm.len() != self.frame_size * self.channels {
            warn!("capture block of {} samples dropped", pcm.len());
            return;
        }

        // Meter reflects the raw microphone level, independent of gating
        self.meter.update(pcm);

        let method = self.controls.vad_method();
        let suppress = self.controls.suppress_noise();

        let mut probability = 0.0f32;
        if suppress || method == VadMethod::Probability {
            let mut denoiser = self.denoiser.lock();
            probability = denoiser.process(pcm, &mut scratch.frame);
            drop(denoiser);
            self.controls.set_vad_probability(probability);

            if !suppress {
                // Model ran only for its voice probability; encode the raw frame
                scratch.frame.clear();
                scratch.frame.extend_from_slice(pcm);
            }
        } else {
            scratch.frame.clear();
            scratch.frame.extend_from_slice(pcm);
        }

        let voice = match method {
            VadMethod::Probability => probability >= self.controls.probability_threshold(),
            VadMethod::Gate => gate_is_voice(pcm, self.controls.capture_gate()),
        };
        if !voice {
            // Non-voice frames are dropped outright: no packet, no timestamp
            return;
        }

        let gain = self.controls.capture_gain();
        if (gain - 1.0).abs() > f32::EPSILON {
            for sample in scratch.frame.iter_mut() {
                *sample = (*sample * gain).clamp(-1.0, 1.0);
            }
        }

        let result = {
            let mut encoder = self.encoder.lock();
            encoder.encode_into(&scratch.frame, &mut scratch.packet)
        };

        match result {
            Ok(size) => {
                self.controls.advance_timestamp(self.frame_size as u32);
                let packet = Bytes::copy_from_slice(&scratch.packet[..size]);
                if self.packet_tx.try_send(packet).is_err() {
                    warn!("outbound packet queue full, dropping frame");
                }
            }
            Err(e) => warn!("voice encode failed: {}", e),
        }
    }

    pub fn meter(&self) -> &PeakMeter {
        &self.meter
    }

    pub fn set_bitrate(&self, bitrate: u32) -> Result<(), CodecError> {
        self.encoder.lock().set_bitrate(bitrate)
    }

    pub fn set_signal(&self, hint: SignalHint) -> Result<(), CodecError> {
        self.encoder.lock().set_signal(hint)
    }

    pub fn set_application(&self, app: CodecApplication) -> Result<(), CodecError> {
        self.encoder.lock().set_application(app)
    }

    pub fn encoder_config(&self) -> OpusConfig {
        self.encoder.lock().config().clone()
    }
}
