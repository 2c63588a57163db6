//! Voice activity detection
//!
//! Two interchangeable strategies decide whether a capture frame carries
//! speech: a plain amplitude gate, and an RNNoise model (`nnnoiseless`) that
//! yields both a denoised frame and a voice probability. The active strategy
//! is selected per frame from [`crate::voice::controls::Controls`], so
//! swapping methods at runtime only affects the next frame.

use nnnoiseless::DenoiseState;

/// RNNoise operates on fixed 480-sample subframes at 48 kHz.
pub const DENOISE_SUBFRAME: usize = DenoiseState::FRAME_SIZE;

/// RNNoise expects samples in i16 range carried as f32.
const MODEL_SCALE: f32 = 32768.0;

/// Selectable VAD strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadMethod {
    /// Frame is voice iff its peak amplitude reaches the capture gate
    Gate,
    /// Frame is voice iff the RNNoise voice probability reaches the threshold
    Probability,
}

impl VadMethod {
    pub fn as_u8(self) -> u8 {
        match self {
            VadMethod::Gate => 0,
            VadMethod::Probability => 1,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => VadMethod::Probability,
            _ => VadMethod::Gate,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VadMethod::Gate => "gate",
            VadMethod::Probability => "rnnoise",
        }
    }
}

impl std::str::FromStr for VadMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gate" => Ok(VadMethod::Gate),
            "rnnoise" => Ok(VadMethod::Probability),
            other => Err(format!("unknown VAD method: {}", other)),
        }
    }
}

/// Peak absolute amplitude of a block.
pub fn peak_amplitude(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}

/// Gate strategy: voice iff amplitude reaches the threshold (inclusive).
/// A threshold of 0.0 leaves the gate always open.
pub fn gate_is_voice(samples: &[f32], threshold: f32) -> bool {
    peak_amplitude(samples) >= threshold
}

/// RNNoise denoiser holding one model state per channel.
///
/// Model state carries history between frames, so one instance is shared
/// across strategy swaps and lives behind its own mutex in the capture
/// pipeline.
pub struct Denoiser {
    states: Vec<Box<DenoiseState<'static>>>,
    channels: usize,
    input: [f32; DENOISE_SUBFRAME],
    output: [f32; DENOISE_SUBFRAME],
}

impl Denoiser {
    pub fn new(channels: usize) -> Self {
        Self {
            states: (0..channels.max(1)).map(|_| DenoiseState::new()).collect(),
            channels: channels.max(1),
            input: [0.0; DENOISE_SUBFRAME],
            output: [0.0; DENOISE_SUBFRAME],
        }
    }

    /// Denoise one interleaved frame into `out` and return the voice
    /// probability in [0, 1].
    ///
    /// `out` is cleared and refilled to exactly `pcm.len()` samples. The
    /// model consumes whole 480-sample subframes per channel; a trailing
    /// partial subframe passes through untouched. The reported probability
    /// is the maximum over channels and subframes.
    pub fn process(&mut self, pcm: &[f32], out: &mut Vec<f32>) -> f32 {
        out.clear();
        out.extend_from_slice(pcm);

        let frames = pcm.len() / self.channels;
        let mut probability = 0.0f32;

        for channel in 0..self.channels {
            let state = &mut self.states[channel];
            let mut start = 0;
            while start + DENOISE_SUBFRAME <= frames {
                for i in 0..DENOISE_SUBFRAME {
                    self.input[i] = pcm[(start + i) * self.channels + channel] * MODEL_SCALE;
                }

                let prob = state.process_frame(&mut self.output, &self.input);
                probability = probability.max(prob);

                for i in 0..DENOISE_SUBFRAME {
                    out[(start + i) * self.channels + channel] =
                        (self.output[i] / MODEL_SCALE).clamp(-1.0, 1.0);
                }

                start += DENOISE_SUBFRAME;
            }
        }

        probability.clamp(0.0, 1.0)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }
}
