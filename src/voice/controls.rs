//! Runtime voice controls
//!
//! One struct of independently-atomic parameters shared between the UI
//! thread and the real-time audio callbacks. No field requires cross-field
//! atomicity: a change is simply observed by the next callback iteration.
//! All accesses are relaxed.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crate::voice::vad::VadMethod;

/// f32 stored as raw bits in an `AtomicU32`
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

pub struct Controls {
    capture_enabled: AtomicBool,
    playback_enabled: AtomicBool,
    capture_gate: AtomicF32,
    capture_gain: AtomicF32,
    suppress_noise: AtomicBool,
    mix_mono: AtomicBool,
    vad_method: AtomicU8,
    probability_threshold: AtomicF32,
    vad_probability: AtomicF32,
    rtp_timestamp: AtomicU32,
}

impl Controls {
    pub fn new() -> Self {
        Self {
            capture_enabled: AtomicBool::new(true),
            playback_enabled: AtomicBool::new(true),
            // 0.0 means the gate is always open
            capture_gate: AtomicF32::new(0.0),
            capture_gain: AtomicF32::new(1.0),
            suppress_noise: AtomicBool::new(false),
            mix_mono: AtomicBool::new(false),
            vad_method: AtomicU8::new(VadMethod::Gate.as_u8()),
            probability_threshold: AtomicF32::new(0.5),
            vad_probability: AtomicF32::new(0.0),
            rtp_timestamp: AtomicU32::new(0),
        }
    }

    pub fn capture_enabled(&self) -> bool {
        self.capture_enabled.load(Ordering::Relaxed)
    }

    pub fn set_capture_enabled(&self, enabled: bool) {
        self.capture_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn playback_enabled(&self) -> bool {
        self.playback_enabled.load(Ordering::Relaxed)
    }

    pub fn set_playback_enabled(&self, enabled: bool) {
        self.playback_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn capture_gate(&self) -> f32 {
        self.capture_gate.get()
    }

    pub fn set_capture_gate(&self, gate: f32) {
        self.capture_gate.set(gate.max(0.0));
    }

    pub fn capture_gain(&self) -> f32 {
        self.capture_gain.get()
    }

    pub fn set_capture_gain(&self, gain: f32) {
        self.capture_gain.set(gain.max(0.0));
    }

    pub fn suppress_noise(&self) -> bool {
        self.suppress_noise.load(Ordering::Relaxed)
    }

    pub fn set_suppress_noise(&self, enabled: bool) {
        self.suppress_noise.store(enabled, Ordering::Relaxed);
    }

    pub fn mix_mono(&self) -> bool {
        self.mix_mono.load(Ordering::Relaxed)
    }

    pub fn set_mix_mono(&self, enabled: bool) {
        self.mix_mono.store(enabled, Ordering::Relaxed);
    }

    pub fn vad_method(&self) -> VadMethod {
        VadMethod::from_u8(self.vad_method.load(Ordering::Relaxed))
    }

    pub fn set_vad_method(&self, method: VadMethod) {
        self.vad_method.store(method.as_u8(), Ordering::Relaxed);
    }

    pub fn probability_threshold(&self) -> f32 {
        self.probability_threshold.get()
    }

    pub fn set_probability_threshold(&self, threshold: f32) {
        self.probability_threshold.set(threshold.clamp(0.0, 1.0));
    }

    /// Voice probability observed on the most recent capture frame.
    pub fn vad_probability(&self) -> f32 {
        self.vad_probability.get()
    }

    pub(crate) fn set_vad_probability(&self, probability: f32) {
        self.vad_probability.set(probability);
    }

    pub fn rtp_timestamp(&self) -> u32 {
        self.rtp_timestamp.load(Ordering::Relaxed)
    }

    /// Advance the RTP timestamp by one frame's per-channel sample count.
    pub(crate) fn advance_timestamp(&self, samples: u32) {
        self.rtp_timestamp.fetch_add(samples, Ordering::Relaxed);
    }
}

impl Default for Controls {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let controls = Controls::new();
        assert!(controls.capture_enabled());
        assert!(controls.playback_enabled());
        assert_eq!(controls.capture_gate(), 0.0);
        assert_eq!(controls.capture_gain(), 1.0);
        assert_eq!(controls.probability_threshold(), 0.5);
        assert_eq!(controls.vad_method(), VadMethod::Gate);
        assert_eq!(controls.rtp_timestamp(), 0);
    }

    #[test]
    fn test_atomic_f32_roundtrip() {
        let value = AtomicF32::new(0.25);
        assert_eq!(value.get(), 0.25);
        value.set(-1.5);
        assert_eq!(value.get(), -1.5);
    }

    #[test]
    fn test_threshold_clamped() {
        let controls = Controls::new();
        controls.set_probability_threshold(1.7);
        assert_eq!(controls.probability_threshold(), 1.0);
        controls.set_probability_threshold(-0.3);
        assert_eq!(controls.probability_threshold(), 0.0);
    }

    #[test]
    fn test_timestamp_advances() {
        let controls = Controls::new();
        controls.advance_timestamp(480);
        controls.advance_timestamp(480);
        assert_eq!(controls.rtp_timestamp(), 960);
    }
}
