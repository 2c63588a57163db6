//! Peak level metering
//!
//! A decaying amplitude estimate in [0, 1] for UI level display. The value is
//! advisory telemetry: it is written by whichever audio thread owns the
//! signal and read by the UI with relaxed ordering, last writer wins.

use std::sync::atomic::{AtomicU32, Ordering};

/// Per-update decay factor. Blocks arrive every 10 ms, so a full-scale peak
/// fades below 1% in roughly a quarter second.
const DECAY: f32 = 0.85;

pub struct PeakMeter {
    level: AtomicU32,
}

impl PeakMeter {
    pub fn new() -> Self {
        Self {
            level: AtomicU32::new(0.0f32.to_bits()),
        }
    }

    /// Fold one block of samples into the meter.
    pub fn update(&self, samples: &[f32]) {
        let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        let decayed = self.value() * DECAY;
        let level = peak.min(1.0).max(decayed);
        self.level.store(level.to_bits(), Ordering::Relaxed);
    }

    /// Apply one decay step without new signal, so the displayed level
    /// falls when the source goes silent or muted.
    pub fn decay(&self) {
        let level = self.value() * DECAY;
        self.level.store(level.to_bits(), Ordering::Relaxed);
    }

    /// Current level in [0, 1].
    pub fn value(&self) -> f32 {
        f32::from_bits(self.level.load(Ordering::Relaxed))
    }

    pub fn reset(&self) {
        self.level.store(0.0f32.to_bits(), Ordering::Relaxed);
    }
}

impl Default for PeakMeter {
    fn default() -> Self {
        Self::new()
    }
}
