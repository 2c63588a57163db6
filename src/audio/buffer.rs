//! Per-stream voice ring buffer
//!
//! A fixed-capacity SPSC ring of interleaved f32 frames, built on `rtrb`.
//! It decouples the decode worker that produces a stream's PCM from the
//! playback callback that consumes it. The chunk API handles wrap-around at
//! the end of the backing storage in at most two segments, and commits are
//! always whole frames, so a reader never observes a partially-written frame.
//!
//! Reads are suppressed while fewer than `low_water_frames` frames are
//! buffered. That trades a small constant latency for protection against
//! audible underrun stutter when a stream's packets arrive in bursts.

use parking_lot::Mutex;
use rtrb::{Consumer, Producer, RingBuffer};

use crate::error::AudioError;

pub struct VoiceBuffer {
    producer: Mutex<Producer<f32>>,
    consumer: Mutex<Consumer<f32>>,
    channels: usize,
    capacity_frames: usize,
    low_water_frames: usize,
}

impl VoiceBuffer {
    /// Create a buffer holding up to `capacity_frames` interleaved frames.
    ///
    /// `low_water_frames` is the minimum number of buffered frames required
    /// before [`read`](Self::read) produces anything.
    pub fn new(
        channels: usize,
        capacity_frames: usize,
        low_water_frames: usize,
    ) -> Result<Self, AudioError> {
        if channels == 0 || capacity_frames == 0 {
            return Err(AudioError::BufferAllocation(format!(
                "invalid dimensions: {} channels x {} frames",
                channels, capacity_frames
            )));
        }
        if low_water_frames >= capacity_frames {
            return Err(AudioError::BufferAllocation(format!(
                "low water {} >= capacity {}",
                low_water_frames, capacity_frames
            )));
        }

        let (producer, consumer) = RingBuffer::new(capacity_frames * channels);

        Ok(Self {
            producer: Mutex::new(producer),
            consumer: Mutex::new(consumer),
            channels,
            capacity_frames,
            low_water_frames,
        })
    }

    /// Write interleaved samples, whole frames only.
    ///
    /// A trailing partial frame is ignored, and frames that do not fit in the
    /// remaining capacity are silently dropped. Never blocks.
    pub fn write(&self, samples: &[f32]) {
        let mut producer = self.producer.lock();

        let frames = samples.len() / self.channels;
        let free_frames = producer.slots() / self.channels;
        let write_frames = frames.min(free_frames);
        if write_frames == 0 {
            return;
        }

        let count = write_frames * self.channels;
        if let Ok(mut chunk) = producer.write_chunk(count) {
            let (first, second) = chunk.as_mut_slices();
            let split = first.len();
            first.copy_from_slice(&samples[..split]);
            second.copy_from_slice(&samples[split..count]);
            chunk.commit_all();
        };
    }

    /// Read up to `output.len() / channels` frames into `output`.
    ///
    /// Returns the number of frames read. When fewer than the low-water mark
    /// is buffered, nothing is read and `output` is left untouched.
    pub fn read(&self, output: &mut [f32]) -> usize {
        let mut consumer = self.consumer.lock();

        let available = consumer.slots() / self.channels;
        if available < self.low_water_frames {
            return 0;
        }

        let frames = (output.len() / self.channels).min(available);
        if frames == 0 {
            return 0;
        }

        let count = frames * self.channels;
        match consumer.read_chunk(count) {
            Ok(chunk) => {
                let (first, second) = chunk.as_slices();
                output[..first.len()].copy_from_slice(first);
                output[first.len()..count].copy_from_slice(second);
                chunk.commit_all();
                frames
            }
            Err(_) => 0,
        }
    }

    /// Discard all buffered frames.
    pub fn clear(&self) {
        let mut consumer = self.consumer.lock();
        let slots = consumer.slots();
        if slots > 0 {
            if let Ok(chunk) = consumer.read_chunk(slots) {
                chunk.commit_all();
            }
        }
    }

    /// Number of frames currently buffered.
    pub fn available_frames(&self) -> usize {
        self.consumer.lock().slots() / self.channels
    }

    pub fn capacity_frames(&self) -> usize {
        self.capacity_frames
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn low_water_frames(&self) -> usize {
        self.low_water_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rejects_invalid_dimensions() {
        assert!(VoiceBuffer::new(0, 64, 0).is_err());
        assert!(VoiceBuffer::new(2, 0, 0).is_err());
        assert!(VoiceBuffer::new(2, 64, 64).is_err());
        assert!(VoiceBuffer::new(2, 64, 8).is_ok());
    }

    #[test]
    fn test_write_read_roundtrip() {
        let buffer = VoiceBuffer::new(2, 64, 0).unwrap();

        let samples: Vec<f32> = (0..32).map(|i| i as f32).collect();
        buffer.write(&samples);
        assert_eq!(buffer.available_frames(), 16);

        let mut out = vec![0.0f32; 32];
        let frames = buffer.read(&mut out);
        assert_eq!(frames, 16);
        assert_eq!(out, samples);
        assert_eq!(buffer.available_frames(), 0);
    }

    #[test]
    fn test_low_water_suppresses_read() {
        let buffer = VoiceBuffer::new(1, 64, 8).unwrap();
        buffer.write(&[1.0, 2.0, 3.0, 4.0]);

        let mut out = vec![-9.0f32; 4];
        assert_eq!(buffer.read(&mut out), 0);
        // Output must be left untouched, not zero-filled
        assert_eq!(out, vec![-9.0; 4]);

        // Crossing the low-water mark releases everything buffered
        buffer.write(&[5.0, 6.0, 7.0, 8.0]);
        let mut out = vec![0.0f32; 8];
        assert_eq!(buffer.read(&mut out), 8);
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_partial_frame_is_dropped() {
        let buffer = VoiceBuffer::new(2, 8, 0).unwrap();
        // Five samples is two stereo frames plus a dangling sample
        buffer.write(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(buffer.available_frames(), 2);

        let mut out = vec![0.0f32; 4];
        assert_eq!(buffer.read(&mut out), 2);
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_overflow_keeps_earlier_data() {
        let buffer = VoiceBuffer::new(1, 4, 0).unwrap();
        buffer.write(&[1.0, 2.0, 3.0]);
        // Only one frame of capacity left; the rest is dropped
        buffer.write(&[4.0, 5.0, 6.0]);
        assert_eq!(buffer.available_frames(), 4);

        let mut out = vec![0.0f32; 4];
        assert_eq!(buffer.read(&mut out), 4);
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_clear() {
        let buffer = VoiceBuffer::new(2, 16, 0).unwrap();
        buffer.write(&[0.5; 16]);
        assert_eq!(buffer.available_frames(), 8);
        buffer.clear();
        assert_eq!(buffer.available_frames(), 0);
    }

    #[test]
    fn test_wraparound_preserves_order() {
        let buffer = VoiceBuffer::new(1, 8, 0).unwrap();
        let mut out = vec![0.0f32; 8];

        // Advance the internal indices so subsequent writes wrap
        buffer.write(&[0.0; 6]);
        assert_eq!(buffer.read(&mut out[..6]), 6);

        let samples: Vec<f32> = (1..=8).map(|i| i as f32).collect();
        buffer.write(&samples);
        assert_eq!(buffer.read(&mut out), 8);
        assert_eq!(out, samples);
    }

    proptest! {
        // Round-trip law: any sequence of writes within capacity reads back
        // in order, regardless of how the writes land on the wrap boundary.
        #[test]
        fn prop_chunked_writes_read_in_order(
            chunks in proptest::collection::vec(1usize..48, 1..8),
            offset in 0usize..96,
        ) {
            let buffer = VoiceBuffer::new(1, 96, 0).unwrap();

            // Shift the ring indices to a random phase first
            let mut scratch = vec![0.0f32; 96];
            buffer.write(&vec![0.0; offset]);
            buffer.read(&mut scratch[..offset]);

            let total: usize = chunks.iter().sum::<usize>().min(96);
            let mut written = Vec::new();
            let mut next = 0.0f32;
            for &chunk in &chunks {
                let chunk = chunk.min(total - written.len());
                let block: Vec<f32> = (0..chunk).map(|_| { next += 1.0; next }).collect();
                buffer.write(&block);
                written.extend_from_slice(&block);
                if written.len() >= total {
                    break;
                }
            }

            let mut out = vec![0.0f32; written.len()];
            prop_assert_eq!(buffer.read(&mut out), written.len());
            prop_assert_eq!(out, written);
        }
    }
}
