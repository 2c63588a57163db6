//! Per-stream playback and mixing
//!
//! Each remote SSRC gets a [`PlaybackClient`]: its own decoder, ring buffer,
//! mute flag, volume and peak meter. The [`StreamMixer`] keeps the SSRC map
//! under a coarse lock, routes inbound packets to the decode pool, and sums
//! every active client into the output block on the playback callback.

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::audio::buffer::VoiceBuffer;
use crate::audio::meter::PeakMeter;
use crate::codec::decoder::max_decoded_samples;
use crate::codec::StreamDecoder;
use crate::config::VoiceConfig;
use crate::error::CodecError;
use crate::voice::controls::{AtomicF32, Controls};
use crate::voice::decode_pool::DecodePool;

/// State for one remote audio source
pub struct PlaybackClient {
    decoder: Mutex<StreamDecoder>,
    buffer: VoiceBuffer,
    muted: AtomicBool,
    volume: AtomicF32,
    meter: PeakMeter,
}

impl PlaybackClient {
    pub fn new(config: &VoiceConfig) -> crate::Result<Self> {
        Ok(Self {
            decoder: Mutex::new(StreamDecoder::new(&config.opus)?),
            buffer: VoiceBuffer::new(
                config.opus.channels,
                config.buffer_frames,
                config.low_water_frames,
            )?,
            muted: AtomicBool::new(false),
            volume: AtomicF32::new(1.0),
            meter: PeakMeter::new(),
        })
    }

    /// Decode one packet and append the PCM to this stream's ring.
    /// Runs on a decode pool worker, never on the playback callback.
    pub(crate) fn decode_and_buffer(
        &self,
        packet: &[u8],
        scratch: &mut [f32],
    ) -> Result<(), CodecError> {
        let mut decoder = self.decoder.lock();
        let frames = decoder.decode_into(packet, scratch)?;
        let samples = frames * decoder.channels();
        drop(decoder);

        self.buffer.write(&scratch[..samples]);
        Ok(())
    }

    /// Drain this stream's ring into `scratch` and accumulate it into
    /// `output`. Muted streams are drained all the same so their backlog
    /// never grows, but contribute nothing to the sum.
    pub(crate) fn mix_into(&self, output: &mut [f32], scratch: &mut [f32]) {
        let samples = output.len().min(scratch.len());
        let frames = self.buffer.read(&mut scratch[..samples]);
        if frames == 0 || self.muted.load(Ordering::Relaxed) {
            // No new signal this cycle, so the displayed level keeps falling
            self.meter.decay();
            return;
        }

        let samples = frames * self.buffer.channels();
        self.meter.update(&scratch[..samples]);

        let volume = self.volume.get();
        for (out, sample) in output.iter_mut().zip(&scratch[..samples]) {
            *out += *sample * volume;
        }
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub fn muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume.set(volume.max(0.0));
    }

    pub fn volume(&self) -> f32 {
        self.volume.get()
    }

    pub fn peak_level(&self) -> f32 {
        self.meter.value()
    }

    pub fn clear_buffer(&self) {
        self.buffer.clear();
    }

    pub fn buffered_frames(&self) -> usize {
        self.buffer.available_frames()
    }
}

/// SSRC map, decode pool and the mixing step of the playback callback
pub struct StreamMixer {
    clients: RwLock<HashMap<u32, Arc<PlaybackClient>>>,
    pool: DecodePool,
    config: VoiceConfig,
    controls: Arc<Controls>,
}

impl StreamMixer {
    pub fn new(config: VoiceConfig, controls: Arc<Controls>) -> crate::Result<Self> {
        let pool = DecodePool::new(
            config.decode_workers,
            config.decode_queue_depth,
            max_decoded_samples(&config.opus),
        )?;
        Ok(Self {
            clients: RwLock::new(HashMap::new()),
            pool,
            config,
            controls,
        })
    }

    /// Register a stream. Idempotent: an already-known SSRC is left alone.
    pub fn add_ssrc(&self, ssrc: u32) -> crate::Result<()> {
        let mut clients = self.clients.write();
        if clients.contains_key(&ssrc) {
            return Ok(());
        }
        clients.insert(ssrc, Arc::new(PlaybackClient::new(&self.config)?));
        info!(ssrc, "registered voice stream");
        Ok(())
    }

    /// Drop a stream. A decode already in flight finishes against the
    /// client's Arc and is discarded with it.
    pub fn remove_ssrc(&self, ssrc: u32) {
        if self.clients.write().remove(&ssrc).is_some() {
            info!(ssrc, "removed voice stream");
        }
    }

    /// Drop every stream, e.g. at call end.
    pub fn remove_all(&self) {
        self.clients.write().clear();
    }

    /// Hand one inbound packet to the decode pool. Packets for unknown
    /// streams are dropped.
    pub fn feed_opus(&self, ssrc: u32, packet: Bytes) {
        let client = self.clients.read().get(&ssrc).cloned();
        match client {
            Some(client) => self.pool.submit(ssrc, packet, client),
            None => debug!(ssrc, "dropping packet for unknown stream"),
        }
    }

    /// Sum every active stream into `output`. The caller zero-fills
    /// `output` first; `scratch` must be at least as long.
    pub fn mix_into(&self, output: &mut [f32], scratch: &mut [f32]) {
        {
            let clients = self.clients.read();
            for client in clients.values() {
                client.mix_into(output, scratch);
            }
        }

        if self.controls.mix_mono() {
            let channels = self.config.opus.channels;
            for frame in output.chunks_mut(channels) {
                let avg = frame.iter().sum::<f32>() / channels as f32;
                frame.fill(avg);
            }
        }

        for sample in output.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }

    pub fn client(&self, ssrc: u32) -> Option<Arc<PlaybackClient>> {
        self.clients.read().get(&ssrc).cloned()
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Clear every stream's buffered audio, used when playback stops.
    pub fn clear_buffers(&self) {
        for client in self.clients.read().values() {
            client.clear_buffer();
        }
    }

    pub fn set_muted(&self, ssrc: u32, muted: bool) {
        if let Some(client) = self.client(ssrc) {
            client.set_muted(muted);
        }
    }

    pub fn muted(&self, ssrc: u32) -> Option<bool> {
        self.client(ssrc).map(|c| c.muted())
    }

    pub fn set_volume(&self, ssrc: u32, volume: f32) {
        if let Some(client) = self.client(ssrc) {
            client.set_volume(volume);
        }
    }

    pub fn volume(&self, ssrc: u32) -> Option<f32> {
        self.client(ssrc).map(|c| c.volume())
    }

    pub fn peak_level(&self, ssrc: u32) -> Option<f32> {
        self.client(ssrc).map(|c| c.peak_level())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::VoiceEncoder;
    use crate::config::OpusConfig;
    use crate::constants::MAX_PACKET_SIZE;
    use std::time::{Duration, Instant};

    fn test_config() -> VoiceConfig {
        VoiceConfig {
            buffer_frames: 4800,
            low_water_frames: 0,
            decode_workers: 2,
            ..VoiceConfig::default()
        }
    }

    fn mixer() -> StreamMixer {
        StreamMixer::new(test_config(), Arc::new(Controls::new())).unwrap()
    }

    fn encode_frames(samples_per_frame: &[Vec<f32>]) -> Vec<Bytes> {
        let mut encoder = VoiceEncoder::new(OpusConfig::voice()).unwrap();
        let mut packet = [0u8; MAX_PACKET_SIZE];
        samples_per_frame
            .iter()
            .map(|frame| {
                let size = encoder.encode_into(frame, &mut packet).unwrap();
                Bytes::copy_from_slice(&packet[..size])
            })
            .collect()
    }

    fn tone_frame(amplitude: f32) -> Vec<f32> {
        let config = OpusConfig::voice();
        let mut frame = vec![0.0f32; config.samples_per_frame()];
        for (i, s) in frame.iter_mut().enumerate() {
            let t = (i / config.channels) as f32 / config.sample_rate as f32;
            *s = (t * 440.0 * 2.0 * std::f32::consts::PI).sin() * amplitude;
        }
        frame
    }

    fn wait_for_frames(mixer: &StreamMixer, ssrc: u32, frames: usize) {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let buffered = mixer
                .client(ssrc)
                .map(|c| c.buffered_frames())
                .unwrap_or(0);
            if buffered >= frames {
                return;
            }
            assert!(Instant::now() < deadline, "decode pool did not deliver");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_add_is_idempotent_and_remove_drops() {
        let mixer = mixer();
        mixer.add_ssrc(7).unwrap();
        mixer.add_ssrc(7).unwrap();
        assert_eq!(mixer.client_count(), 1);

        mixer.remove_ssrc(7);
        assert_eq!(mixer.client_count(), 0);
        // Removing twice is harmless
        mixer.remove_ssrc(7);
    }

    #[test]
    fn test_feed_after_remove_is_a_silent_no_op() {
        let mixer = mixer();
        let packets = encode_frames(&[tone_frame(0.3)]);

        mixer.add_ssrc(1).unwrap();
        mixer.remove_ssrc(1);
        mixer.feed_opus(1, packets[0].clone());

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(mixer.client_count(), 0);
    }

    #[test]
    fn test_remove_with_decode_in_flight_is_safe() {
        let mixer = mixer();
        let packets = encode_frames(&vec![tone_frame(0.3); 8]);

        mixer.add_ssrc(1).unwrap();
        for packet in &packets {
            mixer.feed_opus(1, packet.clone());
        }
        mixer.remove_ssrc(1);

        // In-flight jobs complete against the Arc'd client and vanish with it
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(mixer.client_count(), 0);
    }

    #[test]
    fn test_same_stream_packets_decode_in_submission_order() {
        let mixer = mixer();
        let quiet = vec![0.0f32; OpusConfig::voice().samples_per_frame()];
        let packets = encode_frames(&[quiet, tone_frame(0.5)]);

        mixer.add_ssrc(3).unwrap();
        mixer.feed_opus(3, packets[0].clone());
        mixer.feed_opus(3, packets[1].clone());
        wait_for_frames(&mixer, 3, 960);

        let mut output = vec![0.0f32; 960 * 2];
        let mut scratch = vec![0.0f32; 960 * 2];
        mixer.mix_into(&mut output, &mut scratch);

        // First half is the silence packet, second half the tone
        let first = rms(&output[..960]);
        let second = rms(&output[960..]);
        assert!(first < 0.05, "expected near-silence first, got rms {}", first);
        assert!(second > 0.1, "expected tone second, got rms {}", second);
    }

    #[test]
    fn test_muted_stream_is_drained_but_silent() {
        let mixer = mixer();
        let packets = encode_frames(&vec![tone_frame(0.4); 3]);

        mixer.add_ssrc(5).unwrap();
        mixer.set_muted(5, true);
        for packet in &packets {
            mixer.feed_opus(5, packet.clone());
        }
        wait_for_frames(&mixer, 5, 1440);

        let mut output = vec![0.0f32; 960];
        let mut scratch = vec![0.0f32; 960];
        for _ in 0..3 {
            output.fill(0.0);
            mixer.mix_into(&mut output, &mut scratch);
            assert!(output.iter().all(|s| *s == 0.0));
        }

        // Backlog was drained despite the mute
        assert_eq!(mixer.client(5).unwrap().buffered_frames(), 0);
    }

    #[test]
    fn test_muted_stream_level_decays_to_silence() {
        let mixer = mixer();
        mixer.add_ssrc(8).unwrap();
        let client = mixer.client(8).unwrap();
        client.buffer.write(&vec![0.5f32; 960]);

        let mut output = vec![0.0f32; 960];
        let mut scratch = vec![0.0f32; 960];
        mixer.mix_into(&mut output, &mut scratch);
        assert!((client.peak_level() - 0.5).abs() < 1e-6);

        // Once muted, every cycle (drained or underrun) decays the level
        mixer.set_muted(8, true);
        let before = client.peak_level();
        for _ in 0..40 {
            output.fill(0.0);
            mixer.mix_into(&mut output, &mut scratch);
        }
        assert!(client.peak_level() < before);
        assert!(client.peak_level() < 0.01);
    }

    #[test]
    fn test_mute_and_volume_mix_scenario() {
        let mixer = mixer();
        let frames: Vec<Vec<f32>> = (0..5).map(|_| tone_frame(0.4)).collect();

        mixer.add_ssrc(10).unwrap();
        mixer.add_ssrc(11).unwrap();
        mixer.set_muted(10, true);
        mixer.set_volume(11, 0.5);

        // Feed the same packet sequence to both streams
        for packet in encode_frames(&frames) {
            mixer.feed_opus(10, packet.clone());
            mixer.feed_opus(11, packet);
        }
        wait_for_frames(&mixer, 10, 2400);
        wait_for_frames(&mixer, 11, 2400);

        // Independent decode of the identical sequence gives the reference
        let mut reference_decoder = StreamDecoder::new(&OpusConfig::voice()).unwrap();
        let mut scratch = vec![0.0f32; max_decoded_samples(&OpusConfig::voice())];
        let mut expected = Vec::new();
        for packet in encode_frames(&frames) {
            let n = reference_decoder.decode_into(&packet, &mut scratch).unwrap();
            expected.extend_from_slice(&scratch[..n * 2]);
        }

        let mut output = vec![0.0f32; expected.len()];
        let mut mix_scratch = vec![0.0f32; expected.len()];
        mixer.mix_into(&mut output, &mut mix_scratch);

        // A is muted, so the mix is exactly B scaled by its volume
        for (got, want) in output.iter().zip(expected.iter()) {
            assert!(
                (got - want * 0.5).abs() < 1e-6,
                "mix diverged: {} vs {}",
                got,
                want * 0.5
            );
        }
    }

    #[test]
    fn test_mono_mix_folds_channels() {
        let controls = Arc::new(Controls::new());
        controls.set_mix_mono(true);
        let mixer = StreamMixer::new(test_config(), controls).unwrap();

        mixer.add_ssrc(1).unwrap();
        // L = 0.2, R = 0.4 for 480 frames, written straight into the ring
        let pcm: Vec<f32> = (0..960)
            .map(|i| if i % 2 == 0 { 0.2 } else { 0.4 })
            .collect();
        mixer.client(1).unwrap().buffer.write(&pcm);

        let mut output = vec![0.0f32; 960];
        let mut scratch = vec![0.0f32; 960];
        mixer.mix_into(&mut output, &mut scratch);

        for sample in &output {
            assert!((sample - 0.3).abs() < 1e-6);
        }
    }

    #[test]
    fn test_mix_output_is_clamped() {
        let mixer = mixer();
        mixer.add_ssrc(1).unwrap();
        mixer.add_ssrc(2).unwrap();
        let loud = vec![0.9f32; 960];
        mixer.client(1).unwrap().buffer.write(&loud);
        mixer.client(2).unwrap().buffer.write(&loud);

        let mut output = vec![0.0f32; 960];
        let mut scratch = vec![0.0f32; 960];
        mixer.mix_into(&mut output, &mut scratch);

        assert!(output.iter().all(|s| *s <= 1.0));
        assert!((output[0] - 1.0).abs() < 1e-6);
    }
}
