//! Voice session orchestrator
//!
//! Owns the capture pipeline, the stream mixer and the runtime controls, and
//! binds them to the device callbacks when voice starts. Construction never
//! touches a device, so everything except `start_voice`/`stop_voice` works
//! headless. cpal streams are not `Send`, so each stream is built and held
//! on a dedicated thread governed by a shared running flag, the same way the
//! capture threads in the transport layer this engine grew out of worked.

use bytes::Bytes;
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info};

use crate::audio::device;
use crate::config::{CodecApplication, SignalHint, VoiceConfig};
use crate::error::AudioError;
use crate::voice::capture::{CapturePipeline, CaptureScratch};
use crate::voice::controls::Controls;
use crate::voice::playback::StreamMixer;
use crate::voice::vad::VadMethod;
use crate::Result;

pub struct AudioManager {
    config: VoiceConfig,
    controls: Arc<Controls>,
    capture: Arc<CapturePipeline>,
    mixer: Arc<StreamMixer>,
    packet_rx: Receiver<Bytes>,
    capture_device: Mutex<Option<String>>,
    playback_device: Mutex<Option<String>>,
    running: Arc<AtomicBool>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    error_rx: Mutex<Option<Receiver<AudioError>>>,
}

impl AudioManager {
    /// Build a voice session. Fails on codec construction or decode pool
    /// spawn; devices are not opened until [`start_voice`](Self::start_voice).
    pub fn new(config: VoiceConfig) -> Result<Self> {
        let controls = Arc::new(Controls::new());
        let (packet_tx, packet_rx) = bounded(config.packet_queue_depth);

        let capture = Arc::new(CapturePipeline::new(
            &config.opus,
            controls.clone(),
            packet_tx,
        )?);
        let mixer = Arc::new(StreamMixer::new(config.clone(), controls.clone())?);

        Ok(Self {
            config,
            controls,
            capture,
            mixer,
            packet_rx,
            capture_device: Mutex::new(None),
            playback_device: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            threads: Mutex::new(Vec::new()),
            error_rx: Mutex::new(None),
        })
    }

    /// Open the capture and playback devices and start both callbacks.
    /// A failed start leaves the session stopped, so a later attempt is a
    /// real retry.
    pub fn start_voice(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Err(e) = self.spawn_device_threads() {
            self.running.store(false, Ordering::SeqCst);
            for handle in self.threads.lock().drain(..) {
                let _ = handle.join();
            }
            return Err(e);
        }

        info!("voice session started");
        Ok(())
    }

    fn spawn_device_threads(&self) -> Result<()> {
        // Resolve devices up front so a missing device fails the call
        // instead of surfacing later through the error channel.
        let input = device::find_input_device(self.capture_device.lock().as_deref())?;
        let output = device::find_output_device(self.playback_device.lock().as_deref())?;

        let (error_tx, error_rx) = bounded::<AudioError>(16);
        *self.error_rx.lock() = Some(error_rx);

        let stream_config = cpal::StreamConfig {
            channels: self.config.opus.channels as u16,
            sample_rate: cpal::SampleRate(self.config.opus.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let mut threads = self.threads.lock();

        // Capture side: accumulate device blocks into exact voice frames.
        {
            let pipeline = self.capture.clone();
            let running = self.running.clone();
            let error_tx = error_tx.clone();
            let config = stream_config.clone();
            let opus = self.config.opus.clone();
            let frame_samples = opus.samples_per_frame();

            let handle = std::thread::Builder::new()
                .name("voice-capture".to_string())
                .spawn(move || {
                    let mut acc: Vec<f32> = Vec::with_capacity(frame_samples * 4);
                    let mut scratch = CaptureScratch::new(&opus);

                    let stream = input.build_input_stream(
                        &config,
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            acc.extend_from_slice(data);
                            while acc.len() >= frame_samples {
                                pipeline.process_block(&acc[..frame_samples], &mut scratch);
                                acc.drain(..frame_samples);
                            }
                        },
                        move |err| {
                            error!("capture stream error: {}", err);
                        },
                        None,
                    );

                    match stream {
                        Ok(stream) => {
                            if let Err(e) = stream.play() {
                                let _ = error_tx.try_send(AudioError::StreamFailed(e.to_string()));
                                return;
                            }
                            while running.load(Ordering::Relaxed) {
                                std::thread::sleep(Duration::from_millis(10));
                            }
                            // Dropping the stream here releases the device
                        }
                        Err(e) => {
                            let _ = error_tx.try_send(AudioError::StreamFailed(e.to_string()));
                        }
                    }
                })
                .map_err(|e| AudioError::StreamFailed(e.to_string()))?;
            threads.push(handle);
        }

        // Playback side: zero the block, then sum every active stream in.
        {
            let mixer = self.mixer.clone();
            let controls = self.controls.clone();
            let running = self.running.clone();
            let config = stream_config;

            let handle = std::thread::Builder::new()
                .name("voice-playback".to_string())
                .spawn(move || {
                    let mut scratch: Vec<f32> = Vec::new();

                    let stream = output.build_output_stream(
                        &config,
                        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                            data.fill(0.0);
                            if !controls.playback_enabled() {
                                return;
                            }
                            if scratch.len() < data.len() {
                                scratch.resize(data.len(), 0.0);
                            }
                            mixer.mix_into(data, &mut scratch[..data.len()]);
                        },
                        move |err| {
                            error!("playback stream error: {}", err);
                        },
                        None,
                    );

                    match stream {
                        Ok(stream) => {
                            if let Err(e) = stream.play() {
                                let _ = error_tx.try_send(AudioError::StreamFailed(e.to_string()));
                                return;
                            }
                            while running.load(Ordering::Relaxed) {
                                std::thread::sleep(Duration::from_millis(10));
                            }
                        }
                        Err(e) => {
                            let _ = error_tx.try_send(AudioError::StreamFailed(e.to_string()));
                        }
                    }
                })
                .map_err(|e| AudioError::StreamFailed(e.to_string()))?;
            threads.push(handle);
        }

        Ok(())
    }

    /// Stop the device callbacks and drop buffered per-stream audio.
    /// Registered streams stay registered for the next start.
    pub fn stop_voice(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        for handle in self.threads.lock().drain(..) {
            let _ = handle.join();
        }
        self.mixer.clear_buffers();

        info!("voice session stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Pop a stream build/start failure reported by a device thread.
    pub fn check_errors(&self) -> Option<AudioError> {
        self.error_rx
            .lock()
            .as_ref()
            .and_then(|rx| rx.try_recv().ok())
    }

    // ---- devices ------------------------------------------------------

    /// Select the capture device by name (`None` = system default).
    /// Takes effect on the next `start_voice`.
    pub fn set_capture_device(&self, name: Option<String>) {
        *self.capture_device.lock() = name;
    }

    /// Select the playback device by name (`None` = system default).
    /// Takes effect on the next `start_voice`.
    pub fn set_playback_device(&self, name: Option<String>) {
        *self.playback_device.lock() = name;
    }

    // ---- outbound / inbound packets -----------------------------------

    /// Receiver for outbound encoded packets, consumed by the network layer.
    pub fn packets(&self) -> Receiver<Bytes> {
        self.packet_rx.clone()
    }

    /// Feed one inbound packet for the given stream.
    pub fn feed_opus(&self, ssrc: u32, packet: Bytes) {
        self.mixer.feed_opus(ssrc, packet);
    }

    // ---- stream lifecycle ---------------------------------------------

    pub fn add_ssrc(&self, ssrc: u32) -> Result<()> {
        self.mixer.add_ssrc(ssrc)
    }

    pub fn remove_ssrc(&self, ssrc: u32) {
        self.mixer.remove_ssrc(ssrc);
    }

    pub fn remove_all_ssrcs(&self) {
        self.mixer.remove_all();
    }

    pub fn set_mute_ssrc(&self, ssrc: u32, muted: bool) {
        self.mixer.set_muted(ssrc, muted);
    }

    pub fn set_volume_ssrc(&self, ssrc: u32, volume: f32) {
        self.mixer.set_volume(ssrc, volume);
    }

    pub fn volume_ssrc(&self, ssrc: u32) -> Option<f32> {
        self.mixer.volume(ssrc)
    }

    /// Peak level of one stream for UI display.
    pub fn ssrc_level(&self, ssrc: u32) -> Option<f32> {
        self.mixer.peak_level(ssrc)
    }

    // ---- capture controls ---------------------------------------------

    pub fn set_capture(&self, enabled: bool) {
        self.controls.set_capture_enabled(enabled);
    }

    pub fn set_playback(&self, enabled: bool) {
        self.controls.set_playback_enabled(enabled);
    }

    pub fn set_capture_gate(&self, gate: f32) {
        self.controls.set_capture_gate(gate);
    }

    pub fn capture_gate(&self) -> f32 {
        self.controls.capture_gate()
    }

    pub fn set_capture_gain(&self, gain: f32) {
        self.controls.set_capture_gain(gain);
    }

    pub fn capture_gain(&self) -> f32 {
        self.controls.capture_gain()
    }

    pub fn set_vad_method(&self, method: VadMethod) {
        self.controls.set_vad_method(method);
    }

    pub fn vad_method(&self) -> VadMethod {
        self.controls.vad_method()
    }

    pub fn set_probability_threshold(&self, threshold: f32) {
        self.controls.set_probability_threshold(threshold);
    }

    pub fn probability_threshold(&self) -> f32 {
        self.controls.probability_threshold()
    }

    pub fn vad_probability(&self) -> f32 {
        self.controls.vad_probability()
    }

    pub fn set_suppress_noise(&self, enabled: bool) {
        self.controls.set_suppress_noise(enabled);
    }

    pub fn suppress_noise(&self) -> bool {
        self.controls.suppress_noise()
    }

    pub fn set_mix_mono(&self, enabled: bool) {
        self.controls.set_mix_mono(enabled);
    }

    pub fn mix_mono(&self) -> bool {
        self.controls.mix_mono()
    }

    /// Capture peak level for UI display.
    pub fn capture_level(&self) -> f32 {
        self.capture.meter().value()
    }

    pub fn rtp_timestamp(&self) -> u32 {
        self.controls.rtp_timestamp()
    }

    // ---- encoder configuration ----------------------------------------

    pub fn set_bitrate(&self, bitrate: u32) -> Result<()> {
        self.capture.set_bitrate(bitrate)?;
        Ok(())
    }

    pub fn bitrate(&self) -> u32 {
        self.capture.encoder_config().bitrate
    }

    pub fn set_signal_hint(&self, hint: SignalHint) -> Result<()> {
        self.capture.set_signal(hint)?;
        Ok(())
    }

    pub fn signal_hint(&self) -> SignalHint {
        self.capture.encoder_config().signal
    }

    pub fn set_encoding_application(&self, app: CodecApplication) -> Result<()> {
        self.capture.set_application(app)?;
        Ok(())
    }

    pub fn encoding_application(&self) -> CodecApplication {
        self.capture.encoder_config().application
    }
}

impl Drop for AudioManager {
    fn drop(&mut self) {
        self.stop_voice();
    }
}
