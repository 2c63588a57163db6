//! Decode worker pool
//!
//! Packet decode is too expensive for the playback callback, so inbound
//! packets are handed to a small fixed worker set. Jobs for one SSRC always
//! land on the same worker (shard by SSRC), which preserves submission order
//! within a stream while different streams decode in parallel. Queues are
//! bounded; a flood of packets drops the newest rather than growing memory.
//!
//! Jobs hold an `Arc` to their client, so a decode that races with stream
//! removal completes harmlessly against a buffer that is simply dropped
//! afterwards.

use bytes::Bytes;
use crossbeam_channel::{bounded, Sender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

use crate::error::AudioError;
use crate::voice::playback::PlaybackClient;

struct DecodeJob {
    ssrc: u32,
    packet: Bytes,
    client: Arc<PlaybackClient>,
}

pub struct DecodePool {
    shards: Vec<Sender<DecodeJob>>,
    handles: Vec<JoinHandle<()>>,
}

impl DecodePool {
    /// Spawn `workers` decode threads, each with a queue of `queue_depth`
    /// packets and a reusable PCM scratch of `scratch_samples`.
    pub fn new(
        workers: usize,
        queue_depth: usize,
        scratch_samples: usize,
    ) -> Result<Self, AudioError> {
        let workers = workers.max(1);
        let mut shards = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for index in 0..workers {
            let (tx, rx) = bounded::<DecodeJob>(queue_depth);
            shards.push(tx);

            let handle = std::thread::Builder::new()
                .name(format!("voice-decode-{}", index))
                .spawn(move || {
                    let mut scratch = vec![0.0f32; scratch_samples];
                    while let Ok(job) = rx.recv() {
                        if let Err(e) = job.client.decode_and_buffer(&job.packet, &mut scratch) {
                            warn!(ssrc = job.ssrc, "dropping undecodable packet: {}", e);
                        }
                    }
                    debug!("decode worker {} exiting", index);
                })
                .map_err(|e| AudioError::StreamFailed(e.to_string()))?;
            handles.push(handle);
        }

        Ok(Self { shards, handles })
    }

    /// Queue one packet for decode. Same-SSRC packets stay in order.
    pub fn submit(&self, ssrc: u32, packet: Bytes, client: Arc<PlaybackClient>) {
        if self.shards.is_empty() {
            return;
        }
        let shard = &self.shards[ssrc as usize % self.shards.len()];
        match shard.try_send(DecodeJob {
            ssrc,
            packet,
            client,
        }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(ssrc, "decode queue full, dropping packet");
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!(ssrc, "decode pool is shut down, dropping packet");
            }
        }
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Close the queues and wait for every in-flight job to finish.
    pub fn shutdown(&mut self) {
        self.shards.clear();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for DecodePool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
