//! Local loopback demo
//!
//! Captures the default microphone, runs the full capture pipeline, and feeds
//! the emitted packets straight back into the playback path as stream 1, so
//! you hear your own voice with the configured gate/denoise applied.
//!
//! Usage: loopback [seconds] (default 10)

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use voice_engine::config::VoiceConfig;
use voice_engine::AudioManager;

const LOOPBACK_SSRC: u32 = 1;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let seconds: u64 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);

    let manager = Arc::new(AudioManager::new(VoiceConfig::default())?);
    manager.set_capture_gate(0.02);
    manager.add_ssrc(LOOPBACK_SSRC)?;

    // Forward our own packets back in, standing in for the network layer.
    // The sender lives inside the manager, so this thread ends with the process.
    let packets = manager.packets();
    {
        let manager = manager.clone();
        std::thread::spawn(move || {
            for packet in packets.iter() {
                manager.feed_opus(LOOPBACK_SSRC, packet);
            }
        });
    }

    manager.start_voice()?;
    info!("loopback running for {} seconds, speak into the mic", seconds);

    let deadline = std::time::Instant::now() + Duration::from_secs(seconds);
    while std::time::Instant::now() < deadline {
        if let Some(err) = manager.check_errors() {
            warn!("audio stream failed: {}", err);
            break;
        }
        std::thread::sleep(Duration::from_millis(200));
    }

    manager.stop_voice();
    Ok(())
}
