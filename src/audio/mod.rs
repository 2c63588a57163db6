//! Audio primitives: sample transport, metering, device lookup

pub mod buffer;
pub mod device;
pub mod meter;

pub use buffer::VoiceBuffer;
pub use device::{list_devices, DeviceInfo};
pub use meter::PeakMeter;
