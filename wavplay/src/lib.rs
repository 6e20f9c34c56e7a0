//! # wavplay
//!
//! Streams a WAV file to a PCM playback device.
//!
//! **Pipeline:** [`wav::ChunkParser`] walks the RIFF/WAVE header,
//! [`sink::AudioSink`] owns and configures the device, and
//! [`player::Player`] copies the sample payload to the sink one period at a
//! time, recovering from underruns.
//!
//! **Architecture:** blocking, single control flow; the device is reached
//! through the [`device::PcmDevice`] trait (cpal in production).

pub mod config;
pub mod device;
pub mod error;
pub mod player;
pub mod sink;
pub mod wav;

pub use config::PlayerConfig;
pub use error::{DeviceError, Error, Result};
pub use player::{PlaybackStats, Player, PlayerState};
pub use sink::AudioSink;
