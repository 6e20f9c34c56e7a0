//! Test helper modules for wavplay integration tests
//!
//! - MockBackend/MockDevice: recording PCM device with fault injection
//! - wav_builder: exact WAV byte images and hound-written fixture files

#![allow(dead_code, unused_imports)]

pub mod mock_device;
pub mod wav_builder;

pub use mock_device::{Behaviour, MockBackend, MockDevice, MockLog, SharedLog};
pub use wav_builder::{pattern_payload, wav_bytes, wav_bytes_declaring, write_hound_wav};
