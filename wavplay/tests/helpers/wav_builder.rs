//! WAV fixture builders
//!
//! `wav_bytes` builds exact canonical headers (including deliberately broken
//! ones); `write_hound_wav` produces files through a real WAV writer.

use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;

/// Canonical 44-byte header followed by `payload`
pub fn wav_bytes(channels: u16, sample_rate: u32, bits: u16, payload: &[u8]) -> Vec<u8> {
    wav_bytes_declaring(channels, sample_rate, bits, payload, payload.len() as u32)
}

/// Same as [`wav_bytes`] but with an arbitrary declared data chunk size
pub fn wav_bytes_declaring(
    channels: u16,
    sample_rate: u32,
    bits: u16,
    payload: &[u8],
    declared: u32,
) -> Vec<u8> {
    let block_align = channels * (bits / 8);
    let mut bytes = Vec::with_capacity(44 + payload.len());
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + declared).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(sample_rate * u32::from(block_align)).to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&bits.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&declared.to_le_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

/// Deterministic non-repeating-per-frame payload for ordering checks
pub fn pattern_payload(frames: usize, bytes_per_frame: usize) -> Vec<u8> {
    (0..frames * bytes_per_frame).map(|i| (i % 251) as u8).collect()
}

/// Write `frames` frames of a ramp signal with hound
pub fn write_hound_wav<P: AsRef<Path>>(
    path: P,
    channels: u16,
    sample_rate: u32,
    bits: u16,
    frames: usize,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: bits,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;

    for frame in 0..frames {
        for _ in 0..channels {
            match bits {
                8 => writer.write_sample((frame % 128) as i8)?,
                16 => writer.write_sample((frame % 32768) as i16)?,
                _ => writer.write_sample((frame % 8_388_608) as i32)?,
            }
        }
    }

    writer.finalize()?;
    Ok(())
}
