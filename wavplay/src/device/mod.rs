//! PCM playback device abstraction
//!
//! The sink talks to hardware only through [`PcmBackend`] and [`PcmDevice`],
//! which keeps the streaming loop testable against a mock device.
//!
//! Semantics follow a blocking PCM write interface:
//! - `set_params` fixes sample format, channel layout, rate and buffering
//! - `write_interleaved` blocks until frames are queued and reports
//!   [`DeviceError::Underrun`] when the device ran dry since the last write
//! - `prepare` recovers the device after an underrun

pub mod cpal_backend;
pub mod ring;

use crate::error::DeviceError;

pub use cpal_backend::{CpalBackend, CpalDevice};

/// Identifier of the host's default playback device
pub const DEFAULT_DEVICE: &str = "default";

/// Sample encodings the sink can hand to a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Unsigned 8-bit
    U8,
    /// Signed 16-bit little-endian
    S16Le,
    /// Signed 24-bit little-endian, packed in 3 bytes
    S24Le,
    /// Signed 32-bit little-endian
    S32Le,
}

impl SampleFormat {
    /// Map a WAV bit depth to a device sample format.
    ///
    /// Total over `u16`: depths outside {8, 16, 24, 32} are an error.
    pub fn from_bits_per_sample(bits: u16) -> Result<Self, DeviceError> {
        match bits {
            8 => Ok(SampleFormat::U8),
            16 => Ok(SampleFormat::S16Le),
            24 => Ok(SampleFormat::S24Le),
            32 => Ok(SampleFormat::S32Le),
            other => Err(DeviceError::UnsupportedBitDepth(other)),
        }
    }

    pub fn bits_per_sample(self) -> u16 {
        match self {
            SampleFormat::U8 => 8,
            SampleFormat::S16Le => 16,
            SampleFormat::S24Le => 24,
            SampleFormat::S32Le => 32,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        usize::from(self.bits_per_sample()) / 8
    }
}

/// Hardware parameters requested by the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwParams {
    pub format: SampleFormat,
    pub channels: u16,
    pub sample_rate: u32,
    /// Target device buffer latency in microseconds
    pub latency_us: u32,
    /// Frames per device period
    pub period_frames: usize,
}

impl HwParams {
    pub fn bytes_per_frame(&self) -> usize {
        self.format.bytes_per_sample() * usize::from(self.channels)
    }

    /// Device buffer size in frames implied by the latency target
    pub fn buffer_frames(&self) -> usize {
        let frames = u64::from(self.sample_rate) * u64::from(self.latency_us) / 1_000_000;
        usize::try_from(frames)
            .unwrap_or(usize::MAX)
            .max(self.period_frames)
    }

    /// Bytes in one period, `None` if it does not fit in memory
    pub fn period_bytes(&self) -> Option<usize> {
        self.period_frames.checked_mul(self.bytes_per_frame())
    }

    /// Bytes in the whole device buffer, `None` if it does not fit in memory
    pub fn buffer_bytes(&self) -> Option<usize> {
        self.buffer_frames().checked_mul(self.bytes_per_frame())
    }
}

/// Opens playback devices by identifier
pub trait PcmBackend {
    type Device: PcmDevice;

    fn open(&self, device_id: &str) -> Result<Self::Device, DeviceError>;
}

/// An open playback device handle
pub trait PcmDevice {
    fn set_params(&mut self, params: &HwParams) -> Result<(), DeviceError>;

    /// Queue `frames` interleaved frames from `buffer`, blocking until accepted.
    ///
    /// Returns the number of frames written, which may be fewer than requested.
    fn write_interleaved(&mut self, buffer: &[u8], frames: usize) -> Result<usize, DeviceError>;

    /// Reset the device after an underrun so writes can resume
    fn prepare(&mut self) -> Result<(), DeviceError>;

    /// Block until all queued frames have been played
    fn drain(&mut self) -> Result<(), DeviceError>;

    fn close(&mut self) -> Result<(), DeviceError>;
}
