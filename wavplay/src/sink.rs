//! Audio sink
//!
//! Owns the playback device for its whole lifetime. The sink translates the
//! WAV format into device parameters and absorbs underruns: an xrun is logged,
//! the device is re-prepared, and the write reports zero frames so the caller
//! can resend the same data.

use crate::device::{HwParams, PcmBackend, PcmDevice, SampleFormat};
use crate::error::DeviceError;
use tracing::{debug, info, warn};

/// Default target device buffer latency (500 ms)
pub const DEFAULT_LATENCY_US: u32 = 500_000;

/// Default frames per write / device period
pub const DEFAULT_PERIOD_FRAMES: usize = 512;

/// Largest period the sink will request from a device
pub const MAX_PERIOD_FRAMES: usize = 65_536;

/// Upper bound on one period's worth of interleaved bytes (16 MiB)
pub const MAX_PERIOD_BYTES: usize = 16 * 1024 * 1024;

/// Owned playback device plus its negotiated configuration
pub struct AudioSink<D: PcmDevice> {
    device: Option<D>,
    device_id: String,
    params: Option<HwParams>,
    period_frames: usize,
    latency_us: u32,
    underruns: u64,
}

impl<D: PcmDevice> AudioSink<D> {
    /// Open `device_id` through `backend` with default buffering.
    ///
    /// # Errors
    /// `DeviceError::Open` when the device is missing, busy or not permitted.
    pub fn open<B>(backend: &B, device_id: &str) -> Result<Self, DeviceError>
    where
        B: PcmBackend<Device = D>,
    {
        let device = backend.open(device_id)?;
        info!("Opened audio device '{}'", device_id);
        Ok(Self::from_device(device, device_id))
    }

    /// Wrap an already opened device
    pub fn from_device(device: D, device_id: &str) -> Self {
        Self {
            device: Some(device),
            device_id: device_id.to_string(),
            params: None,
            period_frames: DEFAULT_PERIOD_FRAMES,
            latency_us: DEFAULT_LATENCY_US,
            underruns: 0,
        }
    }

    /// Override period size and latency target used by the next `configure`
    pub fn with_buffering(mut self, period_frames: usize, latency_us: u32) -> Self {
        self.period_frames = period_frames.max(1);
        self.latency_us = latency_us;
        self
    }

    /// Set interleaved sample format, channel count and rate on the device.
    ///
    /// # Errors
    /// - `DeviceError::UnsupportedBitDepth` for depths outside {8, 16, 24, 32};
    ///   the device is not touched
    /// - `DeviceError::Config` for zero channels/rate, a period too large to
    ///   buffer, or a device rejection
    pub fn configure(
        &mut self,
        bits_per_sample: u16,
        channels: u16,
        sample_rate: u32,
    ) -> Result<(), DeviceError> {
        let format = SampleFormat::from_bits_per_sample(bits_per_sample)?;
        if channels == 0 {
            return Err(DeviceError::Config("channel count must be at least 1".to_string()));
        }
        if sample_rate == 0 {
            return Err(DeviceError::Config("sample rate must be non-zero".to_string()));
        }

        let params = HwParams {
            format,
            channels,
            sample_rate,
            latency_us: self.latency_us,
            period_frames: self.period_frames,
        };

        if self.period_frames > MAX_PERIOD_FRAMES {
            return Err(DeviceError::Config(format!(
                "period of {} frames exceeds the {} frame limit",
                self.period_frames, MAX_PERIOD_FRAMES
            )));
        }
        match params.period_bytes() {
            Some(bytes) if bytes <= MAX_PERIOD_BYTES => {}
            _ => {
                return Err(DeviceError::Config(format!(
                    "period of {} frames x {} channels exceeds {} bytes",
                    self.period_frames, channels, MAX_PERIOD_BYTES
                )))
            }
        }

        let device = self.device.as_mut().ok_or(DeviceError::Closed)?;
        device.set_params(&params)?;
        debug!(
            "Sink configured: {:?}, {} ch, {} Hz, {} us latency",
            format, channels, sample_rate, self.latency_us
        );
        self.params = Some(params);
        Ok(())
    }

    /// Blocking write of `frames` interleaved frames from `buffer`.
    ///
    /// Returns frames written. After an underrun the device is re-prepared and
    /// `Ok(0)` is returned; nothing from this call reached the device.
    ///
    /// # Errors
    /// Any device failure other than an underrun.
    pub fn write(&mut self, buffer: &[u8], frames: usize) -> Result<usize, DeviceError> {
        let device = self.device.as_mut().ok_or(DeviceError::Closed)?;
        let params = self.params.as_ref().ok_or(DeviceError::NotConfigured)?;

        let needed = frames
            .checked_mul(params.bytes_per_frame())
            .ok_or_else(|| DeviceError::Config(format!("write of {} frames overflows", frames)))?;
        if buffer.len() < needed {
            return Err(DeviceError::Config(format!(
                "write of {} frames needs {} bytes, buffer has {}",
                frames,
                needed,
                buffer.len()
            )));
        }
        if frames == 0 {
            return Ok(0);
        }

        match device.write_interleaved(&buffer[..needed], frames) {
            Ok(written) => Ok(written),
            Err(DeviceError::Underrun) => {
                self.underruns += 1;
                warn!("XRUN: audio device underrun #{}, re-preparing", self.underruns);
                device.prepare()?;
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    /// Drain queued audio and release the device. Idempotent.
    pub fn close(&mut self) -> Result<(), DeviceError> {
        let Some(mut device) = self.device.take() else {
            return Ok(());
        };

        let drained = if self.params.is_some() {
            device.drain()
        } else {
            Ok(())
        };
        let closed = device.close();
        info!("Closed audio device '{}'", self.device_id);
        drained.and(closed)
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    pub fn format(&self) -> Option<SampleFormat> {
        self.params.map(|p| p.format)
    }

    pub fn period_frames(&self) -> usize {
        self.period_frames
    }

    /// Underruns recovered since open
    pub fn underrun_count(&self) -> u64 {
        self.underruns
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

impl<D: PcmDevice> Drop for AudioSink<D> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close audio device on drop: {}", e);
        }
    }
}
