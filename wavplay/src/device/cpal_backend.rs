//! Audio output using cpal
//!
//! cpal pulls samples from a callback on the host's audio thread, while the
//! sink pushes samples with blocking writes. [`CpalDevice`] bridges the two
//! with a lock-free byte ring buffer sized from the latency target:
//!
//! - writes push whole frames into the ring, sleeping while it is full
//! - the stream starts once one period is queued
//! - the callback decodes bytes into the device sample type; if the ring runs
//!   dry mid-playback it outputs silence and flags an xrun
//! - the next write reports the xrun as [`DeviceError::Underrun`] until
//!   `prepare` clears it
//!
//! The ring and flag handling lives in [`super::ring`]; this module only
//! wires it to cpal streams.

use super::ring::{RingWriter, SampleDecoder, StreamFlags};
use super::{HwParams, PcmBackend, PcmDevice, SampleFormat, DEFAULT_DEVICE};
use crate::error::DeviceError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, SizedSample, Stream, StreamConfig};
use ringbuf::{traits::Split, HeapCons, HeapProd, HeapRb};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Give up draining if the ring makes no progress for this long
const DRAIN_STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Playback device provider backed by the default cpal host
pub struct CpalBackend {
    host: cpal::Host,
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    /// List available audio output devices.
    pub fn list_devices(&self) -> Result<Vec<String>, DeviceError> {
        let devices: Vec<String> = self
            .host
            .output_devices()
            .map_err(|e| DeviceError::Open {
                device: DEFAULT_DEVICE.to_string(),
                reason: format!("Failed to enumerate devices: {}", e),
            })?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }
}

impl PcmBackend for CpalBackend {
    type Device = CpalDevice;

    /// Open an output device. `"default"` selects the host default,
    /// anything else is matched against device names.
    fn open(&self, device_id: &str) -> Result<CpalDevice, DeviceError> {
        let open_error = |reason: String| DeviceError::Open {
            device: device_id.to_string(),
            reason,
        };

        let device = if device_id == DEFAULT_DEVICE {
            self.host
                .default_output_device()
                .ok_or_else(|| open_error("No default output device found".to_string()))?
        } else {
            self.host
                .output_devices()
                .map_err(|e| open_error(format!("Failed to enumerate devices: {}", e)))?
                .find(|d| d.name().ok().as_deref() == Some(device_id))
                .ok_or_else(|| open_error("Device not found".to_string()))?
        };

        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio device: {}", name);

        Ok(CpalDevice {
            device,
            name,
            active: None,
            closed: false,
        })
    }
}

struct ActiveStream {
    stream: Stream,
    writer: RingWriter<HeapProd<u8>>,
    flags: Arc<StreamFlags>,
    poll_interval: Duration,
}

impl ActiveStream {
    fn start(&mut self) -> Result<(), DeviceError> {
        if self.flags.is_started() {
            return Ok(());
        }
        self.flags.set_started(true);
        self.stream
            .play()
            .map_err(|e| DeviceError::Write(format!("Failed to start stream: {}", e)))?;
        debug!("Audio stream started ({} bytes queued)", self.writer.queued());
        Ok(())
    }

    fn pause(&mut self) {
        if let Err(e) = self.stream.pause() {
            warn!("Failed to pause stream: {}", e);
        }
    }

    fn stop(&mut self) {
        self.flags.set_started(false);
        self.pause();
    }

    fn check_failed(&self) -> Result<(), DeviceError> {
        if self.flags.is_failed() {
            return Err(DeviceError::Write("audio stream reported an error".to_string()));
        }
        Ok(())
    }
}

/// An open cpal output device
pub struct CpalDevice {
    device: cpal::Device,
    name: String,
    active: Option<ActiveStream>,
    closed: bool,
}

impl CpalDevice {
    fn active(&mut self) -> Result<&mut ActiveStream, DeviceError> {
        if self.closed {
            return Err(DeviceError::Closed);
        }
        self.active.as_mut().ok_or(DeviceError::NotConfigured)
    }

    fn open_stream(
        &self,
        params: &HwParams,
        buffer_size: BufferSize,
    ) -> Result<ActiveStream, DeviceError> {
        let too_large = || {
            DeviceError::Config(format!(
                "buffer of {} frames does not fit in memory",
                params.buffer_frames()
            ))
        };
        let ring_bytes = params.buffer_bytes().ok_or_else(too_large)?;
        let period_bytes = params.period_bytes().ok_or_else(too_large)?;

        let (producer, consumer) = HeapRb::<u8>::new(ring_bytes).split();
        let flags = Arc::new(StreamFlags::default());

        let config = StreamConfig {
            channels: params.channels,
            sample_rate: SampleRate(params.sample_rate),
            buffer_size,
        };

        let bytes_per_sample = params.format.bytes_per_sample();
        let bytes_per_frame = params.bytes_per_frame();
        let stream = match params.format {
            SampleFormat::U8 => self.build_stream(
                &config,
                consumer,
                &flags,
                SampleDecoder::<u8> {
                    bytes_per_sample,
                    bytes_per_frame,
                    decode: |b| b[0],
                    silence: 0x80,
                },
            )?,
            SampleFormat::S16Le => self.build_stream(
                &config,
                consumer,
                &flags,
                SampleDecoder::<i16> {
                    bytes_per_sample,
                    bytes_per_frame,
                    decode: |b| i16::from_le_bytes([b[0], b[1]]),
                    silence: 0,
                },
            )?,
            // Packed 24-bit goes out MSB-aligned in an i32
            SampleFormat::S24Le => self.build_stream(
                &config,
                consumer,
                &flags,
                SampleDecoder::<i32> {
                    bytes_per_sample,
                    bytes_per_frame,
                    decode: |b| i32::from_le_bytes([0, b[0], b[1], b[2]]),
                    silence: 0,
                },
            )?,
            SampleFormat::S32Le => self.build_stream(
                &config,
                consumer,
                &flags,
                SampleDecoder::<i32> {
                    bytes_per_sample,
                    bytes_per_frame,
                    decode: |b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]),
                    silence: 0,
                },
            )?,
        };

        // Some hosts start streams on creation; hold until the start threshold.
        if let Err(e) = stream.pause() {
            debug!("Stream pause not supported before start: {}", e);
        }

        let period_micros =
            params.period_frames as u64 * 1_000_000 / u64::from(params.sample_rate.max(1));
        Ok(ActiveStream {
            stream,
            writer: RingWriter::new(producer, bytes_per_frame, period_bytes),
            flags,
            poll_interval: Duration::from_micros((period_micros / 4).max(1_000)),
        })
    }

    fn build_stream<T>(
        &self,
        config: &StreamConfig,
        mut consumer: HeapCons<u8>,
        flags: &Arc<StreamFlags>,
        decoder: SampleDecoder<T>,
    ) -> Result<Stream, DeviceError>
    where
        T: SizedSample + Send + 'static,
    {
        let callback_flags = Arc::clone(flags);
        let error_flags = Arc::clone(flags);

        self.device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    decoder.fill(data, &mut consumer, &callback_flags);
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_flags.set_failed();
                },
                None,
            )
            .map_err(|e| DeviceError::Config(format!("Failed to build stream: {}", e)))
    }
}

impl PcmDevice for CpalDevice {
    fn set_params(&mut self, params: &HwParams) -> Result<(), DeviceError> {
        if self.closed {
            return Err(DeviceError::Closed);
        }
        if let Some(mut previous) = self.active.take() {
            previous.stop();
        }

        let fixed = u32::try_from(params.period_frames)
            .map_err(|_| DeviceError::Config(format!("period too large: {}", params.period_frames)))?;

        let active = match self.open_stream(params, BufferSize::Fixed(fixed)) {
            Ok(active) => active,
            Err(e) => {
                warn!("{}; retrying with device default period size", e);
                self.open_stream(params, BufferSize::Default)?
            }
        };

        info!(
            "Audio config: format={:?}, channels={}, sample_rate={}, period={} frames, buffer={} frames",
            params.format,
            params.channels,
            params.sample_rate,
            params.period_frames,
            params.buffer_frames()
        );
        self.active = Some(active);
        Ok(())
    }

    fn write_interleaved(&mut self, buffer: &[u8], frames: usize) -> Result<usize, DeviceError> {
        let active = self.active()?;
        active.check_failed()?;
        if active.flags.xrun() {
            return Err(DeviceError::Underrun);
        }

        let bytes_per_frame = active.writer.bytes_per_frame();
        let buffer = frames
            .checked_mul(bytes_per_frame)
            .and_then(|total| buffer.get(..total))
            .ok_or_else(|| {
                DeviceError::Write(format!(
                    "buffer holds {} bytes, too few for {} frames",
                    buffer.len(),
                    frames
                ))
            })?;

        let mut offset = 0;
        while offset < buffer.len() {
            if active.flags.xrun() {
                if offset == 0 {
                    return Err(DeviceError::Underrun);
                }
                // Report what made it in; the next call sees the xrun
                return Ok(offset / bytes_per_frame);
            }
            active.check_failed()?;

            let pushed = active.writer.push_frames(&buffer[offset..]);
            if pushed == 0 {
                // Ring full: it can only drain once the stream runs
                active.start()?;
                thread::sleep(active.poll_interval);
                continue;
            }
            offset += pushed;

            if active.writer.start_threshold_reached() {
                active.start()?;
            }
        }

        Ok(frames)
    }

    fn prepare(&mut self) -> Result<(), DeviceError> {
        let active = self.active()?;
        active.flags.rearm();
        active.pause();
        debug!("Audio stream prepared ({} bytes still queued)", active.writer.queued());
        Ok(())
    }

    fn drain(&mut self) -> Result<(), DeviceError> {
        let active = self.active()?;
        if active.writer.queued() == 0 {
            active.stop();
            return Ok(());
        }

        active.flags.set_draining(true);
        active.start()?;

        let mut remaining = active.writer.queued();
        let mut last_progress = Instant::now();
        while remaining > 0 {
            active.check_failed()?;
            thread::sleep(active.poll_interval);

            let now_remaining = active.writer.queued();
            if now_remaining < remaining {
                remaining = now_remaining;
                last_progress = Instant::now();
            } else if last_progress.elapsed() > DRAIN_STALL_TIMEOUT {
                warn!("Audio drain stalled with {} bytes queued", now_remaining);
                break;
            }
        }

        // Let the device play out its last period
        thread::sleep(active.poll_interval * 4);
        active.stop();
        active.flags.set_draining(false);
        debug!("Audio stream drained");
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        if self.closed {
            return Ok(());
        }
        if let Some(mut active) = self.active.take() {
            active.stop();
        }
        self.closed = true;
        info!("Closed audio device: {}", self.name);
        Ok(())
    }
}
