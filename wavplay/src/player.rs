//! Streaming player
//!
//! Drives the pipeline `Idle -> HeaderParsing -> Streaming -> Finished`:
//! the chunk parser walks the header, the sink is configured as soon as the
//! fmt chunk is known, then the payload is copied to the sink one period at a
//! time in file order.

use crate::config::PlayerConfig;
use crate::device::{PcmBackend, PcmDevice};
use crate::error::{DeviceError, Error, Result};
use crate::sink::AudioSink;
use crate::wav::{read_full, ChunkParser, FormatDescriptor, ParseEvent};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, error, info, trace, warn};

/// Lifecycle of a [`Player`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    HeaderParsing,
    Streaming,
    Finished,
}

/// Summary of a completed playback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackStats {
    pub format: FormatDescriptor,
    /// Payload length declared by the data chunk header
    pub declared_data_bytes: u32,
    /// Payload bytes actually read from the input
    pub bytes_streamed: u64,
    /// Frames accepted by the device
    pub frames_delivered: u64,
    /// Sink write calls issued, including ones that hit an underrun
    pub write_calls: u64,
    /// Underruns recovered during playback
    pub underruns: u64,
}

impl PlaybackStats {
    fn new(format: FormatDescriptor, declared_data_bytes: u32) -> Self {
        Self {
            format,
            declared_data_bytes,
            bytes_streamed: 0,
            frames_delivered: 0,
            write_calls: 0,
            underruns: 0,
        }
    }

    /// Playback duration implied by the delivered frames
    pub fn duration_secs(&self) -> f64 {
        if self.format.sample_rate == 0 {
            return 0.0;
        }
        self.frames_delivered as f64 / f64::from(self.format.sample_rate)
    }
}

/// Open a WAV file for playback.
///
/// # Errors
/// `Error::FileOpen` when the path is missing or unreadable.
pub fn open_input(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).map_err(|source| Error::FileOpen {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Play the WAV file at `path` on `config.device`.
///
/// The file is opened before the device, so an unreadable path fails
/// without touching the audio hardware.
///
/// # Errors
/// `Error::FileOpen`, `Error::Device` for an open failure, then anything
/// [`Player::play`] reports.
pub fn play_path<B: PcmBackend>(
    backend: &B,
    path: &Path,
    config: &PlayerConfig,
) -> Result<PlaybackStats> {
    let mut input = open_input(path)?;
    info!("Playing {}", path.display());

    let sink = AudioSink::open(backend, &config.device)?;
    Player::new(sink, config).play(&mut input)
}

/// Single-use WAV streaming player
pub struct Player<D: PcmDevice> {
    sink: AudioSink<D>,
    state: PlayerState,
    frames_per_period: usize,
    max_underrun_retries: u32,
}

impl<D: PcmDevice> Player<D> {
    /// Create a player around an opened sink, applying the configured
    /// period size and latency target to it.
    pub fn new(sink: AudioSink<D>, config: &PlayerConfig) -> Self {
        let sink = sink.with_buffering(config.frames_per_period, config.latency_us());
        Self {
            frames_per_period: sink.period_frames(),
            sink,
            state: PlayerState::Idle,
            max_underrun_retries: config.max_underrun_retries,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn sink(&self) -> &AudioSink<D> {
        &self.sink
    }

    pub fn frames_per_period(&self) -> usize {
        self.frames_per_period
    }

    /// Parse and play a WAV stream to completion, then close the sink.
    ///
    /// # Errors
    /// - `Error::MalformedHeader` / `Error::Truncated` for unusable headers
    /// - `Error::Device` for configure or write failures
    /// - `Error::InvalidState` if this player already ran
    pub fn play<R: Read>(&mut self, source: &mut R) -> Result<PlaybackStats> {
        if self.state != PlayerState::Idle {
            return Err(Error::InvalidState(format!(
                "player cannot start from {:?}",
                self.state
            )));
        }

        let result = self.run(source);
        let closed = self.finish();

        match (result, closed) {
            (Ok(stats), Ok(())) => Ok(stats),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                error!("Failed to close audio device after error: {}", close_err);
                Err(e)
            }
        }
    }

    /// Open `path` and play it
    pub fn play_file(&mut self, path: &Path) -> Result<PlaybackStats> {
        let mut input = open_input(path)?;
        self.play(&mut input)
    }

    fn run<R: Read>(&mut self, source: &mut R) -> Result<PlaybackStats> {
        self.state = PlayerState::HeaderParsing;
        let (format, declared) = self.parse_header(source)?;

        self.state = PlayerState::Streaming;
        let mut stats = PlaybackStats::new(format, declared);
        self.stream(source, &mut stats)?;
        stats.underruns = self.sink.underrun_count();

        info!(
            "End of file: {} frames ({:.2}s) in {} writes, {} underruns",
            stats.frames_delivered,
            stats.duration_secs(),
            stats.write_calls,
            stats.underruns
        );
        Ok(stats)
    }

    fn finish(&mut self) -> std::result::Result<(), DeviceError> {
        self.state = PlayerState::Finished;
        self.sink.close()
    }

    fn parse_header<R: Read>(&mut self, source: &mut R) -> Result<(FormatDescriptor, u32)> {
        let mut parser = ChunkParser::new();
        let mut format = None;

        loop {
            match parser.advance(source)? {
                ParseEvent::NeedMore => {}
                ParseEvent::FormatReady(descriptor) => {
                    info!(
                        "Sample Rate: {}, Channels: {}, bps: {}",
                        descriptor.sample_rate, descriptor.channels, descriptor.bits_per_sample
                    );
                    self.sink.configure(
                        descriptor.bits_per_sample,
                        descriptor.channels,
                        descriptor.sample_rate,
                    )?;
                    format = Some(descriptor);
                }
                ParseEvent::DataReady(size) => {
                    let format = format.ok_or_else(|| {
                        Error::MalformedHeader("data chunk found before fmt chunk".to_string())
                    })?;
                    debug!(
                        "Data chunk: {} bytes declared, payload at offset {}",
                        size,
                        parser.bytes_consumed()
                    );
                    return Ok((format, size));
                }
                ParseEvent::Malformed(reason) => return Err(Error::MalformedHeader(reason)),
                ParseEvent::EndOfInput => return Err(Error::Truncated),
            }
        }
    }

    fn stream<R: Read>(&mut self, source: &mut R, stats: &mut PlaybackStats) -> Result<()> {
        let bytes_per_frame = stats.format.bytes_per_frame();
        let chunk_bytes = self
            .frames_per_period
            .checked_mul(bytes_per_frame)
            .ok_or_else(|| {
                DeviceError::Config(format!(
                    "period of {} frames overflows the read buffer",
                    self.frames_per_period
                ))
            })?;
        let mut chunk = vec![0u8; chunk_bytes];

        loop {
            let read = read_full(source, &mut chunk)?;
            if read == 0 {
                break;
            }
            stats.bytes_streamed += read as u64;
            trace!("Read data: {}", read);

            let frames = read / bytes_per_frame;
            let leftover = read % bytes_per_frame;
            if leftover != 0 {
                warn!("Dropping {} trailing bytes that do not form a whole frame", leftover);
            }
            if frames > 0 {
                self.deliver(&chunk[..frames * bytes_per_frame], frames, stats)?;
            }

            if read < chunk.len() {
                break;
            }
        }

        let declared = u64::from(stats.declared_data_bytes);
        if stats.bytes_streamed < declared {
            warn!(
                "Data chunk declares {} bytes but input ended after {}",
                declared, stats.bytes_streamed
            );
        } else if stats.bytes_streamed > declared {
            debug!(
                "Streamed {} bytes past the declared data chunk size",
                stats.bytes_streamed - declared
            );
        }
        Ok(())
    }

    /// Hand one chunk to the sink, resending after underruns and continuing
    /// after short writes until every frame is accepted.
    fn deliver(&mut self, chunk: &[u8], frames: usize, stats: &mut PlaybackStats) -> Result<()> {
        let bytes_per_frame = chunk.len() / frames;
        let mut sent = 0;
        let mut retries = 0;

        while sent < frames {
            stats.write_calls += 1;
            let written = self.sink.write(&chunk[sent * bytes_per_frame..], frames - sent)?;

            if written == 0 {
                retries += 1;
                if retries > self.max_underrun_retries {
                    return Err(DeviceError::Write(format!(
                        "no progress after {} consecutive underruns",
                        retries
                    ))
                    .into());
                }
                continue;
            }

            let written = written.min(frames - sent);
            retries = 0;
            sent += written;
            stats.frames_delivered += written as u64;
        }
        Ok(())
    }
}
