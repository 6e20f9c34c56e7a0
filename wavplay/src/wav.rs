//! Incremental RIFF/WAVE chunk parser
//!
//! Walks the container one block at a time so the player can react to the
//! format chunk (configure the device) before the sample payload starts.
//!
//! # Layout
//!
//! ```text
//! "RIFF" <size:u32> "WAVE"                       12 bytes
//! "fmt " <size:u32> <16-byte PCM body>           24 bytes
//! ... "data" <size:u32> <interleaved PCM payload>
//! ```
//!
//! All integers are little-endian.

use crate::error::{Error, Result};
use std::fmt;
use std::io::{self, Read};
use tracing::{debug, warn};

/// Size of the RIFF descriptor block
pub const RIFF_DESCRIPTOR_LEN: usize = 12;

/// Size of the canonical fmt chunk (header + PCM body)
pub const FORMAT_DESCRIPTOR_LEN: usize = 24;

/// Body length of a canonical PCM fmt chunk
const PCM_FORMAT_BODY_LEN: u32 = 16;

/// Four-character chunk identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkId(pub [u8; 4]);

impl ChunkId {
    pub const RIFF: ChunkId = ChunkId(*b"RIFF");
    pub const WAVE: ChunkId = ChunkId(*b"WAVE");
    pub const FMT: ChunkId = ChunkId(*b"fmt ");
    pub const DATA: ChunkId = ChunkId(*b"data");

    fn from_slice(bytes: &[u8]) -> Self {
        ChunkId([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

fn u16_le(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

fn u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Parser position within the container
///
/// Transitions only move forward. `StreamingData` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderState {
    AwaitingRiff,
    AwaitingFormat,
    AwaitingDataHeader,
    StreamingData,
    Rejected,
}

impl HeaderState {
    pub fn is_terminal(self) -> bool {
        matches!(self, HeaderState::StreamingData | HeaderState::Rejected)
    }
}

/// The 12-byte RIFF header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiffDescriptor {
    pub chunk_id: ChunkId,
    pub chunk_size: u32,
    pub format: ChunkId,
}

impl RiffDescriptor {
    pub fn parse(block: &[u8; RIFF_DESCRIPTOR_LEN]) -> Self {
        Self {
            chunk_id: ChunkId::from_slice(&block[0..4]),
            chunk_size: u32_le(&block[4..8]),
            format: ChunkId::from_slice(&block[8..12]),
        }
    }

    /// True when the tags identify a playable RIFF/WAVE file
    pub fn is_wave(&self) -> bool {
        self.chunk_id == ChunkId::RIFF && self.format == ChunkId::WAVE
    }
}

/// Canonical PCM "fmt " chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub chunk_id: ChunkId,
    pub chunk_size: u32,
    pub audio_format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl FormatDescriptor {
    /// WAVE_FORMAT_PCM
    pub const PCM: u16 = 1;

    pub fn parse(block: &[u8; FORMAT_DESCRIPTOR_LEN]) -> Self {
        Self {
            chunk_id: ChunkId::from_slice(&block[0..4]),
            chunk_size: u32_le(&block[4..8]),
            audio_format: u16_le(&block[8..10]),
            channels: u16_le(&block[10..12]),
            sample_rate: u32_le(&block[12..16]),
            byte_rate: u32_le(&block[16..20]),
            block_align: u16_le(&block[20..22]),
            bits_per_sample: u16_le(&block[22..24]),
        }
    }

    /// Bytes per single-channel sample, derived from the bit depth
    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_per_sample) / 8
    }

    /// Bytes per interleaved frame (one sample for every channel)
    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * usize::from(self.channels)
    }
}

/// The 8-byte "data" chunk header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataChunkHeader {
    pub chunk_id: ChunkId,
    pub chunk_size: u32,
}

/// Outcome of a single [`ChunkParser::advance`] step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    /// A block was consumed; call `advance` again
    NeedMore,
    /// The fmt chunk was read
    FormatReady(FormatDescriptor),
    /// The data chunk header was read; payload begins at the current position
    DataReady(u32),
    /// The header failed validation; the parser is now `Rejected`
    Malformed(String),
    /// Input ended before a complete block could be read
    EndOfInput,
}

/// Forward-only WAV header state machine
#[derive(Debug)]
pub struct ChunkParser {
    state: HeaderState,
    riff: Option<RiffDescriptor>,
    format: Option<FormatDescriptor>,
    data: Option<DataChunkHeader>,
    bytes_consumed: u64,
}

impl Default for ChunkParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkParser {
    pub fn new() -> Self {
        Self {
            state: HeaderState::AwaitingRiff,
            riff: None,
            format: None,
            data: None,
            bytes_consumed: 0,
        }
    }

    pub fn state(&self) -> HeaderState {
        self.state
    }

    pub fn riff(&self) -> Option<&RiffDescriptor> {
        self.riff.as_ref()
    }

    pub fn format(&self) -> Option<&FormatDescriptor> {
        self.format.as_ref()
    }

    /// Declared payload length of the data chunk, once located
    pub fn data_size(&self) -> Option<u32> {
        self.data.map(|header| header.chunk_size)
    }

    /// Total bytes pulled from the source so far
    pub fn bytes_consumed(&self) -> u64 {
        self.bytes_consumed
    }

    /// Consume the next header block from `source` and report what was found.
    ///
    /// # Errors
    /// - `Error::Io` for read failures other than end of input
    /// - `Error::InvalidState` when called after reaching a terminal state
    pub fn advance<R: Read>(&mut self, source: &mut R) -> Result<ParseEvent> {
        match self.state {
            HeaderState::AwaitingRiff => self.read_riff(source),
            HeaderState::AwaitingFormat => self.read_format(source),
            HeaderState::AwaitingDataHeader => self.read_data_header(source),
            state => Err(Error::InvalidState(format!(
                "chunk parser already finished ({:?})",
                state
            ))),
        }
    }

    fn read_riff<R: Read>(&mut self, source: &mut R) -> Result<ParseEvent> {
        let mut block = [0u8; RIFF_DESCRIPTOR_LEN];
        if !self.fill(source, &mut block)? {
            return Ok(ParseEvent::EndOfInput);
        }

        let riff = RiffDescriptor::parse(&block);
        if !riff.is_wave() {
            return Ok(self.reject(format!(
                "expected RIFF/WAVE, found {}/{}",
                riff.chunk_id, riff.format
            )));
        }

        debug!("RIFF header: declared size {} bytes", riff.chunk_size);
        self.riff = Some(riff);
        self.state = HeaderState::AwaitingFormat;
        Ok(ParseEvent::NeedMore)
    }

    fn read_format<R: Read>(&mut self, source: &mut R) -> Result<ParseEvent> {
        let mut block = [0u8; FORMAT_DESCRIPTOR_LEN];
        if !self.fill(source, &mut block)? {
            return Ok(ParseEvent::EndOfInput);
        }

        let format = FormatDescriptor::parse(&block);
        if format.chunk_id != ChunkId::FMT {
            return Ok(self.reject(format!("expected 'fmt ' chunk, found '{}'", format.chunk_id)));
        }
        if format.chunk_size < PCM_FORMAT_BODY_LEN {
            return Ok(self.reject(format!(
                "fmt chunk too short: {} bytes",
                format.chunk_size
            )));
        }
        if format.audio_format != FormatDescriptor::PCM {
            warn!(
                "fmt chunk declares audio format {:#06x}, treating payload as PCM",
                format.audio_format
            );
        }

        // Extended fmt chunks carry extra bytes; drop them so the next tag lines up.
        let surplus = u64::from(format.chunk_size - PCM_FORMAT_BODY_LEN) + u64::from(format.chunk_size & 1);
        if surplus > 0 {
            let skipped = io::copy(&mut source.by_ref().take(surplus), &mut io::sink())?;
            self.bytes_consumed += skipped;
            debug!("Skipped {} surplus fmt bytes", skipped);
        }

        self.format = Some(format);
        self.state = HeaderState::AwaitingDataHeader;
        Ok(ParseEvent::FormatReady(format))
    }

    fn read_data_header<R: Read>(&mut self, source: &mut R) -> Result<ParseEvent> {
        let mut tag = [0u8; 4];
        if !self.fill(source, &mut tag)? {
            return Ok(ParseEvent::EndOfInput);
        }

        let chunk_id = ChunkId(tag);
        if chunk_id != ChunkId::DATA {
            debug!("Ignoring unrecognised tag '{}' while seeking data chunk", chunk_id);
            return Ok(ParseEvent::NeedMore);
        }

        let mut size = [0u8; 4];
        if !self.fill(source, &mut size)? {
            return Ok(ParseEvent::EndOfInput);
        }

        let chunk_size = u32::from_le_bytes(size);
        self.data = Some(DataChunkHeader { chunk_id, chunk_size });
        self.state = HeaderState::StreamingData;
        Ok(ParseEvent::DataReady(chunk_size))
    }

    fn reject(&mut self, reason: String) -> ParseEvent {
        warn!("Rejecting WAV header: {}", reason);
        self.state = HeaderState::Rejected;
        ParseEvent::Malformed(reason)
    }

    /// Fill `block` completely. Returns false if input ended first.
    fn fill<R: Read>(&mut self, source: &mut R, block: &mut [u8]) -> Result<bool> {
        let filled = read_full(source, block)?;
        self.bytes_consumed += filled as u64;
        Ok(filled == block.len())
    }
}

/// Read until `buf` is full or the source is exhausted.
///
/// Returns the number of bytes read; less than `buf.len()` only at end of input.
pub fn read_full<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
