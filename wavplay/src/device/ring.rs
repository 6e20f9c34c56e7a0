//! Byte ring between blocking writes and a pull-mode audio callback
//!
//! The writer pushes whole interleaved frames; the callback pops whole
//! frames and decodes them into device samples. Neither side allocates once
//! the ring exists, and both coordinate through [`StreamFlags`]:
//!
//! - the writer asks the stream to start once one period is queued
//! - the callback outputs silence when the ring runs dry, and flags an xrun
//!   if the stream was started and not draining
//! - re-arming clears the xrun and the started flag, so the next write
//!   waits for a full period again

use ringbuf::traits::{Consumer, Observer, Producer};
use std::sync::atomic::{AtomicBool, Ordering};

/// State shared between the writer and the audio callback
#[derive(Debug, Default)]
pub struct StreamFlags {
    /// Stream is playing (start threshold reached)
    started: AtomicBool,
    /// Running dry is expected, not an underrun
    draining: AtomicBool,
    /// Ring ran dry while playing
    xrun: AtomicBool,
    /// Host reported a stream error
    failed: AtomicBool,
}

impl StreamFlags {
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn set_started(&self, started: bool) {
        self.started.store(started, Ordering::Release);
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    pub fn set_draining(&self, draining: bool) {
        self.draining.store(draining, Ordering::Release);
    }

    pub fn xrun(&self) -> bool {
        self.xrun.load(Ordering::Acquire)
    }

    /// Clear a pending xrun and wait for the start threshold again
    pub fn rearm(&self) {
        self.xrun.store(false, Ordering::Release);
        self.started.store(false, Ordering::Release);
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    pub fn set_failed(&self) {
        self.failed.store(true, Ordering::Release);
    }
}

/// Writer end: queues whole frames and tracks the start threshold
pub struct RingWriter<P> {
    producer: P,
    bytes_per_frame: usize,
    period_bytes: usize,
}

impl<P: Producer<Item = u8>> RingWriter<P> {
    pub fn new(producer: P, bytes_per_frame: usize, period_bytes: usize) -> Self {
        Self {
            producer,
            bytes_per_frame: bytes_per_frame.max(1),
            period_bytes,
        }
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_frame
    }

    /// Queue as many whole frames from `bytes` as fit; returns bytes queued
    pub fn push_frames(&mut self, bytes: &[u8]) -> usize {
        let frame = self.bytes_per_frame;
        let room = self.producer.vacant_len() / frame * frame;
        let whole = bytes.len() / frame * frame;
        self.producer.push_slice(&bytes[..room.min(whole)])
    }

    pub fn queued(&self) -> usize {
        self.producer.occupied_len()
    }

    /// One period is buffered, enough to start the stream without starving it
    pub fn start_threshold_reached(&self) -> bool {
        self.queued() >= self.period_bytes
    }
}

/// Callback end: turns queued bytes into device samples
#[derive(Clone, Copy)]
pub struct SampleDecoder<T> {
    pub bytes_per_sample: usize,
    pub bytes_per_frame: usize,
    pub decode: fn(&[u8]) -> T,
    pub silence: T,
}

impl<T: Copy> SampleDecoder<T> {
    /// Fill `out` from `consumer`, padding with silence when the ring is short.
    ///
    /// Returns the number of samples decoded. Runs on the audio thread: no
    /// allocation, no locks.
    pub fn fill<C: Consumer<Item = u8>>(
        &self,
        out: &mut [T],
        consumer: &mut C,
        flags: &StreamFlags,
    ) -> usize {
        let available = consumer.occupied_len() / self.bytes_per_frame * self.bytes_per_frame;
        let decoded = (available / self.bytes_per_sample).min(out.len());

        // Widest sample is 32-bit
        let mut sample = [0u8; 4];
        let sample = &mut sample[..self.bytes_per_sample];
        for slot in &mut out[..decoded] {
            consumer.pop_slice(sample);
            *slot = (self.decode)(sample);
        }

        if decoded < out.len() {
            out[decoded..].fill(self.silence);
            if flags.is_started() && !flags.is_draining() {
                flags.xrun.store(true, Ordering::Release);
            }
        }
        decoded
    }
}
