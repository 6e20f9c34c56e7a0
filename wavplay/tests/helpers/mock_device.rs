//! Mock PCM device with fault injection
//!
//! Records every call into a shared [`MockLog`] so tests can inspect what
//! reached the "hardware" after the device has been moved into a sink.

use std::sync::{Arc, Mutex};
use wavplay::device::{HwParams, PcmBackend, PcmDevice};
use wavplay::DeviceError;

/// One `write_interleaved` invocation
#[derive(Debug, Clone)]
pub struct WriteCall {
    pub frames_requested: usize,
    pub bytes: Vec<u8>,
    pub outcome: Result<usize, DeviceError>,
}

#[derive(Debug, Default)]
pub struct MockLog {
    pub opened: Vec<String>,
    pub params: Vec<HwParams>,
    pub writes: Vec<WriteCall>,
    pub prepares: usize,
    pub drains: usize,
    pub closes: usize,
}

impl MockLog {
    /// Bytes the device actually accepted, in order
    pub fn delivered_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for call in &self.writes {
            if let Ok(frames) = call.outcome {
                let per_frame = call.bytes.len() / call.frames_requested.max(1);
                out.extend_from_slice(&call.bytes[..frames * per_frame]);
            }
        }
        out
    }

    pub fn delivered_frames(&self) -> usize {
        self.writes.iter().filter_map(|c| c.outcome.clone().ok()).sum()
    }

    pub fn underrun_calls(&self) -> usize {
        self.writes
            .iter()
            .filter(|c| c.outcome == Err(DeviceError::Underrun))
            .count()
    }
}

pub type SharedLog = Arc<Mutex<MockLog>>;

/// Fault injection knobs
#[derive(Debug, Clone, Default)]
pub struct Behaviour {
    /// 1-based write call numbers that report an underrun
    pub underrun_on_calls: Vec<usize>,
    /// 1-based write call number that fails fatally
    pub fail_on_call: Option<usize>,
    /// Accept at most this many frames per write
    pub max_frames_per_write: Option<usize>,
    pub reject_params: bool,
    pub fail_open: bool,
}

pub struct MockDevice {
    log: SharedLog,
    behaviour: Behaviour,
    bytes_per_frame: usize,
    calls: usize,
}

impl PcmDevice for MockDevice {
    fn set_params(&mut self, params: &HwParams) -> Result<(), DeviceError> {
        if self.behaviour.reject_params {
            return Err(DeviceError::Config("mock rejects parameters".to_string()));
        }
        self.bytes_per_frame = params.bytes_per_frame();
        self.log.lock().unwrap().params.push(*params);
        Ok(())
    }

    fn write_interleaved(&mut self, buffer: &[u8], frames: usize) -> Result<usize, DeviceError> {
        self.calls += 1;
        let call = self.calls;

        let outcome = if self.behaviour.underrun_on_calls.contains(&call) {
            Err(DeviceError::Underrun)
        } else if self.behaviour.fail_on_call == Some(call) {
            Err(DeviceError::Write("mock write failure".to_string()))
        } else {
            Ok(self
                .behaviour
                .max_frames_per_write
                .map_or(frames, |max| frames.min(max)))
        };

        self.log.lock().unwrap().writes.push(WriteCall {
            frames_requested: frames,
            bytes: buffer[..frames * self.bytes_per_frame].to_vec(),
            outcome: outcome.clone(),
        });
        outcome
    }

    fn prepare(&mut self) -> Result<(), DeviceError> {
        self.log.lock().unwrap().prepares += 1;
        Ok(())
    }

    fn drain(&mut self) -> Result<(), DeviceError> {
        self.log.lock().unwrap().drains += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.log.lock().unwrap().closes += 1;
        Ok(())
    }
}

pub struct MockBackend {
    pub log: SharedLog,
    pub behaviour: Behaviour,
}

impl MockBackend {
    pub fn new(behaviour: Behaviour) -> Self {
        Self {
            log: SharedLog::default(),
            behaviour,
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new(Behaviour::default())
    }
}

impl PcmBackend for MockBackend {
    type Device = MockDevice;

    fn open(&self, device_id: &str) -> Result<MockDevice, DeviceError> {
        if self.behaviour.fail_open {
            return Err(DeviceError::Open {
                device: device_id.to_string(),
                reason: "Device or resource busy".to_string(),
            });
        }
        self.log.lock().unwrap().opened.push(device_id.to_string());
        Ok(MockDevice {
            log: Arc::clone(&self.log),
            behaviour: self.behaviour.clone(),
            bytes_per_frame: 0,
            calls: 0,
        })
    }
}
