#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

use wulpus::transport::{Connector, Port, Transport};
use wulpus::{AcquisitionControl, AcquisitionFrame, Error, Result};

pub const ACQ_LENGTH: usize = 8;

pub fn frame(acq_number: u16, config_id: u8) -> AcquisitionFrame {
    AcquisitionFrame {
        samples: (0..ACQ_LENGTH as i16).map(|i| i * 10 + acq_number as i16).collect(),
        acq_number,
        config_id,
    }
}

/// Device→host bytes for one frame: marker line, header, samples.
pub fn frame_bytes(frame: &AcquisitionFrame) -> Vec<u8> {
    let mut bytes = b"START\n".to_vec();
    bytes.extend_from_slice(&[0, 0, 0, 0, frame.config_id]);
    bytes.extend_from_slice(&frame.acq_number.to_le_bytes());
    for sample in &frame.samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

pub enum Step {
    Frame(AcquisitionFrame),
    Idle,
    Fail,
}

/// Frame-level transport replaying a script, recording every packet sent.
pub struct MockTransport {
    pub steps: VecDeque<Step>,
    pub sent: Vec<Vec<u8>>,
    pub reads: usize,
    cancel_after: Option<(usize, AcquisitionControl)>,
}

impl MockTransport {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            sent: Vec::new(),
            reads: 0,
            cancel_after: None,
        }
    }

    pub fn with_frames(count: u16) -> Self {
        Self::new((0..count).map(|n| Step::Frame(frame(n, (n % 2) as u8))))
    }

    /// Requests cancellation once `reads` frames have been handed out.
    pub fn cancel_after(mut self, reads: usize, control: AcquisitionControl) -> Self {
        self.cancel_after = Some((reads, control));
        self
    }

    pub fn start_bytes(&self) -> Vec<u8> {
        self.sent.iter().map(|packet| packet[0]).collect()
    }
}

impl Transport for MockTransport {
    fn acq_length(&self) -> usize {
        ACQ_LENGTH
    }

    fn send(&mut self, packet: &[u8]) -> Result<()> {
        self.sent.push(packet.to_vec());
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<Option<AcquisitionFrame>> {
        if let Some((after, control)) = &self.cancel_after {
            if self.reads >= *after {
                control.cancel();
            }
        }
        self.reads += 1;
        match self.steps.pop_front() {
            Some(Step::Frame(frame)) => Ok(Some(frame)),
            Some(Step::Idle) | None => Ok(None),
            Some(Step::Fail) => Err(Error::PortError(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "device unplugged",
            ))),
        }
    }
}

#[derive(Default)]
pub struct Wire {
    pub incoming: VecDeque<u8>,
    pub written: Vec<u8>,
    pub clears: usize,
    pub timeouts: usize,
    pub refuse_connect: bool,
}

/// Byte-level port sharing its wire with the test.
#[derive(Clone, Default)]
pub struct MockPort(pub Arc<Mutex<Wire>>);

impl MockPort {
    pub fn feed(&self, bytes: &[u8]) {
        self.0.lock().unwrap().incoming.extend(bytes);
    }

    /// Next read returns a timeout instead of data.
    pub fn stall(&self) {
        self.0.lock().unwrap().timeouts += 1;
    }

    pub fn written(&self) -> Vec<u8> {
        self.0.lock().unwrap().written.clone()
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut wire = self.0.lock().unwrap();
        if wire.timeouts > 0 {
            wire.timeouts -= 1;
            return Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"));
        }
        let n = buf.len().min(wire.incoming.len());
        for (dst, src) in buf.iter_mut().zip(wire.incoming.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for MockPort {
    fn clear_buffers(&mut self) -> io::Result<()> {
        let mut wire = self.0.lock().unwrap();
        wire.incoming.clear();
        wire.clears += 1;
        Ok(())
    }
}

pub struct MockConnector(pub MockPort);

impl Connector for MockConnector {
    type Port = MockPort;

    fn connect(&mut self) -> io::Result<MockPort> {
        if self.0.0.lock().unwrap().refuse_connect {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such device"));
        }
        Ok(self.0.clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
