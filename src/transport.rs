use std::io::{self, BufRead, BufReader, Read, Write};
use std::time::Duration;

use log::{debug, trace, warn};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::config::*;
use crate::error::{Error, Result};
use crate::frames::AcquisitionFrame;
use crate::parser::{is_frame_marker, parse_frame};

/// Byte stream to the dongle.
pub trait Port: Read + Write + Send {
    /// Discards everything pending in the input and output buffers.
    fn clear_buffers(&mut self) -> io::Result<()>;

    /// Current blocking timeout, if the port has one.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }
}

impl Port for Box<dyn SerialPort> {
    fn clear_buffers(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::All).map_err(io::Error::from)
    }

    fn timeout(&self) -> Option<Duration> {
        Some(SerialPort::timeout(&**self))
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        SerialPort::set_timeout(&mut **self, timeout).map_err(io::Error::from)
    }
}

/// Opens the byte stream to the dongle.
pub trait Connector: Send {
    type Port: Port;

    fn connect(&mut self) -> io::Result<Self::Port>;

    /// Human readable name of the target, used in errors and logs.
    fn name(&self) -> &str;
}

/// Opens a serial port with the dongle's line settings (8N1, no flow control).
#[derive(Debug, Clone)]
pub struct SerialConnector {
    pub path: String,
    pub baud_rate: u32,
    /// Bounds every blocking read, so an idle line resolves to "no frame".
    pub read_timeout: Duration,
}

impl SerialConnector {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: BAUD_RATE,
            read_timeout: Duration::from_millis(READ_TIMEOUT_MS),
        }
    }
}

impl Connector for SerialConnector {
    type Port = Box<dyn SerialPort>;

    fn connect(&mut self) -> io::Result<Self::Port> {
        serialport::new(&self.path, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.read_timeout)
            .open()
            .map_err(io::Error::from)
    }

    fn name(&self) -> &str {
        &self.path
    }
}

/// Serial port names present on this machine.
pub fn available_ports() -> Result<Vec<String>> {
    let mut ports: Vec<String> = serialport::available_ports()
        .map_err(|e| Error::PortError(e.into()))?
        .into_iter()
        .map(|p| p.port_name)
        .collect();
    ports.sort();
    Ok(ports)
}

/// Packet exchange with the probe, as consumed by the acquisition loop.
pub trait Transport {
    /// Samples per acquisition frame.
    fn acq_length(&self) -> usize;

    /// Writes one packet, discarding anything still buffered on the link.
    fn send(&mut self, packet: &[u8]) -> Result<()>;

    /// Waits for the next frame. `Ok(None)` means nothing usable arrived
    /// (idle line, unrelated text or a damaged frame) and the caller may poll again.
    fn receive_frame(&mut self) -> Result<Option<AcquisitionFrame>>;
}

/// USB dongle relaying between the host and the probe.
pub struct Dongle<C: Connector = SerialConnector> {
    connector: C,
    reader: Option<BufReader<C::Port>>,
    line: Vec<u8>,
    acq_length: usize,
}

impl Dongle<SerialConnector> {
    pub fn serial(path: impl Into<String>) -> Self {
        Self::new(SerialConnector::new(path))
    }
}

impl<C: Connector> Dongle<C> {
    pub fn new(connector: C) -> Self {
        Self::with_acq_length(connector, ACQ_LENGTH_SAMPLES)
    }

    pub fn with_acq_length(connector: C, acq_length: usize) -> Self {
        Self {
            connector,
            reader: None,
            line: Vec::new(),
            acq_length,
        }
    }

    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    pub fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        let port = self.connector.connect().map_err(|source| Error::PortUnavailable {
            port: self.connector.name().to_string(),
            source,
        })?;
        debug!("Opened {}", self.connector.name());
        self.reader = Some(BufReader::new(port));
        self.line.clear();
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        let Some(reader) = self.reader.take() else {
            return Ok(());
        };
        self.line.clear();
        let mut port = reader.into_inner();
        port.flush().map_err(Error::PortError)?;
        debug!("Closed {}", self.connector.name());
        Ok(())
    }

    fn write_packet(port: &mut C::Port, packet: &[u8]) -> Result<()> {
        port.clear_buffers().map_err(Error::PortError)?;

        // reads keep their short timeout, writes may block longer
        let read_timeout = port.timeout();
        port.set_timeout(Duration::from_millis(WRITE_TIMEOUT_MS))
            .map_err(Error::PortError)?;
        let written = port.write_all(packet).and_then(|()| port.flush());
        if let Some(timeout) = read_timeout {
            port.set_timeout(timeout).map_err(Error::PortError)?;
        }

        written.map_err(|e| match e.kind() {
            io::ErrorKind::TimedOut => Error::WriteTimeout,
            _ => Error::PortError(e),
        })
    }

    fn read_payload(reader: &mut BufReader<C::Port>, acq_length: usize) -> Result<Option<AcquisitionFrame>> {
        let mut payload = vec![0u8; frame_payload_len(acq_length)];
        match reader.read_exact(&mut payload) {
            Ok(()) => {}
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::UnexpectedEof) => {
                debug!("Incomplete frame payload: {e}");
                return Ok(None);
            }
            Err(e) => return Err(Error::PortError(e)),
        }
        match parse_frame(&payload, acq_length) {
            Ok(frame) => Ok(Some(frame)),
            Err(e) => {
                debug!("Dropping frame: {e}");
                Ok(None)
            }
        }
    }
}

impl<C: Connector> Transport for Dongle<C> {
    fn acq_length(&self) -> usize {
        self.acq_length
    }

    fn send(&mut self, packet: &[u8]) -> Result<()> {
        let reader = self.reader.take().ok_or(Error::NotConnected)?;
        // Unwrapping the reader drops whatever it had buffered.
        let mut port = reader.into_inner();
        self.line.clear();

        let result = Self::write_packet(&mut port, packet);
        self.reader = Some(BufReader::new(port));
        match &result {
            Ok(()) => debug!(
                "Sent {} byte packet (start byte {})",
                packet.len(),
                packet.first().copied().unwrap_or_default()
            ),
            Err(e) => warn!("Failed to send packet: {e}"),
        }
        result
    }

    fn receive_frame(&mut self) -> Result<Option<AcquisitionFrame>> {
        let reader = self.reader.as_mut().ok_or(Error::NotConnected)?;

        match reader.read_until(b'\n', &mut self.line) {
            Ok(_) => {}
            // keep the partial line, the rest arrives with the next call
            Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(None),
            Err(e) => return Err(Error::PortError(e)),
        }

        // stream ended before a newline
        if !self.line.ends_with(b"\n") {
            self.line.clear();
            return Ok(None);
        }

        let line = std::mem::take(&mut self.line);
        if !is_frame_marker(&line) {
            trace!("Skipping line: {}", String::from_utf8_lossy(&line).trim_end());
            return Ok(None);
        }
        Self::read_payload(reader, self.acq_length)
    }
}

impl<C: Connector> Drop for Dongle<C> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close {}: {e}", self.connector.name());
        }
    }
}
