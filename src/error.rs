//! Error types for probe configuration and streaming

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building packets, talking to the dongle or persisting documents
#[derive(Debug, Error)]
pub enum Error {
    /// A field is outside its range or not one of its allowed values
    #[error("{field} equal to {value} is not allowed, expected {allowed}")]
    ConfigOutOfRange {
        field: &'static str,
        value: String,
        allowed: String,
    },

    /// A routing table does not match the declared number of TX/RX configs
    #[error("length of {table} ({len}) does not match num_txrx_configs ({expected})")]
    ConfigMismatch {
        table: &'static str,
        len: usize,
        expected: usize,
    },

    /// The configuration packet does not fit into the fixed packet length
    #[error("configuration packet needs {len} bytes but the probe accepts {max}")]
    PacketOverflow { len: usize, max: usize },

    /// A configuration packet could not be decoded
    #[error("malformed configuration packet: {reason}")]
    MalformedPacket { reason: String },

    /// Transducer channel id outside 0..=7
    #[error("channel id {channel} is out of range, maximum is {max}")]
    InvalidChannel { channel: u8, max: u8 },

    /// The TX/RX routing table has no room left
    #[error("TX/RX routing table is full ({capacity} configs)")]
    TableFull { capacity: usize },

    /// The serial port could not be opened
    #[error("failed to open serial port '{port}': {source}")]
    PortUnavailable {
        port: String,
        #[source]
        source: io::Error,
    },

    /// I/O failure on an open serial port
    #[error("serial port error: {0}")]
    PortError(#[source] io::Error),

    /// Writing a packet did not finish within the write timeout
    #[error("timed out writing to serial port")]
    WriteTimeout,

    /// Operation requires an open serial port
    #[error("serial port is not open")]
    NotConnected,

    /// A device frame could not be parsed
    #[error("malformed acquisition frame: {reason}")]
    MalformedFrame { reason: String },

    /// Reading or writing a document failed
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A document could not be (de)serialized
    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub(crate) fn out_of_range(
        field: &'static str,
        value: impl ToString,
        allowed: impl Into<String>,
    ) -> Self {
        Self::ConfigOutOfRange {
            field,
            value: value.to_string(),
            allowed: allowed.into(),
        }
    }

    pub(crate) fn malformed_packet(reason: impl Into<String>) -> Self {
        Self::MalformedPacket {
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_frame(reason: impl Into<String>) -> Self {
        Self::MalformedFrame {
            reason: reason.into(),
        }
    }
}
