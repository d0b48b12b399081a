//! Host-side driver for the WULPUS ultrasound acquisition probe.
//!
//! Builds the 68-byte configuration packet from an [`AcquisitionConfig`] and a
//! [`RoutingTable`], talks to the probe through a [`Dongle`] and collects the
//! streamed frames with an [`AcquisitionLoop`].

pub mod acquisition;
pub mod config;
pub mod error;
pub mod frames;
pub mod parser;
pub mod persistence;
pub mod protocol;
pub mod registers;
pub mod routing;
pub mod transport;
pub mod uss_config;

pub use acquisition::{
    AcquisitionControl, AcquisitionHandle, AcquisitionLoop, AcquisitionOptions, AcquisitionPlan,
    AcquisitionState,
};
pub use error::{Error, Result};
pub use frames::{AcquisitionFrame, AcquisitionResult, StopReason};
pub use protocol::{Field, Registers, ValidationMode};
pub use routing::{RoutingEntry, RoutingTable};
pub use transport::{Dongle, SerialConnector, Transport};
pub use uss_config::AcquisitionConfig;
