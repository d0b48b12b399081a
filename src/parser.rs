use bytemuck::{Pod, Zeroable};

use crate::config::{FRAME_HEADER_LEN, FRAME_MARKER, frame_payload_len};
use crate::error::{Error, Result};
use crate::frames::AcquisitionFrame;

// Header preceding the samples of a frame payload - matches the dongle firmware
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct FrameHeader {
    reserved: [u8; 4],
    config_id: u8,
    acq_number: [u8; 2],
}

/// True if a received line announces a binary frame payload.
pub fn is_frame_marker(line: &[u8]) -> bool {
    line.ends_with(FRAME_MARKER)
}

/// Parse the binary payload that follows a `START` marker line
pub fn parse_frame(payload: &[u8], acq_length: usize) -> Result<AcquisitionFrame> {
    let expected = frame_payload_len(acq_length);
    if payload.len() != expected {
        return Err(Error::malformed_frame(format!(
            "expected {expected} payload bytes, got {}",
            payload.len()
        )));
    }

    let (header, body) = payload.split_at(FRAME_HEADER_LEN);
    let header = bytemuck::try_from_bytes::<FrameHeader>(header)
        .map_err(|e| Error::malformed_frame(format!("bad frame header: {e}")))?;

    let samples = body
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();

    Ok(AcquisitionFrame {
        samples,
        acq_number: u16::from_le_bytes(header.acq_number),
        config_id: header.config_id,
    })
}
