use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// One acquisition as streamed by the probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionFrame {
    pub samples: Vec<i16>,
    pub acq_number: u16,
    pub config_id: u8,
}

/// Why the receive loop stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    Completed,
    Cancelled,
    Disconnected(String),
}

/// Acquisitions reserved when a result buffer is created; longer runs grow it.
pub const INITIAL_RESERVATION: usize = 1024;

/// Frames of one run, stored in arrival order.
///
/// Samples are kept acquisition-major: acquisition `i` occupies
/// `samples[i * acq_length..(i + 1) * acq_length]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionResult {
    pub acq_length: usize,
    pub samples: Vec<i16>,
    pub acq_numbers: Vec<u16>,
    pub config_ids: Vec<u8>,
    pub started_at: DateTime<Local>,
    pub stop_reason: StopReason,
}

impl AcquisitionResult {
    /// `capacity` is the expected number of acquisitions; at most
    /// [`INITIAL_RESERVATION`] of them are reserved up front.
    pub fn new(acq_length: usize, capacity: usize) -> Self {
        let reserve = capacity.min(INITIAL_RESERVATION);
        Self {
            acq_length,
            samples: Vec::with_capacity(acq_length * reserve),
            acq_numbers: Vec::with_capacity(reserve),
            config_ids: Vec::with_capacity(reserve),
            started_at: Local::now(),
            stop_reason: StopReason::Completed,
        }
    }

    /// Appends a frame; its samples are truncated or zero padded to `acq_length`.
    pub fn push(&mut self, frame: &AcquisitionFrame) {
        let start = self.samples.len();
        let take = frame.samples.len().min(self.acq_length);
        self.samples.extend_from_slice(&frame.samples[..take]);
        self.samples.resize(start + self.acq_length, 0);
        self.acq_numbers.push(frame.acq_number);
        self.config_ids.push(frame.config_id);
    }

    /// Number of acquisitions received.
    pub fn len(&self) -> usize {
        self.acq_numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acq_numbers.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.stop_reason == StopReason::Completed
    }

    /// Samples of the `index`-th received acquisition.
    pub fn acquisition(&self, index: usize) -> Option<&[i16]> {
        let start = index.checked_mul(self.acq_length)?;
        self.samples.get(start..start + self.acq_length)
    }

    /// Sample `row` of acquisition `index`, i.e. element `[row, index]` of the
    /// samples × acquisitions matrix.
    pub fn sample(&self, row: usize, index: usize) -> Option<i16> {
        if row >= self.acq_length {
            return None;
        }
        self.acquisition(index).map(|samples| samples[row])
    }
}

/// Most recently received frame, published by the receive loop.
///
/// The loop swaps in a fresh `Arc` per frame; readers clone the `Arc` and never
/// see a frame that is still being written.
pub type SharedLatestFrame = Arc<Mutex<Option<Arc<AcquisitionFrame>>>>;

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(acq_number: u16, samples: Vec<i16>) -> AcquisitionFrame {
        AcquisitionFrame {
            samples,
            acq_number,
            config_id: (acq_number % 2) as u8,
        }
    }

    #[test]
    fn frames_are_stored_in_arrival_order() {
        let mut result = AcquisitionResult::new(3, 2);
        result.push(&frame(9, vec![1, 2, 3]));
        result.push(&frame(4, vec![4, 5, 6]));

        assert_eq!(result.len(), 2);
        assert_eq!(result.acq_numbers, vec![9, 4]);
        assert_eq!(result.config_ids, vec![1, 0]);
        assert_eq!(result.acquisition(1), Some(&[4, 5, 6][..]));
        assert_eq!(result.sample(2, 0), Some(3));
        assert_eq!(result.sample(3, 0), None);
        assert_eq!(result.acquisition(2), None);
    }

    #[test]
    fn short_and_long_frames_keep_the_stride() {
        let mut result = AcquisitionResult::new(3, 2);
        result.push(&frame(0, vec![7]));
        result.push(&frame(1, vec![1, 2, 3, 4, 5]));
        assert_eq!(result.samples, vec![7, 0, 0, 1, 2, 3]);
    }

    #[test]
    fn long_runs_do_not_reserve_everything_up_front() {
        let mut result = AcquisitionResult::new(400, 10_000_000);
        assert!(result.samples.capacity() < 400 * 10_000_000);
        assert!(result.acq_numbers.capacity() >= INITIAL_RESERVATION);

        result.push(&frame(0, vec![1; 400]));
        assert_eq!(result.len(), 1);
    }
}
