use std::time::Duration;

// Serial link configuration
pub const BAUD_RATE: u32 = 4_000_000;
pub const READ_TIMEOUT_MS: u64 = 100;
pub const WRITE_TIMEOUT_MS: u64 = 3_000;

// Protocol framing
pub const START_BYTE_CONF_PACK: u8 = 250;
pub const START_BYTE_RESTART: u8 = 251;
pub const PACKAGE_LEN: usize = 68;
pub const FRAME_MARKER: &[u8] = b"START\n";
pub const FRAME_HEADER_LEN: usize = 7;
pub const ACQ_LENGTH_SAMPLES: usize = 400;

// TX/RX routing table
pub const TX_RX_MAX_NUM_OF_CONFIGS: usize = 16;
pub const MAX_CH_ID: u8 = 7;

// Acquisition session
pub const MAX_NUM_ACQUISITIONS: u32 = 10_000_000;
/// Longer than the maximum measurement period (2 s), so the probe has gone
/// quiet before the new configuration arrives.
pub const SETTLE_DELAY: Duration = Duration::from_millis(2_500);
pub const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

// Result files
pub const RESULT_FILE_BASE: &str = "data_";
pub const MAX_RESULT_FILES: usize = 100;

// Persisted documents
pub const SETTINGS_DIR_NAME: &str = "wulpus";
pub const USS_CONFIG_FILE: &str = "uss_config.json";
pub const ROUTING_FILE: &str = "tx_rx_configs.json";

/// Number of payload bytes following a frame marker line.
pub const fn frame_payload_len(acq_length: usize) -> usize {
    acq_length * 2 + FRAME_HEADER_LEN
}
