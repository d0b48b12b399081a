//! TX/RX routing table for the high-voltage multiplexer.
//!
//! Every transducer channel `id` (0..=7) owns two mux switches: switch `2*id`
//! connects it to the receive path and switch `2*id + 1` to the transmit path.
//! One table entry selects which switches are closed during the TX and RX
//! phases of an acquisition; its index is the config id the probe reports
//! back with every frame.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::{MAX_CH_ID, TX_RX_MAX_NUM_OF_CONFIGS};
use crate::error::{Error, Result};

/// Mux switch connecting channel `id` to the receive path.
pub const fn rx_switch(id: u8) -> u8 {
    2 * id
}

/// Mux switch connecting channel `id` to the transmit path.
pub const fn tx_switch(id: u8) -> u8 {
    2 * id + 1
}

fn mask(channels: &BTreeSet<u8>, switch: fn(u8) -> u8) -> u16 {
    channels.iter().fold(0, |acc, &id| acc | (1 << switch(id)))
}

/// One entry as the user described it, kept so the table can be saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingEntry {
    pub config_id: usize,
    pub tx_channels: Vec<u8>,
    pub rx_channels: Vec<u8>,
    #[serde(default)]
    pub optimize: bool,
}

/// Append-only table of `(tx_mask, rx_mask)` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    tx_configs: [u16; TX_RX_MAX_NUM_OF_CONFIGS],
    rx_configs: [u16; TX_RX_MAX_NUM_OF_CONFIGS],
    entries: Vec<RoutingEntry>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingTable {
    pub fn new() -> Self {
        Self {
            tx_configs: [0; TX_RX_MAX_NUM_OF_CONFIGS],
            rx_configs: [0; TX_RX_MAX_NUM_OF_CONFIGS],
            entries: Vec::with_capacity(TX_RX_MAX_NUM_OF_CONFIGS),
        }
    }

    /// Appends an entry and returns its config id.
    ///
    /// With `optimize` set, some RX switches are already closed during the TX
    /// phase so fewer switches toggle between phases, which reduces switching
    /// transients. The choice between pre-closing the shared channels or the
    /// RX-only channels is a heuristic, not a proven optimum.
    pub fn add_config(&mut self, tx_channels: &[u8], rx_channels: &[u8], optimize: bool) -> Result<usize> {
        let index = self.entries.len();
        if index >= TX_RX_MAX_NUM_OF_CONFIGS {
            return Err(Error::TableFull {
                capacity: TX_RX_MAX_NUM_OF_CONFIGS,
            });
        }
        if let Some(&channel) = tx_channels.iter().chain(rx_channels).find(|&&id| id > MAX_CH_ID) {
            return Err(Error::InvalidChannel {
                channel,
                max: MAX_CH_ID,
            });
        }

        let tx: BTreeSet<u8> = tx_channels.iter().copied().collect();
        let rx: BTreeSet<u8> = rx_channels.iter().copied().collect();

        let mut tx_mask = mask(&tx, tx_switch);
        let rx_mask = mask(&rx, rx_switch);

        if optimize {
            let shared: BTreeSet<u8> = tx.intersection(&rx).copied().collect();
            let rx_only: BTreeSet<u8> = rx.difference(&tx).copied().collect();
            if shared.len() > rx_only.len() {
                tx_mask |= mask(&shared, rx_switch);
            } else if !rx_only.is_empty() {
                tx_mask |= mask(&rx_only, rx_switch);
            }
        }

        self.tx_configs[index] = tx_mask;
        self.rx_configs[index] = rx_mask;
        self.entries.push(RoutingEntry {
            config_id: index,
            tx_channels: tx.into_iter().collect(),
            rx_channels: rx.into_iter().collect(),
            optimize,
        });
        Ok(index)
    }

    /// TX switch masks of the entries added so far.
    pub fn tx_configs(&self) -> &[u16] {
        &self.tx_configs[..self.entries.len()]
    }

    /// RX switch masks of the entries added so far.
    pub fn rx_configs(&self) -> &[u16] {
        &self.rx_configs[..self.entries.len()]
    }

    pub fn entries(&self) -> &[RoutingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rebuilds a table by replaying entries in `config_id` order.
    pub fn from_entries(entries: &[RoutingEntry]) -> Result<Self> {
        let mut sorted: Vec<&RoutingEntry> = entries.iter().collect();
        sorted.sort_by_key(|entry| entry.config_id);

        let mut table = Self::new();
        for entry in sorted {
            table.add_config(&entry.tx_channels, &entry.rx_channels, entry.optimize)?;
        }
        Ok(table)
    }
}
