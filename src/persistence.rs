use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::*;
use crate::error::{Error, Result};
use crate::frames::AcquisitionResult;
use crate::routing::{RoutingEntry, RoutingTable};
use crate::uss_config::AcquisitionConfig;

/// Directory holding the default config and routing documents.
pub fn settings_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(SETTINGS_DIR_NAME)
}

pub fn default_config_path() -> PathBuf {
    settings_dir().join(USS_CONFIG_FILE)
}

pub fn default_routing_path() -> PathBuf {
    settings_dir().join(ROUTING_FILE)
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| Error::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, json).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Wrote {}", path.display());
    Ok(())
}

impl AcquisitionConfig {
    /// Load a flat config document; missing keys keep their default.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = load_json(path)?;
        info!("Loaded acquisition config from {}", path.display());
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_json(self, path.as_ref())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RoutingDocument {
    configs: Vec<RoutingEntry>,
}

impl RoutingTable {
    /// Load `{"configs": [...]}` and rebuild the table from its entries.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let document: RoutingDocument = load_json(path)?;
        if document.configs.is_empty() {
            return Err(Error::out_of_range(
                "configs",
                0,
                format!("1..={TX_RX_MAX_NUM_OF_CONFIGS} entries"),
            ));
        }
        if document.configs.len() > TX_RX_MAX_NUM_OF_CONFIGS {
            return Err(Error::TableFull {
                capacity: TX_RX_MAX_NUM_OF_CONFIGS,
            });
        }
        let table = Self::from_entries(&document.configs)?;
        info!(
            "Loaded {} TX/RX configs from {}",
            table.len(),
            path.display()
        );
        Ok(table)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let document = RoutingDocument {
            configs: self.entries().to_vec(),
        };
        save_json(&document, path.as_ref())
    }
}

impl AcquisitionResult {
    /// Write the run to the first free `data_<n>.json` in `dir`.
    pub fn save_to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let dir = dir.as_ref();
        let path = (0..MAX_RESULT_FILES)
            .map(|n| dir.join(format!("{RESULT_FILE_BASE}{n}.json")))
            .find(|candidate| !candidate.exists())
            .ok_or_else(|| Error::Io {
                path: dir.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!("all {MAX_RESULT_FILES} result files are taken"),
                ),
            })?;
        save_json(self, &path)?;
        info!("Saved {} acquisitions to {}", self.len(), path.display());
        Ok(path)
    }
}
