//! Service configuration.

use std::path::PathBuf;

use crate::config::ConfigFile;
use crate::jobs::{PollConfig, SimulationTemplates};
use crate::tile::DEFAULT_LAYER_CACHE_ENTRIES;

/// Entries kept by an in-memory result store.
pub const DEFAULT_RESULT_ENTRIES: u64 = 1_000;

/// Where simulation results are kept.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultStore {
    /// Bounded, lost on restart.
    Memory { max_entries: u64 },
    /// One file per result, never evicted.
    Disk { directory: PathBuf },
}

impl Default for ResultStore {
    fn default() -> Self {
        ResultStore::Memory {
            max_entries: DEFAULT_RESULT_ENTRIES,
        }
    }
}

/// Configuration for [`CityAq`](super::CityAq).
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub store: ResultStore,
    pub tile_cache_entries: u64,
    pub templates: SimulationTemplates,
    pub poll: PollConfig,
}

impl ServiceConfig {
    pub fn new(templates: SimulationTemplates) -> Self {
        Self {
            store: ResultStore::default(),
            tile_cache_entries: DEFAULT_LAYER_CACHE_ENTRIES,
            templates,
            poll: PollConfig::default(),
        }
    }

    /// Settings from the user's configuration file, with results on disk.
    pub fn from_config_file(config: &ConfigFile) -> Self {
        Self::new(config.templates())
            .with_store(ResultStore::Disk {
                directory: config.cache.directory.clone(),
            })
            .with_tile_cache_entries(config.server.tile_cache_entries)
            .with_poll(config.poll())
    }

    pub fn with_store(mut self, store: ResultStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_tile_cache_entries(mut self, entries: u64) -> Self {
        self.tile_cache_entries = entries;
        self
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }
}
