//! Per-run cache volume registry

use crate::cache::volume::CacheVolume;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::debug;

/// Maps logical cache names to volume handles for one pipeline run
///
/// Handles are issued lazily; asking twice for the same name yields the same
/// handle. Whether the backing volume already exists is the engine's concern.
#[derive(Debug, Default)]
pub struct CacheRegistry {
    prefix: String,
    volumes: Mutex<BTreeMap<String, CacheVolume>>,
}

impl CacheRegistry {
    /// Create a registry whose engine-level volume names carry `prefix`
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            volumes: Mutex::new(BTreeMap::new()),
        }
    }

    /// Get the handle for a logical cache name, issuing it on first request
    pub fn acquire(&self, name: &str) -> CacheVolume {
        let mut volumes = self
            .volumes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        volumes
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!("Issuing cache handle: {}", name);
                CacheVolume::new(name, &self.prefix)
            })
            .clone()
    }

    /// All handles issued so far, ordered by logical name
    pub fn acquired(&self) -> Vec<CacheVolume> {
        self.volumes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect()
    }
}
