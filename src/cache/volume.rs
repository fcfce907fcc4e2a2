//! Cache volume handles and mount bindings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Volume label keys used to mark shipyard caches
pub mod labels {
    /// Marks volume as a shipyard cache
    pub const SHIPYARD_CACHE: &str = "io.shipyard.cache";
    /// Logical cache name the volume was created for
    pub const NAME: &str = "io.shipyard.cache.name";
}

/// Opaque handle to a persistent cache volume
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheVolume {
    /// Logical name (e.g., "app-deps")
    pub name: String,
    /// Engine-level volume name (prefix + logical name)
    pub volume_name: String,
}

impl CacheVolume {
    /// Create a handle for a logical name with an engine-level prefix
    pub fn new(name: impl Into<String>, prefix: &str) -> Self {
        let name = name.into();
        Self {
            volume_name: format!("{}{}", prefix, name),
            name,
        }
    }

    /// Generate labels for volume creation
    pub fn labels(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(labels::SHIPYARD_CACHE.to_string(), "true".to_string());
        map.insert(labels::NAME.to_string(), self.name.clone());
        map
    }
}

impl fmt::Display for CacheVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.volume_name)
    }
}

/// A cache volume bound at a path inside the image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMount {
    /// Volume being mounted
    pub volume: CacheVolume,
    /// Mount path inside the container
    pub target: String,
}

impl CacheMount {
    /// Generate the volume mount string for podman
    pub fn volume_arg(&self) -> String {
        format!("{}:{}", self.volume.volume_name, self.target)
    }
}
