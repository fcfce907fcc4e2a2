//! Image state threaded through pipeline stages

use crate::cache::{CacheMount, CacheVolume};
use serde::Serialize;
use std::collections::BTreeMap;

/// Immutable snapshot of an in-progress image
///
/// Every transition returns a new value. A state handed to a stage stays
/// valid after the stage returns, so earlier snapshots can be reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageState {
    /// Engine image reference or snapshot id
    pub image: String,
    /// Working directory for subsequent commands
    pub workdir: String,
    /// Environment passed to every command
    pub env: BTreeMap<String, String>,
    /// Active cache mounts, in mount order
    pub mounts: Vec<CacheMount>,
}

impl ImageState {
    /// Start from an image reference with no mounts
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            workdir: "/".to_string(),
            env: BTreeMap::new(),
            mounts: Vec::new(),
        }
    }

    /// Same state on top of a new snapshot
    pub fn with_image(&self, image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..self.clone()
        }
    }

    /// Same state with a different working directory
    pub fn with_workdir(&self, workdir: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
            ..self.clone()
        }
    }

    /// Same state with extra environment variables (later keys win)
    pub fn with_env<I, K, V>(&self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut next = self.clone();
        next.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        next
    }

    /// Same state with `volume` bound at `target`.
    ///
    /// Any mount already at `target` is replaced, and a volume mounted
    /// elsewhere is moved rather than bound twice.
    pub fn with_mount(&self, volume: CacheVolume, target: impl Into<String>) -> Self {
        let target = target.into();
        let mut next = self.clone();
        next.mounts
            .retain(|m| m.target != target && m.volume != volume);
        next.mounts.push(CacheMount { volume, target });
        next
    }

    /// Environment as `KEY=VALUE` pairs, sorted by key
    pub fn env_pairs(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }
}
