//! Persistent cache volumes shared across pipeline runs
//!
//! A cache volume is identified by its logical name only. Storage belongs to
//! the execution engine, which materialises a volume the first time it is
//! mounted and keeps it between runs. Nothing here ever deletes a volume:
//! a failed run leaves fetched dependencies in place for the next one.

pub mod registry;
pub mod volume;

pub use registry::CacheRegistry;
pub use volume::{labels, CacheMount, CacheVolume};
