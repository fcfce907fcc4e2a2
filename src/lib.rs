//! Shipyard - cache-aware application image builds
//!
//! Assembles a release image in ordered stages on top of a container
//! engine, with persistent cache volumes shared between stages and runs.

pub mod cache;
pub mod cli;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod pipeline;

pub use error::{ShipyardError, ShipyardResult};
