//! PLC tag acquisition and historian pipeline.
//!
//! A [`drivers::Channel`] reads tags from the controller, the
//! [`sampling::SamplingLoop`] polls them, the [`archive::ArchiveEngine`] keeps
//! what changed enough, and the [`history::HistoryWriter`] batches accepted
//! samples into the store. [`health::HealthMonitor`] watches it all.

pub mod api;
pub mod archive;
pub mod codec;
pub mod config;
pub mod drivers;
pub mod error;
pub mod health;
pub mod history;
pub mod logging;
pub mod runtime;
pub mod sampling;
pub mod tags;

pub use error::{GatewayError, GatewayResult};
