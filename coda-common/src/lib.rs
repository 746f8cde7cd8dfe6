//! # Coda Common Library
//!
//! Shared code for the coda calibration crates including:
//! - Error types
//! - Configuration loading (TOML + root folder resolution)
//! - Event types (CodaEvent enum) and the EventBus status channel
//! - Time helpers for fractional-second arithmetic

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
