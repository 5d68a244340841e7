//! Vonnegut Common - shared types, configuration, and error handling
//!
//! This crate provides the pieces shared across the engine:
//! - A layered error hierarchy (`error`)
//! - Configuration schema (`config`)
//! - Domain types shared across the wire codec and the log engine (`types`)
//! - Metrics helpers (`metrics`)

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use types::*;
