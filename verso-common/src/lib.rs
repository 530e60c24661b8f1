//! # Verso Common Library
//!
//! Shared code for the Verso translation engine:
//! - Common error type
//! - Event types (VersoEvent enum) and the EventBus
//! - Configuration file / data directory resolution

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
