//! # SalesGate Common Library
//!
//! Shared code for the SalesGate relay and its operational tooling:
//! - Collaborator interfaces (object store, message bus, key-value store)
//!   with in-process implementations
//! - Configuration loading
//! - Error types
//! - Timestamp helpers

pub mod bus;
pub mod config;
pub mod error;
pub mod kv;
pub mod object_store;
pub mod time;

pub use error::{Error, Result};
