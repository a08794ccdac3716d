//! Test Helper Utilities
//!
//! Shared utilities for testing salesgate-relay

#![allow(dead_code)]

pub mod fixtures;
pub mod gated;

pub use fixtures::{container, legacy_sale_payload, native_meta, TestRelay, SUBMITTER};
pub use gated::GatedStore;
